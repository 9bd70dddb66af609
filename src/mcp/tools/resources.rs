//! Generic CRUD tools, one per resource family and supported operation.
//!
//! Names follow `list_<plural>`, `get_<singular>`, `create_<singular>`,
//! `update_<singular>` and `delete_<singular>`. Parent ids (`server_id`,
//! `site_id`) are required according to the resource's scope; the entity id
//! is `<singular>_id`.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::forge::{Operation, Parents, Resource, Scope};
use crate::mcp::tools::{
    ExecutionContext, MCPTool, Permission, ToolCategory, ToolError, ToolResult, id_property,
    require_u64,
};

pub struct ResourceTool {
    resource: Resource,
    operation: Operation,
    name: String,
    description: String,
}

impl ResourceTool {
    pub fn new(resource: Resource, operation: Operation) -> Self {
        let label = resource.label();
        let (name, description) = match operation {
            Operation::List => (
                format!("list_{}", resource.plural()),
                format!("List every {} {}", label, scope_phrase(resource)),
            ),
            Operation::Get => (
                format!("get_{}", resource.singular()),
                format!("Get one {} by id", label),
            ),
            Operation::Create => (
                format!("create_{}", resource.singular()),
                format!(
                    "Create a {} {}; `payload` is sent to Forge as the request body",
                    label,
                    scope_phrase(resource)
                ),
            ),
            Operation::Update => (
                format!("update_{}", resource.singular()),
                format!("Update a {}; `payload` holds the fields to change", label),
            ),
            Operation::Delete => (
                format!("delete_{}", resource.singular()),
                format!("Delete a {}. This cannot be undone", label),
            ),
        };

        Self {
            resource,
            operation,
            name,
            description,
        }
    }

    fn id_key(&self) -> String {
        format!("{}_id", self.resource.singular())
    }

    fn needs_id(&self) -> bool {
        matches!(
            self.operation,
            Operation::Get | Operation::Update | Operation::Delete
        )
    }

    fn parents(&self, params: &Value) -> Result<Parents, ToolError> {
        Ok(match self.resource.scope() {
            Scope::Account => Parents::account(),
            Scope::Server => Parents::server(require_u64(params, "server_id")?),
            Scope::Site => Parents::site(
                require_u64(params, "server_id")?,
                require_u64(params, "site_id")?,
            ),
        })
    }

    fn payload(params: &Value) -> Result<Value, ToolError> {
        match params.get("payload") {
            Some(Value::Object(map)) => Ok(Value::Object(map.clone())),
            _ => Err(ToolError::InvalidParams("payload is required".to_string())),
        }
    }
}

fn scope_phrase(resource: Resource) -> &'static str {
    match resource.scope() {
        Scope::Account => "in the Forge account",
        Scope::Server => "on a server",
        Scope::Site => "on a site",
    }
}

fn category_for(resource: Resource) -> ToolCategory {
    match resource {
        Resource::Server | Resource::PhpVersion | Resource::Recipe => ToolCategory::Servers,
        Resource::Site | Resource::RedirectRule | Resource::NginxTemplate => ToolCategory::Sites,
        Resource::Webhook => ToolCategory::Deployments,
        Resource::Certificate => ToolCategory::Certificates,
        Resource::Database | Resource::DatabaseUser | Resource::BackupConfig => {
            ToolCategory::Databases
        }
        Resource::Worker | Resource::Job | Resource::Daemon => ToolCategory::Workers,
        Resource::FirewallRule | Resource::SshKey | Resource::SecurityRule => {
            ToolCategory::Security
        }
        Resource::Monitor => ToolCategory::Monitoring,
    }
}

#[async_trait]
impl MCPTool for ResourceTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        if matches!(self.resource.scope(), Scope::Server | Scope::Site) {
            properties.insert("server_id".into(), id_property("Forge server id"));
            required.push("server_id".to_string());
        }
        if self.resource.scope() == Scope::Site {
            properties.insert("site_id".into(), id_property("Forge site id"));
            required.push("site_id".to_string());
        }
        if self.needs_id() {
            let key = self.id_key();
            properties.insert(
                key.clone(),
                id_property(&format!("Id of the {}", self.resource.label())),
            );
            required.push(key);
        }
        if matches!(self.operation, Operation::Create | Operation::Update) {
            properties.insert(
                "payload".into(),
                json!({ "type": "object", "description": "Request body passed to Forge" }),
            );
            required.push("payload".to_string());
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn required_permissions(&self) -> Vec<Permission> {
        match self.operation {
            Operation::List | Operation::Get => vec![Permission::Read],
            Operation::Create | Operation::Update => vec![Permission::Write],
            Operation::Delete => vec![Permission::Write, Permission::Destructive],
        }
    }

    fn category(&self) -> ToolCategory {
        category_for(self.resource)
    }

    async fn execute(
        &self,
        params: Value,
        context: &mut ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let parents = self.parents(&params)?;
        let client = &context.forge;

        let value = match self.operation {
            Operation::List => client.list(self.resource, &parents).await?,
            Operation::Get => {
                let id = require_u64(&params, &self.id_key())?;
                client.get(self.resource, &parents, id).await?
            }
            Operation::Create => {
                let body = Self::payload(&params)?;
                client.create(self.resource, &parents, body).await?
            }
            Operation::Update => {
                let id = require_u64(&params, &self.id_key())?;
                let body = Self::payload(&params)?;
                client.update(self.resource, &parents, id, body).await?
            }
            Operation::Delete => {
                let id = require_u64(&params, &self.id_key())?;
                client.delete(self.resource, &parents, id).await?;
                json!({ "deleted": true, "resource": self.resource, "id": id })
            }
        };

        Ok(ToolResult::json(&value))
    }
}

/// One tool per resource family and operation it supports
pub fn resource_tools() -> Vec<Arc<dyn MCPTool>> {
    Resource::ALL
        .into_iter()
        .flat_map(|resource| {
            resource
                .operations()
                .iter()
                .map(move |&operation| {
                    Arc::new(ResourceTool::new(resource, operation)) as Arc<dyn MCPTool>
                })
        })
        .collect()
}
