//! Single-endpoint Forge actions that do not fit the CRUD shape.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::forge::models::InstallRepository;
use crate::forge::{Integration, IntegrationAction, ServiceAction};
use crate::mcp::tools::{
    ExecutionContext, MCPTool, Permission, ToolCategory, ToolError, ToolResult, id_property,
    require_str, require_u64,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RebootServer,
    DeploySite,
    SetQuickDeploy,
    GetDeploymentScript,
    UpdateDeploymentScript,
    GetDeploymentLog,
    ListDeployments,
    InstallGitRepository,
    ObtainLetsEncryptCertificate,
    ActivateCertificate,
    RestartWorker,
    RestartDaemon,
    RunRecipe,
    ManageService,
    ManageSiteIntegration,
    ListServerEvents,
}

impl Action {
    pub const ALL: [Action; 16] = [
        Action::RebootServer,
        Action::DeploySite,
        Action::SetQuickDeploy,
        Action::GetDeploymentScript,
        Action::UpdateDeploymentScript,
        Action::GetDeploymentLog,
        Action::ListDeployments,
        Action::InstallGitRepository,
        Action::ObtainLetsEncryptCertificate,
        Action::ActivateCertificate,
        Action::RestartWorker,
        Action::RestartDaemon,
        Action::RunRecipe,
        Action::ManageService,
        Action::ManageSiteIntegration,
        Action::ListServerEvents,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Action::RebootServer => "reboot_server",
            Action::DeploySite => "deploy_site",
            Action::SetQuickDeploy => "set_quick_deploy",
            Action::GetDeploymentScript => "get_deployment_script",
            Action::UpdateDeploymentScript => "update_deployment_script",
            Action::GetDeploymentLog => "get_deployment_log",
            Action::ListDeployments => "list_deployments",
            Action::InstallGitRepository => "install_git_repository",
            Action::ObtainLetsEncryptCertificate => "obtain_letsencrypt_certificate",
            Action::ActivateCertificate => "activate_certificate",
            Action::RestartWorker => "restart_worker",
            Action::RestartDaemon => "restart_daemon",
            Action::RunRecipe => "run_recipe",
            Action::ManageService => "manage_service",
            Action::ManageSiteIntegration => "manage_site_integration",
            Action::ListServerEvents => "list_server_events",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Action::RebootServer => "Reboot a server. Sites on it are unavailable until it is back",
            Action::DeploySite => "Trigger a deployment of a site using its deployment script",
            Action::SetQuickDeploy => "Enable or disable quick deploy (deploy on push) for a site",
            Action::GetDeploymentScript => "Read the deployment script of a site",
            Action::UpdateDeploymentScript => "Replace the deployment script of a site",
            Action::GetDeploymentLog => "Read the log of the latest deployment of a site",
            Action::ListDeployments => "List the deployment history of a site",
            Action::InstallGitRepository => "Install a git repository on a site",
            Action::ObtainLetsEncryptCertificate => {
                "Request a Let's Encrypt certificate for one or more domains of a site"
            }
            Action::ActivateCertificate => "Make a certificate the active one for its site",
            Action::RestartWorker => "Restart a queue worker",
            Action::RestartDaemon => "Restart a daemon",
            Action::RunRecipe => "Run a recipe on a set of servers",
            Action::ManageService => "Start, stop or restart a service (nginx, mysql, php...) on a server",
            Action::ManageSiteIntegration => {
                "Read, enable or disable a Laravel integration (horizon, octane, reverb, pulse, inertia, maintenance, scheduler) on a site"
            }
            Action::ListServerEvents => "List recent provisioning and deployment events of a server",
        }
    }

    fn category(self) -> ToolCategory {
        match self {
            Action::RebootServer | Action::RunRecipe | Action::ManageService => {
                ToolCategory::Servers
            }
            Action::ListServerEvents => ToolCategory::Monitoring,
            Action::ObtainLetsEncryptCertificate | Action::ActivateCertificate => {
                ToolCategory::Certificates
            }
            Action::RestartWorker | Action::RestartDaemon => ToolCategory::Workers,
            Action::ManageSiteIntegration => ToolCategory::Sites,
            _ => ToolCategory::Deployments,
        }
    }

    fn permissions(self) -> Vec<Permission> {
        match self {
            Action::GetDeploymentScript
            | Action::GetDeploymentLog
            | Action::ListDeployments
            | Action::ListServerEvents
            | Action::ManageSiteIntegration => vec![Permission::Read],
            Action::RebootServer => vec![Permission::Write, Permission::Destructive],
            _ => vec![Permission::Write],
        }
    }

    fn schema(self) -> Value {
        let server = id_property("Forge server id");
        let site = id_property("Forge site id");

        match self {
            Action::RebootServer | Action::ListServerEvents => object(
                json!({ "server_id": server }),
                &["server_id"],
            ),
            Action::DeploySite
            | Action::GetDeploymentScript
            | Action::GetDeploymentLog
            | Action::ListDeployments => object(
                json!({ "server_id": server, "site_id": site }),
                &["server_id", "site_id"],
            ),
            Action::SetQuickDeploy => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "enabled": { "type": "boolean" }
                }),
                &["server_id", "site_id", "enabled"],
            ),
            Action::UpdateDeploymentScript => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "content": { "type": "string", "description": "Full script text" },
                    "auto_source": {
                        "type": "boolean",
                        "description": "Source environment variables before running the script"
                    }
                }),
                &["server_id", "site_id", "content"],
            ),
            Action::InstallGitRepository => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "provider": {
                        "type": "string",
                        "enum": ["github", "gitlab", "gitlab-custom", "bitbucket", "custom"]
                    },
                    "repository": { "type": "string", "description": "owner/name or clone URL" },
                    "branch": { "type": "string" },
                    "composer": { "type": "boolean", "description": "Run composer install" }
                }),
                &["server_id", "site_id", "provider", "repository"],
            ),
            Action::ObtainLetsEncryptCertificate => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "domains": {
                        "type": "array",
                        "items": { "type": "string", "minLength": 1 },
                        "minItems": 1
                    }
                }),
                &["server_id", "site_id", "domains"],
            ),
            Action::ActivateCertificate => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "certificate_id": id_property("Certificate id")
                }),
                &["server_id", "site_id", "certificate_id"],
            ),
            Action::RestartWorker => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "worker_id": id_property("Worker id")
                }),
                &["server_id", "site_id", "worker_id"],
            ),
            Action::RestartDaemon => object(
                json!({ "server_id": server, "daemon_id": id_property("Daemon id") }),
                &["server_id", "daemon_id"],
            ),
            Action::RunRecipe => object(
                json!({
                    "recipe_id": id_property("Recipe id"),
                    "server_ids": {
                        "type": "array",
                        "items": { "type": "integer", "minimum": 1 },
                        "minItems": 1
                    },
                    "notify": { "type": "boolean" }
                }),
                &["recipe_id", "server_ids"],
            ),
            Action::ManageService => object(
                json!({
                    "server_id": server,
                    "service": { "type": "string", "description": "Service name, e.g. nginx or php8.3" },
                    "action": { "type": "string", "enum": ["start", "stop", "restart"] }
                }),
                &["server_id", "service", "action"],
            ),
            Action::ManageSiteIntegration => object(
                json!({
                    "server_id": server,
                    "site_id": site,
                    "integration": {
                        "type": "string",
                        "enum": ["horizon", "octane", "reverb", "pulse", "inertia", "maintenance", "scheduler"]
                    },
                    "action": { "type": "string", "enum": ["status", "enable", "disable"] },
                    "options": { "type": "object", "description": "Settings sent when enabling" }
                }),
                &["server_id", "site_id", "integration", "action"],
            ),
        }
    }
}

fn object(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn require_enum<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, ToolError> {
    serde_json::from_value(params[key].clone())
        .map_err(|_| ToolError::InvalidParams(format!("{} has an unsupported value", key)))
}

fn require_ids(params: &Value, key: &str) -> Result<Vec<u64>, ToolError> {
    params[key]
        .as_array()
        .filter(|items| !items.is_empty())
        .and_then(|items| items.iter().map(Value::as_u64).collect::<Option<Vec<_>>>())
        .ok_or_else(|| ToolError::InvalidParams(format!("{} must be a list of ids", key)))
}

pub struct ActionTool {
    action: Action,
}

impl ActionTool {
    pub fn new(action: Action) -> Self {
        Self { action }
    }
}

#[async_trait]
impl MCPTool for ActionTool {
    fn name(&self) -> &str {
        self.action.name()
    }

    fn description(&self) -> &str {
        self.action.description()
    }

    fn input_schema(&self) -> Value {
        self.action.schema()
    }

    fn required_permissions(&self) -> Vec<Permission> {
        self.action.permissions()
    }

    fn category(&self) -> ToolCategory {
        self.action.category()
    }

    async fn execute(
        &self,
        params: Value,
        context: &mut ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let client = &context.forge;

        let result = match self.action {
            Action::RebootServer => {
                let server_id = require_u64(&params, "server_id")?;
                let value = client.reboot_server(server_id).await?;
                ToolResult::json(&json!({ "rebooting": true, "server_id": server_id, "response": value }))
            }
            Action::DeploySite => {
                let server_id = require_u64(&params, "server_id")?;
                let site_id = require_u64(&params, "site_id")?;
                let site = client.deploy_site(server_id, site_id).await?;
                ToolResult::json(&json!({ "deployment_triggered": true, "site": site }))
            }
            Action::SetQuickDeploy => {
                let server_id = require_u64(&params, "server_id")?;
                let site_id = require_u64(&params, "site_id")?;
                let enabled = params["enabled"]
                    .as_bool()
                    .ok_or_else(|| ToolError::InvalidParams("enabled is required".to_string()))?;
                client.set_quick_deploy(server_id, site_id, enabled).await?;
                ToolResult::json(&json!({ "site_id": site_id, "quick_deploy": enabled }))
            }
            Action::GetDeploymentScript => {
                let script = client
                    .get_deployment_script(
                        require_u64(&params, "server_id")?,
                        require_u64(&params, "site_id")?,
                    )
                    .await?;
                ToolResult::text(script)
            }
            Action::UpdateDeploymentScript => {
                let server_id = require_u64(&params, "server_id")?;
                let site_id = require_u64(&params, "site_id")?;
                let content = params["content"]
                    .as_str()
                    .ok_or_else(|| ToolError::InvalidParams("content is required".to_string()))?;
                let auto_source = params["auto_source"].as_bool().unwrap_or(false);
                client
                    .update_deployment_script(server_id, site_id, content, auto_source)
                    .await?;
                ToolResult::json(&json!({ "updated": true, "site_id": site_id }))
            }
            Action::GetDeploymentLog => {
                let log = client
                    .get_deployment_log(
                        require_u64(&params, "server_id")?,
                        require_u64(&params, "site_id")?,
                    )
                    .await?;
                if log.is_empty() {
                    ToolResult::text("No deployment log available")
                } else {
                    ToolResult::text(log)
                }
            }
            Action::ListDeployments => {
                let history = client
                    .list_deployments(
                        require_u64(&params, "server_id")?,
                        require_u64(&params, "site_id")?,
                    )
                    .await?;
                ToolResult::json(&history)
            }
            Action::InstallGitRepository => {
                let server_id = require_u64(&params, "server_id")?;
                let site_id = require_u64(&params, "site_id")?;
                let payload = InstallRepository {
                    provider: require_str(&params, "provider")?.to_string(),
                    repository: require_str(&params, "repository")?.to_string(),
                    branch: params["branch"].as_str().map(str::to_string),
                    composer: params["composer"].as_bool().unwrap_or(true),
                };
                let site = client
                    .install_git_repository(server_id, site_id, &payload)
                    .await?;
                ToolResult::json(&site)
            }
            Action::ObtainLetsEncryptCertificate => {
                let server_id = require_u64(&params, "server_id")?;
                let site_id = require_u64(&params, "site_id")?;
                let domains: Vec<String> = require_enum(&params, "domains")?;
                if domains.is_empty() {
                    return Err(ToolError::InvalidParams(
                        "domains must not be empty".to_string(),
                    ));
                }
                let certificate = client
                    .obtain_letsencrypt_certificate(server_id, site_id, &domains)
                    .await?;
                ToolResult::json(&json!({ "certificate": certificate }))
            }
            Action::ActivateCertificate => {
                let certificate_id = require_u64(&params, "certificate_id")?;
                client
                    .activate_certificate(
                        require_u64(&params, "server_id")?,
                        require_u64(&params, "site_id")?,
                        certificate_id,
                    )
                    .await?;
                ToolResult::json(&json!({ "activated": true, "certificate_id": certificate_id }))
            }
            Action::RestartWorker => {
                let worker_id = require_u64(&params, "worker_id")?;
                client
                    .restart_worker(
                        require_u64(&params, "server_id")?,
                        require_u64(&params, "site_id")?,
                        worker_id,
                    )
                    .await?;
                ToolResult::json(&json!({ "restarted": true, "worker_id": worker_id }))
            }
            Action::RestartDaemon => {
                let daemon_id = require_u64(&params, "daemon_id")?;
                client
                    .restart_daemon(require_u64(&params, "server_id")?, daemon_id)
                    .await?;
                ToolResult::json(&json!({ "restarted": true, "daemon_id": daemon_id }))
            }
            Action::RunRecipe => {
                let recipe_id = require_u64(&params, "recipe_id")?;
                let server_ids = require_ids(&params, "server_ids")?;
                let notify = params["notify"].as_bool().unwrap_or(false);
                client.run_recipe(recipe_id, &server_ids, notify).await?;
                ToolResult::json(&json!({
                    "recipe_id": recipe_id,
                    "servers": server_ids,
                    "started": true
                }))
            }
            Action::ManageService => {
                let server_id = require_u64(&params, "server_id")?;
                let service = require_str(&params, "service")?;
                let action: ServiceAction = require_enum(&params, "action")?;
                client.manage_service(server_id, action, service).await?;
                ToolResult::json(&json!({
                    "server_id": server_id,
                    "service": service,
                    "action": action
                }))
            }
            Action::ManageSiteIntegration => {
                let server_id = require_u64(&params, "server_id")?;
                let site_id = require_u64(&params, "site_id")?;
                let integration: Integration = require_enum(&params, "integration")?;
                let action: IntegrationAction = require_enum(&params, "action")?;

                // Reading the status is allowed in read-only sessions
                if action != IntegrationAction::Status
                    && !context.permissions.allows(Permission::Write)
                {
                    return Err(ToolError::PermissionDenied(format!(
                        "{} of {} requires the Write permission",
                        params["action"].as_str().unwrap_or("change"),
                        integration.slug()
                    )));
                }

                let options = params.get("options").filter(|o| o.is_object()).cloned();
                info!("{:?} {} on site {}", action, integration.slug(), site_id);
                let value = client
                    .manage_site_integration(server_id, site_id, integration, action, options)
                    .await?;
                ToolResult::json(&value)
            }
            Action::ListServerEvents => {
                let events = client.list_events(require_u64(&params, "server_id")?).await?;
                ToolResult::json(&json!({ "events": events }))
            }
        };

        Ok(result)
    }
}

pub fn action_tools() -> Vec<Arc<dyn MCPTool>> {
    Action::ALL
        .into_iter()
        .map(|action| Arc::new(ActionTool::new(action)) as Arc<dyn MCPTool>)
        .collect()
}
