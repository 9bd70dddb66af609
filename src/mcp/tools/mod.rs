/// MCP tools: the trait every tool implements, its result type and the
/// permission model the registry enforces.
pub mod actions;
pub mod registry;
pub mod resources;
pub mod workflows;

pub use self::registry::{ToolInfo, ToolRegistry};
pub use crate::mcp::errors::ToolError;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::forge::ForgeClient;
use crate::orchestrator::Orchestrator;

#[async_trait]
pub trait MCPTool: Send + Sync {
    /// Unique tool name
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the `arguments` object
    fn input_schema(&self) -> Value;

    async fn execute(&self, params: Value, context: &mut ExecutionContext) -> Result<ToolResult, ToolError>;

    fn required_permissions(&self) -> Vec<Permission> {
        vec![Permission::Read]
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::General
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    /// Time limit for one call given the registry default. `None` runs the
    /// call to completion.
    fn timeout(&self, default: Duration) -> Option<Duration> {
        Some(default)
    }

    /// Checks beyond the JSON schema, run before `execute`
    fn validate_params(&self, _params: &Value) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Everything a tool may touch while running
#[derive(Clone)]
pub struct ExecutionContext {
    pub session_id: String,
    pub forge: ForgeClient,
    pub orchestrator: Orchestrator,
    pub permissions: SessionPermissions,
}

impl ExecutionContext {
    pub fn new(orchestrator: Orchestrator, permissions: SessionPermissions) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            forge: orchestrator.client().clone(),
            orchestrator,
            permissions,
        }
    }
}

/// Result of a `tools/call`, in MCP wire shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<Content>,
    #[serde(rename = "isError")]
    pub is_error: bool,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExecutionMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Content {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub tool_name: String,
    pub execution_id: String,
    pub duration_ms: u64,
}

pub trait ToolResultBuilder {
    fn success() -> ToolResult;
    fn failure(error: impl Into<String>) -> ToolResult;
    fn with_content(self, content: Content) -> ToolResult;
}

impl ToolResultBuilder for ToolResult {
    fn success() -> ToolResult {
        ToolResult {
            content: Vec::new(),
            is_error: false,
            metadata: None,
        }
    }

    fn failure(error: impl Into<String>) -> ToolResult {
        ToolResult {
            content: vec![Content::Text { text: error.into() }],
            is_error: true,
            metadata: None,
        }
    }

    fn with_content(mut self, content: Content) -> ToolResult {
        self.content.push(content);
        self
    }
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self::success().with_content(Content::Text { text: text.into() })
    }

    /// Pretty-printed JSON payload
    pub fn json(value: &Value) -> Self {
        let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
        Self::text(text)
    }

    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().map(|Content::Text { text }| text.as_str()).next()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Servers,
    Sites,
    Deployments,
    Certificates,
    Databases,
    Workers,
    Security,
    Monitoring,
    Workflows,
    General,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToolCategory::Servers => "servers",
            ToolCategory::Sites => "sites",
            ToolCategory::Deployments => "deployments",
            ToolCategory::Certificates => "certificates",
            ToolCategory::Databases => "databases",
            ToolCategory::Workers => "workers",
            ToolCategory::Security => "security",
            ToolCategory::Monitoring => "monitoring",
            ToolCategory::Workflows => "workflows",
            ToolCategory::General => "general",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Read Forge state
    Read,
    /// Create or change infrastructure
    Write,
    /// Delete resources or reboot servers
    Destructive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPermissions {
    pub granted_permissions: HashSet<Permission>,
}

impl SessionPermissions {
    pub fn full() -> Self {
        Self {
            granted_permissions: [Permission::Read, Permission::Write, Permission::Destructive]
                .into_iter()
                .collect(),
        }
    }

    pub fn read_only() -> Self {
        Self {
            granted_permissions: [Permission::Read].into_iter().collect(),
        }
    }

    pub fn for_mode(read_only: bool) -> Self {
        if read_only {
            Self::read_only()
        } else {
            Self::full()
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        self.granted_permissions.contains(&permission)
    }
}

impl Default for SessionPermissions {
    fn default() -> Self {
        Self::full()
    }
}

/// Every tool the server exposes: generic resource tools, actions and workflows
pub fn builtin_tools() -> Vec<Arc<dyn MCPTool>> {
    let mut tools = resources::resource_tools();
    tools.extend(actions::action_tools());
    tools.extend(workflows::workflow_tools());
    tools
}

// Argument helpers shared by the tool modules

pub(crate) fn require_u64(params: &Value, key: &str) -> Result<u64, ToolError> {
    params[key]
        .as_u64()
        .ok_or_else(|| ToolError::InvalidParams(format!("{} is required", key)))
}

pub(crate) fn require_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    params[key]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidParams(format!("{} is required", key)))
}

pub(crate) fn id_property(description: &str) -> Value {
    serde_json::json!({ "type": "integer", "minimum": 1, "description": description })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::forge::testing::ScriptedBackend;

    pub fn context(backend: Arc<ScriptedBackend>) -> ExecutionContext {
        let orchestrator = Orchestrator::new(ForgeClient::new(backend), 4);
        ExecutionContext::new(orchestrator, SessionPermissions::full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_wire_shape() {
        let result = ToolResult::json(&json!({"ok": true}));
        let encoded = serde_json::to_value(&result).unwrap();
        assert_eq!(encoded["isError"], json!(false));
        assert_eq!(encoded["content"][0]["type"], json!("text"));
        assert!(encoded.get("_meta").is_none());

        let failure = serde_json::to_value(ToolResult::failure("boom")).unwrap();
        assert_eq!(failure["isError"], json!(true));
        assert_eq!(failure["content"][0]["text"], json!("boom"));
    }

    #[test]
    fn test_read_only_permissions() {
        let permissions = SessionPermissions::for_mode(true);
        assert!(permissions.allows(Permission::Read));
        assert!(!permissions.allows(Permission::Write));
        assert!(!permissions.allows(Permission::Destructive));
        assert!(SessionPermissions::default().allows(Permission::Destructive));
    }

    #[test]
    fn test_argument_helpers() {
        let params = json!({"server_id": 3, "name": " ", "domain": "a.com"});
        assert_eq!(require_u64(&params, "server_id").unwrap(), 3);
        assert!(require_u64(&params, "site_id").is_err());
        assert!(require_str(&params, "name").is_err());
        assert_eq!(require_str(&params, "domain").unwrap(), "a.com");
    }
}
