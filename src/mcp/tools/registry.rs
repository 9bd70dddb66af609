use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::mcp::errors::{MCPError, MCPResult};
use crate::mcp::tools::{
    ExecutionContext, ExecutionMetadata, MCPTool, Permission, SessionPermissions, ToolCategory,
    ToolError, ToolResult,
};

/// Tool registry for managing and executing MCP tools
pub struct ToolRegistry {
    /// Registered tools indexed by name, kept sorted for listing
    tools: Arc<RwLock<BTreeMap<String, Arc<RegisteredTool>>>>,

    /// Tool execution statistics
    statistics: Arc<RwLock<BTreeMap<String, ToolStatistics>>>,

    config: ToolRegistryConfig,
}

struct RegisteredTool {
    tool: Arc<dyn MCPTool>,
    schema: JSONSchema,
}

/// Tool information for MCP client discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Inspector view of a tool, used by the `tools` command
#[derive(Debug, Clone, Serialize)]
pub struct ToolSummary {
    pub name: String,
    pub category: ToolCategory,
    pub version: String,
    pub required_permissions: Vec<Permission>,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolStatistics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub total_execution_time: Duration,
}

impl ToolStatistics {
    pub fn average_execution_time(&self) -> Duration {
        match u32::try_from(self.total_executions) {
            Ok(0) | Err(_) => Duration::ZERO,
            Ok(count) => self.total_execution_time / count,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolRegistryConfig {
    /// Upper bound for one tool call unless the tool overrides it
    pub default_timeout: Duration,

    /// Whether to validate tool parameters against schema
    pub validate_parameters: bool,
}

impl Default for ToolRegistryConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(300),
            validate_parameters: true,
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_config(ToolRegistryConfig::default())
    }

    pub fn with_config(config: ToolRegistryConfig) -> Self {
        Self {
            tools: Arc::new(RwLock::new(BTreeMap::new())),
            statistics: Arc::new(RwLock::new(BTreeMap::new())),
            config,
        }
    }

    /// Register a new tool
    pub async fn register_tool(&self, tool: Arc<dyn MCPTool>) -> MCPResult<()> {
        let name = tool.name().to_string();
        debug!("Registering tool: {}", name);

        let schema = self.validate_tool(tool.as_ref()).await?;

        let mut tools = self.tools.write().await;
        if tools.contains_key(&name) {
            return Err(MCPError::Validation(format!(
                "Tool '{}' is already registered",
                name
            )));
        }
        tools.insert(name, Arc::new(RegisteredTool { tool, schema }));
        Ok(())
    }

    pub async fn register_all(&self, tools: Vec<Arc<dyn MCPTool>>) -> MCPResult<()> {
        for tool in tools {
            self.register_tool(tool).await?;
        }
        Ok(())
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// All tools, sorted by name
    pub async fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools
            .read()
            .await
            .values()
            .map(|entry| tool_info(entry.tool.as_ref()))
            .collect()
    }

    /// Case-insensitive substring match on name or description
    pub async fn search_tools(&self, query: &str) -> Vec<ToolInfo> {
        let query = query.to_lowercase();

        self.tools
            .read()
            .await
            .values()
            .filter(|entry| {
                entry.tool.name().to_lowercase().contains(&query)
                    || entry.tool.description().to_lowercase().contains(&query)
            })
            .map(|entry| tool_info(entry.tool.as_ref()))
            .collect()
    }

    pub async fn summaries(&self) -> Vec<ToolSummary> {
        self.tools
            .read()
            .await
            .values()
            .map(|entry| ToolSummary {
                name: entry.tool.name().to_string(),
                category: entry.tool.category(),
                version: entry.tool.version().to_string(),
                required_permissions: entry.tool.required_permissions(),
                description: entry.tool.description().to_string(),
            })
            .collect()
    }

    /// Execute a tool with given parameters and context
    pub async fn execute_tool(
        &self,
        name: &str,
        params: Value,
        context: &mut ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let start_time = Instant::now();
        let execution_id = Uuid::new_v4().to_string();

        let entry = self
            .tools
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        debug!("Executing tool: {} with ID: {}", name, execution_id);

        let result = self.run_checked(&entry, params, context).await.map(|mut result| {
            result.metadata = Some(ExecutionMetadata {
                tool_name: name.to_string(),
                execution_id,
                duration_ms: start_time.elapsed().as_millis() as u64,
            });
            result
        });

        let succeeded = matches!(&result, Ok(r) if !r.is_error);
        if let Err(e) = &result {
            warn!("Tool {} failed: {}", name, e);
        }
        self.update_statistics(name, succeeded, start_time.elapsed())
            .await;

        result
    }

    /// Argument and permission checks, then the call itself under the tool's time limit
    async fn run_checked(
        &self,
        entry: &RegisteredTool,
        params: Value,
        context: &mut ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let params = if params.is_null() {
            Value::Object(Default::default())
        } else {
            params
        };

        if self.config.validate_parameters {
            validate_against_schema(&entry.schema, &params)?;
            entry.tool.validate_params(&params)?;
        }

        check_permissions(entry.tool.as_ref(), &context.permissions)?;

        match entry.tool.timeout(self.config.default_timeout) {
            Some(limit) => tokio::time::timeout(limit, entry.tool.execute(params, context))
                .await
                .map_err(|_| ToolError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => entry.tool.execute(params, context).await,
        }
    }

    pub async fn get_tool_statistics(&self, name: &str) -> Option<ToolStatistics> {
        self.statistics.read().await.get(name).cloned()
    }

    pub async fn get_all_statistics(&self) -> BTreeMap<String, ToolStatistics> {
        self.statistics.read().await.clone()
    }

    /// Validate a tool before registration and compile its schema
    async fn validate_tool(&self, tool: &dyn MCPTool) -> MCPResult<JSONSchema> {
        let name = tool.name();
        if name.is_empty() {
            return Err(MCPError::Validation("Tool name cannot be empty".to_string()));
        }

        let schema = tool.input_schema();
        if !schema.is_object() {
            return Err(MCPError::Validation(format!(
                "Input schema of '{}' must be a JSON object",
                name
            )));
        }

        JSONSchema::compile(&schema).map_err(|e| {
            MCPError::Validation(format!("Input schema of '{}' is invalid: {}", name, e))
        })
    }

    async fn update_statistics(&self, tool_name: &str, succeeded: bool, elapsed: Duration) {
        let mut stats = self.statistics.write().await;
        let tool_stats = stats.entry(tool_name.to_string()).or_default();

        tool_stats.total_executions += 1;
        if succeeded {
            tool_stats.successful_executions += 1;
        } else {
            tool_stats.failed_executions += 1;
        }
        tool_stats.total_execution_time += elapsed;
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn tool_info(tool: &dyn MCPTool) -> ToolInfo {
    ToolInfo {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        input_schema: tool.input_schema(),
    }
}

fn validate_against_schema(schema: &JSONSchema, params: &Value) -> Result<(), ToolError> {
    if let Err(errors) = schema.validate(params) {
        let messages: Vec<String> = errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        return Err(ToolError::InvalidParams(messages.join("; ")));
    }
    Ok(())
}

/// Check if session has required permissions for tool
fn check_permissions(
    tool: &dyn MCPTool,
    session_permissions: &SessionPermissions,
) -> Result<(), ToolError> {
    for permission in tool.required_permissions() {
        if !session_permissions.allows(permission) {
            info!("Refusing {}: missing {:?} permission", tool.name(), permission);
            return Err(ToolError::PermissionDenied(format!(
                "{} requires the {:?} permission",
                tool.name(),
                permission
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::testing::ScriptedBackend;
    use crate::mcp::tools::test_support::context;
    use crate::mcp::tools::{Content, ToolResultBuilder};
    use async_trait::async_trait;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl MCPTool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo a message back"
        }

        fn input_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string" }
                },
                "required": ["message"]
            })
        }

        async fn execute(
            &self,
            params: Value,
            _context: &mut ExecutionContext,
        ) -> Result<ToolResult, ToolError> {
            let message = params["message"].as_str().unwrap_or_default();
            Ok(ToolResult::success().with_content(Content::Text {
                text: message.to_string(),
            }))
        }
    }

    struct WipeTool;

    #[async_trait]
    impl MCPTool for WipeTool {
        fn name(&self) -> &str {
            "wipe"
        }

        fn description(&self) -> &str {
            "Needs destructive access"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        fn required_permissions(&self) -> Vec<Permission> {
            vec![Permission::Destructive]
        }

        async fn execute(
            &self,
            _params: Value,
            _context: &mut ExecutionContext,
        ) -> Result<ToolResult, ToolError> {
            Ok(ToolResult::text("wiped"))
        }
    }

    struct SlowTool;

    #[async_trait]
    impl MCPTool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "Never finishes in time"
        }

        fn input_schema(&self) -> Value {
            json!({ "type": "object" })
        }

        async fn execute(
            &self,
            _params: Value,
            _context: &mut ExecutionContext,
        ) -> Result<ToolResult, ToolError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::text("late"))
        }
    }

    #[tokio::test]
    async fn test_tool_registration() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(WipeTool)).await.unwrap();
        registry.register_tool(Arc::new(EchoTool)).await.unwrap();

        let tools = registry.list_tools().await;
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "wipe"]);

        let duplicate = registry.register_tool(Arc::new(EchoTool)).await;
        assert!(matches!(duplicate, Err(MCPError::Validation(_))));
    }

    #[tokio::test]
    async fn test_tool_search() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).await.unwrap();

        assert_eq!(registry.search_tools("MESSAGE").await.len(), 1);
        assert_eq!(registry.search_tools("nonexistent").await.len(), 0);
    }

    #[tokio::test]
    async fn test_schema_validation_rejects_bad_arguments() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(EchoTool)).await.unwrap();
        let mut ctx = context(ScriptedBackend::new());

        let missing = registry.execute_tool("echo", json!({}), &mut ctx).await;
        assert!(matches!(missing, Err(ToolError::InvalidParams(_))));

        let wrong_type = registry
            .execute_tool("echo", json!({"message": 3}), &mut ctx)
            .await;
        assert!(matches!(wrong_type, Err(ToolError::InvalidParams(_))));

        let ok = registry
            .execute_tool("echo", json!({"message": "hi"}), &mut ctx)
            .await
            .unwrap();
        assert_eq!(ok.first_text(), Some("hi"));
        assert_eq!(ok.metadata.as_ref().map(|m| m.tool_name.as_str()), Some("echo"));

        let stats = registry.get_tool_statistics("echo").await.unwrap();
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful_executions, 1);
        assert_eq!(stats.failed_executions, 2);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry = ToolRegistry::new();
        let mut ctx = context(ScriptedBackend::new());
        let result = registry.execute_tool("missing", json!({}), &mut ctx).await;
        assert!(matches!(result, Err(ToolError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_only_session_is_refused() {
        let registry = ToolRegistry::new();
        registry.register_tool(Arc::new(WipeTool)).await.unwrap();
        let mut ctx = context(ScriptedBackend::new());
        ctx.permissions = SessionPermissions::read_only();

        let result = registry.execute_tool("wipe", json!({}), &mut ctx).await;
        assert!(matches!(result, Err(ToolError::PermissionDenied(_))));

        let stats = registry.get_tool_statistics("wipe").await.unwrap();
        assert_eq!(stats.total_executions, 1);
        assert_eq!(stats.failed_executions, 1);
    }

    #[tokio::test]
    async fn test_timeout() {
        let registry = ToolRegistry::with_config(ToolRegistryConfig {
            default_timeout: Duration::from_millis(20),
            validate_parameters: true,
        });
        registry.register_tool(Arc::new(SlowTool)).await.unwrap();
        let mut ctx = context(ScriptedBackend::new());

        let result = registry.execute_tool("slow", Value::Null, &mut ctx).await;
        assert!(matches!(result, Err(ToolError::Timeout { timeout_ms: 20 })));
    }
}
