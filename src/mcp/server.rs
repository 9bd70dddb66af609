/// MCP server: reads JSON-RPC requests from a transport, dispatches them to
/// the tool registry or prompt library and writes the responses back.
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ForgeConfig;
use crate::mcp::{
    MCP_PROTOCOL_VERSION, SERVER_NAME, SERVER_VERSION,
    errors::{JsonRpcError, MCPError, MCPResult, ServerError},
    prompts::PromptLibrary,
    protocol::{
        InitializeParams, InitializeResult, ListChanged, MCPMessage, MCPNotification, MCPRequest,
        PromptGetParams, ServerCapabilities, ServerInfo, ToolCallParams,
    },
    tools::{
        ExecutionContext, SessionPermissions, ToolRegistry, ToolResult, ToolResultBuilder,
        builtin_tools, registry::ToolRegistryConfig,
    },
    transport::MCPTransport,
};
use crate::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct MCPServerConfig {
    /// Upper bound for a single tool call
    pub tool_timeout: Duration,

    /// Only grant the Read permission to sessions
    pub read_only: bool,
}

impl Default for MCPServerConfig {
    fn default() -> Self {
        Self {
            tool_timeout: Duration::from_secs(300),
            read_only: false,
        }
    }
}

impl MCPServerConfig {
    pub fn from_forge(config: &ForgeConfig) -> Self {
        Self {
            read_only: config.read_only,
            ..Self::default()
        }
    }
}

pub struct MCPServer {
    config: MCPServerConfig,
    tool_registry: Arc<ToolRegistry>,
    prompts: PromptLibrary,
    orchestrator: Orchestrator,
    stats: Arc<Mutex<ServerStatistics>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStatistics {
    pub total_messages: u64,
    pub total_requests: u64,
    pub total_tool_executions: u64,
    pub failed_tool_executions: u64,
    pub error_count: u64,
}

impl MCPServer {
    pub async fn new(config: MCPServerConfig, orchestrator: Orchestrator) -> MCPResult<Self> {
        let tool_registry = Arc::new(ToolRegistry::with_config(ToolRegistryConfig {
            default_timeout: config.tool_timeout,
            validate_parameters: true,
        }));
        Self::register_builtin_tools(&tool_registry).await?;

        Ok(Self {
            config,
            tool_registry,
            prompts: PromptLibrary::new(),
            orchestrator,
            stats: Arc::new(Mutex::new(ServerStatistics::default())),
        })
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.tool_registry
    }

    /// Fresh context for one client connection
    pub fn session_context(&self) -> ExecutionContext {
        ExecutionContext::new(
            self.orchestrator.clone(),
            SessionPermissions::for_mode(self.config.read_only),
        )
    }

    /// Serve one client until its input closes
    pub async fn handle_connection(&self, mut transport: Box<dyn MCPTransport>) -> MCPResult<()> {
        let mut context = self.session_context();
        let start_time = Instant::now();
        info!("Client connected (session {})", context.session_id);

        loop {
            match transport.receive().await {
                Ok(message) => {
                    if let Err(e) = self
                        .handle_message(message, transport.as_mut(), &mut context)
                        .await
                    {
                        error!("Error handling message: {}", e);
                        self.stats.lock().await.error_count += 1;
                    }
                }
                Err(MCPError::Protocol(e)) => {
                    // The request id is unknown when the line could not be read
                    self.stats.lock().await.error_count += 1;
                    let response = MCPMessage::error_response(None, JsonRpcError::from(e));
                    transport.send(response).await?;
                }
                Err(MCPError::Transport(e)) => {
                    debug!("Connection closed: {}", e);
                    break;
                }
                Err(e) => {
                    error!("Transport error: {}", e);
                    break;
                }
            }

            if !transport.is_connected() {
                break;
            }
        }

        transport.close().await?;
        info!(
            "Client disconnected (session {}, {:?})",
            context.session_id,
            start_time.elapsed()
        );
        Ok(())
    }

    async fn handle_message(
        &self,
        message: MCPMessage,
        transport: &mut dyn MCPTransport,
        context: &mut ExecutionContext,
    ) -> MCPResult<()> {
        self.stats.lock().await.total_messages += 1;

        if message.is_request() {
            let request = message.as_request()?;
            let response = self.handle_request(request, context).await;
            transport.send(response).await?;
        } else if message.is_notification() {
            self.handle_notification(message.as_notification()?);
        } else {
            warn!("Ignoring unexpected response message from client");
        }

        Ok(())
    }

    /// Answer one request; failures become JSON-RPC error responses
    pub async fn handle_request(
        &self,
        request: MCPRequest,
        context: &mut ExecutionContext,
    ) -> MCPMessage {
        self.stats.lock().await.total_requests += 1;
        debug!("Request {}: {}", request.id, request.method);

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_tool_call(request.params, context).await,
            "prompts/list" => Ok(self.prompts.list()),
            "prompts/get" => self.handle_get_prompt(request.params),
            "resources/list" => Ok(json!({ "resources": [] })),
            _ => Err(MCPError::Server(ServerError::MethodNotFound(
                request.method.clone(),
            ))),
        };

        match response {
            Ok(result) => MCPMessage::response(request.id, result),
            Err(error) => {
                warn!("Request {} failed: {}", request.method, error);
                self.stats.lock().await.error_count += 1;
                MCPMessage::error_response(Some(request.id), JsonRpcError::from(error))
            }
        }
    }

    fn handle_notification(&self, notification: MCPNotification) {
        // Nothing to do for notifications/initialized, cancellations and the like
        debug!("Notification: {}", notification.method);
    }

    fn handle_initialize(&self, params: Option<Value>) -> MCPResult<Value> {
        if let Some(params) = params {
            let init: InitializeParams = serde_json::from_value(params)
                .map_err(|e| MCPError::Server(ServerError::InvalidParams(e.to_string())))?;
            info!(
                "Initialize from {} (protocol {})",
                init.client_info
                    .as_ref()
                    .map(|c| c.name.as_str())
                    .unwrap_or("unknown client"),
                init.protocol_version.as_deref().unwrap_or("unspecified")
            );
        }

        let mode = if self.config.read_only {
            "Read-only mode: only tools that read Forge state are allowed."
        } else {
            "Write and destructive tools are enabled; confirm with the user before changing infrastructure."
        };

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ListChanged::default(),
                prompts: ListChanged::default(),
                resources: ListChanged::default(),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            instructions: Some(format!(
                "Manage Laravel Forge servers and sites. Workflow tools (clone_site, bulk_deploy, server_health_check, check_ssl_expiration) return step-by-step reports. {}",
                mode
            )),
        };

        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> MCPResult<Value> {
        let tools = self.tool_registry.list_tools().await;
        Ok(json!({ "tools": tools }))
    }

    async fn handle_tool_call(
        &self,
        params: Option<Value>,
        context: &mut ExecutionContext,
    ) -> MCPResult<Value> {
        let params = params.ok_or_else(|| {
            MCPError::Server(ServerError::InvalidParams("Missing parameters".to_string()))
        })?;
        let call: ToolCallParams = serde_json::from_value(params)
            .map_err(|e| MCPError::Server(ServerError::InvalidParams(e.to_string())))?;

        self.stats.lock().await.total_tool_executions += 1;

        let result = match self
            .tool_registry
            .execute_tool(&call.name, call.arguments.unwrap_or(Value::Null), context)
            .await
        {
            Ok(result) => result,
            // Remote and runtime failures are reported to the model, not the client
            Err(e) if e.is_execution_failure() => ToolResult::failure(e.to_string()),
            Err(e) => {
                self.stats.lock().await.failed_tool_executions += 1;
                return Err(MCPError::ToolExecution(e));
            }
        };

        if result.is_error {
            self.stats.lock().await.failed_tool_executions += 1;
        }

        Ok(serde_json::to_value(result)?)
    }

    fn handle_get_prompt(&self, params: Option<Value>) -> MCPResult<Value> {
        let params = params.ok_or_else(|| {
            MCPError::Server(ServerError::InvalidParams("Missing parameters".to_string()))
        })?;
        let request: PromptGetParams = serde_json::from_value(params)
            .map_err(|e| MCPError::Server(ServerError::InvalidParams(e.to_string())))?;
        self.prompts.get(&request.name, &request.arguments)
    }

    async fn register_builtin_tools(registry: &ToolRegistry) -> MCPResult<()> {
        registry.register_all(builtin_tools()).await?;

        info!("Registered {} tools", registry.tool_count().await);
        Ok(())
    }

    pub async fn get_statistics(&self) -> ServerStatistics {
        self.stats.lock().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::testing::ScriptedBackend;
    use crate::forge::{ForgeClient, ForgeError, HttpMethod};
    use crate::mcp::transport::StdioTransport;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    async fn server(backend: Arc<ScriptedBackend>, read_only: bool) -> MCPServer {
        let orchestrator = Orchestrator::new(ForgeClient::new(backend), 4);
        MCPServer::new(
            MCPServerConfig {
                read_only,
                ..MCPServerConfig::default()
            },
            orchestrator,
        )
        .await
        .unwrap()
    }

    fn request(id: u64, method: &str, params: Value) -> MCPRequest {
        MCPRequest {
            id: json!(id),
            method: method.to_string(),
            params: Some(params),
        }
    }

    #[tokio::test]
    async fn test_initialize() {
        let server = server(ScriptedBackend::new(), false).await;
        let mut ctx = server.session_context();

        let response = server
            .handle_request(
                request(1, "initialize", json!({"protocolVersion": "2024-11-05", "capabilities": {}})),
                &mut ctx,
            )
            .await;

        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], json!(MCP_PROTOCOL_VERSION));
        assert_eq!(result["serverInfo"]["name"], json!(SERVER_NAME));
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_list_is_sorted_and_complete() {
        let server = server(ScriptedBackend::new(), false).await;
        let mut ctx = server.session_context();

        let response = server
            .handle_request(request(2, "tools/list", json!({})), &mut ctx)
            .await;
        let result = response.result.unwrap();
        let names: Vec<&str> = result["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();

        assert_eq!(names.len(), 96);
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        for expected in ["clone_site", "check_ssl_expiration", "list_servers", "manage_service"] {
            assert!(names.contains(&expected), "{} missing", expected);
        }
        assert!(result["tools"][0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tool_call_success() {
        let backend = ScriptedBackend::new().on(
            HttpMethod::Get,
            "/servers",
            json!({"servers": [{"id": 1, "name": "web-1"}]}),
        );
        let server = server(backend, false).await;
        let mut ctx = server.session_context();

        let response = server
            .handle_request(
                request(3, "tools/call", json!({"name": "list_servers", "arguments": {}})),
                &mut ctx,
            )
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], json!(false));
        assert!(result["content"][0]["text"].as_str().unwrap().contains("web-1"));
    }

    #[tokio::test]
    async fn test_forge_failure_is_a_tool_error_result() {
        let backend = ScriptedBackend::new().fail(
            HttpMethod::Post,
            "/servers/1/reboot",
            ForgeError::from_response(500, "{\"message\":\"boom\"}"),
        );
        let server = server(backend, false).await;
        let mut ctx = server.session_context();

        let response = server
            .handle_request(
                request(4, "tools/call", json!({"name": "reboot_server", "arguments": {"server_id": 1}})),
                &mut ctx,
            )
            .await;
        assert!(response.error.is_none());
        assert_eq!(response.result.unwrap()["isError"], json!(true));
        assert_eq!(server.get_statistics().await.failed_tool_executions, 1);
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let server = server(ScriptedBackend::new(), true).await;
        let mut ctx = server.session_context();

        let unknown_tool = server
            .handle_request(request(5, "tools/call", json!({"name": "nope"})), &mut ctx)
            .await;
        assert_eq!(unknown_tool.error.unwrap().code, -32602);

        let bad_args = server
            .handle_request(
                request(6, "tools/call", json!({"name": "get_server", "arguments": {}})),
                &mut ctx,
            )
            .await;
        assert_eq!(bad_args.error.unwrap().code, -32602);

        let refused = server
            .handle_request(
                request(7, "tools/call", json!({"name": "reboot_server", "arguments": {"server_id": 1}})),
                &mut ctx,
            )
            .await;
        assert_eq!(refused.error.unwrap().code, -32000);

        let unknown_method = server
            .handle_request(request(8, "sessions/create", json!({})), &mut ctx)
            .await;
        let error = unknown_method.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(unknown_method.id, Some(json!(8)));
    }

    #[tokio::test]
    async fn test_prompts() {
        let server = server(ScriptedBackend::new(), false).await;
        let mut ctx = server.session_context();

        let listed = server
            .handle_request(request(9, "prompts/list", json!({})), &mut ctx)
            .await;
        assert_eq!(listed.result.unwrap()["prompts"].as_array().unwrap().len(), 4);

        let rendered = server
            .handle_request(
                request(
                    10,
                    "prompts/get",
                    json!({"name": "deploy_site", "arguments": {"server_id": "1", "site_id": "2"}}),
                ),
                &mut ctx,
            )
            .await;
        let result = rendered.result.unwrap();
        assert_eq!(result["messages"][0]["role"], json!("user"));

        let missing = server
            .handle_request(
                request(11, "prompts/get", json!({"name": "deploy_site", "arguments": {}})),
                &mut ctx,
            )
            .await;
        assert_eq!(missing.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_connection_over_stdio_lines() {
        let (mut client_in, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_out) = tokio::io::duplex(64 * 1024);
        let transport = Box::new(StdioTransport::with_io(server_in, server_out));
        let server = server(ScriptedBackend::new(), false).await;

        client_in
            .write_all(
                concat!(
                    "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
                    "garbage\n",
                    "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
                )
                .as_bytes(),
            )
            .await
            .unwrap();
        drop(client_in);

        server.handle_connection(transport).await.unwrap();

        let mut lines = BufReader::new(client_out).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], Value::Null);
        assert_eq!(first["error"]["code"], json!(-32700));

        let second: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(second["id"], json!(1));
        assert_eq!(second["result"], json!({}));

        let stats = server.get_statistics().await;
        assert_eq!(stats.total_messages, 2);
        assert_eq!(stats.total_requests, 1);
    }
}
