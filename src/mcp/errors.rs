use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::forge::ForgeError;
use crate::orchestrator::WorkflowError;

pub type MCPResult<T> = Result<T, MCPError>;

/// Main error type for MCP operations
#[derive(Debug, thiserror::Error)]
pub enum MCPError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Tool execution error: {0}")]
    ToolExecution(#[from] ToolError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport closed")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Failures raised while running a tool.
///
/// `Forge` and `ExecutionFailed` are reported to the client as `isError`
/// tool results; the rest become JSON-RPC errors.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Timeout: tool execution exceeded {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("{0}")]
    Forge(#[from] ForgeError),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<WorkflowError> for ToolError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::InvalidParams(msg) => ToolError::InvalidParams(msg),
            other => ToolError::Internal(other.to_string()),
        }
    }
}

impl ToolError {
    /// Whether this failure belongs in a tool result rather than a protocol error
    pub fn is_execution_failure(&self) -> bool {
        matches!(
            self,
            ToolError::Forge(_) | ToolError::ExecutionFailed(_) | ToolError::Timeout { .. }
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Server startup failed: {0}")]
    StartupFailed(String),
}

#[derive(Debug, Clone, Copy)]
pub enum JsonRpcErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,
    ServerError = -32000,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: JsonRpcErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code as i32,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<MCPError> for JsonRpcError {
    fn from(error: MCPError) -> Self {
        let code = match &error {
            MCPError::Protocol(ProtocolError::ParseError(_)) => JsonRpcErrorCode::ParseError,
            MCPError::Protocol(ProtocolError::InvalidMessage(_)) => JsonRpcErrorCode::InvalidRequest,
            MCPError::Protocol(ProtocolError::MethodNotFound(_))
            | MCPError::Server(ServerError::MethodNotFound(_)) => JsonRpcErrorCode::MethodNotFound,
            MCPError::Protocol(ProtocolError::InvalidParams(_))
            | MCPError::Server(ServerError::InvalidParams(_))
            | MCPError::Validation(_)
            | MCPError::ToolExecution(ToolError::NotFound(_))
            | MCPError::ToolExecution(ToolError::InvalidParams(_)) => JsonRpcErrorCode::InvalidParams,
            MCPError::ToolExecution(ToolError::PermissionDenied(_)) => JsonRpcErrorCode::ServerError,
            _ => JsonRpcErrorCode::InternalError,
        };
        JsonRpcError::new(code, error.to_string())
    }
}

impl From<ProtocolError> for JsonRpcError {
    fn from(error: ProtocolError) -> Self {
        MCPError::Protocol(error).into()
    }
}

impl From<ToolError> for JsonRpcError {
    fn from(error: ToolError) -> Self {
        MCPError::ToolExecution(error).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let unknown_method: JsonRpcError =
            MCPError::Server(ServerError::MethodNotFound("foo/bar".into())).into();
        assert_eq!(unknown_method.code, -32601);

        let unknown_tool: JsonRpcError = ToolError::NotFound("nope".into()).into();
        assert_eq!(unknown_tool.code, -32602);

        let parse: JsonRpcError = ProtocolError::ParseError("eof".into()).into();
        assert_eq!(parse.code, -32700);

        let denied: JsonRpcError = ToolError::PermissionDenied("write".into()).into();
        assert_eq!(denied.code, -32000);
    }

    #[test]
    fn test_execution_failures() {
        assert!(ToolError::Forge(ForgeError::from_response(422, "")).is_execution_failure());
        assert!(ToolError::Timeout { timeout_ms: 5 }.is_execution_failure());
        assert!(!ToolError::InvalidParams("x".into()).is_execution_failure());
    }

    #[test]
    fn test_workflow_errors_map_to_params() {
        let error: ToolError = WorkflowError::InvalidParams("bad".into()).into();
        assert!(matches!(error, ToolError::InvalidParams(_)));
    }
}
