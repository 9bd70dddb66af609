use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::mcp::errors::{JsonRpcError, MCPError, MCPResult, ProtocolError};

const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 envelope for every MCP message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MCPMessage {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone)]
pub struct MCPRequest {
    pub id: Value,
    pub method: String,
    pub params: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct MCPNotification {
    pub method: String,
    pub params: Option<Value>,
}

impl MCPMessage {
    fn empty() -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: None,
            params: None,
            result: None,
            error: None,
        }
    }

    pub fn request(id: Value, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id),
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    pub fn response(id: Value, result: Value) -> Self {
        Self {
            id: Some(id),
            result: Some(result),
            ..Self::empty()
        }
    }

    /// Error response; `id` is `null` when the request id could not be read
    pub fn error_response(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            id: Some(id.unwrap_or(Value::Null)),
            error: Some(error),
            ..Self::empty()
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
            ..Self::empty()
        }
    }

    pub fn is_request(&self) -> bool {
        self.method.is_some() && self.id.is_some()
    }

    pub fn is_notification(&self) -> bool {
        self.method.is_some() && self.id.is_none()
    }

    pub fn is_response(&self) -> bool {
        self.method.is_none() && self.id.is_some() && (self.result.is_some() || self.error.is_some())
    }

    pub fn validate(&self) -> MCPResult<()> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(invalid(format!(
                "Invalid JSON-RPC version: {}",
                self.jsonrpc
            )));
        }

        if self.method.is_some() {
            if self.result.is_some() || self.error.is_some() {
                return Err(invalid("Requests and notifications cannot carry result or error"));
            }
        } else if self.is_response() {
            if self.result.is_some() && self.error.is_some() {
                return Err(invalid("Response cannot have both result and error"));
            }
        } else {
            return Err(invalid(
                "Message is neither a request, a response nor a notification",
            ));
        }

        Ok(())
    }

    pub fn as_request(&self) -> MCPResult<MCPRequest> {
        match (&self.id, &self.method) {
            (Some(id), Some(method)) => Ok(MCPRequest {
                id: id.clone(),
                method: method.clone(),
                params: self.params.clone(),
            }),
            _ => Err(invalid("Message is not a request")),
        }
    }

    pub fn as_notification(&self) -> MCPResult<MCPNotification> {
        match (&self.id, &self.method) {
            (None, Some(method)) => Ok(MCPNotification {
                method: method.clone(),
                params: self.params.clone(),
            }),
            _ => Err(invalid("Message is not a notification")),
        }
    }
}

fn invalid(message: impl Into<String>) -> MCPError {
    MCPError::Protocol(ProtocolError::InvalidMessage(message.into()))
}

/// `initialize` parameters. Clients vary in what they send, so all fields are optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializeParams {
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
    #[serde(default)]
    pub capabilities: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListChanged {
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerCapabilities {
    pub tools: ListChanged,
    pub prompts: ListChanged,
    pub resources: ListChanged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// `tools/call` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// `prompts/get` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    pub name: String,
    #[serde(default)]
    pub arguments: HashMap<String, String>,
}

/// Newline-delimited JSON-RPC framing
pub struct MessageParser;

impl MessageParser {
    pub fn parse_message(data: &[u8]) -> MCPResult<MCPMessage> {
        let message: MCPMessage = serde_json::from_slice(data)
            .map_err(|e| MCPError::Protocol(ProtocolError::ParseError(e.to_string())))?;
        message.validate()?;
        Ok(message)
    }

    /// One line of output, without the trailing newline
    pub fn serialize_message(message: &MCPMessage) -> MCPResult<Vec<u8>> {
        Ok(serde_json::to_vec(message)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_message() {
        let message = MessageParser::parse_message(
            br#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#,
        )
        .unwrap();
        assert!(message.is_request());
        let request = message.as_request().unwrap();
        assert_eq!(request.id, json!(7));
        assert_eq!(request.method, "tools/list");
    }

    #[test]
    fn test_notification_message() {
        let message = MessageParser::parse_message(
            br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .unwrap();
        assert!(message.is_notification());
        assert!(message.as_request().is_err());
    }

    #[test]
    fn test_invalid_messages() {
        assert!(matches!(
            MessageParser::parse_message(b"{not json"),
            Err(MCPError::Protocol(ProtocolError::ParseError(_)))
        ));
        assert!(matches!(
            MessageParser::parse_message(br#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#),
            Err(MCPError::Protocol(ProtocolError::InvalidMessage(_)))
        ));
        assert!(MessageParser::parse_message(br#"{"jsonrpc":"2.0","id":1}"#).is_err());
    }

    #[test]
    fn test_error_response_uses_null_id() {
        let message = MCPMessage::error_response(
            None,
            JsonRpcError::new(crate::mcp::errors::JsonRpcErrorCode::ParseError, "bad"),
        );
        let encoded = String::from_utf8(MessageParser::serialize_message(&message).unwrap()).unwrap();
        assert!(encoded.contains(r#""id":null"#));
        assert!(encoded.contains("-32700"));
    }
}
