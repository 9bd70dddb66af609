/// Model Context Protocol server for Laravel Forge
///
/// JSON-RPC 2.0 over newline-delimited stdio. Tools wrap the Forge client
/// and the workflow orchestrator; prompts are static templates.
pub mod errors;
pub mod prompts;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod transport;

pub use self::{server::MCPServer, tools::MCPTool, transport::MCPTransport};

/// MCP Protocol version implemented by this server
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server information
pub const SERVER_NAME: &str = "laravel-forge-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
