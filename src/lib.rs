pub mod config;
pub mod forge;
pub mod logging;
pub mod mcp;
pub mod orchestrator;
