use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{error, info};

use laravel_forge_mcp::config::{ConfigArgs, ConfigError, LogArgs};
use laravel_forge_mcp::forge::{ForgeClient, ForgeError};
use laravel_forge_mcp::logging;
use laravel_forge_mcp::mcp::errors::MCPError;
use laravel_forge_mcp::mcp::server::{MCPServer, MCPServerConfig};
use laravel_forge_mcp::mcp::tools::{ToolRegistry, builtin_tools};
use laravel_forge_mcp::mcp::transport::StdioTransport;
use laravel_forge_mcp::orchestrator::{Orchestrator, WorkflowError};

#[derive(Parser)]
#[command(name = "forge-mcp")]
#[command(about = "MCP server for the Laravel Forge API", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    forge: ConfigArgs,

    #[command(flatten)]
    log: LogArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdin/stdout (default)
    Serve,

    /// List the tools the server registers
    Tools {
        /// Only show tools whose name or description contains this text
        #[arg(short, long)]
        search: Option<String>,

        /// Print the full tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one workflow and print its report
    Run {
        /// clone_site, bulk_deploy, health_check or ssl_scan
        #[arg(value_name = "WORKFLOW")]
        workflow: String,

        /// Workflow parameters as a JSON object
        #[arg(value_name = "PARAMS", default_value = "{}")]
        params: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create Forge client: {0}")]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Mcp(#[from] MCPError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let _log_guard = match logging::init_tracing(&cli.log) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(2);
        }
    };

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<bool, CliError> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cli.forge).await,
        Commands::Tools { search, json } => list_tools(search.as_deref(), json).await,
        Commands::Run { workflow, params } => run_workflow(cli.forge, &workflow, &params).await,
    }
}

fn orchestrator(args: ConfigArgs) -> Result<(Orchestrator, MCPServerConfig), CliError> {
    let config = args.into_config()?;
    info!("Forge settings: {:?}", config);
    let client = ForgeClient::from_config(&config)?;
    Ok((
        Orchestrator::new(client, config.scan_concurrency),
        MCPServerConfig::from_forge(&config),
    ))
}

async fn serve(args: ConfigArgs) -> Result<bool, CliError> {
    let (orchestrator, server_config) = orchestrator(args)?;
    let server = MCPServer::new(server_config, orchestrator).await?;
    info!("Starting MCP server on stdio");

    tokio::select! {
        result = server.handle_connection(Box::new(StdioTransport::new())) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
    }

    let stats = server.get_statistics().await;
    info!(
        "Served {} requests, {} tool calls ({} failed), {} errors",
        stats.total_requests,
        stats.total_tool_executions,
        stats.failed_tool_executions,
        stats.error_count
    );
    Ok(true)
}

async fn list_tools(search: Option<&str>, as_json: bool) -> Result<bool, CliError> {
    let registry = ToolRegistry::new();
    registry.register_all(builtin_tools()).await?;

    if as_json {
        let tools = match search {
            Some(query) => registry.search_tools(query).await,
            None => registry.list_tools().await,
        };
        println!("{}", serde_json::to_string_pretty(&tools)?);
        return Ok(true);
    }

    let query = search.map(str::to_lowercase);
    let summaries: Vec<_> = registry
        .summaries()
        .await
        .into_iter()
        .filter(|s| {
            query.as_deref().is_none_or(|q| {
                s.name.to_lowercase().contains(q) || s.description.to_lowercase().contains(q)
            })
        })
        .collect();

    for summary in &summaries {
        let permissions: Vec<String> = summary
            .required_permissions
            .iter()
            .map(|p| format!("{:?}", p).to_lowercase())
            .collect();
        println!(
            "{:<34} {:<13} {:<20} {}",
            summary.name,
            summary.category,
            permissions.join(","),
            summary.description
        );
    }
    println!("\n{} tool(s)", summaries.len());
    Ok(true)
}

async fn run_workflow(args: ConfigArgs, workflow: &str, params: &str) -> Result<bool, CliError> {
    let params: Value = serde_json::from_str(params)?;
    let (orchestrator, _) = orchestrator(args)?;

    let report = orchestrator.run_workflow(workflow, params).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(report["success"].as_bool().unwrap_or(false))
}
