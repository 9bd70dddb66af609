use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use crate::mcp::tools::{
    ExecutionContext, MCPTool, Permission, ToolCategory, ToolError, ToolResult, id_property,
};
use crate::orchestrator::WorkflowKind;

/// Exposes one orchestrated workflow as a tool.
///
/// The workflow report is returned as-is, including when some steps failed;
/// its `success` flag and per-step outcomes carry the details.
pub struct WorkflowTool {
    kind: WorkflowKind,
}

impl WorkflowTool {
    pub fn new(kind: WorkflowKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl MCPTool for WorkflowTool {
    fn name(&self) -> &str {
        match self.kind {
            WorkflowKind::CloneSite => "clone_site",
            WorkflowKind::BulkDeploy => "bulk_deploy",
            WorkflowKind::HealthCheck => "server_health_check",
            WorkflowKind::SslScan => "check_ssl_expiration",
        }
    }

    fn description(&self) -> &str {
        match self.kind {
            WorkflowKind::CloneSite => {
                "Clone a site to a new domain, optionally on another server: creates the site, installs the same repository, copies the deployment script, re-creates queue workers and scheduled jobs and requests a Let's Encrypt certificate. Returns a step-by-step report"
            }
            WorkflowKind::BulkDeploy => {
                "Trigger deployments for several sites at once and report which ones were triggered"
            }
            WorkflowKind::HealthCheck => {
                "Aggregate the health of a server from its status, monitors, recent events, sites, daemons and workers"
            }
            WorkflowKind::SslScan => {
                "Scan certificates across all servers (or one) and report expired and soon-to-expire ones"
            }
        }
    }

    fn input_schema(&self) -> Value {
        match self.kind {
            WorkflowKind::CloneSite => json!({
                "type": "object",
                "properties": {
                    "source_server_id": id_property("Server hosting the site to clone"),
                    "source_site_id": id_property("Site to clone"),
                    "target_server_id": id_property("Server receiving the clone"),
                    "new_domain": { "type": "string", "minLength": 1 },
                    "clone_workers": { "type": "boolean", "default": true },
                    "clone_jobs": { "type": "boolean", "default": true },
                    "clone_ssl": { "type": "boolean", "default": true }
                },
                "required": ["source_server_id", "source_site_id", "target_server_id", "new_domain"]
            }),
            WorkflowKind::BulkDeploy => json!({
                "type": "object",
                "properties": {
                    "deployments": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "server_id": id_property("Forge server id"),
                                "site_id": id_property("Forge site id")
                            },
                            "required": ["server_id", "site_id"]
                        }
                    }
                },
                "required": ["deployments"]
            }),
            WorkflowKind::HealthCheck => json!({
                "type": "object",
                "properties": {
                    "server_id": id_property("Forge server id")
                },
                "required": ["server_id"]
            }),
            WorkflowKind::SslScan => json!({
                "type": "object",
                "properties": {
                    "days_threshold": {
                        "type": "integer",
                        "minimum": 0,
                        "maximum": 365,
                        "default": 30,
                        "description": "Certificates expiring within this many days need attention"
                    },
                    "server_id": id_property("Limit the scan to one server")
                }
            }),
        }
    }

    fn required_permissions(&self) -> Vec<Permission> {
        match self.kind {
            WorkflowKind::CloneSite | WorkflowKind::BulkDeploy => vec![Permission::Write],
            WorkflowKind::HealthCheck | WorkflowKind::SslScan => vec![Permission::Read],
        }
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Workflows
    }

    // Each Forge request is already bounded; cutting a run short would drop
    // the report of steps that already wrote.
    fn timeout(&self, _default: Duration) -> Option<Duration> {
        None
    }

    async fn execute(
        &self,
        params: Value,
        context: &mut ExecutionContext,
    ) -> Result<ToolResult, ToolError> {
        let report = context
            .orchestrator
            .run_workflow(self.kind.name(), params)
            .await?;
        Ok(ToolResult::json(&report))
    }
}

pub fn workflow_tools() -> Vec<Arc<dyn MCPTool>> {
    WorkflowKind::ALL
        .into_iter()
        .map(|kind| Arc::new(WorkflowTool::new(kind)) as Arc<dyn MCPTool>)
        .collect()
}
