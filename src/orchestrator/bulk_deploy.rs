use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;

use crate::forge::ForgeClient;
use crate::orchestrator::WorkflowError;
use crate::orchestrator::run::{StepOutcome, StepStatus, WorkflowRun};

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeploymentTarget {
    pub server_id: u64,
    pub site_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeployParams {
    pub deployments: Vec<DeploymentTarget>,
}

impl BulkDeployParams {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.deployments.is_empty() {
            return Err(WorkflowError::InvalidParams(
                "deployments must contain at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Triggered,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentEntry {
    pub server_id: u64,
    pub site_id: u64,
    pub site_name: Option<String>,
    pub status: DeploymentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeploySummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkDeployReport {
    pub success: bool,
    pub summary: DeploySummary,
    pub deployments: Vec<DeploymentEntry>,
    pub steps: Vec<StepOutcome>,
}

/// Trigger deployments one entry at a time; a failing entry never stops the rest
pub async fn run(client: &ForgeClient, params: BulkDeployParams) -> BulkDeployReport {
    let mut run = WorkflowRun::new("bulk_deploy");
    let mut deployments = Vec::with_capacity(params.deployments.len());

    for target in &params.deployments {
        let timer = Instant::now();
        let entry = deploy_one(client, *target).await;

        let name = format!("deploy_{}_{}", target.server_id, target.site_id);
        let data = Some(json!({ "server_id": target.server_id, "site_id": target.site_id }));
        match entry.status {
            DeploymentStatus::Triggered => run.record(
                &name,
                StepStatus::Success,
                format!(
                    "Deployment triggered for {}",
                    entry.site_name.as_deref().unwrap_or("site")
                ),
                data,
                timer.elapsed(),
            ),
            DeploymentStatus::Failed => run.record(
                &name,
                StepStatus::Failed,
                entry.error.clone().unwrap_or_default(),
                data,
                timer.elapsed(),
            ),
        }
        deployments.push(entry);
    }

    let successful = deployments
        .iter()
        .filter(|d| d.status == DeploymentStatus::Triggered)
        .count();
    let summary = DeploySummary {
        total: deployments.len(),
        successful,
        failed: deployments.len() - successful,
    };

    BulkDeployReport {
        success: summary.failed == 0,
        summary,
        deployments,
        steps: run.finish(),
    }
}

async fn deploy_one(client: &ForgeClient, target: DeploymentTarget) -> DeploymentEntry {
    let failed = |site_name: Option<String>, error: String| DeploymentEntry {
        server_id: target.server_id,
        site_id: target.site_id,
        site_name,
        status: DeploymentStatus::Failed,
        error: Some(error),
    };

    let site = match client.get_site(target.server_id, target.site_id).await {
        Ok(site) => site,
        Err(error) => return failed(None, format!("Site lookup failed: {}", error)),
    };

    match client.deploy_site(target.server_id, target.site_id).await {
        Ok(_) => DeploymentEntry {
            server_id: target.server_id,
            site_id: target.site_id,
            site_name: Some(site.name),
            status: DeploymentStatus::Triggered,
            error: None,
        },
        Err(error) => failed(Some(site.name), format!("Deployment failed: {}", error)),
    }
}
