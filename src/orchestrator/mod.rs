//! Multi-step Forge workflows.
//!
//! Each workflow runs its steps in a fixed order against a [`ForgeClient`],
//! records one [`StepOutcome`] per step and keeps going after failures.
//! Remote failures end up in the report; [`WorkflowError`] is only returned
//! for bad input, before any request is made.

pub mod bulk_deploy;
pub mod clone_site;
pub mod health_check;
pub mod run;
pub mod ssl_scan;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::forge::ForgeClient;

pub use run::{StepOutcome, StepStatus, StepSummary, WorkflowRun};

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("Invalid workflow parameters: {0}")]
    InvalidParams(String),

    #[error("Failed to encode workflow report: {0}")]
    Report(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    CloneSite,
    BulkDeploy,
    HealthCheck,
    SslScan,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 4] = [
        WorkflowKind::CloneSite,
        WorkflowKind::BulkDeploy,
        WorkflowKind::HealthCheck,
        WorkflowKind::SslScan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            WorkflowKind::CloneSite => "clone_site",
            WorkflowKind::BulkDeploy => "bulk_deploy",
            WorkflowKind::HealthCheck => "health_check",
            WorkflowKind::SslScan => "ssl_scan",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkflowKind {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(s.to_string()))
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    client: ForgeClient,
    scan_concurrency: usize,
}

impl Orchestrator {
    pub fn new(client: ForgeClient, scan_concurrency: usize) -> Self {
        Self {
            client,
            scan_concurrency: scan_concurrency.max(1),
        }
    }

    pub fn client(&self) -> &ForgeClient {
        &self.client
    }

    /// Run a workflow by name and return its JSON report
    pub async fn run_workflow(&self, name: &str, params: Value) -> Result<Value, WorkflowError> {
        match name.parse::<WorkflowKind>()? {
            WorkflowKind::CloneSite => {
                let params: clone_site::CloneSiteParams = parse_params(params)?;
                params.validate()?;
                to_report(clone_site::run(&self.client, params).await)
            }
            WorkflowKind::BulkDeploy => {
                let params: bulk_deploy::BulkDeployParams = parse_params(params)?;
                params.validate()?;
                to_report(bulk_deploy::run(&self.client, params).await)
            }
            WorkflowKind::HealthCheck => {
                let params: health_check::HealthCheckParams = parse_params(params)?;
                to_report(health_check::run(&self.client, params).await)
            }
            WorkflowKind::SslScan => {
                let params: ssl_scan::SslScanParams = parse_params(params)?;
                params.validate()?;
                to_report(
                    ssl_scan::run(&self.client, params, self.scan_concurrency, Utc::now()).await,
                )
            }
        }
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, WorkflowError> {
    // Missing params are treated like an empty object so defaults apply
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| WorkflowError::InvalidParams(e.to_string()))
}

fn to_report<R: Serialize>(report: R) -> Result<Value, WorkflowError> {
    serde_json::to_value(report).map_err(|e| WorkflowError::Report(e.to_string()))
}
