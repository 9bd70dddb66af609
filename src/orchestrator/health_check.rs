//! Aggregate server health from Forge's view of one server.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::forge::models::{Daemon, Monitor, Server, ServerEvent, Site, Worker};
use crate::forge::{ForgeClient, ForgeResult};
use crate::orchestrator::run::{Completed, StepError, StepOutcome, WorkflowRun};

const PREVIEW_LIMIT: usize = 5;

/// Site id Forge treats as "every site" when listing workers
const ALL_SITES: u64 = 0;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckParams {
    pub server_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchError {
    pub resource: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthSummary {
    pub sites: usize,
    pub installed_sites: usize,
    pub monitors: usize,
    pub daemons: usize,
    pub workers: usize,
    pub recent_events: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub success: bool,
    pub health_status: HealthStatus,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub server: Option<Server>,
    pub summary: HealthSummary,
    pub monitors: Vec<Monitor>,
    pub recent_events: Vec<ServerEvent>,
    pub fetch_errors: Vec<FetchError>,
    pub steps: Vec<StepOutcome>,
}

/// Findings derived from fetched state; a pure function of its inputs
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
}

pub fn assess(server: Option<&Server>, monitors: &[Monitor], sites: &[Site]) -> Assessment {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    if !server.is_some_and(|s| s.is_ready) {
        issues.push("Server is not ready".to_string());
    }
    if monitors.is_empty() {
        warnings.push("No monitors configured".to_string());
    }
    if !sites.is_empty() && !sites.iter().any(Site::is_installed) {
        warnings.push("Some sites are not fully installed".to_string());
    }

    let status = if !issues.is_empty() {
        HealthStatus::Critical
    } else if !warnings.is_empty() {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    };

    Assessment {
        status,
        issues,
        warnings,
    }
}

pub async fn run(client: &ForgeClient, params: HealthCheckParams) -> HealthReport {
    let mut run = WorkflowRun::new("health_check");
    let mut fetch_errors = Vec::new();
    let server_id = params.server_id;

    let server = run
        .step("get_server", async {
            match client.get_server(server_id).await {
                Ok(server) => {
                    let message = format!("Fetched server {}", server.name);
                    Ok(Completed::new(server, message))
                }
                Err(error) => Err(StepError::from(error)),
            }
        })
        .await;
    if server.is_none() {
        fetch_errors.push(FetchError {
            resource: "server",
            message: last_message(&run),
        });
    }

    let monitors = fetch_collection(
        &mut run,
        &mut fetch_errors,
        "monitors",
        client.list_monitors(server_id),
    )
    .await;
    let events = fetch_collection(
        &mut run,
        &mut fetch_errors,
        "events",
        client.list_events(server_id),
    )
    .await;
    let sites = fetch_collection(&mut run, &mut fetch_errors, "sites", client.list_sites(server_id)).await;
    let daemons: Vec<Daemon> = fetch_collection(
        &mut run,
        &mut fetch_errors,
        "daemons",
        client.list_daemons(server_id),
    )
    .await;
    let workers: Vec<Worker> = fetch_collection(
        &mut run,
        &mut fetch_errors,
        "workers",
        client.list_workers(server_id, ALL_SITES),
    )
    .await;

    let assessment = assess(server.as_ref(), &monitors, &sites);
    let summary = HealthSummary {
        sites: sites.len(),
        installed_sites: sites.iter().filter(|s| s.is_installed()).count(),
        monitors: monitors.len(),
        daemons: daemons.len(),
        workers: workers.len(),
        recent_events: events.len(),
    };

    HealthReport {
        success: run.succeeded(),
        health_status: assessment.status,
        issues: assessment.issues,
        warnings: assessment.warnings,
        server,
        summary,
        monitors: monitors.into_iter().take(PREVIEW_LIMIT).collect(),
        recent_events: events.into_iter().take(PREVIEW_LIMIT).collect(),
        fetch_errors,
        steps: run.finish(),
    }
}

/// Fetch one collection as a step; a failure degrades to an empty collection
async fn fetch_collection<T, F>(
    run: &mut WorkflowRun,
    fetch_errors: &mut Vec<FetchError>,
    resource: &'static str,
    fetch: F,
) -> Vec<T>
where
    F: std::future::Future<Output = ForgeResult<Vec<T>>>,
{
    let step_name = format!("list_{}", resource);
    let fetched = run
        .step(&step_name, async {
            match fetch.await {
                Ok(items) => {
                    let count = items.len();
                    let message = format!("Fetched {} {}", count, resource);
                    Ok(Completed::new(items, message).with_data(json!({ "count": count })))
                }
                Err(error) => Err(StepError::from(error)),
            }
        })
        .await;

    match fetched {
        Some(items) => items,
        None => {
            fetch_errors.push(FetchError {
                resource,
                message: last_message(run),
            });
            Vec::new()
        }
    }
}

fn last_message(run: &WorkflowRun) -> String {
    run.steps()
        .last()
        .map(|s| s.message.clone())
        .unwrap_or_default()
}
