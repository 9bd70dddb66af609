//! Clone an existing site onto another (or the same) server.
//!
//! `get_source_site` and `create_site` gate everything else; the remaining
//! steps only need those two and never block each other.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::forge::ForgeClient;
use crate::forge::models::{CreateJob, CreateSite, CreateWorker, InstallRepository, Site};
use crate::orchestrator::WorkflowError;
use crate::orchestrator::run::{Completed, StepError, StepOutcome, StepSummary, WorkflowRun};

const NEXT_STEPS: [&str; 4] = [
    "Update the environment variables (.env) of the new site",
    "Create a database and database user if the site needs them",
    "Deploy the new site",
    "Point the DNS records of the new domain at the target server",
];

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CloneSiteParams {
    pub source_server_id: u64,
    pub source_site_id: u64,
    pub target_server_id: u64,
    pub new_domain: String,
    #[serde(default = "enabled")]
    pub clone_workers: bool,
    #[serde(default = "enabled")]
    pub clone_jobs: bool,
    #[serde(default = "enabled")]
    pub clone_ssl: bool,
}

impl CloneSiteParams {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        let domain = self.new_domain.trim();
        if domain.is_empty() || domain.chars().any(char::is_whitespace) {
            return Err(WorkflowError::InvalidParams(format!(
                "new_domain '{}' is not a valid domain",
                self.new_domain
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSite {
    pub server_id: u64,
    pub site_id: u64,
    pub domain: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneSiteReport {
    pub success: bool,
    pub summary: StepSummary,
    pub steps: Vec<StepOutcome>,
    pub new_site: Option<NewSite>,
    pub next_steps: Vec<String>,
}

pub async fn run(client: &ForgeClient, params: CloneSiteParams) -> CloneSiteReport {
    let mut run = WorkflowRun::new("clone_site");
    let new_domain = params.new_domain.trim().to_string();

    let source = run
        .step(
            "get_source_site",
            fetch_source(client, params.source_server_id, params.source_site_id),
        )
        .await;

    let created = match &source {
        Some(source) => {
            run.step(
                "create_site",
                create_target(client, params.target_server_id, source, &new_domain),
            )
            .await
        }
        None => {
            run.skip("create_site", "get_source_site");
            None
        }
    };

    // Whether the source has a repository is unknown when it could not be
    // fetched; the step is then recorded as skipped rather than omitted.
    let wants_git = source.as_ref().is_none_or(Site::has_repository);

    match (&source, &created) {
        (Some(source), Some(created)) => {
            let target = Target {
                server_id: params.target_server_id,
                site_id: created.id,
                domain: &new_domain,
            };

            if wants_git {
                run.step("install_git", install_git(client, source, &target))
                    .await;
            }
            run.step(
                "copy_deployment_script",
                copy_deployment_script(client, params.source_server_id, source, &target),
            )
            .await;
            if params.clone_workers {
                run.step(
                    "clone_workers",
                    clone_workers(client, params.source_server_id, source, &target),
                )
                .await;
            }
            if params.clone_jobs {
                run.step(
                    "clone_jobs",
                    clone_jobs(client, params.source_server_id, source, &target),
                )
                .await;
            }
            if params.clone_ssl {
                run.step("obtain_ssl", obtain_ssl(client, &target)).await;
            }
        }
        _ => {
            let blocker = if source.is_none() {
                "get_source_site"
            } else {
                "create_site"
            };
            let dependents = [
                ("install_git", wants_git),
                ("copy_deployment_script", true),
                ("clone_workers", params.clone_workers),
                ("clone_jobs", params.clone_jobs),
                ("obtain_ssl", params.clone_ssl),
            ];
            for (name, applicable) in dependents {
                if applicable {
                    run.skip(name, blocker);
                }
            }
        }
    }

    let success = run.succeeded();
    let summary = run.summary();
    CloneSiteReport {
        success,
        summary,
        steps: run.finish(),
        new_site: created.map(|site| NewSite {
            server_id: params.target_server_id,
            site_id: site.id,
            domain: site.name,
        }),
        next_steps: NEXT_STEPS.iter().map(|s| s.to_string()).collect(),
    }
}

struct Target<'a> {
    server_id: u64,
    site_id: u64,
    domain: &'a str,
}

/// Replace every occurrence of `from` with `to`, returning the replacement count
fn substitute_domain(text: &str, from: &str, to: &str) -> (String, usize) {
    if from.is_empty() {
        return (text.to_string(), 0);
    }
    (text.replace(from, to), text.matches(from).count())
}

async fn fetch_source(
    client: &ForgeClient,
    server_id: u64,
    site_id: u64,
) -> Result<Completed<Site>, StepError> {
    let site = client.get_site(server_id, site_id).await?;
    let message = format!("Fetched source site {}", site.name);
    Ok(Completed::new(site, message))
}

async fn create_target(
    client: &ForgeClient,
    server_id: u64,
    source: &Site,
    domain: &str,
) -> Result<Completed<Site>, StepError> {
    let site = client
        .create_site(server_id, &CreateSite::like(source, domain))
        .await?;
    let message = format!("Created site {} on server {}", site.name, server_id);
    let data = json!({ "site_id": site.id });
    Ok(Completed::new(site, message).with_data(data))
}

async fn install_git(
    client: &ForgeClient,
    source: &Site,
    target: &Target<'_>,
) -> Result<Completed<()>, StepError> {
    let payload = InstallRepository::from_site(source)
        .ok_or_else(|| StepError::new("Source site has no repository"))?;
    client
        .install_git_repository(target.server_id, target.site_id, &payload)
        .await?;
    Ok(Completed::new(
        (),
        format!("Installed repository {}", payload.repository),
    ))
}

async fn copy_deployment_script(
    client: &ForgeClient,
    source_server_id: u64,
    source: &Site,
    target: &Target<'_>,
) -> Result<Completed<()>, StepError> {
    let script = client
        .get_deployment_script(source_server_id, source.id)
        .await?;
    let (script, replacements) = substitute_domain(&script, &source.name, target.domain);
    client
        .update_deployment_script(target.server_id, target.site_id, &script, false)
        .await?;
    Ok(Completed::new((), "Copied deployment script")
        .with_data(json!({ "domain_replacements": replacements })))
}

async fn clone_workers(
    client: &ForgeClient,
    source_server_id: u64,
    source: &Site,
    target: &Target<'_>,
) -> Result<Completed<()>, StepError> {
    let workers = client.list_workers(source_server_id, source.id).await?;

    let mut cloned = 0;
    let mut errors = Vec::new();
    for worker in &workers {
        match client
            .create_worker(target.server_id, target.site_id, &CreateWorker::from(worker))
            .await
        {
            Ok(_) => cloned += 1,
            Err(error) => errors.push(json!({
                "worker_id": worker.id,
                "message": error.to_string(),
            })),
        }
    }

    let data = json!({ "cloned": cloned, "total": workers.len(), "errors": errors });
    if errors.is_empty() {
        Ok(Completed::new((), format!("Cloned {} worker(s)", cloned)).with_data(data))
    } else {
        Err(StepError::new(format!(
            "Cloned {} of {} worker(s)",
            cloned,
            workers.len()
        ))
        .with_data(data))
    }
}

async fn clone_jobs(
    client: &ForgeClient,
    source_server_id: u64,
    source: &Site,
    target: &Target<'_>,
) -> Result<Completed<()>, StepError> {
    let jobs = client.list_jobs(source_server_id).await?;
    let matching: Vec<_> = jobs
        .iter()
        .filter(|job| !source.name.is_empty() && job.command.contains(&source.name))
        .collect();

    let mut cloned = 0;
    let mut errors = Vec::new();
    for job in &matching {
        let (command, _) = substitute_domain(&job.command, &source.name, target.domain);
        match client
            .create_job(target.server_id, &CreateJob::like(job, command))
            .await
        {
            Ok(_) => cloned += 1,
            Err(error) => errors.push(json!({
                "job_id": job.id,
                "message": error.to_string(),
            })),
        }
    }

    let data = json!({ "cloned": cloned, "total": matching.len(), "errors": errors });
    if errors.is_empty() {
        Ok(Completed::new((), format!("Cloned {} scheduled job(s)", cloned)).with_data(data))
    } else {
        Err(StepError::new(format!(
            "Cloned {} of {} scheduled job(s)",
            cloned,
            matching.len()
        ))
        .with_data(data))
    }
}

async fn obtain_ssl(client: &ForgeClient, target: &Target<'_>) -> Result<Completed<()>, StepError> {
    let certificate = client
        .obtain_letsencrypt_certificate(target.server_id, target.site_id, &[target.domain.to_string()])
        .await?;
    Ok(Completed::new(
        (),
        format!("Requested Let's Encrypt certificate for {}", target.domain),
    )
    .with_data(json!({ "certificate_id": certificate.id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::testing::ScriptedBackend;
    use crate::forge::{ForgeError, HttpMethod};
    use crate::orchestrator::run::StepStatus;
    use serde_json::{Value, json};
    use std::sync::Arc;

    fn params() -> CloneSiteParams {
        CloneSiteParams {
            source_server_id: 1,
            source_site_id: 10,
            target_server_id: 2,
            new_domain: "b.com".to_string(),
            clone_workers: true,
            clone_jobs: true,
            clone_ssl: true,
        }
    }

    fn source_site() -> Value {
        json!({"site": {
            "id": 10,
            "name": "a.com",
            "directory": "/public",
            "project_type": "php",
            "repository": "acme/app",
            "repository_provider": "github",
            "repository_branch": "main",
            "status": "installed"
        }})
    }

    fn healthy_backend() -> Arc<ScriptedBackend> {
        ScriptedBackend::new()
            .on(HttpMethod::Get, "/servers/1/sites/10", source_site())
            .on(
                HttpMethod::Post,
                "/servers/2/sites",
                json!({"site": {"id": 42, "name": "b.com"}}),
            )
            .on(HttpMethod::Post, "/servers/2/sites/42/git", json!({"site": {"id": 42, "name": "b.com"}}))
            .on(
                HttpMethod::Get,
                "/servers/1/sites/10/deployment/script",
                Value::String("cd /home/forge/a.com\ngit pull origin main".to_string()),
            )
            .on(HttpMethod::Put, "/servers/2/sites/42/deployment/script", Value::Null)
            .on(
                HttpMethod::Get,
                "/servers/1/sites/10/workers",
                json!({"workers": [{"id": 3, "connection": "redis", "queue": "default", "daemon": 0}]}),
            )
            .on(
                HttpMethod::Post,
                "/servers/2/sites/42/workers",
                json!({"worker": {"id": 30, "connection": "redis"}}),
            )
            .on(
                HttpMethod::Get,
                "/servers/1/jobs",
                json!({"jobs": [
                    {"id": 5, "command": "php /home/forge/a.com/artisan schedule:run", "user": "forge", "frequency": "Minutely"},
                    {"id": 6, "command": "php /home/forge/other.com/artisan backup", "user": "forge", "frequency": "Nightly"}
                ]}),
            )
            .on(
                HttpMethod::Post,
                "/servers/2/jobs",
                json!({"job": {"id": 50, "command": "php /home/forge/b.com/artisan schedule:run"}}),
            )
            .on(
                HttpMethod::Post,
                "/servers/2/sites/42/certificates/letsencrypt",
                json!({"certificate": {"id": 77, "domain": "b.com"}}),
            )
    }

    fn step<'a>(report: &'a CloneSiteReport, name: &str) -> &'a StepOutcome {
        report
            .steps
            .iter()
            .find(|s| s.name == name)
            .unwrap_or_else(|| panic!("missing step {}", name))
    }

    #[tokio::test]
    async fn test_full_clone() {
        let backend = healthy_backend();
        let report = run(&ForgeClient::new(backend.clone()), params()).await;

        assert!(report.success);
        let names: Vec<&str> = report.steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "get_source_site",
                "create_site",
                "install_git",
                "copy_deployment_script",
                "clone_workers",
                "clone_jobs",
                "obtain_ssl"
            ]
        );
        assert_eq!(
            report.new_site,
            Some(NewSite {
                server_id: 2,
                site_id: 42,
                domain: "b.com".to_string()
            })
        );
        assert_eq!(report.next_steps.len(), 4);

        let calls = backend.calls();
        let script_write = calls
            .iter()
            .find(|(m, p, _)| *m == HttpMethod::Put && p.ends_with("/deployment/script"))
            .unwrap();
        assert_eq!(
            script_write.2.as_ref().unwrap()["content"],
            json!("cd /home/forge/b.com\ngit pull origin main")
        );

        // Only the job referencing the source domain is re-created
        assert_eq!(backend.calls_to(HttpMethod::Post, "/servers/2/jobs"), 1);
        let job_write = calls
            .iter()
            .find(|(m, p, _)| *m == HttpMethod::Post && p == "/servers/2/jobs")
            .unwrap();
        assert_eq!(
            job_write.2.as_ref().unwrap()["command"],
            json!("php /home/forge/b.com/artisan schedule:run")
        );
        assert_eq!(job_write.2.as_ref().unwrap()["frequency"], json!("minutely"));
    }

    #[tokio::test]
    async fn test_git_failure_does_not_block_other_steps() {
        let backend = ScriptedBackend::new()
            .on(HttpMethod::Get, "/servers/1/sites/10", source_site())
            .on(
                HttpMethod::Post,
                "/servers/2/sites",
                json!({"site": {"id": 42, "name": "b.com"}}),
            )
            .fail(
                HttpMethod::Post,
                "/servers/2/sites/42/git",
                ForgeError::from_response(422, r#"{"message":"Repository not found."}"#),
            )
            .on(
                HttpMethod::Get,
                "/servers/1/sites/10/deployment/script",
                Value::String("cd /home/forge/a.com".to_string()),
            )
            .on(HttpMethod::Put, "/servers/2/sites/42/deployment/script", Value::Null);

        let mut params = params();
        params.clone_workers = false;
        params.clone_jobs = false;
        params.clone_ssl = false;

        let report = run(&ForgeClient::new(backend), params).await;

        assert!(!report.success);
        assert_eq!(step(&report, "get_source_site").status, StepStatus::Success);
        assert_eq!(step(&report, "create_site").status, StepStatus::Success);
        assert_eq!(step(&report, "install_git").status, StepStatus::Failed);
        assert!(step(&report, "install_git").message.contains("422"));
        assert_eq!(step(&report, "copy_deployment_script").status, StepStatus::Success);
        assert_eq!(report.summary.total_steps, 4);
        assert_eq!(report.summary.failed, 1);
    }

    #[tokio::test]
    async fn test_create_failure_skips_dependents_without_calls() {
        let backend = ScriptedBackend::new()
            .on(HttpMethod::Get, "/servers/1/sites/10", source_site())
            .fail(
                HttpMethod::Post,
                "/servers/2/sites",
                ForgeError::from_response(422, r#"{"message":"The domain has already been taken."}"#),
            );

        let report = run(&ForgeClient::new(backend.clone()), params()).await;

        assert!(!report.success);
        assert!(report.new_site.is_none());
        assert_eq!(report.summary.total_steps, 7);
        assert_eq!(report.summary.skipped, 5);
        for name in ["install_git", "copy_deployment_script", "clone_workers", "clone_jobs", "obtain_ssl"] {
            let outcome = step(&report, name);
            assert_eq!(outcome.status, StepStatus::Skipped);
            assert_eq!(outcome.message, "skipped: prerequisite step create_site failed");
        }

        // Nothing beyond the source lookup and the failed create was sent
        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_source_failure_skips_everything_applicable() {
        let backend = ScriptedBackend::new();
        let mut params = params();
        params.clone_jobs = false;

        let report = run(&ForgeClient::new(backend.clone()), params).await;

        assert_eq!(step(&report, "get_source_site").status, StepStatus::Failed);
        assert_eq!(
            step(&report, "create_site").message,
            "skipped: prerequisite step get_source_site failed"
        );
        assert!(report.steps.iter().all(|s| s.name != "clone_jobs"));
        assert_eq!(report.summary.skipped, 5);
        assert!(!backend.wrote());
    }

    #[tokio::test]
    async fn test_partial_worker_clone_fails_step() {
        let backend = ScriptedBackend::new()
            .on(HttpMethod::Get, "/servers/1/sites/10", source_site())
            .on(
                HttpMethod::Post,
                "/servers/2/sites",
                json!({"site": {"id": 42, "name": "b.com"}}),
            )
            .on(HttpMethod::Post, "/servers/2/sites/42/git", Value::Null)
            .on(
                HttpMethod::Get,
                "/servers/1/sites/10/deployment/script",
                Value::String(String::new()),
            )
            .on(HttpMethod::Put, "/servers/2/sites/42/deployment/script", Value::Null)
            .on(
                HttpMethod::Get,
                "/servers/1/sites/10/workers",
                json!({"workers": [
                    {"id": 3, "connection": "redis"},
                    {"id": 4, "connection": "sqs"}
                ]}),
            )
            .on(
                HttpMethod::Post,
                "/servers/2/sites/42/workers",
                json!({"worker": {"id": 30, "connection": "redis"}}),
            )
            .fail(
                HttpMethod::Post,
                "/servers/2/sites/42/workers",
                ForgeError::from_response(500, ""),
            );

        let mut params = params();
        params.clone_jobs = false;
        params.clone_ssl = false;

        let report = run(&ForgeClient::new(backend.clone()), params).await;

        let workers = step(&report, "clone_workers");
        assert_eq!(workers.status, StepStatus::Failed);
        let data = workers.data.as_ref().unwrap();
        assert_eq!(data["cloned"], json!(1));
        assert_eq!(data["errors"][0]["worker_id"], json!(4));
        // Writes are not retried
        assert_eq!(backend.calls_to(HttpMethod::Post, "/servers/2/sites/42/workers"), 2);
    }

    #[test]
    fn test_substitute_domain() {
        assert_eq!(
            substitute_domain("a.com a.com x", "a.com", "b.com"),
            ("b.com b.com x".to_string(), 2)
        );
        assert_eq!(substitute_domain("abc", "", "b.com"), ("abc".to_string(), 0));
    }

    #[test]
    fn test_blank_domain_rejected() {
        let mut params = params();
        params.new_domain = "  ".to_string();
        assert!(params.validate().is_err());
    }
}
