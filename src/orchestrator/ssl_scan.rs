//! Fleet-wide certificate expiry scan.
//!
//! Site and certificate listings fan out with bounded concurrency; every
//! bucket is sorted before reporting so the output does not depend on
//! completion order.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;

use crate::forge::models::{Server, Site};
use crate::forge::{ForgeClient, ForgeError};
use crate::orchestrator::WorkflowError;
use crate::orchestrator::run::{Completed, StepError, StepOutcome, StepStatus, WorkflowRun};

pub const DEFAULT_DAYS_THRESHOLD: i64 = 30;
const MAX_DAYS_THRESHOLD: i64 = 365;
const HEALTHY_PREVIEW: usize = 10;
const SECONDS_PER_DAY: i64 = 86_400;

fn default_threshold() -> i64 {
    DEFAULT_DAYS_THRESHOLD
}

#[derive(Debug, Clone, Deserialize)]
pub struct SslScanParams {
    #[serde(default = "default_threshold")]
    pub days_threshold: i64,
    #[serde(default)]
    pub server_id: Option<u64>,
}

impl SslScanParams {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if !(0..=MAX_DAYS_THRESHOLD).contains(&self.days_threshold) {
            return Err(WorkflowError::InvalidParams(format!(
                "days_threshold must be between 0 and {}, got {}",
                MAX_DAYS_THRESHOLD, self.days_threshold
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryBucket {
    Expired,
    ExpiringSoon,
    Healthy,
}

/// Whole days from `now` until `expires_at`, rounded down
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (expires_at - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub fn classify(days_until_expiry: Option<i64>, threshold: i64) -> ExpiryBucket {
    match days_until_expiry {
        Some(days) if days < 0 => ExpiryBucket::Expired,
        Some(days) if days <= threshold => ExpiryBucket::ExpiringSoon,
        _ => ExpiryBucket::Healthy,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateExpiryRecord {
    pub server_id: u64,
    pub server_name: String,
    pub site_id: u64,
    pub site_name: String,
    pub certificate_id: u64,
    pub domain: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub days_until_expiry: Option<i64>,
}

impl CertificateExpiryRecord {
    fn sort_key(&self) -> (i64, u64, u64, u64) {
        (
            self.days_until_expiry.unwrap_or(i64::MAX),
            self.server_id,
            self.site_id,
            self.certificate_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_id: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SslSummary {
    pub servers_scanned: usize,
    pub sites_scanned: usize,
    pub certificates_checked: usize,
    pub expired: usize,
    pub expiring_soon: usize,
    pub healthy: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SslScanReport {
    pub success: bool,
    pub days_threshold: i64,
    pub summary: SslSummary,
    pub action_required: bool,
    pub expired: Vec<CertificateExpiryRecord>,
    pub expiring_soon: Vec<CertificateExpiryRecord>,
    pub healthy: Vec<CertificateExpiryRecord>,
    pub errors: Vec<ScanError>,
    pub steps: Vec<StepOutcome>,
}

pub async fn run(
    client: &ForgeClient,
    params: SslScanParams,
    concurrency: usize,
    now: DateTime<Utc>,
) -> SslScanReport {
    let mut run = WorkflowRun::new("ssl_scan");
    let concurrency = concurrency.max(1);
    let mut errors = Vec::new();

    let servers = run
        .step("list_servers", async {
            let servers = match params.server_id {
                Some(id) => client.get_server(id).await.map(|server| vec![server]),
                None => client.list_servers().await,
            };
            match servers {
                Ok(servers) => {
                    let message = format!("Found {} server(s)", servers.len());
                    Ok(Completed::new(servers, message))
                }
                Err(error) => Err(StepError::from(error)),
            }
        })
        .await;

    let servers = match servers {
        Some(servers) => servers,
        None => {
            errors.push(ScanError {
                server_id: params.server_id,
                site_id: None,
                message: run
                    .steps()
                    .last()
                    .map(|s| s.message.clone())
                    .unwrap_or_default(),
            });
            run.skip("scan_certificates", "list_servers");
            return finish(run, params.days_threshold, 0, 0, Vec::new(), errors);
        }
    };

    let timer = Instant::now();

    // Sites of every server. Each future owns its inputs so the stream stays Send.
    let site_results: Vec<(Server, Result<Vec<Site>, ForgeError>)> =
        stream::iter(servers)
            .map(|server| {
                let client = client.clone();
                async move {
                    let result = client.list_sites(server.id).await;
                    (server, result)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

    let mut servers_scanned = 0;
    let mut sites: Vec<(Server, Site)> = Vec::new();
    for (server, result) in site_results {
        match result {
            Ok(found) => {
                servers_scanned += 1;
                sites.extend(found.into_iter().map(|site| (server.clone(), site)));
            }
            Err(error) => errors.push(ScanError {
                server_id: Some(server.id),
                site_id: None,
                message: error.to_string(),
            }),
        }
    }

    // Certificates of every site
    let certificate_results: Vec<_> = stream::iter(sites)
        .map(|(server, site)| {
            let client = client.clone();
            async move {
                let result = client.list_certificates(server.id, site.id).await;
                (server, site, result)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    let mut records = Vec::new();
    let mut sites_scanned = 0;
    for (server, site, result) in certificate_results {
        match result {
            Ok(certificates) => {
                sites_scanned += 1;
                records.extend(certificates.into_iter().filter(|c| c.active).map(|cert| {
                    CertificateExpiryRecord {
                        server_id: server.id,
                        server_name: server.name.clone(),
                        site_id: site.id,
                        site_name: site.name.clone(),
                        certificate_id: cert.id,
                        domain: cert.domain,
                        expires_at: cert.expires_at,
                        days_until_expiry: cert.expires_at.map(|at| days_until(at, now)),
                    }
                }));
            }
            Err(error) => errors.push(ScanError {
                server_id: Some(server.id),
                site_id: Some(site.id),
                message: error.to_string(),
            }),
        }
    }

    errors.sort_by_key(|e| (e.server_id, e.site_id));
    let status = if errors.is_empty() {
        StepStatus::Success
    } else {
        StepStatus::Failed
    };
    run.record(
        "scan_certificates",
        status,
        format!(
            "Checked {} certificate(s) on {} site(s), {} error(s)",
            records.len(),
            sites_scanned,
            errors.len()
        ),
        Some(json!({ "errors": errors.len() })),
        timer.elapsed(),
    );

    finish(
        run,
        params.days_threshold,
        servers_scanned,
        sites_scanned,
        records,
        errors,
    )
}

fn finish(
    run: WorkflowRun,
    threshold: i64,
    servers_scanned: usize,
    sites_scanned: usize,
    records: Vec<CertificateExpiryRecord>,
    errors: Vec<ScanError>,
) -> SslScanReport {
    let certificates_checked = records.len();
    let mut expired = Vec::new();
    let mut expiring_soon = Vec::new();
    let mut healthy = Vec::new();
    for record in records {
        match classify(record.days_until_expiry, threshold) {
            ExpiryBucket::Expired => expired.push(record),
            ExpiryBucket::ExpiringSoon => expiring_soon.push(record),
            ExpiryBucket::Healthy => healthy.push(record),
        }
    }

    expired.sort_by_key(CertificateExpiryRecord::sort_key);
    expiring_soon.sort_by_key(CertificateExpiryRecord::sort_key);
    healthy.sort_by_key(|r| (r.server_id, r.site_id, r.certificate_id));

    let summary = SslSummary {
        servers_scanned,
        sites_scanned,
        certificates_checked,
        expired: expired.len(),
        expiring_soon: expiring_soon.len(),
        healthy: healthy.len(),
        errors: errors.len(),
    };
    healthy.truncate(HEALTHY_PREVIEW);

    SslScanReport {
        success: errors.is_empty(),
        days_threshold: threshold,
        summary,
        action_required: summary.expired > 0 || summary.expiring_soon > 0,
        expired,
        expiring_soon,
        healthy,
        errors,
        steps: run.finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forge::HttpMethod;
    use crate::forge::testing::ScriptedBackend;
    use chrono::{Duration, TimeZone};
    use serde_json::Value;
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn expiring_in(days: i64) -> Value {
        json!((now() + Duration::days(days) + Duration::hours(1)).to_rfc3339())
    }

    fn fleet() -> Arc<ScriptedBackend> {
        ScriptedBackend::new()
            .on(
                HttpMethod::Get,
                "/servers",
                json!({"servers": [{"id": 1, "name": "web-1"}, {"id": 2, "name": "web-2"}]}),
            )
            .on(
                HttpMethod::Get,
                "/servers/1/sites",
                json!({"sites": [{"id": 10, "name": "a.com"}, {"id": 11, "name": "b.com"}]}),
            )
            .on(
                HttpMethod::Get,
                "/servers/2/sites",
                json!({"sites": [{"id": 20, "name": "c.com"}]}),
            )
            .on(
                HttpMethod::Get,
                "/servers/1/sites/10/certificates",
                json!({"certificates": [
                    {"id": 100, "domain": "a.com", "active": true, "expires_at": expiring_in(20)},
                    {"id": 101, "domain": "old.a.com", "active": false, "expires_at": expiring_in(-50)}
                ]}),
            )
            .on(
                HttpMethod::Get,
                "/servers/1/sites/11/certificates",
                json!({"certificates": [
                    {"id": 110, "domain": "b.com", "active": true, "expires_at": expiring_in(1)},
                    {"id": 111, "domain": "www.b.com", "active": true, "expires_at": expiring_in(90)}
                ]}),
            )
            .on(
                HttpMethod::Get,
                "/servers/2/sites/20/certificates",
                json!({"certificates": [
                    {"id": 200, "domain": "c.com", "active": true, "expires_at": expiring_in(5)},
                    {"id": 201, "domain": "d.com", "active": true, "expires_at": expiring_in(-1)},
                    {"id": 202, "domain": "e.com", "active": true}
                ]}),
            )
    }

    fn params() -> SslScanParams {
        SslScanParams {
            days_threshold: 30,
            server_id: None,
        }
    }

    #[tokio::test]
    async fn test_buckets_are_sorted() {
        let report = run(&ForgeClient::new(fleet()), params(), 4, now()).await;

        assert!(report.success);
        assert!(report.action_required);
        let soon: Vec<i64> = report
            .expiring_soon
            .iter()
            .filter_map(|r| r.days_until_expiry)
            .collect();
        assert_eq!(soon, vec![1, 5, 20]);

        assert_eq!(report.expired.len(), 1);
        assert_eq!(report.expired[0].certificate_id, 201);

        // Inactive certificate 101 is ignored; 202 has no expiry date
        let healthy: Vec<u64> = report.healthy.iter().map(|r| r.certificate_id).collect();
        assert_eq!(healthy, vec![111, 202]);
        assert_eq!(report.summary.certificates_checked, 6);
        assert_eq!(report.summary.sites_scanned, 3);
        assert_eq!(report.summary.servers_scanned, 2);
    }

    #[tokio::test]
    async fn test_site_failure_is_reported_and_scan_continues() {
        let backend = ScriptedBackend::new()
            .on(
                HttpMethod::Get,
                "/servers",
                json!({"servers": [{"id": 1, "name": "web-1"}, {"id": 2, "name": "web-2"}]}),
            )
            .fail(
                HttpMethod::Get,
                "/servers/1/sites",
                ForgeError::from_response(500, ""),
            )
            .on(
                HttpMethod::Get,
                "/servers/2/sites",
                json!({"sites": [{"id": 20, "name": "c.com"}]}),
            )
            .on(
                HttpMethod::Get,
                "/servers/2/sites/20/certificates",
                json!({"certificates": [{"id": 200, "domain": "c.com", "active": true, "expires_at": expiring_in(5)}]}),
            );

        let report = run(&ForgeClient::new(backend), params(), 2, now()).await;

        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].server_id, Some(1));
        assert_eq!(report.errors[0].site_id, None);
        // Only the server whose sites could be listed counts as scanned
        assert_eq!(report.summary.servers_scanned, 1);
        assert_eq!(report.summary.sites_scanned, 1);
        assert_eq!(report.expiring_soon.len(), 1);
        assert!(report.action_required);
    }

    #[tokio::test]
    async fn test_certificate_failure_recorded_per_site() {
        let backend = ScriptedBackend::new()
            .on(HttpMethod::Get, "/servers/1", json!({"server": {"id": 1, "name": "web-1"}}))
            .on(
                HttpMethod::Get,
                "/servers/1/sites",
                json!({"sites": [{"id": 10, "name": "a.com"}, {"id": 11, "name": "b.com"}]}),
            )
            .fail(
                HttpMethod::Get,
                "/servers/1/sites/10/certificates",
                ForgeError::from_response(403, ""),
            )
            .on(
                HttpMethod::Get,
                "/servers/1/sites/11/certificates",
                json!({"certificates": [{"id": 110, "domain": "b.com", "active": true, "expires_at": expiring_in(40)}]}),
            );

        let params = SslScanParams {
            days_threshold: 30,
            server_id: Some(1),
        };
        let report = run(&ForgeClient::new(backend), params, 4, now()).await;

        assert!(!report.success);
        assert_eq!(
            report.errors,
            vec![ScanError {
                server_id: Some(1),
                site_id: Some(10),
                message: "Forge API returned 403: Forbidden".to_string()
            }]
        );
        assert_eq!(report.summary.sites_scanned, 1);
        assert_eq!(report.healthy.len(), 1);
        assert!(!report.action_required);
        assert_eq!(report.steps[1].status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_server_listing_failure_skips_scan() {
        let report = run(&ForgeClient::new(ScriptedBackend::new()), params(), 4, now()).await;

        assert!(!report.success);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].server_id, None);
        let encoded = serde_json::to_value(&report.errors[0]).unwrap();
        assert!(encoded.get("server_id").is_none());
        assert_eq!(report.steps[1].status, StepStatus::Skipped);
        assert_eq!(report.summary.servers_scanned, 0);
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let backend = fleet().with_delay(std::time::Duration::from_millis(20));
        let report = run(&ForgeClient::new(backend.clone()), params(), 2, now()).await;

        assert!(report.success);
        assert!(backend.max_in_flight() <= 2);
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(classify(Some(30), 30), ExpiryBucket::ExpiringSoon);
        assert_eq!(classify(Some(31), 30), ExpiryBucket::Healthy);
        assert_eq!(classify(Some(0), 30), ExpiryBucket::ExpiringSoon);
        assert_eq!(classify(Some(-1), 30), ExpiryBucket::Expired);
        assert_eq!(classify(None, 30), ExpiryBucket::Healthy);
    }

    #[test]
    fn test_days_round_down() {
        let base = now();
        assert_eq!(days_until(base + Duration::hours(23), base), 0);
        assert_eq!(days_until(base + Duration::hours(25), base), 1);
        assert_eq!(days_until(base - Duration::hours(1), base), -1);
    }

    #[test]
    fn test_threshold_range() {
        let bad = SslScanParams {
            days_threshold: 400,
            server_id: None,
        };
        assert!(bad.validate().is_err());
        assert!(params().validate().is_ok());
    }
}
