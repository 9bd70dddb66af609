/// Typed views of the Forge entities the workflows read, plus request payloads.
///
/// Fields Forge does not always send are `Option`s. Anything that is present
/// but malformed (a non-numeric id, an unparseable expiry date) fails decoding
/// with `ForgeError::Decode` instead of defaulting silently.
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::forge::errors::{ForgeError, ForgeResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_ready: bool,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub php_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub server_id: Option<u64>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub repository_provider: Option<String>,
    #[serde(default)]
    pub repository_branch: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub php_version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub deployment_status: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl Site {
    pub fn is_installed(&self) -> bool {
        self.status.as_deref() == Some("installed")
    }

    pub fn has_repository(&self) -> bool {
        self.repository.as_deref().is_some_and(|r| !r.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: u64,
    pub domain: String,
    #[serde(default, rename = "type")]
    pub certificate_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub active: bool,
    #[serde(default, deserialize_with = "forge_datetime")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: u64,
    pub connection: String,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub sleep: Option<u64>,
    #[serde(default)]
    pub processes: Option<u32>,
    #[serde(default)]
    pub tries: Option<u32>,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub daemon: bool,
    #[serde(default)]
    pub php_version: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: u64,
    pub command: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: u64,
    #[serde(default, rename = "type")]
    pub monitor_type: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub threshold: Option<Value>,
    #[serde(default)]
    pub minutes: Option<u64>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEvent {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub server_id: Option<u64>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ran_as: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Daemon {
    pub id: u64,
    pub command: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub processes: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Payload for creating a site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateSite {
    pub domain: String,
    pub project_type: String,
    pub directory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
}

impl CreateSite {
    /// Mirror the shape of an existing site under a new domain
    pub fn like(source: &Site, domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            project_type: source
                .project_type
                .clone()
                .unwrap_or_else(|| "php".to_string()),
            directory: source
                .directory
                .clone()
                .unwrap_or_else(|| "/public".to_string()),
            php_version: source.php_version.clone(),
        }
    }
}

/// Payload for installing a git repository on a site
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallRepository {
    pub provider: String,
    pub repository: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub composer: bool,
}

impl InstallRepository {
    /// Repository settings of an existing site, if it has one
    pub fn from_site(site: &Site) -> Option<Self> {
        let repository = site.repository.clone().filter(|r| !r.trim().is_empty())?;
        Some(Self {
            provider: site
                .repository_provider
                .clone()
                .unwrap_or_else(|| "github".to_string()),
            repository,
            branch: site.repository_branch.clone(),
            composer: true,
        })
    }
}

/// Payload for creating a queue worker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateWorker {
    pub connection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sleep: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tries: Option<u32>,
    pub daemon: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub php_version: Option<String>,
}

impl From<&Worker> for CreateWorker {
    fn from(worker: &Worker) -> Self {
        Self {
            connection: worker.connection.clone(),
            queue: worker.queue.clone(),
            timeout: worker.timeout,
            sleep: worker.sleep,
            processes: worker.processes,
            tries: worker.tries,
            daemon: worker.daemon,
            php_version: worker.php_version.clone(),
        }
    }
}

/// Payload for creating a scheduled job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateJob {
    pub command: String,
    pub frequency: String,
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weekday: Option<String>,
}

impl CreateJob {
    /// Re-create an existing job with a different command, keeping its schedule.
    ///
    /// A five-field cron expression is carried over as a `custom` frequency;
    /// otherwise the named frequency is reused.
    pub fn like(job: &ScheduledJob, command: impl Into<String>) -> Self {
        let user = job.user.clone().unwrap_or_else(|| "forge".to_string());
        let cron_fields: Vec<&str> = job
            .cron
            .as_deref()
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default();

        if let [minute, hour, day, month, weekday] = cron_fields.as_slice() {
            return Self {
                command: command.into(),
                frequency: "custom".to_string(),
                user,
                minute: Some(minute.to_string()),
                hour: Some(hour.to_string()),
                day: Some(day.to_string()),
                month: Some(month.to_string()),
                weekday: Some(weekday.to_string()),
            };
        }

        Self {
            command: command.into(),
            frequency: job
                .frequency
                .as_deref()
                .map(|f| f.to_lowercase())
                .unwrap_or_else(|| "nightly".to_string()),
            user,
            minute: None,
            hour: None,
            day: None,
            month: None,
            weekday: None,
        }
    }
}

/// Decode a single entity
pub fn decode<T: DeserializeOwned>(resource: &'static str, value: Value) -> ForgeResult<T> {
    serde_json::from_value(value).map_err(|e| ForgeError::decode(resource, e.to_string()))
}

/// Decode a collection, reporting the offending index on failure
pub fn decode_list<T: DeserializeOwned>(resource: &'static str, value: Value) -> ForgeResult<Vec<T>> {
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(ForgeError::decode(
                resource,
                format!("expected a JSON array, got {}", json_kind(&other)),
            ));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|e| ForgeError::decode(resource, format!("item {}: {}", index, e)))
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Forge encodes some flags as 0/1 integers and others as booleans
fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(b),
        Some(Value::Number(n)) => Ok(n.as_i64().is_some_and(|n| n != 0)),
        Some(Value::String(s)) => match s.as_str() {
            "1" | "true" => Ok(true),
            "0" | "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid flag value '{}'", other))),
        },
        Some(other) => Err(serde::de::Error::custom(format!(
            "invalid flag value {}",
            other
        ))),
    }
}

/// Forge timestamps come as RFC 3339 or as `YYYY-MM-DD HH:MM:SS` in UTC
fn forge_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Ok(None);
    };

    parse_forge_datetime(&raw)
        .map(Some)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

pub fn parse_forge_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
