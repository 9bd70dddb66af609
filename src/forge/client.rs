use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::config::ForgeConfig;
use crate::forge::errors::{ForgeError, ForgeResult};
use crate::forge::http::HttpBackend;
use crate::forge::models::{
    Certificate, CreateJob, CreateSite, CreateWorker, Daemon, InstallRepository, Monitor,
    ScheduledJob, Server, ServerEvent, Site, Worker, decode, decode_list,
};
use crate::forge::resources::{Operation, Parents, Resource};
use crate::forge::{ForgeBackend, HttpMethod};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

/// First-party Laravel integrations Forge manages per site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Integration {
    Horizon,
    Octane,
    Reverb,
    Pulse,
    Inertia,
    Maintenance,
    Scheduler,
}

impl Integration {
    pub const ALL: [Integration; 7] = [
        Integration::Horizon,
        Integration::Octane,
        Integration::Reverb,
        Integration::Pulse,
        Integration::Inertia,
        Integration::Maintenance,
        Integration::Scheduler,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Integration::Horizon => "horizon",
            Integration::Octane => "octane",
            Integration::Reverb => "reverb",
            Integration::Pulse => "pulse",
            Integration::Inertia => "inertia",
            Integration::Maintenance => "laravel-maintenance",
            Integration::Scheduler => "laravel-scheduler",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationAction {
    Status,
    Enable,
    Disable,
}

/// Typed facade over a [`ForgeBackend`]
#[derive(Clone)]
pub struct ForgeClient {
    backend: Arc<dyn ForgeBackend>,
}

impl ForgeClient {
    pub fn new(backend: Arc<dyn ForgeBackend>) -> Self {
        Self { backend }
    }

    pub fn from_config(config: &ForgeConfig) -> ForgeResult<Self> {
        Ok(Self::new(Arc::new(HttpBackend::new(config)?)))
    }

    async fn call(&self, method: HttpMethod, path: &str, body: Option<Value>) -> ForgeResult<Value> {
        self.backend.send(method, path, body).await
    }

    fn ensure_supported(resource: Resource, operation: Operation) -> ForgeResult<()> {
        if resource.supports(operation) {
            Ok(())
        } else {
            Err(ForgeError::InvalidRequest(format!(
                "{} does not support {:?}",
                resource.label(),
                operation
            )))
        }
    }

    // Generic resource operations

    /// List a resource collection, unwrapped from its envelope
    pub async fn list(&self, resource: Resource, parents: &Parents) -> ForgeResult<Value> {
        Self::ensure_supported(resource, Operation::List)?;
        let path = resource.collection_path(parents)?;
        let value = self.call(HttpMethod::Get, &path, None).await?;
        let items = unwrap_envelope(value, resource.collection_key());
        match items {
            Value::Array(_) => Ok(items),
            Value::Null => Ok(Value::Array(Vec::new())),
            _ => Err(ForgeError::decode(
                resource.singular(),
                "expected a list in the collection response",
            )),
        }
    }

    pub async fn get(&self, resource: Resource, parents: &Parents, id: u64) -> ForgeResult<Value> {
        Self::ensure_supported(resource, Operation::Get)?;
        let path = resource.item_path(parents, id)?;
        let value = self.call(HttpMethod::Get, &path, None).await?;
        Ok(unwrap_envelope(value, resource.item_key()))
    }

    pub async fn create(
        &self,
        resource: Resource,
        parents: &Parents,
        body: Value,
    ) -> ForgeResult<Value> {
        Self::ensure_supported(resource, Operation::Create)?;
        let path = resource.collection_path(parents)?;
        info!("Creating {} at {}", resource.label(), path);
        let value = self.call(HttpMethod::Post, &path, Some(body)).await?;
        Ok(unwrap_envelope(value, resource.item_key()))
    }

    pub async fn update(
        &self,
        resource: Resource,
        parents: &Parents,
        id: u64,
        body: Value,
    ) -> ForgeResult<Value> {
        Self::ensure_supported(resource, Operation::Update)?;
        let path = resource.item_path(parents, id)?;
        info!("Updating {} {}", resource.label(), id);
        let value = self.call(HttpMethod::Put, &path, Some(body)).await?;
        Ok(unwrap_envelope(value, resource.item_key()))
    }

    pub async fn delete(&self, resource: Resource, parents: &Parents, id: u64) -> ForgeResult<()> {
        Self::ensure_supported(resource, Operation::Delete)?;
        let path = resource.item_path(parents, id)?;
        info!("Deleting {} {}", resource.label(), id);
        self.call(HttpMethod::Delete, &path, None).await?;
        Ok(())
    }

    // Typed reads

    pub async fn list_servers(&self) -> ForgeResult<Vec<Server>> {
        let items = self.list(Resource::Server, &Parents::account()).await?;
        decode_list("server", items)
    }

    pub async fn get_server(&self, server_id: u64) -> ForgeResult<Server> {
        let item = self.get(Resource::Server, &Parents::account(), server_id).await?;
        decode("server", item)
    }

    pub async fn list_sites(&self, server_id: u64) -> ForgeResult<Vec<Site>> {
        let items = self.list(Resource::Site, &Parents::server(server_id)).await?;
        decode_list("site", items)
    }

    pub async fn get_site(&self, server_id: u64, site_id: u64) -> ForgeResult<Site> {
        let item = self.get(Resource::Site, &Parents::server(server_id), site_id).await?;
        decode("site", item)
    }

    pub async fn list_certificates(
        &self,
        server_id: u64,
        site_id: u64,
    ) -> ForgeResult<Vec<Certificate>> {
        let items = self
            .list(Resource::Certificate, &Parents::site(server_id, site_id))
            .await?;
        decode_list("certificate", items)
    }

    pub async fn list_workers(&self, server_id: u64, site_id: u64) -> ForgeResult<Vec<Worker>> {
        let items = self
            .list(Resource::Worker, &Parents::site(server_id, site_id))
            .await?;
        decode_list("worker", items)
    }

    pub async fn list_jobs(&self, server_id: u64) -> ForgeResult<Vec<ScheduledJob>> {
        let items = self.list(Resource::Job, &Parents::server(server_id)).await?;
        decode_list("scheduled_job", items)
    }

    pub async fn list_daemons(&self, server_id: u64) -> ForgeResult<Vec<Daemon>> {
        let items = self.list(Resource::Daemon, &Parents::server(server_id)).await?;
        decode_list("daemon", items)
    }

    pub async fn list_monitors(&self, server_id: u64) -> ForgeResult<Vec<Monitor>> {
        let items = self.list(Resource::Monitor, &Parents::server(server_id)).await?;
        decode_list("monitor", items)
    }

    /// Recent provisioning and deployment events for one server
    pub async fn list_events(&self, server_id: u64) -> ForgeResult<Vec<ServerEvent>> {
        let path = format!("/servers/events?server_id={}", server_id);
        let value = self.call(HttpMethod::Get, &path, None).await?;
        decode_list("server_event", unwrap_envelope(value, Some("events")))
    }

    // Typed writes

    pub async fn create_site(&self, server_id: u64, payload: &CreateSite) -> ForgeResult<Site> {
        let item = self
            .create(Resource::Site, &Parents::server(server_id), to_body(payload)?)
            .await?;
        decode("site", item)
    }

    pub async fn create_worker(
        &self,
        server_id: u64,
        site_id: u64,
        payload: &CreateWorker,
    ) -> ForgeResult<Worker> {
        let item = self
            .create(
                Resource::Worker,
                &Parents::site(server_id, site_id),
                to_body(payload)?,
            )
            .await?;
        decode("worker", item)
    }

    pub async fn create_job(&self, server_id: u64, payload: &CreateJob) -> ForgeResult<ScheduledJob> {
        let item = self
            .create(Resource::Job, &Parents::server(server_id), to_body(payload)?)
            .await?;
        decode("scheduled_job", item)
    }

    // Actions

    pub async fn reboot_server(&self, server_id: u64) -> ForgeResult<Value> {
        info!("Rebooting server {}", server_id);
        self.call(HttpMethod::Post, &format!("/servers/{}/reboot", server_id), None)
            .await
    }

    pub async fn deploy_site(&self, server_id: u64, site_id: u64) -> ForgeResult<Value> {
        info!("Deploying site {} on server {}", site_id, server_id);
        let path = format!("{}/deployment/deploy", site_path(server_id, site_id));
        let value = self.call(HttpMethod::Post, &path, None).await?;
        Ok(unwrap_envelope(value, Some("site")))
    }

    pub async fn set_quick_deploy(
        &self,
        server_id: u64,
        site_id: u64,
        enabled: bool,
    ) -> ForgeResult<Value> {
        let method = if enabled {
            HttpMethod::Post
        } else {
            HttpMethod::Delete
        };
        let path = format!("{}/deployment", site_path(server_id, site_id));
        self.call(method, &path, None).await
    }

    pub async fn get_deployment_script(&self, server_id: u64, site_id: u64) -> ForgeResult<String> {
        let path = format!("{}/deployment/script", site_path(server_id, site_id));
        let value = self.call(HttpMethod::Get, &path, None).await?;
        text_body("deployment_script", value)
    }

    pub async fn update_deployment_script(
        &self,
        server_id: u64,
        site_id: u64,
        content: &str,
        auto_source: bool,
    ) -> ForgeResult<()> {
        let path = format!("{}/deployment/script", site_path(server_id, site_id));
        self.call(
            HttpMethod::Put,
            &path,
            Some(json!({ "content": content, "auto_source": auto_source })),
        )
        .await?;
        Ok(())
    }

    pub async fn get_deployment_log(&self, server_id: u64, site_id: u64) -> ForgeResult<String> {
        let path = format!("{}/deployment/log", site_path(server_id, site_id));
        let value = self.call(HttpMethod::Get, &path, None).await?;
        text_body("deployment_log", value)
    }

    pub async fn list_deployments(&self, server_id: u64, site_id: u64) -> ForgeResult<Value> {
        let path = format!("{}/deployment-history", site_path(server_id, site_id));
        let value = self.call(HttpMethod::Get, &path, None).await?;
        Ok(unwrap_envelope(value, Some("deployments")))
    }

    pub async fn install_git_repository(
        &self,
        server_id: u64,
        site_id: u64,
        payload: &InstallRepository,
    ) -> ForgeResult<Value> {
        info!(
            "Installing {} on site {} (server {})",
            payload.repository, site_id, server_id
        );
        let path = format!("{}/git", site_path(server_id, site_id));
        let value = self.call(HttpMethod::Post, &path, Some(to_body(payload)?)).await?;
        Ok(unwrap_envelope(value, Some("site")))
    }

    pub async fn obtain_letsencrypt_certificate(
        &self,
        server_id: u64,
        site_id: u64,
        domains: &[String],
    ) -> ForgeResult<Certificate> {
        info!("Requesting Let's Encrypt certificate for {}", domains.join(", "));
        let path = format!("{}/certificates/letsencrypt", site_path(server_id, site_id));
        let value = self
            .call(HttpMethod::Post, &path, Some(json!({ "domains": domains })))
            .await?;
        decode("certificate", unwrap_envelope(value, Some("certificate")))
    }

    pub async fn activate_certificate(
        &self,
        server_id: u64,
        site_id: u64,
        certificate_id: u64,
    ) -> ForgeResult<()> {
        let path = format!(
            "{}/certificates/{}/activate",
            site_path(server_id, site_id),
            certificate_id
        );
        self.call(HttpMethod::Post, &path, None).await?;
        Ok(())
    }

    pub async fn restart_worker(&self, server_id: u64, site_id: u64, worker_id: u64) -> ForgeResult<()> {
        let path = format!("{}/workers/{}/restart", site_path(server_id, site_id), worker_id);
        self.call(HttpMethod::Post, &path, None).await?;
        Ok(())
    }

    pub async fn restart_daemon(&self, server_id: u64, daemon_id: u64) -> ForgeResult<()> {
        let path = format!("/servers/{}/daemons/{}/restart", server_id, daemon_id);
        self.call(HttpMethod::Post, &path, None).await?;
        Ok(())
    }

    pub async fn run_recipe(&self, recipe_id: u64, server_ids: &[u64], notify: bool) -> ForgeResult<()> {
        info!("Running recipe {} on {} server(s)", recipe_id, server_ids.len());
        let path = format!("/recipes/{}/run", recipe_id);
        self.call(
            HttpMethod::Post,
            &path,
            Some(json!({ "servers": server_ids, "notify": notify })),
        )
        .await?;
        Ok(())
    }

    pub async fn manage_service(
        &self,
        server_id: u64,
        action: ServiceAction,
        service: &str,
    ) -> ForgeResult<()> {
        info!("{} {} on server {}", action.as_str(), service, server_id);
        let path = format!("/servers/{}/services/{}", server_id, action.as_str());
        self.call(HttpMethod::Post, &path, Some(json!({ "service": service })))
            .await?;
        Ok(())
    }

    pub async fn manage_site_integration(
        &self,
        server_id: u64,
        site_id: u64,
        integration: Integration,
        action: IntegrationAction,
        options: Option<Value>,
    ) -> ForgeResult<Value> {
        let path = format!(
            "{}/integrations/{}",
            site_path(server_id, site_id),
            integration.slug()
        );
        match action {
            IntegrationAction::Status => self.call(HttpMethod::Get, &path, None).await,
            IntegrationAction::Enable => self.call(HttpMethod::Post, &path, options).await,
            IntegrationAction::Disable => self.call(HttpMethod::Delete, &path, None).await,
        }
    }
}

fn site_path(server_id: u64, site_id: u64) -> String {
    format!("/servers/{}/sites/{}", server_id, site_id)
}

/// Forge wraps most payloads as `{"<key>": ...}`; a bare payload is accepted as-is
fn unwrap_envelope(value: Value, key: Option<&str>) -> Value {
    match (key, value) {
        (Some(key), Value::Object(mut map)) => match map.remove(key) {
            Some(inner) => inner,
            None => Value::Object(map),
        },
        (_, value) => value,
    }
}

fn text_body(resource: &'static str, value: Value) -> ForgeResult<String> {
    match value {
        Value::String(text) => Ok(text),
        Value::Null => Ok(String::new()),
        Value::Object(map) => map
            .get("content")
            .or_else(|| map.get("output"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| ForgeError::decode(resource, "expected text content")),
        _ => Err(ForgeError::decode(resource, "expected text content")),
    }
}

fn to_body<T: Serialize>(payload: &T) -> ForgeResult<Value> {
    serde_json::to_value(payload)
        .map_err(|e| ForgeError::InvalidRequest(format!("Failed to encode payload: {}", e)))
}
