//! Laravel Forge API access.
//!
//! [`ForgeClient`] is the typed facade the tools and workflows use. It talks
//! to Forge through the [`ForgeBackend`] seam; [`HttpBackend`] is the reqwest
//! implementation used in production.

pub mod client;
pub mod errors;
pub mod http;
pub mod models;
pub mod resources;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub use client::{ForgeClient, Integration, IntegrationAction, ServiceAction};
pub use errors::{ForgeError, ForgeResult};
pub use http::{HttpBackend, RetryPolicy};
pub use resources::{Operation, Parents, Resource, Scope};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport for Forge API calls.
///
/// `path` is relative to the API root (`/servers/1/sites`). JSON responses
/// are returned as parsed values, plain-text responses as `Value::String`
/// and empty bodies as `Value::Null`.
#[async_trait]
pub trait ForgeBackend: Send + Sync {
    async fn send(&self, method: HttpMethod, path: &str, body: Option<Value>) -> ForgeResult<Value>;
}
