use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ForgeConfig;
use crate::forge::errors::{ForgeError, ForgeResult};
use crate::forge::{ForgeBackend, HttpMethod};

const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Exponential backoff for retried reads
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Only reads are retried; a repeated write could provision twice
    pub fn should_retry(&self, method: HttpMethod, attempt: u32, error: &ForgeError) -> bool {
        method == HttpMethod::Get && attempt < self.max_retries && error.is_transient()
    }
}

/// Forge backend over HTTPS with bearer-token auth
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish()
    }
}

impl HttpBackend {
    pub fn new(config: &ForgeConfig) -> ForgeResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(concat!("laravel-forge-mcp/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ForgeError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            timeout: config.timeout,
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_base_delay,
            },
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send_once(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> ForgeResult<Value> {
        let url = self.url(path);
        let mut request = match method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
            HttpMethod::Put => self.client.put(&url),
            HttpMethod::Delete => self.client.delete(&url),
        }
        .bearer_auth(&self.api_token);

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(ForgeError::from_response(status.as_u16(), &text));
        }

        Ok(parse_body(&text))
    }

    fn transport_error(&self, error: reqwest::Error) -> ForgeError {
        if error.is_timeout() {
            ForgeError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            ForgeError::Network(error.to_string())
        }
    }
}

#[async_trait]
impl ForgeBackend for HttpBackend {
    async fn send(&self, method: HttpMethod, path: &str, body: Option<Value>) -> ForgeResult<Value> {
        let mut attempt = 0;
        loop {
            debug!("Forge {} {} (attempt {})", method, path, attempt + 1);
            match self.send_once(method, path, body.as_ref()).await {
                Ok(value) => return Ok(value),
                Err(error) if self.retry.should_retry(method, attempt, &error) => {
                    attempt += 1;
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "Forge {} {} failed ({}), retrying in {:?}",
                        method, path, error, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

/// JSON bodies are parsed; anything else (deployment logs, scripts) is kept as text
pub(crate) fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
