use serde_json::Value;

pub type ForgeResult<T> = Result<T, ForgeError>;

/// Failures returned by the Forge resource client
#[derive(Debug, Clone, thiserror::Error)]
pub enum ForgeError {
    #[error("Forge API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Unexpected {resource} payload: {message}")]
    Decode {
        resource: &'static str,
        message: String,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ForgeError {
    /// HTTP status code, when the API answered at all
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ForgeError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn decode(resource: &'static str, message: impl Into<String>) -> Self {
        ForgeError::Decode {
            resource,
            message: message.into(),
        }
    }

    /// Build an API error from a non-2xx response body.
    ///
    /// Forge answers validation failures with `{"message": ..., "errors": {field: [..]}}`
    /// and most other failures with `{"message": ...}`.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();

        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|m| m.as_str())
            .map(|m| m.to_string())
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    default_status_message(status).to_string()
                } else {
                    trimmed.chars().take(200).collect()
                }
            });

        let field_errors: Vec<String> = parsed
            .as_ref()
            .and_then(|v| v.get("errors"))
            .and_then(|e| e.as_object())
            .map(|errors| {
                errors
                    .iter()
                    .flat_map(|(field, messages)| {
                        messages
                            .as_array()
                            .into_iter()
                            .flatten()
                            .filter_map(|m| m.as_str())
                            .map(move |m| format!("{}: {}", field, m))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let message = if field_errors.is_empty() {
            message
        } else {
            format!("{} ({})", message, field_errors.join("; "))
        };

        ForgeError::Api { status, message }
    }

    /// Whether a read may be retried after this failure
    pub fn is_transient(&self) -> bool {
        match self {
            ForgeError::Network(_) | ForgeError::Timeout { .. } => true,
            ForgeError::Api { status, .. } => *status == 429 || *status >= 500,
            ForgeError::Decode { .. } | ForgeError::InvalidRequest(_) => false,
        }
    }
}

fn default_status_message(status: u16) -> &'static str {
    match status {
        401 => "Unauthenticated, check the Forge API token",
        403 => "Forbidden",
        404 => "Resource not found",
        422 => "Validation failed",
        429 => "Rate limit exceeded",
        500..=599 => "Forge server error",
        _ => "Request failed",
    }
}
