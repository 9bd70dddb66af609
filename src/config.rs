use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://forge.laravel.com/api/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_SCAN_CONCURRENCY: usize = 4;
pub const MAX_SCAN_CONCURRENCY: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("FORGE_API_TOKEN is not set; pass --api-token or export it")]
    MissingToken,

    #[error("Invalid API URL '{0}': must start with http:// or https://")]
    InvalidUrl(String),

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

/// Connection settings, read from flags or the environment
#[derive(Debug, Clone, clap::Args)]
pub struct ConfigArgs {
    /// Forge API token
    #[arg(long = "api-token", env = "FORGE_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Forge API base URL
    #[arg(long = "api-url", env = "FORGE_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Per-request timeout in seconds
    #[arg(long = "timeout-secs", env = "FORGE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Retries for failed reads; writes are never retried
    #[arg(long = "max-retries", env = "FORGE_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Parallel site lookups during SSL scans
    #[arg(
        long = "scan-concurrency",
        env = "FORGE_SCAN_CONCURRENCY",
        default_value_t = DEFAULT_SCAN_CONCURRENCY
    )]
    pub scan_concurrency: usize,

    /// Refuse tools that modify infrastructure
    #[arg(long = "read-only", env = "FORGE_READ_ONLY")]
    pub read_only: bool,
}

/// Logging settings
#[derive(Debug, Clone, clap::Args)]
pub struct LogArgs {
    /// Log filter, e.g. `info` or `laravel_forge_mcp=debug`
    #[arg(long = "log-level", env = "FORGE_MCP_LOG", default_value = "info")]
    pub log_level: String,

    /// Also write logs to this file
    #[arg(long = "log-file", env = "FORGE_MCP_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Clone)]
pub struct ForgeConfig {
    pub api_token: String,
    pub api_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub scan_concurrency: usize,
    pub read_only: bool,
}

impl ForgeConfig {
    /// Defaults for everything except the token
    pub fn with_token(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(250),
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            read_only: false,
        }
    }
}

// The token never reaches logs.
impl fmt::Debug for ForgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForgeConfig")
            .field("api_token", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("scan_concurrency", &self.scan_concurrency)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl ConfigArgs {
    pub fn into_config(self) -> Result<ForgeConfig, ConfigError> {
        let api_token = self
            .api_token
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)?;

        let api_url = self.api_url.trim().trim_end_matches('/').to_string();
        if !(api_url.starts_with("https://") || api_url.starts_with("http://")) {
            return Err(ConfigError::InvalidUrl(self.api_url));
        }

        check_range("timeout_secs", self.timeout_secs, 1, 300)?;
        check_range("max_retries", self.max_retries as u64, 0, 10)?;
        check_range(
            "scan_concurrency",
            self.scan_concurrency as u64,
            1,
            MAX_SCAN_CONCURRENCY as u64,
        )?;

        Ok(ForgeConfig {
            api_token,
            api_url,
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(250),
            scan_concurrency: self.scan_concurrency,
            read_only: self.read_only,
        })
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ConfigArgs {
        ConfigArgs {
            api_token: Some("secret-token".to_string()),
            api_url: format!("{}/", DEFAULT_API_URL),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            scan_concurrency: DEFAULT_SCAN_CONCURRENCY,
            read_only: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let config = args().into_config().unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(!format!("{:?}", config).contains("secret-token"));
    }

    #[test]
    fn test_missing_token() {
        let mut args = args();
        args.api_token = Some("   ".to_string());
        assert!(matches!(args.into_config(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn test_out_of_range_values() {
        let mut bad = args();
        bad.scan_concurrency = 0;
        assert!(matches!(
            bad.into_config(),
            Err(ConfigError::OutOfRange { field: "scan_concurrency", .. })
        ));

        let mut bad = args();
        bad.api_url = "forge.laravel.com".to_string();
        assert!(matches!(bad.into_config(), Err(ConfigError::InvalidUrl(_))));
    }
}
