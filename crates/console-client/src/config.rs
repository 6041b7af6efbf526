//! Console client configuration.
//!
//! Loaded from environment variables, with a `from_vars` entry point so tests
//! can supply a plain map.

use std::collections::HashMap;
use std::env;
use crate::cookies::COOKIE_JAR_FILE;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout for the HTTP client.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the console API (e.g. `https://teller.example.com`), no trailing slash.
    pub api_url: String,
    pub http_timeout: Duration,
    pub connect_timeout: Duration,
    /// Where role and process id are persisted. `None` keeps them, and the
    /// refresh cookie, in memory.
    pub prefs_path: Option<PathBuf>,
    /// Leave the session open on exit so the next run can restore it.
    pub keep_session: bool,
    pub json_logs: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },

    #[error("Insecure API URL: {0} (CONSOLE_REQUIRE_HTTPS is set)")]
    InsecureUrl(String),
}

impl ClientConfig {
    /// Create a configuration for `api_url` with default timeouts.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            prefs_path: None,
            keep_session: false,
            json_logs: false,
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing)
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_url = vars
            .get("CONSOLE_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("CONSOLE_API_URL".to_string()))?
            .trim()
            .trim_end_matches('/')
            .to_string();

        let require_https = parse_bool(vars, "CONSOLE_REQUIRE_HTTPS")?.unwrap_or(false);

        if api_url.starts_with("http://") {
            if require_https {
                return Err(ConfigError::InsecureUrl(api_url));
            }
        } else if !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                name: "CONSOLE_API_URL".to_string(),
                reason: "must start with http:// or https://".to_string(),
            });
        }

        let http_timeout =
            parse_millis(vars, "CONSOLE_HTTP_TIMEOUT_MS")?.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let connect_timeout =
            parse_millis(vars, "CONSOLE_CONNECT_TIMEOUT_MS")?.unwrap_or(DEFAULT_CONNECT_TIMEOUT);

        let prefs_path = vars
            .get("CONSOLE_PREFS_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        let keep_session = parse_bool(vars, "CONSOLE_KEEP_SESSION")?.unwrap_or(false);
        let json_logs = parse_bool(vars, "CONSOLE_JSON_LOGS")?.unwrap_or(false);

        Ok(ClientConfig {
            api_url,
            http_timeout,
            connect_timeout,
            prefs_path,
            keep_session,
            json_logs,
        })
    }

    /// Where the refresh cookie jar is saved: next to the prefs file.
    #[must_use]
    pub fn cookie_jar_path(&self) -> Option<PathBuf> {
        self.prefs_path
            .as_ref()
            .map(|prefs| prefs.with_file_name(COOKIE_JAR_FILE))
    }

    /// Set the prefs file location.
    #[must_use]
    pub fn with_prefs_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.prefs_path = Some(path.into());
        self
    }
}

fn parse_millis(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<Duration>, ConfigError> {
    vars.get(name)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| ConfigError::InvalidValue {
                    name: name.to_string(),
                    reason: e.to_string(),
                })
        })
        .transpose()
}

fn parse_bool(vars: &HashMap<String, String>, name: &str) -> Result<Option<bool>, ConfigError> {
    vars.get(name)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        })
        .transpose()
}
