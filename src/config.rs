//! Environment-based service configuration

use std::env;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HISTORY_CAPACITY: usize = 10_000;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "https://dhantra-web-app.web.app",
    "https://dhantra-web-app.firebaseapp.com",
    "http://localhost:3000",
    "http://localhost:8080",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:8080",
];

/// Deployment environment name (`production`, `sandbox`, ...)
pub fn get_environment() -> String {
    ["APP_ENV", "ENVIRONMENT", "NODE_ENV"]
        .iter()
        .find_map(|key| env::var(key).ok().filter(|v| !v.trim().is_empty()))
        .unwrap_or_else(|| "sandbox".to_string())
}

/// Credentials for the telemetry document store
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub project_id: String,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    /// Base URL of the Dhantra core API, without trailing slash
    pub core_api_url: String,
    pub api_key: Option<String>,
    pub execution_timeout: Duration,
    /// Maximum retained execution records; `None` keeps everything
    pub history_capacity: Option<usize>,
    pub shutdown_grace: Duration,
    pub cors_origins: Vec<String>,
    pub telemetry: Option<TelemetryConfig>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let core_api_url = get("DHANTRA_CORE_API_URL").ok_or(ConfigError::Missing("DHANTRA_CORE_API_URL"))?;
        let parsed = Url::parse(&core_api_url).map_err(|e| ConfigError::Invalid {
            name: "DHANTRA_CORE_API_URL",
            value: core_api_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "DHANTRA_CORE_API_URL",
                value: core_api_url,
                reason: "scheme must be http or https".to_string(),
            });
        }

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let timeout_secs = parse_or(
            "EXECUTION_TIMEOUT_SECS",
            get("EXECUTION_TIMEOUT_SECS"),
            DEFAULT_EXECUTION_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "EXECUTION_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }
        let history_capacity =
            parse_or("HISTORY_CAPACITY", get("HISTORY_CAPACITY"), DEFAULT_HISTORY_CAPACITY)?;
        let grace_secs = parse_or(
            "SHUTDOWN_GRACE_SECS",
            get("SHUTDOWN_GRACE_SECS"),
            DEFAULT_SHUTDOWN_GRACE_SECS,
        )?;

        let cors_origins: Vec<String> = match get("CORS_ORIGINS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|s| s.to_string()).collect(),
        };
        if cors_origins.iter().any(|origin| origin == "*") {
            return Err(ConfigError::Invalid {
                name: "CORS_ORIGINS",
                value: cors_origins.join(","),
                reason: "wildcard origin is not allowed; list each origin".to_string(),
            });
        }

        let telemetry = get("FIREBASE_PROJECT_ID").map(|project_id| TelemetryConfig {
            project_id,
            api_key: get("FIREBASE_API_KEY"),
        });

        Ok(Self {
            port,
            core_api_url: core_api_url.trim_end_matches('/').to_string(),
            api_key: get("DHANTRA_API_KEY"),
            execution_timeout: Duration::from_secs(timeout_secs),
            history_capacity: (history_capacity > 0).then_some(history_capacity),
            shutdown_grace: Duration::from_secs(grace_secs),
            cors_origins,
            telemetry,
        })
    }
}

fn parse_or<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
