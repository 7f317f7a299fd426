//! Configuration schema for the scout application

use crate::error::{Result, ScoutError};
use scout_core::{RecoveryPolicy, RetryPolicy, WorkflowSettings};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main scout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoutConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Loop limits and batch sizes of the sourcing workflow
    #[serde(default)]
    pub workflow: WorkflowSettings,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file path (relative to ~/.scout or absolute)
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "scout.db".to_string(),
        }
    }
}

/// Recovery sweep configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Unfinished jobs idle for longer than this are resumed
    pub staleness_minutes: u64,

    /// Automatic recovery attempts before a stuck job fails for good
    pub max_retries: u32,

    /// Seconds between sweeps of `scout sweep`
    pub sweep_interval_secs: u64,

    /// Recovered jobs resumed at the same time
    pub concurrency: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            staleness_minutes: 30,
            max_retries: 3,
            sweep_interval_secs: 300,
            concurrency: 4,
        }
    }
}

impl RecoveryConfig {
    pub fn policy(&self) -> RecoveryPolicy {
        let minutes = i64::try_from(self.staleness_minutes).unwrap_or(i64::MAX / 60_000);
        RecoveryPolicy {
            staleness: chrono::Duration::minutes(minutes),
            max_retries: self.max_retries,
            concurrency: self.concurrency.max(1),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Paths of the capability endpoints, relative to the gateway base URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayEndpoints {
    pub format: String,
    pub search: String,
    pub enrich: String,
    pub scrape: String,
    pub parse: String,
    pub score: String,
}

impl Default for GatewayEndpoints {
    fn default() -> Self {
        Self {
            format: "/v1/format".to_string(),
            search: "/v1/search".to_string(),
            enrich: "/v1/enrich".to_string(),
            scrape: "/v1/scrape".to_string(),
            parse: "/v1/parse".to_string(),
            score: "/v1/score".to_string(),
        }
    }
}

/// HTTP capability gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL of the gateway serving every capability
    pub base_url: String,

    /// Bearer token (supports ${VAR} interpolation)
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Default pause when a 429 carries no reset header
    pub default_rate_limit_secs: u64,

    /// Backoff for 5xx and network failures
    pub retry: RetryPolicy,

    pub endpoints: GatewayEndpoints,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8700".to_string(),
            api_key: None,
            timeout_secs: 60,
            default_rate_limit_secs: 3600,
            retry: RetryPolicy::default(),
            endpoints: GatewayEndpoints::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,

    /// Log format: "compact", "pretty", "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl ScoutConfig {
    /// Resolved database path; relative paths live under ~/.scout
    pub fn database_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.database.path);
        if path.is_absolute() {
            return Ok(path);
        }
        let home = dirs::home_dir()
            .ok_or_else(|| ScoutError::Config("Failed to locate home directory".to_string()))?;
        Ok(home.join(".scout").join(path))
    }

    /// Reject values that cannot drive a run
    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_iterations == 0 {
            return Err(ScoutError::Config(
                "workflow.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.gateway.base_url.trim().is_empty() {
            return Err(ScoutError::Config("gateway.base_url is empty".to_string()));
        }
        if !matches!(self.logging.format.as_str(), "compact" | "pretty" | "json") {
            return Err(ScoutError::Config(format!(
                "unknown logging.format '{}' (expected compact, pretty or json)",
                self.logging.format
            )));
        }
        Ok(())
    }
}
