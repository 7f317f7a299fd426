//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.scout/scout.toml
//! 3. Project-level config: ./.scout/scout.toml
//!
//! Later files override earlier ones key by key. String values may contain
//! `${VAR}` or `${VAR:default}` references to environment variables.

use crate::config::schema::ScoutConfig;
use crate::error::{Result, ScoutError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::fs;
use toml::Value;
use tracing::{debug, info};

static ENV_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}").unwrap());

/// Configuration loader that handles both user and project configs
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Loader for ~/.scout/scout.toml and ./.scout/scout.toml
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(".scout").join("scout.toml")),
            project_config_path: std::env::current_dir()
                .ok()
                .map(|dir| dir.join(".scout").join("scout.toml")),
        }
    }

    /// Loader over explicit locations, either of which may be absent
    pub fn with_paths(user: Option<PathBuf>, project: Option<PathBuf>) -> Self {
        Self {
            user_config_path: user,
            project_config_path: project,
        }
    }

    /// Load defaults, then the user file, then the project file
    pub async fn load(&self) -> Result<ScoutConfig> {
        let mut merged = Value::Table(Default::default());

        for path in [&self.user_config_path, &self.project_config_path]
            .into_iter()
            .flatten()
        {
            if !path.exists() {
                debug!(path = %path.display(), "Config file not present");
                continue;
            }
            let layer = Self::read_value(path).await?;
            merge_values(&mut merged, layer);
            debug!(path = %path.display(), "Loaded config layer");
        }

        let config = Self::finish(merged)?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load a single explicit file on top of the defaults
    pub async fn load_file(path: &Path) -> Result<ScoutConfig> {
        if !path.exists() {
            return Err(ScoutError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        let value = Self::read_value(path).await?;
        let config = Self::finish(value)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    async fn read_value(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ScoutError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| ScoutError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    fn finish(mut value: Value) -> Result<ScoutConfig> {
        expand_env(&mut value);
        let config = value
            .try_into::<ScoutConfig>()
            .map_err(|e| ScoutError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_config_path(&self) -> Option<&Path> {
        self.project_config_path.as_deref()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Overlay `layer` onto `base`; tables merge recursively, anything else replaces
fn merge_values(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Table(base), Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

fn expand_env(value: &mut Value) {
    match value {
        Value::String(s) => {
            if let Some(expanded) = expand_env_in_string(s) {
                *s = expanded;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(expand_env),
        Value::Table(table) => table.iter_mut().for_each(|(_, v)| expand_env(v)),
        _ => {}
    }
}

/// Expand `${VAR}` / `${VAR:default}`; unset variables without a default become empty
fn expand_env_in_string(s: &str) -> Option<String> {
    if !s.contains("${") {
        return None;
    }
    let expanded = ENV_REF.replace_all(s, |caps: &regex::Captures| {
        let default = caps.get(2).map_or("", |m| m.as_str());
        std::env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
    });
    Some(expanded.into_owned())
}
