//! `scout init`: write a default config file and create the database

use crate::config::{ConfigLoader, ScoutConfig};
use crate::db::Database;
use crate::error::{Result, ScoutError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::info;

const HEADER: &str = "# scout configuration\n\
# Values may reference environment variables as ${VAR} or ${VAR:default}.\n\n";

/// Default location of the user-level config file
pub fn default_config_path() -> Result<PathBuf> {
    ConfigLoader::new()
        .user_config_path()
        .map(Path::to_path_buf)
        .ok_or_else(|| ScoutError::Config("Failed to locate home directory".to_string()))
}

/// Render the default configuration as TOML
pub fn render_default_config() -> Result<String> {
    let body = toml::to_string_pretty(&ScoutConfig::default())
        .map_err(|e| ScoutError::Config(format!("Failed to render default config: {}", e)))?;
    Ok(format!("{}{}", HEADER, body))
}

/// Write the config file unless it exists (or `force`), then migrate the database
pub async fn handle_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if path.exists() && !force {
        println!("Config already exists: {}", path.display());
    } else {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, render_default_config()?).await?;
        println!("Wrote config: {}", path.display());
    }

    let config = ConfigLoader::load_file(&path).await?;
    let db_path = config.database_path()?;
    let db = Database::initialize(&db_path).await?;
    db.close().await;

    info!(config = %path.display(), database = %db_path.display(), "Initialized");
    println!("Database ready: {}", db_path.display());
    Ok(())
}
