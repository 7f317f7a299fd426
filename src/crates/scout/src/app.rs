//! Wires configuration, SQLite stores and the capability gateway into an engine

use crate::config::ScoutConfig;
use crate::db::Database;
use crate::error::Result;
use crate::gateway::HttpGateway;
use crate::repositories::{SqliteCandidateStore, SqliteCheckpointStore};
use scout_core::{Capabilities, RecoverySweeper, SourcingEngine, WorkflowSettings};
use std::sync::Arc;
use tracing::info;

/// A ready-to-use engine over the configured database
#[derive(Debug, Clone)]
pub struct ScoutApp {
    config: ScoutConfig,
    db: Arc<Database>,
    engine: SourcingEngine,
}

impl ScoutApp {
    /// Open the database (running migrations) and connect the HTTP gateway
    pub async fn open(config: ScoutConfig) -> Result<Self> {
        let path = config.database_path()?;
        let db = Arc::new(Database::initialize(&path).await?);
        let capabilities = HttpGateway::new(&config.gateway)?.into_capabilities();
        Ok(Self::with_capabilities(config, db, capabilities))
    }

    /// Build the engine over an open database and arbitrary capabilities
    pub fn with_capabilities(config: ScoutConfig, db: Arc<Database>, capabilities: Capabilities) -> Self {
        let engine = SourcingEngine::new(
            Arc::new(SqliteCheckpointStore::new(db.clone())),
            Arc::new(SqliteCandidateStore::new(db.clone())),
            capabilities,
            Self::settings(&config),
        );
        info!(
            max_iterations = config.workflow.max_iterations,
            max_retries = config.recovery.max_retries,
            "Sourcing engine ready"
        );
        Self { config, db, engine }
    }

    /// Workflow settings with the recovery retry ceiling stamped on new jobs
    fn settings(config: &ScoutConfig) -> WorkflowSettings {
        let mut settings = config.workflow.clone().normalized();
        settings.max_retries = config.recovery.max_retries;
        settings
    }

    pub fn engine(&self) -> &SourcingEngine {
        &self.engine
    }

    pub fn config(&self) -> &ScoutConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Sweeper using the `[recovery]` policy
    pub fn sweeper(&self) -> RecoverySweeper {
        RecoverySweeper::new(self.engine.clone(), self.config.recovery.policy())
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}
