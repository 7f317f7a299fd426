//! # scout - Checkpointed Candidate Sourcing
//!
//! The application layer around [`scout_core`]: durable SQLite stores for job
//! checkpoints and candidates, TOML configuration, an HTTP gateway serving
//! every capability, and the `scout` command-line tool.
//!
//! ## Features
//!
//! - **SQLite Database** - Jobs, candidates and batch payloads in `~/.scout/scout.db`
//! - **Dual-Location Config** - `~/.scout/scout.toml` then `./.scout/scout.toml`
//! - **HTTP Gateway** - rate limits become job pauses, 5xx are retried with backoff
//! - **Recovery Sweeper** - resumes stale and rate-limited jobs until SIGTERM
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scout::{ConfigLoader, ScoutApp};
//! use scout_core::JobRequest;
//!
//! # async fn example() -> scout::Result<()> {
//! let config = ConfigLoader::new().load().await?;
//! let app = ScoutApp::open(config).await?;
//!
//! let job_id = app
//!     .engine()
//!     .create_job(JobRequest {
//!         owner_id: "recruiter-1".into(),
//!         title: "Senior Rust Engineer".into(),
//!         raw_description: "Async Rust, Postgres, 5+ years".into(),
//!         requirements: Default::default(),
//!         max_candidates: 20,
//!     })
//!     .await?;
//! let outcome = app.engine().run(job_id).await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod repositories;
pub mod shutdown;

mod error;

pub use app::ScoutApp;
pub use config::{ConfigLoader, ScoutConfig};
pub use db::Database;
pub use gateway::HttpGateway;
pub use repositories::{SqliteCandidateStore, SqliteCheckpointStore};
pub use shutdown::ShutdownCoordinator;

pub use error::{Result, ScoutError};
