//! # scout-core - Checkpointed Sourcing Workflow
//!
//! A sourcing job discovers profiles through a search provider, enriches
//! them with contact details, scrapes, parses, persists and scores them.
//! Each step is a [`Stage`](stages::Stage) of a [`SourcingGraph`]; every
//! stage and every internal batch commits to a
//! [`CheckpointStore`](scout_checkpoint::CheckpointStore), so a crash or a
//! provider rate limit costs at most one batch of work.
//!
//! ## Components
//!
//! - [`planner`] - expands search variants into precise / broad /
//!   alternative queries and hands them out tier by tier
//! - [`stages`] - the nine stage functions
//! - [`graph`] - edges, the search-loop branch and halt handling
//! - [`resume`] - rebuilds state from the store and picks the entry stage
//! - [`engine`] - create / run / retry / progress / delete
//! - [`recovery`] - periodic sweep over stale and rate-limited jobs
//!
//! ## Example
//!
//! ```rust,no_run
//! use scout_checkpoint::{InMemoryCandidateStore, InMemoryCheckpointStore};
//! use scout_core::{Capabilities, JobRequest, SourcingEngine, WorkflowSettings};
//! use std::sync::Arc;
//!
//! # async fn example(capabilities: Capabilities) -> scout_core::Result<()> {
//! let engine = SourcingEngine::new(
//!     Arc::new(InMemoryCheckpointStore::new()),
//!     Arc::new(InMemoryCandidateStore::new()),
//!     capabilities,
//!     WorkflowSettings::default(),
//! );
//!
//! let job_id = engine
//!     .create_job(JobRequest {
//!         owner_id: "recruiter-1".into(),
//!         title: "Senior Rust Engineer".into(),
//!         raw_description: "Async Rust, Postgres, 5+ years".into(),
//!         requirements: Default::default(),
//!         max_candidates: 20,
//!     })
//!     .await?;
//! let outcome = engine.run(job_id).await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod engine;
pub mod error;
pub mod graph;
pub mod payload;
pub mod planner;
pub mod recovery;
pub mod resume;
pub mod retry;
pub mod settings;
pub mod stages;
pub mod state;
pub mod validation;

pub use capabilities::{
    Capabilities, CandidateScorer, CapabilityResult, ContactEnricher, DescriptionFormatter,
    Enrichment, ProfileParser, ProfileScraper, ProfileSearch, ScoringContext, SearchHit,
};
pub use engine::{JobRequest, ProgressSnapshot, ScoredCandidate, SourcingEngine};
pub use error::{CapabilityError, EngineError, RateLimitSignal, Result, StageError};
pub use graph::{route_after_enrich, Edge, RunOutcome, SourcingGraph, Target};
pub use payload::PayloadCodec;
pub use planner::{or_joined, select_next, QueryPlanner, QueryTier, SearchQuery};
pub use recovery::{RecoveryPolicy, RecoverySummary, RecoverySweeper};
pub use resume::{ResumeBuilder, ResumePlan};
pub use retry::{with_transient_retry, RetryPolicy};
pub use settings::WorkflowSettings;
pub use stages::{Stage, StageContext};
pub use state::{SourcingState, StateUpdate};
