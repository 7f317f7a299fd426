//! # scout-checkpoint - Durable State for Sourcing Jobs
//!
//! Everything a sourcing job needs to survive a crash or a provider rate
//! limit lives in one [`JobCheckpoint`] per job. Stages never mutate it
//! directly: they return a [`CheckpointUpdate`] and the store folds it in
//! with per-field merge policies (see [`reducer`]).
//!
//! ## Core Concepts
//!
//! - [`JobCheckpoint`] - one row per job: requirements, variants, the
//!   discovered / enriched / used-query sets, counters, batch pointers,
//!   error and rate-limit metadata, retry accounting
//! - [`StageName`] / [`StageLabel`] - graph position and the fine-grained
//!   progress label rendered as `SCRAPING_BATCH_3_OF_7`
//! - [`CheckpointStore`] - `load` / `commit` / `mark_terminal` /
//!   `record_retry` plus raw batch payloads addressed by batch index
//! - [`CandidateStore`] - candidate records unique on (job, profile URL)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scout_checkpoint::{
//!     CheckpointStore, CheckpointUpdate, InMemoryCheckpointStore, JobCheckpoint,
//!     JobRequirements, NewJob, StageName,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InMemoryCheckpointStore::new();
//!     let job = JobCheckpoint::new(
//!         NewJob {
//!             owner_id: "recruiter-1".into(),
//!             title: "Staff Engineer".into(),
//!             raw_description: "Distributed systems, Rust".into(),
//!             requirements: JobRequirements::default(),
//!             max_candidates: 25,
//!             max_retries: 3,
//!         },
//!         chrono::Utc::now(),
//!     );
//!     store.create(&job).await?;
//!
//!     let stored = store
//!         .commit(
//!             job.id,
//!             CheckpointUpdate::new()
//!                 .with_discovered(vec!["https://www.linkedin.com/in/someone".into()])
//!                 .with_completed(StageName::SearchProfiles),
//!         )
//!         .await?;
//!     assert_eq!(stored.discovered_urls.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod candidate;
pub mod error;
pub mod job;
pub mod memory;
pub mod reducer;
pub mod serializer;
pub mod stage;
pub mod traits;

pub use candidate::{
    CandidateCounts, CandidateId, CandidateRecord, CandidateScore, ContactInfo, EducationEntry,
    ExperienceEntry, InsertOutcome, NewCandidate, ParsedCandidate, ParsedProfile, RawProfile,
    Recommendation, ScrapingStatus,
};
pub use error::{CheckpointError, Result};
pub use job::{
    JobCheckpoint, JobCounters, JobId, JobOutcome, JobRequirements, JobStatus, NewJob,
    ProfileHint, RateLimitInfo, RetryTransition, SearchVariant,
};
pub use memory::{InMemoryCandidateStore, InMemoryCheckpointStore};
pub use reducer::{CheckpointUpdate, CounterUpdate, MergePolicy};
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use stage::{StageLabel, StageName};
pub use traits::{BatchKind, BatchPayload, CandidateStore, CheckpointStore};
