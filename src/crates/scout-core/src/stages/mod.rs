//! Stage functions of the sourcing graph
//!
//! Each stage:
//! - short-circuits when its output already exists, so re-running it after a
//!   crash either skips forward or continues from the next unit of work
//! - commits a checkpoint after every internal batch
//! - returns the cumulative [`StateUpdate`] for the stage
//!
//! Batch commits carry only idempotent fields (set unions, authoritative
//! counters, batch pointers, the progress label) because the graph commits
//! the returned update once more when the stage finishes. Error log lines
//! are appended exactly once, in the returned update, or in the commit made
//! right before a rate-limit pause.

mod enrich;
mod format;
mod no_candidates;
mod parse;
mod persist;
mod queries;
mod score;
mod scrape;
mod search;

pub use enrich::EnrichCandidates;
pub use format::FormatDescription;
pub use no_candidates::HandleNoCandidates;
pub use parse::ParseCandidates;
pub use persist::PersistCandidates;
pub use queries::GenerateQueries;
pub use score::ScoreCandidates;
pub use scrape::ScrapeCandidates;
pub use search::SearchProfiles;

use crate::capabilities::Capabilities;
use crate::error::{CapabilityError, StageError};
use crate::payload::PayloadCodec;
use crate::planner::QueryPlanner;
use crate::settings::WorkflowSettings;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CandidateStore, CheckpointStore, CounterUpdate, JobId, StageName};
use std::sync::Arc;

/// Everything a stage may touch besides the state it is handed
#[derive(Clone)]
pub struct StageContext {
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub capabilities: Capabilities,
    pub settings: WorkflowSettings,
    pub planner: QueryPlanner,
    pub codec: PayloadCodec,
}

impl StageContext {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        candidates: Arc<dyn CandidateStore>,
        capabilities: Capabilities,
        settings: WorkflowSettings,
    ) -> Self {
        let settings = settings.normalized();
        Self {
            checkpoints,
            candidates,
            capabilities,
            planner: QueryPlanner::new(&settings),
            settings,
            codec: PayloadCodec::new(),
        }
    }

    /// Counters recomputed from candidate storage
    pub(crate) async fn candidate_counters(&self, job_id: JobId) -> Result<CounterUpdate, StageError> {
        let counts = self.candidates.counts(job_id).await?;
        Ok(CounterUpdate {
            candidates_with_contact: Some(counts.with_contact),
            saved: Some(counts.scraped),
            scored: Some(counts.scored),
            ..Default::default()
        })
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// One node of the sourcing graph
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError>;
}

/// How a stage should treat a capability failure
pub(crate) enum Disposition {
    /// Pause the job
    Pause(crate::error::RateLimitSignal),
    /// The job cannot continue
    Fatal(String),
    /// Record and move on
    Record(String),
}

pub(crate) fn classify(err: CapabilityError) -> Disposition {
    match err {
        CapabilityError::RateLimited(signal) => Disposition::Pause(signal),
        CapabilityError::Unavailable(message) => {
            Disposition::Fatal(format!("capability unavailable: {}", message))
        }
        other => Disposition::Record(other.to_string()),
    }
}

pub(crate) fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
