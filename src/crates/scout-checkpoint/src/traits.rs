//! Storage traits for job checkpoints and candidate records
//!
//! [`CheckpointStore`] is the only synchronization point between stages: a
//! stage reads a fresh copy at entry and writes through
//! [`commit`](CheckpointStore::commit) at batch boundaries. A crash between
//! two commits loses at most the work since the last commit.
//!
//! Backends:
//! - [`InMemoryCheckpointStore`](crate::InMemoryCheckpointStore) /
//!   [`InMemoryCandidateStore`](crate::InMemoryCandidateStore) for tests
//! - the SQLite repositories in the `scout` crate

use crate::candidate::{
    CandidateCounts, CandidateId, CandidateRecord, CandidateScore, InsertOutcome, NewCandidate,
    ParsedProfile,
};
use crate::error::Result;
use crate::job::{JobCheckpoint, JobId, JobOutcome, RetryTransition};
use crate::reducer::CheckpointUpdate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of raw batch payload stored alongside a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Scraped,
    Parsed,
}

impl BatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scraped => "scraped",
            Self::Parsed => "parsed",
        }
    }
}

impl fmt::Display for BatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored batch payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPayload {
    pub kind: BatchKind,
    /// 1-based batch index
    pub index: u32,
    pub data: Vec<u8>,
}

/// Durable per-job checkpoint storage
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a newly created job
    async fn create(&self, job: &JobCheckpoint) -> Result<()>;

    /// Load the current checkpoint
    async fn load(&self, job_id: JobId) -> Result<JobCheckpoint>;

    /// Merge a partial update and refresh `last_activity_at`.
    ///
    /// Returns the record as stored after the merge.
    async fn commit(&self, job_id: JobId, update: CheckpointUpdate) -> Result<JobCheckpoint>;

    /// Record how a run halted (completed, failed, or paused by a rate limit)
    async fn mark_terminal(&self, job_id: JobId, outcome: JobOutcome) -> Result<JobCheckpoint>;

    /// Count one retry and reset the job to CREATED in the same write.
    ///
    /// Fails with [`RetriesExhausted`](crate::CheckpointError::RetriesExhausted)
    /// when the ceiling is already reached.
    async fn record_retry(&self, job_id: JobId) -> Result<(JobCheckpoint, RetryTransition)>;

    /// Lift a RATE_LIMITED pause without touching the retry count
    async fn release_rate_limit(&self, job_id: JobId) -> Result<JobCheckpoint>;

    /// Jobs not in COMPLETED or FAILED, oldest activity first
    async fn list_unfinished(&self) -> Result<Vec<JobCheckpoint>>;

    /// All jobs, optionally for one owner, newest first
    async fn list_jobs(&self, owner_id: Option<&str>) -> Result<Vec<JobCheckpoint>>;

    /// Store (or overwrite) one batch payload
    async fn put_batch(&self, job_id: JobId, payload: BatchPayload) -> Result<()>;

    /// All payloads of a kind, ordered by batch index
    async fn load_batches(&self, job_id: JobId, kind: BatchKind) -> Result<Vec<BatchPayload>>;

    /// Delete the job and its batch payloads
    async fn delete(&self, job_id: JobId) -> Result<()>;
}

/// Candidate record storage, unique on (job, profile URL)
#[async_trait]
pub trait CandidateStore: Send + Sync {
    /// Create the record unless the job already has one for this URL
    async fn insert_if_absent(&self, candidate: NewCandidate) -> Result<InsertOutcome>;

    async fn get(&self, id: CandidateId) -> Result<Option<CandidateRecord>>;

    async fn find_by_url(&self, job_id: JobId, profile_url: &str)
        -> Result<Option<CandidateRecord>>;

    /// All records of a job ordered by profile URL
    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<CandidateRecord>>;

    /// PENDING records of a job ordered by profile URL
    async fn list_pending(&self, job_id: JobId) -> Result<Vec<CandidateRecord>>;

    /// SCRAPED records not yet scored, ordered by profile URL
    async fn list_unscored(&self, job_id: JobId) -> Result<Vec<CandidateRecord>>;

    /// Attach parsed profile data and mark the record SCRAPED
    async fn save_profile(
        &self,
        id: CandidateId,
        profile: ParsedProfile,
        duplicate_of_job: Option<JobId>,
    ) -> Result<()>;

    /// Attach a score and mark the record scored
    async fn save_score(&self, id: CandidateId, score: CandidateScore) -> Result<()>;

    /// Job of the same owner, other than `job_id`, where this URL was first seen
    async fn find_earlier_duplicate(
        &self,
        owner_id: &str,
        profile_url: &str,
        job_id: JobId,
    ) -> Result<Option<JobId>>;

    async fn counts(&self, job_id: JobId) -> Result<CandidateCounts>;

    /// Highest scored records first
    async fn top_scored(&self, job_id: JobId, limit: usize) -> Result<Vec<CandidateRecord>>;

    /// Remove every record of a job, returning how many were removed
    async fn delete_for_job(&self, job_id: JobId) -> Result<u64>;
}
