//! Error taxonomy for capabilities, stages and the engine
//!
//! Capability calls fail with a [`CapabilityError`]. Stages classify those
//! themselves: transient and per-item failures are recorded and swallowed,
//! and only rate limits and stage-fatal conditions escape as a [`StageError`].

use chrono::{DateTime, Utc};
use scout_checkpoint::{CheckpointError, JobId, RateLimitInfo};
use std::fmt;
use thiserror::Error;

/// Distinguished signal raised by a provider that is throttling us
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitSignal {
    pub provider: String,
    pub reset_at: DateTime<Utc>,
    pub message: String,
}

impl RateLimitSignal {
    pub fn new(provider: impl Into<String>, reset_at: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reset_at,
            message: message.into(),
        }
    }

    pub fn into_info(self, hit_at: DateTime<Utc>) -> RateLimitInfo {
        RateLimitInfo {
            provider: self.provider,
            hit_at,
            reset_at: self.reset_at,
            message: self.message,
        }
    }
}

impl fmt::Display for RateLimitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} rate limited until {}: {}",
            self.provider,
            self.reset_at.to_rfc3339(),
            self.message
        )
    }
}

/// Errors raised by capability collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("{0}")]
    RateLimited(RateLimitSignal),

    /// Provider or network failure worth logging and moving past
    #[error("transient provider error: {0}")]
    Transient(String),

    /// Provider answered with something unusable
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// Capability is missing required configuration
    #[error("capability unavailable: {0}")]
    Unavailable(String),
}

impl CapabilityError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Errors a stage propagates to the graph
#[derive(Error, Debug)]
pub enum StageError {
    #[error("{0}")]
    RateLimited(RateLimitSignal),

    /// Missing prerequisite data or configuration; the job fails
    #[error("{0}")]
    Fatal(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

impl StageError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// Errors surfaced by the engine, graph and recovery sweep
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("job {job_id} exhausted its retries ({attempts} attempts)")]
    RetriesExhausted { job_id: JobId, attempts: u32 },

    #[error("job {0} is already running in this process")]
    AlreadyRunning(JobId),

    #[error("job {0} already completed")]
    AlreadyCompleted(JobId),

    #[error("job {0} has failed; retry it to resume")]
    JobFailed(JobId),

    #[error("job {job_id} is rate limited until {reset_at}")]
    RateLimitActive {
        job_id: JobId,
        reset_at: DateTime<Utc>,
    },

    #[error("graph error: {0}")]
    Graph(String),

    #[error(transparent)]
    Checkpoint(CheckpointError),
}

impl From<CheckpointError> for EngineError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::RetriesExhausted { job_id, attempts } => match job_id.parse() {
                Ok(job_id) => Self::RetriesExhausted { job_id, attempts },
                Err(_) => Self::Checkpoint(CheckpointError::RetriesExhausted { job_id, attempts }),
            },
            other => Self::Checkpoint(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
