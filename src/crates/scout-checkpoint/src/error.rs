//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Job or candidate not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary serialization error
    #[error("Binary serialization error: {0}")]
    BinarySerialization(#[from] bincode::Error),

    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Stored data violates a checkpoint invariant
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// Retry ceiling reached, the job can no longer be revived
    #[error("Job {job_id} exhausted its retries ({attempts} attempts)")]
    RetriesExhausted { job_id: String, attempts: u32 },
}
