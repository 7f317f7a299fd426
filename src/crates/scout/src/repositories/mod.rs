//! SQLite-backed stores for jobs, batch payloads and candidates

pub mod candidate_repository;
pub mod job_repository;

pub use candidate_repository::SqliteCandidateStore;
pub use job_repository::SqliteCheckpointStore;

use chrono::{DateTime, Utc};
use scout_checkpoint::CheckpointError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

type Result<T> = std::result::Result<T, CheckpointError>;

/// Wrap a sqlx failure as a storage error naming the operation
pub(crate) fn storage(operation: &'static str) -> impl FnOnce(sqlx::Error) -> CheckpointError {
    move |e| CheckpointError::Storage(format!("Failed to {}: {}", operation, e))
}

/// Timestamps are stored as unix seconds
pub(crate) fn to_secs(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub(crate) fn from_secs(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| CheckpointError::Invalid(format!("timestamp out of range: {}", secs)))
}

/// Current time truncated to what the schema can hold
pub(crate) fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now)
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

pub(crate) fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| CheckpointError::Storage(format!("Failed to read column {}: {}", name, e)))
}

pub(crate) fn u32_column(row: &SqliteRow, name: &str) -> Result<u32> {
    let value: i64 = column(row, name)?;
    u32::try_from(value)
        .map_err(|_| CheckpointError::Invalid(format!("column {} out of range: {}", name, value)))
}

pub(crate) fn uuid_column(row: &SqliteRow, name: &str) -> Result<Uuid> {
    let text: String = column(row, name)?;
    parse_uuid(&text)
}

pub(crate) fn parse_uuid(text: &str) -> Result<Uuid> {
    Uuid::parse_str(text).map_err(|e| CheckpointError::Invalid(format!("bad id {}: {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_round_trip() {
        let now = now_secs();
        assert_eq!(from_secs(to_secs(now)).unwrap(), now);
        assert_eq!(now.timestamp_subsec_nanos(), 0);
    }

    #[test]
    fn test_bad_uuid_is_invalid() {
        assert!(matches!(parse_uuid("nope"), Err(CheckpointError::Invalid(_))));
    }
}
