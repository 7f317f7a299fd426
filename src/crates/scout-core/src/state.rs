//! In-memory workflow state threaded through the graph
//!
//! [`SourcingState`] is passed by value from stage to stage. A stage never
//! mutates it; it returns a [`StateUpdate`] and the graph produces the next
//! version with [`SourcingState::apply`], using the same merge policies the
//! checkpoint store applies to the committed record.

use crate::planner::SearchQuery;
use scout_checkpoint::{CheckpointUpdate, JobCheckpoint, JobId};

#[derive(Debug, Clone, PartialEq)]
pub struct SourcingState {
    pub record: JobCheckpoint,
    /// Expanded query plan; never persisted, recomputed from the variants
    pub queries: Vec<SearchQuery>,
    /// Incremented by every applied update
    pub version: u64,
}

/// Partial update returned by a stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub checkpoint: CheckpointUpdate,
    pub queries: Option<Vec<SearchQuery>>,
}

impl StateUpdate {
    pub fn new(checkpoint: CheckpointUpdate) -> Self {
        Self {
            checkpoint,
            queries: None,
        }
    }

    pub fn with_queries(mut self, queries: Vec<SearchQuery>) -> Self {
        self.queries = Some(queries);
        self
    }
}

impl From<CheckpointUpdate> for StateUpdate {
    fn from(checkpoint: CheckpointUpdate) -> Self {
        Self::new(checkpoint)
    }
}

impl SourcingState {
    pub fn new(record: JobCheckpoint, queries: Vec<SearchQuery>) -> Self {
        Self {
            record,
            queries,
            version: 0,
        }
    }

    pub fn job_id(&self) -> JobId {
        self.record.id
    }

    /// Replace the record with a fresh copy read back from the store
    pub fn refreshed(self, record: JobCheckpoint) -> Self {
        Self {
            record,
            queries: self.queries,
            version: self.version + 1,
        }
    }

    /// Produce the next state version
    pub fn apply(self, update: StateUpdate) -> Self {
        let Self {
            mut record,
            queries,
            version,
        } = self;
        record.apply_update(update.checkpoint);
        Self {
            record,
            queries: update.queries.unwrap_or(queries),
            version: version + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scout_checkpoint::{JobRequirements, JobStatus, NewJob};

    #[test]
    fn test_apply_versions_and_merges() {
        let record = JobCheckpoint::new(
            NewJob {
                owner_id: "o".into(),
                title: "t".into(),
                raw_description: "d".into(),
                requirements: JobRequirements::default(),
                max_candidates: 3,
                max_retries: 3,
            },
            Utc::now(),
        );
        let state = SourcingState::new(record, Vec::new());
        let next = state.clone().apply(
            CheckpointUpdate::new()
                .with_status(JobStatus::SearchingProfiles)
                .with_discovered(vec!["u".to_string()])
                .into(),
        );

        assert_eq!(state.version, 0);
        assert_eq!(next.version, 1);
        assert_eq!(next.record.status, JobStatus::SearchingProfiles);
        assert!(state.record.discovered_urls.is_empty());
        assert_eq!(next.record.discovered_urls.len(), 1);
    }
}
