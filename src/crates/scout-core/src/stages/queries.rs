use super::{Stage, StageContext};
use crate::error::StageError;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CheckpointUpdate, StageLabel, StageName};
use tracing::debug;

/// Pure tier expansion of the stored variants. Recomputed on every resume.
pub struct GenerateQueries;

#[async_trait]
impl Stage for GenerateQueries {
    fn name(&self) -> StageName {
        StageName::GenerateQueries
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        if state.record.variants.is_empty() {
            return Err(StageError::fatal("cannot generate queries without search variants"));
        }

        let queries = ctx.planner.expand(&state.record.variants);
        debug!(job_id = %state.job_id(), queries = queries.len(), "Query plan generated");

        Ok(StateUpdate::new(CheckpointUpdate::new().with_stage(StageLabel::GeneratingQueries))
            .with_queries(queries))
    }
}
