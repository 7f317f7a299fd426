use super::{classify, Disposition, Stage, StageContext};
use crate::capabilities::ScoringContext;
use crate::error::{CapabilityError, StageError};
use crate::state::{SourcingState, StateUpdate};
use crate::validation::score_from_value;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scout_checkpoint::{CandidateId, CandidateRecord, CheckpointUpdate, StageLabel, StageName};
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Rubric scoring of every SCRAPED, unscored candidate.
///
/// Loops in fixed-size batches until nothing is left to score. Candidates
/// whose scoring failed in this run are not picked up again until the next
/// run, so a persistently failing profile cannot stall the loop.
pub struct ScoreCandidates;

async fn score_one(
    ctx: &StageContext,
    context: &ScoringContext,
    candidate: CandidateRecord,
) -> (CandidateRecord, Result<Value, CapabilityError>) {
    let profile = candidate.profile.clone().unwrap_or_default();
    let result = ctx.capabilities.scorer.score(context, &profile).await;
    (candidate, result)
}

#[async_trait]
impl Stage for ScoreCandidates {
    fn name(&self) -> StageName {
        StageName::ScoreCandidates
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        let context = ScoringContext {
            title: record.title.clone(),
            description: record.raw_description.clone(),
            requirements: record.requirements.clone(),
        };

        let mut skipped: HashSet<CandidateId> = HashSet::new();
        let mut errors = Vec::new();
        let mut batch = 0u32;
        let mut scored = 0usize;

        loop {
            let unscored: Vec<CandidateRecord> = ctx
                .candidates
                .list_unscored(record.id)
                .await?
                .into_iter()
                .filter(|candidate| !skipped.contains(&candidate.id))
                .take(ctx.settings.score_batch_size)
                .collect();
            if unscored.is_empty() {
                break;
            }

            batch += 1;
            debug!(job_id = %record.id, batch, size = unscored.len(), "Scoring batch");
            let results: Vec<_> = stream::iter(unscored)
                .map(|candidate| score_one(ctx, &context, candidate))
                .buffer_unordered(ctx.settings.score_concurrency)
                .collect()
                .await;

            let mut pause = None;
            let mut fatal = None;
            for (candidate, result) in results {
                match result {
                    Ok(value) => {
                        let (score, _) = score_from_value(&value);
                        match ctx.candidates.save_score(candidate.id, score).await {
                            Ok(()) => scored += 1,
                            Err(err) => {
                                skipped.insert(candidate.id);
                                errors.push(format!("saving score of {} failed: {}", candidate.profile_url, err));
                            }
                        }
                    }
                    Err(err) => {
                        skipped.insert(candidate.id);
                        match classify(err) {
                            Disposition::Pause(signal) => pause = Some(signal),
                            Disposition::Fatal(message) => fatal = Some(message),
                            Disposition::Record(message) => {
                                warn!(job_id = %record.id, url = %candidate.profile_url, error = %message, "Scoring failed");
                                errors.push(format!("scoring {} failed: {}", candidate.profile_url, message));
                            }
                        }
                    }
                }
            }

            let counters = ctx.candidate_counters(record.id).await?;
            ctx.checkpoints
                .commit(
                    record.id,
                    CheckpointUpdate::new()
                        .with_stage(StageLabel::ScoringBatch { batch })
                        .with_counters(counters),
                )
                .await?;

            if let Some(message) = fatal {
                return Err(StageError::Fatal(message));
            }
            if let Some(signal) = pause {
                ctx.checkpoints
                    .commit(record.id, CheckpointUpdate::new().with_errors(errors))
                    .await?;
                return Err(StageError::RateLimited(signal));
            }
        }

        info!(job_id = %record.id, batches = batch, scored, "Scoring finished");

        let counters = ctx.candidate_counters(record.id).await?;
        Ok(CheckpointUpdate::new()
            .with_stage(StageLabel::ScoringBatch { batch })
            .with_counters(counters)
            .with_errors(errors)
            .into())
    }
}
