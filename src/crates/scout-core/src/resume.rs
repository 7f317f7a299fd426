//! Rebuilding in-memory state from the checkpoint store
//!
//! Used by manual retry and by the recovery sweep. The builder never trusts
//! counters from before a crash: it recounts them from candidate storage and
//! the stored batch payloads and commits the recount before anything runs.

use crate::error::Result;
use crate::graph::{next_after, route_after_enrich, Target};
use crate::stages::StageContext;
use crate::state::SourcingState;
use scout_checkpoint::{CheckpointUpdate, CounterUpdate, JobCheckpoint, JobId, StageName};
use tracing::info;

/// A rebuilt state and the stage execution continues from
#[derive(Debug, Clone)]
pub struct ResumePlan {
    pub state: SourcingState,
    pub entry: Target,
}

#[derive(Debug, Clone)]
pub struct ResumeBuilder {
    ctx: StageContext,
}

impl ResumeBuilder {
    pub fn new(ctx: StageContext) -> Self {
        Self { ctx }
    }

    /// Counters recomputed from durable storage
    pub async fn recount(&self, record: &JobCheckpoint) -> Result<CounterUpdate> {
        let ctx = &self.ctx;
        let counts = ctx.candidates.counts(record.id).await?;
        let scraped: usize = ctx
            .codec
            .load_scraped(ctx.checkpoints.as_ref(), record.id, record.last_scraped_batch)
            .await?
            .iter()
            .map(|(_, profiles)| profiles.len())
            .sum();
        let parsed: usize = ctx
            .codec
            .load_parsed(ctx.checkpoints.as_ref(), record.id, record.last_parsed_batch)
            .await?
            .iter()
            .map(|(_, items)| items.len())
            .sum();

        let no_candidates = record.last_completed_stage == Some(StageName::HandleNoCandidates);
        let discovered = if no_candidates {
            0
        } else {
            record.discovered_urls.len()
        };

        Ok(CounterUpdate {
            profiles_found: Some(u32::try_from(discovered).unwrap_or(u32::MAX)),
            candidates_with_contact: Some(counts.with_contact),
            scraped: Some(u32::try_from(scraped).unwrap_or(u32::MAX)),
            parsed: Some(u32::try_from(parsed).unwrap_or(u32::MAX)),
            saved: Some(counts.scraped),
            scored: Some(counts.scored),
        })
    }

    /// Load the checkpoint, resynchronize its counters, regenerate the query
    /// plan and pick the entry stage
    pub async fn rebuild(&self, job_id: JobId) -> Result<ResumePlan> {
        let record = self.ctx.checkpoints.load(job_id).await?;
        let counters = self.recount(&record).await?;
        let record = self
            .ctx
            .checkpoints
            .commit(job_id, CheckpointUpdate::new().with_counters(counters))
            .await?;

        let queries = self.ctx.planner.expand(&record.variants);
        let state = SourcingState::new(record, queries);
        let entry = entry_point(&state, &self.ctx);

        info!(
            job_id = %job_id,
            last_completed = ?state.record.last_completed_stage,
            entry = %entry,
            discovered = state.record.discovered_urls.len(),
            enriched = state.record.enriched_urls.len(),
            scraped_batches = state.record.last_scraped_batch,
            parsed_batches = state.record.last_parsed_batch,
            "Rebuilt job state"
        );
        Ok(ResumePlan { state, entry })
    }
}

/// Stage to continue from, derived from the forward-only pointer.
///
/// Inside the search loop the pointer alone is ambiguous: discovered URLs
/// still waiting for enrichment send the job back into enrichment, anything
/// else is decided by the same branch the graph evaluates after enrichment.
pub fn entry_point(state: &SourcingState, ctx: &StageContext) -> Target {
    match state.record.last_completed_stage {
        None => Target::Stage(StageName::FormatDescription),
        Some(StageName::SearchProfiles | StageName::EnrichCandidates) => {
            if state.record.pending_enrichment().is_empty() {
                route_after_enrich(state, &ctx.settings)
            } else {
                Target::Stage(StageName::EnrichCandidates)
            }
        }
        Some(stage) => next_after(stage),
    }
}
