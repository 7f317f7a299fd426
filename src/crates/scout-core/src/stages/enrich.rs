use super::{classify, Disposition, Stage, StageContext};
use crate::error::StageError;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{
    CheckpointUpdate, ContactInfo, JobCheckpoint, JobStatus, NewCandidate, StageLabel, StageName,
};
use tracing::{debug, info, warn};

/// Contact enrichment for every discovered URL not yet submitted.
///
/// A URL joins the enriched set whatever the outcome, so the provider sees
/// it at most once over the job's lifetime. A miss is a business outcome and
/// the lead is dropped; a reply without an email or phone is a miss whatever
/// its `has_contact` flag says.
pub struct EnrichCandidates;

impl EnrichCandidates {
    async fn checkpoint(
        ctx: &StageContext,
        record: &JobCheckpoint,
        done: Vec<String>,
        processed: usize,
        total: usize,
    ) -> Result<(), StageError> {
        let counters = ctx.candidate_counters(record.id).await?;
        ctx.checkpoints
            .commit(
                record.id,
                CheckpointUpdate::new()
                    .with_stage(StageLabel::Enriching { processed, total })
                    .with_enriched(done)
                    .with_counters(counters),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Stage for EnrichCandidates {
    fn name(&self) -> StageName {
        StageName::EnrichCandidates
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        let pending = record.pending_enrichment();
        let total = pending.len();
        let mut errors = Vec::new();
        let mut processed = 0usize;
        let mut created = 0usize;

        for chunk in pending.chunks(ctx.settings.enrich_checkpoint_every) {
            let mut done = Vec::with_capacity(chunk.len());

            for url in chunk {
                match ctx.capabilities.enricher.enrich(url).await {
                    Ok(enrichment) => {
                        let contact = ContactInfo {
                            email: enrichment.email,
                            phone: enrichment.phone,
                        };
                        if contact.has_contact() {
                            let hint = record.profile_hints.get(url).cloned().unwrap_or_default();
                            let outcome = ctx
                                .candidates
                                .insert_if_absent(NewCandidate {
                                    job_id: record.id,
                                    owner_id: record.owner_id.clone(),
                                    profile_url: url.clone(),
                                    full_name: hint.full_name,
                                    headline: hint.headline,
                                    contact,
                                })
                                .await?;
                            if outcome.is_created() {
                                created += 1;
                            }
                        } else {
                            debug!(
                                job_id = %record.id,
                                url = %url,
                                flagged = enrichment.has_contact,
                                "No contact found, dropping lead"
                            );
                        }
                    }
                    Err(err) => match classify(err) {
                        Disposition::Pause(signal) => {
                            processed += done.len();
                            Self::checkpoint(ctx, record, done, processed, total).await?;
                            ctx.checkpoints
                                .commit(record.id, CheckpointUpdate::new().with_errors(errors))
                                .await?;
                            return Err(StageError::RateLimited(signal));
                        }
                        Disposition::Fatal(message) => {
                            processed += done.len();
                            Self::checkpoint(ctx, record, done, processed, total).await?;
                            return Err(StageError::Fatal(message));
                        }
                        Disposition::Record(message) => {
                            warn!(job_id = %record.id, url = %url, error = %message, "Enrichment failed");
                            errors.push(format!("enrichment of {} failed: {}", url, message));
                        }
                    },
                }
                done.push(url.clone());
            }

            processed += done.len();
            Self::checkpoint(ctx, record, done, processed, total).await?;
        }

        let counters = ctx.candidate_counters(record.id).await?;
        info!(
            job_id = %record.id,
            enriched = total,
            created,
            with_contact = counters.candidates_with_contact.unwrap_or_default(),
            "Enrichment finished"
        );

        Ok(CheckpointUpdate::new()
            .with_status(JobStatus::ProfilesFound)
            .with_stage(StageLabel::Enriching {
                processed: total,
                total,
            })
            .with_enriched(pending)
            .with_counters(counters)
            .with_errors(errors)
            .into())
    }
}
