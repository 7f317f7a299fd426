use super::{Stage, StageContext};
use crate::error::StageError;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CheckpointUpdate, ParsedCandidate, ScrapingStatus, StageLabel, StageName};
use tracing::{debug, info, warn};

/// Writes parsed profiles onto the sparse records created at enrichment and
/// marks them SCRAPED.
///
/// Duplicates across the owner's other jobs are flagged, never rejected.
/// Records already SCRAPED are left alone, which makes a rerun a no-op.
pub struct PersistCandidates;

#[async_trait]
impl Stage for PersistCandidates {
    fn name(&self) -> StageName {
        StageName::PersistCandidates
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        let parsed: Vec<ParsedCandidate> = ctx
            .codec
            .load_parsed(ctx.checkpoints.as_ref(), record.id, u32::MAX)
            .await?
            .into_iter()
            .flat_map(|(_, items)| items)
            .collect();

        let total = parsed.len();
        let mut processed = 0usize;
        let mut saved = 0usize;
        let mut duplicates = 0usize;
        let mut errors = Vec::new();

        for chunk in parsed.chunks(ctx.settings.persist_batch_size) {
            for item in chunk {
                let candidate = match ctx.candidates.find_by_url(record.id, &item.profile_url).await {
                    Ok(Some(candidate)) => candidate,
                    Ok(None) => {
                        errors.push(format!("no candidate record for {}", item.profile_url));
                        continue;
                    }
                    Err(err) => {
                        errors.push(format!("lookup of {} failed: {}", item.profile_url, err));
                        continue;
                    }
                };
                if candidate.scraping_status == ScrapingStatus::Scraped {
                    debug!(job_id = %record.id, url = %item.profile_url, "Already saved");
                    continue;
                }

                let duplicate_of = ctx
                    .candidates
                    .find_earlier_duplicate(&record.owner_id, &item.profile_url, record.id)
                    .await
                    .unwrap_or_else(|err| {
                        warn!(url = %item.profile_url, error = %err, "Duplicate check failed");
                        None
                    });
                if duplicate_of.is_some() {
                    duplicates += 1;
                }

                match ctx
                    .candidates
                    .save_profile(candidate.id, item.profile.clone(), duplicate_of)
                    .await
                {
                    Ok(()) => saved += 1,
                    Err(err) => {
                        warn!(job_id = %record.id, url = %item.profile_url, error = %err, "Saving profile failed");
                        errors.push(format!("saving {} failed: {}", item.profile_url, err));
                    }
                }
            }

            processed += chunk.len();
            let counters = ctx.candidate_counters(record.id).await?;
            ctx.checkpoints
                .commit(
                    record.id,
                    CheckpointUpdate::new()
                        .with_stage(StageLabel::SavingProfiles { saved: processed, total })
                        .with_counters(counters),
                )
                .await?;
        }

        info!(job_id = %record.id, total, saved, duplicates, "Profiles saved");

        let counters = ctx.candidate_counters(record.id).await?;
        Ok(CheckpointUpdate::new()
            .with_stage(StageLabel::SavingProfiles {
                saved: total,
                total,
            })
            .with_counters(counters)
            .with_errors(errors)
            .into())
    }
}
