use super::{classify, count, Disposition, Stage, StageContext};
use crate::error::StageError;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CheckpointUpdate, CounterUpdate, RawProfile, StageLabel, StageName};
use tracing::{debug, info, warn};

/// Fetches full profile detail for PENDING candidates in batches.
///
/// Batches are the PENDING records ordered by URL and cut into fixed-size
/// chunks, which stays stable across resumes because nothing leaves PENDING
/// before the persist stage. Every batch payload is stored before the batch
/// pointer moves.
pub struct ScrapeCandidates;

#[async_trait]
impl Stage for ScrapeCandidates {
    fn name(&self) -> StageName {
        StageName::ScrapeCandidates
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        let pending: Vec<String> = ctx
            .candidates
            .list_pending(record.id)
            .await?
            .into_iter()
            .map(|candidate| candidate.profile_url)
            .collect();

        let batches: Vec<&[String]> = pending.chunks(ctx.settings.scrape_batch_size).collect();
        let total = count(batches.len());
        let resume_from = record.last_scraped_batch;

        let mut scraped: usize = ctx
            .codec
            .load_scraped(ctx.checkpoints.as_ref(), record.id, resume_from)
            .await?
            .iter()
            .map(|(_, profiles)| profiles.len())
            .sum();
        let mut errors = Vec::new();

        if resume_from > 0 {
            info!(job_id = %record.id, resume_from, total, "Resuming scrape");
        }

        for (offset, urls) in batches.into_iter().enumerate() {
            let batch = count(offset + 1);
            if batch <= resume_from {
                continue;
            }

            debug!(job_id = %record.id, batch, total, size = urls.len(), "Scraping batch");
            let profiles: Vec<RawProfile> = match ctx.capabilities.scraper.scrape(urls).await {
                Ok(profiles) => profiles,
                Err(err) => match classify(err) {
                    Disposition::Pause(signal) => {
                        ctx.checkpoints
                            .commit(record.id, CheckpointUpdate::new().with_errors(errors))
                            .await?;
                        return Err(StageError::RateLimited(signal));
                    }
                    Disposition::Fatal(message) => return Err(StageError::Fatal(message)),
                    Disposition::Record(message) => {
                        warn!(job_id = %record.id, batch, error = %message, "Scrape batch failed");
                        errors.push(format!("scrape batch {} of {} failed: {}", batch, total, message));
                        Vec::new()
                    }
                },
            };

            scraped += profiles.len();
            ctx.checkpoints
                .put_batch(record.id, ctx.codec.encode_scraped(batch, &profiles)?)
                .await?;
            ctx.checkpoints
                .commit(
                    record.id,
                    CheckpointUpdate::new()
                        .with_stage(StageLabel::ScrapingBatch { batch, total })
                        .with_scraped_batch(batch)
                        .with_counters(CounterUpdate {
                            scraped: Some(count(scraped)),
                            ..Default::default()
                        }),
                )
                .await?;
        }

        info!(job_id = %record.id, batches = total, scraped, "Scraping finished");

        Ok(CheckpointUpdate::new()
            .with_stage(StageLabel::ScrapingBatch {
                batch: total,
                total,
            })
            .with_scraped_batch(total.max(resume_from))
            .with_counters(CounterUpdate {
                scraped: Some(count(scraped)),
                ..Default::default()
            })
            .with_errors(errors)
            .into())
    }
}
