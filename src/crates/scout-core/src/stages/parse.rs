use super::{classify, count, Disposition, Stage, StageContext};
use crate::error::{RateLimitSignal, StageError};
use crate::state::{SourcingState, StateUpdate};
use crate::validation::profile_from_value;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use scout_checkpoint::{
    CheckpointUpdate, CounterUpdate, ParsedCandidate, ParsedProfile, RawProfile, StageLabel,
    StageName,
};
use tracing::{debug, info, warn};

/// AI extraction over the stored scrape payloads.
///
/// Runs in smaller batches than scraping with bounded parallelism inside a
/// batch. A profile that fails extraction falls back to a best-effort
/// profile assembled from its raw payload and never blocks the batch.
pub struct ParseCandidates;

enum ItemOutcome {
    Parsed(ParsedCandidate),
    Failed(ParsedCandidate, String),
    Paused(RateLimitSignal),
    Fatal(String),
}

async fn parse_one(ctx: &StageContext, raw: RawProfile) -> ItemOutcome {
    match ctx.capabilities.parser.parse(&raw).await {
        Ok(value) => {
            let (profile, fallback) = profile_from_value(&value);
            ItemOutcome::Parsed(ParsedCandidate {
                profile_url: raw.profile_url,
                profile,
                fallback,
            })
        }
        Err(err) => match classify(err) {
            Disposition::Pause(signal) => ItemOutcome::Paused(signal),
            Disposition::Fatal(message) => ItemOutcome::Fatal(message),
            Disposition::Record(message) => {
                let message = format!("parsing {} failed: {}", raw.profile_url, message);
                ItemOutcome::Failed(
                    ParsedCandidate {
                        profile: ParsedProfile::fallback_from(&raw.payload),
                        profile_url: raw.profile_url,
                        fallback: true,
                    },
                    message,
                )
            }
        },
    }
}

#[async_trait]
impl Stage for ParseCandidates {
    fn name(&self) -> StageName {
        StageName::ParseCandidates
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        let raws: Vec<RawProfile> = ctx
            .codec
            .load_scraped(ctx.checkpoints.as_ref(), record.id, u32::MAX)
            .await?
            .into_iter()
            .flat_map(|(_, profiles)| profiles)
            .collect();

        let batches: Vec<&[RawProfile]> = raws.chunks(ctx.settings.parse_batch_size).collect();
        let total = count(batches.len());
        let resume_from = record.last_parsed_batch;

        let mut parsed: usize = ctx
            .codec
            .load_parsed(ctx.checkpoints.as_ref(), record.id, resume_from)
            .await?
            .iter()
            .map(|(_, items)| items.len())
            .sum();
        let mut fallbacks = 0usize;
        let mut errors = Vec::new();

        for (offset, chunk) in batches.into_iter().enumerate() {
            let batch = count(offset + 1);
            if batch <= resume_from {
                continue;
            }

            debug!(job_id = %record.id, batch, total, size = chunk.len(), "Parsing batch");
            let outcomes: Vec<ItemOutcome> = stream::iter(chunk.iter().cloned())
                .map(|raw| parse_one(ctx, raw))
                .buffer_unordered(ctx.settings.parse_concurrency)
                .collect()
                .await;

            let mut items = Vec::with_capacity(outcomes.len());
            let mut pause = None;
            let mut fatal = None;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Parsed(item) => {
                        if item.fallback {
                            fallbacks += 1;
                        }
                        items.push(item);
                    }
                    ItemOutcome::Failed(item, message) => {
                        warn!(job_id = %record.id, url = %item.profile_url, "Profile extraction failed, using fallback");
                        fallbacks += 1;
                        errors.push(message);
                        items.push(item);
                    }
                    ItemOutcome::Paused(signal) => pause = Some(signal),
                    ItemOutcome::Fatal(message) => fatal = Some(message),
                }
            }

            if let Some(message) = fatal {
                return Err(StageError::Fatal(message));
            }
            if let Some(signal) = pause {
                // The whole batch is redone after the pause; nothing from it is kept.
                ctx.checkpoints
                    .commit(record.id, CheckpointUpdate::new().with_errors(errors))
                    .await?;
                return Err(StageError::RateLimited(signal));
            }

            items.sort_by(|a, b| a.profile_url.cmp(&b.profile_url));
            parsed += items.len();
            ctx.checkpoints
                .put_batch(record.id, ctx.codec.encode_parsed(batch, &items)?)
                .await?;
            ctx.checkpoints
                .commit(
                    record.id,
                    CheckpointUpdate::new()
                        .with_stage(StageLabel::ParsingBatch { batch, total })
                        .with_parsed_batch(batch)
                        .with_counters(CounterUpdate {
                            parsed: Some(count(parsed)),
                            ..Default::default()
                        }),
                )
                .await?;
        }

        info!(job_id = %record.id, batches = total, parsed, fallbacks, "Parsing finished");

        Ok(CheckpointUpdate::new()
            .with_stage(StageLabel::ParsingBatch {
                batch: total,
                total,
            })
            .with_parsed_batch(total.max(resume_from))
            .with_counters(CounterUpdate {
                parsed: Some(count(parsed)),
                ..Default::default()
            })
            .with_errors(errors)
            .into())
    }
}
