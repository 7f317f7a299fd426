use super::{classify, Disposition, Stage, StageContext};
use crate::error::StageError;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CheckpointUpdate, JobStatus, StageLabel, StageName};
use tracing::info;

/// Turns the raw description into search variants.
///
/// Not retried within one invocation; a provider failure fails the job.
pub struct FormatDescription;

#[async_trait]
impl Stage for FormatDescription {
    fn name(&self) -> StageName {
        StageName::FormatDescription
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        if !record.variants.is_empty() {
            info!(job_id = %record.id, "Variants already present, skipping formatting");
            return Ok(StateUpdate::default());
        }

        let result = ctx
            .capabilities
            .formatter
            .format(&record.raw_description, &record.requirements, record.max_candidates)
            .await;

        let mut variants = match result {
            Ok(variants) => variants,
            Err(err) => {
                return Err(match classify(err) {
                    Disposition::Pause(signal) => StageError::RateLimited(signal),
                    Disposition::Fatal(message) | Disposition::Record(message) => {
                        StageError::fatal(format!("description formatting failed: {}", message))
                    }
                })
            }
        };

        variants.retain(|v| !v.search_expression.trim().is_empty() || !v.job_titles.is_empty());
        variants.truncate(ctx.settings.max_variants);
        if variants.is_empty() {
            return Err(StageError::fatal("description formatting produced no search variants"));
        }

        info!(job_id = %record.id, variants = variants.len(), "Description formatted");
        Ok(CheckpointUpdate::new()
            .with_status(JobStatus::JdFormatted)
            .with_stage(StageLabel::DescriptionFormatted {
                variants: variants.len(),
            })
            .with_variants(variants)
            .into())
    }
}
