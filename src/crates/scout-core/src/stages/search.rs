use super::{classify, count, Disposition, Stage, StageContext};
use crate::error::StageError;
use crate::planner::{select_next, QueryTier};
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CheckpointUpdate, CounterUpdate, ProfileHint, StageLabel, StageName};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// One search iteration: a primary query plus at most one same-tier
/// fallback when the primary under-returns.
///
/// The loop decision belongs to the graph. This stage only records what it
/// found and bumps the iteration counter.
pub struct SearchProfiles;

#[async_trait]
impl Stage for SearchProfiles {
    fn name(&self) -> StageName {
        StageName::SearchProfiles
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        if state.queries.is_empty() {
            return Err(StageError::fatal("search requested without a query plan"));
        }

        let iteration = record.search_iteration + 1;
        let mut used: BTreeSet<String> = record.used_query_ids.clone();
        let mut known: BTreeSet<String> = record.discovered_urls.clone();
        let mut newly_used = Vec::new();
        let mut new_urls = Vec::new();
        let mut hints = Vec::new();
        let mut errors = Vec::new();
        let mut prefer: Option<QueryTier> = None;

        for attempt in 0..ctx.settings.max_queries_per_iteration {
            let Some(query) = select_next(&state.queries, &used, prefer) else {
                debug!(job_id = %record.id, "Query plan exhausted");
                break;
            };

            debug!(job_id = %record.id, query = %query.id, attempt, "Running search query");
            let fresh = match ctx.capabilities.search.search(query).await {
                Ok(hits) => {
                    let mut fresh = 0usize;
                    for hit in hits {
                        if known.insert(hit.profile_url.clone()) {
                            let hint = ProfileHint {
                                full_name: hit.full_name,
                                headline: hit.headline,
                            };
                            if !hint.is_empty() {
                                hints.push((hit.profile_url.clone(), hint));
                            }
                            new_urls.push(hit.profile_url);
                            fresh += 1;
                        }
                    }
                    fresh
                }
                Err(err) => match classify(err) {
                    Disposition::Pause(signal) => {
                        // The throttled query stays unused so the resumed run issues it again.
                        ctx.checkpoints
                            .commit(
                                record.id,
                                CheckpointUpdate::new()
                                    .with_discovered(new_urls)
                                    .with_hints(hints)
                                    .with_used_queries(newly_used)
                                    .with_errors(errors),
                            )
                            .await?;
                        return Err(StageError::RateLimited(signal));
                    }
                    Disposition::Fatal(message) => return Err(StageError::Fatal(message)),
                    Disposition::Record(message) => {
                        warn!(job_id = %record.id, query = %query.id, error = %message, "Search query failed");
                        errors.push(format!("search query {} failed: {}", query.id, message));
                        0
                    }
                },
            };

            used.insert(query.id.clone());
            newly_used.push(query.id.clone());

            if fresh >= ctx.settings.min_new_results {
                break;
            }
            prefer = Some(query.tier);
        }

        info!(
            job_id = %record.id,
            iteration,
            new_urls = new_urls.len(),
            discovered = known.len(),
            "Search iteration finished"
        );

        Ok(CheckpointUpdate::new()
            .with_stage(StageLabel::Searching {
                iteration,
                max_iterations: ctx.settings.max_iterations,
            })
            .with_discovered(new_urls)
            .with_hints(hints)
            .with_used_queries(newly_used)
            .with_iteration(iteration)
            .with_counters(CounterUpdate {
                profiles_found: Some(count(known.len())),
                ..Default::default()
            })
            .with_errors(errors)
            .into())
    }
}
