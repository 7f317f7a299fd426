use super::{Stage, StageContext};
use crate::error::StageError;
use crate::state::{SourcingState, StateUpdate};
use async_trait::async_trait;
use scout_checkpoint::{CheckpointUpdate, CounterUpdate, JobCheckpoint, StageLabel, StageName};
use std::fmt::Write;
use tracing::info;

/// Report stage for a search loop that ended without a single contact.
///
/// The job still completes: an empty result is an answer, not a failure.
pub struct HandleNoCandidates;

/// Human-readable diagnostic listing what was tried and what to relax
pub fn no_candidates_report(record: &JobCheckpoint, max_iterations: u32) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "No candidates with contact details were found for \"{}\".", record.title);
    let _ = writeln!(
        report,
        "Searched {} of {} iterations, {} strategies tried, {} profiles discovered, {} enriched.",
        record.search_iteration,
        max_iterations,
        record.used_query_ids.len(),
        record.discovered_urls.len(),
        record.enriched_urls.len(),
    );

    let _ = writeln!(report, "\nStrategies tried:");
    if record.used_query_ids.is_empty() {
        let _ = writeln!(report, "  (none)");
    }
    for id in &record.used_query_ids {
        let _ = writeln!(report, "  - {}", id);
    }

    let _ = writeln!(report, "\nSuggested relaxations:");
    for suggestion in suggestions(record) {
        let _ = writeln!(report, "  - {}", suggestion);
    }
    report
}

fn suggestions(record: &JobCheckpoint) -> Vec<String> {
    let requirements = &record.requirements;
    let mut out = Vec::new();

    if !requirements.locations.is_empty() {
        out.push(format!(
            "Widen the location filter beyond {}",
            requirements.locations.join(", ")
        ));
    }
    if requirements.job_titles.len() <= 2 {
        out.push("Add adjacent or alternative job titles".to_string());
    }
    if requirements.skills.len() > 5 {
        out.push(format!(
            "Move some of the {} required skills to nice-to-have",
            requirements.skills.len()
        ));
    }
    if let Some(years) = requirements.min_years_experience.filter(|years| *years > 2) {
        out.push(format!("Lower the minimum experience from {} years", years));
    }
    if !requirements.industries.is_empty() {
        out.push("Drop the industry restriction".to_string());
    }
    if requirements.seniority.is_some() {
        out.push("Accept one seniority level above or below".to_string());
    }
    if out.is_empty() {
        out.push("Rewrite the description with broader, more common terms".to_string());
    }
    out
}

#[async_trait]
impl Stage for HandleNoCandidates {
    fn name(&self) -> StageName {
        StageName::HandleNoCandidates
    }

    async fn run(&self, state: &SourcingState, ctx: &StageContext) -> Result<StateUpdate, StageError> {
        let record = &state.record;
        let report = no_candidates_report(record, ctx.settings.max_iterations);
        info!(
            job_id = %record.id,
            strategies = record.used_query_ids.len(),
            "No candidates found, completing with report"
        );

        Ok(CheckpointUpdate::new()
            .with_stage(StageLabel::NoCandidatesFound)
            .with_counters(CounterUpdate {
                profiles_found: Some(0),
                candidates_with_contact: Some(0),
                scraped: Some(0),
                parsed: Some(0),
                saved: Some(0),
                scored: Some(0),
            })
            .with_report(report)
            .into())
    }
}
