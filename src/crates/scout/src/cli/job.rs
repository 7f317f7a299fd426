//! Job command handlers: create, run, retry, status, list, delete

use super::{describe_outcome, print_json, OutputFormat};
use crate::app::ScoutApp;
use crate::error::Result;
use crate::shutdown::ShutdownCoordinator;
use scout_checkpoint::{JobCheckpoint, JobId};
use scout_core::{JobRequest, ProgressSnapshot, RunOutcome};
use std::future::Future;
use serde_json::json;
use std::fmt::Write as _;

/// Handle `scout create`; runs the job in the foreground when `run` is set
pub async fn handle_create(
    app: &ScoutApp,
    shutdown: &ShutdownCoordinator,
    request: JobRequest,
    run: bool,
) -> Result<()> {
    let job_id = app.engine().create_job(request).await?;
    println!("Job created: {}", job_id);

    if run {
        handle_run(app, shutdown, job_id).await?;
    }
    Ok(())
}

/// Handle `scout run`
pub async fn handle_run(app: &ScoutApp, shutdown: &ShutdownCoordinator, job_id: JobId) -> Result<()> {
    until_shutdown(shutdown, job_id, app.engine().run(job_id)).await
}

/// Handle `scout retry`
pub async fn handle_retry(app: &ScoutApp, shutdown: &ShutdownCoordinator, job_id: JobId) -> Result<()> {
    until_shutdown(shutdown, job_id, app.engine().retry(job_id)).await
}

/// Drive a foreground run until it halts or shutdown is requested.
///
/// Dropping the run leaves the job at its last checkpoint.
async fn until_shutdown<F>(shutdown: &ShutdownCoordinator, job_id: JobId, run: F) -> Result<()>
where
    F: Future<Output = scout_core::Result<RunOutcome>>,
{
    tokio::select! {
        outcome = run => {
            println!("Job {} {}", job_id, describe_outcome(&outcome?));
        }
        _ = shutdown.wait_for_shutdown() => {
            println!("Job {} interrupted, it resumes from its last checkpoint", job_id);
        }
    }
    Ok(())
}

/// Handle `scout status`
pub async fn handle_status(
    app: &ScoutApp,
    job_id: JobId,
    top: usize,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = app.engine().progress(job_id, top).await?;
    match format {
        OutputFormat::Json => print_json(&snapshot),
        OutputFormat::Text => {
            print!("{}", render_snapshot(&snapshot));
            Ok(())
        }
    }
}

/// Handle `scout list`
pub async fn handle_list(app: &ScoutApp, owner: Option<&str>, format: OutputFormat) -> Result<()> {
    let jobs = app.engine().list_jobs(owner).await?;
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = jobs.iter().map(job_summary).collect();
            print_json(&rows)
        }
        OutputFormat::Text => {
            if jobs.is_empty() {
                println!("No jobs found");
                return Ok(());
            }
            println!(
                "{:<36}  {:<18}  {:>5}  {:>6}  {}",
                "ID", "STATUS", "FOUND", "SCORED", "TITLE"
            );
            for job in &jobs {
                println!(
                    "{:<36}  {:<18}  {:>5}  {:>6}  {}",
                    job.id,
                    job.status.as_str(),
                    job.counters.profiles_found,
                    job.counters.scored,
                    job.title
                );
            }
            Ok(())
        }
    }
}

/// Handle `scout delete`
pub async fn handle_delete(app: &ScoutApp, job_id: JobId) -> Result<()> {
    let removed = app.engine().delete_job(job_id).await?;
    println!("Job {} deleted ({} candidates removed)", job_id, removed);
    Ok(())
}

fn job_summary(job: &JobCheckpoint) -> serde_json::Value {
    json!({
        "id": job.id,
        "owner_id": job.owner_id,
        "title": job.title,
        "status": job.status,
        "current_stage": job.current_stage.to_string(),
        "counters": job.counters,
        "retry_count": job.retry_count,
        "created_at": job.created_at,
        "last_activity_at": job.last_activity_at,
    })
}

/// Human-readable progress view
pub fn render_snapshot(snapshot: &ProgressSnapshot) -> String {
    let mut out = String::new();
    let counters = &snapshot.counters;

    let _ = writeln!(out, "Job:            {}", snapshot.job_id);
    let _ = writeln!(out, "Title:          {}", snapshot.title);
    let _ = writeln!(
        out,
        "Status:         {} ({}){}",
        snapshot.status,
        snapshot.current_stage,
        if snapshot.running { ", running" } else { "" }
    );
    let _ = writeln!(
        out,
        "Last completed: {}",
        snapshot
            .last_completed_stage
            .map_or("none", |stage| stage.as_str())
    );
    let _ = writeln!(out, "Search passes:  {}", snapshot.search_iteration);
    let _ = writeln!(
        out,
        "Progress:       found {} / {}, with contact {}, scraped {}, parsed {}, saved {}, scored {}",
        counters.profiles_found,
        snapshot.max_candidates,
        counters.candidates_with_contact,
        counters.scraped,
        counters.parsed,
        counters.saved,
        counters.scored
    );
    let _ = writeln!(
        out,
        "Retries:        {}/{}",
        snapshot.retry_count, snapshot.max_retries
    );
    if let Some(until) = snapshot.rate_limited_until {
        let _ = writeln!(out, "Paused until:   {}", until.to_rfc3339());
    }
    if let Some(error) = &snapshot.error_message {
        let _ = writeln!(out, "Error:          {}", error);
    }

    if !snapshot.top_candidates.is_empty() {
        let _ = writeln!(out, "\nTop candidates:");
        for candidate in &snapshot.top_candidates {
            let _ = write!(
                out,
                "  {:>3}  {:<10}  {}  {}",
                candidate.overall,
                candidate.recommendation.as_str(),
                candidate.full_name.as_deref().unwrap_or("(unnamed)"),
                candidate.profile_url
            );
            if let Some(earlier) = candidate.duplicate_of_job {
                let _ = write!(out, "  [seen in job {}]", earlier);
            }
            let _ = writeln!(out);
        }
    }

    if let Some(report) = &snapshot.no_candidates_report {
        let _ = writeln!(out, "\n{}", report);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scout_checkpoint::{JobCounters, JobStatus, Recommendation, StageName};
    use scout_core::ScoredCandidate;
    use uuid::Uuid;

    fn snapshot() -> ProgressSnapshot {
        ProgressSnapshot {
            job_id: Uuid::new_v4(),
            title: "Data Engineer".into(),
            status: JobStatus::ScrapingProfiles,
            current_stage: "SCRAPING_BATCH_2_OF_4".into(),
            last_completed_stage: Some(StageName::EnrichCandidates),
            search_iteration: 2,
            max_candidates: 40,
            counters: JobCounters {
                profiles_found: 35,
                candidates_with_contact: 20,
                scraped: 10,
                ..Default::default()
            },
            error_message: None,
            rate_limited_until: None,
            retry_count: 1,
            max_retries: 3,
            no_candidates_report: None,
            running: true,
            last_activity_at: Utc::now(),
            top_candidates: vec![ScoredCandidate {
                profile_url: "https://www.linkedin.com/in/ada".into(),
                full_name: Some("Ada".into()),
                headline: None,
                overall: 91,
                recommendation: Recommendation::StrongYes,
                duplicate_of_job: None,
            }],
        }
    }

    #[test]
    fn test_render_snapshot_shows_stage_and_counters() {
        let text = render_snapshot(&snapshot());
        assert!(text.contains("SCRAPING_PROFILES (SCRAPING_BATCH_2_OF_4), running"));
        assert!(text.contains("Last completed: enrich_candidates"));
        assert!(text.contains("found 35 / 40, with contact 20, scraped 10"));
        assert!(text.contains("Retries:        1/3"));
        assert!(text.contains(" 91  strong_yes  Ada  https://www.linkedin.com/in/ada"));
    }

    #[test]
    fn test_render_snapshot_includes_report() {
        let mut snapshot = snapshot();
        snapshot.top_candidates.clear();
        snapshot.no_candidates_report = Some("No candidates found for Data Engineer".into());
        let text = render_snapshot(&snapshot);
        assert!(!text.contains("Top candidates"));
        assert!(text.ends_with("No candidates found for Data Engineer\n"));
    }
}
