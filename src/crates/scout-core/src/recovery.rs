//! Periodic recovery of stale and rate-limited jobs
//!
//! A job is eligible when it is not running in this process and either
//! - it is RATE_LIMITED and its reset time has passed, or
//! - it is unfinished and its last activity is older than the staleness
//!   window.
//!
//! Stale jobs consume one retry per recovery; a job already at its ceiling
//! is failed for good with a message naming the stage it died in. Eligible
//! jobs are resumed concurrently, at most `concurrency` at a time.

use crate::engine::SourcingEngine;
use crate::error::{EngineError, Result};
use crate::graph::RunOutcome;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use scout_checkpoint::{JobCheckpoint, JobId, JobOutcome, JobStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    /// Unfinished jobs idle for longer than this are resumed
    pub staleness: Duration,
    /// Ceiling applied on top of each job's own `max_retries`
    pub max_retries: u32,
    /// Recovered jobs running at the same time within one sweep
    pub concurrency: usize,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            staleness: Duration::minutes(30),
            max_retries: 3,
            concurrency: 4,
        }
    }
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub recovered: u32,
    pub failed: u32,
    pub max_retries_reached: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Eligibility {
    RateLimitElapsed,
    Stale,
}

#[derive(Debug, Clone)]
pub struct RecoverySweeper {
    engine: SourcingEngine,
    policy: RecoveryPolicy,
}

impl RecoverySweeper {
    pub fn new(engine: SourcingEngine, policy: RecoveryPolicy) -> Self {
        Self { engine, policy }
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    fn eligibility(&self, job: &JobCheckpoint, now: DateTime<Utc>) -> Option<Eligibility> {
        if job.status.is_terminal() || self.engine.is_running(job.id) {
            return None;
        }
        if job.status == JobStatus::RateLimited {
            let elapsed = job.rate_limit.as_ref().map_or(true, |limit| now >= limit.reset_at);
            return elapsed.then_some(Eligibility::RateLimitElapsed);
        }
        let cutoff = now.checked_sub_signed(self.policy.staleness)?;
        (job.last_activity_at < cutoff).then_some(Eligibility::Stale)
    }

    async fn fail_permanently(&self, job: &JobCheckpoint) -> Result<()> {
        let message = format!(
            "Job stuck in {} (last completed: {}) and failed permanently after {} recovery attempts",
            job.current_stage,
            job.last_completed_stage.map_or("none", |stage| stage.as_str()),
            job.retry_count
        );
        warn!(job_id = %job.id, retries = job.retry_count, "Retry ceiling reached");
        self.engine
            .context()
            .checkpoints
            .mark_terminal(job.id, JobOutcome::Failed { message })
            .await?;
        Ok(())
    }

    /// Scan unfinished jobs once and resume every eligible one.
    ///
    /// A failure on one job is logged and counted; the sweep carries on with
    /// the rest.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<RecoverySummary> {
        let jobs = self.engine.context().checkpoints.list_unfinished().await?;
        let mut summary = RecoverySummary::default();
        let mut due: Vec<JobId> = Vec::new();

        for job in jobs {
            let Some(eligibility) = self.eligibility(&job, now) else {
                continue;
            };

            let ceiling = job.max_retries.min(self.policy.max_retries);
            if eligibility == Eligibility::Stale && job.retry_count >= ceiling {
                match self.fail_permanently(&job).await {
                    Ok(()) => summary.max_retries_reached += 1,
                    Err(err) => {
                        error!(job_id = %job.id, error = %err, "Could not fail job at retry ceiling");
                        summary.failed += 1;
                    }
                }
                continue;
            }

            debug!(job_id = %job.id, ?eligibility, "Recovering job");
            due.push(job.id);
        }

        let outcomes: Vec<_> = stream::iter(due)
            .map(|job_id| async move { (job_id, self.engine.retry_at(job_id, now).await) })
            .buffer_unordered(self.policy.concurrency.max(1))
            .collect()
            .await;

        for (job_id, outcome) in outcomes {
            match outcome {
                Ok(RunOutcome::Failed { message }) => {
                    warn!(job_id = %job_id, error = %message, "Recovered job failed");
                    summary.failed += 1;
                }
                Ok(outcome) => {
                    info!(job_id = %job_id, ?outcome, "Job recovered");
                    summary.recovered += 1;
                }
                Err(EngineError::AlreadyRunning(_)) => {
                    debug!(job_id = %job_id, "Picked up elsewhere in this process, skipping");
                }
                Err(EngineError::RetriesExhausted { .. }) => summary.max_retries_reached += 1,
                Err(err) => {
                    error!(job_id = %job_id, error = %err, "Recovery failed");
                    summary.failed += 1;
                }
            }
        }

        info!(
            recovered = summary.recovered,
            failed = summary.failed,
            max_retries_reached = summary.max_retries_reached,
            "Recovery sweep finished"
        );
        Ok(summary)
    }

    /// Sweep every `interval` until `shutdown` resolves.
    ///
    /// Shutdown also interrupts a sweep in progress; jobs it was running
    /// stay at their last checkpoint for the next sweep.
    pub async fn run_periodic<F>(&self, interval: std::time::Duration, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = &mut shutdown => {
                            warn!("Shutdown during recovery sweep, interrupted jobs stay at their last checkpoint");
                            break;
                        }
                        result = self.sweep(Utc::now()) => {
                            if let Err(err) = result {
                                error!(error = %err, "Recovery sweep failed");
                            }
                        }
                    }
                }
            }
        }
        info!("Recovery sweeper stopping");
    }
}
