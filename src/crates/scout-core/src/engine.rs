//! Job-level entry points: create, run, retry, progress, delete
//!
//! The job id is the continuation key of every execution. The engine keeps
//! an in-process set of running job ids so a retry or a sweep can never
//! start a second, conflicting execution of the same lineage.

use crate::capabilities::Capabilities;
use crate::error::{EngineError, Result};
use crate::graph::{RunOutcome, SourcingGraph};
use crate::resume::ResumeBuilder;
use crate::settings::WorkflowSettings;
use crate::stages::StageContext;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scout_checkpoint::{
    CandidateStore, CheckpointStore, JobCheckpoint, JobCounters, JobId, JobRequirements,
    JobStatus, NewJob, Recommendation, StageName,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Inbound job creation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub owner_id: String,
    pub title: String,
    pub raw_description: String,
    #[serde(default)]
    pub requirements: JobRequirements,
    pub max_candidates: u32,
}

/// One scored candidate as shown in progress views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub profile_url: String,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub overall: u8,
    pub recommendation: Recommendation,
    pub duplicate_of_job: Option<JobId>,
}

/// Read-only view of a job for progress consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: JobId,
    pub title: String,
    pub status: JobStatus,
    pub current_stage: String,
    pub last_completed_stage: Option<StageName>,
    pub search_iteration: u32,
    pub max_candidates: u32,
    pub counters: JobCounters,
    pub error_message: Option<String>,
    pub rate_limited_until: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub no_candidates_report: Option<String>,
    pub running: bool,
    pub last_activity_at: DateTime<Utc>,
    pub top_candidates: Vec<ScoredCandidate>,
}

/// Marks a job as executing in this process until dropped
struct InFlightGuard {
    running: Arc<Mutex<HashSet<JobId>>>,
    job_id: JobId,
}

impl InFlightGuard {
    fn acquire(running: &Arc<Mutex<HashSet<JobId>>>, job_id: JobId) -> Result<Self> {
        if !running.lock().insert(job_id) {
            return Err(EngineError::AlreadyRunning(job_id));
        }
        Ok(Self {
            running: Arc::clone(running),
            job_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.running.lock().remove(&self.job_id);
    }
}

#[derive(Clone)]
pub struct SourcingEngine {
    graph: Arc<SourcingGraph>,
    resume: ResumeBuilder,
    running: Arc<Mutex<HashSet<JobId>>>,
}

impl SourcingEngine {
    pub fn new(
        checkpoints: Arc<dyn CheckpointStore>,
        candidates: Arc<dyn CandidateStore>,
        capabilities: Capabilities,
        settings: WorkflowSettings,
    ) -> Self {
        let ctx = StageContext::new(checkpoints, candidates, capabilities, settings);
        Self {
            resume: ResumeBuilder::new(ctx.clone()),
            graph: Arc::new(SourcingGraph::new(ctx)),
            running: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn context(&self) -> &StageContext {
        self.graph.context()
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.graph.context().settings
    }

    pub fn graph(&self) -> &SourcingGraph {
        &self.graph
    }

    /// Whether this process is currently executing the job
    pub fn is_running(&self, job_id: JobId) -> bool {
        self.running.lock().contains(&job_id)
    }

    /// Persist a new CREATED job
    pub async fn create_job(&self, request: JobRequest) -> Result<JobId> {
        let job = JobCheckpoint::new(
            NewJob {
                owner_id: request.owner_id,
                title: request.title,
                raw_description: request.raw_description,
                requirements: request.requirements,
                max_candidates: request.max_candidates,
                max_retries: self.settings().max_retries,
            },
            Utc::now(),
        );
        self.context().checkpoints.create(&job).await?;
        info!(job_id = %job.id, title = %job.title, max_candidates = job.max_candidates, "Job created");
        Ok(job.id)
    }

    /// Run the job in the background
    pub fn submit(&self, job_id: JobId) -> JoinHandle<Result<RunOutcome>> {
        let engine = self.clone();
        tokio::spawn(async move { engine.run(job_id).await })
    }

    /// Create a job and start it in the background
    pub async fn start(&self, request: JobRequest) -> Result<(JobId, JoinHandle<Result<RunOutcome>>)> {
        let job_id = self.create_job(request).await?;
        Ok((job_id, self.submit(job_id)))
    }

    /// Continue a job from its checkpoint without retry accounting.
    ///
    /// Rejects finished jobs; a rate-limited job is released once its reset
    /// time has passed.
    pub async fn run(&self, job_id: JobId) -> Result<RunOutcome> {
        let _guard = InFlightGuard::acquire(&self.running, job_id)?;
        let record = self.load(job_id).await?;
        match record.status {
            JobStatus::Completed => return Err(EngineError::AlreadyCompleted(job_id)),
            JobStatus::Failed => return Err(EngineError::JobFailed(job_id)),
            JobStatus::RateLimited => self.release(&record, Utc::now()).await?,
            _ => {}
        }
        self.execute(job_id).await
    }

    /// Manual or automatic retry of a paused, stuck or failed job
    pub async fn retry(&self, job_id: JobId) -> Result<RunOutcome> {
        self.retry_at(job_id, Utc::now()).await
    }

    /// [`retry`](Self::retry) evaluated against an explicit clock.
    ///
    /// A rate-limited job is released without counting a retry. Anything
    /// else counts one retry in the same write that resets it to CREATED.
    pub async fn retry_at(&self, job_id: JobId, now: DateTime<Utc>) -> Result<RunOutcome> {
        let _guard = InFlightGuard::acquire(&self.running, job_id)?;
        let record = self.load(job_id).await?;
        match record.status {
            JobStatus::Completed => return Err(EngineError::AlreadyCompleted(job_id)),
            JobStatus::RateLimited => self.release(&record, now).await?,
            _ => {
                let (_, transition) = self.context().checkpoints.record_retry(job_id).await?;
                info!(job_id = %job_id, audit = %transition.audit_line(), "Retrying job");
            }
        }
        self.execute(job_id).await
    }

    async fn release(&self, record: &JobCheckpoint, now: DateTime<Utc>) -> Result<()> {
        if let Some(limit) = &record.rate_limit {
            if now < limit.reset_at {
                return Err(EngineError::RateLimitActive {
                    job_id: record.id,
                    reset_at: limit.reset_at,
                });
            }
        }
        self.context().checkpoints.release_rate_limit(record.id).await?;
        info!(job_id = %record.id, "Rate limit elapsed, resuming job");
        Ok(())
    }

    async fn execute(&self, job_id: JobId) -> Result<RunOutcome> {
        let plan = self.resume.rebuild(job_id).await?;
        let outcome = self.graph.invoke(plan.state, plan.entry).await;
        if let Err(err) = &outcome {
            warn!(job_id = %job_id, error = %err, "Run aborted");
        }
        outcome
    }

    async fn load(&self, job_id: JobId) -> Result<JobCheckpoint> {
        self.context()
            .checkpoints
            .load(job_id)
            .await
            .map_err(|err| match err {
                scout_checkpoint::CheckpointError::NotFound(_) => EngineError::NotFound(job_id),
                other => other.into(),
            })
    }

    /// Status, counters and the `top_n` best scored candidates
    pub async fn progress(&self, job_id: JobId, top_n: usize) -> Result<ProgressSnapshot> {
        let record = self.load(job_id).await?;
        let top_candidates = self
            .context()
            .candidates
            .top_scored(job_id, top_n)
            .await?
            .into_iter()
            .filter_map(|candidate| {
                let score = candidate.score?;
                Some(ScoredCandidate {
                    profile_url: candidate.profile_url,
                    full_name: candidate.full_name,
                    headline: candidate.headline,
                    overall: score.overall,
                    recommendation: score.recommendation,
                    duplicate_of_job: candidate.duplicate_of_job,
                })
            })
            .collect();

        Ok(ProgressSnapshot {
            job_id,
            current_stage: record.current_stage.to_string(),
            rate_limited_until: record.rate_limit.as_ref().map(|limit| limit.reset_at),
            running: self.is_running(job_id),
            title: record.title,
            status: record.status,
            last_completed_stage: record.last_completed_stage,
            search_iteration: record.search_iteration,
            max_candidates: record.max_candidates,
            counters: record.counters,
            error_message: record.error_message,
            retry_count: record.retry_count,
            max_retries: record.max_retries,
            no_candidates_report: record.no_candidates_report,
            last_activity_at: record.last_activity_at,
            top_candidates,
        })
    }

    /// Jobs, optionally for one owner, newest first
    pub async fn list_jobs(&self, owner_id: Option<&str>) -> Result<Vec<JobCheckpoint>> {
        Ok(self.context().checkpoints.list_jobs(owner_id).await?)
    }

    /// Delete a job with its candidates and batch payloads.
    ///
    /// Returns the number of candidate records removed.
    pub async fn delete_job(&self, job_id: JobId) -> Result<u64> {
        let _guard = InFlightGuard::acquire(&self.running, job_id)?;
        self.load(job_id).await?;
        let removed = self.context().candidates.delete_for_job(job_id).await?;
        self.context().checkpoints.delete(job_id).await?;
        info!(job_id = %job_id, candidates = removed, "Job deleted");
        Ok(removed)
    }
}

impl std::fmt::Debug for SourcingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourcingEngine")
            .field("running", &self.running.lock().len())
            .finish_non_exhaustive()
    }
}
