//! The job checkpoint: one durable record holding all resumable state

use crate::error::CheckpointError;
use crate::stage::{StageLabel, StageName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Durable job identifier, also the continuation key of every execution.
pub type JobId = Uuid;

/// Coarse lifecycle status of a sourcing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Created,
    FormattingJd,
    JdFormatted,
    SearchingProfiles,
    ProfilesFound,
    ScrapingProfiles,
    ParsingProfiles,
    SavingProfiles,
    ScoringProfiles,
    Completed,
    RateLimited,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 12] = [
        JobStatus::Created,
        JobStatus::FormattingJd,
        JobStatus::JdFormatted,
        JobStatus::SearchingProfiles,
        JobStatus::ProfilesFound,
        JobStatus::ScrapingProfiles,
        JobStatus::ParsingProfiles,
        JobStatus::SavingProfiles,
        JobStatus::ScoringProfiles,
        JobStatus::Completed,
        JobStatus::RateLimited,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::FormattingJd => "FORMATTING_JD",
            Self::JdFormatted => "JD_FORMATTED",
            Self::SearchingProfiles => "SEARCHING_PROFILES",
            Self::ProfilesFound => "PROFILES_FOUND",
            Self::ScrapingProfiles => "SCRAPING_PROFILES",
            Self::ParsingProfiles => "PARSING_PROFILES",
            Self::SavingProfiles => "SAVING_PROFILES",
            Self::ScoringProfiles => "SCORING_PROFILES",
            Self::Completed => "COMPLETED",
            Self::RateLimited => "RATE_LIMITED",
            Self::Failed => "FAILED",
        }
    }

    /// COMPLETED and FAILED end a job for good. RATE_LIMITED does not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CheckpointError::Invalid(format!("unknown job status: {}", s)))
    }
}

/// Structured hiring requirements supplied with the job
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRequirements {
    pub job_titles: Vec<String>,
    pub skills: Vec<String>,
    pub nice_to_have: Vec<String>,
    pub locations: Vec<String>,
    pub industries: Vec<String>,
    pub seniority: Option<String>,
    pub min_years_experience: Option<u32>,
}

/// One AI-produced search strategy prior to tier expansion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchVariant {
    pub search_expression: String,
    pub job_titles: Vec<String>,
    pub locations: Vec<String>,
    pub industry_ids: Vec<String>,
    pub seniority_ids: Vec<String>,
    pub experience_ids: Vec<String>,
}

/// Name and headline a search hit carried for a discovered URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileHint {
    pub full_name: Option<String>,
    pub headline: Option<String>,
}

impl ProfileHint {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none() && self.headline.is_none()
    }
}

/// Rate-limit metadata recorded when a provider pauses the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitInfo {
    pub provider: String,
    pub hit_at: DateTime<Utc>,
    pub reset_at: DateTime<Utc>,
    pub message: String,
}

/// Per-stage progress counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobCounters {
    pub profiles_found: u32,
    pub candidates_with_contact: u32,
    pub scraped: u32,
    pub parsed: u32,
    pub saved: u32,
    pub scored: u32,
}

/// Input for creating a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub owner_id: String,
    pub title: String,
    pub raw_description: String,
    #[serde(default)]
    pub requirements: JobRequirements,
    pub max_candidates: u32,
    pub max_retries: u32,
}

/// Complete resumable state of one sourcing job.
///
/// The three URL/query sets only ever grow and `last_completed_stage` only
/// moves forward; both properties are enforced by
/// [`apply_update`](JobCheckpoint::apply_update).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCheckpoint {
    pub id: JobId,
    pub owner_id: String,
    pub title: String,
    pub raw_description: String,
    pub requirements: JobRequirements,
    pub max_candidates: u32,

    pub status: JobStatus,
    pub current_stage: StageLabel,
    pub last_completed_stage: Option<StageName>,

    pub variants: Vec<SearchVariant>,
    pub discovered_urls: BTreeSet<String>,
    /// First hint seen per discovered URL
    #[serde(default)]
    pub profile_hints: BTreeMap<String, ProfileHint>,
    pub enriched_urls: BTreeSet<String>,
    pub used_query_ids: BTreeSet<String>,
    pub search_iteration: u32,

    pub counters: JobCounters,
    /// Highest scrape batch (1-based) whose payload is durable, 0 for none
    pub last_scraped_batch: u32,
    /// Highest parse batch (1-based) whose payload is durable, 0 for none
    pub last_parsed_batch: u32,

    pub error_message: Option<String>,
    pub error_log: Vec<String>,
    pub rate_limit: Option<RateLimitInfo>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub no_candidates_report: Option<String>,

    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
}

impl JobCheckpoint {
    /// Build a fresh CREATED checkpoint
    pub fn new(job: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: job.owner_id,
            title: job.title,
            raw_description: job.raw_description,
            requirements: job.requirements,
            max_candidates: job.max_candidates,
            status: JobStatus::Created,
            current_stage: StageLabel::Created,
            last_completed_stage: None,
            variants: Vec::new(),
            discovered_urls: BTreeSet::new(),
            profile_hints: BTreeMap::new(),
            enriched_urls: BTreeSet::new(),
            used_query_ids: BTreeSet::new(),
            search_iteration: 0,
            counters: JobCounters::default(),
            last_scraped_batch: 0,
            last_parsed_batch: 0,
            error_message: None,
            error_log: Vec::new(),
            rate_limit: None,
            retry_count: 0,
            max_retries: job.max_retries,
            no_candidates_report: None,
            created_at: now,
            last_activity_at: now,
            completed_at: None,
            failed_at: None,
        }
    }

    /// Discovered URLs that have not been submitted for enrichment yet, sorted
    pub fn pending_enrichment(&self) -> Vec<String> {
        self.discovered_urls
            .difference(&self.enriched_urls)
            .cloned()
            .collect()
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Apply a halt outcome to the record
    pub fn apply_outcome(&mut self, outcome: &JobOutcome, now: DateTime<Utc>) {
        match outcome {
            JobOutcome::Completed => {
                self.status = JobStatus::Completed;
                if self.current_stage != StageLabel::NoCandidatesFound {
                    self.current_stage = StageLabel::Completed;
                }
                self.completed_at = Some(now);
                self.rate_limit = None;
            }
            JobOutcome::Failed { message } => {
                self.status = JobStatus::Failed;
                self.current_stage = StageLabel::Failed;
                self.error_message = Some(message.clone());
                self.error_log.push(message.clone());
                self.failed_at = Some(now);
            }
            JobOutcome::RateLimited(info) => {
                self.status = JobStatus::RateLimited;
                self.current_stage = StageLabel::RateLimited {
                    provider: info.provider.clone(),
                };
                self.error_message = Some(info.message.clone());
                self.rate_limit = Some(info.clone());
            }
        }
        self.last_activity_at = now;
    }

    /// Reset the record for another attempt, counting the retry.
    ///
    /// Status, retry count and the audit line change together so the two
    /// can never diverge in storage.
    pub fn apply_retry(&mut self, now: DateTime<Utc>) -> Result<RetryTransition, CheckpointError> {
        if self.retries_exhausted() {
            return Err(CheckpointError::RetriesExhausted {
                job_id: self.id.to_string(),
                attempts: self.retry_count,
            });
        }

        let transition = RetryTransition {
            attempt: self.retry_count + 1,
            max_retries: self.max_retries,
            previous_status: self.status,
            resume_after: self.last_completed_stage,
        };

        self.retry_count = transition.attempt;
        self.status = JobStatus::Created;
        self.current_stage = StageLabel::Created;
        self.rate_limit = None;
        self.error_message = None;
        self.failed_at = None;
        self.error_log.push(transition.audit_line());
        self.last_activity_at = now;

        Ok(transition)
    }

    /// Lift a rate-limit pause without counting a retry.
    ///
    /// A pause is not a failure, so the retry budget is left alone.
    pub fn apply_resume(&mut self, now: DateTime<Utc>) -> Result<(), CheckpointError> {
        if self.status != JobStatus::RateLimited {
            return Err(CheckpointError::Invalid(format!(
                "job {} is {}, not RATE_LIMITED",
                self.id, self.status
            )));
        }

        let provider = self
            .rate_limit
            .take()
            .map(|info| info.provider)
            .unwrap_or_else(|| "unknown".to_string());
        self.status = JobStatus::Created;
        self.current_stage = StageLabel::Created;
        self.error_message = None;
        self.error_log
            .push(format!("resumed after {} rate limit", provider));
        self.last_activity_at = now;
        Ok(())
    }
}

/// How a run of the graph halted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed { message: String },
    RateLimited(RateLimitInfo),
}

/// Record of one retry accounting step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryTransition {
    pub attempt: u32,
    pub max_retries: u32,
    pub previous_status: JobStatus,
    pub resume_after: Option<StageName>,
}

impl RetryTransition {
    pub fn audit_line(&self) -> String {
        let stage = self
            .resume_after
            .map(|s| s.as_str())
            .unwrap_or("start");
        format!(
            "retry {}/{} from {} (was {})",
            self.attempt, self.max_retries, stage, self.previous_status
        )
    }
}
