//! Scripted capabilities and engine setup shared by the workflow tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use scout_checkpoint::{
    BatchKind, BatchPayload, CheckpointError, CheckpointStore, CheckpointUpdate,
    InMemoryCandidateStore, InMemoryCheckpointStore, JobCheckpoint, JobId, JobOutcome,
    JobRequirements, ParsedProfile, RawProfile, RetryTransition, SearchVariant,
};
use scout_core::{
    CandidateScorer, Capabilities, CapabilityError, CapabilityResult, ContactEnricher,
    DescriptionFormatter, Enrichment, JobRequest, ProfileParser, ProfileScraper, ProfileSearch,
    RateLimitSignal, ScoringContext, SearchHit, SearchQuery, SourcingEngine, WorkflowSettings,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub fn urls(prefix: &str, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://www.linkedin.com/in/{}-{:03}", prefix, i))
        .collect()
}

pub fn request(max_candidates: u32) -> JobRequest {
    JobRequest {
        owner_id: "recruiter-1".into(),
        title: "Senior Rust Engineer".into(),
        raw_description: "Async Rust, distributed systems, Postgres".into(),
        requirements: JobRequirements {
            job_titles: vec!["Rust Engineer".into()],
            skills: vec!["Rust".into(), "Tokio".into()],
            locations: vec!["Berlin".into()],
            ..Default::default()
        },
        max_candidates,
    }
}

pub fn variants() -> Vec<SearchVariant> {
    (1..=3)
        .map(|i| SearchVariant {
            search_expression: format!("rust AND backend AND v{}", i),
            job_titles: vec!["Rust Engineer".into(), "Backend Engineer".into()],
            locations: vec!["Berlin".into()],
            industry_ids: vec!["4".into()],
            seniority_ids: vec!["4".into()],
            experience_ids: vec!["3".into()],
        })
        .collect()
}

pub fn rate_limit(provider: &str, reset_at: DateTime<Utc>) -> CapabilityError {
    CapabilityError::RateLimited(RateLimitSignal::new(provider, reset_at, "429 Too Many Requests"))
}

pub struct StaticFormatter {
    pub error: Option<CapabilityError>,
    pub calls: Mutex<usize>,
}

#[async_trait]
impl DescriptionFormatter for StaticFormatter {
    async fn format(
        &self,
        _description: &str,
        _requirements: &JobRequirements,
        _max_candidates: u32,
    ) -> CapabilityResult<Vec<SearchVariant>> {
        *self.calls.lock() += 1;
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(variants()),
        }
    }
}

/// Returns scripted URLs per query id; unknown ids return nothing
#[derive(Default)]
pub struct ScriptedSearch {
    pub results: HashMap<String, Vec<String>>,
    /// Query id that raises a rate limit once
    pub rate_limit_once: Mutex<Option<(String, DateTime<Utc>)>>,
    /// Attach a name and headline to every hit
    pub named: bool,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedSearch {
    pub fn with(results: Vec<(&str, Vec<String>)>) -> Self {
        Self {
            results: results
                .into_iter()
                .map(|(id, urls)| (id.to_string(), urls))
                .collect(),
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ProfileSearch for ScriptedSearch {
    async fn search(&self, query: &SearchQuery) -> CapabilityResult<Vec<SearchHit>> {
        {
            let mut limit = self.rate_limit_once.lock();
            if limit.as_ref().is_some_and(|(id, _)| *id == query.id) {
                if let Some((_, reset_at)) = limit.take() {
                    return Err(rate_limit("search", reset_at));
                }
            }
        }
        self.calls.lock().push(query.id.clone());
        let named = self.named;
        Ok(self
            .results
            .get(&query.id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|profile_url| SearchHit {
                full_name: named.then(|| format!("Hit {}", &profile_url[profile_url.len() - 3..])),
                headline: named.then(|| "Staff Engineer".to_string()),
                profile_url,
            })
            .collect())
    }
}

/// Finds a contact for every URL in `with_contact`
#[derive(Default)]
pub struct ScriptedEnricher {
    pub with_contact: HashSet<String>,
    /// Raise a rate limit once, when this many lookups have completed
    pub rate_limit_after: Mutex<Option<(usize, DateTime<Utc>)>>,
    /// Claim a contact for every URL without returning any contact data
    pub flag_only: bool,
    /// Lookups that returned a result
    pub completed: Mutex<Vec<String>>,
}

impl ScriptedEnricher {
    pub fn with_contacts(urls: &[String]) -> Self {
        Self {
            with_contact: urls.iter().cloned().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContactEnricher for ScriptedEnricher {
    async fn enrich(&self, profile_url: &str) -> CapabilityResult<Enrichment> {
        {
            let done = self.completed.lock().len();
            let mut limit = self.rate_limit_after.lock();
            if limit.as_ref().is_some_and(|(after, _)| *after == done) {
                if let Some((_, reset_at)) = limit.take() {
                    return Err(rate_limit("enrichment", reset_at));
                }
            }
        }
        self.completed.lock().push(profile_url.to_string());
        let has_contact = self.with_contact.contains(profile_url);
        if self.flag_only {
            return Ok(Enrichment {
                has_contact: true,
                raw: json!({"url": profile_url}),
                ..Default::default()
            });
        }
        Ok(Enrichment {
            has_contact,
            email: has_contact.then(|| format!("{}@example.com", profile_url.len())),
            phone: None,
            raw: json!({"url": profile_url}),
        })
    }
}

/// Echoes one raw profile per URL; can hang forever on a given call
#[derive(Default)]
pub struct ScriptedScraper {
    /// 1-based call number that never returns
    pub hang_on_call: Option<usize>,
    pub calls: Mutex<Vec<Vec<String>>>,
}

#[async_trait]
impl ProfileScraper for ScriptedScraper {
    async fn scrape(&self, profile_urls: &[String]) -> CapabilityResult<Vec<RawProfile>> {
        let call = {
            let mut calls = self.calls.lock();
            calls.push(profile_urls.to_vec());
            calls.len()
        };
        if self.hang_on_call == Some(call) {
            std::future::pending::<()>().await;
        }
        Ok(profile_urls
            .iter()
            .map(|url| RawProfile {
                profile_url: url.clone(),
                payload: json!({
                    "fullName": format!("Person {}", &url[url.len() - 3..]),
                    "headline": "Rust Engineer",
                    "skills": ["Rust", {"name": "Tokio"}],
                }),
            })
            .collect())
    }
}

/// Valid extraction for every profile, except URLs listed in `invalid`
#[derive(Default)]
pub struct EchoParser {
    pub invalid: HashSet<String>,
}

#[async_trait]
impl ProfileParser for EchoParser {
    async fn parse(&self, raw: &RawProfile) -> CapabilityResult<Value> {
        if self.invalid.contains(&raw.profile_url) {
            return Ok(json!({"skills": "not-a-list"}));
        }
        Ok(json!({
            "full_name": raw.payload.get("fullName").cloned().unwrap_or(Value::Null),
            "headline": raw.payload.get("headline").cloned().unwrap_or(Value::Null),
            "skills": ["Rust", "Tokio"],
            "experience": [{"title": "Engineer", "company": "Acme"}],
            "education": [],
            "total_years_experience": 6.0
        }))
    }
}

/// Scores by the last digits of the name so ordering is deterministic
#[derive(Default)]
pub struct RubricScorer;

#[async_trait]
impl CandidateScorer for RubricScorer {
    async fn score(&self, _context: &ScoringContext, profile: &ParsedProfile) -> CapabilityResult<Value> {
        let seed: u32 = profile
            .full_name
            .as_deref()
            .and_then(|name| name.rsplit(' ').next())
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0);
        let overall = 40 + (seed % 60);
        Ok(json!({
            "overall": overall,
            "skills_match": overall,
            "experience_match": 70,
            "seniority_match": 60,
            "location_match": 100,
            "industry_match": 50,
            "strengths": ["Rust"],
            "concerns": [],
            "summary": "solid",
            "recommendation": if overall >= 85 { "strong_yes" } else if overall >= 70 { "yes" } else { "maybe" }
        }))
    }
}

pub struct Fakes {
    pub formatter: Arc<StaticFormatter>,
    pub search: Arc<ScriptedSearch>,
    pub enricher: Arc<ScriptedEnricher>,
    pub scraper: Arc<ScriptedScraper>,
    pub parser: Arc<EchoParser>,
    pub scorer: Arc<RubricScorer>,
}

impl Fakes {
    pub fn new(search: ScriptedSearch, enricher: ScriptedEnricher) -> Self {
        Self {
            formatter: Arc::new(StaticFormatter {
                error: None,
                calls: Mutex::new(0),
            }),
            search: Arc::new(search),
            enricher: Arc::new(enricher),
            scraper: Arc::new(ScriptedScraper::default()),
            parser: Arc::new(EchoParser::default()),
            scorer: Arc::new(RubricScorer),
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            formatter: self.formatter.clone(),
            search: self.search.clone(),
            enricher: self.enricher.clone(),
            scraper: self.scraper.clone(),
            parser: self.parser.clone(),
            scorer: self.scorer.clone(),
        }
    }
}

pub struct Harness {
    pub engine: SourcingEngine,
    pub checkpoints: InMemoryCheckpointStore,
    pub candidates: InMemoryCandidateStore,
    pub fakes: Fakes,
}

impl Harness {
    pub fn new(fakes: Fakes) -> Self {
        Self::with_stores(
            fakes,
            InMemoryCheckpointStore::new(),
            InMemoryCandidateStore::new(),
            WorkflowSettings::default(),
        )
    }

    pub fn with_stores(
        fakes: Fakes,
        checkpoints: InMemoryCheckpointStore,
        candidates: InMemoryCandidateStore,
        settings: WorkflowSettings,
    ) -> Self {
        let engine = SourcingEngine::new(
            Arc::new(checkpoints.clone()),
            Arc::new(candidates.clone()),
            fakes.capabilities(),
            settings,
        );
        Self {
            engine,
            checkpoints,
            candidates,
            fakes,
        }
    }
}

pub fn an_hour_ago() -> DateTime<Utc> {
    Utc::now() - Duration::hours(1)
}

/// In-memory checkpoints whose `mark_terminal` fails for chosen jobs
pub struct RefusingCheckpoints {
    pub inner: InMemoryCheckpointStore,
    pub refuse_terminal: Mutex<HashSet<JobId>>,
}

#[async_trait]
impl CheckpointStore for RefusingCheckpoints {
    async fn create(&self, job: &JobCheckpoint) -> scout_checkpoint::Result<()> {
        self.inner.create(job).await
    }

    async fn load(&self, job_id: JobId) -> scout_checkpoint::Result<JobCheckpoint> {
        self.inner.load(job_id).await
    }

    async fn commit(
        &self,
        job_id: JobId,
        update: CheckpointUpdate,
    ) -> scout_checkpoint::Result<JobCheckpoint> {
        self.inner.commit(job_id, update).await
    }

    async fn mark_terminal(
        &self,
        job_id: JobId,
        outcome: JobOutcome,
    ) -> scout_checkpoint::Result<JobCheckpoint> {
        if self.refuse_terminal.lock().contains(&job_id) {
            return Err(CheckpointError::Storage("disk full".into()));
        }
        self.inner.mark_terminal(job_id, outcome).await
    }

    async fn record_retry(
        &self,
        job_id: JobId,
    ) -> scout_checkpoint::Result<(JobCheckpoint, RetryTransition)> {
        self.inner.record_retry(job_id).await
    }

    async fn release_rate_limit(&self, job_id: JobId) -> scout_checkpoint::Result<JobCheckpoint> {
        self.inner.release_rate_limit(job_id).await
    }

    async fn list_unfinished(&self) -> scout_checkpoint::Result<Vec<JobCheckpoint>> {
        self.inner.list_unfinished().await
    }

    async fn list_jobs(&self, owner_id: Option<&str>) -> scout_checkpoint::Result<Vec<JobCheckpoint>> {
        self.inner.list_jobs(owner_id).await
    }

    async fn put_batch(&self, job_id: JobId, payload: BatchPayload) -> scout_checkpoint::Result<()> {
        self.inner.put_batch(job_id, payload).await
    }

    async fn load_batches(
        &self,
        job_id: JobId,
        kind: BatchKind,
    ) -> scout_checkpoint::Result<Vec<BatchPayload>> {
        self.inner.load_batches(job_id, kind).await
    }

    async fn delete(&self, job_id: JobId) -> scout_checkpoint::Result<()> {
        self.inner.delete(job_id).await
    }
}

/// Age a job past the staleness window
pub async fn make_stale(checkpoints: &InMemoryCheckpointStore, job_id: JobId) {
    let mut job = checkpoints.load(job_id).await.unwrap();
    job.last_activity_at = an_hour_ago();
    checkpoints.overwrite(job).await;
}
