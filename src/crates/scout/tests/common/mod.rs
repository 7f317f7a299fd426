//! Common test utilities and setup

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout::db::Database;
use scout_checkpoint::{
    JobCheckpoint, JobRequirements, NewJob, ParsedProfile, RawProfile, SearchVariant,
};
use scout_core::{
    CandidateScorer, Capabilities, CapabilityError, CapabilityResult, ContactEnricher,
    DescriptionFormatter, Enrichment, JobRequest, ProfileParser, ProfileScraper, ProfileSearch,
    RateLimitSignal, ScoringContext, SearchHit, SearchQuery,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

static TEST_DB_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Create a migrated test database with a unique name
pub async fn setup_test_db() -> (TempDir, Arc<Database>) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let counter = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = temp_dir.path().join(format!("test_{}.db", counter));

    let db = Database::initialize(&db_path)
        .await
        .expect("Failed to create test database");

    (temp_dir, Arc::new(db))
}

/// Current time truncated to whole seconds, as stored by the repositories
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp(), 0).expect("valid timestamp")
}

pub fn new_job(owner: &str, title: &str) -> JobCheckpoint {
    JobCheckpoint::new(
        NewJob {
            owner_id: owner.into(),
            title: title.into(),
            raw_description: "Async Rust, Postgres".into(),
            requirements: JobRequirements {
                skills: vec!["Rust".into()],
                ..Default::default()
            },
            max_candidates: 10,
            max_retries: 2,
        },
        now(),
    )
}

pub fn urls(prefix: &str, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("https://www.linkedin.com/in/{}-{:03}", prefix, i))
        .collect()
}

pub fn request(max_candidates: u32) -> JobRequest {
    JobRequest {
        owner_id: "recruiter-1".into(),
        title: "Senior Rust Engineer".into(),
        raw_description: "Async Rust, distributed systems".into(),
        requirements: JobRequirements {
            job_titles: vec!["Rust Engineer".into()],
            skills: vec!["Rust".into()],
            ..Default::default()
        },
        max_candidates,
    }
}

/// Formatter, search, enrichment, scrape, parse and score fakes.
///
/// Search answers only the first precise query; enrichment finds a contact
/// for every URL and can be told to rate-limit once.
pub struct FakeProviders {
    pub found: Vec<String>,
    pub rate_limit_enrichment: Mutex<Option<DateTime<Utc>>>,
    pub enrich_calls: AtomicUsize,
    /// Scrape calls never return while set
    pub hang_scrape: AtomicBool,
}

impl FakeProviders {
    pub fn new(found: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            found,
            rate_limit_enrichment: Mutex::new(None),
            enrich_calls: AtomicUsize::new(0),
            hang_scrape: AtomicBool::new(false),
        })
    }

    pub fn rate_limit_enrichment_once(&self, reset_at: DateTime<Utc>) {
        *self.rate_limit_enrichment.lock().unwrap() = Some(reset_at);
    }

    pub fn capabilities(self: &Arc<Self>) -> Capabilities {
        Capabilities {
            formatter: self.clone(),
            search: self.clone(),
            enricher: self.clone(),
            scraper: self.clone(),
            parser: self.clone(),
            scorer: self.clone(),
        }
    }
}

#[async_trait]
impl DescriptionFormatter for FakeProviders {
    async fn format(
        &self,
        _description: &str,
        _requirements: &JobRequirements,
        _max_candidates: u32,
    ) -> CapabilityResult<Vec<SearchVariant>> {
        Ok(vec![SearchVariant {
            search_expression: "rust AND backend".into(),
            job_titles: vec!["Rust Engineer".into()],
            locations: vec!["Berlin".into()],
            ..Default::default()
        }])
    }
}

#[async_trait]
impl ProfileSearch for FakeProviders {
    async fn search(&self, query: &SearchQuery) -> CapabilityResult<Vec<SearchHit>> {
        if query.id != "v1-precise" {
            return Ok(Vec::new());
        }
        Ok(self
            .found
            .iter()
            .map(|url| SearchHit {
                profile_url: url.clone(),
                full_name: None,
                headline: None,
            })
            .collect())
    }
}

#[async_trait]
impl ContactEnricher for FakeProviders {
    async fn enrich(&self, profile_url: &str) -> CapabilityResult<Enrichment> {
        if let Some(reset_at) = self.rate_limit_enrichment.lock().unwrap().take() {
            return Err(CapabilityError::RateLimited(RateLimitSignal::new(
                "enrichment",
                reset_at,
                "429 Too Many Requests",
            )));
        }
        self.enrich_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Enrichment {
            has_contact: true,
            email: Some(format!("{}@example.com", profile_url.len())),
            phone: None,
            raw: json!({"url": profile_url}),
        })
    }
}

#[async_trait]
impl ProfileScraper for FakeProviders {
    async fn scrape(&self, profile_urls: &[String]) -> CapabilityResult<Vec<RawProfile>> {
        if self.hang_scrape.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(profile_urls
            .iter()
            .map(|url| RawProfile {
                profile_url: url.clone(),
                payload: json!({
                    "fullName": format!("Person {}", &url[url.len() - 3..]),
                    "headline": "Rust Engineer",
                }),
            })
            .collect())
    }
}

#[async_trait]
impl ProfileParser for FakeProviders {
    async fn parse(&self, raw: &RawProfile) -> CapabilityResult<Value> {
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

#[async_trait]
impl CandidateScorer for FakeProviders {
    async fn score(
        &self,
        _context: &ScoringContext,
        profile: &ParsedProfile,
    ) -> CapabilityResult<Value> {
        let seed: u32 = profile
            .full_name
            .as_deref()
            .and_then(|name| name.rsplit(' ').next())
            .and_then(|digits| digits.parse().ok())
            .unwrap_or(0);
        let overall = 50 + (seed % 50);
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
