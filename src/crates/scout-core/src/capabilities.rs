//! Capability collaborators the stages call
//!
//! Every trait is a narrow async seam around one external provider. Any call
//! may fail with [`CapabilityError::RateLimited`], which pauses the whole job
//! instead of failing it.

use crate::error::CapabilityError;
use crate::planner::SearchQuery;
use async_trait::async_trait;
use scout_checkpoint::{JobRequirements, ParsedProfile, RawProfile, SearchVariant};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub type CapabilityResult<T> = std::result::Result<T, CapabilityError>;

/// One profile returned by the search provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub profile_url: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
}

/// Contact lookup result for one profile URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub has_contact: bool,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub raw: Value,
}

/// Job context handed to the scorer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringContext {
    pub title: String,
    pub description: String,
    pub requirements: JobRequirements,
}

/// AI capability turning a free-text description into search variants
#[async_trait]
pub trait DescriptionFormatter: Send + Sync {
    async fn format(
        &self,
        description: &str,
        requirements: &JobRequirements,
        max_candidates: u32,
    ) -> CapabilityResult<Vec<SearchVariant>>;
}

#[async_trait]
pub trait ProfileSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> CapabilityResult<Vec<SearchHit>>;
}

#[async_trait]
pub trait ContactEnricher: Send + Sync {
    async fn enrich(&self, profile_url: &str) -> CapabilityResult<Enrichment>;
}

#[async_trait]
pub trait ProfileScraper: Send + Sync {
    async fn scrape(&self, profile_urls: &[String]) -> CapabilityResult<Vec<RawProfile>>;
}

/// AI structured extraction; the returned JSON is schema-checked by the caller
#[async_trait]
pub trait ProfileParser: Send + Sync {
    async fn parse(&self, raw: &RawProfile) -> CapabilityResult<Value>;
}

/// AI rubric scoring; the returned JSON is schema-checked by the caller
#[async_trait]
pub trait CandidateScorer: Send + Sync {
    async fn score(&self, context: &ScoringContext, profile: &ParsedProfile)
        -> CapabilityResult<Value>;
}

/// The full set of collaborators one engine runs against
#[derive(Clone)]
pub struct Capabilities {
    pub formatter: Arc<dyn DescriptionFormatter>,
    pub search: Arc<dyn ProfileSearch>,
    pub enricher: Arc<dyn ContactEnricher>,
    pub scraper: Arc<dyn ProfileScraper>,
    pub parser: Arc<dyn ProfileParser>,
    pub scorer: Arc<dyn CandidateScorer>,
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
