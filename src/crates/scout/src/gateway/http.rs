//! reqwest client implementing every capability trait

use super::{classify_status, classify_transport, MAX_RATE_LIMIT_PAUSE_SECS};
use crate::config::{GatewayConfig, GatewayEndpoints};
use crate::error::{Result, ScoutError};
use async_trait::async_trait;
use chrono::Utc;
use scout_checkpoint::{JobRequirements, ParsedProfile, RawProfile, SearchVariant};
use scout_core::{
    with_transient_retry, CandidateScorer, Capabilities, CapabilityResult,
    ContactEnricher, DescriptionFormatter, Enrichment, ProfileParser, ProfileScraper,
    ProfileSearch, RetryPolicy, ScoringContext, SearchHit, SearchQuery,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct FormatRequest<'a> {
    description: &'a str,
    requirements: &'a JobRequirements,
    max_candidates: u32,
}

#[derive(Deserialize)]
struct FormatResponse {
    variants: Vec<SearchVariant>,
}

#[derive(Deserialize)]
struct ProfilesResponse<T> {
    #[serde(default = "Vec::new")]
    profiles: Vec<T>,
}

#[derive(Serialize)]
struct EnrichRequest<'a> {
    profile_url: &'a str,
}

#[derive(Serialize)]
struct ScrapeRequest<'a> {
    profile_urls: &'a [String],
}

#[derive(Serialize)]
struct ScoreRequest<'a> {
    context: &'a ScoringContext,
    profile: &'a ParsedProfile,
}

/// Client for the capability gateway
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    endpoints: GatewayEndpoints,
    retry: RetryPolicy,
    default_pause: chrono::Duration,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ScoutError::Gateway(format!("Failed to build HTTP client: {}", e)))?;

        let pause_secs = i64::try_from(config.default_rate_limit_secs)
            .unwrap_or(MAX_RATE_LIMIT_PAUSE_SECS)
            .min(MAX_RATE_LIMIT_PAUSE_SECS);
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
            endpoints: config.endpoints.clone(),
            retry: config.retry.clone(),
            default_pause: chrono::Duration::seconds(pause_secs),
        })
    }

    /// Share one gateway as every capability of an engine
    pub fn into_capabilities(self) -> Capabilities {
        let gateway = Arc::new(self);
        Capabilities {
            formatter: gateway.clone(),
            search: gateway.clone(),
            enricher: gateway.clone(),
            scraper: gateway.clone(),
            parser: gateway.clone(),
            scorer: gateway,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn post_once<B, T>(&self, capability: &str, path: &str, body: &B) -> CapabilityResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| classify_transport(capability, &e))?;

        let status = resp.status();
        if !status.is_success() {
            let headers = resp.headers().clone();
            let body = resp.text().await.unwrap_or_default();
            return Err(classify_status(
                capability,
                status,
                &headers,
                &body,
                Utc::now(),
                self.default_pause,
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| classify_transport(capability, &e))
    }

    /// POST with transient-failure retries; rate limits come back on first sight
    async fn post<B, T>(&self, capability: &str, path: &str, body: &B) -> CapabilityResult<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned + Send,
    {
        debug!(capability, path, "Calling gateway");
        with_transient_retry(&self.retry, capability, || self.post_once(capability, path, body)).await
    }
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.api_key.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DescriptionFormatter for HttpGateway {
    async fn format(
        &self,
        description: &str,
        requirements: &JobRequirements,
        max_candidates: u32,
    ) -> CapabilityResult<Vec<SearchVariant>> {
        let request = FormatRequest {
            description,
            requirements,
            max_candidates,
        };
        let response: FormatResponse = self.post("format", &self.endpoints.format, &request).await?;
        Ok(response.variants)
    }
}

#[async_trait]
impl ProfileSearch for HttpGateway {
    async fn search(&self, query: &SearchQuery) -> CapabilityResult<Vec<SearchHit>> {
        let response: ProfilesResponse<SearchHit> =
            self.post("search", &self.endpoints.search, query).await?;
        Ok(response.profiles)
    }
}

#[async_trait]
impl ContactEnricher for HttpGateway {
    async fn enrich(&self, profile_url: &str) -> CapabilityResult<Enrichment> {
        self.post("enrich", &self.endpoints.enrich, &EnrichRequest { profile_url })
            .await
    }
}

#[async_trait]
impl ProfileScraper for HttpGateway {
    async fn scrape(&self, profile_urls: &[String]) -> CapabilityResult<Vec<RawProfile>> {
        let response: ProfilesResponse<RawProfile> = self
            .post("scrape", &self.endpoints.scrape, &ScrapeRequest { profile_urls })
            .await?;
        Ok(response.profiles)
    }
}

#[async_trait]
impl ProfileParser for HttpGateway {
    async fn parse(&self, raw: &RawProfile) -> CapabilityResult<Value> {
        self.post("parse", &self.endpoints.parse, raw).await
    }
}

#[async_trait]
impl CandidateScorer for HttpGateway {
    async fn score(
        &self,
        context: &ScoringContext,
        profile: &ParsedProfile,
    ) -> CapabilityResult<Value> {
        self.post("score", &self.endpoints.score, &ScoreRequest { context, profile })
            .await
    }
}
