//! Tunables of the sourcing workflow

use serde::{Deserialize, Serialize};

/// Workflow limits and batch sizes.
///
/// Deserializes from the `[workflow]` table of the application config; every
/// field falls back to its default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Search/enrich loop ceiling
    pub max_iterations: u32,
    /// Primary query plus at most one same-tier fallback
    pub max_queries_per_iteration: u32,
    /// Fewer new URLs than this from the primary query triggers the fallback
    pub min_new_results: usize,
    /// Variants kept from the formatter
    pub max_variants: usize,
    /// Titles kept by the broad tier
    pub broad_title_limit: usize,
    /// Pagination depth of precise and broad queries
    pub precise_pages: u32,
    /// Pagination depth of alternative queries
    pub alternative_pages: u32,
    /// Enrichment commits a checkpoint after this many URLs
    pub enrich_checkpoint_every: usize,
    pub scrape_batch_size: usize,
    pub parse_batch_size: usize,
    pub parse_concurrency: usize,
    pub persist_batch_size: usize,
    pub score_batch_size: usize,
    pub score_concurrency: usize,
    /// Retry ceiling stamped on new jobs
    pub max_retries: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            max_queries_per_iteration: 2,
            min_new_results: 5,
            max_variants: 3,
            broad_title_limit: 5,
            precise_pages: 1,
            alternative_pages: 3,
            enrich_checkpoint_every: 10,
            scrape_batch_size: 10,
            parse_batch_size: 5,
            parse_concurrency: 5,
            persist_batch_size: 20,
            score_batch_size: 10,
            score_concurrency: 5,
            max_retries: 3,
        }
    }
}

impl WorkflowSettings {
    /// Clamp sizes that would stall a stage to at least one
    pub fn normalized(mut self) -> Self {
        self.max_queries_per_iteration = self.max_queries_per_iteration.max(1);
        self.enrich_checkpoint_every = self.enrich_checkpoint_every.max(1);
        self.scrape_batch_size = self.scrape_batch_size.max(1);
        self.parse_batch_size = self.parse_batch_size.max(1);
        self.parse_concurrency = self.parse_concurrency.max(1);
        self.persist_batch_size = self.persist_batch_size.max(1);
        self.score_batch_size = self.score_batch_size.max(1);
        self.score_concurrency = self.score_concurrency.max(1);
        self
    }
}
