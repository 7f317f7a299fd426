//! Stage identities and fine-grained progress labels
//!
//! [`StageName`] identifies a node of the sourcing graph and carries its
//! topological position, which is what makes `last_completed_stage` a
//! forward-only resumption pointer. [`StageLabel`] is the structured form of
//! the job's `current_stage`; it renders to the upper-case strings progress
//! consumers display (`SCRAPING_BATCH_3_OF_7`).

use crate::error::CheckpointError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A node of the sourcing workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    FormatDescription,
    GenerateQueries,
    SearchProfiles,
    EnrichCandidates,
    ScrapeCandidates,
    ParseCandidates,
    PersistCandidates,
    ScoreCandidates,
    HandleNoCandidates,
}

impl StageName {
    /// Every stage in topological order.
    pub const ALL: [StageName; 9] = [
        StageName::FormatDescription,
        StageName::GenerateQueries,
        StageName::SearchProfiles,
        StageName::EnrichCandidates,
        StageName::ScrapeCandidates,
        StageName::ParseCandidates,
        StageName::PersistCandidates,
        StageName::ScoreCandidates,
        StageName::HandleNoCandidates,
    ];

    /// Position in the graph's topological order.
    ///
    /// The search loop (`SearchProfiles` → `EnrichCandidates` → `SearchProfiles`)
    /// collapses onto the enrichment ordinal once enrichment has run, so a loop
    /// iteration never moves the pointer backwards.
    pub fn ordinal(self) -> u8 {
        match self {
            Self::FormatDescription => 0,
            Self::GenerateQueries => 1,
            Self::SearchProfiles => 2,
            Self::EnrichCandidates => 3,
            Self::ScrapeCandidates => 4,
            Self::ParseCandidates => 5,
            Self::PersistCandidates => 6,
            Self::ScoreCandidates => 7,
            Self::HandleNoCandidates => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FormatDescription => "format_description",
            Self::GenerateQueries => "generate_queries",
            Self::SearchProfiles => "search_profiles",
            Self::EnrichCandidates => "enrich_candidates",
            Self::ScrapeCandidates => "scrape_candidates",
            Self::ParseCandidates => "parse_candidates",
            Self::PersistCandidates => "persist_candidates",
            Self::ScoreCandidates => "score_candidates",
            Self::HandleNoCandidates => "handle_no_candidates",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = CheckpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CheckpointError::Invalid(format!("unknown stage: {}", s)))
    }
}

/// Structured form of a job's `current_stage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "label", rename_all = "snake_case")]
pub enum StageLabel {
    Created,
    FormattingDescription,
    DescriptionFormatted { variants: usize },
    GeneratingQueries,
    Searching { iteration: u32, max_iterations: u32 },
    Enriching { processed: usize, total: usize },
    ScrapingBatch { batch: u32, total: u32 },
    ParsingBatch { batch: u32, total: u32 },
    SavingProfiles { saved: usize, total: usize },
    ScoringBatch { batch: u32 },
    NoCandidatesFound,
    Completed,
    RateLimited { provider: String },
    Failed,
}

impl Default for StageLabel {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::FormattingDescription => write!(f, "FORMATTING_JD"),
            Self::DescriptionFormatted { .. } => write!(f, "JD_FORMATTED"),
            Self::GeneratingQueries => write!(f, "GENERATING_QUERIES"),
            Self::Searching {
                iteration,
                max_iterations,
            } => write!(f, "SEARCHING_ITERATION_{}_OF_{}", iteration, max_iterations),
            Self::Enriching { processed, total } => {
                write!(f, "ENRICHING_{}_OF_{}", processed, total)
            }
            Self::ScrapingBatch { batch, total } => {
                write!(f, "SCRAPING_BATCH_{}_OF_{}", batch, total)
            }
            Self::ParsingBatch { batch, total } => {
                write!(f, "PARSING_BATCH_{}_OF_{}", batch, total)
            }
            Self::SavingProfiles { saved, total } => {
                write!(f, "SAVING_PROFILES_{}_OF_{}", saved, total)
            }
            Self::ScoringBatch { batch } => write!(f, "SCORING_BATCH_{}", batch),
            Self::NoCandidatesFound => write!(f, "NO_CANDIDATES_FOUND"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::RateLimited { provider } => {
                write!(f, "RATE_LIMITED_{}", provider.to_uppercase())
            }
            Self::Failed => write!(f, "FAILED"),
        }
    }
}
