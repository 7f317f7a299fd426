//! Tiered query planning
//!
//! Each search variant expands into exactly three concrete queries:
//!
//! 1. **precise** - every filter verbatim
//! 2. **broad** - industry filter dropped, job titles truncated
//! 3. **alternative** - the broad query with AND-joins rewritten as OR-joins
//!    and deeper pagination
//!
//! [`select_next`] hands them out greedily by tier, so the cheapest and most
//! precise strategies are exhausted before the planner broadens.

use crate::settings::WorkflowSettings;
use regex::Regex;
use scout_checkpoint::SearchVariant;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

static AND_JOIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+AND\s+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryTier {
    Precise = 1,
    Broad = 2,
    Alternative = 3,
}

impl QueryTier {
    pub const ALL: [QueryTier; 3] = [QueryTier::Precise, QueryTier::Broad, QueryTier::Alternative];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Precise => "precise",
            Self::Broad => "broad",
            Self::Alternative => "alternative",
        }
    }
}

impl fmt::Display for QueryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete query sent to the search capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Stable id, e.g. `v2-broad`
    pub id: String,
    /// Index of the originating variant
    pub variant_index: usize,
    pub tier: QueryTier,
    pub search_expression: String,
    pub job_titles: Vec<String>,
    pub locations: Vec<String>,
    pub industry_ids: Vec<String>,
    pub seniority_ids: Vec<String>,
    pub experience_ids: Vec<String>,
    pub max_pages: u32,
}

/// Expands variants into tiered queries
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    max_variants: usize,
    broad_title_limit: usize,
    precise_pages: u32,
    alternative_pages: u32,
}

impl QueryPlanner {
    pub fn new(settings: &WorkflowSettings) -> Self {
        Self {
            max_variants: settings.max_variants,
            broad_title_limit: settings.broad_title_limit,
            precise_pages: settings.precise_pages.max(1),
            alternative_pages: settings.alternative_pages.max(settings.precise_pages).max(1),
        }
    }

    /// Deterministic expansion; the same variants always give the same plan.
    pub fn expand(&self, variants: &[SearchVariant]) -> Vec<SearchQuery> {
        variants
            .iter()
            .take(self.max_variants)
            .enumerate()
            .flat_map(|(index, variant)| {
                QueryTier::ALL
                    .into_iter()
                    .map(move |tier| self.build(index, variant, tier))
            })
            .collect()
    }

    fn build(&self, variant_index: usize, variant: &SearchVariant, tier: QueryTier) -> SearchQuery {
        let id = format!("v{}-{}", variant_index + 1, tier);
        match tier {
            QueryTier::Precise => SearchQuery {
                id,
                variant_index,
                tier,
                search_expression: variant.search_expression.clone(),
                job_titles: variant.job_titles.clone(),
                locations: variant.locations.clone(),
                industry_ids: variant.industry_ids.clone(),
                seniority_ids: variant.seniority_ids.clone(),
                experience_ids: variant.experience_ids.clone(),
                max_pages: self.precise_pages,
            },
            QueryTier::Broad => SearchQuery {
                id,
                variant_index,
                tier,
                search_expression: variant.search_expression.clone(),
                job_titles: variant
                    .job_titles
                    .iter()
                    .take(self.broad_title_limit)
                    .cloned()
                    .collect(),
                locations: variant.locations.clone(),
                industry_ids: Vec::new(),
                seniority_ids: variant.seniority_ids.clone(),
                experience_ids: variant.experience_ids.clone(),
                max_pages: self.precise_pages,
            },
            QueryTier::Alternative => {
                let broad = self.build(variant_index, variant, QueryTier::Broad);
                SearchQuery {
                    id,
                    tier,
                    search_expression: or_joined(&broad.search_expression),
                    max_pages: self.alternative_pages,
                    ..broad
                }
            }
        }
    }
}

/// Rewrite boolean AND-joins as OR-joins
pub fn or_joined(expression: &str) -> String {
    AND_JOIN.replace_all(expression, " OR ").into_owned()
}

/// Pick the next unused query.
///
/// With `prefer_tier`, an unused query of that tier wins. Otherwise tiers are
/// scanned 1 → 2 → 3 and the first unused query is returned, in plan order
/// within a tier. `None` once every query has been used.
pub fn select_next<'a>(
    queries: &'a [SearchQuery],
    used: &BTreeSet<String>,
    prefer_tier: Option<QueryTier>,
) -> Option<&'a SearchQuery> {
    let unused_in = |tier: QueryTier| {
        queries
            .iter()
            .find(|q| q.tier == tier && !used.contains(&q.id))
    };

    if let Some(found) = prefer_tier.and_then(unused_in) {
        return Some(found);
    }

    QueryTier::ALL.into_iter().find_map(unused_in)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn variant(n: usize) -> SearchVariant {
        SearchVariant {
            search_expression: format!("rust AND backend AND v{}", n),
            job_titles: (0..7).map(|i| format!("title-{}", i)).collect(),
            locations: vec!["Berlin".into()],
            industry_ids: vec!["4".into()],
            seniority_ids: vec!["5".into()],
            experience_ids: vec!["3".into()],
        }
    }

    fn plan() -> Vec<SearchQuery> {
        QueryPlanner::new(&WorkflowSettings::default()).expand(&[variant(1), variant(2), variant(3)])
    }

    #[test]
    fn test_expansion_shapes() {
        let queries = plan();
        assert_eq!(queries.len(), 9);

        let precise = &queries[0];
        assert_eq!(precise.id, "v1-precise");
        assert_eq!(precise.industry_ids, vec!["4"]);
        assert_eq!(precise.job_titles.len(), 7);

        let broad = &queries[1];
        assert_eq!(broad.id, "v1-broad");
        assert!(broad.industry_ids.is_empty());
        assert_eq!(broad.job_titles.len(), 5);

        let alternative = &queries[2];
        assert_eq!(alternative.id, "v1-alternative");
        assert_eq!(alternative.search_expression, "rust OR backend OR v1");
        assert_eq!(alternative.max_pages, 3);
        assert!(alternative.industry_ids.is_empty());
    }

    #[test]
    fn test_expansion_is_deterministic_and_capped() {
        let planner = QueryPlanner::new(&WorkflowSettings::default());
        let variants: Vec<SearchVariant> = (0..5).map(variant).collect();
        assert_eq!(planner.expand(&variants), planner.expand(&variants));
        assert_eq!(planner.expand(&variants).len(), 9);
    }

    #[test]
    fn test_or_joined_is_case_insensitive() {
        assert_eq!(or_joined("a and b AND c"), "a OR b OR c");
        assert_eq!(or_joined("android AND band"), "android OR band");
    }

    #[test]
    fn test_select_next_prefers_tier_then_scans() {
        let queries = plan();
        let mut used = BTreeSet::new();
        assert_eq!(select_next(&queries, &used, None).unwrap().id, "v1-precise");

        used.insert("v1-precise".to_string());
        assert_eq!(
            select_next(&queries, &used, Some(QueryTier::Broad)).unwrap().id,
            "v1-broad"
        );
        assert_eq!(select_next(&queries, &used, None).unwrap().id, "v2-precise");

        for q in &queries {
            used.insert(q.id.clone());
        }
        assert!(select_next(&queries, &used, None).is_none());
        assert!(select_next(&queries, &used, Some(QueryTier::Precise)).is_none());
    }

    #[test]
    fn test_prefer_tier_falls_back_to_scan_when_exhausted() {
        let queries = plan();
        let used: BTreeSet<String> = queries
            .iter()
            .filter(|q| q.tier == QueryTier::Alternative)
            .map(|q| q.id.clone())
            .collect();
        assert_eq!(
            select_next(&queries, &used, Some(QueryTier::Alternative)).unwrap().id,
            "v1-precise"
        );
    }

    proptest! {
        #[test]
        fn prop_no_higher_tier_while_precise_unused(used_mask in prop::collection::vec(any::<bool>(), 9)) {
            let queries = plan();
            let used: BTreeSet<String> = queries
                .iter()
                .zip(used_mask)
                .filter(|(_, used)| *used)
                .map(|(q, _)| q.id.clone())
                .collect();

            let lowest_unused = queries
                .iter()
                .filter(|q| !used.contains(&q.id))
                .map(|q| q.tier)
                .min();

            let selected = select_next(&queries, &used, None).map(|q| q.tier);
            prop_assert_eq!(selected, lowest_unused);
        }
    }
}
