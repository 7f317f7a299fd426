//! Partial updates and the per-field merge policies that fold them into a
//! [`JobCheckpoint`].
//!
//! | field                                   | policy              |
//! |-----------------------------------------|---------------------|
//! | status, current_stage, scalars          | replace-if-present  |
//! | discovered / enriched / used-query sets | set-union           |
//! | profile hints                           | first-write-wins    |
//! | error log                               | append              |
//! | counters                                | authoritative value |
//! | last_completed_stage                    | forward-only        |

use crate::job::{JobCheckpoint, JobStatus, ProfileHint, RateLimitInfo, SearchVariant};
use crate::stage::{StageLabel, StageName};
use std::collections::{BTreeMap, BTreeSet};

/// Merge policy declared for a checkpoint field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// New value wins when present, otherwise keep current
    ReplaceIfPresent,
    /// Elements are added, never removed
    SetUnion,
    /// Elements are concatenated
    Append,
    /// Explicit new value is taken as a recount, never added to the old one
    Authoritative,
    /// Only accepted when it moves further along the graph
    ForwardOnly,
    /// Keyed entries are added; an existing key keeps its value
    FirstWriteWins,
}

impl MergePolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReplaceIfPresent => "replace_if_present",
            Self::SetUnion => "set_union",
            Self::Append => "append",
            Self::Authoritative => "authoritative",
            Self::ForwardOnly => "forward_only",
            Self::FirstWriteWins => "first_write_wins",
        }
    }

    /// Policy declared for a checkpoint field, by field name
    pub fn for_field(field: &str) -> Option<MergePolicy> {
        let policy = match field {
            "status" | "current_stage" | "variants" | "search_iteration"
            | "last_scraped_batch" | "last_parsed_batch" | "error_message" | "rate_limit"
            | "no_candidates_report" => Self::ReplaceIfPresent,
            "discovered_urls" | "enriched_urls" | "used_query_ids" => Self::SetUnion,
            "error_log" => Self::Append,
            "counters" => Self::Authoritative,
            "last_completed_stage" => Self::ForwardOnly,
            "profile_hints" => Self::FirstWriteWins,
            _ => return None,
        };
        Some(policy)
    }
}

/// Authoritative counter values; `None` leaves a counter unchanged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterUpdate {
    pub profiles_found: Option<u32>,
    pub candidates_with_contact: Option<u32>,
    pub scraped: Option<u32>,
    pub parsed: Option<u32>,
    pub saved: Option<u32>,
    pub scored: Option<u32>,
}

impl CounterUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A partial update returned by a stage and committed to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckpointUpdate {
    pub status: Option<JobStatus>,
    pub current_stage: Option<StageLabel>,
    pub last_completed_stage: Option<StageName>,
    pub variants: Option<Vec<SearchVariant>>,
    pub discovered_urls: Vec<String>,
    pub profile_hints: Vec<(String, ProfileHint)>,
    pub enriched_urls: Vec<String>,
    pub used_query_ids: Vec<String>,
    pub search_iteration: Option<u32>,
    pub counters: CounterUpdate,
    pub last_scraped_batch: Option<u32>,
    pub last_parsed_batch: Option<u32>,
    pub error_message: Option<String>,
    pub errors: Vec<String>,
    pub rate_limit: Option<RateLimitInfo>,
    pub no_candidates_report: Option<String>,
}

impl CheckpointUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_stage(mut self, label: StageLabel) -> Self {
        self.current_stage = Some(label);
        self
    }

    pub fn with_completed(mut self, stage: StageName) -> Self {
        self.last_completed_stage = Some(stage);
        self
    }

    pub fn with_variants(mut self, variants: Vec<SearchVariant>) -> Self {
        self.variants = Some(variants);
        self
    }

    pub fn with_discovered<I: IntoIterator<Item = String>>(mut self, urls: I) -> Self {
        self.discovered_urls.extend(urls);
        self
    }

    pub fn with_hints<I: IntoIterator<Item = (String, ProfileHint)>>(mut self, hints: I) -> Self {
        self.profile_hints.extend(hints);
        self
    }

    pub fn with_enriched<I: IntoIterator<Item = String>>(mut self, urls: I) -> Self {
        self.enriched_urls.extend(urls);
        self
    }

    pub fn with_used_queries<I: IntoIterator<Item = String>>(mut self, ids: I) -> Self {
        self.used_query_ids.extend(ids);
        self
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.search_iteration = Some(iteration);
        self
    }

    pub fn with_counters(mut self, counters: CounterUpdate) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_scraped_batch(mut self, batch: u32) -> Self {
        self.last_scraped_batch = Some(batch);
        self
    }

    pub fn with_parsed_batch(mut self, batch: u32) -> Self {
        self.last_parsed_batch = Some(batch);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        self.error_message = Some(message.clone());
        self.errors.push(message);
        self
    }

    pub fn with_errors<I: IntoIterator<Item = String>>(mut self, messages: I) -> Self {
        self.errors.extend(messages);
        if let Some(last) = self.errors.last() {
            self.error_message = Some(last.clone());
        }
        self
    }

    pub fn with_rate_limit(mut self, info: RateLimitInfo) -> Self {
        self.rate_limit = Some(info);
        self
    }

    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.no_candidates_report = Some(report.into());
        self
    }

    /// Fold `other` on top of `self` with the same policies used against
    /// the stored record, so that two queued updates commit as one.
    pub fn merge(mut self, other: CheckpointUpdate) -> Self {
        replace_if_present(&mut self.status, other.status.map(Some));
        replace_if_present(&mut self.current_stage, other.current_stage.map(Some));
        if let Some(stage) = other.last_completed_stage {
            advance_optional(&mut self.last_completed_stage, stage);
        }
        replace_if_present(&mut self.variants, other.variants.map(Some));
        self.discovered_urls.extend(other.discovered_urls);
        self.profile_hints.extend(other.profile_hints);
        self.enriched_urls.extend(other.enriched_urls);
        self.used_query_ids.extend(other.used_query_ids);
        replace_if_present(&mut self.search_iteration, other.search_iteration.map(Some));
        merge_counter_updates(&mut self.counters, other.counters);
        replace_if_present(&mut self.last_scraped_batch, other.last_scraped_batch.map(Some));
        replace_if_present(&mut self.last_parsed_batch, other.last_parsed_batch.map(Some));
        replace_if_present(&mut self.error_message, other.error_message.map(Some));
        self.errors.extend(other.errors);
        replace_if_present(&mut self.rate_limit, other.rate_limit.map(Some));
        replace_if_present(
            &mut self.no_candidates_report,
            other.no_candidates_report.map(Some),
        );
        self
    }
}

fn replace_if_present<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn union_into(set: &mut BTreeSet<String>, items: Vec<String>) {
    set.extend(items);
}

fn keep_first(map: &mut BTreeMap<String, ProfileHint>, items: Vec<(String, ProfileHint)>) {
    for (url, hint) in items {
        map.entry(url).or_insert(hint);
    }
}

fn advance_optional(slot: &mut Option<StageName>, stage: StageName) {
    match slot {
        Some(current) if current.ordinal() >= stage.ordinal() => {}
        _ => *slot = Some(stage),
    }
}

fn merge_counter_updates(current: &mut CounterUpdate, newer: CounterUpdate) {
    replace_if_present(&mut current.profiles_found, newer.profiles_found.map(Some));
    replace_if_present(
        &mut current.candidates_with_contact,
        newer.candidates_with_contact.map(Some),
    );
    replace_if_present(&mut current.scraped, newer.scraped.map(Some));
    replace_if_present(&mut current.parsed, newer.parsed.map(Some));
    replace_if_present(&mut current.saved, newer.saved.map(Some));
    replace_if_present(&mut current.scored, newer.scored.map(Some));
}

impl JobCheckpoint {
    /// Merge a partial update into this record using the declared policies.
    ///
    /// Does not touch `last_activity_at`; stores refresh it on commit.
    pub fn apply_update(&mut self, update: CheckpointUpdate) {
        replace_if_present(&mut self.status, update.status);
        replace_if_present(&mut self.current_stage, update.current_stage);
        if let Some(stage) = update.last_completed_stage {
            advance_optional(&mut self.last_completed_stage, stage);
        }
        replace_if_present(&mut self.variants, update.variants);

        union_into(&mut self.discovered_urls, update.discovered_urls);
        keep_first(&mut self.profile_hints, update.profile_hints);
        union_into(&mut self.enriched_urls, update.enriched_urls);
        union_into(&mut self.used_query_ids, update.used_query_ids);

        replace_if_present(&mut self.search_iteration, update.search_iteration);

        let counters = update.counters;
        replace_if_present(&mut self.counters.profiles_found, counters.profiles_found);
        replace_if_present(
            &mut self.counters.candidates_with_contact,
            counters.candidates_with_contact,
        );
        replace_if_present(&mut self.counters.scraped, counters.scraped);
        replace_if_present(&mut self.counters.parsed, counters.parsed);
        replace_if_present(&mut self.counters.saved, counters.saved);
        replace_if_present(&mut self.counters.scored, counters.scored);

        replace_if_present(&mut self.last_scraped_batch, update.last_scraped_batch);
        replace_if_present(&mut self.last_parsed_batch, update.last_parsed_batch);

        if update.error_message.is_some() {
            self.error_message = update.error_message;
        }
        self.error_log.extend(update.errors);
        if update.rate_limit.is_some() {
            self.rate_limit = update.rate_limit;
        }
        if update.no_candidates_report.is_some() {
            self.no_candidates_report = update.no_candidates_report;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobRequirements, NewJob};
    use chrono::Utc;
    use proptest::prelude::*;

    fn job() -> JobCheckpoint {
        JobCheckpoint::new(
            NewJob {
                owner_id: "owner".into(),
                title: "Data Engineer".into(),
                raw_description: "Spark".into(),
                requirements: JobRequirements::default(),
                max_candidates: 5,
                max_retries: 3,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_replace_if_present_keeps_current_on_none() {
        let mut job = job();
        job.apply_update(CheckpointUpdate::new().with_status(JobStatus::SearchingProfiles));
        job.apply_update(CheckpointUpdate::new());
        assert_eq!(job.status, JobStatus::SearchingProfiles);
    }

    #[test]
    fn test_counters_are_authoritative() {
        let mut job = job();
        job.counters.scraped = 40;
        job.apply_update(CheckpointUpdate::new().with_counters(CounterUpdate {
            scraped: Some(12),
            ..Default::default()
        }));
        assert_eq!(job.counters.scraped, 12);
        assert_eq!(job.counters.parsed, 0);
    }

    #[test]
    fn test_last_completed_stage_never_moves_backwards() {
        let mut job = job();
        job.apply_update(CheckpointUpdate::new().with_completed(StageName::EnrichCandidates));
        job.apply_update(CheckpointUpdate::new().with_completed(StageName::SearchProfiles));
        assert_eq!(job.last_completed_stage, Some(StageName::EnrichCandidates));
        job.apply_update(CheckpointUpdate::new().with_completed(StageName::ScrapeCandidates));
        assert_eq!(job.last_completed_stage, Some(StageName::ScrapeCandidates));
    }

    #[test]
    fn test_error_log_appends() {
        let mut job = job();
        job.apply_update(CheckpointUpdate::new().with_error("first"));
        job.apply_update(CheckpointUpdate::new().with_error("second"));
        assert_eq!(job.error_log, vec!["first", "second"]);
        assert_eq!(job.error_message.as_deref(), Some("second"));
    }

    #[test]
    fn test_profile_hints_keep_first_seen() {
        let first = ProfileHint {
            full_name: Some("Ada Lovelace".into()),
            headline: None,
        };
        let later = ProfileHint {
            full_name: Some("A. Lovelace".into()),
            headline: Some("Analyst".into()),
        };

        let mut job = job();
        job.apply_update(CheckpointUpdate::new().with_hints(vec![("u1".to_string(), first.clone())]));
        job.apply_update(CheckpointUpdate::new().with_hints(vec![
            ("u1".to_string(), later.clone()),
            ("u2".to_string(), later.clone()),
        ]));

        assert_eq!(job.profile_hints.get("u1"), Some(&first));
        assert_eq!(job.profile_hints.get("u2"), Some(&later));
    }

    #[test]
    fn test_merged_updates_match_sequential_application() {
        let a = CheckpointUpdate::new()
            .with_discovered(vec!["u1".to_string()])
            .with_completed(StageName::SearchProfiles)
            .with_counters(CounterUpdate {
                profiles_found: Some(1),
                ..Default::default()
            });
        let b = CheckpointUpdate::new()
            .with_discovered(vec!["u2".to_string()])
            .with_error("transient")
            .with_counters(CounterUpdate {
                profiles_found: Some(2),
                ..Default::default()
            });

        let mut sequential = job();
        let mut merged = sequential.clone();
        sequential.apply_update(a.clone());
        sequential.apply_update(b.clone());
        merged.apply_update(a.merge(b));

        assert_eq!(sequential, merged);
    }

    #[test]
    fn test_policy_table() {
        assert_eq!(MergePolicy::for_field("enriched_urls"), Some(MergePolicy::SetUnion));
        assert_eq!(MergePolicy::for_field("counters"), Some(MergePolicy::Authoritative));
        assert_eq!(
            MergePolicy::for_field("last_completed_stage"),
            Some(MergePolicy::ForwardOnly)
        );
        assert_eq!(
            MergePolicy::for_field("profile_hints"),
            Some(MergePolicy::FirstWriteWins)
        );
        assert_eq!(MergePolicy::for_field("nope"), None);
    }

    proptest! {
        #[test]
        fn prop_sets_never_shrink(
            batches in prop::collection::vec(
                (prop::collection::vec("[a-e]{1,2}", 0..4), prop::collection::vec("[a-e]{1,2}", 0..4)),
                1..8,
            )
        ) {
            let mut job = job();
            for (discovered, enriched) in batches {
                let before_discovered = job.discovered_urls.clone();
                let before_enriched = job.enriched_urls.clone();
                job.apply_update(
                    CheckpointUpdate::new()
                        .with_discovered(discovered)
                        .with_enriched(enriched),
                );
                prop_assert!(before_discovered.is_subset(&job.discovered_urls));
                prop_assert!(before_enriched.is_subset(&job.enriched_urls));
            }
        }

        #[test]
        fn prop_stage_pointer_is_monotonic(stages in prop::collection::vec(0usize..9, 1..12)) {
            let mut job = job();
            let mut highest = 0u8;
            for index in stages {
                let stage = StageName::ALL[index];
                job.apply_update(CheckpointUpdate::new().with_completed(stage));
                highest = highest.max(stage.ordinal());
                prop_assert_eq!(job.last_completed_stage.map(|s| s.ordinal()), Some(highest));
            }
        }
    }
}
