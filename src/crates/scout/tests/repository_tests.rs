//! SQLite repository tests against a migrated temporary database

mod common;

use common::{new_job, now, setup_test_db};
use chrono::Duration;
use scout::{SqliteCandidateStore, SqliteCheckpointStore};
use scout_checkpoint::{
    BatchKind, BatchPayload, CandidateScore, CandidateStore, CheckpointError, CheckpointStore,
    CheckpointUpdate, ContactInfo, CounterUpdate, JobCheckpoint, JobOutcome, JobStatus,
    NewCandidate, ParsedProfile, ProfileHint, RateLimitInfo, Recommendation, ScrapingStatus,
    StageLabel, StageName,
};

fn candidate(job: &JobCheckpoint, url: &str) -> NewCandidate {
    NewCandidate {
        job_id: job.id,
        owner_id: job.owner_id.clone(),
        profile_url: url.to_string(),
        full_name: None,
        headline: Some("Engineer".into()),
        contact: ContactInfo {
            email: Some(format!("{}@example.com", url.len())),
            phone: None,
        },
    }
}

fn score(overall: u8) -> CandidateScore {
    CandidateScore {
        overall,
        skills_match: overall,
        experience_match: overall,
        seniority_match: overall,
        location_match: overall,
        industry_match: overall,
        strengths: vec!["Rust".into()],
        concerns: vec![],
        summary: "ok".into(),
        recommendation: Recommendation::from_overall(overall),
    }
}

#[tokio::test]
async fn test_create_and_load_job() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");

    store.create(&job).await.unwrap();
    let loaded = store.load(job.id).await.unwrap();

    assert_eq!(loaded, job);
}

#[tokio::test]
async fn test_load_missing_job_is_not_found() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);

    let err = store.load(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, CheckpointError::NotFound(_)));
}

#[tokio::test]
async fn test_commit_merges_fields_and_refreshes_activity() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let mut job = new_job("owner-1", "Rust Engineer");
    job.last_activity_at = job.last_activity_at - Duration::hours(1);
    let before = job.last_activity_at;
    store.create(&job).await.unwrap();

    store
        .commit(
            job.id,
            CheckpointUpdate::new()
                .with_status(JobStatus::SearchingProfiles)
                .with_discovered(vec!["https://a".into(), "https://b".into()])
                .with_used_queries(vec!["v1-precise".into()])
                .with_completed(StageName::SearchProfiles),
        )
        .await
        .unwrap();
    let stored = store
        .commit(
            job.id,
            CheckpointUpdate::new()
                .with_discovered(vec!["https://b".into(), "https://c".into()])
                .with_counters(CounterUpdate {
                    profiles_found: Some(3),
                    ..Default::default()
                })
                .with_completed(StageName::FormatDescription)
                .with_error("enrichment failed for https://a"),
        )
        .await
        .unwrap();

    assert_eq!(stored.status, JobStatus::SearchingProfiles);
    assert_eq!(stored.discovered_urls.len(), 3);
    assert_eq!(stored.counters.profiles_found, 3);
    // Forward-only: an earlier stage never moves the marker back
    assert_eq!(stored.last_completed_stage, Some(StageName::SearchProfiles));
    assert_eq!(stored.error_log, vec!["enrichment failed for https://a"]);
    assert!(stored.last_activity_at > before);
    assert_eq!(store.load(job.id).await.unwrap(), stored);
}

#[tokio::test]
async fn test_profile_hints_persist_first_seen() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    store.create(&job).await.unwrap();

    let hint = ProfileHint {
        full_name: Some("Ada Lovelace".into()),
        headline: Some("Engineer".into()),
    };
    store
        .commit(
            job.id,
            CheckpointUpdate::new().with_hints(vec![("https://a".to_string(), hint.clone())]),
        )
        .await
        .unwrap();
    store
        .commit(
            job.id,
            CheckpointUpdate::new().with_hints(vec![(
                "https://a".to_string(),
                ProfileHint::default(),
            )]),
        )
        .await
        .unwrap();

    let loaded = store.load(job.id).await.unwrap();
    assert_eq!(loaded.profile_hints.get("https://a"), Some(&hint));
}

#[tokio::test]
async fn test_commit_keeps_stage_label_round_trip() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    store.create(&job).await.unwrap();

    let label = StageLabel::ScrapingBatch { batch: 2, total: 4 };
    store
        .commit(job.id, CheckpointUpdate::new().with_stage(label.clone()))
        .await
        .unwrap();

    let loaded = store.load(job.id).await.unwrap();
    assert_eq!(loaded.current_stage, label);
    assert_eq!(loaded.current_stage.to_string(), "SCRAPING_BATCH_2_OF_4");
}

#[tokio::test]
async fn test_record_retry_counts_until_ceiling() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    store.create(&job).await.unwrap();
    store
        .mark_terminal(
            job.id,
            JobOutcome::Failed {
                message: "scrape timed out".into(),
            },
        )
        .await
        .unwrap();

    for attempt in 1..=2 {
        let (stored, transition) = store.record_retry(job.id).await.unwrap();
        assert_eq!(transition.attempt, attempt);
        assert_eq!(stored.retry_count, attempt);
        assert_eq!(stored.status, JobStatus::Created);
        assert!(stored.error_message.is_none());
    }

    let err = store.record_retry(job.id).await.unwrap_err();
    assert!(matches!(err, CheckpointError::RetriesExhausted { attempts: 2, .. }));
    let stored = store.load(job.id).await.unwrap();
    assert_eq!(stored.retry_count, 2);
    assert!(stored.error_log.iter().any(|line| line.starts_with("retry 2/2")));
}

#[tokio::test]
async fn test_rate_limit_pause_and_release() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    store.create(&job).await.unwrap();

    let reset_at = now() + Duration::minutes(30);
    let paused = store
        .mark_terminal(
            job.id,
            JobOutcome::RateLimited(RateLimitInfo {
                provider: "enrichment".into(),
                hit_at: now(),
                reset_at,
                message: "429 Too Many Requests".into(),
            }),
        )
        .await
        .unwrap();
    assert_eq!(paused.status, JobStatus::RateLimited);
    assert_eq!(
        store.load(job.id).await.unwrap().rate_limit.map(|info| info.reset_at),
        Some(reset_at)
    );

    let released = store.release_rate_limit(job.id).await.unwrap();
    assert_eq!(released.status, JobStatus::Created);
    assert_eq!(released.retry_count, 0);
    assert!(released.rate_limit.is_none());

    // Only a paused job can be released
    let err = store.release_rate_limit(job.id).await.unwrap_err();
    assert!(matches!(err, CheckpointError::Invalid(_)));
}

#[tokio::test]
async fn test_list_unfinished_oldest_activity_first() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);

    let mut older = new_job("owner-1", "Older");
    older.last_activity_at = now() - Duration::hours(2);
    let mut newer = new_job("owner-1", "Newer");
    newer.last_activity_at = now() - Duration::hours(1);
    let done = new_job("owner-1", "Done");
    for job in [&newer, &older, &done] {
        store.create(job).await.unwrap();
    }
    store.mark_terminal(done.id, JobOutcome::Completed).await.unwrap();

    let ids: Vec<_> = store
        .list_unfinished()
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.id)
        .collect();
    assert_eq!(ids, vec![older.id, newer.id]);
}

#[tokio::test]
async fn test_list_jobs_filters_by_owner_newest_first() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);

    let mut first = new_job("owner-1", "First");
    first.created_at = now() - Duration::minutes(10);
    let second = new_job("owner-1", "Second");
    let other = new_job("owner-2", "Other");
    for job in [&first, &second, &other] {
        store.create(job).await.unwrap();
    }

    let titles: Vec<String> = store
        .list_jobs(Some("owner-1"))
        .await
        .unwrap()
        .into_iter()
        .map(|job| job.title)
        .collect();
    assert_eq!(titles, vec!["Second", "First"]);
    assert_eq!(store.list_jobs(None).await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_batches_upsert_and_order_by_index() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    store.create(&job).await.unwrap();

    for index in [3, 1, 2] {
        store
            .put_batch(
                job.id,
                BatchPayload {
                    kind: BatchKind::Scraped,
                    index,
                    data: vec![index as u8],
                },
            )
            .await
            .unwrap();
    }
    // Re-running a batch overwrites it
    store
        .put_batch(
            job.id,
            BatchPayload {
                kind: BatchKind::Scraped,
                index: 2,
                data: vec![20, 21],
            },
        )
        .await
        .unwrap();

    let batches = store.load_batches(job.id, BatchKind::Scraped).await.unwrap();
    let indexes: Vec<u32> = batches.iter().map(|b| b.index).collect();
    assert_eq!(indexes, vec![1, 2, 3]);
    assert_eq!(batches[1].data, vec![20, 21]);
    assert!(store.load_batches(job.id, BatchKind::Parsed).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_put_batch_for_missing_job_fails() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCheckpointStore::new(db);

    let err = store
        .put_batch(
            uuid::Uuid::new_v4(),
            BatchPayload {
                kind: BatchKind::Parsed,
                index: 1,
                data: vec![],
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CheckpointError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_cascades_to_candidates_and_batches() {
    let (_temp, db) = setup_test_db().await;
    let jobs = SqliteCheckpointStore::new(db.clone());
    let candidates = SqliteCandidateStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    jobs.create(&job).await.unwrap();
    candidates
        .insert_if_absent(candidate(&job, "https://a"))
        .await
        .unwrap();
    jobs.put_batch(
        job.id,
        BatchPayload {
            kind: BatchKind::Parsed,
            index: 1,
            data: vec![1],
        },
    )
    .await
    .unwrap();

    jobs.delete(job.id).await.unwrap();

    assert!(matches!(
        jobs.load(job.id).await.unwrap_err(),
        CheckpointError::NotFound(_)
    ));
    assert!(candidates.list_for_job(job.id).await.unwrap().is_empty());
    assert!(jobs.load_batches(job.id, BatchKind::Parsed).await.unwrap().is_empty());
    assert!(matches!(
        jobs.delete(job.id).await.unwrap_err(),
        CheckpointError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_insert_if_absent_collapses_duplicates() {
    let (_temp, db) = setup_test_db().await;
    let jobs = SqliteCheckpointStore::new(db.clone());
    let store = SqliteCandidateStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    jobs.create(&job).await.unwrap();

    let first = store
        .insert_if_absent(candidate(&job, "https://a"))
        .await
        .unwrap();
    let second = store
        .insert_if_absent(candidate(&job, "https://a"))
        .await
        .unwrap();

    assert!(first.is_created());
    assert!(!second.is_created());
    assert_eq!(first.record().id, second.record().id);
    assert_eq!(first.record().scraping_status, ScrapingStatus::Pending);
    assert_eq!(store.list_for_job(job.id).await.unwrap().len(), 1);
    assert_eq!(
        store
            .find_by_url(job.id, "https://a")
            .await
            .unwrap()
            .map(|r| r.id),
        Some(first.record().id)
    );
}

#[tokio::test]
async fn test_profile_and_score_lifecycle() {
    let (_temp, db) = setup_test_db().await;
    let jobs = SqliteCheckpointStore::new(db.clone());
    let store = SqliteCandidateStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    jobs.create(&job).await.unwrap();

    let mut ids = Vec::new();
    for url in ["https://c", "https://a", "https://b"] {
        let outcome = store.insert_if_absent(candidate(&job, url)).await.unwrap();
        ids.push(outcome.record().id);
    }

    let pending: Vec<String> = store
        .list_pending(job.id)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.profile_url)
        .collect();
    assert_eq!(pending, vec!["https://a", "https://b", "https://c"]);
    assert!(store.list_unscored(job.id).await.unwrap().is_empty());

    for id in &ids {
        store
            .save_profile(
                *id,
                ParsedProfile {
                    full_name: Some("Ada".into()),
                    skills: vec!["Rust".into()],
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap();
    }
    assert!(store.list_pending(job.id).await.unwrap().is_empty());
    assert_eq!(store.list_unscored(job.id).await.unwrap().len(), 3);

    for (id, overall) in ids.iter().zip([60, 90, 75]) {
        store.save_score(*id, score(overall)).await.unwrap();
    }
    assert!(store.list_unscored(job.id).await.unwrap().is_empty());

    let top = store.top_scored(job.id, 2).await.unwrap();
    let overall: Vec<u8> = top
        .iter()
        .filter_map(|r| r.score.as_ref().map(|s| s.overall))
        .collect();
    assert_eq!(overall, vec![90, 75]);
    assert_eq!(top[0].full_name.as_deref(), Some("Ada"));
    assert_eq!(top[0].headline.as_deref(), Some("Engineer"));

    let counts = store.counts(job.id).await.unwrap();
    assert_eq!(counts.total, 3);
    assert_eq!(counts.with_contact, 3);
    assert_eq!(counts.scraped, 3);
    assert_eq!(counts.scored, 3);
}

#[tokio::test]
async fn test_save_profile_for_missing_candidate_fails() {
    let (_temp, db) = setup_test_db().await;
    let store = SqliteCandidateStore::new(db);

    let err = store
        .save_profile(uuid::Uuid::new_v4(), ParsedProfile::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CheckpointError::NotFound(_)));
}

#[tokio::test]
async fn test_earlier_duplicate_is_first_seen_for_same_owner() {
    let (_temp, db) = setup_test_db().await;
    let jobs = SqliteCheckpointStore::new(db.clone());
    let store = SqliteCandidateStore::new(db);

    let first = new_job("owner-1", "First");
    let second = new_job("owner-1", "Second");
    let current = new_job("owner-1", "Current");
    let other_owner = new_job("owner-2", "Other");
    for job in [&first, &second, &current, &other_owner] {
        jobs.create(job).await.unwrap();
    }

    store.insert_if_absent(candidate(&first, "https://a")).await.unwrap();
    store.insert_if_absent(candidate(&second, "https://a")).await.unwrap();
    store
        .insert_if_absent(candidate(&other_owner, "https://b"))
        .await
        .unwrap();

    assert_eq!(
        store
            .find_earlier_duplicate("owner-1", "https://a", current.id)
            .await
            .unwrap(),
        Some(first.id)
    );
    // The job's own record never counts as an earlier sighting
    assert_eq!(
        store
            .find_earlier_duplicate("owner-1", "https://a", first.id)
            .await
            .unwrap(),
        Some(second.id)
    );
    assert_eq!(
        store
            .find_earlier_duplicate("owner-1", "https://b", current.id)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_delete_for_job_reports_removed_rows() {
    let (_temp, db) = setup_test_db().await;
    let jobs = SqliteCheckpointStore::new(db.clone());
    let store = SqliteCandidateStore::new(db);
    let job = new_job("owner-1", "Rust Engineer");
    jobs.create(&job).await.unwrap();
    for url in ["https://a", "https://b"] {
        store.insert_if_absent(candidate(&job, url)).await.unwrap();
    }

    assert_eq!(store.delete_for_job(job.id).await.unwrap(), 2);
    assert_eq!(store.counts(job.id).await.unwrap().total, 0);
}
