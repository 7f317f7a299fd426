//! In-memory stores for development and testing
//!
//! Both stores keep their data behind `Arc<RwLock<HashMap>>`, so clones share
//! state. Each commit holds the write lock for its read-merge-write, which
//! gives the same atomicity the SQLite backend gets from a transaction.

use crate::candidate::{
    CandidateCounts, CandidateId, CandidateRecord, CandidateScore, InsertOutcome, NewCandidate,
    ParsedProfile, ScrapingStatus,
};
use crate::error::{CheckpointError, Result};
use crate::job::{JobCheckpoint, JobId, JobOutcome, RetryTransition};
use crate::reducer::CheckpointUpdate;
use crate::traits::{BatchKind, BatchPayload, CandidateStore, CheckpointStore};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type BatchKey = (JobId, BatchKind);

#[derive(Default)]
struct JobTables {
    jobs: HashMap<JobId, JobCheckpoint>,
    batches: HashMap<BatchKey, BTreeMap<u32, Vec<u8>>>,
}

/// In-memory [`CheckpointStore`]
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    storage: Arc<RwLock<JobTables>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs
    pub async fn job_count(&self) -> usize {
        self.storage.read().await.jobs.len()
    }

    /// Overwrite a stored record as-is, bypassing merge policies.
    ///
    /// Lets tests age `last_activity_at` or plant a crash state.
    pub async fn overwrite(&self, job: JobCheckpoint) {
        self.storage.write().await.jobs.insert(job.id, job);
    }

    pub async fn clear(&self) {
        let mut storage = self.storage.write().await;
        storage.jobs.clear();
        storage.batches.clear();
    }
}

fn not_found(job_id: JobId) -> CheckpointError {
    CheckpointError::NotFound(format!("job {}", job_id))
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn create(&self, job: &JobCheckpoint) -> Result<()> {
        let mut storage = self.storage.write().await;
        if storage.jobs.contains_key(&job.id) {
            return Err(CheckpointError::Storage(format!(
                "job {} already exists",
                job.id
            )));
        }
        storage.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<JobCheckpoint> {
        self.storage
            .read()
            .await
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or_else(|| not_found(job_id))
    }

    async fn commit(&self, job_id: JobId, update: CheckpointUpdate) -> Result<JobCheckpoint> {
        let mut storage = self.storage.write().await;
        let job = storage.jobs.get_mut(&job_id).ok_or_else(|| not_found(job_id))?;
        job.apply_update(update);
        job.last_activity_at = Utc::now();
        Ok(job.clone())
    }

    async fn mark_terminal(&self, job_id: JobId, outcome: JobOutcome) -> Result<JobCheckpoint> {
        let mut storage = self.storage.write().await;
        let job = storage.jobs.get_mut(&job_id).ok_or_else(|| not_found(job_id))?;
        job.apply_outcome(&outcome, Utc::now());
        Ok(job.clone())
    }

    async fn record_retry(&self, job_id: JobId) -> Result<(JobCheckpoint, RetryTransition)> {
        let mut storage = self.storage.write().await;
        let job = storage.jobs.get_mut(&job_id).ok_or_else(|| not_found(job_id))?;
        let transition = job.apply_retry(Utc::now())?;
        Ok((job.clone(), transition))
    }

    async fn release_rate_limit(&self, job_id: JobId) -> Result<JobCheckpoint> {
        let mut storage = self.storage.write().await;
        let job = storage.jobs.get_mut(&job_id).ok_or_else(|| not_found(job_id))?;
        job.apply_resume(Utc::now())?;
        Ok(job.clone())
    }

    async fn list_unfinished(&self) -> Result<Vec<JobCheckpoint>> {
        let storage = self.storage.read().await;
        let mut jobs: Vec<JobCheckpoint> = storage
            .jobs
            .values()
            .filter(|job| !job.status.is_terminal())
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.last_activity_at);
        Ok(jobs)
    }

    async fn list_jobs(&self, owner_id: Option<&str>) -> Result<Vec<JobCheckpoint>> {
        let storage = self.storage.read().await;
        let mut jobs: Vec<JobCheckpoint> = storage
            .jobs
            .values()
            .filter(|job| owner_id.map_or(true, |owner| job.owner_id == owner))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn put_batch(&self, job_id: JobId, payload: BatchPayload) -> Result<()> {
        let mut storage = self.storage.write().await;
        if !storage.jobs.contains_key(&job_id) {
            return Err(not_found(job_id));
        }
        storage
            .batches
            .entry((job_id, payload.kind))
            .or_default()
            .insert(payload.index, payload.data);
        Ok(())
    }

    async fn load_batches(&self, job_id: JobId, kind: BatchKind) -> Result<Vec<BatchPayload>> {
        let storage = self.storage.read().await;
        Ok(storage
            .batches
            .get(&(job_id, kind))
            .map(|batches| {
                batches
                    .iter()
                    .map(|(index, data)| BatchPayload {
                        kind,
                        index: *index,
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, job_id: JobId) -> Result<()> {
        let mut storage = self.storage.write().await;
        storage.jobs.remove(&job_id).ok_or_else(|| not_found(job_id))?;
        storage.batches.retain(|(id, _), _| *id != job_id);
        Ok(())
    }
}

/// In-memory [`CandidateStore`]
#[derive(Clone, Default)]
pub struct InMemoryCandidateStore {
    storage: Arc<RwLock<HashMap<CandidateId, CandidateRecord>>>,
}

impl InMemoryCandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn candidate_count(&self) -> usize {
        self.storage.read().await.len()
    }

    async fn sorted(&self, filter: impl Fn(&CandidateRecord) -> bool) -> Vec<CandidateRecord> {
        let storage = self.storage.read().await;
        let mut records: Vec<CandidateRecord> =
            storage.values().filter(|r| filter(*r)).cloned().collect();
        records.sort_by(|a, b| a.profile_url.cmp(&b.profile_url));
        records
    }
}

#[async_trait]
impl CandidateStore for InMemoryCandidateStore {
    async fn insert_if_absent(&self, candidate: NewCandidate) -> Result<InsertOutcome> {
        let mut storage = self.storage.write().await;
        if let Some(existing) = storage
            .values()
            .find(|r| r.job_id == candidate.job_id && r.profile_url == candidate.profile_url)
        {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }
        let record = CandidateRecord::from_new(candidate, Utc::now());
        storage.insert(record.id, record.clone());
        Ok(InsertOutcome::Created(record))
    }

    async fn get(&self, id: CandidateId) -> Result<Option<CandidateRecord>> {
        Ok(self.storage.read().await.get(&id).cloned())
    }

    async fn find_by_url(
        &self,
        job_id: JobId,
        profile_url: &str,
    ) -> Result<Option<CandidateRecord>> {
        Ok(self
            .storage
            .read()
            .await
            .values()
            .find(|r| r.job_id == job_id && r.profile_url == profile_url)
            .cloned())
    }

    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<CandidateRecord>> {
        Ok(self.sorted(|r| r.job_id == job_id).await)
    }

    async fn list_pending(&self, job_id: JobId) -> Result<Vec<CandidateRecord>> {
        Ok(self
            .sorted(|r| r.job_id == job_id && r.scraping_status == ScrapingStatus::Pending)
            .await)
    }

    async fn list_unscored(&self, job_id: JobId) -> Result<Vec<CandidateRecord>> {
        Ok(self
            .sorted(|r| {
                r.job_id == job_id
                    && r.scraping_status == ScrapingStatus::Scraped
                    && !r.is_scored
            })
            .await)
    }

    async fn save_profile(
        &self,
        id: CandidateId,
        profile: ParsedProfile,
        duplicate_of_job: Option<JobId>,
    ) -> Result<()> {
        let mut storage = self.storage.write().await;
        let record = storage
            .get_mut(&id)
            .ok_or_else(|| CheckpointError::NotFound(format!("candidate {}", id)))?;
        if record.full_name.is_none() {
            record.full_name = profile.full_name.clone();
        }
        if record.headline.is_none() {
            record.headline = profile.headline.clone();
        }
        record.profile = Some(profile);
        record.scraping_status = ScrapingStatus::Scraped;
        record.duplicate_of_job = duplicate_of_job;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn save_score(&self, id: CandidateId, score: CandidateScore) -> Result<()> {
        let mut storage = self.storage.write().await;
        let record = storage
            .get_mut(&id)
            .ok_or_else(|| CheckpointError::NotFound(format!("candidate {}", id)))?;
        record.score = Some(score);
        record.is_scored = true;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn find_earlier_duplicate(
        &self,
        owner_id: &str,
        profile_url: &str,
        job_id: JobId,
    ) -> Result<Option<JobId>> {
        Ok(self
            .storage
            .read()
            .await
            .values()
            .filter(|r| r.owner_id == owner_id && r.profile_url == profile_url && r.job_id != job_id)
            .min_by_key(|r| r.created_at)
            .map(|r| r.job_id))
    }

    async fn counts(&self, job_id: JobId) -> Result<CandidateCounts> {
        let storage = self.storage.read().await;
        let mut counts = CandidateCounts::default();
        for record in storage.values().filter(|r| r.job_id == job_id) {
            counts.total += 1;
            if record.contact.has_contact() {
                counts.with_contact += 1;
            }
            if record.scraping_status == ScrapingStatus::Scraped {
                counts.scraped += 1;
            }
            if record.is_scored {
                counts.scored += 1;
            }
        }
        Ok(counts)
    }

    async fn top_scored(&self, job_id: JobId, limit: usize) -> Result<Vec<CandidateRecord>> {
        let mut records = self.sorted(|r| r.job_id == job_id && r.is_scored).await;
        records.sort_by(|a, b| {
            let a_score = a.score.as_ref().map_or(0, |s| s.overall);
            let b_score = b.score.as_ref().map_or(0, |s| s.overall);
            b_score.cmp(&a_score)
        });
        records.truncate(limit);
        Ok(records)
    }

    async fn delete_for_job(&self, job_id: JobId) -> Result<u64> {
        let mut storage = self.storage.write().await;
        let before = storage.len();
        storage.retain(|_, r| r.job_id != job_id);
        Ok((before - storage.len()) as u64)
    }
}
