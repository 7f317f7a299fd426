//! Job checkpoint repository (sourcing_jobs + batch_payloads)
//!
//! Every mutation is a read-merge-write inside one transaction. Writers in
//! this process are additionally serialized so two commits to the same job
//! never race on SQLite's lock upgrade.

use super::{
    column, from_json, from_secs, now_secs, storage, to_json, to_secs, u32_column, uuid_column,
};
use crate::db::Database;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_checkpoint::{
    BatchKind, BatchPayload, CheckpointError, CheckpointStore, CheckpointUpdate, JobCheckpoint,
    JobId, JobOutcome, RateLimitInfo, Result, RetryTransition, StageName,
};
use sqlx::sqlite::SqliteRow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

const JOB_COLUMNS: &str = "id, owner_id, title, raw_description, requirements, max_candidates,
    status, current_stage, last_completed_stage, variants, discovered_urls, profile_hints,
    enriched_urls, used_query_ids, search_iteration, counters, last_scraped_batch, last_parsed_batch,
    error_message, error_log, rate_limit, retry_count, max_retries, no_candidates_report,
    created_at, last_activity_at, completed_at, failed_at";

/// [`CheckpointStore`] over the `sourcing_jobs` and `batch_payloads` tables
#[derive(Clone, Debug)]
pub struct SqliteCheckpointStore {
    db: Arc<Database>,
    write_lock: Arc<Mutex<()>>,
}

/// Column values of the mutable part of a job row
struct JobColumns {
    status: &'static str,
    current_stage: String,
    last_completed_stage: Option<&'static str>,
    variants: String,
    discovered_urls: String,
    profile_hints: String,
    enriched_urls: String,
    used_query_ids: String,
    search_iteration: i64,
    counters: String,
    last_scraped_batch: i64,
    last_parsed_batch: i64,
    error_message: Option<String>,
    error_log: String,
    rate_limit: Option<String>,
    retry_count: i64,
    no_candidates_report: Option<String>,
    last_activity_at: i64,
    completed_at: Option<i64>,
    failed_at: Option<i64>,
}

impl JobColumns {
    fn encode(job: &JobCheckpoint) -> Result<Self> {
        Ok(Self {
            status: job.status.as_str(),
            current_stage: to_json(&job.current_stage)?,
            last_completed_stage: job.last_completed_stage.map(StageName::as_str),
            variants: to_json(&job.variants)?,
            discovered_urls: to_json(&job.discovered_urls)?,
            profile_hints: to_json(&job.profile_hints)?,
            enriched_urls: to_json(&job.enriched_urls)?,
            used_query_ids: to_json(&job.used_query_ids)?,
            search_iteration: i64::from(job.search_iteration),
            counters: to_json(&job.counters)?,
            last_scraped_batch: i64::from(job.last_scraped_batch),
            last_parsed_batch: i64::from(job.last_parsed_batch),
            error_message: job.error_message.clone(),
            error_log: to_json(&job.error_log)?,
            rate_limit: job.rate_limit.as_ref().map(to_json).transpose()?,
            retry_count: i64::from(job.retry_count),
            no_candidates_report: job.no_candidates_report.clone(),
            last_activity_at: to_secs(job.last_activity_at),
            completed_at: job.completed_at.map(to_secs),
            failed_at: job.failed_at.map(to_secs),
        })
    }
}

fn optional_secs(row: &SqliteRow, name: &str) -> Result<Option<DateTime<Utc>>> {
    column::<Option<i64>>(row, name)?.map(from_secs).transpose()
}

fn job_from_row(row: &SqliteRow) -> Result<JobCheckpoint> {
    let last_completed_stage: Option<String> = column(row, "last_completed_stage")?;
    let rate_limit: Option<String> = column(row, "rate_limit")?;
    let status: String = column(row, "status")?;

    Ok(JobCheckpoint {
        id: uuid_column(row, "id")?,
        owner_id: column(row, "owner_id")?,
        title: column(row, "title")?,
        raw_description: column(row, "raw_description")?,
        requirements: from_json(&column::<String>(row, "requirements")?)?,
        max_candidates: u32_column(row, "max_candidates")?,
        status: status.parse()?,
        current_stage: from_json(&column::<String>(row, "current_stage")?)?,
        last_completed_stage: last_completed_stage
            .as_deref()
            .map(str::parse::<StageName>)
            .transpose()?,
        variants: from_json(&column::<String>(row, "variants")?)?,
        discovered_urls: from_json(&column::<String>(row, "discovered_urls")?)?,
        profile_hints: from_json(&column::<String>(row, "profile_hints")?)?,
        enriched_urls: from_json(&column::<String>(row, "enriched_urls")?)?,
        used_query_ids: from_json(&column::<String>(row, "used_query_ids")?)?,
        search_iteration: u32_column(row, "search_iteration")?,
        counters: from_json(&column::<String>(row, "counters")?)?,
        last_scraped_batch: u32_column(row, "last_scraped_batch")?,
        last_parsed_batch: u32_column(row, "last_parsed_batch")?,
        error_message: column(row, "error_message")?,
        error_log: from_json(&column::<String>(row, "error_log")?)?,
        rate_limit: rate_limit.as_deref().map(from_json::<RateLimitInfo>).transpose()?,
        retry_count: u32_column(row, "retry_count")?,
        max_retries: u32_column(row, "max_retries")?,
        no_candidates_report: column(row, "no_candidates_report")?,
        created_at: from_secs(column(row, "created_at")?)?,
        last_activity_at: from_secs(column(row, "last_activity_at")?)?,
        completed_at: optional_secs(row, "completed_at")?,
        failed_at: optional_secs(row, "failed_at")?,
    })
}

fn not_found(job_id: JobId) -> CheckpointError {
    CheckpointError::NotFound(format!("job {}", job_id))
}

impl SqliteCheckpointStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Load, change and write back one job inside a transaction
    async fn mutate<R, F>(&self, job_id: JobId, change: F) -> Result<(JobCheckpoint, R)>
    where
        F: FnOnce(&mut JobCheckpoint) -> Result<R> + Send,
        R: Send,
    {
        let _writer = self.write_lock.lock().await;
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(storage("begin transaction"))?;

        let row = sqlx::query(&format!("SELECT {} FROM sourcing_jobs WHERE id = ?", JOB_COLUMNS))
            .bind(job_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("load job"))?
            .ok_or_else(|| not_found(job_id))?;

        let mut job = job_from_row(&row)?;
        let result = change(&mut job)?;
        job.last_activity_at = now_secs();
        let columns = JobColumns::encode(&job)?;

        sqlx::query(
            "UPDATE sourcing_jobs SET
                status = ?, current_stage = ?, last_completed_stage = ?, variants = ?,
                discovered_urls = ?, profile_hints = ?, enriched_urls = ?, used_query_ids = ?,
                search_iteration = ?,
                counters = ?, last_scraped_batch = ?, last_parsed_batch = ?, error_message = ?,
                error_log = ?, rate_limit = ?, retry_count = ?, no_candidates_report = ?,
                last_activity_at = ?, completed_at = ?, failed_at = ?
             WHERE id = ?",
        )
        .bind(columns.status)
        .bind(columns.current_stage)
        .bind(columns.last_completed_stage)
        .bind(columns.variants)
        .bind(columns.discovered_urls)
        .bind(columns.profile_hints)
        .bind(columns.enriched_urls)
        .bind(columns.used_query_ids)
        .bind(columns.search_iteration)
        .bind(columns.counters)
        .bind(columns.last_scraped_batch)
        .bind(columns.last_parsed_batch)
        .bind(columns.error_message)
        .bind(columns.error_log)
        .bind(columns.rate_limit)
        .bind(columns.retry_count)
        .bind(columns.no_candidates_report)
        .bind(columns.last_activity_at)
        .bind(columns.completed_at)
        .bind(columns.failed_at)
        .bind(job_id.to_string())
        .execute(&mut *tx)
        .await
        .map_err(storage("write job"))?;

        tx.commit().await.map_err(storage("commit transaction"))?;
        Ok((job, result))
    }

    async fn fetch_jobs(&self, sql: &str, owner_id: Option<&str>) -> Result<Vec<JobCheckpoint>> {
        let mut query = sqlx::query(sql);
        if let Some(owner) = owner_id {
            query = query.bind(owner.to_string());
        }
        let rows = query
            .fetch_all(self.db.pool())
            .await
            .map_err(storage("list jobs"))?;
        rows.iter().map(job_from_row).collect()
    }

    async fn exists(&self, job_id: JobId) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM sourcing_jobs WHERE id = ?")
            .bind(job_id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(storage("look up job"))?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn create(&self, job: &JobCheckpoint) -> Result<()> {
        let columns = JobColumns::encode(job)?;
        sqlx::query(&format!(
            "INSERT INTO sourcing_jobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            JOB_COLUMNS
        ))
        .bind(job.id.to_string())
        .bind(&job.owner_id)
        .bind(&job.title)
        .bind(&job.raw_description)
        .bind(to_json(&job.requirements)?)
        .bind(i64::from(job.max_candidates))
        .bind(columns.status)
        .bind(columns.current_stage)
        .bind(columns.last_completed_stage)
        .bind(columns.variants)
        .bind(columns.discovered_urls)
        .bind(columns.profile_hints)
        .bind(columns.enriched_urls)
        .bind(columns.used_query_ids)
        .bind(columns.search_iteration)
        .bind(columns.counters)
        .bind(columns.last_scraped_batch)
        .bind(columns.last_parsed_batch)
        .bind(columns.error_message)
        .bind(columns.error_log)
        .bind(columns.rate_limit)
        .bind(columns.retry_count)
        .bind(i64::from(job.max_retries))
        .bind(columns.no_candidates_report)
        .bind(to_secs(job.created_at))
        .bind(columns.last_activity_at)
        .bind(columns.completed_at)
        .bind(columns.failed_at)
        .execute(self.db.pool())
        .await
        .map_err(storage("create job"))?;

        debug!(job_id = %job.id, "Job row created");
        Ok(())
    }

    async fn load(&self, job_id: JobId) -> Result<JobCheckpoint> {
        let row = sqlx::query(&format!("SELECT {} FROM sourcing_jobs WHERE id = ?", JOB_COLUMNS))
            .bind(job_id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(storage("load job"))?
            .ok_or_else(|| not_found(job_id))?;
        job_from_row(&row)
    }

    async fn commit(&self, job_id: JobId, update: CheckpointUpdate) -> Result<JobCheckpoint> {
        let (job, ()) = self
            .mutate(job_id, |job| {
                job.apply_update(update);
                Ok(())
            })
            .await?;
        Ok(job)
    }

    async fn mark_terminal(&self, job_id: JobId, outcome: JobOutcome) -> Result<JobCheckpoint> {
        let (job, ()) = self
            .mutate(job_id, |job| {
                job.apply_outcome(&outcome, now_secs());
                Ok(())
            })
            .await?;
        Ok(job)
    }

    async fn record_retry(&self, job_id: JobId) -> Result<(JobCheckpoint, RetryTransition)> {
        self.mutate(job_id, |job| job.apply_retry(now_secs())).await
    }

    async fn release_rate_limit(&self, job_id: JobId) -> Result<JobCheckpoint> {
        let (job, ()) = self
            .mutate(job_id, |job| job.apply_resume(now_secs()))
            .await?;
        Ok(job)
    }

    async fn list_unfinished(&self) -> Result<Vec<JobCheckpoint>> {
        self.fetch_jobs(
            &format!(
                "SELECT {} FROM sourcing_jobs
                 WHERE status NOT IN ('COMPLETED', 'FAILED')
                 ORDER BY last_activity_at ASC",
                JOB_COLUMNS
            ),
            None,
        )
        .await
    }

    async fn list_jobs(&self, owner_id: Option<&str>) -> Result<Vec<JobCheckpoint>> {
        let sql = match owner_id {
            Some(_) => format!(
                "SELECT {} FROM sourcing_jobs WHERE owner_id = ? ORDER BY created_at DESC",
                JOB_COLUMNS
            ),
            None => format!("SELECT {} FROM sourcing_jobs ORDER BY created_at DESC", JOB_COLUMNS),
        };
        self.fetch_jobs(&sql, owner_id).await
    }

    async fn put_batch(&self, job_id: JobId, payload: BatchPayload) -> Result<()> {
        if !self.exists(job_id).await? {
            return Err(not_found(job_id));
        }
        sqlx::query(
            "INSERT INTO batch_payloads (job_id, kind, batch_index, data, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (job_id, kind, batch_index) DO UPDATE SET
                data = excluded.data, created_at = excluded.created_at",
        )
        .bind(job_id.to_string())
        .bind(payload.kind.as_str())
        .bind(i64::from(payload.index))
        .bind(payload.data)
        .bind(to_secs(Utc::now()))
        .execute(self.db.pool())
        .await
        .map_err(storage("store batch payload"))?;

        debug!(job_id = %job_id, kind = %payload.kind, batch = payload.index, "Batch payload stored");
        Ok(())
    }

    async fn load_batches(&self, job_id: JobId, kind: BatchKind) -> Result<Vec<BatchPayload>> {
        let rows = sqlx::query(
            "SELECT batch_index, data FROM batch_payloads
             WHERE job_id = ? AND kind = ?
             ORDER BY batch_index ASC",
        )
        .bind(job_id.to_string())
        .bind(kind.as_str())
        .fetch_all(self.db.pool())
        .await
        .map_err(storage("load batch payloads"))?;

        rows.iter()
            .map(|row| {
                Ok(BatchPayload {
                    kind,
                    index: u32_column(row, "batch_index")?,
                    data: column(row, "data")?,
                })
            })
            .collect()
    }

    async fn delete(&self, job_id: JobId) -> Result<()> {
        let _writer = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM sourcing_jobs WHERE id = ?")
            .bind(job_id.to_string())
            .execute(self.db.pool())
            .await
            .map_err(storage("delete job"))?;

        if result.rows_affected() == 0 {
            return Err(not_found(job_id));
        }
        Ok(())
    }
}
