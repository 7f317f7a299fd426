//! Candidate repository (candidates table)

use super::{column, from_json, from_secs, parse_uuid, storage, to_json, to_secs, uuid_column};
use crate::db::Database;
use async_trait::async_trait;
use chrono::Utc;
use scout_checkpoint::{
    CandidateCounts, CandidateId, CandidateRecord, CandidateScore, CandidateStore,
    CheckpointError, ContactInfo, InsertOutcome, JobId, NewCandidate, ParsedProfile, Result,
    ScrapingStatus,
};
use sqlx::sqlite::SqliteRow;
use std::sync::Arc;

const CANDIDATE_COLUMNS: &str = "id, job_id, owner_id, profile_url, full_name, headline, email,
    phone, profile, scraping_status, is_scored, score, duplicate_of_job, created_at, updated_at";

/// [`CandidateStore`] over the `candidates` table
#[derive(Clone, Debug)]
pub struct SqliteCandidateStore {
    db: Arc<Database>,
}

fn candidate_from_row(row: &SqliteRow) -> Result<CandidateRecord> {
    let profile: Option<String> = column(row, "profile")?;
    let score: Option<String> = column(row, "score")?;
    let duplicate_of_job: Option<String> = column(row, "duplicate_of_job")?;
    let scraping_status: String = column(row, "scraping_status")?;
    let is_scored: i64 = column(row, "is_scored")?;

    Ok(CandidateRecord {
        id: uuid_column(row, "id")?,
        job_id: uuid_column(row, "job_id")?,
        owner_id: column(row, "owner_id")?,
        profile_url: column(row, "profile_url")?,
        full_name: column(row, "full_name")?,
        headline: column(row, "headline")?,
        contact: ContactInfo {
            email: column(row, "email")?,
            phone: column(row, "phone")?,
        },
        profile: profile.as_deref().map(from_json::<ParsedProfile>).transpose()?,
        scraping_status: ScrapingStatus::from(scraping_status.as_str()),
        is_scored: is_scored != 0,
        score: score.as_deref().map(from_json::<CandidateScore>).transpose()?,
        duplicate_of_job: duplicate_of_job.as_deref().map(parse_uuid).transpose()?,
        created_at: from_secs(column(row, "created_at")?)?,
        updated_at: from_secs(column(row, "updated_at")?)?,
    })
}

fn missing(id: CandidateId) -> CheckpointError {
    CheckpointError::NotFound(format!("candidate {}", id))
}

impl SqliteCandidateStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Fetch records of one job matching an extra `WHERE` clause, ordered by URL
    async fn select_for_job(&self, job_id: JobId, filter: &str) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM candidates WHERE job_id = ? {} ORDER BY profile_url ASC",
            CANDIDATE_COLUMNS, filter
        ))
        .bind(job_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .map_err(storage("list candidates"))?;
        rows.iter().map(candidate_from_row).collect()
    }
}

#[async_trait]
impl CandidateStore for SqliteCandidateStore {
    async fn insert_if_absent(&self, candidate: NewCandidate) -> Result<InsertOutcome> {
        let record = CandidateRecord::from_new(candidate, Utc::now());
        let result = sqlx::query(
            "INSERT INTO candidates (id, job_id, owner_id, profile_url, full_name, headline,
                                     email, phone, scraping_status, is_scored, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)
             ON CONFLICT (job_id, profile_url) DO NOTHING",
        )
        .bind(record.id.to_string())
        .bind(record.job_id.to_string())
        .bind(&record.owner_id)
        .bind(&record.profile_url)
        .bind(&record.full_name)
        .bind(&record.headline)
        .bind(&record.contact.email)
        .bind(&record.contact.phone)
        .bind(record.scraping_status.as_str())
        .bind(to_secs(record.created_at))
        .bind(to_secs(record.updated_at))
        .execute(self.db.pool())
        .await
        .map_err(storage("insert candidate"))?;

        if result.rows_affected() == 0 {
            let existing = self
                .find_by_url(record.job_id, &record.profile_url)
                .await?
                .ok_or_else(|| {
                    CheckpointError::Storage(format!(
                        "candidate {} vanished after conflict",
                        record.profile_url
                    ))
                })?;
            return Ok(InsertOutcome::Existing(existing));
        }

        // Reload so timestamps carry the stored precision
        let stored = self.get(record.id).await?.ok_or_else(|| missing(record.id))?;
        Ok(InsertOutcome::Created(stored))
    }

    async fn get(&self, id: CandidateId) -> Result<Option<CandidateRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM candidates WHERE id = ?", CANDIDATE_COLUMNS))
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .map_err(storage("load candidate"))?;
        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn find_by_url(
        &self,
        job_id: JobId,
        profile_url: &str,
    ) -> Result<Option<CandidateRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM candidates WHERE job_id = ? AND profile_url = ?",
            CANDIDATE_COLUMNS
        ))
        .bind(job_id.to_string())
        .bind(profile_url)
        .fetch_optional(self.db.pool())
        .await
        .map_err(storage("find candidate"))?;
        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn list_for_job(&self, job_id: JobId) -> Result<Vec<CandidateRecord>> {
        self.select_for_job(job_id, "").await
    }

    async fn list_pending(&self, job_id: JobId) -> Result<Vec<CandidateRecord>> {
        self.select_for_job(job_id, "AND scraping_status = 'PENDING'").await
    }

    async fn list_unscored(&self, job_id: JobId) -> Result<Vec<CandidateRecord>> {
        self.select_for_job(job_id, "AND scraping_status = 'SCRAPED' AND is_scored = 0")
            .await
    }

    async fn save_profile(
        &self,
        id: CandidateId,
        profile: ParsedProfile,
        duplicate_of_job: Option<JobId>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE candidates SET
                full_name = COALESCE(full_name, ?),
                headline = COALESCE(headline, ?),
                profile = ?,
                scraping_status = 'SCRAPED',
                duplicate_of_job = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&profile.full_name)
        .bind(&profile.headline)
        .bind(to_json(&profile)?)
        .bind(duplicate_of_job.map(|job| job.to_string()))
        .bind(to_secs(Utc::now()))
        .bind(id.to_string())
        .execute(self.db.pool())
        .await
        .map_err(storage("save profile"))?;

        if result.rows_affected() == 0 {
            return Err(missing(id));
        }
        Ok(())
    }

    async fn save_score(&self, id: CandidateId, score: CandidateScore) -> Result<()> {
        let result = sqlx::query(
            "UPDATE candidates SET score = ?, overall_score = ?, is_scored = 1, updated_at = ?
             WHERE id = ?",
        )
        .bind(to_json(&score)?)
        .bind(i64::from(score.overall))
        .bind(to_secs(Utc::now()))
        .bind(id.to_string())
        .execute(self.db.pool())
        .await
        .map_err(storage("save score"))?;

        if result.rows_affected() == 0 {
            return Err(missing(id));
        }
        Ok(())
    }

    async fn find_earlier_duplicate(
        &self,
        owner_id: &str,
        profile_url: &str,
        job_id: JobId,
    ) -> Result<Option<JobId>> {
        let earlier: Option<String> = sqlx::query_scalar(
            "SELECT job_id FROM candidates
             WHERE owner_id = ? AND profile_url = ? AND job_id != ?
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1",
        )
        .bind(owner_id)
        .bind(profile_url)
        .bind(job_id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(storage("look up duplicate"))?;
        earlier.as_deref().map(parse_uuid).transpose()
    }

    async fn counts(&self, job_id: JobId) -> Result<CandidateCounts> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total,
                COALESCE(SUM(CASE WHEN email IS NOT NULL OR phone IS NOT NULL THEN 1 ELSE 0 END), 0) AS with_contact,
                COALESCE(SUM(CASE WHEN scraping_status = 'SCRAPED' THEN 1 ELSE 0 END), 0) AS scraped,
                COALESCE(SUM(is_scored), 0) AS scored
             FROM candidates WHERE job_id = ?",
        )
        .bind(job_id.to_string())
        .fetch_one(self.db.pool())
        .await
        .map_err(storage("count candidates"))?;

        let count = |name: &str| -> Result<u32> {
            let value: i64 = column(&row, name)?;
            Ok(u32::try_from(value).unwrap_or(u32::MAX))
        };
        Ok(CandidateCounts {
            total: count("total")?,
            with_contact: count("with_contact")?,
            scraped: count("scraped")?,
            scored: count("scored")?,
        })
    }

    async fn top_scored(&self, job_id: JobId, limit: usize) -> Result<Vec<CandidateRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM candidates
             WHERE job_id = ? AND is_scored = 1
             ORDER BY overall_score DESC, profile_url ASC
             LIMIT ?",
            CANDIDATE_COLUMNS
        ))
        .bind(job_id.to_string())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(self.db.pool())
        .await
        .map_err(storage("list top candidates"))?;
        rows.iter().map(candidate_from_row).collect()
    }

    async fn delete_for_job(&self, job_id: JobId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM candidates WHERE job_id = ?")
            .bind(job_id.to_string())
            .execute(self.db.pool())
            .await
            .map_err(storage("delete candidates"))?;
        Ok(result.rows_affected())
    }
}
