//! Candidate records and the typed profile payloads carried through the
//! scrape, parse and score stages.

use crate::job::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub type CandidateId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScrapingStatus {
    Pending,
    Scraped,
}

impl ScrapingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Scraped => "SCRAPED",
        }
    }
}

impl fmt::Display for ScrapingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ScrapingStatus {
    fn from(s: &str) -> Self {
        match s {
            "SCRAPED" => Self::Scraped,
            _ => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl ContactInfo {
    pub fn has_contact(&self) -> bool {
        self.email.is_some() || self.phone.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    pub title: Option<String>,
    pub company: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub institution: Option<String>,
    pub degree: Option<String>,
    pub field: Option<String>,
}

/// Structured profile extracted from a raw scrape payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedProfile {
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub location: Option<String>,
    pub summary: Option<String>,
    pub skills: Vec<String>,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
    pub total_years_experience: Option<f32>,
}

impl ParsedProfile {
    /// Best-effort assembly from an arbitrary JSON object.
    ///
    /// Used when extraction output fails schema validation. Known keys are
    /// picked up under their common spellings (`fullName`/`name`,
    /// `positions`/`experience`, `schools`/`education`); skills may be plain
    /// strings or objects with a `name`. Anything unrecognized is dropped.
    pub fn fallback_from(value: &Value) -> Self {
        let text = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let array = |keys: &[&str]| -> Vec<Value> {
            keys.iter()
                .find_map(|k| value.get(*k).and_then(Value::as_array))
                .cloned()
                .unwrap_or_default()
        };
        let field = |item: &Value, keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| item.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };

        let skills = array(&["skills"])
            .iter()
            .filter_map(|skill| match skill {
                Value::String(s) => Some(s.clone()),
                other => other.get("name").and_then(Value::as_str).map(str::to_string),
            })
            .collect();

        let experience = array(&["experience", "positions", "experiences"])
            .iter()
            .map(|item| ExperienceEntry {
                title: field(item, &["title", "position"]),
                company: field(item, &["company", "companyName"]),
                start: field(item, &["start", "startDate"]),
                end: field(item, &["end", "endDate"]),
                description: field(item, &["description"]),
            })
            .collect();

        let education = array(&["education", "schools"])
            .iter()
            .map(|item| EducationEntry {
                institution: field(item, &["institution", "school", "schoolName"]),
                degree: field(item, &["degree", "degreeName"]),
                field: field(item, &["field", "fieldOfStudy"]),
            })
            .collect();

        let total_years_experience = ["total_years_experience", "totalYearsExperience"]
            .iter()
            .find_map(|k| value.get(*k).and_then(Value::as_f64))
            .map(|years| years as f32);

        Self {
            full_name: text(&["full_name", "fullName", "name"]),
            headline: text(&["headline", "title"]),
            location: text(&["location", "geoLocation"]),
            summary: text(&["summary", "about"]),
            skills,
            experience,
            education,
            total_years_experience,
        }
    }
}

/// Raw scrape payload for one profile, kept verbatim in scrape batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProfile {
    pub profile_url: String,
    pub payload: Value,
}

/// Parse output for one profile, kept in parse batches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedCandidate {
    pub profile_url: String,
    pub profile: ParsedProfile,
    /// True when the profile was assembled by the fallback path
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    StrongYes,
    Yes,
    Maybe,
    No,
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StrongYes => "strong_yes",
            Self::Yes => "yes",
            Self::Maybe => "maybe",
            Self::No => "no",
        }
    }

    pub fn from_overall(overall: u8) -> Self {
        match overall {
            85..=u8::MAX => Self::StrongYes,
            70..=84 => Self::Yes,
            50..=69 => Self::Maybe,
            _ => Self::No,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Multi-dimensional rubric score, each dimension 0..=100
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub overall: u8,
    pub skills_match: u8,
    pub experience_match: u8,
    pub seniority_match: u8,
    pub location_match: u8,
    pub industry_match: u8,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub concerns: Vec<String>,
    #[serde(default)]
    pub summary: String,
    pub recommendation: Recommendation,
}

impl CandidateScore {
    /// Best-effort assembly from a scorer response that failed validation.
    ///
    /// Missing dimensions count as 0, values are clamped to 0..=100, and a
    /// missing overall score is the mean of the dimensions present.
    pub fn fallback_from(value: &Value) -> Self {
        let dimension = |key: &str| -> Option<u8> {
            value
                .get(key)
                .and_then(Value::as_f64)
                .map(|v| v.clamp(0.0, 100.0).round() as u8)
        };
        let strings = |key: &str| -> Vec<String> {
            value
                .get(key)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let dims = [
            dimension("skills_match"),
            dimension("experience_match"),
            dimension("seniority_match"),
            dimension("location_match"),
            dimension("industry_match"),
        ];
        let present: Vec<u32> = dims.iter().flatten().map(|d| *d as u32).collect();
        let overall = dimension("overall").unwrap_or_else(|| {
            if present.is_empty() {
                0
            } else {
                (present.iter().sum::<u32>() / present.len() as u32) as u8
            }
        });

        Self {
            overall,
            skills_match: dims[0].unwrap_or(0),
            experience_match: dims[1].unwrap_or(0),
            seniority_match: dims[2].unwrap_or(0),
            location_match: dims[3].unwrap_or(0),
            industry_match: dims[4].unwrap_or(0),
            strengths: strings("strengths"),
            concerns: strings("concerns"),
            summary: value
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            recommendation: value
                .get("recommendation")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok())
                .unwrap_or_else(|| Recommendation::from_overall(overall)),
        }
    }
}

/// Input for a candidate created by successful enrichment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCandidate {
    pub job_id: JobId,
    pub owner_id: String,
    pub profile_url: String,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub contact: ContactInfo,
}

/// One discovered profile, unique per (job, profile URL)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: CandidateId,
    pub job_id: JobId,
    pub owner_id: String,
    pub profile_url: String,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub contact: ContactInfo,
    pub profile: Option<ParsedProfile>,
    pub scraping_status: ScrapingStatus,
    pub is_scored: bool,
    pub score: Option<CandidateScore>,
    /// Earlier job of the same owner where this profile was first seen
    pub duplicate_of_job: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateRecord {
    pub fn from_new(candidate: NewCandidate, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: candidate.job_id,
            owner_id: candidate.owner_id,
            profile_url: candidate.profile_url,
            full_name: candidate.full_name,
            headline: candidate.headline,
            contact: candidate.contact,
            profile: None,
            scraping_status: ScrapingStatus::Pending,
            is_scored: false,
            score: None,
            duplicate_of_job: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of [`insert_if_absent`](crate::CandidateStore::insert_if_absent)
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Created(CandidateRecord),
    Existing(CandidateRecord),
}

impl InsertOutcome {
    pub fn record(&self) -> &CandidateRecord {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Counts recomputed from candidate storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateCounts {
    pub total: u32,
    pub with_contact: u32,
    pub scraped: u32,
    pub scored: u32,
}
