//! Schema validation of AI extraction output, with fallback assembly
//!
//! Parser and scorer responses are checked against a JSON Schema before they
//! are trusted as typed values. A response that violates the schema is not an
//! error: it is assembled best-effort through
//! [`ParsedProfile::fallback_from`] / [`CandidateScore::fallback_from`] and
//! flagged as such.

use jsonschema::JSONSchema;
use scout_checkpoint::{CandidateScore, ParsedProfile};
use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::warn;

static PROFILE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    let entry = json!({"type": ["string", "null"]});
    json!({
        "type": "object",
        "required": ["skills", "experience", "education"],
        "properties": {
            "full_name": entry,
            "headline": entry,
            "location": entry,
            "summary": entry,
            "skills": {"type": "array", "items": {"type": "string"}},
            "experience": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": entry, "company": entry, "start": entry,
                        "end": entry, "description": entry
                    }
                }
            },
            "education": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"institution": entry, "degree": entry, "field": entry}
                }
            },
            "total_years_experience": {"type": ["number", "null"], "minimum": 0}
        }
    })
});

static SCORE_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    let dimension = json!({"type": "integer", "minimum": 0, "maximum": 100});
    json!({
        "type": "object",
        "required": [
            "overall", "skills_match", "experience_match", "seniority_match",
            "location_match", "industry_match", "recommendation"
        ],
        "properties": {
            "overall": dimension,
            "skills_match": dimension,
            "experience_match": dimension,
            "seniority_match": dimension,
            "location_match": dimension,
            "industry_match": dimension,
            "strengths": {"type": "array", "items": {"type": "string"}},
            "concerns": {"type": "array", "items": {"type": "string"}},
            "summary": {"type": "string"},
            "recommendation": {"enum": ["strong_yes", "yes", "maybe", "no"]}
        }
    })
});

/// Compiled once on first use; a schema that fails to compile keeps its error
type Validator = LazyLock<Result<JSONSchema, String>>;

static PROFILE_VALIDATOR: Validator =
    LazyLock::new(|| JSONSchema::compile(&PROFILE_SCHEMA).map_err(|e| e.to_string()));

static SCORE_VALIDATOR: Validator =
    LazyLock::new(|| JSONSchema::compile(&SCORE_SCHEMA).map_err(|e| e.to_string()));

/// Validate `value` against `schema`, collecting every violation
pub fn validate(schema: &Value, value: &Value) -> Result<(), Vec<String>> {
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| vec![format!("invalid schema: {}", e)])?;
    validate_compiled(&compiled, value)
}

fn validate_with(validator: &Validator, value: &Value) -> Result<(), Vec<String>> {
    match LazyLock::force(validator) {
        Ok(compiled) => validate_compiled(compiled, value),
        Err(e) => Err(vec![format!("invalid schema: {}", e)]),
    }
}

fn validate_compiled(compiled: &JSONSchema, value: &Value) -> Result<(), Vec<String>> {
    // Collect while `compiled` is alive; the error iterator borrows it.
    let errors: Vec<String> = match compiled.validate(value) {
        Ok(()) => Vec::new(),
        Err(errors) => errors
            .map(|e| format!("{}: {}", e.instance_path, e))
            .collect(),
    };

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Typed profile from parser output; `true` when the fallback path was used
pub fn profile_from_value(value: &Value) -> (ParsedProfile, bool) {
    let checked = validate_with(&PROFILE_VALIDATOR, value).map_err(|errors| errors.join("; "));
    match checked.and_then(|()| {
        serde_json::from_value::<ParsedProfile>(value.clone()).map_err(|e| e.to_string())
    }) {
        Ok(profile) => (profile, false),
        Err(reason) => {
            warn!(reason = %reason, "Parsed profile failed validation, assembling fallback");
            (ParsedProfile::fallback_from(value), true)
        }
    }
}

/// Typed score from scorer output; `true` when the fallback path was used
pub fn score_from_value(value: &Value) -> (CandidateScore, bool) {
    let checked = validate_with(&SCORE_VALIDATOR, value).map_err(|errors| errors.join("; "));
    match checked.and_then(|()| {
        serde_json::from_value::<CandidateScore>(value.clone()).map_err(|e| e.to_string())
    }) {
        Ok(score) => (score, false),
        Err(reason) => {
            warn!(reason = %reason, "Score failed validation, assembling fallback");
            (CandidateScore::fallback_from(value), true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_checkpoint::Recommendation;

    #[test]
    fn test_valid_profile_is_taken_verbatim() {
        let value = json!({
            "full_name": "Grace Hopper",
            "skills": ["COBOL"],
            "experience": [{"title": "Rear Admiral", "company": "US Navy"}],
            "education": [{"institution": "Yale", "degree": "PhD"}],
            "total_years_experience": 40
        });
        let (profile, fallback) = profile_from_value(&value);
        assert!(!fallback);
        assert_eq!(profile.full_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(profile.total_years_experience, Some(40.0));
    }

    #[test]
    fn test_schema_violation_uses_fallback() {
        let value = json!({
            "fullName": "Grace Hopper",
            "skills": [{"name": "COBOL"}]
        });
        let (profile, fallback) = profile_from_value(&value);
        assert!(fallback);
        assert_eq!(profile.full_name.as_deref(), Some("Grace Hopper"));
        assert_eq!(profile.skills, vec!["COBOL"]);
    }

    #[test]
    fn test_score_out_of_range_uses_fallback() {
        let value = json!({
            "overall": 120, "skills_match": 90, "experience_match": 80,
            "seniority_match": 70, "location_match": 100, "industry_match": 50,
            "recommendation": "yes"
        });
        let (score, fallback) = score_from_value(&value);
        assert!(fallback);
        assert_eq!(score.overall, 100);
        assert_eq!(score.recommendation, Recommendation::Yes);
    }

    #[test]
    fn test_valid_score() {
        let value = json!({
            "overall": 82, "skills_match": 90, "experience_match": 80,
            "seniority_match": 70, "location_match": 100, "industry_match": 50,
            "strengths": ["systems"], "concerns": [], "summary": "solid",
            "recommendation": "yes"
        });
        let (score, fallback) = score_from_value(&value);
        assert!(!fallback);
        assert_eq!(score.overall, 82);
        assert_eq!(score.summary, "solid");
    }

    #[test]
    fn test_built_in_schemas_compile() {
        assert!(PROFILE_VALIDATOR.is_ok());
        assert!(SCORE_VALIDATOR.is_ok());
        assert!(validate_with(&SCORE_VALIDATOR, &json!({"overall": "high"})).is_err());
    }

    #[test]
    fn test_validate_reports_paths() {
        let errors = validate(&SCORE_SCHEMA, &json!({"overall": "high"})).unwrap_err();
        assert!(!errors.is_empty());
    }
}
