//! Bounded-field validators for the identifiers and primitive strings that
//! flow through `JobSpec`/`WorkflowSpec`. Every validator is pure and eager:
//! callers reject bad input before any state is written, per the propagation
//! policy in the error-handling design.

use crate::error::OrcaError;
use regex::Regex;
use std::sync::OnceLock;

fn job_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{0,127}$").unwrap())
}

fn image_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-/:@]{0,255}$").unwrap())
}

/// Characters forbidden anywhere in an artifact glob/path entry.
const FORBIDDEN_ARTIFACT_CHARS: &[char] = &[';', '|', '&', '$', '`', '(', ')', '{', '}', '!'];

pub const MIN_TTL_SECONDS: u32 = 10;
pub const MAX_TTL_SECONDS: u32 = 86_400;

pub fn validate_job_id(id: &str) -> Result<(), OrcaError> {
    if job_id_re().is_match(id) {
        Ok(())
    } else {
        Err(OrcaError::validation(format!(
            "job id {id:?} does not match ^[A-Za-z0-9][A-Za-z0-9_-]{{0,127}}$"
        )))
    }
}

pub fn validate_image_ref(image: &str) -> Result<(), OrcaError> {
    if image_ref_re().is_match(image) {
        Ok(())
    } else {
        Err(OrcaError::validation(format!(
            "image reference {image:?} does not match ^[A-Za-z0-9][A-Za-z0-9._\\-/:@]{{0,255}}$"
        )))
    }
}

pub fn validate_ttl_seconds(ttl: u32) -> Result<(), OrcaError> {
    if (MIN_TTL_SECONDS..=MAX_TTL_SECONDS).contains(&ttl) {
        Ok(())
    } else {
        Err(OrcaError::validation(format!(
            "ttl_seconds {ttl} out of range [{MIN_TTL_SECONDS}, {MAX_TTL_SECONDS}]"
        )))
    }
}

pub fn validate_artifact_pattern(pattern: &str) -> Result<(), OrcaError> {
    if pattern.is_empty() {
        return Err(OrcaError::validation("artifact pattern must not be empty"));
    }
    if let Some(c) = pattern.chars().find(|c| FORBIDDEN_ARTIFACT_CHARS.contains(c)) {
        return Err(OrcaError::validation(format!(
            "artifact pattern {pattern:?} contains forbidden character {c:?}"
        )));
    }
    Ok(())
}
