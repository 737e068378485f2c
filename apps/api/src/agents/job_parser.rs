//! Job-posting parser — fetches (when given a URL) and structures the target
//! job. Extracted company/title are grounded against the posting text so the
//! parser cannot hallucinate an employer into the final resume.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::agents::prompts::{JOB_PARSE_PROMPT_TEMPLATE, JOB_PARSE_SYSTEM};
use crate::llm_client::{LlmClient, LlmError};

/// Structured job posting produced by the parsing agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedJob {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub responsibilities: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Error)]
pub enum JobInputError {
    /// The posting URL could not be fetched — user should paste the text.
    #[error("Failed to fetch job posting: {0}. Paste the job text instead.")]
    Unreachable(String),

    /// The site answered but refused us (bot protection, auth walls).
    #[error("The job posting site blocked automated access. Paste the job text instead.")]
    Blocked,

    #[error("Job posting parsing failed: {0}")]
    Parse(#[from] LlmError),
}

/// Fetches the posting body from a URL. Bot-protection refusals are
/// classified separately so the user gets a "paste the text" hint rather
/// than a generic fetch error.
pub async fn fetch_job_posting(http: &reqwest::Client, url: &str) -> Result<String, JobInputError> {
    let response = http
        .get(url)
        .header("user-agent", "Mozilla/5.0 (compatible; refit-api)")
        .send()
        .await
        .map_err(|e| JobInputError::Unreachable(e.to_string()))?;

    let status = response.status();
    if status.as_u16() == 403 || status.as_u16() == 503 {
        return Err(JobInputError::Blocked);
    }
    if !status.is_success() {
        return Err(JobInputError::Unreachable(format!("HTTP {status}")));
    }

    response
        .text()
        .await
        .map_err(|e| JobInputError::Unreachable(e.to_string()))
}

/// Parses posting text into a `ParsedJob`, then grounds the extracted
/// company and title against the source text.
pub async fn parse_job(llm: &LlmClient, job_text: &str) -> Result<ParsedJob, JobInputError> {
    let prompt = JOB_PARSE_PROMPT_TEMPLATE.replace("{job_text}", job_text);
    let mut job: ParsedJob = llm.call_json(&prompt, JOB_PARSE_SYSTEM).await?;

    if !is_grounded(&job.company, job_text) {
        warn!(
            "Job parser grounding: company '{}' not found in posting text, degrading to Unknown",
            job.company
        );
        job.company = "Unknown".to_string();
    }
    if !is_grounded(&job.title, job_text) {
        warn!("Job parser grounding: title '{}' not found in posting text", job.title);
    }

    Ok(job)
}

/// A value is grounded when it appears in the source text, either as an exact
/// substring or word-by-word. "Unknown" and empty values pass trivially.
fn is_grounded(value: &str, text: &str) -> bool {
    let value_lower = value.trim().to_lowercase();
    if value_lower.is_empty() || value_lower == "unknown" {
        return true;
    }
    let text_lower = text.to_lowercase();
    if text_lower.contains(&value_lower) {
        return true;
    }
    value_lower.split_whitespace().all(|w| text_lower.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSTING: &str = "Acme Robotics is hiring a Senior Rust Engineer \
        to build motion-planning services. Requirements: Rust, tokio, Postgres.";

    #[test]
    fn test_grounded_exact_substring() {
        assert!(is_grounded("Acme Robotics", POSTING));
        assert!(is_grounded("Senior Rust Engineer", POSTING));
    }

    #[test]
    fn test_grounded_is_case_insensitive() {
        assert!(is_grounded("acme robotics", POSTING));
        assert!(is_grounded("SENIOR RUST ENGINEER", POSTING));
    }

    #[test]
    fn test_grounded_word_by_word_fallback() {
        // Words scattered across the text still count as grounded.
        assert!(is_grounded("Rust Services", POSTING));
    }

    #[test]
    fn test_ungrounded_company_detected() {
        assert!(!is_grounded("Globex Corporation", POSTING));
    }

    #[test]
    fn test_unknown_and_empty_pass_trivially() {
        assert!(is_grounded("Unknown", POSTING));
        assert!(is_grounded("unknown", POSTING));
        assert!(is_grounded("", POSTING));
    }

    #[test]
    fn test_parsed_job_deserializes_with_defaults() {
        let json = r#"{"title": "Engineer", "company": "Acme"}"#;
        let job: ParsedJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.title, "Engineer");
        assert!(job.keywords.is_empty());
        assert!(job.location.is_empty());
    }
}
