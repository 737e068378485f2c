//! Run status reporting — translates run rows into the externally visible
//! status payloads the polling client consumes. Strictly read-only: polling
//! has no side effects, so clients can poll as often as they like.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::run::{FeedbackRow, RunRow};

/// Full status payload for `GET /api/v1/optimize/:id`.
#[derive(Debug, Serialize)]
pub struct RunStatusResponse {
    pub id: Uuid,
    pub status: String,
    pub current_step: Option<String>,
    pub iterations: i32,
    pub job_parsed: Option<serde_json::Value>,
    pub job_url: Option<String>,
    pub feedback: Vec<IterationFeedback>,
    pub result_html: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct IterationFeedback {
    pub iteration: i32,
    pub passed: bool,
    pub results: serde_json::Value,
}

/// Listing payload for `GET /api/v1/optimize`.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub status: String,
    pub job_title: Option<String>,
    pub job_company: Option<String>,
    pub job_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn status_response(run: RunRow, feedback: Vec<FeedbackRow>) -> RunStatusResponse {
    let job_url = run.job_url().map(str::to_string);
    RunStatusResponse {
        id: run.id,
        status: run.status().as_str().to_string(),
        current_step: run.current_step,
        iterations: run.iterations,
        job_parsed: run.job_parsed,
        job_url,
        feedback: feedback
            .into_iter()
            .map(|row| IterationFeedback {
                iteration: row.iteration,
                passed: row.passed,
                results: row.results,
            })
            .collect(),
        result_html: run.result_html,
        error: run.error,
        created_at: run.created_at,
    }
}

pub fn summary(run: &RunRow) -> RunSummary {
    let job = run.job_parsed.as_ref();
    RunSummary {
        id: run.id,
        status: run.status().as_str().to_string(),
        job_title: job
            .and_then(|j| j.get("title"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        job_company: job
            .and_then(|j| j.get("company"))
            .and_then(|v| v.as_str())
            .map(str::to_string),
        job_url: run.job_url().map(str::to_string),
        created_at: run.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_row(status: &str) -> RunRow {
        RunRow {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            job_input: "https://jobs.example.com/42".to_string(),
            status: status.to_string(),
            current_step: Some("Validating draft (iteration 2)...".to_string()),
            iterations: 2,
            job_parsed: Some(serde_json::json!({
                "title": "Platform Engineer",
                "company": "Initech",
            })),
            result_html: None,
            artifact_path: None,
            error: None,
            debited: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn feedback_row(run_id: Uuid, iteration: i32, passed: bool) -> FeedbackRow {
        FeedbackRow {
            run_id,
            iteration,
            passed,
            results: serde_json::json!([{"name": "KeywordCoverage", "passed": passed}]),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_response_carries_ordered_feedback() {
        let run = run_row("validating");
        let id = run.id;
        let response = status_response(
            run,
            vec![feedback_row(id, 1, false), feedback_row(id, 2, true)],
        );
        assert_eq!(response.status, "validating");
        assert_eq!(response.feedback.len(), 2);
        assert_eq!(response.feedback[0].iteration, 1);
        assert!(!response.feedback[0].passed);
        assert!(response.feedback[1].passed);
    }

    #[test]
    fn test_status_response_extracts_job_url_from_input() {
        let response = status_response(run_row("pending"), vec![]);
        assert_eq!(
            response.job_url.as_deref(),
            Some("https://jobs.example.com/42")
        );
    }

    #[test]
    fn test_summary_pulls_title_and_company_from_snapshot() {
        let s = summary(&run_row("complete"));
        assert_eq!(s.job_title.as_deref(), Some("Platform Engineer"));
        assert_eq!(s.job_company.as_deref(), Some("Initech"));
    }

    #[test]
    fn test_summary_tolerates_missing_snapshot() {
        let mut run = run_row("parsing");
        run.job_parsed = None;
        let s = summary(&run);
        assert!(s.job_title.is_none());
        assert!(s.job_company.is_none());
    }
}
