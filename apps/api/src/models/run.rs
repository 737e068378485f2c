use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle of an optimization run.
///
/// The graph is forward-only: the single loop-back is `refining → generating`,
/// and `complete`/`failed` are absorbing. The orchestrator owns all writes;
/// everything else reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Parsing,
    Generating,
    Validating,
    Refining,
    Complete,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Parsing => "parsing",
            RunStatus::Generating => "generating",
            RunStatus::Validating => "validating",
            RunStatus::Refining => "refining",
            RunStatus::Complete => "complete",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "parsing" => Some(RunStatus::Parsing),
            "generating" => Some(RunStatus::Generating),
            "validating" => Some(RunStatus::Validating),
            "refining" => Some(RunStatus::Refining),
            "complete" => Some(RunStatus::Complete),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Complete | RunStatus::Failed)
    }

    /// Valid edges of the state graph. `failed` is reachable from every
    /// non-terminal state; terminal states have no outgoing edges.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == RunStatus::Failed {
            return true;
        }
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Parsing)
                | (RunStatus::Parsing, RunStatus::Generating)
                | (RunStatus::Generating, RunStatus::Validating)
                | (RunStatus::Validating, RunStatus::Refining)
                | (RunStatus::Validating, RunStatus::Complete)
                | (RunStatus::Refining, RunStatus::Generating)
        )
    }
}

/// One row of the `runs` table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RunRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub document_id: Uuid,
    pub job_input: String,
    pub status: String,
    pub current_step: Option<String>,
    pub iterations: i32,
    pub job_parsed: Option<serde_json::Value>,
    pub result_html: Option<String>,
    pub artifact_path: Option<String>,
    pub error: Option<String>,
    pub debited: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRow {
    pub fn status(&self) -> RunStatus {
        RunStatus::parse(&self.status).unwrap_or(RunStatus::Failed)
    }

    /// True when `job_input` is a URL rather than pasted posting text.
    pub fn job_url(&self) -> Option<&str> {
        if self.job_input.starts_with("http://") || self.job_input.starts_with("https://") {
            Some(&self.job_input)
        } else {
            None
        }
    }
}

/// One appended row of `run_feedback` — the validator results of a single
/// generate→validate iteration. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FeedbackRow {
    pub run_id: Uuid,
    pub iteration: i32,
    pub passed: bool,
    pub results: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
