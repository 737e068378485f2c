//! Run orchestrator — drives one optimization run through
//! `pending → parsing → generating → validating → (refining → generating |
//! complete)` as a detached background task.
//!
//! Suspension points are exactly the external calls: posting fetch, the two
//! agents, the validation pipeline, and artifact rendering. Each is bounded
//! by a per-step timeout, and the whole task by a wall-clock deadline, so a
//! run can stall but never hang. No locks are held across any await; the only
//! cross-run state is the account counters, touched solely through the
//! ledger's conditional updates.

use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::agents::job_parser::{self, JobInputError};
use crate::agents::optimizer;
use crate::errors::AppError;
use crate::ledger;
use crate::models::run::{RunRow, RunStatus};
use crate::pipeline::ValidationContext;
use crate::render;
use crate::runs::store;
use crate::state::AppState;

/// Why a run failed, classified so the user-facing message can distinguish
/// "fix your input" from "try again later" from "contact support".
#[derive(Debug, Error)]
pub enum RunFailure {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Transient(String),

    #[error("Step '{0}' timed out")]
    Timeout(&'static str),

    #[error("Validation did not pass after {attempts} attempts ({failing})")]
    ValidationExhausted { attempts: u32, failing: String },

    #[error("{0}")]
    Internal(String),
}

impl RunFailure {
    /// The human-readable error stored on the run record.
    pub fn user_message(&self) -> String {
        match self {
            RunFailure::Input(msg) => msg.clone(),
            RunFailure::Transient(msg) => {
                format!("A temporary error occurred ({msg}). Try again in a few minutes.")
            }
            RunFailure::Timeout(step) => format!(
                "The run timed out while {step}. Try again in a few minutes."
            ),
            RunFailure::ValidationExhausted { attempts, failing } => format!(
                "The draft did not pass validation after {attempts} attempts \
                 (still failing: {failing}). Try a different source document or job posting."
            ),
            RunFailure::Internal(_) => {
                "An internal error occurred. Contact support if this persists.".to_string()
            }
        }
    }
}

impl From<JobInputError> for RunFailure {
    fn from(e: JobInputError) -> Self {
        match e {
            JobInputError::Unreachable(_) | JobInputError::Blocked => {
                RunFailure::Input(e.to_string())
            }
            // LLM errors at the parse step have already been retried by the
            // client; what's left is transient capacity or parse trouble.
            JobInputError::Parse(inner) => RunFailure::Transient(inner.to_string()),
        }
    }
}

impl From<AppError> for RunFailure {
    fn from(e: AppError) -> Self {
        match e {
            AppError::Llm(msg) => RunFailure::Transient(msg),
            other => RunFailure::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for RunFailure {
    fn from(e: sqlx::Error) -> Self {
        RunFailure::Internal(format!("database error: {e}"))
    }
}

impl From<anyhow::Error> for RunFailure {
    fn from(e: anyhow::Error) -> Self {
        RunFailure::Internal(e.to_string())
    }
}

/// Entry point: spawned by the start handler, runs to a terminal state.
/// Never returns an error — every failure path lands in `runs.error`.
pub async fn execute_run(state: AppState, run: RunRow, source_text: String, max_iterations: u32) {
    let run_id = run.id;
    let deadline = Duration::from_secs(state.config.runs.run_deadline_secs);

    let outcome = tokio::time::timeout(deadline, drive(&state, &run, &source_text, max_iterations))
        .await
        .unwrap_or(Err(RunFailure::Timeout("running the optimization")));

    if let Err(failure) = outcome {
        warn!("Run {run_id} failed: {failure}");
        if let Err(e) = store::mark_failed(&state.db, run_id, &failure.user_message()).await {
            error!("Run {run_id}: could not record failure: {e}");
        }
    }
}

/// One pass through the state machine. Ok(()) means the run reached
/// `complete` and the debit was issued.
async fn drive(
    state: &AppState,
    run: &RunRow,
    source_text: &str,
    max_iterations: u32,
) -> Result<(), RunFailure> {
    let pool = &state.db;
    let run_id = run.id;
    let step_timeout = Duration::from_secs(state.config.runs.step_timeout_secs);

    // ── parsing ──────────────────────────────────────────────────────────
    store::set_step(
        pool,
        run_id,
        RunStatus::Parsing,
        Some("Fetching and parsing the job posting..."),
    )
    .await?;

    let job_text = match run.job_url() {
        Some(url) => {
            info!("Run {run_id}: fetching job posting from {url}");
            bounded(step_timeout, "fetching the job posting", job_parser::fetch_job_posting(&state.http, url)).await??
        }
        None => run.job_input.clone(),
    };

    let job = bounded(step_timeout, "parsing the job posting", job_parser::parse_job(&state.llm, &job_text)).await??;
    info!("Run {run_id}: job parsed — {} at {}", job.title, job.company);

    let job_snapshot = serde_json::to_value(&job)
        .map_err(|e| RunFailure::Internal(format!("job snapshot serialization: {e}")))?;
    store::store_job_parsed(pool, run_id, &job_snapshot).await?;

    // ── generate → validate → refine ─────────────────────────────────────
    let mut prior_feedback: Option<String> = None;

    for iteration in 1..=max_iterations {
        store::set_step(
            pool,
            run_id,
            RunStatus::Generating,
            Some(&format!("Optimizing resume for {} at {}...", job.title, job.company)),
        )
        .await?;

        let draft = bounded(
            step_timeout,
            "generating the draft",
            optimizer::generate_draft(&state.llm, source_text, &job, prior_feedback.as_deref()),
        )
        .await??;

        store::set_step(
            pool,
            run_id,
            RunStatus::Validating,
            Some(&format!("Validating draft (iteration {iteration})...")),
        )
        .await?;

        let ctx = ValidationContext {
            source_text,
            job: &job,
        };
        let outcome = bounded(step_timeout, "validating the draft", state.pipeline.run(&draft, &ctx)).await??;

        store::record_iteration(pool, run_id, iteration as i32, &outcome).await?;

        if outcome.passed {
            info!("Run {run_id}: validation passed on iteration {iteration}");
            return finalize(state, run, &draft.content, &job, step_timeout).await;
        }

        if iteration == max_iterations {
            return Err(RunFailure::ValidationExhausted {
                attempts: max_iterations,
                failing: outcome.failing_names().join(", "),
            });
        }

        info!(
            "Run {run_id}: iteration {iteration} failed ({}), refining",
            outcome.failing_names().join(", ")
        );
        store::set_step(
            pool,
            run_id,
            RunStatus::Refining,
            Some(&format!("Iteration {iteration}: refining draft...")),
        )
        .await?;
        prior_feedback = Some(outcome.feedback_text());
    }

    // max_iterations >= 1 is enforced at the handler; the loop always returns.
    Err(RunFailure::Internal("iteration loop exited without a verdict".to_string()))
}

/// Renders the artifact, marks the run complete, then debits — in that
/// order. The debit marker on the run row makes a replayed completion safe.
async fn finalize(
    state: &AppState,
    run: &RunRow,
    content: &str,
    job: &crate::agents::job_parser::ParsedJob,
    step_timeout: Duration,
) -> Result<(), RunFailure> {
    let pool = &state.db;
    let run_id = run.id;

    store::set_step(
        pool,
        run_id,
        RunStatus::Validating,
        Some("Rendering the final document..."),
    )
    .await?;

    let html = render::render_html(content, job);
    let artifact_path = bounded(
        step_timeout,
        "storing the final document",
        render::store_artifact(&state.s3, &state.config.s3_bucket, run.account_id, run_id, &html),
    )
    .await??;

    store::mark_complete(pool, run_id, &html, &artifact_path).await?;
    info!("Run {run_id}: complete, artifact at {artifact_path}");

    // Debit exactly once, after completion. A failed run never reaches here.
    let account = ledger::get_account(pool, run.account_id)
        .await?
        .ok_or_else(|| RunFailure::Internal(format!("account {} vanished", run.account_id)))?;
    ledger::debit_for_run(pool, run_id, &account, &state.config.quota).await?;

    Ok(())
}

/// Wraps an external call in the per-step timeout.
async fn bounded<T>(
    limit: Duration,
    step: &'static str,
    fut: impl std::future::Future<Output = T>,
) -> Result<T, RunFailure> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RunFailure::Timeout(step))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_failures_tell_the_user_to_fix_input() {
        let failure: RunFailure =
            JobInputError::Blocked.into();
        let msg = failure.user_message();
        assert!(msg.contains("Paste the job text"));
    }

    #[test]
    fn test_transient_failures_tell_the_user_to_retry() {
        let failure = RunFailure::Transient("LLM overloaded".to_string());
        assert!(failure.user_message().contains("Try again"));
    }

    #[test]
    fn test_timeout_names_the_step() {
        let failure = RunFailure::Timeout("validating the draft");
        assert!(failure.user_message().contains("validating the draft"));
    }

    #[test]
    fn test_validation_exhausted_names_failing_validators_and_attempts() {
        let failure = RunFailure::ValidationExhausted {
            attempts: 5,
            failing: "KeywordCoverage, ContentIntegrity".to_string(),
        };
        let msg = failure.user_message();
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("KeywordCoverage"));
    }

    #[test]
    fn test_internal_failures_hide_detail_and_point_to_support() {
        let failure = RunFailure::Internal("database error: pool exhausted".to_string());
        let msg = failure.user_message();
        assert!(msg.contains("Contact support"));
        assert!(!msg.contains("pool exhausted"));
    }

    #[test]
    fn test_llm_app_errors_classify_as_transient() {
        let failure: RunFailure = AppError::Llm("rate limited".to_string()).into();
        assert!(matches!(failure, RunFailure::Transient(_)));
    }

    #[tokio::test]
    async fn test_bounded_returns_timeout_failure() {
        let result = bounded(Duration::from_millis(5), "sleeping", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            1
        })
        .await;
        assert!(matches!(result, Err(RunFailure::Timeout("sleeping"))));
    }

    #[tokio::test]
    async fn test_bounded_passes_fast_values_through() {
        let result = bounded(Duration::from_secs(1), "quick", async { 7 }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
