//! Run record persistence. Every status write is guarded with
//! `status NOT IN ('complete', 'failed')` so terminal states are absorbing at
//! the storage layer — a late writer cannot resurrect a finished run.

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::run::{FeedbackRow, RunRow, RunStatus};
use crate::pipeline::IterationOutcome;

pub async fn create_run(
    pool: &PgPool,
    account_id: Uuid,
    document_id: Uuid,
    job_input: &str,
) -> Result<RunRow, sqlx::Error> {
    sqlx::query_as::<_, RunRow>(
        r#"
        INSERT INTO runs (id, account_id, document_id, job_input, status)
        VALUES ($1, $2, $3, $4, 'pending')
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(document_id)
    .bind(job_input)
    .fetch_one(pool)
    .await
}

/// Advances status and the human-readable step label. No-op once terminal.
pub async fn set_step(
    pool: &PgPool,
    run_id: Uuid,
    status: RunStatus,
    step: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE runs SET status = $2, current_step = $3, updated_at = now()
        WHERE id = $1 AND status NOT IN ('complete', 'failed')
        "#,
    )
    .bind(run_id)
    .bind(status.as_str())
    .bind(step)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn store_job_parsed(
    pool: &PgPool,
    run_id: Uuid,
    job_parsed: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE runs SET job_parsed = $2, updated_at = now()
        WHERE id = $1 AND status NOT IN ('complete', 'failed')
        "#,
    )
    .bind(run_id)
    .bind(job_parsed)
    .execute(pool)
    .await?;
    Ok(())
}

/// Appends one iteration's validator results and bumps the run's iteration
/// counter. The feedback row is insert-only — written once, never updated.
pub async fn record_iteration(
    pool: &PgPool,
    run_id: Uuid,
    iteration: i32,
    outcome: &IterationOutcome,
) -> Result<()> {
    let results = serde_json::to_value(&outcome.results)?;

    sqlx::query(
        "INSERT INTO run_feedback (run_id, iteration, passed, results) VALUES ($1, $2, $3, $4)",
    )
    .bind(run_id)
    .bind(iteration)
    .bind(outcome.passed)
    .bind(results)
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        UPDATE runs SET iterations = $2, updated_at = now()
        WHERE id = $1 AND status NOT IN ('complete', 'failed')
        "#,
    )
    .bind(run_id)
    .bind(iteration)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_complete(
    pool: &PgPool,
    run_id: Uuid,
    result_html: &str,
    artifact_path: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE runs
        SET status = 'complete', current_step = NULL, result_html = $2,
            artifact_path = $3, updated_at = now()
        WHERE id = $1 AND status NOT IN ('complete', 'failed')
        "#,
    )
    .bind(run_id)
    .bind(result_html)
    .bind(artifact_path)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_failed(pool: &PgPool, run_id: Uuid, error: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE runs SET status = 'failed', current_step = NULL, error = $2, updated_at = now()
        WHERE id = $1 AND status NOT IN ('complete', 'failed')
        "#,
    )
    .bind(run_id)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

/// Startup sweep: runs left non-terminal by a dead process can never advance
/// (their driving task died with it), so fail them loudly instead of letting
/// clients poll a stuck status forever. Any already-recorded debit stays
/// recorded — the marker on the run row is what makes replays safe.
pub async fn fail_orphaned_runs(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE runs
        SET status = 'failed', current_step = NULL,
            error = 'The service restarted while this run was in progress. Start a new run.',
            updated_at = now()
        WHERE status NOT IN ('complete', 'failed')
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Fetches a run with an ownership check — a run id from another account
/// reads as not-found, never as forbidden.
pub async fn get_run(
    pool: &PgPool,
    run_id: Uuid,
    account_id: Uuid,
) -> Result<Option<RunRow>, sqlx::Error> {
    sqlx::query_as::<_, RunRow>("SELECT * FROM runs WHERE id = $1 AND account_id = $2")
        .bind(run_id)
        .bind(account_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_runs(pool: &PgPool, account_id: Uuid) -> Result<Vec<RunRow>, sqlx::Error> {
    sqlx::query_as::<_, RunRow>(
        "SELECT * FROM runs WHERE account_id = $1 ORDER BY created_at DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

/// Feedback log in iteration order — the append-only history the reporter
/// returns verbatim.
pub async fn get_feedback(pool: &PgPool, run_id: Uuid) -> Result<Vec<FeedbackRow>, sqlx::Error> {
    sqlx::query_as::<_, FeedbackRow>(
        "SELECT * FROM run_feedback WHERE run_id = $1 ORDER BY iteration ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
}
