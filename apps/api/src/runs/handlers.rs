use axum::{
    extract::{Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::documents;
use crate::errors::AppError;
use crate::ledger;
use crate::models::run::RunStatus;
use crate::runs::orchestrator::execute_run;
use crate::runs::status::{status_response, summary, RunStatusResponse, RunSummary};
use crate::runs::store;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AccountIdQuery {
    pub account_id: Uuid,
}

#[derive(Deserialize)]
pub struct StartRequest {
    pub account_id: Uuid,
    pub document_id: Uuid,
    /// Job posting URL or raw posting text.
    pub job_input: String,
    pub max_iterations: Option<u32>,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub run_id: Uuid,
    pub status: String,
}

#[derive(Serialize)]
pub struct RunListResponse {
    pub runs: Vec<RunSummary>,
}

/// POST /api/v1/optimize
///
/// Admission, run-record creation, and task spawn — then return immediately.
/// The caller never waits on a generation step; progress arrives via polling.
/// The quota debit happens when (and only when) the run completes.
pub async fn handle_start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    if req.job_input.trim().is_empty() {
        return Err(AppError::Validation("job_input must not be empty".to_string()));
    }

    let account = ledger::get_account(&state.db, req.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    let decision = ledger::check_access(&account, &state.config.quota, chrono::Utc::now());
    if !decision.allowed {
        return Err(AppError::PaymentRequired(decision));
    }

    let document = documents::get_document(&state.db, req.document_id, req.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;
    if document.content_text.trim().is_empty() {
        return Err(AppError::Validation(
            "Document has no extracted text content".to_string(),
        ));
    }

    let max_iterations = req
        .max_iterations
        .unwrap_or(state.config.runs.default_max_iterations)
        .clamp(1, 10);

    let run = store::create_run(&state.db, req.account_id, req.document_id, &req.job_input).await?;
    info!("Run {} created for account {}", run.id, req.account_id);

    let response = StartResponse {
        run_id: run.id,
        status: run.status.clone(),
    };

    tokio::spawn(execute_run(
        state,
        run,
        document.content_text,
        max_iterations,
    ));

    Ok(Json(response))
}

/// GET /api/v1/optimize
pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<AccountIdQuery>,
) -> Result<Json<RunListResponse>, AppError> {
    let runs = store::list_runs(&state.db, params.account_id).await?;
    Ok(Json(RunListResponse {
        runs: runs.iter().map(summary).collect(),
    }))
}

/// GET /api/v1/optimize/:id — the polling endpoint. Read-only.
pub async fn handle_status(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(params): Query<AccountIdQuery>,
) -> Result<Json<RunStatusResponse>, AppError> {
    let run = store::get_run(&state.db, run_id, params.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Run not found".to_string()))?;
    let feedback = store::get_feedback(&state.db, run_id).await?;
    Ok(Json(status_response(run, feedback)))
}

/// GET /api/v1/optimize/:id/artifact — the rendered document of a completed run.
pub async fn handle_artifact(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(params): Query<AccountIdQuery>,
) -> Result<Response, AppError> {
    let run = store::get_run(&state.db, run_id, params.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Run not found".to_string()))?;

    if run.status() != RunStatus::Complete {
        return Err(AppError::Validation("Run is not complete".to_string()));
    }
    let artifact_path = run
        .artifact_path
        .ok_or_else(|| AppError::NotFound("No artifact available".to_string()))?;

    let bytes =
        crate::render::fetch_artifact(&state.s3, &state.config.s3_bucket, &artifact_path).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"resume_{run_id}.html\""),
        )
        .body(bytes.into())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("response build failed: {e}")))
}
