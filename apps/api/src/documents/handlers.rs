use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents::{self, ingest};
use crate::errors::AppError;
use crate::models::document::DocumentRow;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AccountIdQuery {
    pub account_id: Uuid,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub content_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DocumentResponse {
    fn from_row(row: DocumentRow, include_text: bool) -> Self {
        DocumentResponse {
            id: row.id,
            name: row.name,
            original_filename: row.original_filename,
            content_text: include_text.then_some(row.content_text),
            created_at: row.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
}

/// POST /api/v1/documents — multipart upload.
///
/// Fields: `account_id` (text), `file` (the document), optional `name`.
/// PDF or plain text; the extracted text is what runs optimize against.
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>, AppError> {
    let mut account_id: Option<Uuid> = None;
    let mut name: Option<String> = None;
    let mut file: Option<(String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "account_id" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("bad account_id field: {e}")))?;
                account_id = Some(
                    value
                        .parse()
                        .map_err(|_| AppError::Validation("account_id must be a UUID".to_string()))?,
                );
            }
            "name" => {
                name = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| AppError::Validation(format!("bad name field: {e}")))?,
                );
            }
            "file" => {
                let filename = field.file_name().unwrap_or("document.txt").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("bad file field: {e}")))?;
                file = Some((filename, data));
            }
            other => {
                warn!("Ignoring unknown multipart field '{other}'");
            }
        }
    }

    let account_id =
        account_id.ok_or_else(|| AppError::Validation("account_id field is required".to_string()))?;
    let (filename, data) =
        file.ok_or_else(|| AppError::Validation("file field is required".to_string()))?;
    if data.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }

    let content_text = ingest::extract_text(&filename, data.clone()).await?;
    let name = name.unwrap_or_else(|| filename.clone());

    // Keep the original bytes around for the user; extraction text drives
    // everything else. Upload failure is not fatal to the ingest.
    let ext = filename.rsplit('.').next().unwrap_or("txt").to_lowercase();
    let file_path = format!("documents/{account_id}/{}.{ext}", Uuid::new_v4());
    let stored_path = match state
        .s3
        .put_object()
        .bucket(&state.config.s3_bucket)
        .key(&file_path)
        .body(ByteStream::from(data.to_vec()))
        .send()
        .await
    {
        Ok(_) => Some(file_path.as_str()),
        Err(e) => {
            warn!("Original file upload failed, keeping text only: {e}");
            None
        }
    };

    let row = documents::create_document(
        &state.db,
        account_id,
        &name,
        &filename,
        stored_path,
        &content_text,
    )
    .await?;

    info!("Document {} uploaded for account {account_id}", row.id);
    Ok(Json(DocumentResponse::from_row(row, true)))
}

/// GET /api/v1/documents
pub async fn handle_list(
    State(state): State<AppState>,
    Query(params): Query<AccountIdQuery>,
) -> Result<Json<DocumentListResponse>, AppError> {
    let rows = documents::list_documents(&state.db, params.account_id).await?;
    Ok(Json(DocumentListResponse {
        documents: rows
            .into_iter()
            .map(|row| DocumentResponse::from_row(row, false))
            .collect(),
    }))
}

/// GET /api/v1/documents/:id
pub async fn handle_get(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(params): Query<AccountIdQuery>,
) -> Result<Json<DocumentResponse>, AppError> {
    let row = documents::get_document(&state.db, document_id, params.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;
    Ok(Json(DocumentResponse::from_row(row, true)))
}

/// DELETE /api/v1/documents/:id
pub async fn handle_delete(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    Query(params): Query<AccountIdQuery>,
) -> Result<StatusCode, AppError> {
    let row = documents::get_document(&state.db, document_id, params.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Document not found".to_string()))?;

    // Runs keep their document as immutable history; refuse rather than
    // cascade.
    let in_use: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM runs WHERE document_id = $1")
        .bind(document_id)
        .fetch_one(&state.db)
        .await?;
    if in_use > 0 {
        return Err(AppError::Validation(
            "Document is referenced by existing optimization runs".to_string(),
        ));
    }

    documents::delete_document(&state.db, document_id, params.account_id).await?;

    // Storage cleanup is best-effort; the row is the source of truth.
    if let Some(file_path) = row.file_path {
        if let Err(e) = state
            .s3
            .delete_object()
            .bucket(&state.config.s3_bucket)
            .key(&file_path)
            .send()
            .await
        {
            warn!("Failed to delete stored file {file_path}: {e}");
        }
    }

    Ok(StatusCode::NO_CONTENT)
}
