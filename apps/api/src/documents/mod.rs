//! Source documents (CVs): upload with text extraction, listing, retrieval,
//! deletion. The optimization loop only ever sees `content_text`; the
//! original file is kept in S3 for the user's benefit.

pub mod handlers;
pub mod ingest;

use sqlx::PgPool;
use uuid::Uuid;

use crate::models::document::DocumentRow;

pub async fn create_document(
    pool: &PgPool,
    account_id: Uuid,
    name: &str,
    original_filename: &str,
    file_path: Option<&str>,
    content_text: &str,
) -> Result<DocumentRow, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        r#"
        INSERT INTO documents (id, account_id, name, original_filename, file_path, content_text)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(name)
    .bind(original_filename)
    .bind(file_path)
    .bind(content_text)
    .fetch_one(pool)
    .await
}

/// Ownership-checked fetch — another account's document reads as not-found.
pub async fn get_document(
    pool: &PgPool,
    document_id: Uuid,
    account_id: Uuid,
) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM documents WHERE id = $1 AND account_id = $2",
    )
    .bind(document_id)
    .bind(account_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_documents(
    pool: &PgPool,
    account_id: Uuid,
) -> Result<Vec<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM documents WHERE account_id = $1 ORDER BY created_at DESC",
    )
    .bind(account_id)
    .fetch_all(pool)
    .await
}

pub async fn delete_document(
    pool: &PgPool,
    document_id: Uuid,
    account_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM documents WHERE id = $1 AND account_id = $2")
        .bind(document_id)
        .bind(account_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() == 1)
}
