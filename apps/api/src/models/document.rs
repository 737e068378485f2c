use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An uploaded source document (CV). `content_text` is the extracted plain
/// text the optimization loop works from; the original file lives in S3 at
/// `file_path`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub account_id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub file_path: Option<String>,
    pub content_text: String,
    pub created_at: DateTime<Utc>,
}
