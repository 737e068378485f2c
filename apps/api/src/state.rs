use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::pipeline::ValidationPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub s3: S3Client,
    pub llm: LlmClient,
    /// Plain HTTP client for fetching job postings from URLs.
    pub http: reqwest::Client,
    pub config: Config,
    /// Ordered validator set shared by every run.
    pub pipeline: Arc<ValidationPipeline>,
}
