//! Upload ingestion: turn an uploaded file into the plain text the
//! optimization loop consumes. PDFs go through `pdf-extract`; anything else
//! is treated as UTF-8 text.

use std::io::Write;

use bytes::Bytes;
use tracing::warn;

use crate::errors::AppError;

/// Extracts text content from an uploaded file.
///
/// PDF extraction is CPU-bound and the underlying crate wants a path, so the
/// bytes go through a temp file on a blocking thread.
pub async fn extract_text(filename: &str, data: Bytes) -> Result<String, AppError> {
    if !is_pdf(filename, &data) {
        let text = String::from_utf8_lossy(&data).into_owned();
        return ensure_nonempty(text);
    }

    let extracted = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&data)?;
        file.flush()?;
        let text = pdf_extract::extract_text(file.path())
            .map_err(|e| anyhow::anyhow!("pdf extraction: {e}"))?;
        Ok(text)
    })
    .await
    .map_err(|e| AppError::Internal(anyhow::anyhow!("extraction task panicked: {e}")))?
    .map_err(|e| {
        warn!("PDF extraction failed: {e}");
        AppError::UnprocessableEntity(
            "Could not extract text from the PDF. Upload a text-based PDF or paste plain text."
                .to_string(),
        )
    })?;

    ensure_nonempty(extracted)
}

fn ensure_nonempty(text: String) -> Result<String, AppError> {
    if text.trim().is_empty() {
        return Err(AppError::UnprocessableEntity(
            "The uploaded document contains no extractable text".to_string(),
        ));
    }
    Ok(text)
}

/// PDFs are detected by extension or magic bytes — browsers lie about
/// content types often enough that we don't bother asking.
fn is_pdf(filename: &str, data: &[u8]) -> bool {
    filename.to_lowercase().ends_with(".pdf") || data.starts_with(b"%PDF")
}
