//! Payment webhook endpoint. Authenticity first, parse second, apply third —
//! nothing unverified ever reaches the reconciler.

use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::billing::events::{verify_signature, ProcessorEvent};
use crate::billing::reconciler::{apply_event, Applied};
use crate::errors::AppError;
use crate::state::AppState;

/// POST /api/v1/webhooks/stripe
///
/// 2xx acknowledges the event (including duplicates and ignored soft
/// signals); any error status tells the processor to retry. Ledger state is
/// never partially applied — the reconciler commits marker and mutation
/// together or not at all.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::WebhookRejected("missing Stripe-Signature header".to_string()))?;

    verify_signature(
        &state.config.stripe_webhook_secret,
        signature,
        &body,
        chrono::Utc::now(),
    )
    .map_err(AppError::WebhookRejected)?;

    let event: ProcessorEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::WebhookRejected(format!("unparseable event: {e}")))?;

    info!("Received payment event {} ({})", event.id, event.kind);

    let applied = apply_event(&state.db, &state.config.quota, &event).await?;
    let status = match applied {
        Applied::Applied => "applied",
        Applied::Duplicate => "duplicate",
        Applied::Ignored => "ignored",
    };

    Ok(Json(json!({ "status": status })))
}
