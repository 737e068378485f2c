use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::ledger;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AccountIdQuery {
    pub account_id: Uuid,
}

/// The AccessDecision-shaped quota summary for the caller's account.
#[derive(Serialize)]
pub struct SubscriptionStatusResponse {
    pub tier: String,
    pub remaining_requests: Option<i64>,
    pub is_unlimited: bool,
    pub is_trial: bool,
    pub can_subscribe: bool,
    pub can_buy_addon: bool,
    pub renewal_date: Option<DateTime<Utc>>,
}

/// GET /api/v1/subscription
pub async fn handle_subscription_status(
    State(state): State<AppState>,
    Query(params): Query<AccountIdQuery>,
) -> Result<Json<SubscriptionStatusResponse>, AppError> {
    let account = ledger::get_account(&state.db, params.account_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Account not found".to_string()))?;

    let decision = ledger::check_access(&account, &state.config.quota, Utc::now());

    Ok(Json(SubscriptionStatusResponse {
        tier: account.tier,
        remaining_requests: decision.remaining,
        is_unlimited: decision.unlimited,
        is_trial: decision.is_trial,
        can_subscribe: decision.can_subscribe,
        can_buy_addon: decision.can_buy_addon,
        renewal_date: decision.renewal_date,
    }))
}
