pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::billing;
use crate::documents;
use crate::runs;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Source documents
        .route("/api/v1/documents", post(documents::handlers::handle_upload))
        .route("/api/v1/documents", get(documents::handlers::handle_list))
        .route("/api/v1/documents/:id", get(documents::handlers::handle_get))
        .route(
            "/api/v1/documents/:id",
            delete(documents::handlers::handle_delete),
        )
        // Optimization runs: start + poll
        .route("/api/v1/optimize", post(runs::handlers::handle_start))
        .route("/api/v1/optimize", get(runs::handlers::handle_list))
        .route("/api/v1/optimize/:id", get(runs::handlers::handle_status))
        .route(
            "/api/v1/optimize/:id/artifact",
            get(runs::handlers::handle_artifact),
        )
        // Quota / subscription surface
        .route(
            "/api/v1/subscription",
            get(billing::handlers::handle_subscription_status),
        )
        .route(
            "/api/v1/webhooks/stripe",
            post(billing::webhook::handle_stripe_webhook),
        )
        .with_state(state)
}
