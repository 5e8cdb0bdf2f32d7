pub mod inbox;
pub mod invoices;
pub mod webhooks;

pub use inbox::{clear_inbox, get_inbox_item, list_inbox};
pub use invoices::{get_invoice, list_invoices};
pub use webhooks::receive_psp_webhook;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::rate_limit;
use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Full HTTP surface. Webhook intake and the operator routes are limited
/// separately; `/health` is never limited.
pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    let mut intake = Router::new().route("/api/webhooks/psp", post(receive_psp_webhook));
    if let Some(layer) = rate_limit::webhook_layer(rate_limit.webhook_rpm) {
        intake = intake.layer(layer);
    }

    let mut ops = Router::new()
        .route("/api/webhooks/inbox", get(list_inbox).delete(clear_inbox))
        .route("/api/webhooks/inbox/{id}", get(get_inbox_item))
        .route("/api/invoices", get(list_invoices))
        .route("/api/invoices/{id}", get(get_invoice));
    if let Some(layer) = rate_limit::ops_layer(rate_limit.ops_rpm) {
        ops = ops.layer(layer);
    }

    Router::new()
        .route("/health", get(health))
        .merge(intake)
        .merge(ops)
}
