//! Per-IP rate limiting for the HTTP surface.
//!
//! Two tiers:
//! - Webhook: `POST /api/webhooks/psp`, hit by the PSP core on every event
//! - Ops: inbox and invoice routes used by operators
//!
//! Configure via `RATE_LIMIT_WEBHOOK_RPM` (default 120) and
//! `RATE_LIMIT_OPS_RPM` (default 60). Zero turns a tier off.

use std::sync::Arc;
use std::time::Duration;

use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

/// Rate limiter layer type alias using governor types directly
pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// One token every `60s / rpm`, with a burst of a full minute's allowance.
/// `None` when `requests_per_minute` is zero.
fn create_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let period_ms = (60_000 / u64::from(requests_per_minute)).max(1);
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_millis(period_ms))
        .burst_size(requests_per_minute)
        .finish();

    match config {
        Some(config) => Some(GovernorLayer::new(Arc::new(config))),
        None => {
            tracing::warn!(
                "Rate limiter config rejected for {} rpm, limiter disabled",
                requests_per_minute
            );
            None
        }
    }
}

/// Limiter for the inbound webhook endpoint.
pub fn webhook_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    create_layer(requests_per_minute)
}

/// Limiter for operator-facing inbox and invoice routes.
pub fn ops_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    create_layer(requests_per_minute)
}
