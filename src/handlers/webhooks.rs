use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::CONTENT_TYPE},
};
use chrono::Utc;
use serde::Serialize;

use crate::error::{AppError, Result, msg};
use crate::inbox::Backend;
use crate::models::WebhookEnvelope;
use crate::signature::{self, SIGNATURE_HEADER};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct WebhookAccepted {
    pub ok: bool,
    pub id: String,
    pub backend: Backend,
}

/// `POST /api/webhooks/psp`
///
/// Verifies the `psp-signature` header over the raw body, then stores the
/// event in the inbox. Unverified bodies are never stored.
pub async fn receive_psp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAccepted>> {
    let secret = state
        .webhook_secret
        .as_deref()
        .ok_or(AppError::Misconfigured(msg::SECRET_NOT_CONFIGURED))?;

    let header_value = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            tracing::warn!("Webhook rejected: missing {} header", SIGNATURE_HEADER);
            AppError::Unauthorized(msg::MISSING_SIGNATURE)
        })?;

    // The signature covers the body as text, so a body that is not UTF-8
    // cannot carry a valid one.
    let Ok(raw_body) = String::from_utf8(body.to_vec()) else {
        tracing::warn!("Webhook rejected: body is not UTF-8");
        return Err(AppError::Unauthorized(msg::INVALID_SIGNATURE));
    };

    let verified = match state.webhook_tolerance_secs {
        Some(tolerance) => signature::verify_with_tolerance(
            &raw_body,
            header_value,
            secret,
            Utc::now().timestamp(),
            tolerance,
        ),
        None => signature::verify(&raw_body, header_value, secret),
    };
    if !verified {
        tracing::warn!("Webhook rejected: invalid signature");
        return Err(AppError::Unauthorized(msg::INVALID_SIGNATURE));
    }

    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let envelope = WebhookEnvelope::new(content_type, raw_body, Utc::now());
    let backend = state.inbox.append(&envelope).await;

    tracing::info!(
        "Webhook accepted: id={} backend={} bytes={}",
        envelope.id,
        backend.as_ref(),
        envelope.raw_body.len()
    );

    Ok(Json(WebhookAccepted {
        ok: true,
        id: envelope.id,
        backend,
    }))
}
