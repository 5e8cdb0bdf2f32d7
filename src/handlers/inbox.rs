//! Ops viewer for the webhook inbox.
//!
//! Every route here requires the inbox token (bearer or `x-inbox-token`).
//! When no token is configured the viewer is open in dev mode and closed
//! everywhere else.

use axum::{Json, extract::State, http::HeaderMap};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, msg};
use crate::extractors::{Path, Query};
use crate::id::is_valid_prefixed_id;
use crate::models::{WebhookEnvelope, WebhookSummary};
use crate::state::AppState;
use crate::util::{extract_inbox_token, secrets_match};

pub const DEFAULT_LIST_LIMIT: usize = 50;

fn require_inbox_access(state: &AppState, headers: &HeaderMap) -> Result<()> {
    match state.inbox_read_token.as_deref() {
        Some(expected) => match extract_inbox_token(headers) {
            Some(provided) if secrets_match(provided, expected) => Ok(()),
            _ => Err(AppError::Unauthorized(msg::INBOX_TOKEN_REQUIRED)),
        },
        None if state.dev_mode => Ok(()),
        None => Err(AppError::Unauthorized(msg::INBOX_TOKEN_REQUIRED)),
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct InboxQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct InboxListResponse {
    pub ok: bool,
    pub count: usize,
    pub items: Vec<WebhookSummary>,
}

#[derive(Debug, Serialize)]
pub struct InboxItemResponse {
    pub ok: bool,
    pub item: WebhookEnvelope,
}

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

/// `GET /api/webhooks/inbox?limit=`
pub async fn list_inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<InboxQuery>,
) -> Result<Json<InboxListResponse>> {
    require_inbox_access(&state, &headers)?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, state.inbox.capacity());
    let items: Vec<WebhookSummary> = state
        .inbox
        .list(limit)
        .await
        .iter()
        .map(WebhookEnvelope::summary)
        .collect();

    Ok(Json(InboxListResponse {
        ok: true,
        count: items.len(),
        items,
    }))
}

/// `GET /api/webhooks/inbox/{id}`
pub async fn get_inbox_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<InboxItemResponse>> {
    require_inbox_access(&state, &headers)?;

    if !is_valid_prefixed_id(&id) {
        return Err(AppError::NotFound(format!("webhook {}", id)));
    }

    let item = state
        .inbox
        .get_by_id(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("webhook {}", id)))?;

    Ok(Json(InboxItemResponse { ok: true, item }))
}

/// `DELETE /api/webhooks/inbox`
pub async fn clear_inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OkResponse>> {
    require_inbox_access(&state, &headers)?;

    state.inbox.clear().await;
    tracing::info!("Inbox cleared");

    Ok(Json(OkResponse { ok: true }))
}
