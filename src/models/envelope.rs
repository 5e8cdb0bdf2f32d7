use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityType;

/// Maximum characters of body shown in inbox listings.
pub const PREVIEW_CHARS: usize = 220;

/// A verified inbound webhook, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEnvelope {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub content_type: Option<String>,
    pub raw_body: String,
}

impl WebhookEnvelope {
    /// Wraps a freshly received body with a new id.
    pub fn new(content_type: Option<String>, raw_body: String, received_at: DateTime<Utc>) -> Self {
        Self {
            id: EntityType::WebhookEvent.gen_id(),
            received_at,
            content_type,
            raw_body,
        }
    }

    /// Listing form: id, unix-millis timestamp, content type and a short preview.
    pub fn summary(&self) -> WebhookSummary {
        WebhookSummary {
            id: self.id.clone(),
            ts: self.received_at.timestamp_millis(),
            content_type: self.content_type.clone(),
            preview: self.raw_body.chars().take(PREVIEW_CHARS).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSummary {
    pub id: String,
    pub ts: i64,
    pub content_type: Option<String>,
    pub preview: String,
}
