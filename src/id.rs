//! Prefixed ID generation for locally created records.
//!
//! Invoice ids come from the PSP core and are opaque here; the only ids this
//! service mints are for captured webhook envelopes.
//!
//! Format: `{prefix}_{uuid_simple}` (32 hex chars, no hyphens)

use uuid::Uuid;

/// All known entity prefixes for validation.
const ALL_PREFIXES: &[&str] = &["wh_"];

/// Validate that a string is a well-formed locally minted ID.
///
/// Cheap check to reject garbage before hitting the inbox backend.
pub fn is_valid_prefixed_id(s: &str) -> bool {
    let Some(prefix) = ALL_PREFIXES.iter().find(|p| s.starts_with(*p)) else {
        return false;
    };

    let hex_part = &s[prefix.len()..];
    hex_part.len() == 32 && hex_part.chars().all(|c| c.is_ascii_hexdigit())
}

/// Entity types that have prefixed IDs.
#[derive(Debug, Clone, Copy)]
pub enum EntityType {
    WebhookEvent,
}

impl EntityType {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::WebhookEvent => "wh",
        }
    }

    /// Generates a new prefixed ID for this entity type.
    pub fn gen_id(&self) -> String {
        format!("{}_{}", self.prefix(), Uuid::new_v4().as_simple())
    }
}
