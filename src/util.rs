//! Shared utility functions.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

/// Alternate header for the inbox token, for clients that cannot set `Authorization`.
pub const INBOX_TOKEN_HEADER: &str = "x-inbox-token";

/// Parses a fiat amount typed by a human or sent by the PSP core.
///
/// Accepts a comma as decimal separator ("12,50"). Returns `None` for
/// anything that is not a finite number.
pub fn parse_amount(s: &str) -> Option<f64> {
    let normalized = s.trim().replace(',', ".");
    if normalized.is_empty() {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

/// Bearer token first, then `x-inbox-token`.
pub fn extract_inbox_token(headers: &HeaderMap) -> Option<&str> {
    extract_bearer_token(headers).or_else(|| {
        headers
            .get(INBOX_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    })
}

/// Constant-time string equality for secrets.
pub fn secrets_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        return false;
    }
    provided.ct_eq(expected).into()
}
