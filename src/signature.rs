//! `psp-signature` header verification.
//!
//! Header format: `t=<unix seconds>,v1=<hex hmac>`. The signed payload is
//! `"<t>.<raw body>"`, HMAC-SHA256 keyed by the shared webhook secret.
//!
//! No freshness window is applied by [`verify`]: any well-formed `t` is
//! accepted regardless of age, so a captured request can be replayed.
//! [`verify_with_tolerance`] exists for deployments that opt into a window.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Header name providers send the signature in.
pub const SIGNATURE_HEADER: &str = "psp-signature";

/// Hex length of an HMAC-SHA256 digest.
const SIGNATURE_HEX_LEN: usize = 64;

/// Parsed `psp-signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// `t` exactly as sent; this is what the provider signed.
    pub timestamp_text: String,
    /// Always lowercase.
    pub signature_hex: String,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, SignatureError> {
        let header = header.trim();
        if header.is_empty() {
            return Err(SignatureError::Empty);
        }

        let mut timestamp = None;
        let mut sig_v1 = None;

        // Later duplicates overwrite earlier ones.
        for part in header.split(',') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key.trim() {
                "t" => timestamp = Some(value.trim()),
                "v1" => sig_v1 = Some(value.trim()),
                _ => {}
            }
        }

        let timestamp_str = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        let sig_v1 = sig_v1.ok_or(SignatureError::MissingSignature)?;

        let timestamp: i64 = timestamp_str
            .parse()
            .ok()
            .filter(|_| timestamp_str.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| SignatureError::InvalidTimestamp(timestamp_str.to_string()))?;
        if timestamp <= 0 {
            return Err(SignatureError::InvalidTimestamp(timestamp_str.to_string()));
        }

        if sig_v1.len() != SIGNATURE_HEX_LEN || !sig_v1.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(SignatureError::MalformedSignature);
        }

        Ok(Self {
            timestamp,
            timestamp_text: timestamp_str.to_string(),
            signature_hex: sig_v1.to_ascii_lowercase(),
        })
    }
}

/// Lowercase hex HMAC-SHA256 of `"<timestamp>.<raw_body>"`.
pub fn compute_signature(raw_body: &str, secret: &str, timestamp: &str) -> String {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        // HMAC takes keys of any length; an empty digest fails every comparison anyway.
        return String::new();
    };
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Builds a complete header value for `raw_body`.
pub fn sign(raw_body: &str, secret: &str, timestamp: i64) -> String {
    let timestamp = timestamp.to_string();
    let signature = compute_signature(raw_body, secret, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

/// Checks `header_value` against `raw_body` and `secret`. Never panics.
pub fn verify(raw_body: &str, header_value: &str, secret: &str) -> bool {
    let header = match SignatureHeader::parse(header_value) {
        Ok(h) => h,
        Err(e) => {
            tracing::debug!("Rejecting webhook signature: {}", e);
            return false;
        }
    };

    let expected = compute_signature(raw_body, secret, &header.timestamp_text);
    let expected_bytes = expected.as_bytes();
    let provided_bytes = header.signature_hex.as_bytes();

    // Digest length is public, so the early exit leaks nothing.
    if expected_bytes.len() != provided_bytes.len() {
        return false;
    }

    expected_bytes.ct_eq(provided_bytes).into()
}

/// Like [`verify`], but also rejects timestamps more than `tolerance_secs`
/// away from `now` (in either direction).
pub fn verify_with_tolerance(
    raw_body: &str,
    header_value: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> bool {
    let Ok(header) = SignatureHeader::parse(header_value) else {
        return false;
    };

    let age = now - header.timestamp;
    if age.abs() > tolerance_secs {
        tracing::warn!(
            "Webhook timestamp outside tolerance (age={}s, max={}s)",
            age,
            tolerance_secs
        );
        return false;
    }

    verify(raw_body, header_value, secret)
}
