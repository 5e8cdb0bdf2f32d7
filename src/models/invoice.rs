//! Canonical invoice snapshot.
//!
//! The PSP core has shipped several record shapes over time (camelCase and
//! snake_case keys, numbers as strings, the operator decision either flat on
//! the invoice or nested under `decision`). Everything is normalized here,
//! once, right after a fetch; downstream code only sees [`Invoice`].

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, EnumString};

use crate::error::PspError;
use crate::util::parse_amount;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum InvoiceStatus {
    Waiting,
    Confirmed,
    Expired,
    Rejected,
    Unknown,
}

impl InvoiceStatus {
    pub fn parse(s: &str) -> Self {
        s.trim().parse().unwrap_or(InvoiceStatus::Unknown)
    }

    /// Expired and rejected invoices never change again.
    pub fn is_final(&self) -> bool {
        matches!(self, InvoiceStatus::Expired | InvoiceStatus::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AmlStatus {
    Clean,
    Warning,
    Risky,
    Blocked,
    Unknown,
}

impl AmlStatus {
    pub fn parse(s: &str) -> Self {
        s.trim().parse().unwrap_or(AmlStatus::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum DecisionStatus {
    #[strum(to_string = "none")]
    #[serde(rename = "none")]
    Undecided,
    #[strum(to_string = "approve", serialize = "approved")]
    Approve,
    #[strum(to_string = "hold", serialize = "held", serialize = "on_hold")]
    Hold,
    #[strum(to_string = "reject", serialize = "rejected")]
    Reject,
    #[strum(to_string = "unknown")]
    Unknown,
}

impl DecisionStatus {
    pub fn parse(s: &str) -> Self {
        s.trim().parse().unwrap_or(DecisionStatus::Unknown)
    }

    /// `none` and unrecognised values do not count as an operator decision.
    pub fn is_decided(&self) -> bool {
        matches!(
            self,
            DecisionStatus::Approve | DecisionStatus::Hold | DecisionStatus::Reject
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmlResult {
    pub status: Option<AmlStatus>,
    pub risk_score: Option<f64>,
    pub asset_risk_score: Option<f64>,
}

impl AmlResult {
    /// A screening result exists once either a status or a numeric score arrived.
    pub fn is_present(&self) -> bool {
        self.status.is_some() || self.risk_score.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub status: Option<DecisionStatus>,
    pub decided_at: Option<String>,
    pub decided_by: Option<String>,
}

impl Decision {
    pub fn is_decided(&self) -> bool {
        self.status.is_some_and(|s| s.is_decided())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub id: String,
    pub status: InvoiceStatus,
    pub fiat_amount: Option<f64>,
    pub fiat_currency: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub merchant_id: Option<String>,
    pub tx_hash: Option<String>,
    pub wallet_address: Option<String>,
    pub aml: AmlResult,
    pub decision: Decision,
}

/// Invoice as the PSP core sends it. Every field is loosely typed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInvoice {
    pub id: Option<Value>,
    pub status: Option<Value>,
    #[serde(alias = "fiat_amount")]
    pub fiat_amount: Option<Value>,
    #[serde(alias = "fiat_currency")]
    pub fiat_currency: Option<Value>,
    #[serde(alias = "created_at")]
    pub created_at: Option<Value>,
    #[serde(alias = "merchant_id")]
    pub merchant_id: Option<Value>,
    #[serde(alias = "tx_hash")]
    pub tx_hash: Option<Value>,
    #[serde(alias = "wallet_address")]
    pub wallet_address: Option<Value>,
    #[serde(alias = "aml_status")]
    pub aml_status: Option<Value>,
    #[serde(alias = "risk_score")]
    pub risk_score: Option<Value>,
    #[serde(alias = "asset_risk_score")]
    pub asset_risk_score: Option<Value>,
    #[serde(alias = "decision_status")]
    pub decision_status: Option<Value>,
    #[serde(alias = "decided_at")]
    pub decided_at: Option<Value>,
    #[serde(alias = "decided_by")]
    pub decided_by: Option<Value>,
    /// Legacy nested form: `{status, decidedAt, decidedBy}`, or a bare status string.
    pub decision: Option<Value>,
}

impl Invoice {
    /// Normalizes an arbitrary JSON value. Anything that is not an object
    /// carrying an id is a malformed payload.
    pub fn from_value(value: Value) -> Result<Self, PspError> {
        if !value.is_object() {
            return Err(PspError::Malformed("invoice is not an object".into()));
        }
        let raw: RawInvoice =
            serde_json::from_value(value).map_err(|e| PspError::Malformed(e.to_string()))?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawInvoice) -> Result<Self, PspError> {
        let id = raw
            .id
            .as_ref()
            .and_then(text)
            .ok_or_else(|| PspError::Malformed("invoice has no id".into()))?;

        let status = raw
            .status
            .as_ref()
            .and_then(text)
            .map(|s| InvoiceStatus::parse(&s))
            .unwrap_or(InvoiceStatus::Unknown);

        let aml = AmlResult {
            status: raw.aml_status.as_ref().and_then(text).map(|s| AmlStatus::parse(&s)),
            risk_score: raw.risk_score.as_ref().and_then(number),
            asset_risk_score: raw.asset_risk_score.as_ref().and_then(number),
        };

        let decision = normalize_decision(&raw);

        Ok(Self {
            id,
            status,
            fiat_amount: raw.fiat_amount.as_ref().and_then(number),
            fiat_currency: raw.fiat_currency.as_ref().and_then(text),
            created_at: raw.created_at.as_ref().and_then(timestamp),
            merchant_id: raw.merchant_id.as_ref().and_then(text),
            tx_hash: raw.tx_hash.as_ref().and_then(text),
            wallet_address: raw.wallet_address.as_ref().and_then(text),
            aml,
            decision,
        })
    }
}

/// Flat `decisionStatus`/`decidedAt`/`decidedBy` fields win over the nested object.
fn normalize_decision(raw: &RawInvoice) -> Decision {
    let nested = raw.decision.as_ref();
    let nested_field = |key: &str| {
        nested
            .and_then(|d| d.as_object())
            .and_then(|obj| obj.get(key))
            .and_then(text)
    };

    let nested_status = match nested {
        Some(Value::String(s)) => Some(s.clone()),
        _ => nested_field("status").or_else(|| nested_field("decisionStatus")),
    };

    let status = raw
        .decision_status
        .as_ref()
        .and_then(text)
        .or(nested_status)
        .map(|s| DecisionStatus::parse(&s));

    Decision {
        status,
        decided_at: raw
            .decided_at
            .as_ref()
            .and_then(text)
            .or_else(|| nested_field("decidedAt"))
            .or_else(|| nested_field("decided_at")),
        decided_by: raw
            .decided_by
            .as_ref()
            .and_then(text)
            .or_else(|| nested_field("decidedBy"))
            .or_else(|| nested_field("decided_by")),
    }
}

/// Non-empty trimmed string; numbers are rendered as text.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_amount(s),
        _ => None,
    }
}

/// RFC 3339 strings, or unix seconds / milliseconds as numbers or digit strings.
fn timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Value::String(s) = value
        && let Ok(dt) = DateTime::parse_from_rfc3339(s.trim())
    {
        return Some(dt.with_timezone(&Utc));
    }

    let raw = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };

    // Anything past year 33658 in seconds is really milliseconds.
    if raw.abs() >= 1_000_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}
