//! Three-axis display state for an invoice snapshot.
//!
//! The invoice lifecycle, the on-chain transaction and the operator's
//! compliance decision move independently, so each gets its own badge.
//! Derivation is pure and total: unknown upstream values land on the least
//! alarming outcome for their axis.

use serde::Serialize;

use crate::models::{AmlStatus, DecisionStatus, Invoice, InvoiceStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Ok,
    Warn,
    Error,
    /// Nothing to report yet; rendered apart from the other three.
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: &'static str,
    pub tone: Tone,
}

impl Badge {
    const fn new(label: &'static str, tone: Tone) -> Self {
        Self { label, tone }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedState {
    pub invoice: Badge,
    pub tx: Badge,
    pub decision: Badge,
}

pub fn derive(invoice: &Invoice) -> DerivedState {
    DerivedState {
        invoice: invoice_badge(invoice.status),
        tx: tx_badge(invoice),
        decision: decision_badge(invoice.decision.status),
    }
}

fn invoice_badge(status: InvoiceStatus) -> Badge {
    match status {
        InvoiceStatus::Confirmed => Badge::new("Confirmed", Tone::Ok),
        InvoiceStatus::Expired => Badge::new("Expired", Tone::Warn),
        InvoiceStatus::Rejected => Badge::new("Rejected", Tone::Error),
        InvoiceStatus::Waiting => Badge::new("Waiting", Tone::Neutral),
        InvoiceStatus::Unknown => Badge::new("Unknown", Tone::Neutral),
    }
}

/// A screening result wins over the tx hash: the core may report AML before
/// the hash reaches the snapshot.
fn tx_badge(invoice: &Invoice) -> Badge {
    if invoice.aml.is_present() {
        return aml_badge(invoice.aml.status);
    }
    if invoice.tx_hash.is_none() {
        return Badge::new("Not detected", Tone::Neutral);
    }
    Badge::new("Pending AML", Tone::Warn)
}

fn aml_badge(status: Option<AmlStatus>) -> Badge {
    match status {
        Some(AmlStatus::Blocked) => Badge::new("Blocked", Tone::Error),
        Some(AmlStatus::Risky) => Badge::new("Risky", Tone::Error),
        Some(AmlStatus::Warning) => Badge::new("Warning", Tone::Warn),
        Some(AmlStatus::Clean) => Badge::new("Clean", Tone::Ok),
        Some(AmlStatus::Unknown) => Badge::new("Screened", Tone::Ok),
        // Score arrived without a verdict.
        None => Badge::new("Scored", Tone::Ok),
    }
}

fn decision_badge(status: Option<DecisionStatus>) -> Badge {
    match status {
        Some(DecisionStatus::Approve) => Badge::new("Approved", Tone::Ok),
        Some(DecisionStatus::Hold) => Badge::new("On hold", Tone::Warn),
        Some(DecisionStatus::Reject) => Badge::new("Rejected", Tone::Error),
        Some(DecisionStatus::Undecided) | Some(DecisionStatus::Unknown) | None => {
            Badge::new("No decision", Tone::Neutral)
        }
    }
}

/// AML label for the accounting receipt.
///
/// An approved invoice whose transaction and asset both scored exactly zero is
/// shown as "Clean / Approved". Display only: `invoice.aml` is untouched and
/// filtering/polling keep using the raw status.
pub fn aml_display_label(invoice: &Invoice) -> &'static str {
    let approved = invoice.decision.status == Some(DecisionStatus::Approve);
    let zero_risk =
        invoice.aml.risk_score == Some(0.0) && invoice.aml.asset_risk_score == Some(0.0);

    if approved && zero_risk {
        return "Clean / Approved";
    }

    match invoice.aml.status {
        Some(_) => aml_badge(invoice.aml.status).label,
        None if invoice.aml.risk_score.is_some() => "Scored",
        None => "Not screened",
    }
}
