//! Invoice list filtering.
//!
//! All predicates are ANDed. An empty input means "no constraint", and an
//! amount bound that does not parse is ignored rather than matching nothing.

use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use serde::Deserialize;
use strum::{AsRefStr, EnumString};

use crate::models::Invoice;
use crate::util::parse_amount;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, AsRefStr, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum DateRange {
    #[serde(rename = "today")]
    #[strum(serialize = "today")]
    Today,
    #[serde(rename = "7d")]
    #[strum(serialize = "7d")]
    Last7Days,
    #[serde(rename = "30d")]
    #[strum(serialize = "30d")]
    Last30Days,
    #[default]
    #[serde(rename = "all", alias = "")]
    #[strum(to_string = "all", serialize = "")]
    All,
}

impl DateRange {
    /// Earliest `created_at` still inside the window.
    fn lower_bound(&self, now: DateTime<Local>) -> Option<DateTime<Utc>> {
        match self {
            DateRange::All => None,
            DateRange::Today => {
                let midnight = now.date_naive().and_hms_opt(0, 0, 0)?;
                // DST gaps can make local midnight ambiguous or missing.
                Local
                    .from_local_datetime(&midnight)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }
            DateRange::Last7Days => Some((now - Duration::days(7)).with_timezone(&Utc)),
            DateRange::Last30Days => Some((now - Duration::days(30)).with_timezone(&Utc)),
        }
    }
}

/// Filter form, as sent by the invoice list (query string) or the CLI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InvoiceFilter {
    /// Case-insensitive substring of the invoice id.
    #[serde(alias = "q")]
    pub query: String,
    /// Exact status or `all`.
    #[serde(alias = "statusFilter")]
    pub status: String,
    /// AML status, `none` for unscreened, or `all`.
    #[serde(alias = "amlFilter")]
    pub aml: String,
    pub min_amount: String,
    pub max_amount: String,
    pub range: DateRange,
    pub tx_hash: String,
    pub wallet: String,
    pub merchant_id: String,
}

/// Filters against the current local time.
pub fn filter_invoices<'a>(items: &'a [Invoice], filter: &InvoiceFilter) -> Vec<&'a Invoice> {
    filter_invoices_at(items, filter, Local::now())
}

/// Same as [`filter_invoices`] with an explicit clock. Original order is kept.
pub fn filter_invoices_at<'a>(
    items: &'a [Invoice],
    filter: &InvoiceFilter,
    now: DateTime<Local>,
) -> Vec<&'a Invoice> {
    let matcher = Matcher::new(filter, now);
    items.iter().filter(|inv| matcher.matches(inv)).collect()
}

/// Filter inputs pre-processed once per call.
struct Matcher {
    query: String,
    status: Option<String>,
    aml: Option<String>,
    min_amount: Option<f64>,
    max_amount: Option<f64>,
    since: Option<DateTime<Utc>>,
    tx_hash: String,
    wallet: String,
    merchant_id: String,
}

impl Matcher {
    fn new(filter: &InvoiceFilter, now: DateTime<Local>) -> Self {
        Self {
            query: needle(&filter.query),
            status: selector(&filter.status),
            aml: selector(&filter.aml),
            min_amount: parse_amount(&filter.min_amount),
            max_amount: parse_amount(&filter.max_amount),
            since: filter.range.lower_bound(now),
            tx_hash: needle(&filter.tx_hash),
            wallet: needle(&filter.wallet),
            merchant_id: needle(&filter.merchant_id),
        }
    }

    fn matches(&self, inv: &Invoice) -> bool {
        contains(Some(&inv.id), &self.query)
            && self.matches_status(inv)
            && self.matches_aml(inv)
            && self.matches_amount(inv)
            && self.matches_date(inv)
            && contains(inv.tx_hash.as_deref(), &self.tx_hash)
            && contains(inv.wallet_address.as_deref(), &self.wallet)
            && contains(inv.merchant_id.as_deref(), &self.merchant_id)
    }

    fn matches_status(&self, inv: &Invoice) -> bool {
        match &self.status {
            None => true,
            Some(wanted) => inv.status.as_ref() == wanted,
        }
    }

    fn matches_aml(&self, inv: &Invoice) -> bool {
        match (&self.aml, inv.aml.status) {
            (None, _) => true,
            (Some(wanted), None) => wanted == "none",
            (Some(wanted), Some(status)) => status.as_ref() == wanted,
        }
    }

    fn matches_amount(&self, inv: &Invoice) -> bool {
        if self.min_amount.is_none() && self.max_amount.is_none() {
            return true;
        }
        let Some(amount) = inv.fiat_amount else {
            return false;
        };
        self.min_amount.is_none_or(|min| amount >= min)
            && self.max_amount.is_none_or(|max| amount <= max)
    }

    fn matches_date(&self, inv: &Invoice) -> bool {
        match (self.since, inv.created_at) {
            (None, _) => true,
            (Some(since), Some(created)) => created >= since,
            (Some(_), None) => false,
        }
    }
}

fn needle(s: &str) -> String {
    s.trim().to_lowercase()
}

/// `None` when the selector is empty or `all`.
fn selector(s: &str) -> Option<String> {
    let s = s.trim().to_lowercase();
    (!s.is_empty() && s != "all").then_some(s)
}

fn contains(haystack: Option<&str>, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}
