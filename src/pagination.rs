//! Paging for the invoice list proxy.

use serde::Deserialize;

use crate::psp::PageRequest;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 200;

/// `limit` and `offset` query parameters.
#[derive(Debug, Deserialize, Default, Clone, Copy)]
pub struct PaginationQuery {
    /// Maximum number of invoices to fetch (default: 50, max: 200)
    #[serde(default)]
    pub limit: Option<i64>,
    /// Number of invoices to skip (default: 0)
    #[serde(default)]
    pub offset: Option<i64>,
}

impl PaginationQuery {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn page(&self) -> PageRequest {
        PageRequest {
            limit: self.limit(),
            offset: self.offset(),
        }
    }
}
