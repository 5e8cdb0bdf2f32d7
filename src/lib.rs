//! PSP dashboard - webhook intake and invoice lifecycle tracking for payment operators
//!
//! This library provides the core of the operator dashboard: signed webhook
//! verification, the bounded webhook inbox, invoice normalization and display
//! state, status polling, list filtering, and the HTTP handlers that expose them.

pub mod config;
pub mod error;
pub mod extractors;
pub mod filter;
pub mod handlers;
pub mod id;
pub mod inbox;
pub mod invoice_state;
pub mod models;
pub mod pagination;
pub mod poller;
pub mod psp;
pub mod rate_limit;
pub mod signature;
pub mod state;
pub mod util;
