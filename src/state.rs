use std::sync::Arc;

use crate::config::Config;
use crate::error::PspError;
use crate::inbox::InboxStore;
use crate::psp::PspClient;

/// Shared state handed to every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub inbox: InboxStore,
    pub psp: PspClient,
    /// HMAC secret for inbound webhooks. `None` makes intake fail closed.
    pub webhook_secret: Option<Arc<str>>,
    /// Replay window in seconds; `None` skips the timestamp freshness check.
    pub webhook_tolerance_secs: Option<i64>,
    /// Token guarding the inbox viewer.
    pub inbox_read_token: Option<Arc<str>>,
    pub dev_mode: bool,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self, PspError> {
        Ok(Self {
            inbox: InboxStore::from_config(&config.inbox),
            psp: PspClient::new(&config.psp_core)?,
            webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
            webhook_tolerance_secs: config.webhook_tolerance_secs,
            inbox_read_token: config.inbox_read_token.as_deref().map(Arc::from),
            dev_mode: config.dev_mode,
        })
    }
}
