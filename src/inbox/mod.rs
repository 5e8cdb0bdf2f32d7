//! Bounded log of verified inbound webhooks, newest first.
//!
//! Two backends share one contract: the durable REST key-value store when
//! configured, otherwise a process-local log. The choice is made once when
//! the store is built. A durable backend that fails at runtime degrades:
//! writes land in the local log, reads come back empty. Callers never see a
//! store error.

mod kv;
mod memory;

pub use kv::KvBackend;
pub use memory::MemoryBackend;

use std::future::Future;

use serde::Serialize;
use strum::AsRefStr;

use crate::config::InboxConfig;
use crate::error::StoreError;
use crate::models::WebhookEnvelope;

/// Default number of envelopes retained.
pub const DEFAULT_CAPACITY: usize = 100;

/// Storage contract both backends implement.
///
/// `append` inserts at the head and trims to capacity as one step; `list`
/// never returns more than `min(limit, capacity)` items.
pub trait InboxBackend: Send + Sync {
    fn append(
        &self,
        envelope: &WebhookEnvelope,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn list(
        &self,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<WebhookEnvelope>, StoreError>> + Send;

    fn get_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<WebhookEnvelope>, StoreError>> + Send;

    fn clear(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Which backend handled a write. Reported for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Backend {
    Durable,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct InboxStore {
    durable: Option<KvBackend>,
    fallback: MemoryBackend,
    capacity: usize,
}

impl InboxStore {
    /// Process-local store only.
    pub fn in_memory(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            durable: None,
            fallback: MemoryBackend::new(capacity),
            capacity,
        }
    }

    /// Durable store with the local log as fallback.
    pub fn with_durable(durable: KvBackend, capacity: usize) -> Self {
        let mut store = Self::in_memory(capacity);
        store.durable = Some(durable);
        store
    }

    /// Picks the backend from configuration. A KV client that cannot be
    /// built is logged and the store runs in memory.
    pub fn from_config(config: &InboxConfig) -> Self {
        let Some(kv) = &config.kv else {
            tracing::info!("Inbox: no KV configured, using in-memory store");
            return Self::in_memory(config.capacity);
        };

        match KvBackend::new(kv, config.capacity) {
            Ok(backend) => {
                tracing::info!("Inbox: using durable KV store at {}", kv.url);
                Self::with_durable(backend, config.capacity)
            }
            Err(e) => {
                tracing::warn!("Inbox: failed to build KV client ({}), using in-memory store", e);
                Self::in_memory(config.capacity)
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The backend writes go to while it is healthy.
    pub fn primary(&self) -> Backend {
        if self.durable.is_some() {
            Backend::Durable
        } else {
            Backend::Fallback
        }
    }

    pub async fn append(&self, envelope: &WebhookEnvelope) -> Backend {
        if let Some(durable) = &self.durable {
            match durable.append(envelope).await {
                Ok(()) => return Backend::Durable,
                Err(e) => {
                    tracing::warn!(
                        "Inbox: durable append failed for {}, writing to fallback: {}",
                        envelope.id,
                        e
                    );
                }
            }
        }

        // The memory backend cannot fail.
        let _ = self.fallback.append(envelope).await;
        Backend::Fallback
    }

    pub async fn list(&self, limit: usize) -> Vec<WebhookEnvelope> {
        let limit = limit.min(self.capacity);

        let Some(durable) = &self.durable else {
            return self.fallback.list(limit).await.unwrap_or_default();
        };

        match durable.list(limit).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!("Inbox: durable list failed, returning empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Looks in the durable store first, then in the fallback log (which holds
    /// anything written while the durable store was down).
    pub async fn get_by_id(&self, id: &str) -> Option<WebhookEnvelope> {
        if let Some(durable) = &self.durable {
            match durable.get_by_id(id).await {
                Ok(Some(item)) => return Some(item),
                Ok(None) => {}
                Err(e) => tracing::warn!("Inbox: durable lookup of {} failed: {}", id, e),
            }
        }

        self.fallback.get_by_id(id).await.unwrap_or_default()
    }

    pub async fn clear(&self) {
        if let Some(durable) = &self.durable
            && let Err(e) = durable.clear().await
        {
            tracing::warn!("Inbox: durable clear failed: {}", e);
        }
        let _ = self.fallback.clear().await;
    }
}
