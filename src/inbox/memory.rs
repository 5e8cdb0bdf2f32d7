use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::StoreError;
use crate::models::WebhookEnvelope;

use super::{DEFAULT_CAPACITY, InboxBackend};

/// Process-local inbox. Clones share the same log.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    items: Arc<Mutex<VecDeque<WebhookEnvelope>>>,
    capacity: usize,
}

impl MemoryBackend {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::with_capacity(
                capacity.min(DEFAULT_CAPACITY),
            ))),
            capacity: capacity.max(1),
        }
    }

    /// Insert and trim under a single lock so concurrent appends can never
    /// leave the log above capacity.
    fn push(&self, envelope: WebhookEnvelope) {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.push_front(envelope);
        items.truncate(self.capacity);
    }

    fn snapshot(&self, limit: usize) -> Vec<WebhookEnvelope> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.iter().take(limit.min(self.capacity)).cloned().collect()
    }

    fn find(&self, id: &str) -> Option<WebhookEnvelope> {
        let items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        items.iter().find(|e| e.id == id).cloned()
    }

    fn reset(&self) {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl InboxBackend for MemoryBackend {
    async fn append(&self, envelope: &WebhookEnvelope) -> Result<(), StoreError> {
        self.push(envelope.clone());
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<WebhookEnvelope>, StoreError> {
        Ok(self.snapshot(limit))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<WebhookEnvelope>, StoreError> {
        Ok(self.find(id))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.reset();
        Ok(())
    }
}
