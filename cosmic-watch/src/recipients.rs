//! Registry of chats that receive alerts.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Chat identifier on the messaging channel.
pub type RecipientId = i64;

/// Shared set of alert recipients.
///
/// Written by the update listener and the HTTP surface; the notifier reads a
/// snapshot at broadcast start.
#[derive(Debug, Clone, Default)]
pub struct RecipientRegistry {
    inner: Arc<RwLock<BTreeSet<RecipientId>>>,
}

impl RecipientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry, e.g. from configuration.
    pub fn with_recipients(ids: impl IntoIterator<Item = RecipientId>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ids.into_iter().collect())),
        }
    }

    /// Add a recipient. Returns `true` if it was not registered before.
    pub async fn register(&self, id: RecipientId) -> bool {
        let added = self.inner.write().await.insert(id);
        if added {
            tracing::info!(recipient = id, "Recipient registered");
        }
        added
    }

    /// Point-in-time copy of the registered recipients.
    pub async fn snapshot(&self) -> Vec<RecipientId> {
        self.inner.read().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
