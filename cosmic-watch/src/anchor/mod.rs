//! Discussion thread anchors.
//!
//! [`ThreadAnchorer`] guarantees at most one anchor per object identity: it
//! consults the store, posts an anchor message only when none exists, and
//! persists the returned handle.

pub mod store;

pub use store::{
    MessageLog, SqliteThreadStore, StoreError, ThreadAnchor, ThreadMessage, ThreadStore,
    MAX_MESSAGES_PER_THREAD,
};

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::notification::{DeliveryError, MessageTransport};
use crate::risk::ScoredObject;

/// Errors raised while ensuring an anchor.
#[derive(Debug, Error)]
pub enum AnchorError {
    #[error("Anchor store error: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to post anchor: {0}")]
    Post(#[from] DeliveryError),
}

/// Result of [`ThreadAnchorer::ensure_anchor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnchorOutcome {
    /// `true` when this call created the anchor
    pub created: bool,
}

/// Render the message that opens an object's thread.
pub fn format_anchor_message(object: &ScoredObject) -> String {
    fn show(value: Option<f64>) -> String {
        value.map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}"))
    }

    let record = &object.record;
    format!(
        "🧵 THREAD STARTED\n🛰️ Asteroid: {}\n\
         \n📏 Diameter: {} m\
         \n💨 Velocity: {} km/h\
         \n📍 Miss Distance: {} km\
         \n⚠️ Risk Score: {:.2}\
         \n\nReply to this message to discuss.",
        record.name,
        show(record.mean_diameter_m()),
        show(record.velocity_kph),
        show(record.miss_distance_km),
        object.risk_score,
    )
}

/// Idempotent anchor creation.
pub struct ThreadAnchorer {
    store: Arc<dyn ThreadStore>,
    transport: Arc<dyn MessageTransport>,
}

impl ThreadAnchorer {
    pub fn new(store: Arc<dyn ThreadStore>, transport: Arc<dyn MessageTransport>) -> Self {
        Self { store, transport }
    }

    /// Ensure an anchor exists for the object.
    pub async fn ensure_anchor(&self, object: &ScoredObject) -> Result<AnchorOutcome, AnchorError> {
        if self.store.exists(object.id()).await? {
            return Ok(AnchorOutcome { created: false });
        }

        let handle = self.transport.post(&format_anchor_message(object)).await?;

        let anchor = ThreadAnchor {
            identity: object.id().to_string(),
            name: object.name().to_string(),
            handle,
            created_at: Utc::now(),
        };

        match self.store.insert(&anchor).await {
            Ok(()) => {
                tracing::info!(
                    identity = %anchor.identity,
                    handle = %anchor.handle,
                    "Thread anchor created"
                );
                Ok(AnchorOutcome { created: true })
            }
            Err(StoreError::Duplicate(identity)) => {
                tracing::warn!(identity = %identity, "Anchor appeared concurrently, keeping existing");
                Ok(AnchorOutcome { created: false })
            }
            Err(e) => {
                tracing::error!(
                    identity = %anchor.identity,
                    handle = %anchor.handle,
                    error = %e,
                    "Anchor posted but not persisted"
                );
                Err(e.into())
            }
        }
    }
}
