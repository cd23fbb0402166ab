//! Outbound messaging.
//!
//! [`MessageTransport`] is the channel seam (Telegram in production, mocks in
//! tests). [`Notifier`] fans one message out to every registered recipient
//! with bounded concurrency; a failed delivery never stops the others.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::delta::AlertEvent;
use crate::recipients::{RecipientId, RecipientRegistry};

/// Errors raised while delivering a message.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Network failure or timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// The channel answered but refused the message
    #[error("Rejected by channel: {0}")]
    Rejected(String),
}

/// Outbound messaging channel.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Post to the shared discussion space. Returns the message handle.
    async fn post(&self, text: &str) -> Result<String, DeliveryError>;

    /// Send a direct message to one recipient.
    async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), DeliveryError>;
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans messages out to all recipients.
pub struct Notifier {
    transport: Arc<dyn MessageTransport>,
    concurrency: usize,
}

impl Notifier {
    pub fn new(transport: Arc<dyn MessageTransport>, concurrency: usize) -> Self {
        Self {
            transport,
            concurrency: concurrency.max(1),
        }
    }

    /// Deliver `message` to every recipient registered at call time.
    pub async fn broadcast(&self, message: &str, recipients: &RecipientRegistry) -> BroadcastReport {
        let targets = recipients.snapshot().await;
        if targets.is_empty() {
            tracing::debug!("No recipients registered, skipping broadcast");
            return BroadcastReport::default();
        }

        let results: Vec<bool> = stream::iter(targets)
            .map(|recipient| {
                let transport = Arc::clone(&self.transport);
                async move {
                    match transport.send(recipient, message).await {
                        Ok(()) => true,
                        Err(e) => {
                            tracing::warn!(recipient, error = %e, "Alert delivery failed");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let delivered = results.iter().filter(|ok| **ok).count();
        let report = BroadcastReport {
            delivered,
            failed: results.len() - delivered,
        };

        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "Broadcast complete"
        );
        report
    }
}

/// Render alert events as one message.
pub fn format_alert_message(events: &[AlertEvent]) -> String {
    let mut text = String::from("🚨 Asteroid Alert\n");

    for event in events {
        text.push_str(&format!(
            "\n{} crossed risk threshold.\nRisk score: {:.2} (+{:.2})\n",
            event.name, event.score, event.delta
        ));
    }

    text.push_str("\nCheck discussion thread for details.");
    text
}
