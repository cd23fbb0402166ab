//! Inbound update listener.
//!
//! Every chat that messages the bot becomes an alert recipient. `/start`
//! gets a welcome reply, and a message replying to an anchor is appended to
//! that object's thread log.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::anchor::{MessageLog, ThreadMessage, ThreadStore};
use crate::notification::{DeliveryError, MessageTransport};
use crate::recipients::RecipientRegistry;
use crate::telegram::{IncomingMessage, Update};

/// Reply sent to `/start`.
pub const WELCOME_MESSAGE: &str = "👋 Cosmic Watch online.\n\nYou will receive asteroid alerts here.";

/// Source of inbound updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Fetch updates with `update_id >= offset`, waiting for new ones.
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, DeliveryError>;
}

/// What handling one update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxAction {
    /// Update carried no message
    Ignored,
    /// Chat registered (or already known); nothing else to do
    Registered,
    /// `/start` answered
    Welcomed,
    /// Reply appended to the named thread
    ThreadReply { identity: String },
}

/// Handles inbound updates.
pub struct Inbox {
    transport: Arc<dyn MessageTransport>,
    recipients: RecipientRegistry,
    threads: Arc<dyn ThreadStore>,
    log: Arc<dyn MessageLog>,
    retry_delay: Duration,
}

impl Inbox {
    pub fn new(
        transport: Arc<dyn MessageTransport>,
        recipients: RecipientRegistry,
        threads: Arc<dyn ThreadStore>,
        log: Arc<dyn MessageLog>,
    ) -> Self {
        Self {
            transport,
            recipients,
            threads,
            log,
            retry_delay: Duration::from_secs(5),
        }
    }

    /// Override the back-off after a failed poll.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Handle a single update.
    pub async fn handle_update(&self, update: &Update) -> InboxAction {
        let Some(message) = update.message.as_ref() else {
            return InboxAction::Ignored;
        };

        let chat_id = message.chat.id;
        self.recipients.register(chat_id).await;

        let text = message.text.as_deref().unwrap_or_default().trim();

        if text == "/start" || text.starts_with("/start ") {
            if let Err(e) = self.transport.send(chat_id, WELCOME_MESSAGE).await {
                tracing::warn!(recipient = chat_id, error = %e, "Failed to send welcome");
            }
            return InboxAction::Welcomed;
        }

        if let Some(identity) = self.record_reply(message, text).await {
            return InboxAction::ThreadReply { identity };
        }

        InboxAction::Registered
    }

    async fn record_reply(&self, message: &IncomingMessage, text: &str) -> Option<String> {
        let replied = message.reply_to_message.as_ref()?;
        if text.is_empty() {
            return None;
        }

        let anchor = match self.threads.find_by_handle(&replied.message_id.to_string()).await {
            Ok(Some(anchor)) => anchor,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Anchor lookup failed");
                return None;
            }
        };

        let entry = ThreadMessage {
            username: message
                .from
                .as_ref()
                .map_or("unknown", |s| s.display_name())
                .to_string(),
            text: text.to_string(),
            created_at: Utc::now(),
        };

        match self.log.append(&anchor.identity, &entry).await {
            Ok(()) => {
                tracing::debug!(identity = %anchor.identity, "Thread reply recorded");
                Some(anchor.identity)
            }
            Err(e) => {
                tracing::warn!(identity = %anchor.identity, error = %e, "Failed to record thread reply");
                None
            }
        }
    }

    /// Long-poll `source` until shutdown is signalled.
    pub async fn run(&self, source: Arc<dyn UpdateSource>, mut shutdown: watch::Receiver<bool>) {
        let mut offset: i64 = 0;
        tracing::info!("Update listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                polled = source.poll(offset) => polled,
            };

            match polled {
                Ok(updates) => {
                    for update in &updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Update poll failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        tracing::info!("Update listener stopped");
    }
}
