//! Telegram Bot API adapter.
//!
//! Implements [`MessageTransport`] (anchors go to the group chat, alerts go
//! to recipient chats) and [`UpdateSource`] for the inbound listener.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use cosmic_common::config::TelegramConfig;
use cosmic_common::util::{sanitize_for_log, truncate_with_ellipsis};

use crate::inbox::UpdateSource;
use crate::notification::{DeliveryError, MessageTransport};
use crate::recipients::RecipientId;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

/// One entry from `getUpdates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<Sender>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub reply_to_message: Option<RepliedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

impl Sender {
    /// Best available display name.
    pub fn display_name(&self) -> &str {
        self.username
            .as_deref()
            .or(self.first_name.as_deref())
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepliedMessage {
    pub message_id: i64,
}

// ============================================================================
// Client
// ============================================================================

/// Telegram Bot API client.
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    bot_token: String,
    group_chat_id: i64,
    poll_timeout_secs: u64,
    send_timeout: Duration,
}

impl TelegramClient {
    pub fn new(config: &TelegramConfig) -> Self {
        // Long polls hold the connection for poll_timeout_secs; sends override
        // this per request
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.poll_timeout_secs + 15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone().unwrap_or_default(),
            group_chat_id: config.group_chat_id.unwrap_or_default(),
            poll_timeout_secs: config.poll_timeout_secs,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    fn request(&self, method: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        self.client.post(self.api_url(method)).json(body)
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, DeliveryError> {
        let resp = request
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(sanitize_for_log(&e.to_string())))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| DeliveryError::Transport(sanitize_for_log(&e.to_string())))?;

        let parsed: ApiResponse<T> = serde_json::from_str(&text).map_err(|_| {
            DeliveryError::Rejected(format!(
                "HTTP {status}: {}",
                truncate_with_ellipsis(&sanitize_for_log(&text), 200)
            ))
        })?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(DeliveryError::Rejected(format!(
                "{method} failed: {}",
                parsed
                    .description
                    .unwrap_or_else(|| format!("HTTP {status}"))
            ))),
        }
    }

    fn send_request(&self, chat_id: i64, text: &str) -> reqwest::RequestBuilder {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        self.request("sendMessage", &body).timeout(self.send_timeout)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<i64, DeliveryError> {
        let request = self.send_request(chat_id, text);
        let sent: SentMessage = self.call("sendMessage", request).await?;
        Ok(sent.message_id)
    }
}

#[async_trait]
impl MessageTransport for TelegramClient {
    async fn post(&self, text: &str) -> Result<String, DeliveryError> {
        let message_id = self.send_message(self.group_chat_id, text).await?;
        Ok(message_id.to_string())
    }

    async fn send(&self, recipient: RecipientId, text: &str) -> Result<(), DeliveryError> {
        self.send_message(recipient, text).await.map(|_| ())
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn poll(&self, offset: i64) -> Result<Vec<Update>, DeliveryError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        self.call("getUpdates", self.request("getUpdates", &body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TelegramClient {
        TelegramClient::new(&TelegramConfig {
            bot_token: Some("123:abc".into()),
            group_chat_id: Some(-1001),
            ..Default::default()
        })
    }

    #[test]
    fn test_api_url() {
        assert_eq!(
            client().api_url("sendMessage"),
            "https://api.telegram.org/bot123:abc/sendMessage"
        );
    }

    #[test]
    fn test_send_request_carries_its_own_timeout() {
        let client = client();

        let send = client.send_request(42, "hi").build().unwrap();
        assert_eq!(send.timeout(), Some(&Duration::from_secs(10)));
        assert!(send.url().as_str().ends_with("/sendMessage"));

        let body = serde_json::json!({ "offset": 0 });
        let poll = client.request("getUpdates", &body).build().unwrap();
        assert!(poll.timeout().is_none());
    }

    #[test]
    fn test_parse_updates() {
        let body = r#"{
            "ok": true,
            "result": [
                {
                    "update_id": 900,
                    "message": {
                        "message_id": 5,
                        "chat": { "id": 42, "type": "private" },
                        "from": { "id": 7, "first_name": "Ada" },
                        "text": "/start"
                    }
                },
                {
                    "update_id": 901,
                    "message": {
                        "message_id": 6,
                        "chat": { "id": -1001 },
                        "from": { "id": 8, "username": "grace" },
                        "text": "looks close",
                        "reply_to_message": { "message_id": 101, "chat": { "id": -1001 } }
                    }
                },
                { "update_id": 902, "edited_message": {} }
            ]
        }"#;

        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(body).unwrap();
        let updates = parsed.result.unwrap();
        assert_eq!(updates.len(), 3);

        let first = updates[0].message.as_ref().unwrap();
        assert_eq!(first.chat.id, 42);
        assert_eq!(first.from.as_ref().unwrap().display_name(), "Ada");

        let reply = updates[1].message.as_ref().unwrap();
        assert_eq!(reply.reply_to_message.as_ref().unwrap().message_id, 101);
        assert_eq!(reply.from.as_ref().unwrap().display_name(), "grace");

        assert!(updates[2].message.is_none());
    }

    #[test]
    fn test_parse_error_response() {
        let body = r#"{ "ok": false, "error_code": 400, "description": "Bad Request: chat not found" }"#;
        let parsed: ApiResponse<SentMessage> = serde_json::from_str(body).unwrap();
        assert!(!parsed.ok);
        assert!(parsed.result.is_none());
        assert_eq!(parsed.description.as_deref(), Some("Bad Request: chat not found"));
    }
}
