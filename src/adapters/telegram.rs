//! Telegram operator notifications.
//!
//! Delivers retry-loop events to an operator chat. Best-effort: delivery
//! failures are logged and never reach the retry loop.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::NotificationConfig;
use crate::domain::NotificationEvent;
use crate::services::NotificationSink;

/// Telegram notification client
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: String,
    chat_id: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

impl TelegramNotifier {
    /// Create a notifier when both token and chat id are configured
    pub fn from_config(cfg: &NotificationConfig) -> Option<Arc<Self>> {
        let (token, chat_id) = match (&cfg.telegram_bot_token, &cfg.telegram_chat_id) {
            (Some(token), Some(chat_id)) => (token.clone(), chat_id.clone()),
            _ => return None,
        };
        info!("Telegram notifications enabled");
        Some(Self::new(token, chat_id))
    }

    /// Create a notifier with explicit credentials
    pub fn new(bot_token: String, chat_id: String) -> Arc<Self> {
        Arc::new(Self {
            client: Client::new(),
            bot_token,
            chat_id,
        })
    }

    /// Send a text message to the configured chat
    pub async fn send_message(&self, text: &str) -> Result<(), String> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.bot_token);
        let message = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };

        match self.client.post(&url).json(&message).send().await {
            Ok(resp) => {
                if resp.status().is_success() {
                    debug!("Telegram notification sent successfully");
                    Ok(())
                } else {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    error!("Telegram notification failed: {} - {}", status, body);
                    Err(format!("HTTP {}: {}", status, body))
                }
            }
            Err(e) => {
                error!("Telegram request failed: {}", e);
                Err(e.to_string())
            }
        }
    }
}

#[async_trait]
impl NotificationSink for TelegramNotifier {
    async fn notify(&self, event: &NotificationEvent) {
        let text = format!("{}\n{}", event.subject, event.body);
        if let Err(e) = self.send_message(&text).await {
            error!("Failed to deliver notification '{}': {}", event.subject, e);
        }
    }
}
