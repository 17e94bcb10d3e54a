//! Alert delivery
//!
//! The composed message is delivered through the Telegram Bot API. Unlike
//! enrichment, a delivery failure is surfaced to the caller.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::TelegramConfig;

/// Errors that can occur during alert delivery
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A delivery channel for the composed message
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;

    fn name(&self) -> &str;
}

/// Sends Markdown messages to a Telegram chat
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
    timeout: Duration,
}

impl TelegramNotifier {
    pub fn new(client: Client, config: &TelegramConfig) -> Self {
        TelegramNotifier {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn payload(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        self.client
            .post(url)
            .timeout(self.timeout)
            .json(&self.payload(text))
            .send()
            .await?
            .error_for_status()?;

        log::info!("Telegram message delivered to chat {}", self.chat_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

/// Prints the message instead of sending it
pub struct StdoutNotifier;

#[async_trait]
impl Notifier for StdoutNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        use std::io::Write;

        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", text)?;
        stdout.flush()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "stdout"
    }
}
