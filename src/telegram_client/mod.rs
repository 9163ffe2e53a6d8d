//! TelegramClient - Message Transport Adapter
//!
//! ## Responsibilities
//!
//! - Deliver photos and text to a single recipient via the Bot API
//! - Verify the bot token and recipients at startup
//!
//! Fan-out across recipients belongs to the dispatch worker; this client
//! performs exactly one HTTP call per send and never retries.

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

/// Bot API host
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Per-call timeout for photo uploads
pub const PHOTO_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call timeout for text messages and probes
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound message transport (one recipient per call)
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a JPEG with caption
    async fn send_photo(
        &self,
        recipient: &str,
        image: Vec<u8>,
        caption: &str,
        silent: bool,
    ) -> Result<()>;

    /// Send plain text
    async fn send_message(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Result of the startup probe
#[derive(Debug, Clone, Default)]
pub struct ConnectionReport {
    pub bot_ok: bool,
    pub valid_recipients: Vec<String>,
    pub invalid_recipients: Vec<String>,
}

impl ConnectionReport {
    /// Usable iff the bot answered and at least one recipient is valid
    pub fn is_available(&self) -> bool {
        self.bot_ok && !self.valid_recipients.is_empty()
    }
}

/// Telegram Bot API client
pub struct TelegramClient {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    /// Create client for the public Bot API
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Self::with_api_base(token, TELEGRAM_API_BASE)
    }

    /// Create client against a custom API host
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Probe `getMe`, then `getChat` for every recipient
    pub async fn check_connection(&self, recipients: &[String]) -> ConnectionReport {
        let mut report = ConnectionReport::default();

        if self.token.is_empty() {
            tracing::warn!("Telegram bot token not configured");
            return report;
        }

        match self
            .client
            .get(self.method_url("getMe"))
            .timeout(MESSAGE_TIMEOUT)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!("Telegram bot connection successfully tested");
                report.bot_ok = true;
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(status = %status, body = %body, "Telegram getMe failed");
                return report;
            }
            Err(e) => {
                tracing::error!(error = %e, "Telegram getMe failed");
                return report;
            }
        }

        for chat_id in recipients {
            let result = self
                .client
                .get(self.method_url("getChat"))
                .query(&[("chat_id", chat_id.as_str())])
                .timeout(MESSAGE_TIMEOUT)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(chat_id = %chat_id, "Chat ID is valid");
                    report.valid_recipients.push(chat_id.clone());
                }
                Ok(resp) => {
                    let body = resp.text().await.unwrap_or_default();
                    tracing::warn!(chat_id = %chat_id, body = %body, "Chat ID is invalid");
                    report.invalid_recipients.push(chat_id.clone());
                }
                Err(e) => {
                    tracing::warn!(chat_id = %chat_id, error = %e, "Could not verify chat ID");
                    report.invalid_recipients.push(chat_id.clone());
                }
            }
        }

        if report.valid_recipients.is_empty() {
            tracing::error!("No valid Telegram chat IDs found");
        } else {
            tracing::info!(
                valid = report.valid_recipients.len(),
                configured = recipients.len(),
                "Telegram chats configured"
            );
        }

        report
    }

    async fn check_response(resp: reqwest::Response, recipient: &str) -> Result<()> {
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Transport(format!(
            "chat {} rejected: {} - {}",
            recipient, status, body
        )))
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_photo(
        &self,
        recipient: &str,
        image: Vec<u8>,
        caption: &str,
        silent: bool,
    ) -> Result<()> {
        let form = Form::new()
            .part(
                "photo",
                Part::bytes(image)
                    .file_name("detection.jpg")
                    .mime_str("image/jpeg")?,
            )
            .text("chat_id", recipient.to_string())
            .text("caption", caption.to_string())
            .text("disable_notification", silent.to_string());

        let resp = self
            .client
            .post(self.method_url("sendPhoto"))
            .multipart(form)
            .timeout(PHOTO_TIMEOUT)
            .send()
            .await?;

        Self::check_response(resp, recipient).await
    }

    async fn send_message(&self, recipient: &str, text: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.method_url("sendMessage"))
            .form(&[("chat_id", recipient), ("text", text)])
            .timeout(MESSAGE_TIMEOUT)
            .send()
            .await?;

        Self::check_response(resp, recipient).await
    }
}
