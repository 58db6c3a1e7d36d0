//! Telegram Bot API notification channel.
//!
//! Text goes through `sendMessage`; attachments follow as one `sendDocument`
//! call each. Rate limits surface as `RateLimited` with the
//! `parameters.retry_after` hint so the dispatcher can honor it.

use async_trait::async_trait;
use fanout::{Attachment, Channel, SendResult};
use reqwest::{Client, multipart};
use serde_json::{Value, json};
use tracing::debug;

use super::{http, truncate_message};
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, ProxyConfig, build_client};

/// Telegram `sendMessage` text limit (UTF-8 characters).
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

/// Telegram document caption limit.
const TELEGRAM_CAPTION_LIMIT: usize = 1024;

const DEFAULT_API_HOST: &str = "api.telegram.org";

/// Telegram channel configuration.
#[derive(Debug, Clone, Default)]
pub struct TelegramConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Telegram Bot API token.
    pub bot_token: String,
    /// Target chat ID (user, group, or channel).
    pub chat_id: String,
    /// Alternative Bot API host, e.g. a reverse proxy.
    pub api_host: Option<String>,
    pub proxy: Option<ProxyConfig>,
}

/// Telegram notification channel.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
}

impl TelegramChannel {
    pub const NAME: &'static str = "telegram";

    pub fn new(config: TelegramConfig) -> Self {
        let client = build_client(DEFAULT_REQUEST_TIMEOUT, config.proxy.as_ref());
        Self { config, client }
    }

    fn method_url(&self, method: &str) -> String {
        let host = self
            .config
            .api_host
            .as_deref()
            .filter(|h| !h.is_empty())
            .unwrap_or(DEFAULT_API_HOST);
        let host = host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/bot{}/{method}", self.config.bot_token)
        } else {
            format!("https://{host}/bot{}/{method}", self.config.bot_token)
        }
    }

    fn build_payload(&self, title: &str, content: &str) -> Value {
        json!({
            "chat_id": self.config.chat_id,
            "text": truncate_message(&format!("{title}\n\n{content}"), TELEGRAM_MESSAGE_LIMIT),
            "disable_web_page_preview": true,
        })
    }

    fn check_ok(body: &Value) -> SendResult {
        if body.get("ok").and_then(Value::as_bool) == Some(true) {
            return Ok(());
        }
        Err(http::service_error(
            Self::NAME,
            http::int_field(body, "error_code").unwrap_or(-1),
            http::str_field(body, "description", "unknown error"),
        ))
    }

    async fn send_document(&self, attachment: &Attachment, caption: &str) -> SendResult {
        let part = multipart::Part::bytes(attachment.data().to_vec())
            .file_name(attachment.filename().to_string())
            .mime_str(attachment.content_type())
            .map_err(|e| http::transport_error(Self::NAME, e))?;
        let form = multipart::Form::new()
            .text("chat_id", self.config.chat_id.clone())
            .text("caption", truncate_message(caption, TELEGRAM_CAPTION_LIMIT))
            .part("document", part);

        let response = self
            .client
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        Self::check_ok(&body)
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports_attachments(&self) -> bool {
        true
    }

    fn is_configured(&self) -> bool {
        !self.config.bot_token.is_empty() && !self.config.chat_id.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&self.build_payload(title, content))
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        Self::check_ok(&body)?;
        debug!("Telegram notification sent");
        Ok(())
    }

    async fn send_with_attachments(
        &self,
        title: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> SendResult {
        self.send(title, content).await?;
        for attachment in attachments {
            self.send_document(attachment, title).await?;
            debug!(filename = %attachment.filename(), "Telegram document sent");
        }
        Ok(())
    }
}
