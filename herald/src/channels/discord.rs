//! Discord webhook notification channel.
//!
//! Messages are sent as a single embed. Attachments go in the same request as
//! multipart `files[n]` parts next to a `payload_json` field. 429 responses
//! carry `Retry-After`, which the shared status check turns into a
//! `RateLimited` error with that hint.

use async_trait::async_trait;
use fanout::{Attachment, Channel, SendResult};
use reqwest::{Client, multipart};
use serde_json::{Value, json};
use tracing::debug;

use super::{http, truncate_message};
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const EMBED_TITLE_LIMIT: usize = 256;
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// Discord allows at most ten files per message.
const MAX_FILES: usize = 10;

const EMBED_COLOR: u32 = 0x3498db;

/// Discord channel configuration.
#[derive(Debug, Clone, Default)]
pub struct DiscordConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Discord webhook URL.
    pub webhook_url: String,
    /// Optional username for the webhook.
    pub username: Option<String>,
    /// Optional avatar URL for the webhook.
    pub avatar_url: Option<String>,
}

/// Discord notification channel.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: Client,
}

impl DiscordChannel {
    pub const NAME: &'static str = "discord";

    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    /// Build the webhook payload.
    fn build_payload(&self, title: &str, content: &str) -> Value {
        let embed = json!({
            "title": truncate_message(title, EMBED_TITLE_LIMIT),
            "description": truncate_message(content, EMBED_DESCRIPTION_LIMIT),
            "color": EMBED_COLOR,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut payload = json!({
            "embeds": [embed]
        });

        if let Some(username) = &self.config.username {
            payload["username"] = json!(username);
        }
        if let Some(avatar_url) = &self.config.avatar_url {
            payload["avatar_url"] = json!(avatar_url);
        }

        payload
    }

    fn build_form(payload: &Value, attachments: &[Attachment]) -> Result<multipart::Form, reqwest::Error> {
        let mut form = multipart::Form::new().text("payload_json", payload.to_string());
        for (i, attachment) in attachments.iter().take(MAX_FILES).enumerate() {
            let part = multipart::Part::bytes(attachment.data().to_vec())
                .file_name(attachment.filename().to_string())
                .mime_str(attachment.content_type())?;
            form = form.part(format!("files[{i}]"), part);
        }
        Ok(form)
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports_attachments(&self) -> bool {
        true
    }

    fn is_configured(&self) -> bool {
        !self.config.webhook_url.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&self.build_payload(title, content))
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        http::check_status(Self::NAME, response).await?;
        debug!("Discord notification sent");
        Ok(())
    }

    async fn send_with_attachments(
        &self,
        title: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> SendResult {
        let payload = self.build_payload(title, content);
        let form = Self::build_form(&payload, attachments)
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let response = self
            .client
            .post(&self.config.webhook_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        http::check_status(Self::NAME, response).await?;
        debug!(files = attachments.len().min(MAX_FILES), "Discord notification sent with files");
        Ok(())
    }
}
