//! Feishu (Lark) custom bot webhook channel.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const HOOK_URL: &str = "https://open.feishu.cn/open-apis/bot/v2/hook";

#[derive(Debug, Clone, Default)]
pub struct FeishuConfig {
    pub enabled: bool,
    /// Webhook key (the last path segment of the bot URL).
    pub key: String,
}

pub struct FeishuChannel {
    config: FeishuConfig,
    client: Client,
}

impl FeishuChannel {
    pub const NAME: &'static str = "feishu";

    pub fn new(config: FeishuConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn build_payload(title: &str, content: &str) -> Value {
        json!({
            "msg_type": "text",
            "content": { "text": format!("{title}\n\n{content}") }
        })
    }
}

#[async_trait]
impl Channel for FeishuChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.key.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let url = format!("{HOOK_URL}/{}", self.config.key);
        let response = self
            .client
            .post(&url)
            .json(&Self::build_payload(title, content))
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        // Older deployments answer with `StatusCode` instead of `code`.
        let code = http::int_field(&body, "code").or_else(|| http::int_field(&body, "StatusCode"));
        match code {
            Some(0) => {
                debug!("Feishu notification sent");
                Ok(())
            }
            code => Err(http::service_error(
                Self::NAME,
                code.unwrap_or(-1),
                http::str_field(&body, "msg", "unknown error"),
            )),
        }
    }
}
