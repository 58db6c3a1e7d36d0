//! WeCom (WeChat Work) group robot channel.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const WEBHOOK_URL: &str = "https://qyapi.weixin.qq.com/cgi-bin/webhook/send";

#[derive(Debug, Clone, Default)]
pub struct WeComBotConfig {
    pub enabled: bool,
    pub key: String,
}

pub struct WeComBotChannel {
    config: WeComBotConfig,
    client: Client,
}

impl WeComBotChannel {
    pub const NAME: &'static str = "wecom_bot";

    pub fn new(config: WeComBotConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn build_payload(title: &str, content: &str) -> Value {
        json!({
            "msgtype": "text",
            "text": { "content": format!("{title}\n\n{content}") }
        })
    }
}

#[async_trait]
impl Channel for WeComBotChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.key.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let response = self
            .client
            .post(WEBHOOK_URL)
            .query(&[("key", self.config.key.as_str())])
            .json(&Self::build_payload(title, content))
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "errcode") {
            Some(0) => {
                debug!("WeCom robot notification sent");
                Ok(())
            }
            code => Err(http::service_error(
                Self::NAME,
                code.unwrap_or(-1),
                http::str_field(&body, "errmsg", "unknown error"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload() {
        let payload = WeComBotChannel::build_payload("t", "c");
        assert_eq!(payload["msgtype"], "text");
        assert_eq!(payload["text"]["content"], "t\n\nc");
    }
}
