//! PushDeer channel. Supports the public endpoint or a self-hosted server.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

pub const DEFAULT_PUSHDEER_URL: &str = "https://api2.pushdeer.com/message/push";

#[derive(Debug, Clone)]
pub struct PushDeerConfig {
    pub enabled: bool,
    pub key: String,
    /// Push endpoint; override for self-hosted servers.
    pub url: String,
}

impl Default for PushDeerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            key: String::new(),
            url: DEFAULT_PUSHDEER_URL.to_string(),
        }
    }
}

pub struct PushDeerChannel {
    config: PushDeerConfig,
    client: Client,
}

impl PushDeerChannel {
    pub const NAME: &'static str = "pushdeer";

    pub fn new(config: PushDeerConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    /// A delivery counts only when the server lists at least one result.
    fn delivered(body: &Value) -> bool {
        body.get("content")
            .and_then(|c| c.get("result"))
            .and_then(Value::as_array)
            .is_some_and(|r| !r.is_empty())
    }
}

#[async_trait]
impl Channel for PushDeerChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.key.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let form = [
            ("text", title),
            ("desp", content),
            ("type", "markdown"),
            ("pushkey", self.config.key.as_str()),
        ];
        let response = self
            .client
            .post(&self.config.url)
            .form(&form)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        if Self::delivered(&body) {
            debug!("PushDeer notification sent");
            return Ok(());
        }
        Err(http::service_error(
            Self::NAME,
            http::int_field(&body, "code").unwrap_or(-1),
            http::str_field(&body, "error", "no device accepted the message"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_delivered() {
        assert!(PushDeerChannel::delivered(
            &json!({"code": 0, "content": {"result": ["{\"counts\":1}"]}})
        ));
        assert!(!PushDeerChannel::delivered(&json!({"code": 0, "content": {"result": []}})));
        assert!(!PushDeerChannel::delivered(&json!({"code": 80403, "error": "bad key"})));
    }

    #[test]
    fn test_default_url() {
        assert_eq!(PushDeerConfig::default().url, DEFAULT_PUSHDEER_URL);
    }
}
