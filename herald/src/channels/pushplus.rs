//! Push+ WeChat push channel.
//!
//! When the current endpoint answers with a non-200 `code`, the legacy
//! hxtrip endpoint gets one try with the same body before the primary error
//! is reported.

use async_trait::async_trait;
use fanout::{Channel, ChannelError, SendResult};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const PRIMARY_URL: &str = "https://www.pushplus.plus/send";
const LEGACY_URL: &str = "http://pushplus.hxtrip.com/send";

#[derive(Debug, Clone, Default)]
pub struct PushPlusConfig {
    pub enabled: bool,
    pub token: String,
    /// Group topic code for one-to-many pushes.
    pub topic: Option<String>,
}

pub struct PushPlusChannel {
    config: PushPlusConfig,
    client: Client,
}

impl PushPlusChannel {
    pub const NAME: &'static str = "pushplus";

    pub fn new(config: PushPlusConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn build_payload(&self, title: &str, content: &str) -> Value {
        json!({
            "token": self.config.token,
            "title": title,
            "content": content,
            "topic": self.config.topic.as_deref().unwrap_or_default(),
        })
    }

    async fn post(&self, url: &str, payload: &Value) -> SendResult {
        let response = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "code") {
            Some(200) => Ok(()),
            code => Err(http::service_error(
                Self::NAME,
                code.unwrap_or(-1),
                http::str_field(&body, "msg", "unknown error"),
            )),
        }
    }
}

/// Only rejections reported by the service itself are worth a second endpoint.
fn should_try_legacy(error: &ChannelError) -> bool {
    use fanout::ErrorKind::*;
    matches!(error.kind, InvalidRequest | Server | RateLimited | Auth)
}

#[async_trait]
impl Channel for PushPlusChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.token.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let payload = self.build_payload(title, content);
        let primary = match self.post(PRIMARY_URL, &payload).await {
            Ok(()) => {
                debug!("Push+ notification sent");
                return Ok(());
            }
            Err(e) if should_try_legacy(&e) => e,
            Err(e) => return Err(e),
        };

        warn!(error = %primary, "Push+ rejected the message, trying legacy endpoint");
        match self.post(LEGACY_URL, &payload).await {
            Ok(()) => {
                debug!("Push+ notification sent via legacy endpoint");
                Ok(())
            }
            Err(legacy) => {
                debug!(error = %legacy, "Push+ legacy endpoint failed");
                Err(primary)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_defaults_topic() {
        let channel = PushPlusChannel::new(PushPlusConfig {
            enabled: true,
            token: "tok".to_string(),
            topic: None,
        });
        let payload = channel.build_payload("t", "c");
        assert_eq!(payload["token"], "tok");
        assert_eq!(payload["topic"], "");
    }

    #[test]
    fn test_legacy_only_for_service_rejections() {
        assert!(should_try_legacy(&ChannelError::invalid_request("bad token")));
        assert!(should_try_legacy(&ChannelError::server("busy")));
        assert!(!should_try_legacy(&ChannelError::transport("reset")));
        assert!(!should_try_legacy(&ChannelError::timeout("slow")));
    }
}
