//! DingTalk custom robot channel.
//!
//! When a signing secret is configured, every request carries a `timestamp`
//! and an HMAC-SHA256 `sign` over `"{timestamp}\n{secret}"`.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use fanout::{Channel, ChannelError, SendResult};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const ROBOT_URL: &str = "https://oapi.dingtalk.com/robot/send";

/// DingTalk channel configuration.
#[derive(Debug, Clone, Default)]
pub struct DingTalkConfig {
    pub enabled: bool,
    /// Robot access token.
    pub token: String,
    /// Optional signing secret (`SEC...`).
    pub secret: Option<String>,
}

pub struct DingTalkChannel {
    config: DingTalkConfig,
    client: Client,
}

impl DingTalkChannel {
    pub const NAME: &'static str = "dingtalk";

    pub fn new(config: DingTalkConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn build_url(&self, timestamp_ms: i64) -> Result<String, ChannelError> {
        let mut url = format!(
            "{ROBOT_URL}?access_token={}",
            urlencoding::encode(&self.config.token)
        );
        if let Some(secret) = self.config.secret.as_deref().filter(|s| !s.is_empty()) {
            let sign = sign(timestamp_ms, secret)?;
            url.push_str(&format!("&timestamp={timestamp_ms}&sign={sign}"));
        }
        Ok(url)
    }

    fn build_payload(title: &str, content: &str) -> Value {
        json!({
            "msgtype": "text",
            "text": { "content": format!("{title}\n\n{content}") }
        })
    }
}

/// Compute the URL-encoded robot signature for `timestamp_ms`.
pub fn sign(timestamp_ms: i64, secret: &str) -> Result<String, ChannelError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| ChannelError::internal(format!("dingtalk: invalid signing key: {e}")))?;
    mac.update(format!("{timestamp_ms}\n{secret}").as_bytes());
    let digest = STANDARD.encode(mac.finalize().into_bytes());
    Ok(urlencoding::encode(&digest).into_owned())
}

#[async_trait]
impl Channel for DingTalkChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.token.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let url = self.build_url(chrono::Utc::now().timestamp_millis())?;
        let response = self
            .client
            .post(&url)
            .json(&Self::build_payload(title, content))
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "errcode") {
            Some(0) => {
                debug!("DingTalk notification sent");
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
    fn test_sign_known_vector() {
        assert_eq!(
            sign(1_700_000_000_000, "SECtest").unwrap(),
            "aZLLrriXgn05YbwaGR7knYsLeJADjr9NwLaNNKpxh4g%3D"
        );
    }

    #[test]
    fn test_url_without_secret_is_unsigned() {
        let channel = DingTalkChannel::new(DingTalkConfig {
            enabled: true,
            token: "tok".to_string(),
            secret: None,
        });
        assert_eq!(
            channel.build_url(1).unwrap(),
            "https://oapi.dingtalk.com/robot/send?access_token=tok"
        );
    }

    #[test]
    fn test_url_with_secret_is_signed() {
        let channel = DingTalkChannel::new(DingTalkConfig {
            enabled: true,
            token: "tok".to_string(),
            secret: Some("SECtest".to_string()),
        });
        let url = channel.build_url(1_700_000_000_000).unwrap();
        assert!(url.ends_with(
            "&timestamp=1700000000000&sign=aZLLrriXgn05YbwaGR7knYsLeJADjr9NwLaNNKpxh4g%3D"
        ));
    }

    #[test]
    fn test_payload_is_text_message() {
        let payload = DingTalkChannel::build_payload("Daily", "all good");
        assert_eq!(payload["msgtype"], "text");
        assert_eq!(payload["text"]["content"], "Daily\n\nall good");
    }
}
