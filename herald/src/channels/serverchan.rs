//! ServerChan (Server酱) WeChat push channel.
//!
//! `SCT...` keys go to the Turbo endpoint; anything else to the legacy one.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

#[derive(Debug, Clone, Default)]
pub struct ServerChanConfig {
    pub enabled: bool,
    pub key: String,
}

pub struct ServerChanChannel {
    config: ServerChanConfig,
    client: Client,
}

/// Check the shape of a send key. Returns a description of the problem.
pub fn validate_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        return Err("key is empty".to_string());
    }
    if key.starts_with("SCT") {
        if key.len() < 20 {
            return Err(format!("Turbo key looks truncated ({} chars)", key.len()));
        }
    } else if key.len() < 10 {
        return Err(format!("key looks truncated ({} chars)", key.len()));
    }
    Ok(())
}

impl ServerChanChannel {
    pub const NAME: &'static str = "serverchan";

    pub fn new(config: ServerChanConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn endpoint(&self) -> String {
        let key = &self.config.key;
        if key.starts_with("SCT") {
            format!("https://sctapi.ftqq.com/{key}.send")
        } else {
            format!("https://sc.ftqq.com/{key}.send")
        }
    }

    fn accepted(body: &Value) -> bool {
        http::int_field(body, "code") == Some(0) || http::int_field(body, "errno") == Some(0)
    }

    fn error_message(body: &Value) -> &str {
        ["message", "errmsg", "error"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .unwrap_or("unknown error")
    }
}

#[async_trait]
impl Channel for ServerChanChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.key.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        // Markdown needs a blank line to break paragraphs.
        let desp = content.replace('\n', "\n\n");
        let response = self
            .client
            .post(self.endpoint())
            .form(&[("text", title), ("desp", desp.as_str())])
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        if Self::accepted(&body) {
            debug!("ServerChan notification sent");
            return Ok(());
        }
        let code = http::int_field(&body, "code")
            .or_else(|| http::int_field(&body, "errno"))
            .unwrap_or(-1);
        Err(http::service_error(Self::NAME, code, Self::error_message(&body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel(key: &str) -> ServerChanChannel {
        ServerChanChannel::new(ServerChanConfig {
            enabled: true,
            key: key.to_string(),
        })
    }

    #[test]
    fn test_endpoint_by_key_type() {
        assert_eq!(
            channel("SCT12345abcdefghijklmn").endpoint(),
            "https://sctapi.ftqq.com/SCT12345abcdefghijklmn.send"
        );
        assert_eq!(
            channel("SCU1234567890").endpoint(),
            "https://sc.ftqq.com/SCU1234567890.send"
        );
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key("").is_err());
        assert!(validate_key("SCTshort").is_err());
        assert!(validate_key("SCT12345abcdefghijklmn").is_ok());
        assert!(validate_key("abc").is_err());
        assert!(validate_key("abcdefghij").is_ok());
    }

    #[test]
    fn test_response_handling() {
        assert!(ServerChanChannel::accepted(&json!({"code": 0})));
        assert!(ServerChanChannel::accepted(&json!({"errno": 0})));
        let body = json!({"code": 40001, "errmsg": "bad pushkey"});
        assert!(!ServerChanChannel::accepted(&body));
        assert_eq!(ServerChanChannel::error_message(&body), "bad pushkey");
        assert_eq!(ServerChanChannel::error_message(&json!({})), "unknown error");
    }
}
