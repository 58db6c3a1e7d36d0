//! Bark (iOS push) notification channel.
//!
//! Sends `GET {server}/{key}/{title}/{body}` and expects `{"code": 200}` back.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const DEFAULT_SERVER: &str = "https://api.day.app";

/// Bark channel configuration.
#[derive(Debug, Clone, Default)]
pub struct BarkConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Device key, or a full server URL including the key.
    pub push: String,
    pub archive: Option<String>,
    pub group: Option<String>,
    pub sound: Option<String>,
    pub icon: Option<String>,
}

/// Bark notification channel.
pub struct BarkChannel {
    config: BarkConfig,
    client: Client,
}

impl BarkChannel {
    pub const NAME: &'static str = "bark";

    pub fn new(config: BarkConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    /// Build the full request URL for a message.
    fn build_url(&self, title: &str, content: &str) -> String {
        let push = self.config.push.trim_end_matches('/');
        let base = if push.starts_with("http") {
            push.to_string()
        } else {
            format!("{DEFAULT_SERVER}/{push}")
        };

        let mut url = format!(
            "{}/{}/{}",
            base,
            urlencoding::encode(title),
            urlencoding::encode(content)
        );

        let params: Vec<String> = [
            ("isArchive", &self.config.archive),
            ("group", &self.config.group),
            ("sound", &self.config.sound),
            ("icon", &self.config.icon),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .map(|v| format!("{}={}", key, urlencoding::encode(v)))
        })
        .collect();

        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        url
    }
}

#[async_trait]
impl Channel for BarkChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.push.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let url = self.build_url(title, content);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "code") {
            Some(200) => {
                debug!("Bark notification sent");
                Ok(())
            }
            code => Err(http::service_error(
                Self::NAME,
                code.unwrap_or_default(),
                http::str_field(&body, "message", "unknown error"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_url_with_key() {
        let channel = BarkChannel::new(BarkConfig {
            enabled: true,
            push: "abc123".to_string(),
            ..Default::default()
        });
        assert_eq!(
            channel.build_url("Check in", "ok 100%"),
            "https://api.day.app/abc123/Check%20in/ok%20100%25"
        );
    }

    #[test]
    fn test_build_url_with_server_and_params() {
        let channel = BarkChannel::new(BarkConfig {
            enabled: true,
            push: "https://bark.example.com/key/".to_string(),
            group: Some("checkin".to_string()),
            sound: Some("bell".to_string()),
            ..Default::default()
        });
        assert_eq!(
            channel.build_url("t", "c"),
            "https://bark.example.com/key/t/c?group=checkin&sound=bell"
        );
    }

    #[test]
    fn test_bark_requires_key() {
        let channel = BarkChannel::new(BarkConfig::default());
        assert!(!channel.is_configured());
    }
}
