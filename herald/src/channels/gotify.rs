//! Gotify server channel.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

#[derive(Debug, Clone, Default)]
pub struct GotifyConfig {
    pub enabled: bool,
    /// Server base URL, e.g. `https://push.example.com`.
    pub url: String,
    /// Application token.
    pub token: String,
    pub priority: i64,
}

pub struct GotifyChannel {
    config: GotifyConfig,
    client: Client,
}

impl GotifyChannel {
    pub const NAME: &'static str = "gotify";

    pub fn new(config: GotifyConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/message?token={}",
            self.config.url.trim_end_matches('/'),
            urlencoding::encode(&self.config.token)
        )
    }
}

#[async_trait]
impl Channel for GotifyChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.url.is_empty() && !self.config.token.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let priority = self.config.priority.to_string();
        let form = [("title", title), ("message", content), ("priority", priority.as_str())];
        let response = self
            .client
            .post(self.endpoint())
            .form(&form)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        if body.get("id").is_some() {
            debug!("Gotify notification sent");
            return Ok(());
        }
        Err(http::service_error(
            Self::NAME,
            http::int_field(&body, "errorCode").unwrap_or(-1),
            http::str_field(&body, "errorDescription", "unknown error"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trims_slash() {
        let channel = GotifyChannel::new(GotifyConfig {
            enabled: true,
            url: "https://push.example.com/".to_string(),
            token: "A.b/c".to_string(),
            priority: 5,
        });
        assert_eq!(
            channel.endpoint(),
            "https://push.example.com/message?token=A.b%2Fc"
        );
    }

    #[test]
    fn test_requires_url_and_token() {
        let channel = GotifyChannel::new(GotifyConfig {
            url: "https://push.example.com".to_string(),
            ..Default::default()
        });
        assert!(!channel.is_configured());
    }
}
