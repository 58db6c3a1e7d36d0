//! iGot aggregated push channel.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const PUSH_URL: &str = "https://push.hellyw.com";

#[derive(Debug, Clone, Default)]
pub struct IgotConfig {
    pub enabled: bool,
    pub key: String,
}

impl IgotConfig {
    /// iGot keys are 24 alphanumeric characters.
    pub fn key_is_well_formed(&self) -> bool {
        self.key.len() == 24 && self.key.chars().all(|c| c.is_ascii_alphanumeric())
    }
}

pub struct IgotChannel {
    config: IgotConfig,
    client: Client,
}

impl IgotChannel {
    pub const NAME: &'static str = "igot";

    pub fn new(config: IgotConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }
}

#[async_trait]
impl Channel for IgotChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.key.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let url = format!("{PUSH_URL}/{}", self.config.key);
        let response = self
            .client
            .post(&url)
            .form(&[("title", title), ("content", content)])
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "ret") {
            Some(0) => {
                debug!("iGot notification sent");
                Ok(())
            }
            code => Err(http::service_error(
                Self::NAME,
                code.unwrap_or(-1),
                http::str_field(&body, "errMsg", "unknown error"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shape() {
        let mut config = IgotConfig {
            enabled: true,
            key: "a1b2c3d4e5f6a1b2c3d4e5f6".to_string(),
        };
        assert!(config.key_is_well_formed());
        config.key = "short".to_string();
        assert!(!config.key_is_well_formed());
    }
}
