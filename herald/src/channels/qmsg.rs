//! Qmsg QQ push channel.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::Client;
use tracing::debug;

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const API_URL: &str = "https://qmsg.zendee.cn";

#[derive(Debug, Clone, Default)]
pub struct QmsgConfig {
    pub enabled: bool,
    pub key: String,
    /// `send` for private messages, `group` for groups.
    pub kind: String,
}

pub struct QmsgChannel {
    config: QmsgConfig,
    client: Client,
}

impl QmsgChannel {
    pub const NAME: &'static str = "qmsg";

    pub fn new(config: QmsgConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    /// Qmsg filters long dash runs, so they are collapsed first.
    fn build_message(title: &str, content: &str) -> String {
        format!("{title}\n\n{}", content.replace("----", "-"))
    }
}

#[async_trait]
impl Channel for QmsgChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.key.is_empty() && !self.config.kind.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let url = format!("{API_URL}/{}/{}", self.config.kind, self.config.key);
        let msg = Self::build_message(title, content);
        let response = self
            .client
            .post(&url)
            .query(&[("msg", msg.as_str())])
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "code") {
            Some(0) => {
                debug!("Qmsg notification sent");
                Ok(())
            }
            code => Err(http::service_error(
                Self::NAME,
                code.unwrap_or(-1),
                http::str_field(&body, "reason", "unknown error"),
            )),
        }
    }
}
