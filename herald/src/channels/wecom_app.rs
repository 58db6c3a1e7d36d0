//! WeCom (WeChat Work) application message channel.
//!
//! Each send fetches a fresh access token, then posts either a text message
//! or, when a thumbnail media id is configured, an `mpnews` article.

use async_trait::async_trait;
use fanout::{Channel, ChannelError, SendResult};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use super::http;
use crate::error::{Error, Result};
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

const API_BASE: &str = "https://qyapi.weixin.qq.com/cgi-bin";

/// Errcodes meaning the corp id or secret is wrong.
const AUTH_ERRCODES: &[i64] = &[40001, 40013, 40091];

#[derive(Debug, Clone, Default)]
pub struct WeComAppConfig {
    pub enabled: bool,
    pub corp_id: String,
    pub corp_secret: String,
    /// Recipient user ids separated by `|`, or `@all`.
    pub to_user: String,
    pub agent_id: String,
    /// Thumbnail media id; switches the message type to `mpnews`.
    pub media_id: Option<String>,
}

impl WeComAppConfig {
    /// Parse `corpid,secret,touser,agentid[,media_id]`.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
        if !(4..=5).contains(&parts.len()) {
            return Err(Error::config(format!(
                "QYWX_AM expects 4 or 5 comma-separated fields, got {}",
                parts.len()
            )));
        }
        if parts[..4].iter().any(|p| p.is_empty()) {
            return Err(Error::config(
                "QYWX_AM fields corpid, secret, touser and agentid must not be empty",
            ));
        }

        Ok(Self {
            enabled: true,
            corp_id: parts[0].to_string(),
            corp_secret: parts[1].to_string(),
            to_user: parts[2].to_string(),
            agent_id: parts[3].to_string(),
            media_id: parts.get(4).filter(|m| !m.is_empty()).map(|m| m.to_string()),
        })
    }
}

pub struct WeComAppChannel {
    config: WeComAppConfig,
    client: Client,
}

impl WeComAppChannel {
    pub const NAME: &'static str = "wecom_app";

    pub fn new(config: WeComAppConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    async fn access_token(&self) -> std::result::Result<String, ChannelError> {
        let response = self
            .client
            .get(format!("{API_BASE}/gettoken"))
            .query(&[
                ("corpid", self.config.corp_id.as_str()),
                ("corpsecret", self.config.corp_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        let code = http::int_field(&body, "errcode").unwrap_or(0);
        let message = http::str_field(&body, "errmsg", "unknown error");
        if AUTH_ERRCODES.contains(&code) {
            return Err(ChannelError::auth(format!(
                "{}: token request rejected (code {code}): {message}",
                Self::NAME
            )));
        }
        if code != 0 {
            return Err(http::service_error(Self::NAME, code, message));
        }

        body.get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ChannelError::server(format!("{}: token response had no access_token", Self::NAME)))
    }

    fn build_payload(&self, title: &str, content: &str) -> Value {
        match &self.config.media_id {
            Some(media_id) => json!({
                "touser": self.config.to_user,
                "msgtype": "mpnews",
                "agentid": self.config.agent_id,
                "mpnews": {
                    "articles": [{
                        "title": title,
                        "thumb_media_id": media_id,
                        "author": "Author",
                        "content_source_url": "",
                        "content": content.replace('\n', "<br/>"),
                        "digest": content,
                    }]
                },
            }),
            None => json!({
                "touser": self.config.to_user,
                "msgtype": "text",
                "agentid": self.config.agent_id,
                "text": { "content": format!("{title}\n\n{content}") },
                "safe": "0",
            }),
        }
    }
}

#[async_trait]
impl Channel for WeComAppChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.corp_id.is_empty()
            && !self.config.corp_secret.is_empty()
            && !self.config.agent_id.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{API_BASE}/message/send"))
            .query(&[("access_token", token.as_str())])
            .json(&self.build_payload(title, content))
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        let body = http::read_json(Self::NAME, response).await?;
        match http::int_field(&body, "errcode") {
            Some(0) => {
                debug!(msgtype = if self.config.media_id.is_some() { "mpnews" } else { "text" }, "WeCom app notification sent");
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
