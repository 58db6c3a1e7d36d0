//! Generic webhook notification channel.

use async_trait::async_trait;
use fanout::{Channel, SendResult};
use reqwest::{
    Client, Method,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::http;
use crate::utils::http_client::{DEFAULT_REQUEST_TIMEOUT, build_client};

/// Webhook channel configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Webhook URL.
    pub url: String,
    /// HTTP method (default: POST).
    pub method: String,
    /// Custom headers.
    pub headers: Vec<(String, String)>,
    /// Authentication type.
    pub auth: Option<WebhookAuth>,
}

/// Webhook authentication configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAuth {
    /// Bearer token authentication.
    Bearer { token: String },
    /// Basic authentication.
    Basic { username: String, password: String },
    /// Custom header authentication.
    Header { name: String, value: String },
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            method: "POST".to_string(),
            headers: Vec::new(),
            auth: None,
        }
    }
}

/// Parse `Name: value` pairs separated by newlines or `;`.
pub fn parse_header_list(raw: &str) -> Vec<(String, String)> {
    raw.split(['\n', ';'])
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Generic webhook notification channel.
pub struct WebhookChannel {
    config: WebhookConfig,
    client: Client,
}

impl WebhookChannel {
    pub const NAME: &'static str = "webhook";

    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: build_client(DEFAULT_REQUEST_TIMEOUT, None),
        }
    }

    fn method(&self) -> Method {
        match self.config.method.to_uppercase().as_str() {
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "PATCH" => Method::PATCH,
            other => {
                warn!(method = other, "Unsupported webhook method, using POST");
                Method::POST
            }
        }
    }

    /// Build the request headers.
    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in &self.config.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                value.parse::<HeaderValue>(),
            ) {
                headers.insert(name, value);
            }
        }

        match &self.config.auth {
            Some(WebhookAuth::Bearer { token }) => {
                if let Ok(value) = format!("Bearer {}", token).parse() {
                    headers.insert(AUTHORIZATION, value);
                }
            }
            Some(WebhookAuth::Header { name, value }) => {
                if let (Ok(name), Ok(value)) = (
                    name.parse::<HeaderName>(),
                    value.parse::<HeaderValue>(),
                ) {
                    headers.insert(name, value);
                }
            }
            // Basic auth is applied on the request builder.
            Some(WebhookAuth::Basic { .. }) | None => {}
        }

        headers
    }

    fn build_payload(title: &str, content: &str) -> Value {
        json!({
            "title": title,
            "content": content,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl Channel for WebhookChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        !self.config.url.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let mut request = self
            .client
            .request(self.method(), &self.config.url)
            .headers(self.build_headers())
            .json(&Self::build_payload(title, content));

        if let Some(WebhookAuth::Basic { username, password }) = &self.config.auth {
            request = request.basic_auth(username, Some(password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, e))?;

        http::check_status(Self::NAME, response).await?;
        debug!("Webhook notification sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_config_default() {
        let config = WebhookConfig::default();
        assert!(!config.enabled);
        assert!(config.url.is_empty());
        assert_eq!(config.method, "POST");
        assert!(!WebhookChannel::new(config).is_configured());
    }

    #[test]
    fn test_build_payload() {
        let payload = WebhookChannel::build_payload("Deploy", "v1.2 is live");
        assert_eq!(payload["title"], "Deploy");
        assert_eq!(payload["content"], "v1.2 is live");
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn test_build_headers_with_bearer() {
        let config = WebhookConfig {
            enabled: true,
            url: "https://example.com/hook".to_string(),
            headers: vec![("X-Source".to_string(), "herald".to_string())],
            auth: Some(WebhookAuth::Bearer {
                token: "secret".to_string(),
            }),
            ..Default::default()
        };
        let headers = WebhookChannel::new(config).build_headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert_eq!(headers.get("x-source").unwrap(), "herald");
    }

    #[test]
    fn test_build_headers_with_custom_auth_header() {
        let config = WebhookConfig {
            auth: Some(WebhookAuth::Header {
                name: "X-Api-Key".to_string(),
                value: "k".to_string(),
            }),
            ..Default::default()
        };
        let headers = WebhookChannel::new(config).build_headers();
        assert_eq!(headers.get("x-api-key").unwrap(), "k");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn test_method_selection() {
        let mut config = WebhookConfig::default();
        config.method = "put".to_string();
        assert_eq!(WebhookChannel::new(config.clone()).method(), Method::PUT);
        config.method = "DELETE".to_string();
        assert_eq!(WebhookChannel::new(config).method(), Method::POST);
    }

    #[test]
    fn test_parse_header_list() {
        let headers = parse_header_list("X-A: 1; X-B: two\nbroken\n: empty");
        assert_eq!(
            headers,
            vec![
                ("X-A".to_string(), "1".to_string()),
                ("X-B".to_string(), "two".to_string()),
            ]
        );
    }
}
