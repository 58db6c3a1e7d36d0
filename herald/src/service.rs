//! Pre-dispatch policies around the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use fanout::{DispatchReport, Dispatcher, NotificationRequest};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{AppConfig, BehaviorSettings};
use crate::error::Result;
use crate::utils::http_client::build_client;

const HITOKOTO_URL: &str = "https://v1.hitokoto.cn/";
const HITOKOTO_TIMEOUT: Duration = Duration::from_secs(5);

/// Why a notification was not dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    EmptyContent,
    SkipListed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyContent => f.write_str("content is empty"),
            Self::SkipListed => f.write_str("title is in SKIP_PUSH_TITLE"),
        }
    }
}

/// What happened to a notification.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Skipped { reason: SkipReason },
    Delivered { report: DispatchReport },
}

impl Outcome {
    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            Self::Delivered { report } => Some(report),
            Self::Skipped { .. } => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Hitokoto {
    hitokoto: String,
    from: String,
}

/// Applies skip rules and enrichment, then fans the request out.
pub struct NotificationService {
    dispatcher: Arc<Dispatcher>,
    behavior: BehaviorSettings,
    client: Client,
}

impl NotificationService {
    pub fn new(config: &AppConfig) -> Self {
        let dispatcher = Dispatcher::with_config(
            config.channels.build_registry(),
            config.dispatch.to_dispatch_config(),
        );
        Self::with_dispatcher(dispatcher, config.behavior.clone())
    }

    pub fn with_dispatcher(dispatcher: Dispatcher, behavior: BehaviorSettings) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            behavior,
            client: build_client(HITOKOTO_TIMEOUT, None),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle an inbound event. Events with empty content are skipped.
    pub async fn handle_event(&self, request: NotificationRequest) -> Result<Outcome> {
        if request.content().trim().is_empty() {
            warn!(title = %request.title(), "Event content is empty, skipping");
            return Ok(Outcome::Skipped {
                reason: SkipReason::EmptyContent,
            });
        }
        self.send(request).await
    }

    /// Send a notification directly.
    pub async fn send(&self, request: NotificationRequest) -> Result<Outcome> {
        if self.is_skip_listed(request.title()) {
            info!(title = %request.title(), "Title is in the skip list, skipping");
            return Ok(Outcome::Skipped {
                reason: SkipReason::SkipListed,
            });
        }

        let request = if self.behavior.hitokoto {
            self.append_hitokoto(request).await
        } else {
            request
        };

        debug!(
            source = request.source().unwrap_or("unknown"),
            excluded = ?self.dispatcher.registry().excluded(),
            "Handing notification to the dispatcher"
        );
        let report = self.dispatcher.dispatch(request).await?;
        Ok(Outcome::Delivered { report })
    }

    fn is_skip_listed(&self, title: &str) -> bool {
        let title = title.trim();
        self.behavior.skip_titles.iter().any(|t| t == title)
    }

    async fn append_hitokoto(&self, request: NotificationRequest) -> NotificationRequest {
        match self.fetch_hitokoto().await {
            Ok(quote) => {
                let content = format!("{}\n\n{}", request.content(), format_hitokoto(&quote));
                request.with_content(content)
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch hitokoto, sending without it");
                request
            }
        }
    }

    async fn fetch_hitokoto(&self) -> std::result::Result<Hitokoto, reqwest::Error> {
        self.client
            .get(HITOKOTO_URL)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

fn format_hitokoto(quote: &Hitokoto) -> String {
    format!("{}    ----{}", quote.hitokoto, quote.from)
}
