//! Notification channel adapters.
//!
//! Each adapter implements [`fanout::Channel`] for one push service:
//! - Bark, Gotify, PushDeer (self-hostable push servers)
//! - DingTalk, Feishu and WeCom robots, WeCom applications
//! - ServerChan, Push+, Qmsg, iGot (WeChat/QQ relays)
//! - Telegram Bot API, Discord webhooks, generic webhooks
//! - Email (SMTP) and the console

mod bark;
mod console;
mod dingtalk;
mod discord;
mod feishu;
mod gotify;
pub(crate) mod http;
mod igot;
mod pushdeer;
mod pushplus;
mod qmsg;
mod serverchan;
mod smtp;
mod telegram;
mod webhook;
mod wecom_app;
mod wecom_bot;

pub use bark::{BarkChannel, BarkConfig};
pub use console::{ConsoleChannel, ConsoleConfig};
pub use dingtalk::{DingTalkChannel, DingTalkConfig, sign as dingtalk_sign};
pub use discord::{DiscordChannel, DiscordConfig};
pub use feishu::{FeishuChannel, FeishuConfig};
pub use gotify::{GotifyChannel, GotifyConfig};
pub use igot::{IgotChannel, IgotConfig};
pub use pushdeer::{DEFAULT_PUSHDEER_URL, PushDeerChannel, PushDeerConfig};
pub use pushplus::{PushPlusChannel, PushPlusConfig};
pub use qmsg::{QmsgChannel, QmsgConfig};
pub use serverchan::{ServerChanChannel, ServerChanConfig, validate_key as validate_serverchan_key};
pub use smtp::{SmtpChannel, SmtpConfig};
pub use telegram::{TelegramChannel, TelegramConfig};
pub use webhook::{WebhookAuth, WebhookChannel, WebhookConfig, parse_header_list};
pub use wecom_app::{WeComAppChannel, WeComAppConfig};
pub use wecom_bot::{WeComBotChannel, WeComBotConfig};

use std::sync::Arc;

use fanout::{Channel, ChannelRegistry};
use serde::Serialize;

/// Settings for every supported channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelSettings {
    pub console: ConsoleConfig,
    pub bark: BarkConfig,
    pub dingtalk: DingTalkConfig,
    pub discord: DiscordConfig,
    pub feishu: FeishuConfig,
    pub gotify: GotifyConfig,
    pub igot: IgotConfig,
    pub pushdeer: PushDeerConfig,
    pub pushplus: PushPlusConfig,
    pub qmsg: QmsgConfig,
    pub serverchan: ServerChanConfig,
    pub smtp: SmtpConfig,
    pub telegram: TelegramConfig,
    pub webhook: WebhookConfig,
    pub wecom_app: WeComAppConfig,
    pub wecom_bot: WeComBotConfig,
}

impl ChannelSettings {
    /// Build every channel adapter, paired with its enable flag.
    pub fn instantiate(&self) -> Vec<(bool, Arc<dyn Channel>)> {
        vec![
            (self.console.enabled, Arc::new(ConsoleChannel::new()) as Arc<dyn Channel>),
            (self.bark.enabled, Arc::new(BarkChannel::new(self.bark.clone()))),
            (self.dingtalk.enabled, Arc::new(DingTalkChannel::new(self.dingtalk.clone()))),
            (self.discord.enabled, Arc::new(DiscordChannel::new(self.discord.clone()))),
            (self.feishu.enabled, Arc::new(FeishuChannel::new(self.feishu.clone()))),
            (self.gotify.enabled, Arc::new(GotifyChannel::new(self.gotify.clone()))),
            (self.igot.enabled, Arc::new(IgotChannel::new(self.igot.clone()))),
            (self.pushdeer.enabled, Arc::new(PushDeerChannel::new(self.pushdeer.clone()))),
            (self.pushplus.enabled, Arc::new(PushPlusChannel::new(self.pushplus.clone()))),
            (self.qmsg.enabled, Arc::new(QmsgChannel::new(self.qmsg.clone()))),
            (self.serverchan.enabled, Arc::new(ServerChanChannel::new(self.serverchan.clone()))),
            (self.smtp.enabled, Arc::new(SmtpChannel::new(self.smtp.clone()))),
            (self.telegram.enabled, Arc::new(TelegramChannel::new(self.telegram.clone()))),
            (self.webhook.enabled, Arc::new(WebhookChannel::new(self.webhook.clone()))),
            (self.wecom_app.enabled, Arc::new(WeComAppChannel::new(self.wecom_app.clone()))),
            (self.wecom_bot.enabled, Arc::new(WeComBotChannel::new(self.wecom_bot.clone()))),
        ]
    }

    /// Registry of the enabled channels. Enabled but unconfigured channels are
    /// dropped by the registry itself.
    pub fn build_registry(&self) -> ChannelRegistry {
        ChannelRegistry::new(
            self.instantiate()
                .into_iter()
                .filter_map(|(enabled, channel)| enabled.then_some(channel)),
        )
    }

    /// Enable/configuration state of every channel, for `check` output.
    pub fn statuses(&self) -> Vec<ChannelStatus> {
        self.instantiate()
            .into_iter()
            .map(|(enabled, channel)| ChannelStatus {
                name: channel.name().to_string(),
                enabled,
                configured: channel.is_configured(),
                attachments: channel.supports_attachments(),
            })
            .collect()
    }
}

/// One row of the channel overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub enabled: bool,
    pub configured: bool,
    pub attachments: bool,
}

impl ChannelStatus {
    /// Enabled and configured: will take part in a dispatch.
    pub fn active(&self) -> bool {
        self.enabled && self.configured
    }
}

/// Truncate a message to fit a character limit, marking the cut.
pub(crate) fn truncate_message(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let suffix = "\n\n[truncated]";
    let budget = limit.saturating_sub(suffix.len());
    let truncated: String = text.chars().take(budget).collect();
    format!("{truncated}{suffix}")
}
