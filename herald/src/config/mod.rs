//! Environment configuration.
//!
//! Settings come from process environment variables, optionally seeded from
//! a `.env` file. [`AppConfig::from_lookup`] takes any lookup function so the
//! whole loader can be exercised without touching the real environment.

mod channels;
pub mod env;

use std::path::PathBuf;
use std::time::Duration;

use fanout::{DispatchConfig, RetryPolicy, RetryStrategy};
use serde::Serialize;
use tracing::debug;

use crate::channels::ChannelSettings;
use crate::error::Result;
pub use env::{Env, MaskedCredential, parse_bool};

/// Default directory for attachments referenced by filename only.
pub const DEFAULT_ATTACHMENTS_DIR: &str = "./temp_attachments";

/// A configuration problem that does not prevent startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub key: String,
    pub message: String,
}

impl ConfigIssue {
    pub fn new(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.key, self.message)
    }
}

/// Dispatch engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    pub max_concurrency: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub retry_strategy: RetryStrategy,
    pub channel_timeout: Duration,
    pub attempt_timeout: Option<Duration>,
    pub deadline: Option<Duration>,
    pub max_attachment_mb: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            max_concurrency: fanout::engine::DEFAULT_MAX_CONCURRENCY,
            retry_attempts: retry.max_attempts,
            retry_delay: retry.base_delay,
            max_retry_delay: retry.max_delay,
            retry_strategy: retry.strategy,
            channel_timeout: fanout::engine::DEFAULT_CHANNEL_TIMEOUT,
            attempt_timeout: None,
            deadline: None,
            max_attachment_mb: 25,
        }
    }
}

impl DispatchSettings {
    fn load(env: &Env<'_>) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            max_concurrency: env
                .parse("MAX_CONCURRENT_NOTIFICATIONS")?
                .unwrap_or(defaults.max_concurrency),
            retry_attempts: env
                .parse("NOTIFICATION_RETRY_ATTEMPTS")?
                .unwrap_or(defaults.retry_attempts),
            retry_delay: env
                .seconds("NOTIFICATION_RETRY_DELAY")?
                .unwrap_or(defaults.retry_delay),
            max_retry_delay: env
                .seconds("NOTIFICATION_MAX_RETRY_DELAY")?
                .unwrap_or(defaults.max_retry_delay),
            retry_strategy: env
                .parse("NOTIFICATION_RETRY_STRATEGY")?
                .unwrap_or(defaults.retry_strategy),
            channel_timeout: env
                .seconds("NOTIFICATION_TIMEOUT")?
                .unwrap_or(defaults.channel_timeout),
            attempt_timeout: env.seconds("NOTIFICATION_ATTEMPT_TIMEOUT")?,
            deadline: env.seconds("NOTIFICATION_DEADLINE")?,
            max_attachment_mb: env
                .parse("MAX_ATTACHMENT_MB")?
                .unwrap_or(defaults.max_attachment_mb),
        })
    }

    /// Engine configuration derived from these settings.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            max_concurrency: self.max_concurrency,
            per_channel_timeout: self.channel_timeout,
            attempt_timeout: self.attempt_timeout,
            overall_deadline: self.deadline,
            max_attachment_bytes: self.max_attachment_mb.saturating_mul(1024 * 1024),
            retry: RetryPolicy {
                max_attempts: self.retry_attempts,
                base_delay: self.retry_delay,
                max_delay: self.max_retry_delay,
                strategy: self.retry_strategy,
                ..RetryPolicy::default()
            },
        }
    }

    fn check(&self, issues: &mut Vec<ConfigIssue>) {
        if self.max_concurrency == 0 {
            issues.push(ConfigIssue::new(
                "MAX_CONCURRENT_NOTIFICATIONS",
                "0 is treated as 1",
            ));
        }
        if self.retry_attempts == 0 {
            issues.push(ConfigIssue::new(
                "NOTIFICATION_RETRY_ATTEMPTS",
                "0 is treated as 1 (no retries)",
            ));
        }
        if self.max_retry_delay < self.retry_delay {
            issues.push(ConfigIssue::new(
                "NOTIFICATION_MAX_RETRY_DELAY",
                "smaller than NOTIFICATION_RETRY_DELAY; every delay will be capped",
            ));
        }
        if self.channel_timeout.is_zero() {
            issues.push(ConfigIssue::new(
                "NOTIFICATION_TIMEOUT",
                "0 makes every channel time out immediately",
            ));
        }
        if self.deadline.is_some_and(|d| d.is_zero()) {
            issues.push(ConfigIssue::new(
                "NOTIFICATION_DEADLINE",
                "0 leaves no time for any channel",
            ));
        }
    }
}

/// Pre-dispatch behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorSettings {
    /// Titles that are never dispatched.
    pub skip_titles: Vec<String>,
    /// Append a hitokoto quote to the content.
    pub hitokoto: bool,
    pub attachments_dir: PathBuf,
}

impl Default for BehaviorSettings {
    fn default() -> Self {
        Self {
            skip_titles: Vec::new(),
            hitokoto: false,
            attachments_dir: PathBuf::from(DEFAULT_ATTACHMENTS_DIR),
        }
    }
}

impl BehaviorSettings {
    fn load(env: &Env<'_>) -> Result<Self> {
        Ok(Self {
            skip_titles: env
                .get("SKIP_PUSH_TITLE")
                .map(|raw| {
                    raw.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            hitokoto: env.flag("HITOKOTO")?.unwrap_or(false),
            attachments_dir: PathBuf::from(env.get_or("ATTACHMENTS_DIR", DEFAULT_ATTACHMENTS_DIR)),
        })
    }
}

/// Fully loaded application configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub dispatch: DispatchSettings,
    pub channels: ChannelSettings,
    pub behavior: BehaviorSettings,
    issues: Vec<ConfigIssue>,
    credentials: Vec<MaskedCredential>,
}

impl AppConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => debug!(error = %e, "Ignoring unreadable .env file"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut env = Env::new(&lookup);
        let mut issues = Vec::new();

        let dispatch = DispatchSettings::load(&env)?;
        let behavior = BehaviorSettings::load(&env)?;
        let channels = channels::load(&mut env, &mut issues)?;
        dispatch.check(&mut issues);

        Ok(Self {
            dispatch,
            channels,
            behavior,
            issues,
            credentials: env.into_credentials(),
        })
    }

    /// Format problems found while loading. Never fatal.
    pub fn validate(&self) -> &[ConfigIssue] {
        &self.issues
    }

    /// Credentials that were found, masked.
    pub fn credentials(&self) -> &[MaskedCredential] {
        &self.credentials
    }
}
