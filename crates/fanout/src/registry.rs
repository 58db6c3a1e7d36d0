//! The read-only set of channels taking part in dispatches.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::channel::{Channel, ChannelDescriptor};

/// A channel admitted into the registry under a unique name.
#[derive(Clone)]
pub struct RegisteredChannel {
    name: String,
    channel: Arc<dyn Channel>,
}

impl RegisteredChannel {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    pub fn supports_attachments(&self) -> bool {
        self.channel.supports_attachments()
    }

    pub fn descriptor(&self) -> ChannelDescriptor {
        ChannelDescriptor {
            name: self.name.clone(),
            supports_attachments: self.supports_attachments(),
        }
    }
}

impl std::fmt::Debug for RegisteredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredChannel")
            .field("name", &self.name)
            .field("supports_attachments", &self.supports_attachments())
            .finish()
    }
}

/// Immutable set of enabled channels.
///
/// Channels lacking mandatory credentials are excluded here so that a
/// dispatch never runs into a configured-but-broken adapter.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: Vec<RegisteredChannel>,
    excluded: Vec<String>,
}

impl ChannelRegistry {
    /// Build a registry, keeping declaration order.
    ///
    /// Duplicate names are disambiguated with their declaration index.
    pub fn new(channels: impl IntoIterator<Item = Arc<dyn Channel>>) -> Self {
        let mut registry = Self::default();
        let mut used: HashSet<String> = HashSet::new();

        for (idx, channel) in channels.into_iter().enumerate() {
            let base = channel.name().to_string();

            if !channel.is_configured() {
                warn!(channel = %base, "Channel is missing mandatory credentials, excluding");
                registry.excluded.push(base);
                continue;
            }

            let name = if used.insert(base.clone()) {
                base
            } else {
                let mut suffix = idx;
                let disambiguated = loop {
                    let candidate = format!("{}#{}", base, suffix);
                    if used.insert(candidate.clone()) {
                        break candidate;
                    }
                    suffix += 1;
                };
                warn!(
                    "Duplicate channel name detected (name={}), using {}",
                    base, disambiguated
                );
                disambiguated
            };

            registry.channels.push(RegisteredChannel { name, channel });
        }

        info!(
            "Channel registry initialized with {} channels ({} excluded)",
            registry.channels.len(),
            registry.excluded.len()
        );

        registry
    }

    /// Enabled channels in declaration order.
    pub fn enabled_channels(&self) -> &[RegisteredChannel] {
        &self.channels
    }

    /// Names of channels dropped for missing credentials.
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredChannel> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Whether the named channel can carry attachments. Unknown names are `false`.
    pub fn supports_attachments(&self, name: &str) -> bool {
        self.get(name).is_some_and(RegisteredChannel::supports_attachments)
    }

    pub fn descriptors(&self) -> Vec<ChannelDescriptor> {
        self.channels.iter().map(RegisteredChannel::descriptor).collect()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
