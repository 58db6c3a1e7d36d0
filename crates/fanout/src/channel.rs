//! The channel adapter abstraction.
//!
//! Each outbound backend (push service, mail transport, webhook) implements
//! [`Channel`]. The dispatch engine only ever talks to this trait.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;
use crate::request::Attachment;

/// Outcome of one send call.
pub type SendResult = std::result::Result<(), ChannelError>;

/// Trait for notification channel adapters.
///
/// Implementations must be safe to call concurrently with other adapters and
/// should bound their own network I/O; the engine additionally enforces its
/// own deadlines and abandons calls that overrun them.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique name of this channel instance.
    fn name(&self) -> &str;

    /// Whether [`Channel::send_with_attachments`] actually delivers files.
    fn supports_attachments(&self) -> bool {
        false
    }

    /// Whether all mandatory credentials are present.
    ///
    /// Channels reporting `false` are dropped when the registry is built.
    fn is_configured(&self) -> bool {
        true
    }

    /// Send a text-only notification.
    async fn send(&self, title: &str, content: &str) -> SendResult;

    /// Send a notification carrying attachments.
    ///
    /// Text-only channels keep the default, which ignores the files.
    async fn send_with_attachments(
        &self,
        title: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> SendResult {
        let _ = attachments;
        self.send(title, content).await
    }
}

/// Static description of a registered channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub supports_attachments: bool,
}
