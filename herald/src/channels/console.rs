//! Console channel: prints the notification to standard output.

use std::io::Write;

use async_trait::async_trait;
use fanout::{Channel, ChannelError, SendResult};

/// Console channel configuration.
#[derive(Debug, Clone, Default)]
pub struct ConsoleConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
}

/// Console notification channel.
#[derive(Debug, Default)]
pub struct ConsoleChannel;

impl ConsoleChannel {
    pub const NAME: &'static str = "console";

    pub fn new() -> Self {
        Self
    }

    fn render(title: &str, content: &str) -> String {
        if content.is_empty() {
            format!("{title}\n")
        } else {
            format!("{title}\n\n{content}\n")
        }
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let text = Self::render(title, content);
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(text.as_bytes())
            .and_then(|_| stdout.flush())
            .map_err(|e| ChannelError::internal(format!("console: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render() {
        assert_eq!(ConsoleChannel::render("Title", "Body"), "Title\n\nBody\n");
        assert_eq!(ConsoleChannel::render("Title", ""), "Title\n");
    }

    #[tokio::test]
    async fn test_console_send() {
        let channel = ConsoleChannel::new();
        assert!(channel.is_configured());
        assert!(!channel.supports_attachments());
        assert!(channel.send("Title", "Body").await.is_ok());
    }
}
