//! SMTP email channel.
//!
//! The message is sent from and to the configured mailbox. Attachments become
//! `multipart/mixed` parts.

use std::time::Duration;

use async_trait::async_trait;
use fanout::{Attachment, Channel, ChannelError, SendResult};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{
        Attachment as MailAttachment, Mailbox, MultiPart, SinglePart, header::ContentType,
    },
    transport::smtp::{self, authentication::Credentials},
};
use tracing::debug;

use crate::utils::http_client::install_rustls_provider;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply codes meaning the credentials were refused.
const AUTH_REPLY_CODES: &[&str] = &["530", "534", "535"];

/// SMTP channel configuration.
#[derive(Debug, Clone, Default)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    /// Explicit port; the transport default applies when unset.
    pub port: Option<u16>,
    /// Implicit TLS when true, STARTTLS otherwise.
    pub ssl: bool,
    pub email: String,
    pub password: String,
    /// Display name for the mailbox.
    pub name: String,
}

impl SmtpConfig {
    /// Split `host[:port]`.
    pub fn split_server(server: &str) -> (String, Option<u16>) {
        match server.rsplit_once(':') {
            Some((host, port)) => match port.parse() {
                Ok(port) => (host.to_string(), Some(port)),
                Err(_) => (server.to_string(), None),
            },
            None => (server.to_string(), None),
        }
    }
}

pub struct SmtpChannel {
    config: SmtpConfig,
}

impl SmtpChannel {
    pub const NAME: &'static str = "smtp";

    pub fn new(config: SmtpConfig) -> Self {
        install_rustls_provider();
        Self { config }
    }

    fn mailbox(&self) -> Result<Mailbox, ChannelError> {
        let address = self
            .config
            .email
            .parse()
            .map_err(|e| ChannelError::validation(format!("smtp: invalid address: {e}")))?;
        let name = Some(self.config.name.clone()).filter(|n| !n.is_empty());
        Ok(Mailbox::new(name, address))
    }

    fn build_message(
        &self,
        title: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> Result<Message, ChannelError> {
        let mailbox = self.mailbox()?;
        let builder = Message::builder()
            .from(mailbox.clone())
            .to(mailbox)
            .subject(title);

        let message = if attachments.is_empty() {
            builder
                .header(ContentType::TEXT_PLAIN)
                .body(content.to_string())
        } else {
            let mut parts = MultiPart::mixed().singlepart(SinglePart::plain(content.to_string()));
            for attachment in attachments {
                let content_type = ContentType::parse(attachment.content_type()).map_err(|e| {
                    ChannelError::validation(format!(
                        "smtp: bad content type for {}: {e}",
                        attachment.filename()
                    ))
                })?;
                parts = parts.singlepart(
                    MailAttachment::new(attachment.filename().to_string())
                        .body(attachment.data().to_vec(), content_type),
                );
            }
            builder.multipart(parts)
        };

        message.map_err(|e| ChannelError::validation(format!("smtp: could not build message: {e}")))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, ChannelError> {
        let builder = if self.config.ssl {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
        }
        .map_err(classify)?;

        let mut builder = builder
            .credentials(Credentials::new(
                self.config.email.clone(),
                self.config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT));
        if let Some(port) = self.config.port {
            builder = builder.port(port);
        }
        Ok(builder.build())
    }

    async fn deliver(&self, message: Message) -> SendResult {
        self.transport()?.send(message).await.map_err(classify)?;
        debug!(host = %self.config.host, "SMTP notification sent");
        Ok(())
    }
}

/// Map an SMTP failure onto the delivery error taxonomy.
fn classify(error: smtp::Error) -> ChannelError {
    let message = format!("smtp: {error}");
    let code = error.status().map(|c| c.to_string());

    if code.as_deref().is_some_and(|c| AUTH_REPLY_CODES.contains(&c)) {
        ChannelError::auth(message)
    } else if error.is_permanent() {
        ChannelError::invalid_request(message)
    } else if error.is_transient() {
        ChannelError::server(message)
    } else {
        ChannelError::transport(message)
    }
}

#[async_trait]
impl Channel for SmtpChannel {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports_attachments(&self) -> bool {
        true
    }

    fn is_configured(&self) -> bool {
        !self.config.host.is_empty()
            && !self.config.email.is_empty()
            && !self.config.password.is_empty()
    }

    async fn send(&self, title: &str, content: &str) -> SendResult {
        let message = self.build_message(title, content, &[])?;
        self.deliver(message).await
    }

    async fn send_with_attachments(
        &self,
        title: &str,
        content: &str,
        attachments: &[Attachment],
    ) -> SendResult {
        let message = self.build_message(title, content, attachments)?;
        self.deliver(message).await
    }
}
