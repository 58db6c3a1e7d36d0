//! Notification request and attachment values.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{DispatchError, Result};

/// Content type used when an attachment does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Default ceiling for the combined size of all attachments (25 MiB).
pub const DEFAULT_MAX_ATTACHMENT_BYTES: usize = 25 * 1024 * 1024;

/// A file carried alongside a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    filename: String,
    #[serde(skip)]
    data: Bytes,
    content_type: String,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    /// Set the MIME type. Blank values keep the generic binary type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        let content_type = content_type.into();
        if !content_type.trim().is_empty() {
            self.content_type = content_type;
        }
        self
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// One logical notification event.
///
/// Built once per inbound event and never mutated afterwards; the dispatch
/// engine shares it read-only between all channel tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    title: String,
    content: String,
    source: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    attachments: Vec<Attachment>,
}

impl NotificationRequest {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source: None,
            timestamp: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Replace the body text, keeping everything else.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_attachments(mut self, attachments: impl IntoIterator<Item = Attachment>) -> Self {
        self.attachments.extend(attachments);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }

    /// Combined size of every attachment payload in bytes.
    pub fn attachment_bytes(&self) -> usize {
        self.attachments.iter().map(Attachment::len).sum()
    }

    /// Check the request before any channel sees it.
    pub fn validate(&self, max_attachment_bytes: usize) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(DispatchError::validation("title must not be empty"));
        }

        if let Some(pos) = self
            .attachments
            .iter()
            .position(|a| a.filename.trim().is_empty())
        {
            return Err(DispatchError::validation(format!(
                "attachment #{} has an empty filename",
                pos + 1
            )));
        }

        let total = self.attachment_bytes();
        if total > max_attachment_bytes {
            return Err(DispatchError::validation(format!(
                "attachments total {} bytes, exceeding the {} byte limit",
                total, max_attachment_bytes
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_defaults_to_binary_type() {
        let a = Attachment::new("a.bin", vec![1u8, 2, 3]);
        assert_eq!(a.content_type(), DEFAULT_CONTENT_TYPE);
        assert_eq!(a.len(), 3);

        let a = a.with_content_type("  ");
        assert_eq!(a.content_type(), DEFAULT_CONTENT_TYPE);

        let a = a.with_content_type("text/plain");
        assert_eq!(a.content_type(), "text/plain");
    }

    #[test]
    fn test_validate_accepts_empty_content() {
        let req = NotificationRequest::new("Checkin", "");
        assert!(req.validate(DEFAULT_MAX_ATTACHMENT_BYTES).is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_title() {
        let req = NotificationRequest::new("   ", "body");
        assert!(matches!(
            req.validate(DEFAULT_MAX_ATTACHMENT_BYTES),
            Err(DispatchError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unnamed_attachment() {
        let req = NotificationRequest::new("t", "c").with_attachment(Attachment::new("", vec![0u8]));
        let err = req.validate(DEFAULT_MAX_ATTACHMENT_BYTES).unwrap_err();
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn test_validate_enforces_total_size() {
        let req = NotificationRequest::new("t", "c")
            .with_attachment(Attachment::new("a", vec![0u8; 600]))
            .with_attachment(Attachment::new("b", vec![0u8; 500]));
        assert_eq!(req.attachment_bytes(), 1100);
        assert!(req.validate(1100).is_ok());
        assert!(req.validate(1099).is_err());
    }

    #[test]
    fn test_builder_keeps_order() {
        let ts = Utc::now();
        let req = NotificationRequest::new("t", "c")
            .with_source("glados")
            .with_timestamp(ts)
            .with_attachments([Attachment::new("1", vec![]), Attachment::new("2", vec![])]);
        assert_eq!(req.source(), Some("glados"));
        assert_eq!(req.timestamp(), Some(ts));
        let names: Vec<_> = req.attachments().iter().map(|a| a.filename()).collect();
        assert_eq!(names, ["1", "2"]);
    }
}
