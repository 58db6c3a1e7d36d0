//! Inbound event normalization.
//!
//! Turns a `repository_dispatch` event (or a bare payload object) into a
//! [`NotificationRequest`]:
//!
//! ```json
//! {
//!   "client_payload": {
//!     "title": "Check-in result",
//!     "content": "ok",
//!     "source": "glados",
//!     "timestamp": "2024-05-01T08:00:00+08:00",
//!     "attachments": [
//!       {"filename": "log.txt", "content": "line 1", "encoding": "text"},
//!       {"filename": "shot.png", "content": "iVBORw0...", "encoding": "base64",
//!        "content_type": "image/png"},
//!       {"filename": "report.csv"}
//!     ]
//!   }
//! }
//! ```
//!
//! Attachments without inline content are read from the attachment directory.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, NaiveDateTime, Utc};
use fanout::{Attachment, NotificationRequest};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::utils::filename::attachment_basename;

/// Title used when the payload carries none.
pub const DEFAULT_TITLE: &str = "Notification";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Encoding {
    #[default]
    Text,
    Base64,
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    filename: String,
    content: Option<String>,
    #[serde(default)]
    encoding: Encoding,
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    title: Option<String>,
    content: Option<String>,
    source: Option<String>,
    timestamp: Option<String>,
    #[serde(default)]
    attachments: Vec<RawAttachment>,
}

/// Parse event JSON text into a request.
pub async fn from_json_str(text: &str, attachments_dir: &Path) -> Result<NotificationRequest> {
    let value: Value = serde_json::from_str(text)?;
    normalize(value, attachments_dir).await
}

/// Normalize an already parsed event.
pub async fn normalize(event: Value, attachments_dir: &Path) -> Result<NotificationRequest> {
    let payload = match event {
        Value::Object(mut map) => match map.remove("client_payload") {
            Some(inner @ Value::Object(_)) => inner,
            Some(_) => return Err(Error::payload("client_payload must be an object")),
            None => Value::Object(map),
        },
        _ => return Err(Error::payload("event must be a JSON object")),
    };

    let raw: RawPayload = serde_json::from_value(payload)
        .map_err(|e| Error::payload(format!("malformed payload: {e}")))?;

    let mut request = NotificationRequest::new(
        raw.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        raw.content.unwrap_or_default(),
    );

    if let Some(source) = raw.source.filter(|s| !s.trim().is_empty()) {
        request = request.with_source(source);
    }

    if let Some(raw_ts) = raw.timestamp.filter(|s| !s.trim().is_empty()) {
        match parse_timestamp(&raw_ts) {
            Some(ts) => request = request.with_timestamp(ts),
            None => warn!(timestamp = %raw_ts, "Ignoring unparseable timestamp"),
        }
    }

    for entry in raw.attachments {
        if let Some(attachment) = load_attachment(entry, attachments_dir).await? {
            request = request.with_attachment(attachment);
        }
    }

    Ok(request)
}

/// RFC 3339 first, then ISO-8601 without an offset (read as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

async fn load_attachment(entry: RawAttachment, dir: &Path) -> Result<Option<Attachment>> {
    let filename = attachment_basename(&entry.filename).ok_or_else(|| {
        Error::validation(format!("attachment name {:?} is not a usable filename", entry.filename))
    })?;

    let data = match entry.content {
        Some(content) => match entry.encoding {
            Encoding::Text => content.into_bytes(),
            Encoding::Base64 => STANDARD
                .decode(content.trim())
                .map_err(|e| Error::validation(format!("attachment {filename}: invalid base64: {e}")))?,
        },
        None => {
            let path = dir.join(&filename);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    debug!(path = %path.display(), bytes = data.len(), "Loaded attachment from disk");
                    data
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %path.display(), "Attachment file not found, skipping");
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
    };

    let mut attachment = Attachment::new(filename, data);
    if let Some(content_type) = entry.content_type {
        attachment = attachment.with_content_type(content_type);
    }
    Ok(Some(attachment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn nowhere() -> &'static Path {
        Path::new("/nonexistent-attachments")
    }

    #[tokio::test]
    async fn test_envelope_and_bare_payload() {
        let envelope = json!({"action": "notify", "client_payload": {"title": "T", "content": "C"}});
        let request = normalize(envelope, nowhere()).await.unwrap();
        assert_eq!(request.title(), "T");
        assert_eq!(request.content(), "C");

        let bare = json!({"title": "T2", "source": "glados"});
        let request = normalize(bare, nowhere()).await.unwrap();
        assert_eq!(request.title(), "T2");
        assert_eq!(request.content(), "");
        assert_eq!(request.source(), Some("glados"));
    }

    #[tokio::test]
    async fn test_title_defaults_only_when_absent() {
        let request = normalize(json!({"content": "x"}), nowhere()).await.unwrap();
        assert_eq!(request.title(), DEFAULT_TITLE);

        let request = normalize(json!({"title": "", "content": "x"}), nowhere()).await.unwrap();
        assert_eq!(request.title(), "");
        assert!(request.validate(usize::MAX).is_err());
    }

    #[tokio::test]
    async fn test_rejects_non_objects() {
        assert!(matches!(
            normalize(json!([1, 2]), nowhere()).await,
            Err(Error::Payload(_))
        ));
        assert!(matches!(
            normalize(json!({"client_payload": "x"}), nowhere()).await,
            Err(Error::Payload(_))
        ));
        assert!(matches!(
            from_json_str("{not json", nowhere()).await,
            Err(Error::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_inline_attachments() {
        let event = json!({
            "title": "T",
            "attachments": [
                {"filename": "log.txt", "content": "line 1"},
                {"filename": "../../img.bin", "content": "AAEC", "encoding": "base64",
                 "content_type": "image/png"}
            ]
        });
        let request = normalize(event, nowhere()).await.unwrap();
        let attachments = request.attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[0].data().as_ref(), b"line 1");
        assert_eq!(attachments[0].content_type(), "application/octet-stream");
        assert_eq!(attachments[1].filename(), "img.bin");
        assert_eq!(attachments[1].data().as_ref(), &[0u8, 1, 2]);
        assert_eq!(attachments[1].content_type(), "image/png");
    }

    #[tokio::test]
    async fn test_corrupt_base64_rejects_request() {
        let event = json!({
            "attachments": [{"filename": "a.bin", "content": "!!!", "encoding": "base64"}]
        });
        let err = normalize(event, nowhere()).await.unwrap_err();
        assert!(err.is_rejection());
    }

    #[tokio::test]
    async fn test_attachments_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("report.csv"), "a,b\n").unwrap();

        let event = json!({
            "attachments": [{"filename": "report.csv"}, {"filename": "missing.txt"}]
        });
        let request = normalize(event, dir.path()).await.unwrap();
        assert_eq!(request.attachments().len(), 1);
        assert_eq!(request.attachments()[0].data().as_ref(), b"a,b\n");
    }

    #[test]
    fn test_parse_timestamp() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-05-01T08:00:00+08:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T00:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-05-01T00:00:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_dropped() {
        let request = normalize(json!({"timestamp": "soon"}), nowhere()).await.unwrap();
        assert_eq!(request.timestamp(), None);
    }
}
