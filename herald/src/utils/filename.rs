//! Attachment filename handling.

use std::path::Path;

/// Characters that are invalid in Windows filenames.
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Reduce a client-supplied attachment name to a safe bare filename.
///
/// Directory components are dropped (so `../../etc/passwd` becomes `passwd`),
/// control and reserved characters are replaced with `_`, and an empty result
/// yields `None`.
pub fn attachment_basename(name: &str) -> Option<String> {
    // Treat both separators as path separators regardless of platform.
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let last = Path::new(last)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default();

    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_control() || INVALID_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_is_kept() {
        assert_eq!(attachment_basename("report.pdf").as_deref(), Some("report.pdf"));
        assert_eq!(attachment_basename("签到日志.txt").as_deref(), Some("签到日志.txt"));
    }

    #[test]
    fn test_directories_are_stripped() {
        assert_eq!(attachment_basename("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(attachment_basename("C:\\logs\\run.log").as_deref(), Some("run.log"));
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(attachment_basename(""), None);
        assert_eq!(attachment_basename("dir/"), None);
        assert_eq!(attachment_basename(".."), None);
        assert_eq!(attachment_basename("a?b").as_deref(), Some("a_b"));
    }
}
