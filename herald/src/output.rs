//! Rendering of dispatch and check results for stdout.

use std::fmt::Write;

use fanout::DispatchReport;
use serde::Serialize;

use crate::channels::ChannelStatus;
use crate::cli::OutputFormat;
use crate::config::{ConfigIssue, MaskedCredential};
use crate::error::Result;
use crate::service::Outcome;

/// Everything `herald check` reports.
#[derive(Debug, Serialize)]
pub struct CheckReport<'a> {
    pub channels: &'a [ChannelStatus],
    pub issues: &'a [ConfigIssue],
    pub credentials: &'a [MaskedCredential],
}

impl CheckReport<'_> {
    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.active()).count()
    }
}

pub fn render_outcome(outcome: &Outcome, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        OutputFormat::Pretty => Ok(match outcome {
            Outcome::Skipped { reason } => format!("Skipped: {reason}\n"),
            Outcome::Delivered { report } => pretty_report(report),
        }),
    }
}

pub fn render_check(report: &CheckReport<'_>, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        OutputFormat::Pretty => Ok(pretty_check(report)),
    }
}

fn mark(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn pretty_report(report: &DispatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Delivered to {}/{} channels in {} ms{}",
        report.succeeded_count,
        report.total(),
        report.overall_duration.as_millis(),
        if report.deadline_exceeded {
            " (deadline exceeded)"
        } else {
            ""
        }
    );
    for row in report.summary() {
        let status = if row.success { "ok" } else { "FAILED" };
        let _ = write!(out, "  {:<12} {:<6} attempts={}", row.channel, status, row.attempts);
        if let Some(error) = &row.error {
            let _ = write!(out, "  {error}");
        }
        out.push('\n');
    }
    out
}

fn pretty_check(report: &CheckReport<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<12} {:<8} {:<11} attachments", "channel", "enabled", "configured");
    for status in report.channels {
        let _ = writeln!(
            out,
            "{:<12} {:<8} {:<11} {}",
            status.name,
            mark(status.enabled),
            mark(status.configured),
            mark(status.attachments)
        );
    }
    let _ = writeln!(out, "\n{} channel(s) active", report.active_count());

    if !report.credentials.is_empty() {
        out.push_str("\nCredentials:\n");
        for cred in report.credentials {
            let _ = writeln!(out, "  {} = {}", cred.key, cred.masked);
        }
    }

    if !report.issues.is_empty() {
        out.push_str("\nProblems:\n");
        for issue in report.issues {
            let _ = writeln!(out, "  {issue}");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::SkipReason;
    use fanout::{ChannelResult, ReportAggregator};
    use std::time::Duration;

    fn report() -> DispatchReport {
        let mut agg = ReportAggregator::new();
        agg.record(ChannelResult {
            channel_name: "bark".to_string(),
            attempts: vec![fanout::AttemptOutcome::Success],
            outcome: fanout::AttemptOutcome::Success,
            duration: Duration::from_millis(12),
        });
        let failure = fanout::AttemptOutcome::failure(fanout::ErrorKind::Auth, "bad token");
        agg.record(ChannelResult {
            channel_name: "gotify".to_string(),
            attempts: vec![failure.clone()],
            outcome: failure,
            duration: Duration::from_millis(30),
        });
        agg.finish()
    }

    #[test]
    fn test_pretty_report() {
        let text = render_outcome(&Outcome::Delivered { report: report() }, OutputFormat::Pretty).unwrap();
        assert!(text.starts_with("Delivered to 1/2 channels"));
        assert!(text.contains("bark"));
        assert!(text.contains("FAILED"));
        assert!(text.contains("bad token"));
    }

    #[test]
    fn test_json_report() {
        let text = render_outcome(&Outcome::Delivered { report: report() }, OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "delivered");
        assert_eq!(value["report"]["succeeded_count"], 1);
        assert_eq!(value["report"]["results"]["gotify"]["final"]["status"], "failure");
    }

    #[test]
    fn test_skipped() {
        let text = render_outcome(
            &Outcome::Skipped {
                reason: SkipReason::EmptyContent,
            },
            OutputFormat::Pretty,
        )
        .unwrap();
        assert_eq!(text, "Skipped: content is empty\n");
    }

    #[test]
    fn test_check_output() {
        let channels = vec![ChannelStatus {
            name: "telegram".to_string(),
            enabled: true,
            configured: false,
            attachments: true,
        }];
        let issues = vec![ConfigIssue::new("TG_PROXY_PORT", "invalid port")];
        let credentials = vec![MaskedCredential {
            key: "TG_BOT_TOKEN",
            masked: "123****xyz".to_string(),
        }];
        let report = CheckReport {
            channels: &channels,
            issues: &issues,
            credentials: &credentials,
        };
        assert_eq!(report.active_count(), 0);

        let text = render_check(&report, OutputFormat::Pretty).unwrap();
        assert!(text.contains("telegram"));
        assert!(text.contains("TG_BOT_TOKEN = 123****xyz"));
        assert!(text.contains("TG_PROXY_PORT: invalid port"));

        let json = render_check(&report, OutputFormat::Json).unwrap();
        assert!(json.contains("\"configured\": false"));
    }
}
