//! Per-channel results and the aggregated dispatch report.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};

use crate::error::{ChannelError, DispatchError, ErrorKind};

fn as_millis<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Result of one attempt against one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Failure {
        kind: ErrorKind,
        message: String,
        retryable: bool,
    },
}

impl AttemptOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
        }
    }

    /// A deadline hit; always terminal regardless of the kind's usual retryability.
    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::Failure {
            kind: ErrorKind::Timeout,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { message, .. } => Some(message),
        }
    }
}

impl From<&ChannelError> for AttemptOutcome {
    fn from(err: &ChannelError) -> Self {
        Self::failure(err.kind, err.message.clone())
    }
}

/// Terminal record for one channel in one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelResult {
    pub channel_name: String,
    pub attempts: Vec<AttemptOutcome>,
    #[serde(rename = "final")]
    pub outcome: AttemptOutcome,
    /// Time from scheduling to verdict, including the wait for a pool slot.
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl ChannelResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.outcome.message()
    }
}

/// Condensed per-channel view for logs and CLI output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelSummary {
    pub channel: String,
    pub success: bool,
    pub attempts: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of one dispatch across every enabled channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub results: BTreeMap<String, ChannelResult>,
    pub succeeded_count: usize,
    pub failed_count: usize,
    #[serde(rename = "overall_duration_ms", serialize_with = "as_millis")]
    pub overall_duration: Duration,
    /// Set when the overall deadline cut the dispatch short.
    pub deadline_exceeded: bool,
    /// Top-level error for a request rejected before any channel ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchReport {
    /// Zero-channel report for a request that failed pre-flight checks.
    pub fn rejected(error: &DispatchError) -> Self {
        Self {
            results: BTreeMap::new(),
            succeeded_count: 0,
            failed_count: 0,
            overall_duration: Duration::ZERO,
            deadline_exceeded: false,
            error: Some(error.to_string()),
        }
    }

    pub fn get(&self, channel: &str) -> Option<&ChannelResult> {
        self.results.get(channel)
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.error.is_none() && self.failed_count == 0
    }

    pub fn succeeded_channels(&self) -> impl Iterator<Item = &str> {
        self.results
            .values()
            .filter(|r| r.succeeded())
            .map(|r| r.channel_name.as_str())
    }

    pub fn failed_channels(&self) -> impl Iterator<Item = &str> {
        self.results
            .values()
            .filter(|r| !r.succeeded())
            .map(|r| r.channel_name.as_str())
    }

    pub fn summary(&self) -> Vec<ChannelSummary> {
        self.results
            .values()
            .map(|r| ChannelSummary {
                channel: r.channel_name.clone(),
                success: r.succeeded(),
                attempts: r.attempt_count(),
                error: r.error_message().map(str::to_string),
            })
            .collect()
    }
}

/// Collects terminal channel results into a [`DispatchReport`].
#[derive(Debug)]
pub struct ReportAggregator {
    started: Instant,
    results: BTreeMap<String, ChannelResult>,
    deadline_exceeded: bool,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::started_at(Instant::now())
    }

    pub fn started_at(started: Instant) -> Self {
        Self {
            started,
            results: BTreeMap::new(),
            deadline_exceeded: false,
        }
    }

    /// Add a result; a later result for the same channel replaces the earlier one.
    pub fn record(&mut self, result: ChannelResult) {
        self.results.insert(result.channel_name.clone(), result);
    }

    pub fn contains(&self, channel: &str) -> bool {
        self.results.contains_key(channel)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn mark_deadline_exceeded(&mut self) {
        self.deadline_exceeded = true;
    }

    pub fn finish(self) -> DispatchReport {
        let succeeded_count = self.results.values().filter(|r| r.succeeded()).count();
        let failed_count = self.results.len() - succeeded_count;

        DispatchReport {
            results: self.results,
            succeeded_count,
            failed_count,
            overall_duration: self.started.elapsed(),
            deadline_exceeded: self.deadline_exceeded,
            error: None,
        }
    }
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new()
    }
}
