//! The concurrent dispatch engine.
//!
//! One task per enabled channel is spawned into a [`JoinSet`]; a [`Semaphore`]
//! sized `min(channels, max_concurrency)` bounds how many of them send at the
//! same time. Each task drives its channel through the retry policy under a
//! per-channel timeout and always ends in a [`ChannelResult`]. Adapter panics
//! are caught per attempt, so one misbehaving channel can not take the
//! others down.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

use crate::channel::SendResult;
use crate::error::{ChannelError, DispatchError, ErrorKind, Result};
use crate::registry::{ChannelRegistry, RegisteredChannel};
use crate::report::{AttemptOutcome, ChannelResult, DispatchReport, ReportAggregator};
use crate::request::{DEFAULT_MAX_ATTACHMENT_BYTES, NotificationRequest};
use crate::retry::{RetryDecision, RetryPolicy, RetryState, StopReason};

/// Default upper bound on concurrently running channel sends.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Default budget for all attempts of one channel.
pub const DEFAULT_CHANNEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatch engine settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Upper bound on concurrently running channels. 0 acts as 1.
    pub max_concurrency: usize,
    /// Total time one channel may spend across all of its attempts,
    /// backoff delays included.
    pub per_channel_timeout: Duration,
    /// Optional limit for a single send call.
    pub attempt_timeout: Option<Duration>,
    /// Optional limit for the whole dispatch. Channels still pending when it
    /// passes are recorded as timed out.
    pub overall_deadline: Option<Duration>,
    /// Ceiling for the combined size of a request's attachments.
    pub max_attachment_bytes: usize,
    pub retry: RetryPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            per_channel_timeout: DEFAULT_CHANNEL_TIMEOUT,
            attempt_timeout: None,
            overall_deadline: None,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
            retry: RetryPolicy::default(),
        }
    }
}

impl DispatchConfig {
    /// Number of workers for a dispatch over `channel_count` channels.
    pub fn pool_size(&self, channel_count: usize) -> usize {
        channel_count.min(self.max_concurrency).max(1)
    }
}

/// Attempts recorded so far for one channel.
///
/// Shared between the running task and the collector so that a task cut off
/// by a timeout or the overall deadline still reports what it did.
#[derive(Debug, Default)]
struct AttemptLog {
    outcomes: Vec<AttemptOutcome>,
    in_flight: bool,
}

type SharedLog = Arc<Mutex<AttemptLog>>;

struct PendingChannel {
    name: String,
    log: SharedLog,
    started: Instant,
}

impl PendingChannel {
    /// Terminal result for a channel that never reached a verdict on its own.
    fn abandon(self, message: String) -> ChannelResult {
        let mut log = self.log.lock();
        if log.in_flight {
            log.outcomes.push(AttemptOutcome::timed_out(message.clone()));
            log.in_flight = false;
        }
        ChannelResult {
            channel_name: self.name,
            attempts: std::mem::take(&mut log.outcomes),
            outcome: AttemptOutcome::timed_out(message),
            duration: self.started.elapsed(),
        }
    }
}

/// Fans a notification out to every channel of a registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ChannelRegistry>,
    config: Arc<DispatchConfig>,
}

impl Dispatcher {
    /// Create a dispatcher with default settings.
    pub fn new(registry: ChannelRegistry) -> Self {
        Self::with_config(registry, DispatchConfig::default())
    }

    /// Create a dispatcher with custom settings.
    pub fn with_config(registry: ChannelRegistry, config: DispatchConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Deliver `request` through every enabled channel.
    ///
    /// Fails only when the request is invalid or no channel is enabled; every
    /// per-channel problem is reported inside the returned [`DispatchReport`].
    pub async fn dispatch(&self, request: NotificationRequest) -> Result<DispatchReport> {
        request.validate(self.config.max_attachment_bytes)?;

        let channels = self.registry.enabled_channels();
        if channels.is_empty() {
            return Err(DispatchError::NoChannels);
        }

        let started = Instant::now();
        // A deadline too far out to represent is no deadline at all.
        let deadline = self
            .config
            .overall_deadline
            .and_then(|d| tokio::time::Instant::now().checked_add(d));
        let pool_size = self.config.pool_size(channels.len());

        info!(
            title = %request.title(),
            channels = channels.len(),
            pool_size,
            attachments = request.attachments().len(),
            "Dispatching notification"
        );

        let request = Arc::new(request);
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<Id, PendingChannel> = HashMap::with_capacity(channels.len());

        for registered in channels {
            let log = SharedLog::default();
            let scheduled = Instant::now();
            let handle = tasks.spawn(run_channel(
                registered.clone(),
                request.clone(),
                self.config.clone(),
                semaphore.clone(),
                log.clone(),
                scheduled,
            ));
            pending.insert(
                handle.id(),
                PendingChannel {
                    name: registered.name().to_string(),
                    log,
                    started: scheduled,
                },
            );
        }

        let mut aggregator = ReportAggregator::started_at(started);

        loop {
            let joined = match deadline {
                Some(at) => tokio::select! {
                    joined = tasks.join_next_with_id() => joined,
                    _ = tokio::time::sleep_until(at) => {
                        aggregator.mark_deadline_exceeded();
                        break;
                    }
                },
                None => tasks.join_next_with_id().await,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    aggregator.record(result);
                }
                Err(e) => {
                    // Tasks only end abnormally if the runtime cancels them.
                    if let Some(channel) = pending.remove(&e.id()) {
                        warn!(channel = %channel.name, error = %e, "Channel task ended abnormally");
                        let name = channel.name.clone();
                        let attempts = std::mem::take(&mut channel.log.lock().outcomes);
                        aggregator.record(ChannelResult {
                            channel_name: name,
                            attempts,
                            outcome: AttemptOutcome::failure(
                                ErrorKind::Internal,
                                format!("channel task failed: {e}"),
                            ),
                            duration: channel.started.elapsed(),
                        });
                    }
                }
            }
        }

        if !tasks.is_empty() {
            warn!(
                pending = pending.len(),
                "Overall dispatch deadline exceeded, abandoning pending channels"
            );
            tasks.abort_all();
            while let Some(joined) = tasks.join_next_with_id().await {
                // A task may still have finished between the deadline and the abort.
                if let Ok((id, result)) = joined {
                    pending.remove(&id);
                    aggregator.record(result);
                }
            }
        }

        for (_, channel) in pending.drain() {
            let message = "overall dispatch deadline exceeded".to_string();
            aggregator.record(channel.abandon(message));
        }

        let report = aggregator.finish();
        info!(
            succeeded = report.succeeded_count,
            failed = report.failed_count,
            duration_ms = report.overall_duration.as_millis() as u64,
            "Dispatch finished"
        );

        Ok(report)
    }
}

/// One unit of work: every attempt for one channel.
///
/// The reported duration runs from `scheduled`, so it includes the wait for a
/// pool slot. The per-channel timeout only starts once a slot is held.
async fn run_channel(
    registered: RegisteredChannel,
    request: Arc<NotificationRequest>,
    config: Arc<DispatchConfig>,
    semaphore: Arc<Semaphore>,
    log: SharedLog,
    scheduled: Instant,
) -> ChannelResult {
    // The semaphore is never closed; treat a closed one as unbounded.
    let _permit = semaphore.acquire_owned().await.ok();

    let limit = config.per_channel_timeout;
    let run = run_attempts(&registered, &request, &config.retry, config.attempt_timeout, &log);

    let outcome = match tokio::time::timeout(limit, run).await {
        Ok(outcome) => outcome,
        Err(_) => {
            let message = format!("channel timed out after {}ms", limit.as_millis());
            warn!(channel = %registered.name(), "{}", message);
            let mut log = log.lock();
            if log.in_flight {
                log.outcomes.push(AttemptOutcome::timed_out(message.clone()));
                log.in_flight = false;
            }
            AttemptOutcome::timed_out(message)
        }
    };

    let attempts = std::mem::take(&mut log.lock().outcomes);
    ChannelResult {
        channel_name: registered.name().to_string(),
        attempts,
        outcome,
        duration: scheduled.elapsed(),
    }
}

async fn run_attempts(
    registered: &RegisteredChannel,
    request: &NotificationRequest,
    policy: &RetryPolicy,
    attempt_timeout: Option<Duration>,
    log: &SharedLog,
) -> AttemptOutcome {
    let name = registered.name();
    let with_attachments = request.has_attachments() && registered.supports_attachments();
    if request.has_attachments() && !with_attachments {
        debug!(channel = %name, "Channel does not carry attachments, sending text only");
    }

    let mut state = RetryState::new(policy);

    loop {
        let attempt = state.attempt();
        log.lock().in_flight = true;
        let result = attempt_once(registered, request, with_attachments, attempt_timeout).await;

        let err = match result {
            Ok(()) => {
                let mut log = log.lock();
                log.in_flight = false;
                log.outcomes.push(AttemptOutcome::Success);
                debug!(channel = %name, attempt = attempt + 1, "Notification delivered");
                return AttemptOutcome::Success;
            }
            Err(err) => err,
        };

        let outcome = AttemptOutcome::from(&err);
        {
            let mut log = log.lock();
            log.in_flight = false;
            log.outcomes.push(outcome.clone());
        }

        match state.on_failure(err) {
            RetryDecision::Retry { delay } => {
                warn!(
                    channel = %name,
                    attempt = attempt + 1,
                    max_attempts = state.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    error = %outcome.message().unwrap_or_default(),
                    "Send failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            RetryDecision::GiveUp(reason) => {
                let reason = match reason {
                    StopReason::NonRetryable => "non-retryable error",
                    StopReason::Exhausted => "retries exhausted",
                };
                warn!(
                    channel = %name,
                    attempts = attempt + 1,
                    reason,
                    error = %outcome.message().unwrap_or_default(),
                    "Send failed"
                );
                return outcome;
            }
        }
    }
}

/// A single send call with panic capture and the optional attempt timeout.
async fn attempt_once(
    registered: &RegisteredChannel,
    request: &NotificationRequest,
    with_attachments: bool,
    attempt_timeout: Option<Duration>,
) -> SendResult {
    let channel = registered.channel();
    let send = async {
        if with_attachments {
            channel
                .send_with_attachments(request.title(), request.content(), request.attachments())
                .await
        } else {
            channel.send(request.title(), request.content()).await
        }
    };
    let guarded = AssertUnwindSafe(send).catch_unwind();

    let caught = match attempt_timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(caught) => caught,
            Err(_) => {
                return Err(ChannelError::timeout(format!(
                    "attempt timed out after {}ms",
                    limit.as_millis()
                )));
            }
        },
        None => guarded.await,
    };

    caught.unwrap_or_else(|panic| {
        Err(ChannelError::internal(format!(
            "channel panicked: {}",
            panic_message(panic.as_ref())
        )))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;
    use crate::request::Attachment;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with the scripted errors in order, then succeeds.
    struct ScriptedChannel {
        name: &'static str,
        script: Vec<ChannelError>,
        calls: AtomicU32,
        attachment_calls: AtomicU32,
        attachments: bool,
        hang: Option<Duration>,
    }

    impl ScriptedChannel {
        fn new(name: &'static str, script: Vec<ChannelError>) -> Self {
            Self {
                name,
                script,
                calls: AtomicU32::new(0),
                attachment_calls: AtomicU32::new(0),
                attachments: false,
                hang: None,
            }
        }
    }

    #[async_trait]
    impl Channel for ScriptedChannel {
        fn name(&self) -> &str {
            self.name
        }

        fn supports_attachments(&self) -> bool {
            self.attachments
        }

        async fn send(&self, _title: &str, _content: &str) -> SendResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            if let Some(hang) = self.hang {
                tokio::time::sleep(hang).await;
            }
            match self.script.get(n) {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }

        async fn send_with_attachments(
            &self,
            title: &str,
            content: &str,
            _attachments: &[Attachment],
        ) -> SendResult {
            self.attachment_calls.fetch_add(1, Ordering::SeqCst);
            self.send(title, content).await
        }
    }

    struct PanickingChannel;

    #[async_trait]
    impl Channel for PanickingChannel {
        fn name(&self) -> &str {
            "panicky"
        }

        async fn send(&self, _title: &str, _content: &str) -> SendResult {
            panic!("adapter bug");
        }
    }

    fn fast_config() -> DispatchConfig {
        DispatchConfig {
            retry: RetryPolicy {
                base_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                ..RetryPolicy::default()
            },
            ..DispatchConfig::default()
        }
    }

    fn dispatcher(channels: Vec<Arc<dyn Channel>>, config: DispatchConfig) -> Dispatcher {
        Dispatcher::with_config(ChannelRegistry::new(channels), config)
    }

    #[test]
    fn test_pool_size() {
        let config = DispatchConfig::default();
        assert_eq!(config.pool_size(3), 3);
        assert_eq!(config.pool_size(25), 10);
        let zero = DispatchConfig {
            max_concurrency: 0,
            ..DispatchConfig::default()
        };
        assert_eq!(zero.pool_size(4), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let flaky = Arc::new(ScriptedChannel::new(
            "flaky",
            vec![ChannelError::transport("connection reset")],
        ));
        let d = dispatcher(vec![flaky.clone()], fast_config());

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        let result = report.get("flaky").unwrap();
        assert!(result.succeeded());
        assert_eq!(result.attempt_count(), 2);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_after_one_attempt() {
        let bad = Arc::new(ScriptedChannel::new("bad", vec![ChannelError::auth("401"); 5]));
        let d = dispatcher(vec![bad.clone()], fast_config());

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        let result = report.get("bad").unwrap();
        assert_eq!(result.attempt_count(), 1);
        assert_eq!(result.outcome.kind(), Some(ErrorKind::Auth));
        assert_eq!(bad.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panic_is_isolated() {
        let ok = Arc::new(ScriptedChannel::new("ok", vec![]));
        let d = dispatcher(vec![Arc::new(PanickingChannel), ok.clone()], fast_config());

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        assert_eq!(report.total(), 2);
        assert!(report.get("ok").unwrap().succeeded());

        let panicky = report.get("panicky").unwrap();
        assert_eq!(panicky.outcome.kind(), Some(ErrorKind::Internal));
        assert_eq!(panicky.attempt_count(), 1);
        assert!(panicky.error_message().unwrap().contains("adapter bug"));
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_terminal() {
        let mut slow = ScriptedChannel::new("slow", vec![]);
        slow.hang = Some(Duration::from_millis(500));
        let slow = Arc::new(slow);
        let config = DispatchConfig {
            attempt_timeout: Some(Duration::from_millis(20)),
            ..fast_config()
        };
        let d = dispatcher(vec![slow.clone()], config);

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        let result = report.get("slow").unwrap();
        assert_eq!(result.outcome.kind(), Some(ErrorKind::Timeout));
        assert_eq!(result.attempt_count(), 1);
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_channel_timeout_abandons_in_flight_attempt() {
        let mut slow = ScriptedChannel::new("slow", vec![]);
        slow.hang = Some(Duration::from_secs(5));
        let config = DispatchConfig {
            per_channel_timeout: Duration::from_millis(30),
            ..fast_config()
        };
        let d = dispatcher(vec![Arc::new(slow)], config);

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        let result = report.get("slow").unwrap();
        assert_eq!(
            result.outcome,
            AttemptOutcome::Failure {
                kind: ErrorKind::Timeout,
                message: "channel timed out after 30ms".to_string(),
                retryable: false,
            }
        );
        assert_eq!(result.attempt_count(), 1);
        assert!(!report.deadline_exceeded);
    }

    #[tokio::test]
    async fn test_overall_deadline_marks_pending_channels() {
        let fast = Arc::new(ScriptedChannel::new("fast", vec![]));
        let mut slow = ScriptedChannel::new("slow", vec![]);
        slow.hang = Some(Duration::from_secs(5));
        let config = DispatchConfig {
            overall_deadline: Some(Duration::from_millis(50)),
            ..fast_config()
        };
        let d = dispatcher(vec![fast, Arc::new(slow)], config);

        let started = Instant::now();
        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(report.deadline_exceeded);
        assert_eq!(report.total(), 2);
        assert!(report.get("fast").unwrap().succeeded());

        let slow = report.get("slow").unwrap();
        assert_eq!(slow.outcome.kind(), Some(ErrorKind::Timeout));
        assert_eq!(slow.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_deadline_is_ignored() {
        let channel = Arc::new(ScriptedChannel::new("bark", vec![]));
        let config = DispatchConfig {
            overall_deadline: Some(Duration::from_secs_f64(1.8e19)),
            ..fast_config()
        };
        let d = dispatcher(vec![channel], config);

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        assert!(report.all_succeeded());
        assert!(!report.deadline_exceeded);
    }

    #[tokio::test]
    async fn test_duration_includes_queue_wait() {
        let mut first = ScriptedChannel::new("first", vec![]);
        first.hang = Some(Duration::from_millis(60));
        let mut second = ScriptedChannel::new("second", vec![]);
        second.hang = Some(Duration::from_millis(60));
        let config = DispatchConfig {
            max_concurrency: 1,
            ..fast_config()
        };
        let d = dispatcher(vec![Arc::new(first), Arc::new(second)], config);

        let report = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap();
        assert_eq!(report.succeeded_count, 2);
        // Whichever channel queued second waited out the first one's send.
        let longest = ["first", "second"]
            .iter()
            .map(|n| report.get(n).unwrap().duration)
            .max()
            .unwrap();
        assert!(longest >= Duration::from_millis(120), "{longest:?}");
    }

    #[tokio::test]
    async fn test_attachments_routed_by_capability() {
        let mut mail = ScriptedChannel::new("smtp", vec![]);
        mail.attachments = true;
        let mail = Arc::new(mail);
        let text = Arc::new(ScriptedChannel::new("bark", vec![]));
        let d = dispatcher(vec![mail.clone(), text.clone()], fast_config());

        let request =
            NotificationRequest::new("t", "c").with_attachment(Attachment::new("log.txt", "hello"));
        let report = d.dispatch(request).await.unwrap();

        assert_eq!(report.succeeded_count, 2);
        assert_eq!(mail.attachment_calls.load(Ordering::SeqCst), 1);
        assert_eq!(text.attachment_calls.load(Ordering::SeqCst), 0);
        assert_eq!(text.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_channels() {
        let d = dispatcher(vec![], fast_config());
        let err = d.dispatch(NotificationRequest::new("t", "c")).await.unwrap_err();
        assert_eq!(err, DispatchError::NoChannels);
    }

    #[tokio::test]
    async fn test_validation_runs_before_channels() {
        let channel = Arc::new(ScriptedChannel::new("bark", vec![]));
        let d = dispatcher(vec![channel.clone()], fast_config());
        let err = d.dispatch(NotificationRequest::new("", "c")).await.unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
        assert_eq!(channel.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(boxed.as_ref()), "static");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
