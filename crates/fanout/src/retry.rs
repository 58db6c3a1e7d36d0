//! Retry policy and the per-channel retry state machine.
//!
//! The policy is a pure value: given the index of a failed attempt and the
//! error it produced, it decides whether to try again and how long to wait.
//! [`RetryState`] carries the running attempt index and last error for one
//! channel and is driven by the dispatch engine around every send.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChannelError, ErrorKind};

/// How the base delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Always `base_delay`.
    Fixed,
    /// `base_delay * (attempt_index + 1)`.
    Linear,
    /// `base_delay * multiplier ^ attempt_index`.
    #[default]
    Exponential,
}

impl std::str::FromStr for RetryStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "linear" => Ok(Self::Linear),
            "exponential" | "exp" => Ok(Self::Exponential),
            other => Err(format!("unknown retry strategy: {other}")),
        }
    }
}

/// Retry policy for channel sends.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay unit for every strategy.
    pub base_delay: Duration,
    /// Hard cap on the computed delay, applied before jitter.
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
    /// Growth factor for [`RetryStrategy::Exponential`].
    pub multiplier: f64,
    /// Jitter is drawn uniformly from `[0, delay * jitter_fraction]`.
    pub jitter_fraction: f64,
    /// Extra scaling applied when the remote service is throttling us.
    pub rate_limit_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            strategy: RetryStrategy::Exponential,
            multiplier: 2.0,
            jitter_fraction: 0.5,
            rate_limit_multiplier: 2.0,
        }
    }
}

/// Why a retry sequence stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The failure can not be fixed by trying again.
    NonRetryable,
    /// All allowed attempts were used.
    Exhausted,
}

/// Verdict after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then run the next attempt.
    Retry { delay: Duration },
    /// The failed attempt is final.
    GiveUp(StopReason),
}

impl RetryPolicy {
    /// Create a policy with default delays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a policy with custom attempt count.
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::with_max_attempts(1)
    }

    fn attempts_allowed(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether an attempt with this index may be followed by another one.
    pub fn has_attempts_left(&self, attempt_index: u32) -> bool {
        attempt_index.saturating_add(1) < self.attempts_allowed()
    }

    /// Delay after the given failed attempt, capped but without jitter.
    pub fn base_delay_for(&self, attempt_index: u32) -> Duration {
        let raw = match self.strategy {
            RetryStrategy::Fixed => self.base_delay.as_secs_f64(),
            RetryStrategy::Linear => {
                self.base_delay.as_secs_f64() * f64::from(attempt_index.saturating_add(1))
            }
            RetryStrategy::Exponential => {
                let exp = i32::try_from(attempt_index).unwrap_or(i32::MAX);
                self.base_delay.as_secs_f64() * self.multiplier.powi(exp)
            }
        };

        Duration::try_from_secs_f64(raw)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay after a failed attempt, including throttling and jitter.
    pub fn delay_for(&self, attempt_index: u32, error: &ChannelError) -> Duration {
        self.delay_with_sample(attempt_index, error, rand::random::<f64>())
    }

    /// Same as [`RetryPolicy::delay_for`] with the jitter sample supplied.
    ///
    /// `sample` is clamped into `[0, 1]`.
    pub fn delay_with_sample(
        &self,
        attempt_index: u32,
        error: &ChannelError,
        sample: f64,
    ) -> Duration {
        let mut delay = self.base_delay_for(attempt_index);

        if error.kind == ErrorKind::RateLimited {
            let scaled = scale(delay, self.rate_limit_multiplier.max(1.0));
            let hinted = error.retry_after.unwrap_or_default();
            delay = scaled.max(hinted).min(self.max_delay);
        }

        let fraction = self.jitter_fraction.max(0.0) * sample.clamp(0.0, 1.0);
        delay.saturating_add(scale(delay, fraction))
    }

    /// Decide what follows a failed attempt.
    pub fn decide(&self, attempt_index: u32, error: &ChannelError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp(StopReason::NonRetryable);
        }
        if !self.has_attempts_left(attempt_index) {
            return RetryDecision::GiveUp(StopReason::Exhausted);
        }
        RetryDecision::Retry {
            delay: self.delay_for(attempt_index, error),
        }
    }

}

/// `delay * factor`, saturating at [`Duration::MAX`].
fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}

/// Retry bookkeeping for one channel during one dispatch.
#[derive(Debug)]
pub struct RetryState<'a> {
    policy: &'a RetryPolicy,
    attempt: u32,
    last_error: Option<ChannelError>,
    last_delay: Option<Duration>,
}

impl<'a> RetryState<'a> {
    pub fn new(policy: &'a RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_error: None,
            last_delay: None,
        }
    }

    /// 0-based index of the attempt about to run (or running).
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.attempts_allowed()
    }

    pub fn last_error(&self) -> Option<&ChannelError> {
        self.last_error.as_ref()
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.last_delay
    }

    /// Record a failure of the current attempt.
    ///
    /// On [`RetryDecision::Retry`] the state advances to the next attempt index;
    /// the caller is expected to wait the returned delay before running it.
    pub fn on_failure(&mut self, error: ChannelError) -> RetryDecision {
        let decision = self.policy.decide(self.attempt, &error);
        self.last_error = Some(error);
        match decision {
            RetryDecision::Retry { delay } => {
                self.attempt += 1;
                self.last_delay = Some(delay);
            }
            RetryDecision::GiveUp(_) => {
                self.last_delay = None;
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            strategy,
            jitter_fraction: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(10));
        assert_eq!(policy.strategy, RetryStrategy::Exponential);
        assert_eq!(policy.jitter_fraction, 0.5);
    }

    #[test]
    fn test_exponential_delays() {
        let policy = no_jitter(RetryStrategy::Exponential);
        assert_eq!(policy.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.base_delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.base_delay_for(4), Duration::from_secs(10));
        assert_eq!(policy.base_delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_linear_and_fixed_delays() {
        let linear = no_jitter(RetryStrategy::Linear);
        assert_eq!(linear.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(linear.base_delay_for(2), Duration::from_secs(3));

        let fixed = no_jitter(RetryStrategy::Fixed);
        assert_eq!(fixed.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(fixed.base_delay_for(5), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_jitter_bounds() {
        let policy = RetryPolicy::default();
        let err = ChannelError::transport("reset");
        for _ in 0..64 {
            let delay = policy.delay_for(2, &err);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(6));
        }
        assert_eq!(policy.delay_with_sample(2, &err, 0.0), Duration::from_secs(4));
        assert_eq!(policy.delay_with_sample(2, &err, 1.0), Duration::from_secs(6));
    }

    #[test]
    fn test_rate_limit_backs_off_harder() {
        let policy = no_jitter(RetryStrategy::Exponential);
        let plain = ChannelError::server("503");
        let throttled = ChannelError::rate_limited("429", None);
        assert_eq!(policy.delay_with_sample(0, &plain, 0.0), Duration::from_secs(1));
        assert_eq!(policy.delay_with_sample(0, &throttled, 0.0), Duration::from_secs(2));

        let hinted = ChannelError::rate_limited("429", Some(Duration::from_secs(7)));
        assert_eq!(policy.delay_with_sample(0, &hinted, 0.0), Duration::from_secs(7));

        let huge = ChannelError::rate_limited("429", Some(Duration::from_secs(600)));
        assert_eq!(policy.delay_with_sample(0, &huge, 0.0), Duration::from_secs(10));
    }

    #[test]
    fn test_decide_non_retryable_stops_immediately() {
        let policy = RetryPolicy::with_max_attempts(5);
        assert_eq!(
            policy.decide(0, &ChannelError::auth("bad token")),
            RetryDecision::GiveUp(StopReason::NonRetryable)
        );
        assert_eq!(
            policy.decide(0, &ChannelError::timeout("deadline")),
            RetryDecision::GiveUp(StopReason::NonRetryable)
        );
    }

    #[test]
    fn test_decide_exhausts_attempts() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::with_max_attempts(3)
        };
        let err = ChannelError::transport("reset");
        assert!(matches!(policy.decide(0, &err), RetryDecision::Retry { .. }));
        assert!(matches!(policy.decide(1, &err), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(2, &err), RetryDecision::GiveUp(StopReason::Exhausted));
    }

    #[test]
    fn test_zero_attempts_acts_as_one() {
        let policy = RetryPolicy::with_max_attempts(0);
        assert_eq!(
            policy.decide(0, &ChannelError::transport("reset")),
            RetryDecision::GiveUp(StopReason::Exhausted)
        );
        assert_eq!(
            RetryPolicy::no_retry().decide(0, &ChannelError::server("502")),
            RetryDecision::GiveUp(StopReason::Exhausted)
        );
    }

    #[test]
    fn test_huge_delays_saturate() {
        let huge = Duration::from_secs_f64(1.8e19);
        let policy = RetryPolicy {
            base_delay: huge,
            max_delay: huge,
            ..Default::default()
        };
        let err = ChannelError::transport("reset");
        assert_eq!(policy.delay_with_sample(0, &err, 1.0), Duration::MAX);
        assert_eq!(policy.delay_with_sample(0, &err, 0.0), huge);

        let throttled = ChannelError::rate_limited("429", Some(Duration::MAX));
        assert_eq!(policy.delay_with_sample(0, &throttled, 0.0), huge);
        assert_eq!(policy.delay_with_sample(3, &throttled, 1.0), Duration::MAX);
    }

    #[test]
    fn test_state_machine_advances() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(10),
            jitter_fraction: 0.0,
            ..RetryPolicy::with_max_attempts(3)
        };
        let mut state = RetryState::new(&policy);
        assert_eq!(state.attempt(), 0);

        let d = state.on_failure(ChannelError::server("502"));
        assert_eq!(d, RetryDecision::Retry { delay: Duration::from_millis(10) });
        assert_eq!(state.attempt(), 1);
        assert_eq!(state.last_delay(), Some(Duration::from_millis(10)));

        let d = state.on_failure(ChannelError::server("502"));
        assert_eq!(d, RetryDecision::Retry { delay: Duration::from_millis(20) });
        assert_eq!(state.attempt(), 2);

        let d = state.on_failure(ChannelError::server("503"));
        assert_eq!(d, RetryDecision::GiveUp(StopReason::Exhausted));
        assert_eq!(state.attempt(), 2);
        assert_eq!(state.last_error().map(|e| e.message.as_str()), Some("503"));
        assert_eq!(state.last_delay(), None);
    }

    #[test]
    fn test_strategy_from_str() {
        assert_eq!("Fixed".parse::<RetryStrategy>(), Ok(RetryStrategy::Fixed));
        assert_eq!(" linear ".parse::<RetryStrategy>(), Ok(RetryStrategy::Linear));
        assert_eq!("exp".parse::<RetryStrategy>(), Ok(RetryStrategy::Exponential));
        assert!("random".parse::<RetryStrategy>().is_err());
    }
}
