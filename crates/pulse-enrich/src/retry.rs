//! Retry policy: exponential back-off with jitter under a bounded budget.
//!
//! The policy only decides; it never sleeps or re-executes. Re-arming and
//! the deferred re-dispatch happen in the supervisor, so a failure handler
//! never busy-retries inline.

use std::time::Duration;

use crate::processor::ErrorClass;

/// Decision for one failed (record, stage) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-arm the pair and re-dispatch it after `delay`.
    Retry { delay: Duration },
    /// The stage stays terminally failed and surfaces in the job error log.
    Abandon,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Decide whether a failed pair should be retried.
    ///
    /// `retry_count` is the number of re-arms already spent on the pair.
    /// Permanent errors are never retried. Transient errors retry with
    /// `base * 2^retry_count` capped at `max_backoff_ms`, ±25% jitter,
    /// while the budget lasts.
    #[must_use]
    pub fn decide(&self, retry_count: u32, class: ErrorClass) -> RetryDecision {
        if class == ErrorClass::Permanent || retry_count >= self.max_retries {
            return RetryDecision::Abandon;
        }
        let computed = self
            .backoff_base_ms
            .saturating_mul(1u64 << retry_count.min(10));
        let capped = computed.min(self.max_backoff_ms);
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            clippy::cast_precision_loss
        )]
        let delay_ms = (capped as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
        RetryDecision::Retry {
            delay: Duration::from_millis(delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.decide(0, ErrorClass::Permanent),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn transient_error_within_budget_is_retried() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.decide(0, ErrorClass::Transient),
            RetryDecision::Retry { .. }
        ));
    }

    #[test]
    fn exhausted_budget_abandons() {
        let policy = RetryPolicy {
            max_retries: 3,
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.decide(3, ErrorClass::Transient),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn delay_grows_and_respects_the_cap() {
        let policy = RetryPolicy {
            max_retries: 20,
            backoff_base_ms: 1_000,
            max_backoff_ms: 60_000,
        };
        for retry_count in 0..12 {
            match policy.decide(retry_count, ErrorClass::Transient) {
                RetryDecision::Retry { delay } => {
                    let ms = u64::try_from(delay.as_millis()).unwrap();
                    // cap (60s) plus 25% jitter headroom
                    assert!(ms <= 75_000, "delay {ms}ms over cap at retry {retry_count}");
                    // base * 2^n minus 25% jitter floor, pre-cap
                    let floor = (1_000u64 << retry_count.min(10)).min(60_000) * 3 / 4;
                    assert!(ms >= floor, "delay {ms}ms under floor at retry {retry_count}");
                }
                RetryDecision::Abandon => panic!("unexpected abandon at retry {retry_count}"),
            }
        }
    }

    #[test]
    fn zero_base_gives_zero_delay() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 0,
            max_backoff_ms: 0,
        };
        assert_eq!(
            policy.decide(2, ErrorClass::Transient),
            RetryDecision::Retry {
                delay: Duration::ZERO
            }
        );
    }
}
