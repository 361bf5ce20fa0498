// Retry-with-backoff for stream backend lookups.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SourceError;

/// How many times a backend endpoint is asked again, and how long to wait between asks.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Spread retries by up to half the base delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// First attempt, then retries after 1s and 2s.
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt + 1`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter {
            delay.saturating_add(self.jitter_within(self.max_delay.saturating_sub(delay)))
        } else {
            delay
        }
    }

    fn jitter_within(&self, headroom: Duration) -> Duration {
        let limit = (self.base_delay / 2).min(headroom);
        let limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
        if limit_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..limit_ms))
    }
}

/// Outcome of one attempt.
pub enum RetryAction<T> {
    Success(T),
    /// Transient failure (network, 5xx, timeout).
    Retry(SourceError),
    /// Nothing more to get from this endpoint (4xx, malformed body).
    Fail(SourceError),
}

/// Run `operation` until it succeeds, fails permanently or runs out of retries.
///
/// `operation` gets the 0-based attempt number. Cancellation is observed both while
/// an attempt is in flight and while backing off.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, SourceError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0;
    loop {
        let action = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SourceError::Cancelled),
            action = operation(attempt) => action,
        };

        let err = match action {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) if attempt >= policy.max_retries => return Err(err),
            RetryAction::Retry(err) => err,
        };

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        warn!(
            attempt,
            max_retries = policy.max_retries,
            delay = ?delay,
            error = %err,
            "Backend lookup failed, retrying"
        );

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SourceError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn no_jitter(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
            jitter: false,
        }
    }

    #[test]
    fn delay_grows_and_respects_cap() {
        let policy = no_jitter(10);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(8));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(8));
    }

    #[test]
    fn delay_with_jitter_does_not_exceed_max_cap() {
        let policy = RetryPolicy {
            jitter: true,
            ..no_jitter(3)
        };
        for attempt in 0..8 {
            assert!(policy.delay_for_attempt(attempt) <= policy.max_delay);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_with_increasing_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();
        let start = Instant::now();

        let result = retry_with_backoff(&no_jitter(2), &token, |_attempt| {
            let calls = Arc::clone(&calls);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    RetryAction::Retry(SourceError::NoStream("transient".into()))
                } else {
                    RetryAction::Success("ok")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s of backoff.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let token = CancellationToken::new();

        let result: Result<(), _> = retry_with_backoff(&no_jitter(2), &token, |_| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                RetryAction::Fail(SourceError::NoStream("gone".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(SourceError::NoStream(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_backoff() {
        let token = CancellationToken::new();
        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        });

        let result: Result<(), _> = retry_with_backoff(&no_jitter(5), &token, |_| async {
            RetryAction::Retry(SourceError::NoStream("again".into()))
        })
        .await;

        assert!(matches!(result, Err(SourceError::Cancelled)));
    }
}
