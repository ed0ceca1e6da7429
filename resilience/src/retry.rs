//! # Retry Manager
//!
//! Re-runs a failing operation with exponential backoff and jitter. Only
//! retryable classified errors are retried; everything else is returned
//! after the first attempt.

use crate::circuit_breaker::CircuitBreaker;
use config::RetrySettings;
use errors::{ClassifiedError, Classify, ErrorKind};
use metrics::counter;
use parking_lot::RwLock;
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const JITTER_RATIO: f64 = 0.1;
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Immutable retry settings for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10)
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
            max_delay: settings.max_delay()
        }
    }
}

impl RetryPolicy {
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Un-jittered delay after failed attempt `attempt` (1-based):
    /// `min(base_delay * 2^(attempt - 1), max_delay)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Backoff with ±10% jitter, never below 1ms and never above
    /// `max_delay`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.backoff_delay(attempt);
        let factor = 1.0 + rand::rng().random_range(-JITTER_RATIO..=JITTER_RATIO);
        Duration::from_secs_f64(base.as_secs_f64() * factor)
            .min(self.max_delay)
            .max(MIN_DELAY)
    }

    /// Delay before the next attempt after `err`.
    ///
    /// Rate limits back off twice as hard and never sooner than the server's
    /// `Retry-After`, still capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, err: &ClassifiedError) -> Duration {
        let delay = self.jittered_delay(attempt);
        if err.kind != ErrorKind::RateLimit {
            return delay;
        }
        delay
            .saturating_mul(2)
            .max(err.retry_after.unwrap_or_default())
            .min(self.max_delay)
            .max(MIN_DELAY)
    }
}

#[derive(Debug, Default)]
struct RetryMetrics {
    operations: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    succeeded_after_retry: AtomicU64,
    exhausted: AtomicU64,
    non_retryable: AtomicU64
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub operations: u64,
    pub attempts: u64,
    pub retries: u64,
    pub succeeded_after_retry: u64,
    pub exhausted: u64,
    pub non_retryable: u64
}

impl RetryStats {
    /// Share of operations that ran out of attempts.
    pub fn exhaustion_ratio(&self) -> f64 {
        if self.operations == 0 {
            return 0.0;
        }
        self.exhausted as f64 / self.operations as f64
    }
}

#[derive(Debug, Default)]
pub struct RetryManager {
    policy: RwLock<RetryPolicy>,
    metrics: RetryMetrics
}

impl RetryManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            metrics: RetryMetrics::default()
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy.read().clone()
    }

    pub fn set_policy(&self, policy: RetryPolicy) {
        *self.policy.write() = policy;
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts. The last classified error is returned.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify
    {
        self.run(operation, "operation").await
    }

    /// Like [`execute`](Self::execute), with every attempt guarded by
    /// `breaker`. An open circuit ends the loop at once: its rejection is
    /// not retryable.
    pub async fn execute_with_circuit_breaker<F, Fut, T, E>(
        &self,
        operation: F,
        breaker: &CircuitBreaker,
        context: &str
    ) -> Result<T, ClassifiedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify
    {
        let operation = &operation;
        self.run(move || breaker.execute(move || operation()), context)
            .await
    }

    async fn run<F, Fut, T, E>(&self, operation: F, context: &str) -> Result<T, ClassifiedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify
    {
        let policy = self.policy();
        let max_attempts = policy.effective_attempts();
        self.metrics.operations.fetch_add(1, Ordering::Relaxed);

        let mut attempt = 0;
        loop {
            attempt += 1;
            self.metrics.attempts.fetch_add(1, Ordering::Relaxed);

            let err = match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        self.metrics
                            .succeeded_after_retry
                            .fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(operation = context, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => e.classify()
            };

            if !err.retryable {
                self.metrics.non_retryable.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    operation = context,
                    attempt,
                    kind = %err.kind,
                    "Not retrying non-retryable error"
                );
                return Err(err);
            }

            if attempt >= max_attempts {
                self.metrics.exhausted.fetch_add(1, Ordering::Relaxed);
                counter!("retry_exhausted_total", "operation" => context.to_string()).increment(1);
                tracing::warn!(
                    operation = context,
                    attempts = attempt,
                    error = %err,
                    "Retry attempts exhausted"
                );
                return Err(err);
            }

            let delay = policy.delay_for(attempt, &err);
            self.metrics.retries.fetch_add(1, Ordering::Relaxed);
            counter!(
                "retry_attempts_total",
                "operation" => context.to_string(),
                "kind" => err.kind.as_str()
            )
            .increment(1);
            tracing::debug!(
                operation = context,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                kind = %err.kind,
                "Retrying after backoff"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub fn stats(&self) -> RetryStats {
        let policy = self.policy();
        RetryStats {
            max_attempts: policy.max_attempts,
            base_delay_ms: u64::try_from(policy.base_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(policy.max_delay.as_millis()).unwrap_or(u64::MAX),
            operations: self.metrics.operations.load(Ordering::Relaxed),
            attempts: self.metrics.attempts.load(Ordering::Relaxed),
            retries: self.metrics.retries.load(Ordering::Relaxed),
            succeeded_after_retry: self.metrics.succeeded_after_retry.load(Ordering::Relaxed),
            exhausted: self.metrics.exhausted.load(Ordering::Relaxed),
            non_retryable: self.metrics.non_retryable.load(Ordering::Relaxed)
        }
    }

    /// Clear the counters. The policy is kept.
    pub fn reset(&self) {
        self.metrics.operations.store(0, Ordering::Relaxed);
        self.metrics.attempts.store(0, Ordering::Relaxed);
        self.metrics.retries.store(0, Ordering::Relaxed);
        self.metrics.succeeded_after_retry.store(0, Ordering::Relaxed);
        self.metrics.exhausted.store(0, Ordering::Relaxed);
        self.metrics.non_retryable.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitState};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicU32;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1)
        }
    }

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let p = policy(5);
        assert_eq!(p.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(p.backoff_delay(4), Duration::from_millis(800));
        assert_eq!(p.backoff_delay(5), Duration::from_secs(1));
        assert_eq!(p.backoff_delay(200), Duration::from_secs(1));
    }

    #[test]
    fn test_rate_limit_backs_off_harder() {
        let p = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10)
        };
        let limited = ClassifiedError::rate_limited("429", None);
        let delay = p.delay_for(1, &limited);
        assert!(delay >= Duration::from_millis(180));
        assert!(delay <= Duration::from_millis(220));

        let with_hint = ClassifiedError::rate_limited("429", Some(Duration::from_secs(3)));
        assert_eq!(p.delay_for(1, &with_hint), Duration::from_secs(3));

        let huge_hint = ClassifiedError::rate_limited("429", Some(Duration::from_secs(60)));
        assert_eq!(p.delay_for(1, &huge_hint), Duration::from_secs(10));
    }

    proptest! {
        #[test]
        fn test_jitter_stays_in_bounds(
            base_ms in 1u64..5_000,
            max_ms in 1u64..20_000,
            attempt in 1u32..12
        ) {
            let p = RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_millis(max_ms)
            };
            let delay = p.jittered_delay(attempt);
            prop_assert!(delay >= MIN_DELAY);
            prop_assert!(delay <= p.max_delay.max(MIN_DELAY));
            let floor = p.backoff_delay(attempt).mul_f64(1.0 - JITTER_RATIO);
            prop_assert!(delay + Duration::from_micros(1) >= floor.min(p.max_delay));
        }

        #[test]
        fn test_next_delay_not_below_previous_base(
            base_ms in 1u64..1_000,
            attempt in 1u32..8
        ) {
            let p = RetryPolicy {
                max_attempts: 10,
                base_delay: Duration::from_millis(base_ms),
                max_delay: Duration::from_secs(3600)
            };
            let next = p.jittered_delay(attempt + 1);
            prop_assert!(next + Duration::from_micros(1) >= p.backoff_delay(attempt));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_bound() {
        let manager = RetryManager::new(policy(3));
        let calls = AtomicU32::new(0);

        let err = manager
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ClassifiedError::network("reset"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let stats = manager.stats();
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.exhausted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_runs_once() {
        let manager = RetryManager::new(policy(5));
        let calls = AtomicU32::new(0);

        let err = manager
            .execute(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ClassifiedError::auth("bad token").with_status(401))
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(manager.stats().non_retryable, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_and_one_attempts_run_once() {
        for attempts in [0, 1] {
            let manager = RetryManager::new(policy(attempts));
            let calls = AtomicU32::new(0);
            let result = manager
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClassifiedError::timeout("slow"))
                })
                .await;
            assert!(result.is_err());
            assert_eq!(calls.load(Ordering::SeqCst), 1);
            assert_eq!(manager.stats().retries, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failure() {
        let manager = RetryManager::new(policy(3));
        let calls = AtomicU32::new(0);

        let value = manager
            .execute(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ClassifiedError::network("blip"))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(manager.stats().succeeded_after_retry, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleeps_between_attempts() {
        let manager = RetryManager::new(policy(2));
        let started = tokio::time::Instant::now();
        let _ = manager
            .execute(|| async { Err::<(), _>(ClassifiedError::network("reset")) })
            .await;
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(90));
        assert!(waited <= Duration::from_millis(111));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_short_circuits_retries() {
        let manager = RetryManager::new(policy(5));
        let breaker = CircuitBreaker::new(
            "vectorize_retrieve",
            CircuitBreakerConfig {
                failure_threshold: 2,
                reset_timeout: Duration::from_secs(60),
                minimum_requests: 1
            }
        );
        let calls = AtomicU32::new(0);

        let err = manager
            .execute_with_circuit_breaker(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClassifiedError::network("reset"))
                },
                &breaker,
                "retrieve"
            )
            .await
            .unwrap_err();

        assert!(err.is_circuit_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(manager.stats().attempts, 3);
    }

    #[test]
    fn test_set_policy() {
        let manager = RetryManager::new(policy(3));
        manager.set_policy(policy(6));
        assert_eq!(manager.policy().max_attempts, 6);
        assert_eq!(manager.stats().max_attempts, 6);
    }
}
