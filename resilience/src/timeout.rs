//! # Timeout Manager
//!
//! Races an operation against a deadline clamped into `[min, max]`. On
//! expiry the operation's future is dropped and a retryable
//! `timeout_error` is returned; no timer outlives the call.
//!
//! [`TimeoutManager::cleanup`] ends every race in flight at once by
//! cancelling the current [`CancellationToken`] generation.

use config::TimeoutSettings;
use errors::{ClassifiedError, Classify};
use metrics::{counter, histogram};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    pub default_timeout: Duration,
    pub min_timeout: Duration,
    pub max_timeout: Duration
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(30)
        }
    }
}

impl From<&TimeoutSettings> for TimeoutConfig {
    fn from(settings: &TimeoutSettings) -> Self {
        Self {
            default_timeout: settings.default_timeout(),
            min_timeout: settings.min_timeout(),
            max_timeout: settings.max_timeout()
        }
    }
}

impl TimeoutConfig {
    /// Deadline actually used for a request: the requested value (or the
    /// default) clamped into `[min_timeout, max_timeout]`.
    pub fn resolve(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_timeout)
            .max(self.min_timeout)
            .min(self.max_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeoutStats {
    pub active_timeouts: u64,
    pub completed_operations: u64,
    pub timed_out_operations: u64,
    pub cancelled_operations: u64,
    pub average_execution_ms: f64,
    pub default_timeout_ms: u64
}

impl TimeoutStats {
    /// Share of finished races that hit their deadline.
    pub fn timeout_ratio(&self) -> f64 {
        let finished = self.completed_operations + self.timed_out_operations;
        if finished == 0 {
            return 0.0;
        }
        self.timed_out_operations as f64 / finished as f64
    }
}

#[derive(Debug)]
pub struct TimeoutManager {
    config: RwLock<TimeoutConfig>,
    generation: Mutex<CancellationToken>,
    active: AtomicU64,
    completed: AtomicU64,
    timed_out: AtomicU64,
    cancelled: AtomicU64,
    total_execution_us: AtomicU64
}

impl Default for TimeoutManager {
    fn default() -> Self {
        Self::new(TimeoutConfig::default())
    }
}

impl TimeoutManager {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config: RwLock::new(config),
            generation: Mutex::new(CancellationToken::new()),
            active: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            total_execution_us: AtomicU64::new(0)
        }
    }

    pub fn config(&self) -> TimeoutConfig {
        self.config.read().clone()
    }

    pub fn resolve(&self, requested: Option<Duration>) -> Duration {
        self.config.read().resolve(requested)
    }

    /// Applies to calls started after this returns.
    pub fn set_config(&self, config: TimeoutConfig) {
        *self.config.write() = config;
    }

    /// Await `operation` for at most the resolved deadline.
    pub async fn execute<Fut, T, E>(
        &self,
        operation: Fut,
        timeout: Option<Duration>
    ) -> Result<T, ClassifiedError>
    where
        Fut: Future<Output = Result<T, E>>,
        E: Classify
    {
        let deadline = self.resolve(timeout);
        let token = self.generation.lock().clone();
        let _active = ActiveGuard::enter(&self.active);
        let started = Instant::now();

        tokio::select! {
            biased;

            () = token.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Operation cancelled by timeout cleanup");
                Err(ClassifiedError::timeout("operation cancelled during timeout cleanup"))
            }
            result = tokio::time::timeout(deadline, operation) => match result {
                Ok(outcome) => {
                    self.record_completion(started.elapsed());
                    outcome.map_err(Classify::classify)
                }
                Err(_) => {
                    self.timed_out.fetch_add(1, Ordering::Relaxed);
                    counter!("operation_timeouts_total").increment(1);
                    let deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                    tracing::warn!(timeout_ms = deadline_ms, "Operation timed out");
                    Err(ClassifiedError::timeout(format!(
                        "operation timed out after {deadline_ms}ms"
                    )))
                }
            }
        }
    }

    fn record_completion(&self, elapsed: Duration) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.total_execution_us.fetch_add(
            u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            Ordering::Relaxed
        );
        histogram!("operation_duration_seconds").record(elapsed.as_secs_f64());
    }

    /// Cancel every race in flight. Safe to call repeatedly; later calls
    /// start from a fresh generation.
    pub fn cleanup(&self) {
        let previous = std::mem::replace(&mut *self.generation.lock(), CancellationToken::new());
        previous.cancel();
    }

    /// Cancel in-flight races and clear the counters.
    pub fn reset(&self) {
        self.cleanup();
        self.completed.store(0, Ordering::Relaxed);
        self.timed_out.store(0, Ordering::Relaxed);
        self.cancelled.store(0, Ordering::Relaxed);
        self.total_execution_us.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> TimeoutStats {
        let completed = self.completed.load(Ordering::Relaxed);
        let total_us = self.total_execution_us.load(Ordering::Relaxed);
        let average_execution_ms = if completed == 0 {
            0.0
        } else {
            total_us as f64 / completed as f64 / 1000.0
        };
        TimeoutStats {
            active_timeouts: self.active.load(Ordering::Relaxed),
            completed_operations: completed,
            timed_out_operations: self.timed_out.load(Ordering::Relaxed),
            cancelled_operations: self.cancelled.load(Ordering::Relaxed),
            average_execution_ms,
            default_timeout_ms: u64::try_from(self.config.read().default_timeout.as_millis())
                .unwrap_or(u64::MAX)
        }
    }
}

struct ActiveGuard<'a>(&'a AtomicU64);

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::ErrorKind;
    use std::sync::Arc;

    fn manager() -> TimeoutManager {
        TimeoutManager::new(TimeoutConfig {
            default_timeout: Duration::from_millis(500),
            min_timeout: Duration::from_millis(100),
            max_timeout: Duration::from_secs(2)
        })
    }

    #[test]
    fn test_resolve_clamps() {
        let config = manager().config();
        assert_eq!(config.resolve(None), Duration::from_millis(500));
        assert_eq!(
            config.resolve(Some(Duration::from_millis(10))),
            Duration::from_millis(100)
        );
        assert_eq!(
            config.resolve(Some(Duration::from_secs(60))),
            Duration::from_secs(2)
        );
        assert_eq!(
            config.resolve(Some(Duration::from_millis(750))),
            Duration::from_millis(750)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_before_deadline() {
        let manager = manager();
        let value = manager
            .execute(
                async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, ClassifiedError>(42)
                },
                None
            )
            .await
            .unwrap();
        assert_eq!(value, 42);

        let stats = manager.stats();
        assert_eq!(stats.completed_operations, 1);
        assert_eq!(stats.timed_out_operations, 0);
        assert_eq!(stats.active_timeouts, 0);
        assert!(stats.average_execution_ms >= 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_resolving_operation_times_out_at_clamped_deadline() {
        let manager = manager();
        let started = Instant::now();
        let err = manager
            .execute(
                std::future::pending::<Result<(), ClassifiedError>>(),
                Some(Duration::from_millis(10))
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.retryable);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(100));
        assert!(waited < Duration::from_millis(105));
        assert_eq!(manager.stats().timed_out_operations, 1);
        assert_eq!(manager.stats().active_timeouts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_classified() {
        let manager = manager();
        let err = manager
            .execute(async { Err::<(), _>("401 Unauthorized") }, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
        assert_eq!(manager.stats().completed_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_cancels_in_flight() {
        let manager = Arc::new(manager());
        let racing = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .execute(std::future::pending::<Result<(), ClassifiedError>>(), None)
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(manager.stats().active_timeouts, 1);

        manager.cleanup();
        manager.cleanup();

        let err = racing.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(manager.stats().cancelled_operations, 1);
        assert_eq!(manager.stats().active_timeouts, 0);

        let after = manager
            .execute(async { Ok::<_, ClassifiedError>("fresh") }, None)
            .await;
        assert_eq!(after.unwrap(), "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_config_and_reset() {
        let manager = manager();
        manager.set_config(TimeoutConfig {
            default_timeout: Duration::from_millis(1500),
            min_timeout: Duration::from_millis(200),
            max_timeout: Duration::from_secs(3)
        });
        assert_eq!(manager.resolve(None), Duration::from_millis(1500));
        assert_eq!(
            manager.resolve(Some(Duration::from_millis(150))),
            Duration::from_millis(200)
        );

        let _ = manager
            .execute(std::future::pending::<Result<(), ClassifiedError>>(), None)
            .await;
        assert_eq!(manager.stats().timed_out_operations, 1);
        assert_eq!(manager.stats().timeout_ratio(), 1.0);

        manager.reset();
        let stats = manager.stats();
        assert_eq!(stats.timed_out_operations, 0);
        assert_eq!(stats.default_timeout_ms, 1500);
    }
}
