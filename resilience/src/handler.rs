//! # Error Handler
//!
//! Composes the resilience layers around an operation:
//!
//! ```text
//! retry -> circuit breaker (per attempt) -> timeout (per attempt) -> operation
//! ```
//!
//! and applies the fallback policy once they are exhausted: operations
//! registered as degradable resolve to `None` instead of an error.
//!
//! The breaker still acts as the outer guard: each attempt is admitted by
//! it first, and a `circuit_open` rejection is not retryable, so an open
//! breaker ends the whole call before any further attempt or backoff.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
use crate::retry::{RetryManager, RetryPolicy, RetryStats};
use crate::timeout::{TimeoutConfig, TimeoutManager, TimeoutStats};
use chrono::{DateTime, Utc};
use config::EnrichmentConfig;
use dashmap::DashMap;
use errors::{ClassifiedError, Classify};
use metrics::counter;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operations below this count are too few to judge ratios on.
const HEALTH_MIN_OPERATIONS: u64 = 10;
const HEALTH_DEGRADED_RATIO: f64 = 0.2;

/// Operation name whose failures degrade to "no enrichment".
pub const DEFAULT_DEGRADABLE_OPERATION: &str = "enrich_message";

/// Who is calling and how long each attempt may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// Caller-facing operation, matched against the degradable set.
    pub operation: String,
    /// Breaker key; calls sharing a class share a breaker.
    pub operation_class: String,
    pub correlation_id: Option<String>,
    /// Requested per-attempt deadline, clamped by the timeout manager.
    pub timeout: Option<Duration>
}

impl ExecutionContext {
    pub fn new(operation: impl Into<String>, operation_class: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            operation_class: operation_class.into(),
            correlation_id: None,
            timeout: None
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResilienceConfig {
    pub timeout: TimeoutConfig,
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerConfig,
    pub enable_fallback: bool,
    pub degradable_operations: Vec<String>
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self::from(&EnrichmentConfig::default())
    }
}

impl From<&EnrichmentConfig> for ResilienceConfig {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            timeout: TimeoutConfig::from(&config.timeout),
            retry: RetryPolicy::from(&config.retry),
            circuit_breaker: CircuitBreakerConfig::from(&config.circuit_breaker),
            enable_fallback: config.features.fallback,
            degradable_operations: vec![DEFAULT_DEGRADABLE_OPERATION.to_string()]
        }
    }
}

/// Live-reconfigurable subset. `None` leaves a setting unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub timeout: Option<TimeoutConfig>,
    pub retry: Option<RetryPolicy>,
    pub enable_fallback: Option<bool>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub breakers: Vec<CircuitBreakerStats>,
    pub retry: RetryStats,
    pub timeouts: TimeoutStats,
    pub fallbacks: u64,
    pub fallback_enabled: bool,
    pub timestamp: DateTime<Utc>
}

#[derive(Debug)]
struct FallbackPolicy {
    enabled: bool,
    degradable: HashSet<String>
}

impl FallbackPolicy {
    fn applies_to(&self, operation: &str) -> bool {
        self.enabled && self.degradable.contains(operation)
    }
}

pub struct ErrorHandler {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    breaker_config: CircuitBreakerConfig,
    retry: RetryManager,
    timeouts: TimeoutManager,
    fallback: RwLock<Arc<FallbackPolicy>>,
    fallbacks: AtomicU64
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(ResilienceConfig::default())
    }
}

impl ErrorHandler {
    pub fn new(config: ResilienceConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            breaker_config: config.circuit_breaker,
            retry: RetryManager::new(config.retry),
            timeouts: TimeoutManager::new(config.timeout),
            fallback: RwLock::new(Arc::new(FallbackPolicy {
                enabled: config.enable_fallback,
                degradable: config.degradable_operations.into_iter().collect()
            })),
            fallbacks: AtomicU64::new(0)
        }
    }

    /// Breaker for `operation_class`, created on first use.
    pub fn breaker(&self, operation_class: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.get(operation_class) {
            return existing.value().clone();
        }
        self.breakers
            .entry(operation_class.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    operation_class,
                    self.breaker_config.clone()
                ))
            })
            .value()
            .clone()
    }

    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry
    }

    pub fn timeout_manager(&self) -> &TimeoutManager {
        &self.timeouts
    }

    /// Run `operation` through every resilience layer.
    ///
    /// Returns `Ok(None)` when the layers are exhausted and the fallback
    /// policy covers `ctx.operation`; the classified error otherwise.
    /// Settings are read once when the call starts.
    pub async fn execute_with_resilience<F, Fut, T, E>(
        &self,
        operation: F,
        ctx: &ExecutionContext
    ) -> Result<Option<T>, ClassifiedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify
    {
        let fallback = self.fallback.read().clone();
        let deadline = self.timeouts.resolve(ctx.timeout);
        let breaker = self.breaker(&ctx.operation_class);

        let timeouts = &self.timeouts;
        let operation = &operation;
        let result = self
            .retry
            .execute_with_circuit_breaker(
                move || timeouts.execute(operation(), Some(deadline)),
                &breaker,
                &ctx.operation
            )
            .await;

        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if fallback.applies_to(&ctx.operation) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                counter!(
                    "resilience_fallbacks_total",
                    "operation" => ctx.operation.clone(),
                    "kind" => err.kind.as_str()
                )
                .increment(1);
                tracing::warn!(
                    operation = %ctx.operation,
                    operation_class = %ctx.operation_class,
                    correlation_id = ctx.correlation_id.as_deref().unwrap_or("-"),
                    kind = %err.kind,
                    severity = %err.severity,
                    error = %err,
                    "Resilience exhausted, degrading to fallback"
                );
                Ok(None)
            }
            Err(err) => {
                tracing::error!(
                    operation = %ctx.operation,
                    operation_class = %ctx.operation_class,
                    correlation_id = ctx.correlation_id.as_deref().unwrap_or("-"),
                    kind = %err.kind,
                    error = %err,
                    "Resilience exhausted"
                );
                Err(err)
            }
        }
    }

    /// Aggregate health.
    ///
    /// Unhealthy when any breaker is open. Degraded when any breaker is
    /// half-open or, after enough operations, the timeout or retry
    /// exhaustion ratio is above 20%.
    pub fn get_health_status(&self) -> HealthReport {
        let mut breakers: Vec<CircuitBreakerStats> =
            self.breakers.iter().map(|entry| entry.value().stats()).collect();
        breakers.sort_by(|a, b| a.name.cmp(&b.name));

        let retry = self.retry.stats();
        let timeouts = self.timeouts.stats();

        let status = if breakers.iter().any(|b| b.state == CircuitState::Open) {
            HealthState::Unhealthy
        } else if breakers.iter().any(|b| b.state == CircuitState::HalfOpen) {
            HealthState::Degraded
        } else {
            let timeout_ops = timeouts.completed_operations + timeouts.timed_out_operations;
            let timeouts_degraded = timeout_ops >= HEALTH_MIN_OPERATIONS
                && timeouts.timeout_ratio() > HEALTH_DEGRADED_RATIO;
            let retries_degraded = retry.operations >= HEALTH_MIN_OPERATIONS
                && retry.exhaustion_ratio() > HEALTH_DEGRADED_RATIO;
            if timeouts_degraded || retries_degraded {
                HealthState::Degraded
            } else {
                HealthState::Healthy
            }
        };

        HealthReport {
            status,
            breakers,
            retry,
            timeouts,
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            fallback_enabled: self.fallback.read().enabled,
            timestamp: Utc::now()
        }
    }

    /// Reset every breaker, the retry counters and the timeout manager.
    pub fn reset(&self) {
        for entry in &self.breakers {
            entry.value().reset();
        }
        self.retry.reset();
        self.timeouts.reset();
        self.fallbacks.store(0, Ordering::Relaxed);
        tracing::info!("Error handler reset");
    }

    /// Apply `update` to calls started after this returns.
    pub fn update_config(&self, update: ConfigUpdate) {
        if let Some(timeout) = &update.timeout {
            self.timeouts.set_config(timeout.clone());
        }
        if let Some(retry) = &update.retry {
            self.retry.set_policy(retry.clone());
        }
        if let Some(enabled) = update.enable_fallback {
            let mut slot = self.fallback.write();
            *slot = Arc::new(FallbackPolicy {
                enabled,
                degradable: slot.degradable.clone()
            });
        }
        tracing::info!(
            timeout_ms = update
                .timeout
                .as_ref()
                .map(|t| u64::try_from(t.default_timeout.as_millis()).unwrap_or(u64::MAX)),
            max_attempts = update.retry.as_ref().map(|r| r.max_attempts),
            enable_fallback = update.enable_fallback,
            "Resilience configuration updated"
        );
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("breakers", &self.breakers.len())
            .field("retry", &self.retry.policy())
            .field("timeouts", &self.timeouts.config())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::ErrorKind;
    use std::sync::atomic::AtomicU32;

    fn fast_config() -> ResilienceConfig {
        ResilienceConfig {
            timeout: TimeoutConfig {
                default_timeout: Duration::from_millis(200),
                min_timeout: Duration::from_millis(10),
                max_timeout: Duration::from_secs(1)
            },
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50)
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                reset_timeout: Duration::from_secs(30),
                minimum_requests: 3
            },
            enable_fallback: true,
            degradable_operations: vec![DEFAULT_DEGRADABLE_OPERATION.to_string()]
        }
    }

    fn enrich_ctx() -> ExecutionContext {
        ExecutionContext::new("enrich_message", "vectorize_retrieve")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_passes_through() {
        let handler = ErrorHandler::new(fast_config());
        let value = handler
            .execute_with_resilience(|| async { Ok::<_, ClassifiedError>(5) }, &enrich_ctx())
            .await
            .unwrap();
        assert_eq!(value, Some(5));
        assert_eq!(handler.get_health_status().status, HealthState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degradable_operation_falls_back() {
        let handler = ErrorHandler::new(fast_config());
        let calls = AtomicU32::new(0);

        let value = handler
            .execute_with_resilience(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    std::future::pending::<Result<(), ClassifiedError>>().await
                },
                &enrich_ctx()
            )
            .await
            .unwrap();

        assert_eq!(value, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let health = handler.get_health_status();
        assert_eq!(health.fallbacks, 1);
        assert_eq!(health.timeouts.timed_out_operations, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_operations_propagate() {
        let handler = ErrorHandler::new(fast_config());
        let ctx = ExecutionContext::new("reindex", "vectorize_retrieve");

        let err = handler
            .execute_with_resilience(
                || async { Err::<(), _>(ClassifiedError::validation("bad query")) },
                &ctx
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_fallback_propagates() {
        let handler = ErrorHandler::new(fast_config());
        handler.update_config(ConfigUpdate {
            enable_fallback: Some(false),
            ..ConfigUpdate::default()
        });

        let result = handler
            .execute_with_resilience(
                || async { Err::<(), _>(ClassifiedError::auth("revoked")) },
                &enrich_ctx()
            )
            .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Auth);
        assert!(!handler.get_health_status().fallback_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_breaker_reports_unhealthy_and_degrades() {
        let handler = ErrorHandler::new(fast_config());
        for _ in 0..2 {
            let _ = handler
                .execute_with_resilience(
                    || async { Err::<(), _>(ClassifiedError::network("refused")) },
                    &enrich_ctx()
                )
                .await;
        }
        assert_eq!(
            handler.breaker("vectorize_retrieve").state(),
            CircuitState::Open
        );
        assert_eq!(handler.get_health_status().status, HealthState::Unhealthy);

        let calls = AtomicU32::new(0);
        let value = handler
            .execute_with_resilience(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ClassifiedError>(())
                },
                &enrich_ctx()
            )
            .await
            .unwrap();
        assert_eq!(value, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakers_are_per_class() {
        let handler = ErrorHandler::new(fast_config());
        let a = handler.breaker("vectorize_retrieve");
        let b = handler.breaker("vectorize_retrieve");
        let c = handler.breaker("rerank");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(handler.get_health_status().breakers.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_timeout_ratio_degrades() {
        let handler = ErrorHandler::new(ResilienceConfig {
            retry: RetryPolicy {
                max_attempts: 1,
                ..fast_config().retry
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 100,
                ..fast_config().circuit_breaker
            },
            ..fast_config()
        });

        for i in 0..10 {
            let _ = handler
                .execute_with_resilience(
                    || async move {
                        if i < 3 {
                            std::future::pending::<()>().await;
                        }
                        Ok::<_, ClassifiedError>(())
                    },
                    &enrich_ctx()
                )
                .await;
        }

        let health = handler.get_health_status();
        assert_eq!(health.timeouts.timed_out_operations, 3);
        assert_eq!(health.status, HealthState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_everything() {
        let handler = ErrorHandler::new(fast_config());
        for _ in 0..2 {
            let _ = handler
                .execute_with_resilience(
                    || async { Err::<(), _>(ClassifiedError::network("refused")) },
                    &enrich_ctx()
                )
                .await;
        }
        handler.reset();

        let health = handler.get_health_status();
        assert_eq!(health.status, HealthState::Healthy);
        assert_eq!(health.fallbacks, 0);
        assert_eq!(health.retry.attempts, 0);
        assert!(health.breakers.iter().all(|b| b.total_requests == 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_config_applies_to_new_calls() {
        let handler = ErrorHandler::new(fast_config());
        handler.update_config(ConfigUpdate {
            timeout: Some(TimeoutConfig {
                default_timeout: Duration::from_millis(500),
                min_timeout: Duration::from_millis(300),
                max_timeout: Duration::from_millis(800)
            }),
            retry: Some(RetryPolicy {
                max_attempts: 1,
                base_delay: Duration::from_millis(20),
                max_delay: Duration::from_millis(40)
            }),
            enable_fallback: None
        });
        let timeouts = handler.timeout_manager();
        assert_eq!(timeouts.resolve(None), Duration::from_millis(500));
        assert_eq!(
            timeouts.resolve(Some(Duration::from_millis(100))),
            Duration::from_millis(300)
        );
        assert_eq!(
            timeouts.resolve(Some(Duration::from_secs(5))),
            Duration::from_millis(800)
        );
        assert_eq!(
            handler.retry_manager().policy().max_delay,
            Duration::from_millis(40)
        );

        let calls = AtomicU32::new(0);
        let _ = handler
            .execute_with_resilience(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(ClassifiedError::timeout("slow"))
                },
                &enrich_ctx()
            )
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
