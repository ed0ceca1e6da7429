//! # Circuit Breaker
//!
//! Per-operation-class guard with the usual three states.
//!
//! - `Closed`: calls pass through. A failure increments `failure_count`, a
//!   success resets it. Once `total_requests >= minimum_requests` and
//!   `failure_count >= failure_threshold` the breaker opens.
//! - `Open`: calls are rejected with a `circuit_open` error without running
//!   the operation, until `reset_timeout` has passed since the last failure.
//! - `HalfOpen`: exactly one probe runs. Success closes the breaker and
//!   clears the counters; failure re-opens it.
//!
//! All state lives behind one mutex so every transition is atomic. The lock
//! is never held across an `.await`.

use chrono::{DateTime, Utc};
use config::CircuitBreakerSettings;
use errors::{ClassifiedError, Classify};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN"
        }
    }

    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
    pub minimum_requests: u32
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
            minimum_requests: 3
        }
    }
}

impl From<&CircuitBreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold,
            reset_timeout: settings.reset_timeout(),
            minimum_requests: settings.minimum_requests
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u64,
    pub total_requests: u64,
    /// Calls rejected without running the operation.
    pub rejected_requests: u64,
    pub is_healthy: bool,
    pub last_failure_time: Option<DateTime<Utc>>,
    pub uptime_ms: u64
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u64,
    total_requests: u64,
    rejected_requests: u64,
    last_failure: Option<Instant>,
    last_failure_time: Option<DateTime<Utc>>,
    probe_in_flight: bool
}

impl BreakerInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            rejected_requests: 0,
            last_failure: None,
            last_failure_time: None,
            probe_in_flight: false
        }
    }

    fn mark_failure(&mut self) {
        self.last_failure = Some(Instant::now());
        self.last_failure_time = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Probe
}

pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
    created_at: Instant
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        gauge!("circuit_breaker_state", "breaker" => name.clone()).set(0.0);
        Self {
            name,
            config,
            inner: Mutex::new(BreakerInner::new()),
            created_at: Instant::now()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Run `operation` under the breaker.
    ///
    /// Returns a `circuit_open` error without calling `operation` when the
    /// breaker rejects the call. Operation failures are classified and
    /// returned unchanged after being recorded.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, ClassifiedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify
    {
        match self.admit()? {
            Admission::Normal => match operation().await {
                Ok(value) => {
                    self.on_success();
                    Ok(value)
                }
                Err(e) => {
                    let err = e.classify();
                    self.on_failure(&err);
                    Err(err)
                }
            },
            Admission::Probe => {
                let mut guard = ProbeGuard {
                    breaker: self,
                    armed: true
                };
                let result = operation().await;
                guard.armed = false;
                match result {
                    Ok(value) => {
                        self.on_probe_result(true);
                        Ok(value)
                    }
                    Err(e) => {
                        let err = e.classify();
                        tracing::warn!(
                            breaker = %self.name,
                            error = %err,
                            "Half-open probe failed"
                        );
                        self.on_probe_result(false);
                        Err(err)
                    }
                }
            }
        }
    }

    fn admit(&self) -> Result<Admission, ClassifiedError> {
        let mut inner = self.inner.lock();
        let state = inner.state;
        match state {
            CircuitState::Closed => {
                inner.total_requests += 1;
                Ok(Admission::Normal)
            }
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map_or(self.config.reset_timeout, |at| at.elapsed());
                if elapsed >= self.config.reset_timeout {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    inner.total_requests += 1;
                    Ok(Admission::Probe)
                } else {
                    inner.rejected_requests += 1;
                    drop(inner);
                    self.record_rejection();
                    Err(ClassifiedError::circuit_open(
                        &self.name,
                        Some(self.config.reset_timeout - elapsed)
                    ))
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    inner.rejected_requests += 1;
                    drop(inner);
                    self.record_rejection();
                    Err(ClassifiedError::circuit_open(&self.name, None))
                } else {
                    inner.probe_in_flight = true;
                    inner.total_requests += 1;
                    Ok(Admission::Probe)
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        // A call admitted while closed may finish after another call opened
        // the breaker; its result no longer says anything about recovery.
        if inner.state == CircuitState::Closed {
            inner.failure_count = 0;
            inner.success_count += 1;
        }
    }

    fn on_failure(&self, err: &ClassifiedError) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            return;
        }
        inner.failure_count += 1;
        inner.mark_failure();

        if inner.total_requests >= u64::from(self.config.minimum_requests)
            && inner.failure_count >= self.config.failure_threshold
        {
            tracing::error!(
                breaker = %self.name,
                failure_count = inner.failure_count,
                total_requests = inner.total_requests,
                error = %err,
                "Circuit breaker OPENED"
            );
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn on_probe_result(&self, success: bool) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::HalfOpen || !inner.probe_in_flight {
            return;
        }
        inner.probe_in_flight = false;
        if success {
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.total_requests = 0;
            self.transition(&mut inner, CircuitState::Closed);
        } else {
            inner.mark_failure();
            self.transition(&mut inner, CircuitState::Open);
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        if from == to {
            return;
        }
        inner.state = to;
        tracing::info!(breaker = %self.name, from = %from, to = %to, "Circuit breaker state change");
        gauge!("circuit_breaker_state", "breaker" => self.name.clone()).set(to.gauge_value());
        counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "to" => to.as_str()
        )
        .increment(1);
    }

    fn record_rejection(&self) {
        tracing::debug!(breaker = %self.name, "Circuit breaker rejected call");
        counter!("circuit_breaker_rejections_total", "breaker" => self.name.clone()).increment(1);
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            total_requests: inner.total_requests,
            rejected_requests: inner.rejected_requests,
            is_healthy: inner.state == CircuitState::Closed,
            last_failure_time: inner.last_failure_time,
            uptime_ms: u64::try_from(self.created_at.elapsed().as_millis()).unwrap_or(u64::MAX)
        }
    }

    /// Force the breaker closed and clear every counter.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Closed);
        *inner = BreakerInner::new();
        tracing::info!(breaker = %self.name, "Circuit breaker reset");
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Re-opens the breaker if a probe's future is dropped before it finishes,
/// so the breaker can never stay half-open with nobody probing.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::warn!(breaker = %self.breaker.name, "Half-open probe abandoned");
            self.breaker.on_probe_result(false);
        }
    }
}
