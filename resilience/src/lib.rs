//! Resilience layers for outbound calls made while enriching a message.
//!
//! [`ErrorHandler`] is the entry point; the managers it composes are usable
//! on their own.

pub mod circuit_breaker;
pub mod handler;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use handler::{
    ConfigUpdate, DEFAULT_DEGRADABLE_OPERATION, ErrorHandler, ExecutionContext, HealthReport,
    HealthState, ResilienceConfig
};
pub use retry::{RetryManager, RetryPolicy, RetryStats};
pub use timeout::{TimeoutConfig, TimeoutManager, TimeoutStats};
