//! # Context Enrichment Errors
//!
//! Error taxonomy for the context enrichment system.
//!
//! Every raw failure (transport error, HTTP status, deadline expiry) is mapped
//! once into a [`ClassifiedError`] carrying a [`ErrorKind`], a `retryable`
//! flag and a [`Severity`]. The resilience layers only ever look at the
//! classified form.
//!
//! Construction-time problems are reported separately through
//! [`ConfigError`]: they are fatal and never retried.

mod classifier;

pub use classifier::{Classify, ErrorClassifier};

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Shared, cloneable underlying cause of a classified error.
pub type SharedCause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    #[serde(rename = "network_error")]
    Network,
    #[serde(rename = "timeout_error")]
    Timeout,
    #[serde(rename = "rate_limit")]
    RateLimit,
    #[serde(rename = "auth_error")]
    Auth,
    #[serde(rename = "validation_error")]
    Validation,
    /// Rejected by an open circuit breaker without invoking the operation.
    #[serde(rename = "circuit_open")]
    CircuitOpen,
    #[serde(rename = "unknown")]
    Unknown
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network_error",
            ErrorKind::Timeout => "timeout_error",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Auth => "auth_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::Unknown => "unknown"
        }
    }

    /// Default retry decision for the kind.
    ///
    /// `CircuitOpen` is not retryable: an open circuit must short-circuit the
    /// retry loop instead of burning attempts against a known-bad dependency.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::RateLimit
        )
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ErrorKind::RateLimit => Severity::Low,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::CircuitOpen => Severity::Medium,
            ErrorKind::Validation | ErrorKind::Unknown => Severity::High,
            ErrorKind::Auth => Severity::Critical
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical"
        };
        f.write_str(s)
    }
}

/// A failure after classification.
///
/// Created once per raw failure and never mutated afterwards; the builder
/// methods consume `self`.
#[derive(Clone)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub retryable: bool,
    pub severity: Severity,
    pub message: String,
    /// HTTP status when the failure came from a response.
    pub status: Option<u16>,
    /// Server-provided back-off hint (rate limiting) or time until an open
    /// circuit admits a probe.
    pub retry_after: Option<Duration>,
    pub cause: Option<SharedCause>
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            retryable: kind.is_retryable(),
            severity: kind.default_severity(),
            message: message.into(),
            status: None,
            retry_after: None,
            cause: None
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(ErrorKind::RateLimit, message);
        err.retry_after = retry_after;
        err
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn circuit_open(breaker: &str, retry_after: Option<Duration>) -> Self {
        let mut err = Self::new(
            ErrorKind::CircuitOpen,
            format!("circuit breaker '{breaker}' is open")
        );
        err.retry_after = retry_after;
        err
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static
    {
        self.cause = Some(Arc::new(cause));
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn is_circuit_open(&self) -> bool {
        self.kind == ErrorKind::CircuitOpen
    }
}

impl fmt::Debug for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifiedError")
            .field("kind", &self.kind)
            .field("retryable", &self.retryable)
            .field("severity", &self.severity)
            .field("message", &self.message)
            .field("status", &self.status)
            .field("retry_after", &self.retry_after)
            .field("cause", &self.cause.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Construction-time configuration errors.
///
/// The system must not start half-configured, so these are raised
/// immediately and never converted into a fallback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration: {field}")]
    MissingField { field: String },

    #[error("Invalid retrieval endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Malformed auth token: {reason}")]
    InvalidToken { reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidRange { field: String, reason: String },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("{field} cannot change while the interceptor is running")]
    NotReloadable { field: String }
}

impl From<ConfigError> for ClassifiedError {
    fn from(err: ConfigError) -> Self {
        ClassifiedError::validation(err.to_string()).with_cause(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_retryable_kinds() {
        assert!(ClassifiedError::network("reset").retryable);
        assert!(ClassifiedError::timeout("slow").retryable);
        assert!(ClassifiedError::rate_limited("429", None).retryable);

        assert!(!ClassifiedError::auth("bad token").retryable);
        assert!(!ClassifiedError::validation("bad input").retryable);
        assert!(!ClassifiedError::unknown("???").retryable);
        assert!(!ClassifiedError::circuit_open("retrieve", None).retryable);
    }

    #[test]
    fn test_default_severity() {
        assert_eq!(ClassifiedError::auth("x").severity, Severity::Critical);
        assert_eq!(ClassifiedError::rate_limited("x", None).severity, Severity::Low);
        assert_eq!(ClassifiedError::unknown("x").severity, Severity::High);
        assert!(Severity::Critical > Severity::Medium);
    }

    #[test]
    fn test_display_includes_status() {
        let err = ClassifiedError::network("upstream unavailable").with_status(503);
        assert_eq!(err.to_string(), "network_error (HTTP 503): upstream unavailable");
    }

    #[test]
    fn test_config_error_converts_to_validation() {
        let err: ClassifiedError = ConfigError::MissingField {
            field: "retrieval.endpoint".to_string()
        }
        .into();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(!err.retryable);
        assert!(err.source().is_some());
        assert!(err.message.contains("retrieval.endpoint"));
    }

    #[test]
    fn test_kind_names_match_taxonomy() {
        assert_eq!(ErrorKind::Timeout.as_str(), "timeout_error");
        assert_eq!(ErrorKind::Auth.to_string(), "auth_error");
        assert_eq!(ErrorKind::RateLimit.to_string(), "rate_limit");
    }
}
