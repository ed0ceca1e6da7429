//! Maps raw failures into [`ClassifiedError`]s.

use crate::{ClassifiedError, ErrorKind};
use std::time::Duration;

/// Types that know how to turn themselves into a [`ClassifiedError`].
///
/// The resilience layers accept any `Result<T, E: Classify>` and classify
/// exactly once, at the point the failure is observed.
pub trait Classify {
    fn classify(self) -> ClassifiedError;
}

impl Classify for ClassifiedError {
    fn classify(self) -> ClassifiedError {
        self
    }
}

impl Classify for std::io::Error {
    fn classify(self) -> ClassifiedError {
        let kind = match self.kind() {
            std::io::ErrorKind::TimedOut => ErrorKind::Timeout,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::Interrupted => ErrorKind::Network,
            std::io::ErrorKind::PermissionDenied => ErrorKind::Auth,
            std::io::ErrorKind::InvalidInput | std::io::ErrorKind::InvalidData => {
                ErrorKind::Validation
            }
            _ => ErrorKind::Unknown
        };
        ClassifiedError::new(kind, self.to_string()).with_cause(self)
    }
}

impl Classify for String {
    fn classify(self) -> ClassifiedError {
        ErrorClassifier::classify_message(&self)
    }
}

impl Classify for &str {
    fn classify(self) -> ClassifiedError {
        ErrorClassifier::classify_message(self)
    }
}

/// Stateless classification rules.
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-2xx HTTP response.
    pub fn classify_status(
        status: u16,
        message: impl Into<String>,
        retry_after: Option<Duration>
    ) -> ClassifiedError {
        let message = message.into();
        let err = match status {
            401 | 403 => ClassifiedError::auth(message),
            408 => ClassifiedError::timeout(message),
            429 => ClassifiedError::rate_limited(message, retry_after),
            500..=599 => ClassifiedError::network(message),
            400..=499 => ClassifiedError::validation(message),
            _ => ClassifiedError::unknown(message)
        };
        err.with_status(status)
    }

    /// Keyword classification for failures that only surface as text.
    ///
    /// Order matters: a "rate limit exceeded, request timed out" message is a
    /// rate limit first.
    pub fn classify_message(message: &str) -> ClassifiedError {
        let lower = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        let kind = if has(&["rate limit", "too many requests", "429"]) {
            ErrorKind::RateLimit
        } else if has(&["unauthorized", "forbidden", "401", "403", "invalid token"]) {
            ErrorKind::Auth
        } else if has(&["timeout", "timed out", "deadline"]) {
            ErrorKind::Timeout
        } else if has(&[
            "econnrefused",
            "econnreset",
            "enotfound",
            "connection",
            "network",
            "dns",
            "socket"
        ]) {
            ErrorKind::Network
        } else if has(&["invalid", "validation", "malformed", "bad request"]) {
            ErrorKind::Validation
        } else {
            ErrorKind::Unknown
        };

        tracing::trace!(kind = %kind, "classified error message");
        ClassifiedError::new(kind, message)
    }

    /// Parse a `Retry-After` header given in whole seconds.
    pub fn parse_retry_after(value: &str) -> Option<Duration> {
        value.trim().parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_codes() {
        assert_eq!(
            ErrorClassifier::classify_status(401, "nope", None).kind,
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorClassifier::classify_status(403, "nope", None).kind,
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorClassifier::classify_status(408, "slow", None).kind,
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorClassifier::classify_status(503, "down", None).kind,
            ErrorKind::Network
        );
        assert_eq!(
            ErrorClassifier::classify_status(422, "bad", None).kind,
            ErrorKind::Validation
        );
        assert_eq!(
            ErrorClassifier::classify_status(302, "moved", None).kind,
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_rate_limit_keeps_retry_after() {
        let err = ErrorClassifier::classify_status(429, "slow down", Some(Duration::from_secs(7)));
        assert_eq!(err.kind, ErrorKind::RateLimit);
        assert!(err.retryable);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
        assert_eq!(err.status, Some(429));
    }

    #[test]
    fn test_classify_message_keywords() {
        assert_eq!(
            ErrorClassifier::classify_message("connect ECONNREFUSED 127.0.0.1:443").kind,
            ErrorKind::Network
        );
        assert_eq!(
            ErrorClassifier::classify_message("Request timed out").kind,
            ErrorKind::Timeout
        );
        assert_eq!(
            ErrorClassifier::classify_message("Rate limit exceeded").kind,
            ErrorKind::RateLimit
        );
        assert_eq!(
            ErrorClassifier::classify_message("401 Unauthorized").kind,
            ErrorKind::Auth
        );
        assert_eq!(
            ErrorClassifier::classify_message("something odd").kind,
            ErrorKind::Unknown
        );
    }

    #[test]
    fn test_io_error_classification() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline").classify();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(err.cause.is_some());

        let err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset").classify();
        assert_eq!(err.kind, ErrorKind::Network);
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(
            ErrorClassifier::parse_retry_after(" 12 "),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            ErrorClassifier::parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            None
        );
    }
}
