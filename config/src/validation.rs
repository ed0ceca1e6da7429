//! # Configuration Validation
//!
//! Field rules come from the `validator` derive on each struct; this module
//! adds the cross-field rules and maps everything onto [`ConfigError`].

use crate::config::EnrichmentConfig;
use errors::ConfigError;
use validator::Validate;

/// Validate a configuration before any component is built from it.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// A failing configuration is fatal: the caller must not start in a
/// half-configured state.
///
/// ## Validation Rules
/// ### Fields
/// - `retrieval.top_k`: 1-50
/// - `retrieval.endpoint`: a parseable URL when set
/// - `relevance.threshold`: 0.0-1.0
/// - `observability.logging_level`: trace/debug/info/warn/error
///
/// ### Cross-field (only when `enabled`)
/// - `retrieval.endpoint` is required and must use http or https
/// - `retrieval.auth_token` is required: printable ASCII, no whitespace
///
/// ### Cross-field (always)
/// - `timeout.min_ms <= timeout.default_ms <= timeout.max_ms`
/// - `retry.base_delay_ms <= retry.max_delay_ms`
/// - `relevance.raw_weight + relevance.lexical_weight > 0`
/// - `query.min_length <= query.max_length`
pub fn validate_config(config: &EnrichmentConfig) -> Result<(), ConfigError> {
    config.validate().map_err(|e| ConfigError::Validation {
        message: e.to_string()
    })?;

    if config.enabled {
        let endpoint =
            config
                .retrieval
                .endpoint
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "retrieval.endpoint".to_string()
                })?;
        validate_endpoint(endpoint)?;

        let token =
            config
                .retrieval
                .auth_token
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "retrieval.auth_token".to_string()
                })?;
        validate_auth_token(token)?;
    }

    let timeout = &config.timeout;
    if timeout.min_ms > timeout.max_ms {
        return Err(ConfigError::InvalidRange {
            field: "timeout".to_string(),
            reason: format!(
                "min_ms ({}) exceeds max_ms ({})",
                timeout.min_ms, timeout.max_ms
            )
        });
    }
    if timeout.default_ms < timeout.min_ms || timeout.default_ms > timeout.max_ms {
        return Err(ConfigError::InvalidRange {
            field: "timeout.default_ms".to_string(),
            reason: format!(
                "{} is outside [{}, {}]",
                timeout.default_ms, timeout.min_ms, timeout.max_ms
            )
        });
    }

    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::InvalidRange {
            field: "retry.base_delay_ms".to_string(),
            reason: format!(
                "{} exceeds max_delay_ms ({})",
                config.retry.base_delay_ms, config.retry.max_delay_ms
            )
        });
    }

    let weights = config.relevance.raw_weight + config.relevance.lexical_weight;
    if weights.partial_cmp(&0.0) != Some(std::cmp::Ordering::Greater) {
        return Err(ConfigError::InvalidRange {
            field: "relevance".to_string(),
            reason: "raw_weight + lexical_weight must be positive".to_string()
        });
    }

    if config.query.min_length > config.query.max_length {
        return Err(ConfigError::InvalidRange {
            field: "query.min_length".to_string(),
            reason: format!(
                "{} exceeds max_length ({})",
                config.query.min_length, config.query.max_length
            )
        });
    }

    Ok(())
}

/// Check that an endpoint is an absolute http(s) URL with a host.
pub fn validate_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidEndpoint {
        url: endpoint.to_string(),
        reason: reason.to_string()
    };

    let rest = endpoint
        .strip_prefix("https://")
        .or_else(|| endpoint.strip_prefix("http://"))
        .ok_or_else(|| invalid("scheme must be http or https"))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || host.starts_with(':') {
        return Err(invalid("missing host"));
    }
    if endpoint.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    Ok(())
}

/// Check that a bearer token can be sent verbatim in an `Authorization`
/// header.
pub fn validate_auth_token(token: &str) -> Result<(), ConfigError> {
    if token.is_empty() {
        return Err(ConfigError::InvalidToken {
            reason: "token is empty".to_string()
        });
    }
    if !token.chars().all(|c| c.is_ascii_graphic()) {
        return Err(ConfigError::InvalidToken {
            reason: "token must be printable ASCII without whitespace".to_string()
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_config() -> EnrichmentConfig {
        EnrichmentConfig::with_retrieval("https://search.internal/v1/query", "tok_0123456789")
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&enabled_config()).is_ok());
    }

    #[test]
    fn test_disabled_config_needs_no_endpoint() {
        let config = EnrichmentConfig {
            enabled: false,
            ..EnrichmentConfig::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_missing_endpoint() {
        let mut config = enabled_config();
        config.retrieval.endpoint = None;
        assert_eq!(
            validate_config(&config),
            Err(ConfigError::MissingField {
                field: "retrieval.endpoint".to_string()
            })
        );
    }

    #[test]
    fn test_missing_token() {
        let mut config = enabled_config();
        config.retrieval.auth_token = None;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_malformed_endpoint() {
        assert!(validate_endpoint("https://search.internal").is_ok());
        assert!(validate_endpoint("http://localhost:8080/query").is_ok());
        assert!(matches!(
            validate_endpoint("ftp://search.internal"),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
        assert!(validate_endpoint("https://").is_err());
        assert!(validate_endpoint("search.internal/query").is_err());
    }

    #[test]
    fn test_malformed_token() {
        assert!(validate_auth_token("tok_0123").is_ok());
        assert!(matches!(
            validate_auth_token(""),
            Err(ConfigError::InvalidToken { .. })
        ));
        assert!(validate_auth_token("tok 0123").is_err());
        assert!(validate_auth_token("tok\n0123").is_err());
        assert!(validate_auth_token("tök").is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = enabled_config();
        config.timeout.default_ms = 50;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidRange { .. })
        ));

        let mut config = enabled_config();
        config.timeout.min_ms = 40_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_retry_delays() {
        let mut config = enabled_config();
        config.retry.base_delay_ms = 20_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = enabled_config();
        config.relevance.raw_weight = 0.0;
        config.relevance.lexical_weight = 0.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_field_rules_surface_as_validation_error() {
        let mut config = enabled_config();
        config.relevance.threshold = 1.5;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));
    }
}
