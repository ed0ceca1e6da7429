//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `EN_*`: Enrichment pipeline settings
//! - `RT_*`: Retrieval service settings
//! - `RS_*`: Resilience settings (timeouts, retries, circuit breaker)
//! - `OB_*`: Observability settings

use crate::config::{
    CacheConfig, CircuitBreakerSettings, EnrichmentConfig, FeatureFlags, ObservabilityConfig,
    QueryConfig, RelevanceConfig, RetrievalConfig, RetrySettings, TimeoutSettings, TokenConfig
};
use std::env;

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Unset variables fall back to the defaults, so the result can be fed
/// straight into [`crate::merge_configs`], which only applies values that
/// differ from the defaults.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("endpoint: {:?}", config.retrieval.endpoint);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Enrichment (`EN_*`)
/// - `EN_ENABLED`: master switch (default: true)
/// - `EN_RELEVANCE_THRESHOLD`, `EN_ENHANCED_SCORING`, `EN_RAW_WEIGHT`,
///   `EN_LEXICAL_WEIGHT`
/// - `EN_TOKEN_BUDGET`, `EN_OPTIMIZATION_STRATEGY`
///   (drop_lowest_relevance/hard_truncate)
/// - `EN_MIN_QUERY_LENGTH`, `EN_MAX_QUERY_LENGTH`
/// - `EN_CACHING`, `EN_AUDIT_LOGGING`, `EN_FALLBACK`
/// - `EN_CACHE_TTL_SECS`, `EN_CACHE_MAX_ENTRIES`
///
/// ### Retrieval (`RT_*`)
/// - `RT_ENDPOINT`, `RT_AUTH_TOKEN`, `RT_TOP_K`
/// - `RT_INCLUDE_METADATA`, `RT_INCLUDE_SCORES`
///
/// ### Resilience (`RS_*`)
/// - `RS_TIMEOUT_MS`, `RS_MIN_TIMEOUT_MS`, `RS_MAX_TIMEOUT_MS`
/// - `RS_MAX_ATTEMPTS`, `RS_BASE_DELAY_MS`, `RS_MAX_DELAY_MS`
/// - `RS_FAILURE_THRESHOLD`, `RS_RESET_TIMEOUT_MS`, `RS_MINIMUM_REQUESTS`
///
/// ### Observability (`OB_*`)
/// - `OB_METRICS_ENABLED`: publish through the metrics facade (default: true)
/// - `OB_LOGGING_LEVEL`: trace/debug/info/warn/error (default: "info")
/// - `OB_JSON_LOGS`: JSON log lines (default: false)
pub fn load_from_env() -> Result<EnrichmentConfig, Box<dyn std::error::Error>> {
    let config = EnrichmentConfig {
        enabled: parse_env("EN_ENABLED").unwrap_or(true),
        retrieval: load_retrieval_from_env()?,
        timeout: load_timeout_from_env()?,
        retry: load_retry_from_env()?,
        circuit_breaker: load_circuit_breaker_from_env()?,
        relevance: load_relevance_from_env()?,
        tokens: load_tokens_from_env()?,
        query: QueryConfig {
            min_length: parse_env("EN_MIN_QUERY_LENGTH").unwrap_or(3),
            max_length: parse_env("EN_MAX_QUERY_LENGTH").unwrap_or(500)
        },
        features: load_features_from_env()?,
        cache: CacheConfig {
            ttl_secs: parse_env("EN_CACHE_TTL_SECS").unwrap_or(300),
            max_entries: parse_env("EN_CACHE_MAX_ENTRIES").unwrap_or(1000)
        },
        observability: load_observability_from_env()?
    };

    Ok(config)
}

fn load_retrieval_from_env() -> Result<RetrievalConfig, Box<dyn std::error::Error>> {
    Ok(RetrievalConfig {
        endpoint: env::var("RT_ENDPOINT").ok().filter(|s| !s.is_empty()),
        auth_token: env::var("RT_AUTH_TOKEN").ok().filter(|s| !s.is_empty()),
        top_k: parse_env("RT_TOP_K").unwrap_or(5),
        include_metadata: parse_env("RT_INCLUDE_METADATA").unwrap_or(true),
        include_scores: parse_env("RT_INCLUDE_SCORES").unwrap_or(true)
    })
}

fn load_timeout_from_env() -> Result<TimeoutSettings, Box<dyn std::error::Error>> {
    Ok(TimeoutSettings {
        default_ms: parse_env("RS_TIMEOUT_MS").unwrap_or(5_000),
        min_ms: parse_env("RS_MIN_TIMEOUT_MS").unwrap_or(100),
        max_ms: parse_env("RS_MAX_TIMEOUT_MS").unwrap_or(30_000)
    })
}

fn load_retry_from_env() -> Result<RetrySettings, Box<dyn std::error::Error>> {
    Ok(RetrySettings {
        max_attempts: parse_env("RS_MAX_ATTEMPTS").unwrap_or(3),
        base_delay_ms: parse_env("RS_BASE_DELAY_MS").unwrap_or(1_000),
        max_delay_ms: parse_env("RS_MAX_DELAY_MS").unwrap_or(10_000)
    })
}

fn load_circuit_breaker_from_env() -> Result<CircuitBreakerSettings, Box<dyn std::error::Error>> {
    Ok(CircuitBreakerSettings {
        failure_threshold: parse_env("RS_FAILURE_THRESHOLD").unwrap_or(5),
        reset_timeout_ms: parse_env("RS_RESET_TIMEOUT_MS").unwrap_or(60_000),
        minimum_requests: parse_env("RS_MINIMUM_REQUESTS").unwrap_or(3)
    })
}

fn load_relevance_from_env() -> Result<RelevanceConfig, Box<dyn std::error::Error>> {
    Ok(RelevanceConfig {
        threshold: parse_env("EN_RELEVANCE_THRESHOLD").unwrap_or(0.5),
        enhanced_scoring: parse_env("EN_ENHANCED_SCORING").unwrap_or(true),
        raw_weight: parse_env("EN_RAW_WEIGHT").unwrap_or(0.8),
        lexical_weight: parse_env("EN_LEXICAL_WEIGHT").unwrap_or(0.2)
    })
}

fn load_tokens_from_env() -> Result<TokenConfig, Box<dyn std::error::Error>> {
    let strategy = match env::var("EN_OPTIMIZATION_STRATEGY") {
        Ok(value) => value.parse()?,
        Err(_) => TokenConfig::default().strategy
    };
    Ok(TokenConfig {
        budget: parse_env("EN_TOKEN_BUDGET").unwrap_or(2_000),
        strategy
    })
}

fn load_features_from_env() -> Result<FeatureFlags, Box<dyn std::error::Error>> {
    Ok(FeatureFlags {
        caching: parse_env("EN_CACHING").unwrap_or(false),
        metrics: parse_env("OB_METRICS_ENABLED").unwrap_or(true),
        audit_logging: parse_env("EN_AUDIT_LOGGING").unwrap_or(false),
        fallback: parse_env("EN_FALLBACK").unwrap_or(true)
    })
}

fn load_observability_from_env() -> Result<ObservabilityConfig, Box<dyn std::error::Error>> {
    Ok(ObservabilityConfig {
        logging_level: env::var("OB_LOGGING_LEVEL").unwrap_or_else(|_| "info".to_string()),
        json_logs: parse_env("OB_JSON_LOGS").unwrap_or(false)
    })
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static
{
    match env::var(key) {
        Ok(s) => s
            .parse::<T>()
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error>),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>)
    }
}
