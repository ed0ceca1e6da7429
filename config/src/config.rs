//! # Configuration Structures
//!
//! This module defines the configuration for the context enrichment system.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization, with every field
//!   defaulted so partial files are accepted
//! - Use `validator` for per-field rules; cross-field rules live in
//!   [`crate::validation`]

use enrich_core::OptimizationStrategy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main configuration structure for the context enrichment system.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Built once at process start (defaults, then file, then environment, then
/// CLI flags) and shared by `Arc` with every component. Nothing reads
/// configuration from a global.
///
/// ## Usage
/// ```rust,no_run
/// use config::EnrichmentConfig;
///
/// let config = EnrichmentConfig::default();
/// println!("token budget: {}", config.tokens.budget);
/// ```
///
/// ## Validation
/// Per-field rules through `validator`; call
/// [`crate::validate_config`] for the full check including cross-field
/// rules.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct EnrichmentConfig {
    /// Master switch; when off, enrichment returns nothing without any I/O
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    #[validate(nested)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    #[validate(nested)]
    pub timeout: TimeoutSettings,

    #[serde(default)]
    #[validate(nested)]
    pub retry: RetrySettings,

    #[serde(default)]
    #[validate(nested)]
    pub circuit_breaker: CircuitBreakerSettings,

    #[serde(default)]
    #[validate(nested)]
    pub relevance: RelevanceConfig,

    #[serde(default)]
    #[validate(nested)]
    pub tokens: TokenConfig,

    #[serde(default)]
    #[validate(nested)]
    pub query: QueryConfig,

    #[serde(default)]
    pub features: FeatureFlags,

    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    #[serde(default)]
    #[validate(nested)]
    pub observability: ObservabilityConfig
}

fn default_enabled() -> bool {
    true
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            retrieval: RetrievalConfig::default(),
            timeout: TimeoutSettings::default(),
            retry: RetrySettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            relevance: RelevanceConfig::default(),
            tokens: TokenConfig::default(),
            query: QueryConfig::default(),
            features: FeatureFlags::default(),
            cache: CacheConfig::default(),
            observability: ObservabilityConfig::default()
        }
    }
}

impl EnrichmentConfig {
    /// Defaults pointed at a retrieval endpoint.
    pub fn with_retrieval(endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.retrieval.endpoint = Some(endpoint.into());
        config.retrieval.auth_token = Some(auth_token.into());
        config
    }

    /// Copy safe to log or return from introspection: the auth token is
    /// masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.retrieval.auth_token = copy
            .retrieval
            .auth_token
            .as_deref()
            .map(utils::mask_secret);
        copy
    }
}

/// External retrieval service settings.
///
/// ## Fields
/// - `endpoint`: HTTP(S) URL the query is POSTed to
/// - `auth_token`: bearer token
/// - `top_k`: result count requested per query (1-50, default: 5)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default)]
    #[validate(url)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_top_k")]
    #[validate(range(min = 1, max = 50))]
    pub top_k: u32,

    #[serde(default = "default_true")]
    pub include_metadata: bool,

    #[serde(default = "default_true")]
    pub include_scores: bool
}

fn default_top_k() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            auth_token: None,
            top_k: default_top_k(),
            include_metadata: default_true(),
            include_scores: default_true()
        }
    }
}

/// Per-attempt deadline bounds, in milliseconds.
///
/// Requested timeouts are clamped into `[min_ms, max_ms]`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct TimeoutSettings {
    #[serde(default = "default_timeout_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub default_ms: u64,

    #[serde(default = "default_min_timeout_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub min_ms: u64,

    #[serde(default = "default_max_timeout_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub max_ms: u64
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_min_timeout_ms() -> u64 {
    100
}

fn default_max_timeout_ms() -> u64 {
    30_000
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            default_ms: default_timeout_ms(),
            min_ms: default_min_timeout_ms(),
            max_ms: default_max_timeout_ms()
        }
    }
}

impl TimeoutSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_ms)
    }

    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }
}

/// Retry policy settings.
///
/// `max_attempts = 0` is accepted and behaves like a single attempt.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    #[validate(range(max = 20))]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    #[validate(range(min = 1, max = 600_000))]
    pub max_delay_ms: u64
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms()
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CircuitBreakerSettings {
    #[serde(default = "default_failure_threshold")]
    #[validate(range(min = 1, max = 1000))]
    pub failure_threshold: u32,

    #[serde(default = "default_reset_timeout_ms")]
    #[validate(range(min = 1))]
    pub reset_timeout_ms: u64,

    #[serde(default = "default_minimum_requests")]
    pub minimum_requests: u32
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

fn default_minimum_requests() -> u32 {
    3
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            minimum_requests: default_minimum_requests()
        }
    }
}

impl CircuitBreakerSettings {
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }
}

/// Relevance filtering and re-ranking.
///
/// When `enhanced_scoring` is on, each document's score becomes
/// `(raw_weight * raw + lexical_weight * overlap) / (raw_weight + lexical_weight)`
/// where `overlap` is the share of distinct query terms found in the text.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct RelevanceConfig {
    #[serde(default = "default_relevance_threshold")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub threshold: f64,

    #[serde(default = "default_true")]
    pub enhanced_scoring: bool,

    #[serde(default = "default_raw_weight")]
    #[validate(range(min = 0.0))]
    pub raw_weight: f64,

    #[serde(default = "default_lexical_weight")]
    #[validate(range(min = 0.0))]
    pub lexical_weight: f64
}

fn default_relevance_threshold() -> f64 {
    0.5
}

fn default_raw_weight() -> f64 {
    0.8
}

fn default_lexical_weight() -> f64 {
    0.2
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            threshold: default_relevance_threshold(),
            enhanced_scoring: default_true(),
            raw_weight: default_raw_weight(),
            lexical_weight: default_lexical_weight()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct TokenConfig {
    #[serde(default = "default_token_budget")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub budget: u32,

    #[serde(default = "default_strategy")]
    pub strategy: OptimizationStrategy
}

fn default_token_budget() -> u32 {
    2_000
}

fn default_strategy() -> OptimizationStrategy {
    OptimizationStrategy::DropLowestRelevance
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            budget: default_token_budget(),
            strategy: default_strategy()
        }
    }
}

/// Query acceptance window, in characters after sanitization.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct QueryConfig {
    #[serde(default = "default_min_length")]
    pub min_length: usize,

    #[serde(default = "default_max_length")]
    #[validate(range(min = 1, max = 100_000))]
    pub max_length: usize
}

fn default_min_length() -> usize {
    3
}

fn default_max_length() -> usize {
    500
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            min_length: default_min_length(),
            max_length: default_max_length()
        }
    }
}

/// Feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Cache optimized contexts per (query, top_k)
    #[serde(default)]
    pub caching: bool,

    /// Publish through the `metrics` facade
    #[serde(default = "default_true")]
    pub metrics: bool,

    /// Emit one audit event per completed enrichment
    #[serde(default)]
    pub audit_logging: bool,

    /// Degrade enrichment failures to "no context" instead of an error
    #[serde(default = "default_true")]
    pub fallback: bool
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            caching: false,
            metrics: default_true(),
            audit_logging: false,
            fallback: default_true()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    #[validate(range(min = 1, max = 86_400))]
    pub ttl_secs: u64,

    #[serde(default = "default_cache_max_entries")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub max_entries: usize
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    1_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            max_entries: default_cache_max_entries()
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Logging output settings for the composition root.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ObservabilityConfig {
    /// Logging level
    #[serde(default = "default_logging_level")]
    #[validate(custom(function = "validate_logging_level"))]
    pub logging_level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json_logs: bool
}

fn default_logging_level() -> String {
    "info".to_string()
}

fn validate_logging_level(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid logging level"))
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            logging_level: default_logging_level(),
            json_logs: false
        }
    }
}
