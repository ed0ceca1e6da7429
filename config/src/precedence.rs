//! # Configuration Precedence
//!
//! Merges configuration from multiple sources with precedence rules.
//!
//! # Precedence Order
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)
//!
//! A source only overrides a field when its value differs from the default,
//! so a source that leaves a field unset never clobbers a lower layer.

use crate::config::EnrichmentConfig;
use enrich_core::{EventSink, LogLevel};
use std::fmt::Debug;

/// Merge multiple configuration sources with precedence.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Merges configuration from multiple sources following precedence rules:
/// CLI arguments > environment variables > config file > defaults. Every
/// applied override is reported through `sink`, with the auth token
/// masked.
///
/// ## Usage
/// ```rust,no_run
/// use config::{EnrichmentConfig, load_from_env, load_from_file, merge_configs};
/// use enrich_core::NoopSink;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let from_file = load_from_file(Path::new("enrichment.toml"))?;
///     let from_env = load_from_env()?;
///
///     let _config = merge_configs(
///         EnrichmentConfig::default(),
///         from_file,
///         "file",
///         from_env,
///         "env",
///         None,
///         "cli",
///         &NoopSink
///     );
///     Ok(())
/// }
/// ```
#[allow(clippy::too_many_arguments)]
pub fn merge_configs(
    defaults: EnrichmentConfig,
    file_config: EnrichmentConfig,
    file_source_name: &str,
    env_config: EnrichmentConfig,
    env_source_name: &str,
    cli_config: Option<EnrichmentConfig>,
    cli_source_name: &str,
    sink: &dyn EventSink
) -> EnrichmentConfig {
    let mut config = defaults;

    config = merge_with_logging(config, file_config, file_source_name, sink);
    config = merge_with_logging(config, env_config, env_source_name, sink);

    if let Some(cli) = cli_config {
        config = merge_with_logging(config, cli, cli_source_name, sink);
    }

    config
}

/// Apply one source on top of `base`, reporting what changed.
pub fn merge_with_logging(
    mut base: EnrichmentConfig,
    override_config: EnrichmentConfig,
    source_name: &str,
    sink: &dyn EventSink
) -> EnrichmentConfig {
    let defaults = EnrichmentConfig::default();
    let mut changes = Vec::new();

    macro_rules! merge {
        ($($path:ident).+) => {
            merge_field(
                &mut base.$($path).+,
                &override_config.$($path).+,
                &defaults.$($path).+,
                stringify!($($path).+),
                &mut changes
            )
        };
    }

    merge!(enabled);

    merge!(retrieval.endpoint);
    if override_config.retrieval.auth_token.is_some()
        && override_config.retrieval.auth_token != base.retrieval.auth_token
    {
        changes.push("retrieval.auth_token = ***".to_string());
        base.retrieval
            .auth_token
            .clone_from(&override_config.retrieval.auth_token);
    }
    merge!(retrieval.top_k);
    merge!(retrieval.include_metadata);
    merge!(retrieval.include_scores);

    merge!(timeout.default_ms);
    merge!(timeout.min_ms);
    merge!(timeout.max_ms);

    merge!(retry.max_attempts);
    merge!(retry.base_delay_ms);
    merge!(retry.max_delay_ms);

    merge!(circuit_breaker.failure_threshold);
    merge!(circuit_breaker.reset_timeout_ms);
    merge!(circuit_breaker.minimum_requests);

    merge!(relevance.threshold);
    merge!(relevance.enhanced_scoring);
    merge!(relevance.raw_weight);
    merge!(relevance.lexical_weight);

    merge!(tokens.budget);
    merge!(tokens.strategy);

    merge!(query.min_length);
    merge!(query.max_length);

    merge!(features.caching);
    merge!(features.metrics);
    merge!(features.audit_logging);
    merge!(features.fallback);

    merge!(cache.ttl_secs);
    merge!(cache.max_entries);

    merge!(observability.logging_level);
    merge!(observability.json_logs);

    if !changes.is_empty() {
        sink.log(
            LogLevel::Info,
            "Applied configuration overrides",
            &[
                ("source", source_name.to_string()),
                ("count", changes.len().to_string()),
                ("changes", changes.join(", "))
            ]
        );
    }

    base
}

fn merge_field<T>(base: &mut T, value: &T, default: &T, path: &str, changes: &mut Vec<String>)
where
    T: PartialEq + Clone + Debug
{
    if value != default && value != base {
        changes.push(format!("{path} = {value:?}"));
        base.clone_from(value);
    }
}
