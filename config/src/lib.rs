//! # Configuration System
//!
//! Configuration management for the context enrichment system.
//!
//! This crate provides:
//! - The [`EnrichmentConfig`] structure and its sections
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (CLI > env > file > defaults)
//! - Configuration validation, fatal on failure
//!
//! The configuration is built once at startup and handed to components by
//! `Arc`; there is no global configuration state.

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validation;

pub use config::{
    CacheConfig, CircuitBreakerSettings, EnrichmentConfig, FeatureFlags, ObservabilityConfig,
    QueryConfig, RelevanceConfig, RetrievalConfig, RetrySettings, TimeoutSettings, TokenConfig
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use precedence::{merge_configs, merge_with_logging};
pub use validation::{validate_auth_token, validate_config, validate_endpoint};
