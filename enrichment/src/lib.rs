//! # Enrichment
//!
//! The context-enrichment pipeline and its building blocks.
//!
//! [`EnrichmentInterceptor`] is the host-facing entry point. The stages it
//! runs are public so they can be tested and reused on their own:
//!
//! - [`sanitize`]: query cleaning
//! - [`scoring`]: relevance threshold and enhanced ranking
//! - [`formatter`]: context block rendering and token estimates
//! - [`optimizer`]: token-budget enforcement
//! - [`injection`]: placing the context into a conversation

pub mod cache;
pub mod formatter;
pub mod injection;
pub mod interceptor;
pub mod optimizer;
pub mod sanitize;
pub mod scoring;
pub mod telemetry;

pub use cache::{CacheStats, ContextCache};
pub use formatter::{CONTEXT_HEADER, estimate_tokens, format_context};
pub use injection::inject_context;
pub use interceptor::{
    AUDIT_TARGET, ENRICH_OPERATION, EnrichmentInterceptor, HealthCheck, MetricsReport,
    RETRIEVAL_OPERATION_CLASS, ServiceStatus
};
pub use optimizer::TokenOptimizer;
pub use sanitize::sanitize_query;
pub use scoring::RelevanceScorer;
pub use telemetry::{EnrichmentTelemetry, PerformanceSummary, PipelineMetrics, SkipReason};
