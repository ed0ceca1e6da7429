//! # Enrichment Interceptor
//!
//! Staged pipeline run for every outbound message:
//!
//! ```text
//! enabled? -> sanitize -> [cache] -> retrieve (resilient) -> score/filter
//!          -> format -> optimize -> [cache, audit] -> context | None
//! ```
//!
//! Each stage may end the call with `None`. Stages run strictly in order
//! and share nothing with concurrent calls except the breaker registry,
//! the cache and the counters.
//!
//! # M-CANONICAL-DOCS
//!
//! ## Purpose
//! Best-effort context for the host's conversation. A failure anywhere
//! degrades to "no context"; [`EnrichmentInterceptor::enrich_message`]
//! never returns an error.
//!
//! ## Correlation
//! Every call runs inside the span built by
//! [`CorrelationContext::span`], attached with `Instrument`. The caller's
//! correlation id is used when present, a fresh one otherwise.
//!
//! ## Live Reconfiguration
//! [`EnrichmentInterceptor::update_config`] swaps the configuration
//! snapshot; calls already running keep the snapshot they started with.
//! The retrieval endpoint and token, the breaker settings and the cache
//! sizing are fixed at construction; an update that changes them is
//! rejected.

use crate::cache::{CacheStats, ContextCache};
use crate::formatter::format_context;
use crate::optimizer::TokenOptimizer;
use crate::sanitize::{meets_min_length, sanitize_query};
use crate::scoring::RelevanceScorer;
use crate::telemetry::{EnrichmentTelemetry, PerformanceSummary, PipelineMetrics, SkipReason};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use config::{EnrichmentConfig, validate_config};
use enrich_core::{
    EnrichOptions, EnrichmentRequest, OptimizedContext, RetrievalClient, RetrievedDocument
};
use errors::{ClassifiedError, ConfigError};
use observability::CorrelationContext;
use parking_lot::RwLock;
use resilience::{
    ConfigUpdate, ErrorHandler, ExecutionContext, HealthReport, HealthState, ResilienceConfig,
    RetryPolicy, TimeoutConfig
};
use retrieval::HttpRetrievalClient;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

/// Operation name under which retrieval failures degrade to `None`.
pub const ENRICH_OPERATION: &str = "enrich_message";

/// Breaker key shared by every retrieval call.
pub const RETRIEVAL_OPERATION_CLASS: &str = "vectorize_retrieve";

/// `tracing` target of the per-call audit event.
pub const AUDIT_TARGET: &str = "enrichment::audit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Disabled
}

impl From<HealthState> for ServiceStatus {
    fn from(state: HealthState) -> Self {
        match state {
            HealthState::Healthy => ServiceStatus::Healthy,
            HealthState::Degraded => ServiceStatus::Degraded,
            HealthState::Unhealthy => ServiceStatus::Unhealthy
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: ServiceStatus,
    pub enabled: bool,
    pub retrieval_client: String,
    /// Absent while enrichment is disabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resilience: Option<HealthReport>,
    pub cache: CacheStats,
    pub timestamp: DateTime<Utc>
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub pipeline: PipelineMetrics,
    pub cache: CacheStats,
    pub resilience: HealthReport
}

enum Outcome {
    Enriched {
        context: OptimizedContext,
        from_cache: bool
    },
    Skipped(SkipReason)
}

pub struct EnrichmentInterceptor {
    config: RwLock<Arc<EnrichmentConfig>>,
    client: Arc<dyn RetrievalClient>,
    handler: Arc<ErrorHandler>,
    cache: ContextCache,
    telemetry: EnrichmentTelemetry
}

impl EnrichmentInterceptor {
    /// Validate `config` and build an interceptor with its own error
    /// handler.
    pub fn new(
        config: EnrichmentConfig,
        client: Arc<dyn RetrievalClient>
    ) -> Result<Self, ConfigError> {
        let handler = Arc::new(ErrorHandler::new(ResilienceConfig::from(&config)));
        Self::with_handler(config, client, handler)
    }

    /// Like [`new`](Self::new), sharing an existing error handler (and so
    /// its breakers) with other components.
    pub fn with_handler(
        config: EnrichmentConfig,
        client: Arc<dyn RetrievalClient>,
        handler: Arc<ErrorHandler>
    ) -> Result<Self, ConfigError> {
        validate_config(&config)?;

        tracing::info!(
            enabled = config.enabled,
            client = client.name(),
            top_k = config.retrieval.top_k,
            token_budget = config.tokens.budget,
            strategy = %config.tokens.strategy,
            caching = config.features.caching,
            "Enrichment interceptor initialized"
        );

        Ok(Self {
            cache: ContextCache::from(&config.cache),
            config: RwLock::new(Arc::new(config)),
            client,
            handler,
            telemetry: EnrichmentTelemetry::new()
        })
    }

    /// Build the production interceptor, talking HTTP to the configured
    /// retrieval endpoint.
    pub fn from_config(config: EnrichmentConfig) -> Result<Self, ConfigError> {
        let client: Arc<dyn RetrievalClient> = if config.retrieval.endpoint.is_some() {
            Arc::new(HttpRetrievalClient::from_config(&config)?)
        } else {
            Arc::new(UnconfiguredClient)
        };
        Self::new(config, client)
    }

    pub fn error_handler(&self) -> &Arc<ErrorHandler> {
        &self.handler
    }

    /// Run the pipeline and return the optimized context.
    ///
    /// Exhausted resilience for retrieval yields `Ok(None)` while fallback
    /// is on; with fallback off the classified error is returned.
    pub async fn enrich(
        &self,
        message: &str,
        options: &EnrichOptions
    ) -> Result<Option<OptimizedContext>, ClassifiedError> {
        let config = self.config.read().clone();
        let publish = config.features.metrics;
        if !config.enabled {
            self.telemetry.record_disabled(publish);
            return Ok(None);
        }

        let scope = CorrelationContext::from_options(options);
        let span = scope.span(ENRICH_OPERATION);
        let started = Instant::now();

        let outcome = self
            .run_pipeline(&config, message, options, &scope)
            .instrument(span.clone())
            .await;
        let latency = started.elapsed();

        let _entered = span.enter();
        match outcome {
            Ok(Outcome::Enriched {
                context,
                from_cache
            }) => {
                self.telemetry.record_enriched(
                    latency,
                    context.token_count,
                    context.compression_ratio,
                    context.truncated,
                    from_cache,
                    publish
                );
                tracing::debug!(
                    tokens = context.token_count,
                    documents = context.documents_included,
                    from_cache,
                    latency_ms = latency.as_millis() as u64,
                    "Message enriched"
                );
                Ok(Some(context))
            }
            Ok(Outcome::Skipped(reason)) => {
                self.telemetry.record_skipped(reason, latency, publish);
                tracing::debug!(reason = reason.as_str(), "Enrichment skipped");
                Ok(None)
            }
            Err(err) => {
                self.telemetry
                    .record_skipped(SkipReason::Failed, latency, publish);
                Err(err)
            }
        }
    }

    /// Context text for `message`, or `None`. Never fails.
    pub async fn enrich_message(&self, message: &str, options: &EnrichOptions) -> Option<String> {
        match self.enrich(message, options).await {
            Ok(context) => context.map(|c| c.optimized_text),
            Err(err) => {
                tracing::warn!(
                    kind = %err.kind,
                    severity = %err.severity,
                    error = %err,
                    "Enrichment failed, continuing without context"
                );
                None
            }
        }
    }

    async fn run_pipeline(
        &self,
        config: &EnrichmentConfig,
        message: &str,
        options: &EnrichOptions,
        scope: &CorrelationContext
    ) -> Result<Outcome, ClassifiedError> {
        let sanitized = sanitize_query(message, config.query.max_length);
        if !meets_min_length(&sanitized, config.query.min_length) {
            return Ok(Outcome::Skipped(SkipReason::QueryTooShort));
        }

        let request = EnrichmentRequest {
            sanitized_query: sanitized,
            user_id: scope.user_id.clone(),
            conversation_id: scope.conversation_id.clone(),
            correlation_id: scope.correlation_id.clone(),
            language: options.language.clone()
        };

        let cache_key = config
            .features
            .caching
            .then(|| ContextCache::key(&request.sanitized_query, config));
        if let Some(key) = &cache_key {
            if let Some(context) = self.cache.get(key) {
                return Ok(Outcome::Enriched {
                    context,
                    from_cache: true
                });
            }
        }

        let Some(documents) = self.retrieve(config, &request).await? else {
            return Ok(Outcome::Skipped(SkipReason::Degraded));
        };
        if documents.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoResults));
        }

        let ranked =
            RelevanceScorer::from(&config.relevance).score_and_filter(&request.sanitized_query, documents);
        if ranked.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::BelowThreshold));
        }

        let formatted = format_context(&ranked);
        let sources = formatted.sources.clone();
        let Some(context) = TokenOptimizer::new(config.tokens.budget, config.tokens.strategy)
            .optimize(&ranked, formatted)
        else {
            return Ok(Outcome::Skipped(SkipReason::EmptyContext));
        };

        if let Some(key) = cache_key {
            self.cache.insert(key, context.clone());
        }

        if config.features.audit_logging {
            tracing::info!(
                target: AUDIT_TARGET,
                correlation_id = %request.correlation_id,
                user_id = request.user_id.as_deref().unwrap_or("-"),
                conversation_id = request.conversation_id.as_deref().unwrap_or("-"),
                language = request.language.as_deref().unwrap_or("-"),
                documents = context.documents_included,
                sources = %sources.join(","),
                tokens = context.token_count,
                truncated = context.truncated,
                "Enrichment completed"
            );
        }

        Ok(Outcome::Enriched {
            context,
            from_cache: false
        })
    }

    async fn retrieve(
        &self,
        config: &EnrichmentConfig,
        request: &EnrichmentRequest
    ) -> Result<Option<Vec<RetrievedDocument>>, ClassifiedError> {
        let ctx = ExecutionContext::new(ENRICH_OPERATION, RETRIEVAL_OPERATION_CLASS)
            .with_correlation_id(request.correlation_id.clone());
        let client = &self.client;
        let query = request.sanitized_query.as_str();
        let correlation_id = request.correlation_id.as_str();
        let top_k = config.retrieval.top_k;

        let started = Instant::now();
        let documents = self
            .handler
            .execute_with_resilience(|| client.retrieve(query, top_k, correlation_id), &ctx)
            .await?;

        if let Some(documents) = &documents {
            self.telemetry
                .record_retrieval(started.elapsed(), documents.len(), config.features.metrics);
        }
        Ok(documents)
    }

    /// Current health; `Disabled` while enrichment is off.
    pub fn health_check(&self) -> HealthCheck {
        let enabled = self.config.read().enabled;
        let resilience = enabled.then(|| self.handler.get_health_status());
        HealthCheck {
            status: resilience
                .as_ref()
                .map_or(ServiceStatus::Disabled, |r| r.status.into()),
            enabled,
            retrieval_client: self.client.name().to_string(),
            resilience,
            cache: self.cache.stats(),
            timestamp: Utc::now()
        }
    }

    /// Configuration in effect, with the auth token masked.
    pub fn get_config(&self) -> EnrichmentConfig {
        self.config.read().redacted()
    }

    pub fn get_metrics(&self) -> MetricsReport {
        MetricsReport {
            pipeline: self.telemetry.metrics(),
            cache: self.cache.stats(),
            resilience: self.handler.get_health_status()
        }
    }

    pub fn get_performance_summary(&self) -> PerformanceSummary {
        self.telemetry.performance_summary()
    }

    /// Validate and install `config` for calls started after this returns.
    ///
    /// Timeout, retry and fallback settings are pushed to the error handler
    /// and cached contexts are dropped. Changing the retrieval endpoint or
    /// token, the breaker settings or the cache sizing fails with
    /// [`ConfigError::NotReloadable`] and leaves the current configuration
    /// in place.
    pub fn update_config(&self, config: EnrichmentConfig) -> Result<(), ConfigError> {
        validate_config(&config)?;
        {
            let current = self.config.read();
            let fixed = [
                (
                    "retrieval.endpoint",
                    current.retrieval.endpoint != config.retrieval.endpoint
                ),
                (
                    "retrieval.auth_token",
                    current.retrieval.auth_token != config.retrieval.auth_token
                ),
                (
                    "circuit_breaker",
                    current.circuit_breaker != config.circuit_breaker
                ),
                ("cache", current.cache != config.cache)
            ];
            if let Some((field, _)) = fixed.into_iter().find(|(_, changed)| *changed) {
                return Err(ConfigError::NotReloadable {
                    field: field.to_string()
                });
            }
        }

        self.handler.update_config(ConfigUpdate {
            timeout: Some(TimeoutConfig::from(&config.timeout)),
            retry: Some(RetryPolicy::from(&config.retry)),
            enable_fallback: Some(config.features.fallback)
        });
        *self.config.write() = Arc::new(config);
        self.cache.invalidate();
        tracing::info!("Enrichment configuration updated");
        Ok(())
    }

    /// Clear breakers, resilience counters, the cache and the pipeline
    /// counters.
    pub fn reset(&self) {
        self.handler.reset();
        self.cache.clear();
        self.telemetry.reset();
    }
}

impl std::fmt::Debug for EnrichmentInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentInterceptor")
            .field("client", &self.client.name())
            .field("enabled", &self.config.read().enabled)
            .field("cache_entries", &self.cache.len())
            .finish()
    }
}

/// Stand-in when no endpoint is configured: every call fails validation.
struct UnconfiguredClient;

#[async_trait]
impl RetrievalClient for UnconfiguredClient {
    async fn retrieve(
        &self,
        _query: &str,
        _top_k: u32,
        _correlation_id: &str
    ) -> Result<Vec<RetrievedDocument>, ClassifiedError> {
        Err(ClassifiedError::validation(
            "retrieval endpoint is not configured"
        ))
    }

    fn name(&self) -> &str {
        "unconfigured"
    }
}
