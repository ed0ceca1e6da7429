//! # Enrichment Telemetry
//!
//! Counters and latency windows behind `get_metrics()` and
//! `get_performance_summary()`. The in-process numbers are always kept;
//! publishing through the `metrics` facade is controlled by the metrics
//! feature flag.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Latency samples kept for percentile estimates.
pub const LATENCY_WINDOW: usize = 1_000;

/// Why a call finished without context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    QueryTooShort,
    NoResults,
    BelowThreshold,
    EmptyContext,
    /// Resilience layers exhausted and the fallback applied.
    Degraded,
    /// An error escaped the resilience layers.
    Failed
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::QueryTooShort => "query_too_short",
            SkipReason::NoResults => "no_results",
            SkipReason::BelowThreshold => "below_threshold",
            SkipReason::EmptyContext => "empty_context",
            SkipReason::Degraded => "degraded",
            SkipReason::Failed => "failed"
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub total_requests: u64,
    pub enriched: u64,
    pub disabled: u64,
    pub query_too_short: u64,
    pub no_results: u64,
    pub below_threshold: u64,
    pub empty_context: u64,
    pub degraded: u64,
    pub failed: u64,
    pub cache_hits: u64,
    pub retrieval_calls: u64,
    pub documents_retrieved: u64,
    pub truncated_contexts: u64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub total_requests: u64,
    /// Share of non-disabled requests that produced context.
    pub enrichment_rate: f64,
    pub average_latency_ms: f64,
    pub p50_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub average_retrieval_latency_ms: f64,
    pub average_tokens: f64,
    pub average_compression_ratio: f64,
    pub generated_at: DateTime<Utc>
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    enriched: AtomicU64,
    disabled: AtomicU64,
    query_too_short: AtomicU64,
    no_results: AtomicU64,
    below_threshold: AtomicU64,
    empty_context: AtomicU64,
    degraded: AtomicU64,
    failed: AtomicU64,
    cache_hits: AtomicU64,
    retrieval_calls: AtomicU64,
    documents_retrieved: AtomicU64,
    truncated: AtomicU64
}

#[derive(Debug, Default)]
struct Samples {
    latencies_ms: VecDeque<f64>,
    retrieval_ms_total: f64,
    tokens_total: u64,
    compression_total: f64
}

#[derive(Debug, Default)]
pub struct EnrichmentTelemetry {
    counters: Counters,
    samples: Mutex<Samples>
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

impl EnrichmentTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_disabled(&self, publish: bool) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters.disabled.fetch_add(1, Ordering::Relaxed);
        if publish {
            counter!("enrichment_requests_total", "outcome" => "disabled").increment(1);
        }
    }

    pub fn record_enriched(
        &self,
        latency: Duration,
        tokens: u32,
        compression_ratio: f64,
        truncated: bool,
        from_cache: bool,
        publish: bool
    ) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.counters.enriched.fetch_add(1, Ordering::Relaxed);
        if truncated {
            self.counters.truncated.fetch_add(1, Ordering::Relaxed);
        }
        if from_cache {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        {
            let mut samples = self.samples.lock();
            push_latency(&mut samples.latencies_ms, millis(latency));
            samples.tokens_total += u64::from(tokens);
            samples.compression_total += compression_ratio;
        }

        if publish {
            let outcome = if from_cache { "cache_hit" } else { "enriched" };
            counter!("enrichment_requests_total", "outcome" => outcome).increment(1);
            histogram!("enrichment_duration_seconds").record(latency.as_secs_f64());
            histogram!("enrichment_context_tokens").record(f64::from(tokens));
            if truncated {
                counter!("enrichment_truncated_total").increment(1);
            }
        }
    }

    pub fn record_skipped(&self, reason: SkipReason, latency: Duration, publish: bool) {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let slot = match reason {
            SkipReason::QueryTooShort => &self.counters.query_too_short,
            SkipReason::NoResults => &self.counters.no_results,
            SkipReason::BelowThreshold => &self.counters.below_threshold,
            SkipReason::EmptyContext => &self.counters.empty_context,
            SkipReason::Degraded => &self.counters.degraded,
            SkipReason::Failed => &self.counters.failed
        };
        slot.fetch_add(1, Ordering::Relaxed);
        push_latency(&mut self.samples.lock().latencies_ms, millis(latency));

        if publish {
            counter!("enrichment_requests_total", "outcome" => reason.as_str()).increment(1);
            histogram!("enrichment_duration_seconds").record(latency.as_secs_f64());
        }
    }

    pub fn record_retrieval(&self, latency: Duration, documents: usize, publish: bool) {
        self.counters.retrieval_calls.fetch_add(1, Ordering::Relaxed);
        self.counters
            .documents_retrieved
            .fetch_add(documents as u64, Ordering::Relaxed);
        self.samples.lock().retrieval_ms_total += millis(latency);

        if publish {
            histogram!("enrichment_retrieval_duration_seconds").record(latency.as_secs_f64());
            histogram!("enrichment_documents_retrieved").record(documents as f64);
        }
    }

    pub fn metrics(&self) -> PipelineMetrics {
        let c = &self.counters;
        let load = |a: &AtomicU64| a.load(Ordering::Relaxed);
        PipelineMetrics {
            total_requests: load(&c.total),
            enriched: load(&c.enriched),
            disabled: load(&c.disabled),
            query_too_short: load(&c.query_too_short),
            no_results: load(&c.no_results),
            below_threshold: load(&c.below_threshold),
            empty_context: load(&c.empty_context),
            degraded: load(&c.degraded),
            failed: load(&c.failed),
            cache_hits: load(&c.cache_hits),
            retrieval_calls: load(&c.retrieval_calls),
            documents_retrieved: load(&c.documents_retrieved),
            truncated_contexts: load(&c.truncated)
        }
    }

    pub fn performance_summary(&self) -> PerformanceSummary {
        let metrics = self.metrics();
        let samples = self.samples.lock();

        let mut sorted: Vec<f64> = samples.latencies_ms.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let average_latency_ms = if sorted.is_empty() {
            0.0
        } else {
            sorted.iter().sum::<f64>() / sorted.len() as f64
        };

        let attempted = metrics.total_requests.saturating_sub(metrics.disabled);
        let ratio = |num: f64, den: u64| if den == 0 { 0.0 } else { num / den as f64 };

        PerformanceSummary {
            total_requests: metrics.total_requests,
            enrichment_rate: ratio(metrics.enriched as f64, attempted),
            average_latency_ms,
            p50_latency_ms: percentile(&sorted, 0.50),
            p95_latency_ms: percentile(&sorted, 0.95),
            average_retrieval_latency_ms: ratio(
                samples.retrieval_ms_total,
                metrics.retrieval_calls
            ),
            average_tokens: ratio(samples.tokens_total as f64, metrics.enriched),
            average_compression_ratio: ratio(samples.compression_total, metrics.enriched),
            generated_at: Utc::now()
        }
    }

    pub fn reset(&self) {
        let c = &self.counters;
        for slot in [
            &c.total,
            &c.enriched,
            &c.disabled,
            &c.query_too_short,
            &c.no_results,
            &c.below_threshold,
            &c.empty_context,
            &c.degraded,
            &c.failed,
            &c.cache_hits,
            &c.retrieval_calls,
            &c.documents_retrieved,
            &c.truncated
        ] {
            slot.store(0, Ordering::Relaxed);
        }
        *self.samples.lock() = Samples::default();
    }
}

fn push_latency(window: &mut VecDeque<f64>, sample: f64) {
    if window.len() == LATENCY_WINDOW {
        window.pop_front();
    }
    window.push_back(sample);
}

/// Nearest-rank percentile of an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
