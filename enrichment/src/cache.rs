//! TTL cache of optimized contexts, keyed by the hash of the sanitized
//! query, `top_k` and every setting that shapes the context (relevance and
//! token budget). Only successful enrichments are stored.

use config::{CacheConfig, EnrichmentConfig};
use dashmap::DashMap;
use enrich_core::OptimizedContext;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct CacheEntry {
    context: OptimizedContext,
    created_at: Instant
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64
}

#[derive(Debug)]
pub struct ContextCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64
}

impl From<&CacheConfig> for ContextCache {
    fn from(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }
}

impl ContextCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0)
        }
    }

    /// Cache key for `query` under `config`. Two configurations that would
    /// build different contexts for the same query never share a key.
    pub fn key(query: &str, config: &EnrichmentConfig) -> String {
        let relevance = &config.relevance;
        let tokens = &config.tokens;
        let keyed = format!(
            "{query}\u{0}{}|{}|{}|{}|{}|{}",
            relevance.threshold,
            relevance.enhanced_scoring,
            relevance.raw_weight,
            relevance.lexical_weight,
            tokens.budget,
            tokens.strategy
        );
        utils::compute_query_hash(&keyed, config.retrieval.top_k)
    }

    pub fn get(&self, key: &str) -> Option<OptimizedContext> {
        let fresh = self
            .entries
            .get(key)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .map(|entry| entry.context.clone());

        match fresh {
            Some(context) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(context)
            }
            None => {
                self.entries
                    .remove_if(key, |_, entry| entry.created_at.elapsed() >= self.ttl);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `context`, evicting expired entries and then the oldest ones
    /// when the cache is full.
    pub fn insert(&self, key: String, context: OptimizedContext) {
        if self.entries.len() >= self.max_entries && !self.entries.contains_key(&key) {
            self.entries
                .retain(|_, entry| entry.created_at.elapsed() < self.ttl);
            while self.entries.len() >= self.max_entries {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|entry| entry.created_at)
                    .map(|entry| entry.key().clone());
                match oldest {
                    Some(oldest) => {
                        self.entries.remove(&oldest);
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                    None => break
                }
            }
        }

        self.entries.insert(
            key,
            CacheEntry {
                context,
                created_at: Instant::now()
            }
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry, keeping the counters.
    pub fn invalidate(&self) {
        self.entries.clear();
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            entries: self.entries.len(),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            }
        }
    }
}
