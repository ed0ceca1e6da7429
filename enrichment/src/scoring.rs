//! # Relevance Scoring
//!
//! Filters retrieved documents by a minimum raw relevance and ranks the
//! survivors.
//!
//! With enhanced scoring on, each surviving document's raw similarity is
//! blended with its lexical overlap with the query, and the blend decides
//! the order. The threshold always applies to the raw score:
//!
//! ```text
//! enhanced = (raw_weight * raw + lexical_weight * overlap) / (raw_weight + lexical_weight)
//! ```
//!
//! `overlap` is the fraction of distinct query terms (3+ characters,
//! case-insensitive) that appear in the document text. A query with no such
//! terms leaves the raw score unchanged.

use config::RelevanceConfig;
use enrich_core::RetrievedDocument;
use std::collections::HashSet;

const MIN_TERM_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceScorer {
    threshold: f64,
    enhanced: bool,
    raw_weight: f64,
    lexical_weight: f64
}

impl From<&RelevanceConfig> for RelevanceScorer {
    fn from(config: &RelevanceConfig) -> Self {
        Self {
            threshold: config.threshold,
            enhanced: config.enhanced_scoring,
            raw_weight: config.raw_weight,
            lexical_weight: config.lexical_weight
        }
    }
}

impl RelevanceScorer {
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Blend `raw` with `overlap`. Falls back to `raw` when the weights do
    /// not sum to a positive value.
    pub fn blend(&self, raw: f64, overlap: f64) -> f64 {
        let total = self.raw_weight + self.lexical_weight;
        if total <= 0.0 || !total.is_finite() {
            return raw;
        }
        (self.raw_weight * raw + self.lexical_weight * overlap) / total
    }

    /// Score, filter and rank `documents` for `query`.
    ///
    /// Documents whose raw score is below the threshold are dropped;
    /// survivors are ordered by descending effective score, ties keeping
    /// retrieval order.
    pub fn score_and_filter(
        &self,
        query: &str,
        documents: Vec<RetrievedDocument>
    ) -> Vec<RetrievedDocument> {
        let query_terms = terms(query);

        let mut kept: Vec<RetrievedDocument> = documents
            .into_iter()
            .map(|mut doc| {
                doc.raw_score = normalize(doc.raw_score);
                doc
            })
            .filter(|doc| doc.raw_score >= self.threshold)
            .map(|mut doc| {
                let raw = doc.raw_score;
                doc.enhanced_score = if self.enhanced && !query_terms.is_empty() {
                    let overlap = lexical_overlap(&query_terms, &doc.text);
                    Some(normalize(self.blend(raw, overlap)))
                } else {
                    None
                };
                doc
            })
            .collect();

        kept.sort_by(|a, b| b.effective_score().total_cmp(&a.effective_score()));
        kept
    }
}

fn normalize(score: f64) -> f64 {
    if score.is_finite() {
        score.max(0.0).min(1.0)
    } else {
        0.0
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of `query_terms` present in `text`.
pub fn lexical_overlap(query_terms: &HashSet<String>, text: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let doc_terms = terms(text);
    let matched = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
    matched as f64 / query_terms.len() as f64
}

/// Distinct lowercase terms of `query` that count towards overlap.
pub fn query_terms(query: &str) -> HashSet<String> {
    terms(query)
}
