//! # Token Optimizer
//!
//! Brings a formatted context within the token budget.
//!
//! - `DropLowestRelevance`: remove documents from the low-relevance end
//!   until the block fits. If the single best document still does not fit,
//!   its block is hard-truncated.
//! - `HardTruncate`: cut the block at the budget, backing off to the last
//!   whitespace so no word is split.
//!
//! An entry counts as included only when some of its document text
//! survives the cut. A trailing label with no text is dropped, and a budget
//! too small for any document text yields no context at all.

use crate::formatter::{estimate_tokens, format_context, render};
use enrich_core::{FormattedContext, OptimizationStrategy, OptimizedContext, RetrievedDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenOptimizer {
    budget: u32,
    strategy: OptimizationStrategy
}

impl TokenOptimizer {
    pub fn new(budget: u32, strategy: OptimizationStrategy) -> Self {
        Self { budget, strategy }
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Optimize `formatted`, which must have been produced from `documents`
    /// (ranked, most relevant first).
    ///
    /// Returns `None` when not even the best document contributes any text
    /// within the budget.
    pub fn optimize(
        &self,
        documents: &[RetrievedDocument],
        formatted: FormattedContext
    ) -> Option<OptimizedContext> {
        let original_tokens = formatted.token_count;
        if original_tokens <= self.budget {
            return Some(OptimizedContext {
                optimized_text: formatted.context_text,
                token_count: original_tokens,
                compression_ratio: 1.0,
                truncated: false,
                strategy: None,
                documents_included: documents.len()
            });
        }

        let fitted = match self.strategy {
            OptimizationStrategy::DropLowestRelevance => self.drop_lowest(documents),
            OptimizationStrategy::HardTruncate => self.hard_truncate(documents)
        };
        let Some((text, documents_included)) = fitted else {
            tracing::debug!(
                strategy = %self.strategy,
                original_tokens,
                budget = self.budget,
                "No document text fits the token budget"
            );
            return None;
        };

        let token_count = estimate_tokens(&text);
        tracing::debug!(
            strategy = %self.strategy,
            original_tokens,
            token_count,
            budget = self.budget,
            documents_included,
            "Context optimized to budget"
        );

        Some(OptimizedContext {
            optimized_text: text,
            token_count,
            compression_ratio: if original_tokens == 0 {
                1.0
            } else {
                f64::from(token_count) / f64::from(original_tokens)
            },
            truncated: true,
            strategy: Some(self.strategy),
            documents_included
        })
    }

    fn drop_lowest(&self, documents: &[RetrievedDocument]) -> Option<(String, usize)> {
        for keep in (1..documents.len()).rev() {
            let candidate = format_context(&documents[..keep]);
            if candidate.token_count <= self.budget {
                return Some((candidate.context_text, keep));
            }
        }
        self.hard_truncate(documents.get(..1)?)
    }

    fn hard_truncate(&self, documents: &[RetrievedDocument]) -> Option<(String, usize)> {
        let (text, spans) = render(documents);
        let cut = truncate_to_budget(&text, self.budget).len();
        let included = spans.iter().take_while(|span| span.body < cut).count();
        let last = spans.get(included.checked_sub(1)?)?;
        let kept = text[..cut.min(last.end)].trim_end();
        Some((kept.to_string(), included))
    }
}

/// Longest prefix of `text` within `budget` tokens, ending on a word
/// boundary when one exists.
pub fn truncate_to_budget(text: &str, budget: u32) -> &str {
    if estimate_tokens(text) <= budget {
        return text;
    }

    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    // Token estimates grow monotonically with prefix length.
    let (mut lo, mut hi) = (0usize, boundaries.len() - 1);
    while lo < hi {
        let mid = lo + (hi - lo).div_ceil(2);
        if estimate_tokens(&text[..boundaries[mid]]) <= budget {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    let end = boundaries[lo];
    let prefix = &text[..end];
    let mid_word = text[end..].chars().next().is_some_and(|c| !c.is_whitespace());
    let prefix = if mid_word {
        match prefix.rfind(char::is_whitespace) {
            Some(ws) => &prefix[..ws],
            None => prefix
        }
    } else {
        prefix
    };
    prefix.trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs() -> Vec<RetrievedDocument> {
        vec![
            RetrievedDocument::new("alpha ".repeat(40), 0.9, "a"),
            RetrievedDocument::new("bravo ".repeat(40), 0.8, "b"),
            RetrievedDocument::new("charlie ".repeat(40), 0.7, "c")
        ]
    }

    #[test]
    fn test_within_budget_is_untouched() {
        let docs = docs();
        let formatted = format_context(&docs);
        let text = formatted.context_text.clone();
        let out = TokenOptimizer::new(10_000, OptimizationStrategy::DropLowestRelevance)
            .optimize(&docs, formatted)
            .unwrap();
        assert_eq!(out.optimized_text, text);
        assert!(!out.truncated);
        assert_eq!(out.strategy, None);
        assert_eq!(out.compression_ratio, 1.0);
        assert_eq!(out.documents_included, 3);
    }

    #[test]
    fn test_drop_lowest_relevance_removes_tail() {
        let docs = docs();
        let two = format_context(&docs[..2]).token_count;
        let formatted = format_context(&docs);
        let out = TokenOptimizer::new(two, OptimizationStrategy::DropLowestRelevance)
            .optimize(&docs, formatted)
            .unwrap();

        assert!(out.truncated);
        assert_eq!(out.strategy, Some(OptimizationStrategy::DropLowestRelevance));
        assert_eq!(out.documents_included, 2);
        assert!(out.token_count <= two);
        assert!(!out.optimized_text.contains("charlie"));
        assert!(out.compression_ratio < 1.0);
    }

    #[test]
    fn test_drop_lowest_truncates_single_oversized_document() {
        let docs = docs();
        let formatted = format_context(&docs);
        let out = TokenOptimizer::new(30, OptimizationStrategy::DropLowestRelevance)
            .optimize(&docs, formatted)
            .unwrap();

        assert_eq!(out.documents_included, 1);
        assert!(out.token_count <= 30);
        assert!(out.optimized_text.starts_with("Relevant context"));
        assert!(out.optimized_text.contains("alpha"));
        assert!(!out.optimized_text.contains("bravo"));
    }

    #[test]
    fn test_hard_truncate_counts_entries_with_visible_text() {
        let docs = docs();
        let one = format_context(&docs[..1]).token_count;
        let formatted = format_context(&docs);
        let out = TokenOptimizer::new(one + 12, OptimizationStrategy::HardTruncate)
            .optimize(&docs, formatted)
            .unwrap();

        assert_eq!(out.strategy, Some(OptimizationStrategy::HardTruncate));
        assert!(out.token_count <= one + 12);
        assert_eq!(out.documents_included, 2);
        assert!(out.optimized_text.contains("[2] Source: b"));
        assert!(out.optimized_text.contains("bravo"));
    }

    #[test]
    fn test_hard_truncate_drops_trailing_label_without_text() {
        let docs = docs();
        let one = format_context(&docs[..1]).token_count;
        let formatted = format_context(&docs);
        let out = TokenOptimizer::new(one + 4, OptimizationStrategy::HardTruncate)
            .optimize(&docs, formatted)
            .unwrap();

        assert_eq!(out.documents_included, 1);
        assert!(out.optimized_text.ends_with("alpha"));
        assert!(!out.optimized_text.contains("[2]"));
    }

    #[test]
    fn test_budget_below_first_label_yields_nothing() {
        for strategy in [
            OptimizationStrategy::DropLowestRelevance,
            OptimizationStrategy::HardTruncate
        ] {
            for budget in [1, 8, 18] {
                let docs = docs();
                let formatted = format_context(&docs);
                let out = TokenOptimizer::new(budget, strategy).optimize(&docs, formatted);
                assert!(out.is_none(), "{strategy} with budget {budget}");
            }
        }
    }

    #[test]
    fn test_truncate_to_budget_respects_word_boundaries() {
        let text = "one two three four five six seven eight nine ten";
        let cut = truncate_to_budget(text, 5);
        assert!(estimate_tokens(cut) <= 5);
        assert!(text.starts_with(cut));
        assert!(text[cut.len()..].starts_with(' '));
        assert_eq!(truncate_to_budget("short", 10), "short");
        assert_eq!(truncate_to_budget("anything", 0), "");
    }

    #[test]
    fn test_truncate_multibyte() {
        let text = "日本語 ".repeat(50);
        let cut = truncate_to_budget(&text, 4);
        assert!(estimate_tokens(cut) <= 4);
        assert!(cut.ends_with('語'));
    }
}
