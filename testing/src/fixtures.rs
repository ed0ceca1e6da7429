use config::EnrichmentConfig;
use enrich_core::RetrievedDocument;
use std::sync::atomic::{AtomicU32, Ordering};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub const TEST_ENDPOINT: &str = "https://kb.test.local/v1/retrieve";
pub const TEST_TOKEN: &str = "test-token-0123456789abcdef";

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Valid, enabled configuration with short timings so real-clock tests
/// stay fast.
pub fn test_config() -> EnrichmentConfig {
    let mut config = EnrichmentConfig::with_retrieval(TEST_ENDPOINT, TEST_TOKEN);
    config.timeout.default_ms = 500;
    config.timeout.min_ms = 50;
    config.timeout.max_ms = 2_000;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 100;
    config
}

/// Refund-policy knowledge base: two relevant entries, one borderline and
/// one unrelated.
pub fn refund_documents() -> Vec<RetrievedDocument> {
    vec![
        RetrievedDocument::new(
            "Refunds are issued within 5 business days of approval.",
            0.92,
            "kb/refunds.md"
        ),
        RetrievedDocument::new(
            "Refund requests can be made from the orders page.",
            0.81,
            "kb/refunds.md"
        ),
        RetrievedDocument::new(
            "Billing disputes are handled by the finance team.",
            0.58,
            "kb/billing.md"
        ),
        RetrievedDocument::new("We are hiring engineers in Lisbon.", 0.21, "kb/careers.md")
    ]
}

/// `count` documents with descending scores from 0.95, each about `words`
/// words long.
pub fn ranked_documents(count: usize, words: usize) -> Vec<RetrievedDocument> {
    (0..count)
        .map(|i| {
            let text = format!("document {i} ") + &"lorem ".repeat(words.saturating_sub(2));
            RetrievedDocument::new(
                text.trim_end(),
                0.95 - i as f64 * 0.05,
                format!("kb/doc-{i}.md")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_ids_differ() {
        assert_ne!(unique_id("corr"), unique_id("corr"));
    }

    #[test]
    fn test_config_is_valid() {
        assert!(config::validate_config(&test_config()).is_ok());
    }

    #[test]
    fn test_ranked_documents_descend() {
        let docs = ranked_documents(4, 10);
        assert_eq!(docs.len(), 4);
        assert!(docs.windows(2).all(|w| w[0].raw_score > w[1].raw_score));
        assert_eq!(docs[0].text.split_whitespace().count(), 10);
    }
}
