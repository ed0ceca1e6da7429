//! # Context Enrichment Utilities
//!
//! Small helpers shared across the workspace: correlation-id generation,
//! cache-key hashing and secret masking.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a fresh correlation id (UUID v4).
#[must_use]
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Compute the cache key for a retrieval query.
///
/// The key covers everything that changes the retrieval result: the
/// sanitized query text and the requested result count.
///
/// # Examples
///
/// ```
/// use utils::compute_query_hash;
///
/// let key = compute_query_hash("rust async traits", 5);
/// assert_eq!(key.len(), 64);
/// ```
#[must_use]
pub fn compute_query_hash(query: &str, top_k: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hasher.update([0u8]);
    hasher.update(top_k.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Mask a secret for logs and introspection, keeping only the last four
/// characters of secrets long enough to make that safe.
#[must_use]
pub fn mask_secret(secret: &str) -> String {
    let len = secret.chars().count();
    if len == 0 {
        return String::new();
    }
    if len < 12 {
        return "***".to_string();
    }
    let tail: String = secret.chars().skip(len - 4).collect();
    format!("***{tail}")
}
