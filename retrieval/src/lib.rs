//! # Retrieval
//!
//! HTTP implementation of [`enrich_core::RetrievalClient`].
//!
//! Wire format:
//!
//! ```text
//! POST {endpoint}
//! Authorization: Bearer {token}
//! x-correlation-id: {id}
//!
//! {"query": "...", "k": 5, "options": {"include_metadata": true, "include_scores": true}}
//! ```
//!
//! answered by `{"results": [{"text": "...", "score": 0.82, "metadata": {"source": "..."}}]}`.
//! Non-2xx statuses and transport failures come back as classified errors.

mod http;

pub use http::{CORRELATION_HEADER, HttpRetrievalClient, UNKNOWN_SOURCE};
