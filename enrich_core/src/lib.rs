//! # Context Enrichment Core
//!
//! Shared types and traits for the context enrichment system.
//!
//! This crate provides:
//! - Request-scoped data model (retrieved documents, formatted and optimized
//!   contexts, conversation messages)
//! - The narrow seams the rest of the workspace is wired through:
//!   [`RetrievalClient`] for the external retrieval service and
//!   [`EventSink`] for structured log events
//!
//! Nothing here holds process-wide state.

pub mod traits;
pub mod types;

pub use traits::{EventSink, LogLevel, NoopSink, RetrievalClient};
pub use types::{
    EnrichOptions, EnrichmentRequest, FormattedContext, Message, MessageRole,
    OptimizationStrategy, OptimizedContext, RetrievedDocument, SourceMetadata
};
