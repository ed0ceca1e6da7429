//! # Observability
//!
//! Operational visibility for the context enrichment system:
//! - [`TracingSink`]: the production [`enrich_core::EventSink`], backed by
//!   `tracing`
//! - [`MemorySink`]: records events in memory for assertions in tests
//! - [`CorrelationContext`]: per-request correlation scope, attached to the
//!   request's future as a `tracing` span
//! - [`init_subscriber`]: installs the process-wide subscriber at the
//!   composition root

pub mod correlation;
pub mod sink;
pub mod subscriber;

pub use correlation::CorrelationContext;
pub use sink::{MemorySink, RecordedEvent, TracingSink};
pub use subscriber::{SubscriberError, init_subscriber};
