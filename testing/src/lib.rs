//! Shared test support for the enrichment workspace.
//!
//! - In-memory [`RetrievalClient`](enrich_core::RetrievalClient)
//!   implementations: scripted, never-resolving and flaky
//! - Document fixtures and a valid test configuration

mod clients;
pub mod fixtures;

pub use clients::{FailingRetrievalClient, HangingRetrievalClient, MockRetrievalClient};
pub use fixtures::{test_config, unique_id};
