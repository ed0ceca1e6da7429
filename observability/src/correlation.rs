//! # Correlation Scope
//!
//! Every enrichment call gets a correlation id (the caller's, or a fresh
//! one). The id lives in a [`tracing::Span`] attached to the call's future
//! with `Instrument`, so it is visible to every event the call emits and
//! disappears with the call. Nothing is stored on a shared logger.

use chrono::{DateTime, Utc};
use enrich_core::EnrichOptions;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrelationContext {
    pub correlation_id: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub started_at: DateTime<Utc>
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::with_id(utils::generate_correlation_id())
    }

    pub fn with_id(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            user_id: None,
            conversation_id: None,
            started_at: Utc::now()
        }
    }

    /// Scope for one enrichment call. Blank caller ids are replaced.
    pub fn from_options(options: &EnrichOptions) -> Self {
        let mut ctx = match options
            .correlation_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
        {
            Some(id) => Self::with_id(id),
            None => Self::new()
        };
        ctx.user_id.clone_from(&options.user_id);
        ctx.conversation_id.clone_from(&options.conversation_id);
        ctx
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    /// Span carrying the correlation fields for `operation`.
    pub fn span(&self, operation: &'static str) -> tracing::Span {
        tracing::info_span!(
            "enrichment",
            operation = operation,
            correlation_id = %self.correlation_id,
            user_id = self.user_id.as_deref().unwrap_or("-"),
            conversation_id = self.conversation_id.as_deref().unwrap_or("-")
        )
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }
}

impl Default for CorrelationContext {
    fn default() -> Self {
        Self::new()
    }
}
