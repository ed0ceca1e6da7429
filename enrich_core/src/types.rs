//! Request-scoped data model.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Provenance attached to a retrieved document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceMetadata {
    #[serde(default)]
    pub source: String,

    /// Any additional metadata the retrieval service returned.
    #[serde(default, flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>
}

/// A document returned by the retrieval service.
///
/// Produced by the retrieval call, filtered by the relevance stage and
/// discarded after formatting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    pub raw_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enhanced_score: Option<f64>,
    pub metadata: SourceMetadata
}

impl RetrievedDocument {
    pub fn new(text: impl Into<String>, raw_score: f64, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw_score,
            enhanced_score: None,
            metadata: SourceMetadata {
                source: source.into(),
                extra: serde_json::Map::new()
            }
        }
    }

    /// Score used for filtering and ranking: the enhanced score when one
    /// was computed, the raw similarity otherwise.
    pub fn effective_score(&self) -> f64 {
        self.enhanced_score.unwrap_or(self.raw_score)
    }

    pub fn source(&self) -> &str {
        &self.metadata.source
    }
}

/// Caller-supplied options for one enrichment call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichOptions {
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub correlation_id: Option<String>,
    pub language: Option<String>
}

impl EnrichOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// One enrichment attempt, carried through the whole pipeline for
/// correlation. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichmentRequest {
    pub sanitized_query: String,
    pub user_id: Option<String>,
    pub conversation_id: Option<String>,
    pub correlation_id: String,
    pub language: Option<String>
}

/// Formatter output, before token optimization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedContext {
    pub context_text: String,
    pub token_count: u32,
    pub sources: Vec<String>,
    /// Mean effective score of the included documents.
    pub relevance_score: f64
}

/// How an over-budget context was brought within budget.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OptimizationStrategy {
    /// Drop the least relevant documents first; hard-truncate the last one
    /// if it alone still exceeds the budget.
    DropLowestRelevance,
    /// Cut the formatted block at the budget.
    HardTruncate
}

/// Terminal artifact of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizedContext {
    pub optimized_text: String,
    pub token_count: u32,
    /// `token_count / original token count`; 1.0 when nothing was removed.
    pub compression_ratio: f64,
    /// True when any content (documents or text) was removed.
    pub truncated: bool,
    /// `None` when the formatted block already fit the budget.
    pub strategy: Option<OptimizationStrategy>,
    pub documents_included: usize
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool
}

/// One entry of an outbound conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String
}

impl Message {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn is_system(&self) -> bool {
        self.role == MessageRole::System
    }
}
