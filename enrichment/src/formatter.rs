//! Context block rendering and token estimation.

use enrich_core::{FormattedContext, RetrievedDocument};

pub const CONTEXT_HEADER: &str = "Relevant context from the knowledge base:";

const ENTRY_SEPARATOR: &str = "\n\n";

/// Rough model-token count: the larger of `chars / 4` and `words * 1.3`,
/// both rounded up.
pub fn estimate_tokens(text: &str) -> u32 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as f64;
    let words = text.split_whitespace().count() as f64;
    let estimate = (chars / 4.0).ceil().max((words * 1.3).ceil());
    if estimate >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        estimate as u32
    }
}

/// `0.873` renders as `87`.
pub fn relevance_percent(score: f64) -> u32 {
    if !score.is_finite() {
        return 0;
    }
    (score.max(0.0).min(1.0) * 100.0).round() as u32
}

/// One labelled entry; `index` is 1-based.
pub fn format_entry(index: usize, doc: &RetrievedDocument) -> String {
    format!(
        "[{index}] Source: {} (relevance: {}%)\n{}",
        doc.source(),
        relevance_percent(doc.effective_score()),
        doc.text.trim()
    )
}

/// Byte range of one entry inside a rendered block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EntrySpan {
    /// Start of the `[n] Source:` label.
    pub start: usize,
    /// Start of the document text, just past the label line.
    pub body: usize,
    pub end: usize
}

/// Rendered block plus the span of each entry.
pub(crate) fn render(documents: &[RetrievedDocument]) -> (String, Vec<EntrySpan>) {
    let mut text = String::from(CONTEXT_HEADER);
    let mut spans = Vec::with_capacity(documents.len());
    for (i, doc) in documents.iter().enumerate() {
        text.push_str(ENTRY_SEPARATOR);
        let start = text.len();
        let entry = format_entry(i + 1, doc);
        let body = start + entry.len() - doc.text.trim().len();
        text.push_str(&entry);
        spans.push(EntrySpan {
            start,
            body,
            end: text.len()
        });
    }
    (text, spans)
}

/// Format ranked `documents` into a context block.
///
/// An empty slice yields an empty context with no header.
pub fn format_context(documents: &[RetrievedDocument]) -> FormattedContext {
    if documents.is_empty() {
        return FormattedContext {
            context_text: String::new(),
            token_count: 0,
            sources: Vec::new(),
            relevance_score: 0.0
        };
    }

    let (context_text, _) = render(documents);
    let mut sources: Vec<String> = Vec::new();
    for doc in documents {
        if !sources.iter().any(|s| s == doc.source()) {
            sources.push(doc.source().to_string());
        }
    }
    let relevance_score =
        documents.iter().map(|d| d.effective_score()).sum::<f64>() / documents.len() as f64;

    FormattedContext {
        token_count: estimate_tokens(&context_text),
        context_text,
        sources,
        relevance_score
    }
}
