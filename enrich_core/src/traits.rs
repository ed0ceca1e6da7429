//! Core traits for the context enrichment system

use async_trait::async_trait;
use errors::ClassifiedError;
use serde::{Deserialize, Serialize};

use crate::types::RetrievedDocument;

/// Client for the external retrieval service.
///
/// The production implementation speaks HTTP; tests use in-memory
/// implementations. Implementations must not retry or time out on their own:
/// the resilience layers wrap every call.
#[async_trait]
pub trait RetrievalClient: Send + Sync {
    async fn retrieve(
        &self,
        query: &str,
        top_k: u32,
        correlation_id: &str
    ) -> Result<Vec<RetrievedDocument>, ClassifiedError>;

    /// Short name used in logs and health output.
    fn name(&self) -> &str {
        "retrieval"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR"
        }
    }
}

/// Narrow structured-logging capability.
///
/// Components that must not depend on a concrete logger (configuration
/// loading in particular) take a `&dyn EventSink`; the composition root
/// decides what backs it.
pub trait EventSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, String)]);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn log(&self, _level: LogLevel, _message: &str, _fields: &[(&str, String)]) {}
}
