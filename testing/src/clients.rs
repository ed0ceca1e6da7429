use async_trait::async_trait;
use enrich_core::{RetrievalClient, RetrievedDocument};
use errors::ClassifiedError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Scripted client: always answers with the same documents or the same
/// error, recording every call.
pub struct MockRetrievalClient {
    response: Result<Vec<RetrievedDocument>, ClassifiedError>,
    delay: Option<Duration>,
    calls: AtomicU32,
    last_query: Mutex<Option<String>>,
    last_correlation_id: Mutex<Option<String>>
}

impl MockRetrievalClient {
    pub fn with_documents(documents: Vec<RetrievedDocument>) -> Self {
        Self::scripted(Ok(documents))
    }

    pub fn failing(error: ClassifiedError) -> Self {
        Self::scripted(Err(error))
    }

    fn scripted(response: Result<Vec<RetrievedDocument>, ClassifiedError>) -> Self {
        Self {
            response,
            delay: None,
            calls: AtomicU32::new(0),
            last_query: Mutex::new(None),
            last_correlation_id: Mutex::new(None)
        }
    }

    /// Sleep (on the tokio clock) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().clone()
    }

    pub fn last_correlation_id(&self) -> Option<String> {
        self.last_correlation_id.lock().clone()
    }
}

#[async_trait]
impl RetrievalClient for MockRetrievalClient {
    async fn retrieve(
        &self,
        query: &str,
        top_k: u32,
        correlation_id: &str
    ) -> Result<Vec<RetrievedDocument>, ClassifiedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock() = Some(query.to_string());
        *self.last_correlation_id.lock() = Some(correlation_id.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.response
            .clone()
            .map(|docs| docs.into_iter().take(top_k as usize).collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Client whose calls never complete.
#[derive(Debug, Default)]
pub struct HangingRetrievalClient {
    calls: AtomicU32
}

impl HangingRetrievalClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalClient for HangingRetrievalClient {
    async fn retrieve(
        &self,
        _query: &str,
        _top_k: u32,
        _correlation_id: &str
    ) -> Result<Vec<RetrievedDocument>, ClassifiedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// Fails the first `failures` calls with `error`, then answers with
/// `documents`.
pub struct FailingRetrievalClient {
    failures: u32,
    error: ClassifiedError,
    documents: Vec<RetrievedDocument>,
    calls: AtomicU32
}

impl FailingRetrievalClient {
    pub fn new(failures: u32, error: ClassifiedError, documents: Vec<RetrievedDocument>) -> Self {
        Self {
            failures,
            error,
            documents,
            calls: AtomicU32::new(0)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RetrievalClient for FailingRetrievalClient {
    async fn retrieve(
        &self,
        _query: &str,
        _top_k: u32,
        correlation_id: &str
    ) -> Result<Vec<RetrievedDocument>, ClassifiedError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            tracing::debug!(correlation_id, call, "Scripted retrieval failure");
            return Err(self.error.clone());
        }
        Ok(self.documents.clone())
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use errors::ErrorKind;

    #[tokio::test]
    async fn test_mock_records_calls_and_truncates_to_top_k() {
        let client = MockRetrievalClient::with_documents(crate::fixtures::refund_documents());
        let docs = client.retrieve("refunds", 2, "corr-7").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(client.calls(), 1);
        assert_eq!(client.last_query().as_deref(), Some("refunds"));
        assert_eq!(client.last_correlation_id().as_deref(), Some("corr-7"));
    }

    #[tokio::test]
    async fn test_failing_client_recovers() {
        let client = FailingRetrievalClient::new(
            2,
            ClassifiedError::network("reset"),
            crate::fixtures::refund_documents()
        );
        for _ in 0..2 {
            let err = client.retrieve("q", 5, "c").await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Network);
        }
        assert_eq!(client.retrieve("q", 5, "c").await.unwrap().len(), 4);
        assert_eq!(client.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_client_never_answers() {
        let client = HangingRetrievalClient::new();
        let result =
            tokio::time::timeout(Duration::from_secs(60), client.retrieve("q", 5, "c")).await;
        assert!(result.is_err());
        assert_eq!(client.calls(), 1);
    }
}
