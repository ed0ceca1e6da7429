use async_trait::async_trait;
use config::{EnrichmentConfig, RetrievalConfig, validate_auth_token, validate_endpoint};
use enrich_core::{RetrievalClient, RetrievedDocument, SourceMetadata};
use errors::{ClassifiedError, ConfigError, ErrorClassifier};
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Header carrying the caller's correlation id to the retrieval service.
pub const CORRELATION_HEADER: &str = "x-correlation-id";

/// Source label used when the service returns none.
pub const UNKNOWN_SOURCE: &str = "unknown";

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    query: &'a str,
    k: u32,
    options: RetrieveOptions
}

#[derive(Debug, Serialize)]
struct RetrieveOptions {
    include_metadata: bool,
    include_scores: bool
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    results: Vec<RetrieveHit>
}

#[derive(Debug, Deserialize)]
struct RetrieveHit {
    #[serde(default)]
    text: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    metadata: Option<SourceMetadata>
}

impl RetrieveHit {
    fn into_document(self) -> Option<RetrievedDocument> {
        if self.text.trim().is_empty() {
            return None;
        }
        let mut metadata = self.metadata.unwrap_or_default();
        if metadata.source.trim().is_empty() {
            metadata.source = UNKNOWN_SOURCE.to_string();
        }
        Some(RetrievedDocument {
            text: self.text,
            raw_score: if self.score.is_finite() { self.score } else { 0.0 },
            enhanced_score: None,
            metadata
        })
    }
}

/// Production [`RetrievalClient`]: one bearer-authenticated JSON POST per
/// call.
///
/// The transport timeout is only a ceiling. Per-attempt deadlines, retries
/// and circuit breaking belong to the resilience layer wrapping each call.
pub struct HttpRetrievalClient {
    client: Client,
    endpoint: String,
    auth_token: String,
    include_metadata: bool,
    include_scores: bool
}

impl HttpRetrievalClient {
    /// Build a client, rejecting a missing or malformed endpoint or token.
    pub fn new(config: &RetrievalConfig, timeout: Duration) -> Result<Self, ConfigError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::MissingField {
                field: "retrieval.endpoint".to_string()
            })?;
        validate_endpoint(endpoint)?;

        let auth_token =
            config
                .auth_token
                .as_deref()
                .ok_or_else(|| ConfigError::MissingField {
                    field: "retrieval.auth_token".to_string()
                })?;
        validate_auth_token(auth_token)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Validation {
                message: format!("failed to build HTTP client: {e}")
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            auth_token: auth_token.to_string(),
            include_metadata: config.include_metadata,
            include_scores: config.include_scores
        })
    }

    /// Client whose transport ceiling is the largest per-attempt deadline.
    pub fn from_config(config: &EnrichmentConfig) -> Result<Self, ConfigError> {
        Self::new(&config.retrieval, config.timeout.max_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for HttpRetrievalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRetrievalClient")
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"***")
            .finish()
    }
}

#[async_trait]
impl RetrievalClient for HttpRetrievalClient {
    async fn retrieve(
        &self,
        query: &str,
        top_k: u32,
        correlation_id: &str
    ) -> Result<Vec<RetrievedDocument>, ClassifiedError> {
        let start = Instant::now();
        let body = RetrieveRequest {
            query,
            k: top_k,
            options: RetrieveOptions {
                include_metadata: self.include_metadata,
                include_scores: self.include_scores
            }
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .header(CORRELATION_HEADER, correlation_id)
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status_response(resp).await);
        }

        let parsed: RetrieveResponse = resp.json().await.map_err(classify_transport_error)?;
        let returned = parsed.results.len();
        let documents: Vec<RetrievedDocument> = parsed
            .results
            .into_iter()
            .filter_map(RetrieveHit::into_document)
            .collect();

        tracing::debug!(
            correlation_id,
            returned,
            kept = documents.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Retrieval call completed"
        );
        Ok(documents)
    }

    fn name(&self) -> &str {
        "http_retrieval"
    }
}

async fn classify_status_response(resp: reqwest::Response) -> ClassifiedError {
    let status = resp.status();
    let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
        resp.headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(ErrorClassifier::parse_retry_after)
    } else {
        None
    };

    let body = resp.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    let message = if body.trim().is_empty() {
        format!("retrieval service returned {status}")
    } else {
        format!("retrieval service returned {status}: {}", body.trim())
    };

    ErrorClassifier::classify_status(status.as_u16(), message, retry_after)
}

fn classify_transport_error(err: reqwest::Error) -> ClassifiedError {
    let classified = if err.is_timeout() {
        ClassifiedError::timeout(format!("retrieval request timed out: {err}"))
    } else if err.is_connect() {
        ClassifiedError::network(format!("retrieval service unreachable: {err}"))
    } else if err.is_decode() {
        ClassifiedError::validation(format!("malformed retrieval response: {err}"))
    } else {
        ErrorClassifier::classify_message(&err.to_string())
    };
    classified.with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieval_config(endpoint: Option<&str>, token: Option<&str>) -> RetrievalConfig {
        RetrievalConfig {
            endpoint: endpoint.map(str::to_string),
            auth_token: token.map(str::to_string),
            ..RetrievalConfig::default()
        }
    }

    #[test]
    fn test_new_requires_endpoint_and_token() {
        let err = HttpRetrievalClient::new(&retrieval_config(None, Some("tok")), Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { ref field } if field == "retrieval.endpoint"));

        let err = HttpRetrievalClient::new(
            &retrieval_config(Some("https://kb.example.com/retrieve"), None),
            Duration::from_secs(1)
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField { .. }));
    }

    #[test]
    fn test_new_rejects_malformed_values() {
        let err = HttpRetrievalClient::new(
            &retrieval_config(Some("ftp://kb.example.com"), Some("tok")),
            Duration::from_secs(1)
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));

        let err = HttpRetrievalClient::new(
            &retrieval_config(Some("https://kb.example.com"), Some("has space")),
            Duration::from_secs(1)
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidToken { .. }));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = HttpRetrievalClient::new(
            &retrieval_config(Some("https://kb.example.com/retrieve"), Some("secret-token-value")),
            Duration::from_secs(1)
        )
        .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("secret-token-value"));
        assert_eq!(client.endpoint(), "https://kb.example.com/retrieve");
    }

    #[test]
    fn test_hit_without_source_is_labelled_unknown() {
        let hit: RetrieveHit = serde_json::from_str(r#"{"text":"doc","score":0.4}"#).unwrap();
        let doc = hit.into_document().unwrap();
        assert_eq!(doc.source(), UNKNOWN_SOURCE);
        assert_eq!(doc.raw_score, 0.4);

        let blank: RetrieveHit = serde_json::from_str(r#"{"text":"   ","score":0.9}"#).unwrap();
        assert!(blank.into_document().is_none());
    }
}
