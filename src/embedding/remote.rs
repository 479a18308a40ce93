//! Remote embedding provider.
//!
//! Calls an OpenAI-style embeddings endpoint with a hard timeout and bounded
//! exponential-backoff retry. Transport/HTTP failures and malformed 2xx
//! bodies surface as distinct error variants so the vectorizer can decide
//! whether the fallback embedder should take over.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Result, StrataError};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

/// Accepts both the OpenAI list shape and a bare `{embedding: [...]}` body,
/// since self-hosted embedding services commonly return the latter.
#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    List { data: Vec<EmbeddingDatum> },
    Single { embedding: Vec<f32> },
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            Self::List { data } => data.into_iter().next().map(|d| d.embedding),
            Self::Single { embedding } => Some(embedding),
        }
    }
}

pub struct RemoteProvider {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
    max_retries: u32,
}

impl RemoteProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(5)))
            .build()
            .map_err(|e| StrataError::Transport(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimensions: config.dimensions,
            max_retries: config.max_retries,
        })
    }

    fn request_once(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input: text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .map_err(|e| StrataError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StrataError::Transport(format!(
                "embedding endpoint returned {status}"
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .map_err(|e| StrataError::MalformedResponse(e.to_string()))?;

        let vector = body
            .into_vector()
            .ok_or_else(|| StrataError::MalformedResponse("empty data array".into()))?;

        if vector.len() != self.dimensions {
            return Err(StrataError::MalformedResponse(format!(
                "expected {} dimensions, got {}",
                self.dimensions,
                vector.len()
            )));
        }

        Ok(vector)
    }
}

impl EmbeddingProvider for RemoteProvider {
    /// Retries transport failures with exponential backoff; malformed
    /// responses fail immediately since a retry would re-parse the same shape.
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            match self.request_once(text) {
                Ok(vector) => {
                    debug!(attempt, "remote embedding succeeded");
                    return Ok(vector);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    warn!(attempt, error = %e, "remote embedding failed, retrying");
                    std::thread::sleep(backoff);
                    backoff *= 2;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| StrataError::Transport("retries exhausted".into())))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(endpoint: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "remote".into(),
            endpoint: endpoint.into(),
            timeout_secs: 1,
            max_retries: 0,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn unreachable_endpoint_is_transport_error() {
        // Reserved TEST-NET-1 address; nothing listens there.
        let provider = RemoteProvider::new(&test_config("http://192.0.2.1:9/v1/embeddings")).unwrap();
        let err = provider.embed("hello").unwrap_err();
        assert!(matches!(err, StrataError::Transport(_)), "got {err:?}");
    }

    #[test]
    fn openai_response_shape_parses() {
        let body = r#"{"data":[{"embedding":[0.1,0.2,0.3]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_vector(), Some(vec![0.1, 0.2, 0.3]));
    }

    #[test]
    fn bare_embedding_shape_parses() {
        let body = r#"{"embedding":[0.4,0.5]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.into_vector(), Some(vec![0.4, 0.5]));
    }

    #[test]
    fn missing_data_is_malformed() {
        let body = r#"{"object":"list"}"#;
        assert!(serde_json::from_str::<EmbeddingResponse>(body).is_err());
    }
}
