//! HTTP embedding provider for remote embedding APIs.
//!
//! Speaks the common `/embeddings` JSON shape (OpenAI-compatible). Gated
//! behind the `remote-embeddings` feature so the default build stays
//! offline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use super::provider::EmbeddingProvider;
use crate::error::{Error, Result};

/// Remote embedding provider over HTTP.
pub struct RemoteEmbeddingProvider {
    api_key: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
    encoding_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl RemoteEmbeddingProvider {
    pub fn new(base_url: Url, api_key: String, model: String, dimension: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Provider {
                message: format!("failed to build HTTP client: {e}"),
                transient: false,
            })?;
        Ok(Self {
            api_key,
            model,
            dimension,
            client,
            base_url,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join("embeddings")
            .map_err(|e| Error::Provider {
                message: format!("invalid base url: {e}"),
                transient: false,
            })
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: text,
            model: &self.model,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(self.endpoint()?)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider {
                // Connection resets and timeouts are worth another attempt.
                message: format!("request failed: {e}"),
                transient: true,
            })?;

        let status = response.status();
        if !status.is_success() {
            let transient = status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::REQUEST_TIMEOUT;
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Provider {
                message: format!("embedding API error {status}: {body}"),
                transient,
            });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| Error::Provider {
            message: format!("failed to parse embedding response: {e}"),
            transient: false,
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| Error::Provider {
                message: "embedding response contained no data".into(),
                transient: false,
            })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}
