//! OpenAI-compatible embeddings endpoint.

use super::EmbeddingProvider;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    requested_dimensions: Option<usize>,
    client: Client,
}

impl OpenAiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::embedding(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
            requested_dimensions: None,
            client,
        })
    }

    /// Ask the API to shorten vectors to `dimensions`. Only newer embedding
    /// models accept the parameter, so it is sent only when configured.
    pub fn with_requested_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.requested_dimensions = dimensions;
        self
    }

    fn request<'a>(&'a self, input: serde_json::Value) -> EmbeddingRequest<'a> {
        EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.requested_dimensions,
        }
    }

    async fn call_api(&self, input: serde_json::Value) -> AppResult<Vec<Vec<f32>>> {
        let request = self.request(input);

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::embedding(format!("Embedding request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::embedding(format!(
                "Embedding API error ({status}): {body}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::embedding(format!("Failed to parse embedding response: {e}")))?;
        parsed.data.sort_by_key(|d| d.index);
        if let Some(bad) = parsed.data.iter().find(|d| d.embedding.len() != self.dimensions) {
            return Err(AppError::embedding(format!(
                "Expected {}-dimensional embeddings from {}, received {}",
                self.dimensions,
                self.model,
                bad.embedding.len()
            )));
        }

        debug!(
            model = %self.model,
            count = parsed.data.len(),
            "Received embeddings"
        );
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        self.call_api(serde_json::json!(text))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::embedding("No embedding returned"))
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let embeddings = self.call_api(serde_json::json!(texts)).await?;
        if embeddings.len() != texts.len() {
            return Err(AppError::embedding(format!(
                "Expected {} embeddings, received {}",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
