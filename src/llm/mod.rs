//! Chat-completion client and the question-to-SQL translator.

mod nl_to_sql;

pub use nl_to_sql::SqlTranslator;

use crate::config::LlmSettings;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sends a prompt to a language model and returns its reply text.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> AppResult<String>;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    api_key: String,
    base_url: String,
    settings: LlmSettings,
    client: Client,
}

impl OpenAiChat {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        settings: LlmSettings,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::llm(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            settings,
            client,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let mut body = json!({
            "model": self.settings.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.settings.temperature,
        });
        if let Some(max_tokens) = self.settings.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if self.settings.json_mode {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChat {
    async fn complete(&self, prompt: &str) -> AppResult<String> {
        debug!(model = %self.settings.model, prompt_len = prompt.len(), "Requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| AppError::llm(format!("Completion request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::llm(format!("Failed to read completion response: {e}")))?;
        if !status.is_success() {
            return Err(AppError::llm(format!("Completion API error ({status}): {body}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::llm(format!("Failed to parse completion response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AppError::llm("No completion returned"))
    }

    fn model_name(&self) -> &str {
        &self.settings.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_defaults() {
        let chat = OpenAiChat::new("sk", "http://localhost/v1", LlmSettings::default()).unwrap();
        let body = chat.request_body("hi");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_request_body_plain_text_with_limit() {
        let settings = LlmSettings {
            max_tokens: Some(256),
            json_mode: false,
            ..LlmSettings::default()
        };
        let chat = OpenAiChat::new("sk", "http://localhost/v1", settings).unwrap();
        let body = chat.request_body("hi");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("response_format").is_none());
    }
}
