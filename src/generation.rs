//! Generative-text capability and the tutoring prompt.
//!
//! Generation is an opaque text-in/text-out contract; the core never
//! depends on a specific vendor or on the wording a model produces.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};

/// Prompt template for grounded tutoring answers. `{context}` and
/// `{query}` are substituted by [`build_prompt`].
pub const TUTOR_PROMPT: &str = "\
You are an expert tutor for Class 12 students. Use the following context \
from textbooks and educational materials to answer the student's question.

Context:
{context}

Student's Question: {query}

Instructions:
1. Provide a clear, accurate answer based on the context provided
2. Use simple language appropriate for Class 12 students
3. Include relevant examples or explanations
4. If the context doesn't contain enough information, acknowledge this
5. Cite the sources used in your answer

Answer:";

/// Fill the tutoring prompt with a context block and the student's query.
pub fn build_prompt(context: &str, query: &str) -> String {
    TUTOR_PROMPT
        .replace("{context}", context)
        .replace("{query}", query)
}

/// Capability contract for text generation.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Model identifier, recorded in response metadata.
    fn model_name(&self) -> &str;

    /// Generate a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Generation provider backed by an OpenAI-compatible chat-completions
/// endpoint. Same retry discipline as the other REST clients: 429/5xx and
/// network errors back off and retry, other client errors fail fast.
pub struct RestGenerationClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    max_retries: u32,
}

impl RestGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                RagError::generation(format!("failed to build HTTP client: {}", e), false)
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: std::env::var(&config.api_key_env).ok(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl GenerationProvider for RestGenerationClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, delay_secs = delay.as_secs(), "retrying generation request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(&self.endpoint).json(&body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::generation(
                                format!("invalid generation response: {}", e),
                                false,
                            )
                        })?;
                        return parse_generation_response(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(RagError::generation(
                            format!("generation API error {}: {}", status, body_text),
                            true,
                        ));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RagError::generation(
                        format!("generation API error {}: {}", status, body_text),
                        false,
                    ));
                }
                Err(e) => {
                    last_err = Some(RagError::generation(
                        format!("generation request failed: {}", e),
                        true,
                    ));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::generation("generation failed after retries", true)))
    }
}

fn parse_generation_response(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::generation("invalid response: missing message content", false))
}
