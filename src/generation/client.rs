//! Ollama generation client
//!
//! Streams tokens from POST /api/generate and accumulates them into a
//! complete response. The whole call runs under an explicit timeout,
//! separate from any outer request deadline: a hung generation must not
//! hold a support conversation hostage.

use crate::errors::{PipelineError, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default per-call generation timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// A completed generation
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    pub tokens_used: u32,
}

/// Generation model client
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion for `prompt`, bounded by `max_tokens`
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation>;
}

/// Ollama streaming client
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaGenerator {
    /// Create new Ollama client with default settings
    pub fn new() -> Result<Self> {
        Self::with_config(DEFAULT_OLLAMA_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT)
    }

    /// Create Ollama client with custom configuration
    pub fn with_config(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(PipelineError::Http)?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
            timeout,
        })
    }

    /// Check if Ollama is available
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// Get current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn generate_inner(&self, prompt: &str, max_tokens: u32) -> Result<Generation> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaGenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: true,
            options: Some(OllamaOptions {
                num_predict: max_tokens,
                temperature: 0.3,
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::GenerationFailed(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PipelineError::GenerationFailed(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut text = String::new();
        let mut tokens_used = 0u32;

        while let Some(item) = stream.next().await {
            let bytes = item
                .map_err(|e| PipelineError::GenerationFailed(format!("stream error: {}", e)))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // Ollama emits one JSON object per line
            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let chunk: OllamaStreamChunk = serde_json::from_str(line).map_err(|e| {
                    PipelineError::GenerationFailed(format!("malformed stream chunk: {}", e))
                })?;

                text.push_str(&chunk.response);

                if chunk.done {
                    tokens_used = chunk.prompt_eval_count.unwrap_or(0)
                        + chunk.eval_count.unwrap_or(0);
                }
            }
        }

        Ok(Generation { text, tokens_used })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Result<Generation> {
        match tokio::time::timeout(self.timeout, self.generate_inner(prompt, max_tokens)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::GenerationTimeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

/// Ollama generate request
#[derive(Debug, Clone, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

/// Generation options forwarded to Ollama
#[derive(Debug, Clone, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

/// One line of the Ollama streaming response
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OllamaGenerator::new();
        assert!(client.is_ok());

        let client = client.unwrap();
        assert_eq!(client.model(), DEFAULT_MODEL);
        assert_eq!(client.base_url(), DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn test_client_with_config() {
        let client = OllamaGenerator::with_config(
            "http://localhost:11434",
            "llama3:8b",
            Duration::from_secs(20),
        );
        assert!(client.is_ok());

        let client = client.unwrap();
        assert_eq!(client.model(), "llama3:8b");
        assert_eq!(client.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_stream_chunk_parsing() {
        let line = r#"{"model":"qwen2.5:7b-instruct","response":"Hola","done":false}"#;
        let chunk: OllamaStreamChunk = serde_json::from_str(line).unwrap();
        assert_eq!(chunk.response, "Hola");
        assert!(!chunk.done);

        let last = r#"{"response":"","done":true,"prompt_eval_count":120,"eval_count":80}"#;
        let chunk: OllamaStreamChunk = serde_json::from_str(last).unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.prompt_eval_count, Some(120));
        assert_eq!(chunk.eval_count, Some(80));
    }
}
