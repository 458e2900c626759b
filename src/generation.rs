//! Text generation capability and the hosted chat-completions client.
//!
//! The orchestrator calls [`Generator::generate`] with a fully assembled
//! prompt and gets the completion text back. [`ChatCompletionsGenerator`]
//! speaks the OpenAI-compatible `POST {base_url}/chat/completions` protocol,
//! which both the Hugging Face inference router and OpenAI accept.
//!
//! Generation is not retried: a failed or timed-out call fails the request
//! and the caller decides whether to ask again.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::{RagError, Result};

const HF_ROUTER_URL: &str = "https://router.huggingface.co/v1";
const OPENAI_URL: &str = "https://api.openai.com/v1";

/// Produces a completion for a prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Returns the model identifier used for completions.
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the [`Generator`] named by `config.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    let base_url = match (config.base_url.as_deref(), config.provider.as_str()) {
        (Some(url), _) => url.to_string(),
        (None, "huggingface") => HF_ROUTER_URL.to_string(),
        (None, "openai") => OPENAI_URL.to_string(),
        (None, other) => {
            return Err(RagError::InvalidInput(format!(
                "Unknown generation provider: {}",
                other
            )))
        }
    };
    Ok(Arc::new(ChatCompletionsGenerator::new(config, base_url)?))
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// The prompt is sent as a single user message. The API key is read from the
/// environment variable named by `generation.api_key_env` on every call.
pub struct ChatCompletionsGenerator {
    model: String,
    temperature: f32,
    max_tokens: u32,
    endpoint: String,
    api_key_env: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl ChatCompletionsGenerator {
    pub fn new(config: &GenerationConfig, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Generation(e.to_string()))?;

        Ok(Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key_env: config.api_key_env.clone(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false,
        })
    }

    fn timeout_or(&self, e: reqwest::Error) -> RagError {
        if e.is_timeout() {
            RagError::GenerationTimeout(self.timeout_secs)
        } else {
            RagError::Generation(e.to_string())
        }
    }
}

#[async_trait]
impl Generator for ChatCompletionsGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var(&self.api_key_env).map_err(|_| {
            RagError::UpstreamAuth(format!(
                "API token not found: set the {} environment variable",
                self.api_key_env
            ))
        })?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| self.timeout_or(e))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::UpstreamAuth(format!(
                "generation API rejected credential ({}): {}",
                status, body_text
            )));
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| self.timeout_or(e))?;
        parse_completion(&json)
    }
}

/// Extract `choices[0].message.content` from a chat-completions response.
fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|t| t.as_str())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| {
            RagError::Generation("invalid response: missing choices[0].message.content".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  The code is 2591.\n" } }]
        });
        assert_eq!(parse_completion(&json).unwrap(), "The code is 2591.");
        assert!(matches!(
            parse_completion(&serde_json::json!({ "choices": [] })),
            Err(RagError::Generation(_))
        ));
    }

    #[test]
    fn test_endpoint_and_body() {
        let config = GenerationConfig::default();
        let g = ChatCompletionsGenerator::new(&config, "https://example.test/v1/".into()).unwrap();
        assert_eq!(g.endpoint, "https://example.test/v1/chat/completions");

        let body = g.request_body("hello");
        assert_eq!(body["model"], "mistralai/Mistral-7B-Instruct-v0.3");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn test_provider_selects_base_url() {
        let g = create_generator(&GenerationConfig::default()).unwrap();
        assert_eq!(g.model_name(), "mistralai/Mistral-7B-Instruct-v0.3");

        let bad = GenerationConfig {
            provider: "carrier-pigeon".into(),
            ..GenerationConfig::default()
        };
        assert!(create_generator(&bad).is_err());
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_error() {
        let config = GenerationConfig {
            api_key_env: "LOREKEEPER_TEST_UNSET_GEN_KEY".to_string(),
            ..GenerationConfig::default()
        };
        let g = ChatCompletionsGenerator::new(&config, HF_ROUTER_URL.to_string()).unwrap();
        match g.generate("prompt").await {
            Err(RagError::UpstreamAuth(msg)) => {
                assert!(msg.contains("LOREKEEPER_TEST_UNSET_GEN_KEY"))
            }
            other => panic!("expected UpstreamAuth, got {:?}", other),
        }
    }
}
