//! Hosted chat model clients.
//!
//! A [`ChatModel`] takes one fully built prompt and returns the model's
//! text. There is no conversation history: every call is a single user turn.
//!
//! | `[llm].provider` | Endpoint |
//! |------------------|----------|
//! | `bedrock` | `bedrock-runtime` `InvokeModel`, Anthropic messages body |
//! | `openai` | `POST /v1/chat/completions` |
//! | `ollama` | `POST /api/chat` with `stream: false` |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::aws::{uri_encode, AwsClient, AwsRequest};
use crate::config::{Config, LlmConfig};

const ANTHROPIC_BEDROCK_VERSION: &str = "bedrock-2023-05-31";

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn invoke(&self, prompt: &str) -> Result<String>;
}

/// Create the [`ChatModel`] selected by `[llm].provider`.
pub fn create_chat_model(config: &Config) -> Result<Box<dyn ChatModel>> {
    let llm = &config.llm;
    match llm.provider.as_str() {
        "bedrock" => {
            let client = AwsClient::from_env(&config.aws, Duration::from_secs(llm.timeout_secs))?;
            Ok(Box::new(BedrockChat::new(llm, client)))
        }
        "openai" => Ok(Box::new(OpenAIChat::new(llm)?)),
        "ollama" => Ok(Box::new(OllamaChat::new(llm)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

// ============ Bedrock ============

/// Anthropic models hosted on Bedrock.
pub struct BedrockChat {
    model: String,
    max_tokens: u32,
    client: AwsClient,
}

impl BedrockChat {
    pub fn new(config: &LlmConfig, client: AwsClient) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        }
    }
}

#[async_trait]
impl ChatModel for BedrockChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "anthropic_version": ANTHROPIC_BEDROCK_VERSION,
            "max_tokens": self.max_tokens,
            "messages": [{
                "role": "user",
                "content": [{ "type": "text", "text": prompt }],
            }],
        });

        let resp = self
            .client
            .send(AwsRequest {
                service: "bedrock",
                host: format!("bedrock-runtime.{}.amazonaws.com", self.client.region()),
                method: reqwest::Method::POST,
                path: format!("/model/{}/invoke", uri_encode(&self.model)),
                headers: vec![
                    ("content-type".to_string(), "application/json".to_string()),
                    ("accept".to_string(), "application/json".to_string()),
                ],
                body: serde_json::to_vec(&body)?,
            })
            .await?;

        let json: serde_json::Value = resp.json().await?;
        parse_anthropic_response(&json)
    }
}

/// Concatenate the `text` blocks of an Anthropic messages response.
fn parse_anthropic_response(json: &serde_json::Value) -> Result<String> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Bedrock response: missing content"))?;

    Ok(content
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

// ============ OpenAI ============

/// OpenAI chat completions (or a compatible server via `[llm].url`).
pub struct OpenAIChat {
    model: String,
    max_tokens: u32,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set")?;
        Ok(Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("OpenAI API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ============ Ollama ============

/// Local models served by Ollama. Defaults to `http://localhost:11434`.
pub struct OllamaChat {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()?,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Ollama API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_anthropic_response_joins_text_blocks() {
        let json = json!({
            "id": "msg_1",
            "content": [
                {"type": "text", "text": "Hello, "},
                {"type": "tool_use", "id": "t1"},
                {"type": "text", "text": "world."}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(parse_anthropic_response(&json).unwrap(), "Hello, world.");
    }

    #[test]
    fn test_parse_anthropic_response_missing_content() {
        assert!(parse_anthropic_response(&json!({"message": "throttled"})).is_err());
    }

    #[test]
    fn test_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "nope".to_string();
        assert!(create_chat_model(&config).is_err());
    }
}
