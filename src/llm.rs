//! Chat model clients.
//!
//! | Provider | Backend | Endpoint |
//! |----------|---------|----------|
//! | `ollama` | [`OllamaChat`] | `POST {base}/api/chat` (default `http://localhost:11434`) |
//! | `openai` | [`OpenAiChat`] | `POST {base}/chat/completions` (default `https://api.openai.com/v1`, `OPENAI_API_KEY`) |
//! | `together` | [`OpenAiChat`] | `POST {base}/chat/completions` (default `https://api.together.xyz/v1`, `TOGETHER_API_KEY`) |
//!
//! [`create_chat_model`] builds a fresh client from configuration.
//! [`shared_chat_model`] caches the first client it builds for the rest of
//! the process; callers receive an `Arc` handle and pass it down.
//!
//! Chat calls are never retried: any HTTP or decoding failure is returned
//! to the caller.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;

/// A model that answers a single free-text prompt.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider name, e.g. `"ollama"`.
    fn name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str) -> Result<String>;
}

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const TOGETHER_BASE_URL: &str = "https://api.together.xyz/v1";

static SHARED: OnceLock<Arc<dyn ChatModel>> = OnceLock::new();

/// Process-wide chat model.
///
/// The first successful call constructs the client from `config`; every
/// later call returns that same instance and ignores its argument.
pub fn shared_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    if let Some(model) = SHARED.get() {
        return Ok(Arc::clone(model));
    }
    let model = create_chat_model(config)?;
    Ok(Arc::clone(SHARED.get_or_init(|| model)))
}

/// Build a new chat client for the configured provider.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiChat::new(
            "openai",
            config,
            OPENAI_BASE_URL,
            "OPENAI_API_KEY",
        )?)),
        "together" => Ok(Arc::new(OpenAiChat::new(
            "together",
            config,
            TOGETHER_BASE_URL,
            "TOGETHER_API_KEY",
        )?)),
        other => bail!("Unsupported LLM provider: {}", other),
    }
}

// ============ Ollama ============

pub struct OllamaChat {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "stream": false,
        });

        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama chat request");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.base_url))?;

        let json = read_json(response, "Ollama").await?;
        parse_ollama_chat(&json)
    }
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
}

// ============ OpenAI-compatible ============

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAiChat {
    provider: &'static str,
    model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// # Errors
    ///
    /// Returns an error if `api_key_env` is not set in the environment.
    pub fn new(
        provider: &'static str,
        config: &LlmConfig,
        default_base_url: &str,
        api_key_env: &str,
    ) -> Result<Self> {
        let api_key = std::env::var(api_key_env)
            .map_err(|_| anyhow::anyhow!("{} environment variable not set", api_key_env))?;
        Self::with_api_key(provider, config, default_base_url, api_key)
    }

    pub fn with_api_key(
        provider: &'static str,
        config: &LlmConfig,
        default_base_url: &str,
        api_key: String,
    ) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url.to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            provider,
            model: config.model.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn name(&self) -> &str {
        self.provider
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        debug!(provider = self.provider, model = %self.model, "chat completion request");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("{} connection error ({})", self.provider, url))?;

        let json = read_json(response, self.provider).await?;
        parse_chat_completion(&json)
    }
}

fn parse_chat_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("Invalid chat completion response: missing choices[0].message.content"))
}

async fn read_json(response: reqwest::Response, service: &str) -> Result<serde_json::Value> {
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", service, status, body_text);
    }
    Ok(response.json().await?)
}
