//! Text generation provider abstraction.
//!
//! A [`Generator`] turns an assembled [`Prompt`] into a [`Generation`]. The
//! result is a tagged variant rather than a bare string because remote APIs
//! return structured payloads while simpler backends return text; callers
//! unwrap it with [`Generation::into_text`].
//!
//! Generation is a single attempt: no retries. Failures and timeouts are
//! reported as [`RagError::Generation`] / [`RagError::Timeout`] and handled
//! by the orchestrator.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::embedding::{api_key_from_env, build_client};
use crate::error::{RagError, Result};
use crate::models::Role;
use crate::prompt::Prompt;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Raw result of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum Generation {
    /// The backend returned bare text.
    PlainText(String),
    /// The backend returned a structured message.
    Structured {
        content: String,
        finish_reason: Option<String>,
        model: Option<String>,
    },
}

impl Generation {
    /// Normalize to plain text. An empty or whitespace-only answer is a
    /// generation failure.
    pub fn into_text(self) -> Result<String> {
        let text = match self {
            Generation::PlainText(text) => text,
            Generation::Structured { content, .. } => content,
        };
        if text.trim().is_empty() {
            return Err(RagError::Generation("model returned an empty response".into()));
        }
        Ok(text)
    }
}

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &Prompt) -> Result<Generation>;
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        other => Err(RagError::config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

/// Always fails; used when `generation.provider = "disabled"`.
#[derive(Debug)]
pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &Prompt) -> Result<Generation> {
        Err(RagError::Generation("generation provider is disabled".into()))
    }
}

// ============ Gemini ============

/// Generator backed by the Gemini `generateContent` endpoint.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    max_output_tokens: u32,
    temperature: Option<f32>,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::config("generation.model required"))?;
        let model = model.trim_start_matches("models/").to_string();
        Ok(Self {
            model,
            api_key: api_key_from_env("GEMINI_API_KEY")?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            client: build_client(config.timeout())?,
            timeout: config.timeout(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        let contents: Vec<Value> = prompt
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                };
                json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut generation_config = json!({ "maxOutputTokens": self.max_output_tokens });
        if let Some(t) = self.temperature {
            generation_config["temperature"] = json!(t);
        }

        json!({
            "systemInstruction": { "parts": [{ "text": prompt.system }] },
            "contents": contents,
            "generationConfig": generation_config,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt));
        let json = send_once(request, self.timeout).await?;
        parse_gemini_generation(&json)
    }
}

fn parse_gemini_generation(json: &Value) -> Result<Generation> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            RagError::Generation(format!("invalid Gemini response: {}", reason))
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| RagError::Generation("invalid Gemini response: missing parts".into()))?;

    let content: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(Generation::Structured {
        content,
        finish_reason: candidate
            .get("finishReason")
            .and_then(|r| r.as_str())
            .map(str::to_string),
        model: json
            .get("modelVersion")
            .and_then(|m| m.as_str())
            .map(str::to_string),
    })
}

// ============ OpenAI ============

/// Generator backed by the OpenAI chat completions endpoint.
pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    base_url: String,
    client: reqwest::Client,
    timeout: Duration,
    max_output_tokens: u32,
    temperature: Option<f32>,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| RagError::config("generation.model required"))?;
        Ok(Self {
            model,
            api_key: api_key_from_env("OPENAI_API_KEY")?,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            client: build_client(config.timeout())?,
            timeout: config.timeout(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        })
    }

    fn request_body(&self, prompt: &Prompt) -> Value {
        let mut messages = vec![json!({ "role": "system", "content": prompt.system })];
        for m in &prompt.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": m.content }));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_output_tokens,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        body
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &Prompt) -> Result<Generation> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(prompt));
        let json = send_once(request, self.timeout).await?;
        parse_openai_generation(&json)
    }
}

fn parse_openai_generation(json: &Value) -> Result<Generation> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| RagError::Generation("invalid OpenAI response: no choices".into()))?;

    let content = choice
        .pointer("/message/content")
        .and_then(|c| c.as_str())
        .ok_or_else(|| RagError::Generation("invalid OpenAI response: missing content".into()))?;

    Ok(Generation::Structured {
        content: content.to_string(),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|r| r.as_str())
            .map(str::to_string),
        model: json.get("model").and_then(|m| m.as_str()).map(str::to_string),
    })
}

async fn send_once(request: reqwest::RequestBuilder, timeout: Duration) -> Result<Value> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            RagError::Timeout {
                operation: "generation",
                after: timeout,
            }
        } else {
            RagError::Generation(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        return Err(RagError::Generation(format!(
            "API error {}: {}",
            status, body_text
        )));
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| RagError::Generation(format!("invalid JSON response: {}", e)))
}
