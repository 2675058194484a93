//! Answer generator implementations and selection.
//!
//! Every generator receives the full prompt built by
//! [`build_prompt`](docqa_core::generation::build_prompt): all retrieved
//! chunks stuffed into one single-turn request.
//!
//! | Provider | Endpoint |
//! |----------|----------|
//! | `gemini` | `POST {base}/v1beta/models/{model}:generateContent` |
//! | `openai` | `POST {base}/v1/chat/completions` |
//! | `ollama` | `POST {base}/api/generate` |
//! | `extractive` | none, returns the most relevant passage |

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use docqa_core::generation::{build_prompt, AnswerGenerator};
use docqa_core::models::Chunk;
use docqa_core::RagError;

use crate::config::GenerationConfig;
use crate::http;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Sampling settings shared by the hosted providers.
#[derive(Debug, Clone)]
struct Sampling {
    temperature: f32,
    max_output_tokens: u32,
    max_retries: u32,
}

impl Sampling {
    fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
        }
    }
}

// ============ Gemini ============

/// Google Gemini `generateContent` client.
pub struct GeminiGenerator {
    model: String,
    api_key: String,
    base_url: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            sampling: Sampling::from_config(config),
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &[Chunk]) -> docqa_core::Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": build_prompt(question, context) }]
            }],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "maxOutputTokens": self.sampling.max_output_tokens,
            }
        });
        let json = http::post_json_with_retry(
            &self.client,
            "Gemini",
            &url,
            http::Auth::Header("x-goog-api-key", &self.api_key),
            &body,
            self.sampling.max_retries,
        )
        .await
        .map_err(|e| RagError::Generation(e.to_string()))?;
        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> docqa_core::Result<String> {
    let Some(candidate) = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
    else {
        let reason = json
            .pointer("/promptFeedback/blockReason")
            .and_then(|r| r.as_str())
            .unwrap_or("no candidates returned");
        return Err(RagError::Generation(format!(
            "Gemini returned no answer: {}",
            reason
        )));
    };

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| {
            let reason = candidate
                .get("finishReason")
                .and_then(|r| r.as_str())
                .unwrap_or("missing content");
            RagError::Generation(format!("Gemini returned no answer: {}", reason))
        })?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    Ok(text.trim().to_string())
}

// ============ OpenAI ============

/// OpenAI-compatible chat completions client.
pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    base_url: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            sampling: Sampling::from_config(config),
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &[Chunk]) -> docqa_core::Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": build_prompt(question, context) }],
            "temperature": self.sampling.temperature,
            "max_tokens": self.sampling.max_output_tokens,
        });
        let json = http::post_json_with_retry(
            &self.client,
            "OpenAI",
            &url,
            http::Auth::Bearer(&self.api_key),
            &body,
            self.sampling.max_retries,
        )
        .await
        .map_err(|e| RagError::Generation(e.to_string()))?;
        parse_openai_response(&json)
    }
}

fn parse_openai_response(json: &serde_json::Value) -> docqa_core::Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| {
            RagError::Generation("Invalid OpenAI response: missing choices[0].message.content".into())
        })
}

// ============ Ollama ============

/// Local Ollama `/api/generate` client (non-streaming).
pub struct OllamaGenerator {
    model: String,
    base_url: String,
    sampling: Sampling,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            sampling: Sampling::from_config(config),
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, question: &str, context: &[Chunk]) -> docqa_core::Result<String> {
        let url = format!("{}/api/generate", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "prompt": build_prompt(question, context),
            "stream": false,
            "options": {
                "temperature": self.sampling.temperature,
                "num_predict": self.sampling.max_output_tokens,
            }
        });
        let json = http::post_json_with_retry(
            &self.client,
            "Ollama",
            &url,
            http::Auth::None,
            &body,
            self.sampling.max_retries,
        )
        .await
        .map_err(|e| RagError::Generation(e.to_string()))?;
        json.get("response")
            .and_then(|r| r.as_str())
            .map(|r| r.trim().to_string())
            .ok_or_else(|| RagError::Generation("Invalid Ollama response: missing response".into()))
    }
}

// ============ Extractive ============

/// Offline generator that answers with the most relevant passage verbatim.
#[derive(Debug, Default, Clone)]
pub struct ExtractiveGenerator;

#[async_trait]
impl AnswerGenerator for ExtractiveGenerator {
    fn model_name(&self) -> &str {
        "extractive"
    }

    async fn generate(&self, _question: &str, context: &[Chunk]) -> docqa_core::Result<String> {
        context
            .first()
            .map(|c| c.text.trim().to_string())
            .ok_or_else(|| RagError::Generation("no context to extract from".to_string()))
    }
}

/// Create the [`AnswerGenerator`] named by `config.provider`.
///
/// Returns `Ok(None)` when generation is disabled or the provider's API key
/// is missing from the environment; the session then answers every
/// question with a "not initialized" message instead of failing to start.
pub fn create_generator(config: &GenerationConfig) -> Result<Option<Arc<dyn AnswerGenerator>>> {
    let key = |name: &str| match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => {
            tracing::warn!(
                env = name,
                provider = %config.provider,
                "API key not set; questions will not be answered"
            );
            None
        }
    };

    let generator: Option<Arc<dyn AnswerGenerator>> = match config.provider.as_str() {
        "disabled" => None,
        "extractive" => Some(Arc::new(ExtractiveGenerator)),
        "ollama" => Some(Arc::new(OllamaGenerator::new(config)?)),
        "gemini" => match key(config.api_key_env()) {
            Some(api_key) => Some(Arc::new(GeminiGenerator::new(config, api_key)?)),
            None => None,
        },
        "openai" => match key(config.api_key_env()) {
            Some(api_key) => Some(Arc::new(OpenAIGenerator::new(config, api_key)?)),
            None => None,
        },
        other => bail!("Unknown generation provider: {}", other),
    };
    Ok(generator)
}
