//! Embedding provider implementations and selection.
//!
//! - **hash**: [`HashEmbedder`] from the core crate, offline and deterministic.
//! - **[`OpenAIProvider`]**: `POST /v1/embeddings`, batched, with retry.
//! - **[`OllamaProvider`]**: a local Ollama instance's `/api/embed`.
//! - **`LocalProvider`**: fastembed inference (`--features local-embeddings`);
//!   no network calls after the model download.
//!
//! Use [`create_provider`] to pick one from [`EmbeddingConfig`].

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use docqa_core::embedding::{EmbeddingProvider, HashEmbedder, HASH_EMBEDDER_DIMS};
use docqa_core::RagError;

use crate::config::EmbeddingConfig;
use crate::http;

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        Ok(Self {
            model,
            dims,
            api_key,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> docqa_core::Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = http::post_json_with_retry(
                &self.client,
                "OpenAI",
                "https://api.openai.com/v1/embeddings",
                http::Auth::Bearer(&self.api_key),
                &body,
                self.max_retries,
            )
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
            out.extend(parse_openai_response(&json)?);
        }
        Ok(out)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> docqa_core::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| invalid("OpenAI", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| invalid("OpenAI", "missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, to_f32_vec(embedding)));
    }
    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

/// Embedding provider using a local Ollama instance (default
/// `http://localhost:11434`) with an embedding model pulled.
pub struct OllamaProvider {
    model: String,
    dims: usize,
    url: String,
    batch_size: usize,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        Ok(Self {
            model,
            dims,
            url,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> docqa_core::Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            let body = serde_json::json!({
                "model": self.model,
                "input": batch,
            });
            let json = http::post_json_with_retry(
                &self.client,
                "Ollama",
                &endpoint,
                http::Auth::None,
                &body,
                self.max_retries,
            )
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?;
            out.extend(parse_ollama_response(&json)?);
        }
        Ok(out)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> docqa_core::Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| invalid("Ollama", "missing embeddings array"))?;

    embeddings
        .iter()
        .map(|embedding| {
            embedding
                .as_array()
                .map(|values| to_f32_vec(values))
                .ok_or_else(|| invalid("Ollama", "embedding is not an array"))
        })
        .collect()
}

fn to_f32_vec(values: &[serde_json::Value]) -> Vec<f32> {
    values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect()
}

fn invalid(service: &str, what: &str) -> RagError {
    RagError::Embedding(format!("Invalid {} response: {}", service, what))
}

// ============ Local Provider (fastembed) ============

#[cfg(feature = "local-embeddings")]
pub use local::LocalProvider;

#[cfg(feature = "local-embeddings")]
mod local {
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use async_trait::async_trait;

    use docqa_core::embedding::EmbeddingProvider;
    use docqa_core::RagError;

    use crate::config::EmbeddingConfig;

    /// Runs a sentence-transformer model in-process. The model is
    /// downloaded from Hugging Face on first use and then cached.
    pub struct LocalProvider {
        model_name: String,
        model: fastembed::EmbeddingModel,
        dims: usize,
        batch_size: usize,
        loaded: Arc<Mutex<Option<fastembed::TextEmbedding>>>,
    }

    impl LocalProvider {
        pub fn new(config: &EmbeddingConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
            let model = to_fastembed_model(&model_name)?;
            let dims = config.dims.unwrap_or(match model_name.as_str() {
                "bge-base-en-v1.5" => 768,
                "bge-large-en-v1.5" => 1024,
                _ => 384,
            });
            Ok(Self {
                model_name,
                model,
                dims,
                batch_size: config.batch_size,
                loaded: Arc::new(Mutex::new(None)),
            })
        }
    }

    fn to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
        match name {
            "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
            "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
            "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
            "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5",
                other
            ),
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LocalProvider {
        fn model_name(&self) -> &str {
            &self.model_name
        }
        fn dims(&self) -> usize {
            self.dims
        }

        async fn embed_batch(&self, texts: &[String]) -> docqa_core::Result<Vec<Vec<f32>>> {
            let texts = texts.to_vec();
            let loaded = Arc::clone(&self.loaded);
            let model = self.model.clone();
            let batch_size = self.batch_size;

            tokio::task::spawn_blocking(move || {
                let mut guard = loaded.lock().unwrap_or_else(|p| p.into_inner());
                if guard.is_none() {
                    let embedder = fastembed::TextEmbedding::try_new(
                        fastembed::InitOptions::new(model).with_show_download_progress(true),
                    )
                    .map_err(|e| {
                        RagError::Embedding(format!(
                            "Failed to initialize local embedding model: {}",
                            e
                        ))
                    })?;
                    *guard = Some(embedder);
                }
                let embedder = guard
                    .as_mut()
                    .ok_or_else(|| RagError::Embedding("local model not loaded".to_string()))?;
                embedder
                    .embed(texts, Some(batch_size))
                    .map_err(|e| RagError::Embedding(format!("Local embedding failed: {}", e)))
            })
            .await
            .map_err(|e| RagError::Embedding(e.to_string()))?
        }
    }
}

/// Create the [`EmbeddingProvider`] named by `config.provider`.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"hash"` | [`HashEmbedder`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"ollama"` | [`OllamaProvider`] |
/// | `"local"` | `LocalProvider` (requires `--features local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "hash" => Ok(Arc::new(HashEmbedder::new(
            config.dims.unwrap_or(HASH_EMBEDDER_DIMS),
        )?)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_hash_provider_defaults() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert_eq!(provider.model_name(), "hash");
        assert_eq!(provider.dims(), HASH_EMBEDDER_DIMS);
    }

    #[test]
    fn test_create_hash_provider_custom_dims() {
        let config = EmbeddingConfig {
            dims: Some(64),
            ..EmbeddingConfig::default()
        };
        assert_eq!(create_provider(&config).unwrap().dims(), 64);
    }

    #[test]
    fn test_create_unknown_provider_fails() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_ollama_requires_model() {
        let config = EmbeddingConfig {
            provider: "ollama".to_string(),
            dims: Some(768),
            ..EmbeddingConfig::default()
        };
        let err = create_provider(&config).err().unwrap();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[test]
    fn test_parse_ollama_response() {
        let json = serde_json::json!({"embeddings": [[0.5, 0.25], [1.0, 0.0]]});
        let vecs = parse_ollama_response(&json).unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0], vec![0.5, 0.25]);
        assert!(parse_ollama_response(&serde_json::json!({"embeddings": [1]})).is_err());
    }
}
