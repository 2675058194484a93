//! TOML configuration.
//!
//! Every section is optional; missing keys fall back to the defaults the
//! assistant has always shipped with (1000/200 character chunks, top-3
//! retrieval, temperature 0.7, 512 output tokens). Credentials are never
//! read from the file, only from the environment variable it names.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use docqa_core::chunk::TextSplitter;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_kb_path")]
    pub path: PathBuf,
    /// `"sqlite"` (persisted at `path`) or `"memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Discard any index already at `path` on start-up.
    #[serde(default = "default_true")]
    pub fresh_start: bool,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            path: default_kb_path(),
            backend: default_backend(),
            fresh_start: true,
        }
    }
}

fn default_kb_path() -> PathBuf {
    PathBuf::from("./data/knowledge_base.sqlite")
}
fn default_backend() -> String {
    "sqlite".to_string()
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    docqa_core::chunk::DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_embedding_retries(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_retries() -> u32 {
    5
}
fn default_embedding_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    /// Name of the environment variable holding the API key. Defaults to
    /// `GOOGLE_API_KEY` for Gemini and `OPENAI_API_KEY` for OpenAI.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Base URL override (required for Ollama if not on localhost).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_retries")]
    pub max_retries: u32,
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            api_key_env: None,
            url: None,
            max_retries: default_generation_retries(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

fn default_generation_provider() -> String {
    "gemini".to_string()
}
fn default_generation_model() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_output_tokens() -> u32 {
    512
}
impl GenerationConfig {
    /// Environment variable the configured provider reads its key from.
    pub fn api_key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(name), _) => name,
            (None, "openai") => "OPENAI_API_KEY",
            (None, _) => "GOOGLE_API_KEY",
        }
    }
}

fn default_generation_retries() -> u32 {
    3
}
fn default_generation_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Files larger than this are skipped without being parsed.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    /// Patterns used by `--dir` to pick files, relative to the directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            include_globs: default_include_globs(),
        }
    }
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.docx".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8501".to_string()
}

/// Commented configuration written by `docqa init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"# docqa configuration

[knowledge_base]
path = "./data/knowledge_base.sqlite"
backend = "sqlite"        # or "memory"
fresh_start = true        # discard any index left at `path` on start-up

[chunking]
chunk_size = 1000         # characters per passage
chunk_overlap = 200       # characters shared with the previous passage

[retrieval]
top_k = 3

[embedding]
provider = "hash"         # hash | openai | ollama | local
# model = "all-minilm-l6-v2"
# dims = 384
batch_size = 64

[generation]
provider = "gemini"       # gemini | openai | ollama | extractive | disabled
model = "gemini-1.5-flash"
temperature = 0.7
max_output_tokens = 512
# api_key_env = "GOOGLE_API_KEY"   # OPENAI_API_KEY when provider = "openai"

[ingest]
max_file_bytes = 52428800
include_globs = ["**/*.pdf", "**/*.txt", "**/*.docx"]

[server]
bind = "127.0.0.1:8501"
"#;

/// Parse and validate a configuration string.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Read, parse and validate the configuration file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).with_context(|| {
        format!(
            "Failed to read config file: {} (run `docqa init` to create one)",
            path.display()
        )
    })?;
    parse_config(&content)
}

/// Write [`DEFAULT_CONFIG_TOML`] to `path`, refusing to overwrite.
pub fn write_default_config(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

fn validate(config: &Config) -> Result<()> {
    TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap)
        .map_err(|e| anyhow::anyhow!("chunking: {}", e))?;

    if config.retrieval.top_k < 1 {
        bail!("retrieval.top_k must be >= 1");
    }

    match config.knowledge_base.backend.as_str() {
        "sqlite" | "memory" => {}
        other => bail!(
            "Unknown knowledge_base.backend: '{}'. Must be sqlite or memory.",
            other
        ),
    }

    match config.embedding.provider.as_str() {
        "hash" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or local.",
            other
        ),
    }
    if matches!(config.embedding.provider.as_str(), "openai" | "ollama") {
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.generation.provider.as_str() {
        "gemini" | "openai" | "ollama" | "extractive" | "disabled" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be gemini, openai, ollama, extractive, or disabled.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if config.generation.max_output_tokens == 0 {
        bail!("generation.max_output_tokens must be >= 1");
    }

    Ok(())
}
