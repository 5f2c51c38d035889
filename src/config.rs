//! TOML configuration.
//!
//! One file drives the whole service: where the corpus and persisted state
//! live, how text is chunked, which remote providers embed and generate, and
//! the instruction text the assistant is given. [`load_config`] parses and
//! validates it; every validation failure is a
//! [`RagError::Configuration`], which is fatal at startup.
//!
//! ```toml
//! [corpus]
//! dir = "./data/corpus"
//!
//! [index]
//! dir = "./data/index"
//!
//! [history]
//! path = "./data/chat_history.json"
//!
//! [embedding]
//! provider = "gemini"
//! model = "models/embedding-001"
//! dims = 768
//!
//! [generation]
//! provider = "gemini"
//! model = "gemini-2.0-flash"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::prompt;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    pub history: HistoryConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory of pre-extracted plain-text documents.
    pub dir: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Target chunk length in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Bytes shared between consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Directory holding the persisted vector index.
    pub dir: PathBuf,
    /// Number of chunks sent per embedding request while building.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    64
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
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub path: PathBuf,
    /// Number of most recent turns included in each prompt.
    #[serde(default = "default_window")]
    pub window: usize,
}

fn default_window() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    /// Overrides the provider's API root (used for proxies and tests).
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: 0,
            base_url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            timeout_secs: default_generation_timeout_secs(),
            max_output_tokens: default_max_output_tokens(),
            temperature: None,
            base_url: None,
        }
    }
}

impl GenerationConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_max_output_tokens() -> u32 {
    500
}

/// Instruction text handed to the model.
///
/// `template` must contain the `{context}` and `{input}` placeholders.
#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_template")]
    pub template: String,
    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            template: default_template(),
            fallback: default_fallback(),
        }
    }
}

fn default_persona() -> String {
    prompt::DEFAULT_PERSONA.to_string()
}
fn default_template() -> String {
    prompt::DEFAULT_TEMPLATE.to_string()
}
fn default_fallback() -> String {
    prompt::DEFAULT_FALLBACK.to_string()
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
    "0.0.0.0:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// When set, logs are also written to a daily rolling file here.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            dir: None,
        }
    }
}

fn default_filter() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RagError::config(format!("failed to parse config file: {}", e)))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Chunking
    if config.chunking.chunk_size == 0 {
        return Err(RagError::config("chunking.chunk_size must be > 0"));
    }
    if config.chunking.chunk_size <= config.chunking.overlap {
        return Err(RagError::config(format!(
            "chunking.chunk_size ({}) must be greater than chunking.overlap ({})",
            config.chunking.chunk_size, config.chunking.overlap
        )));
    }

    if config.index.batch_size == 0 {
        return Err(RagError::config("index.batch_size must be >= 1"));
    }
    if config.retrieval.top_k == 0 {
        return Err(RagError::config("retrieval.top_k must be >= 1"));
    }

    // Embedding
    match config.embedding.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => {
            return Err(RagError::config(format!(
                "unknown embedding provider: '{}'. Must be disabled, gemini, or openai.",
                other
            )))
        }
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            return Err(RagError::config(format!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            )));
        }
        if config.embedding.model.is_none() {
            return Err(RagError::config(format!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            )));
        }
    }
    if config.embedding.timeout_secs == 0 {
        return Err(RagError::config("embedding.timeout_secs must be > 0"));
    }

    // Generation
    match config.generation.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => {
            return Err(RagError::config(format!(
                "unknown generation provider: '{}'. Must be disabled, gemini, or openai.",
                other
            )))
        }
    }
    if config.generation.is_enabled() && config.generation.model.is_none() {
        return Err(RagError::config(format!(
            "generation.model must be specified when provider is '{}'",
            config.generation.provider
        )));
    }
    if config.generation.timeout_secs == 0 {
        return Err(RagError::config("generation.timeout_secs must be > 0"));
    }

    // Prompt
    for placeholder in ["{context}", "{input}"] {
        if !config.prompt.template.contains(placeholder) {
            return Err(RagError::config(format!(
                "prompt.template must contain the {} placeholder",
                placeholder
            )));
        }
    }
    if config.prompt.fallback.trim().is_empty() {
        return Err(RagError::config("prompt.fallback must not be empty"));
    }

    Ok(())
}
