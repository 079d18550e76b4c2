use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Env var holding the API key (never stored in the config file).
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_llm_model")]
    pub default_model: String,
    #[serde(default = "default_llm_models")]
    pub models: Vec<ModelEntry>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Deserialize, Clone, serde::Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub name: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_key_env(),
            default_model: default_llm_model(),
            models: default_llm_models(),
            timeout_secs: default_llm_timeout(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_llm_base_url() -> String {
    "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string()
}
fn default_llm_key_env() -> String {
    "DASHSCOPE_API_KEY".to_string()
}
fn default_llm_model() -> String {
    "qwen-plus".to_string()
}
fn default_llm_models() -> Vec<ModelEntry> {
    [
        ("qwen-plus", "Qwen Plus"),
        ("qwen-max", "Qwen Max"),
        ("qwen-turbo", "Qwen Turbo"),
    ]
    .iter()
    .map(|(id, name)| ModelEntry {
        id: id.to_string(),
        name: name.to_string(),
    })
    .collect()
}
fn default_llm_timeout() -> u64 {
    120
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_llm_key_env(),
            model: default_embedding_model(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-v3".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_embedding_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub api_url: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_result_count")]
    pub result_count: usize,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_url: default_search_url(),
            api_key_env: default_search_key_env(),
            result_count: default_result_count(),
            timeout_secs: default_search_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_search_url() -> String {
    "https://api.bochaai.com/v1/web-search".to_string()
}
fn default_search_key_env() -> String {
    "BOCHA_API_KEY".to_string()
}
fn default_result_count() -> usize {
    5
}
fn default_search_timeout() -> u64 {
    30
}
fn default_fetch_timeout() -> u64 {
    20
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
    300
}
fn default_chunk_overlap() -> usize {
    50
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
    "127.0.0.1:8000".to_string()
}

/// Load the config file if it exists, otherwise fall back to built-in
/// defaults (everything is overridable, so a file is optional).
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size < 50 {
        anyhow::bail!("chunking.chunk_size must be >= 50");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be < chunking.chunk_size");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.llm.default_model.is_empty() {
        anyhow::bail!("llm.default_model must not be empty");
    }
    if config.llm.timeout_secs == 0 || config.embedding.timeout_secs == 0 {
        anyhow::bail!("collaborator timeouts must be > 0");
    }
    Ok(())
}
