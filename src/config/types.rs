//! Configuration record and its defaults.

use std::path::PathBuf;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Human-in-the-loop approval mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalMode {
    /// Approve everything automatically.
    #[default]
    Auto,
    /// Approve non-sensitive tools automatically; prompt for sensitive ones.
    Sensitive,
    /// Prompt for every tool invocation.
    Always,
}

/// Which embedding provider backs the registry's semantic search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Local ONNX model via `fastembed`.
    #[default]
    FastEmbed,
    /// Deterministic hash-based stub; no model download, used for tests and
    /// offline environments.
    Hash,
}

/// Which LLM provider backs the planner's ReAct step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    /// OpenRouter-compatible chat-completions HTTP API.
    #[default]
    OpenRouter,
    /// Scripted stub for tests; never makes a network call.
    Stub,
}

/// Top-level application configuration. Loaded once at startup: defaults,
/// then an optional config file, then environment variables, then CLI
/// overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_approval_mode")]
    pub approval_mode: ApprovalMode,
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(default = "default_topk")]
    pub topk_tools: usize,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub lazy_loading: bool,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default)]
    pub llm_backend: LlmBackend,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(skip)]
    pub llm_api_key: Option<SecretString>,
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,

    #[serde(default)]
    pub resources: ResourceBounds,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            approval_mode: default_approval_mode(),
            max_steps: default_max_steps(),
            topk_tools: default_topk(),
            data_dir: default_data_dir(),
            lazy_loading: false,
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: default_embedding_model(),
            llm_backend: LlmBackend::default(),
            llm_model: default_llm_model(),
            llm_api_key: None,
            llm_base_url: default_llm_base_url(),
            resources: ResourceBounds::default(),
        }
    }
}

/// Registry resource bounds (§5 of the specification).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceBounds {
    #[serde(default = "default_max_cache_size")]
    pub max_cache_size: usize,
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_cache_sweep_secs")]
    pub cache_sweep_secs: u64,
    #[serde(default = "default_max_embed_cache")]
    pub max_embed_cache: u64,
    #[serde(default = "default_search_cache_ttl_secs")]
    pub search_cache_ttl_secs: u64,
    #[serde(default = "default_index_batch_size")]
    pub index_batch_size: usize,
}

impl Default for ResourceBounds {
    fn default() -> Self {
        ResourceBounds {
            max_cache_size: default_max_cache_size(),
            max_cache_bytes: default_max_cache_bytes(),
            idle_timeout_secs: default_idle_timeout_secs(),
            cache_sweep_secs: default_cache_sweep_secs(),
            max_embed_cache: default_max_embed_cache(),
            search_cache_ttl_secs: default_search_cache_ttl_secs(),
            index_batch_size: default_index_batch_size(),
        }
    }
}

fn default_approval_mode() -> ApprovalMode {
    ApprovalMode::Auto
}
fn default_max_steps() -> u32 {
    20
}
fn default_topk() -> usize {
    8
}
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".taskagent").join("data"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}
fn default_embedding_model() -> String {
    "multilingual-e5-small".to_string()
}
fn default_llm_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_max_cache_size() -> usize {
    100
}
fn default_max_cache_bytes() -> u64 {
    50 * 1024 * 1024
}
fn default_idle_timeout_secs() -> u64 {
    10 * 60
}
fn default_cache_sweep_secs() -> u64 {
    2 * 60
}
fn default_max_embed_cache() -> u64 {
    1000
}
fn default_search_cache_ttl_secs() -> u64 {
    5 * 60
}
fn default_index_batch_size() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_resource_bounds() {
        let cfg = Config::default();
        assert_eq!(cfg.max_steps, 20);
        assert_eq!(cfg.topk_tools, 8);
        assert_eq!(cfg.resources.max_cache_size, 100);
        assert_eq!(cfg.resources.max_cache_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.resources.idle_timeout_secs, 600);
        assert_eq!(cfg.resources.max_embed_cache, 1000);
        assert_eq!(cfg.resources.index_batch_size, 20);
    }
}
