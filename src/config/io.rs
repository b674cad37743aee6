//! Layered configuration loading: defaults -> file -> environment.
//!
//! CLI flag overrides are applied by the caller after `load_config` returns,
//! since clap owns flag parsing.

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use tracing::{debug, warn};

use super::types::{ApprovalMode, Config, EmbeddingBackend, LlmBackend};
use crate::error::{Error, Result};

/// Default config file search path: `$TASKAGENT_CONFIG` or `./taskagent.json5`.
fn default_config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("TASKAGENT_CONFIG") {
        return Some(PathBuf::from(p));
    }
    let candidate = PathBuf::from("./taskagent.json5");
    candidate.exists().then_some(candidate)
}

/// Load configuration: file (if present) overlaid with environment
/// variables, in the manner of the reference stack's `load_config`.
pub fn load_config() -> Result<Config> {
    let mut config = match default_config_path() {
        Some(path) => load_config_from_path(&path)?,
        None => Config::default(),
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

/// Load a config file, dispatching on extension (JSON5 or TOML), falling
/// back to the other format if the first parse fails.
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    let (primary, fallback): (fn(&str) -> Option<Config>, fn(&str) -> Option<Config>) = if ext == "toml" {
        (
            |s| toml::from_str(s).ok(),
            |s| json5::from_str(s).ok(),
        )
    } else {
        (
            |s| json5::from_str(s).ok(),
            |s| toml::from_str(s).ok(),
        )
    };

    primary(&contents)
        .or_else(|| fallback(&contents))
        .ok_or_else(|| Error::Config(format!("failed to parse {} as JSON5 or TOML", path.display())))
}

/// Overlay `.env` + process environment variables onto an existing config.
/// Mirrors the reference stack's `load_config_from_env`.
pub fn apply_env_overrides(config: &mut Config) {
    let _ = dotenvy::dotenv();

    if let Ok(v) = std::env::var("APPROVAL_MODE") {
        match v.to_lowercase().as_str() {
            "auto" => config.approval_mode = ApprovalMode::Auto,
            "sensitive" => config.approval_mode = ApprovalMode::Sensitive,
            "always" => config.approval_mode = ApprovalMode::Always,
            other => warn!("ignoring unrecognized APPROVAL_MODE={}", other),
        }
    }
    if let Ok(v) = std::env::var("MAX_STEPS") {
        match v.parse() {
            Ok(n) => config.max_steps = n,
            Err(_) => warn!("ignoring non-numeric MAX_STEPS={}", v),
        }
    }
    if let Ok(v) = std::env::var("TOPK_TOOLS") {
        match v.parse() {
            Ok(n) => config.topk_tools = n,
            Err(_) => warn!("ignoring non-numeric TOPK_TOOLS={}", v),
        }
    }
    if let Ok(v) = std::env::var("DATA_DIR") {
        config.data_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("EMBEDDING_BACKEND") {
        match v.to_lowercase().as_str() {
            "fastembed" => config.embedding_backend = EmbeddingBackend::FastEmbed,
            "hash" => config.embedding_backend = EmbeddingBackend::Hash,
            other => warn!("ignoring unrecognized EMBEDDING_BACKEND={}", other),
        }
    }
    if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
        config.embedding_model = v;
    }
    if let Ok(v) = std::env::var("LLM_BACKEND") {
        match v.to_lowercase().as_str() {
            "openrouter" => config.llm_backend = LlmBackend::OpenRouter,
            "stub" => config.llm_backend = LlmBackend::Stub,
            other => warn!("ignoring unrecognized LLM_BACKEND={}", other),
        }
    }
    if let Ok(v) = std::env::var("LLM_MODEL") {
        config.llm_model = v;
    }
    if let Ok(v) = std::env::var("LLM_BASE_URL") {
        config.llm_base_url = v;
    }
    if let Ok(v) = std::env::var("OPENROUTER_API_KEY").or_else(|_| std::env::var("LLM_API_KEY")) {
        config.llm_api_key = Some(SecretString::from(v));
    }

    debug!(
        approval_mode = ?config.approval_mode,
        max_steps = config.max_steps,
        topk_tools = config.topk_tools,
        data_dir = %config.data_dir.display(),
        "configuration resolved"
    );
}

/// Persist a config to disk as JSON5, in the manner of the reference
/// stack's `save_config` (write then atomic rename).
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let body = json5::to_string(config)
        .map_err(|e| Error::Config(format!("failed to serialize config: {}", e)))?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, body)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json5");

        let mut config = Config::default();
        config.max_steps = 42;
        config.topk_tools = 3;
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.max_steps, 42);
        assert_eq!(loaded.topk_tools, 3);
    }

    #[test]
    fn env_overrides_apply_on_top_of_defaults() {
        std::env::set_var("MAX_STEPS", "7");
        std::env::set_var("APPROVAL_MODE", "always");
        let mut config = Config::default();
        apply_env_overrides(&mut config);
        assert_eq!(config.max_steps, 7);
        assert_eq!(config.approval_mode, ApprovalMode::Always);
        std::env::remove_var("MAX_STEPS");
        std::env::remove_var("APPROVAL_MODE");
    }
}
