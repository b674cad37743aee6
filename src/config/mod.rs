//! Configuration module: layered loading (defaults -> file -> environment ->
//! CLI overrides) over a single `Config` record.

mod io;
mod types;

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use types::{ApprovalMode, Config, EmbeddingBackend, LlmBackend, ResourceBounds};
