//! # taskagent
//!
//! An autonomous task-execution agent: a reasoning-and-acting control loop
//! (plan → approve → execute → observe) over a scalable, semantically
//! searchable tool registry.
//!
//! ## Architecture
//!
//! - **Types** (`types`): the core data model — actions, steps, runs, and
//!   the history projection built from them.
//! - **Tools** (`tools`): the uniform `Tool` trait, a handful of built-in
//!   tools, and the registry that catalogs, indexes, and caches them.
//! - **Providers** (`providers`): the LLM completion and embeddings traits
//!   consumed by the planner and the registry, plus production and stub
//!   implementations of each.
//! - **Planner** (`planner`): produces the next `Action` from a task and a
//!   run's history — heuristics first, an LLM ReAct step as fallback — and
//!   the argument inferencer that repairs malformed tool arguments.
//! - **Agent** (`agent`): the run-loop state machine that drives a `Run` to
//!   completion, wiring the planner, the reliability wrapper, the approval
//!   policy, and the run store together.
//! - **Reliability** (`reliability`): per-tool retry with exponential
//!   backoff and a failure-threshold circuit breaker.
//! - **Approval** (`approval`): the pure approval-mode decision function and
//!   the interactive prompts it sometimes defers to.
//! - **Run Store** (`run_store`): a durable, append-only per-run trajectory
//!   log, with resume support.
//! - **Configuration** (`config`): layered configuration — defaults, a
//!   config file, environment variables, then CLI overrides.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use taskagent::config::load_config;
//! use taskagent::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let _config = load_config()?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod approval;
pub mod clock;
#[path = "config/mod.rs"]
pub mod config;
pub mod error;
pub mod planner;
pub mod providers;
pub mod reliability;
pub mod run_store;
pub mod tools;
pub mod types;

pub use agent::AgentController;
pub use error::{Error, Result};
pub use planner::Planner;
pub use reliability::ReliabilityWrapper;
pub use run_store::RunStore;

/// Application version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
