//! taskagent CLI
//!
//! Command-line entry point: `run`, `resume`, `tools list`, `tool-search`.
//! Exit codes: 0 on `done`, non-zero otherwise; `paused` carries `runId` on
//! stdout (§6).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use taskagent::config::{load_config, ApprovalMode, Config, EmbeddingBackend, LlmBackend};
use taskagent::providers::embeddings::{FastEmbedProvider, HashEmbeddingProvider};
use taskagent::providers::llm::{OpenRouterProvider, StubLlmProvider};
use taskagent::providers::{EmbeddingsProvider, LlmProvider};
use taskagent::tools::builtin::{CalculatorTool, ReadFileTool, SummarizeTextTool, WebSearchTool};
use taskagent::tools::registry::ToolRegistry;
use taskagent::types::{Run, RunStatus, StepKind};
use taskagent::{AgentController, Error, Result, RunStore, VERSION};

#[derive(Parser)]
#[command(
    name = "taskagent",
    version = VERSION,
    about = "An autonomous task-execution agent over a scalable tool registry",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new run for the given task.
    Run {
        /// The task, as free text (multiple words are joined with spaces).
        task: Vec<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        topk: Option<usize>,
        #[arg(long = "max-steps")]
        max_steps: Option<u32>,
        #[arg(long = "approval-mode", value_enum)]
        approval_mode: Option<ApprovalMode>,
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
        #[arg(long = "lazy-loading")]
        lazy_loading: bool,
    },
    /// Resume a paused or still-running run by id.
    Resume {
        run_id: String,
        #[arg(long = "max-steps")]
        max_steps: Option<u32>,
        #[arg(long = "approval-mode", value_enum)]
        approval_mode: Option<ApprovalMode>,
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
    },
    /// Inspect the tool catalog.
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },
    /// Semantic search over the tool catalog.
    ToolSearch {
        query: Vec<String>,
        #[arg(long)]
        topk: Option<usize>,
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ToolsAction {
    /// List catalog entries, optionally filtered.
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long = "loaded-only")]
        loaded_only: bool,
        #[arg(long = "data-dir")]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("taskagent=info")),
        )
        .init();

    let code = match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            task,
            model,
            topk,
            max_steps,
            approval_mode,
            data_dir,
            lazy_loading,
        } => {
            let mut config = load_config()?;
            apply_overrides(&mut config, model, topk, max_steps, approval_mode, data_dir);
            config.lazy_loading = config.lazy_loading || lazy_loading;

            let task = task.join(" ");
            if task.trim().is_empty() {
                return Err(Error::Config("a task is required".to_string()));
            }

            let controller = build_controller(&config).await?;
            let run = controller.start(&task).await?;
            report_run(&run)
        }
        Commands::Resume {
            run_id,
            max_steps,
            approval_mode,
            data_dir,
        } => {
            let mut config = load_config()?;
            apply_overrides(&mut config, None, None, max_steps, approval_mode, data_dir);

            let controller = build_controller(&config).await?;
            let run = controller.resume(&run_id).await?;
            report_run(&run)
        }
        Commands::Tools {
            action: ToolsAction::List { category, loaded_only, data_dir },
        } => {
            let mut config = load_config()?;
            if let Some(d) = data_dir {
                config.data_dir = d;
            }
            let registry = build_registry(&config).await?;
            let entries = registry.list(category.as_deref(), loaded_only).await;
            for entry in entries {
                println!(
                    "{}\t{}\t[{}]{}",
                    entry.name,
                    entry.description,
                    entry.categories.join(","),
                    if entry.sensitive { "\tsensitive" } else { "" }
                );
            }
            Ok(0)
        }
        Commands::ToolSearch { query, topk, data_dir } => {
            let mut config = load_config()?;
            if let Some(d) = data_dir {
                config.data_dir = d;
            }
            let k = topk.unwrap_or(config.topk_tools);
            let query = query.join(" ");

            let registry = build_registry(&config).await?;
            let results = registry.search(&query, k).await;
            for scored in results {
                println!("{:.4}\t{}\t{}", scored.score, scored.name, scored.description);
            }
            Ok(0)
        }
    }
}

fn apply_overrides(
    config: &mut Config,
    model: Option<String>,
    topk: Option<usize>,
    max_steps: Option<u32>,
    approval_mode: Option<ApprovalMode>,
    data_dir: Option<PathBuf>,
) {
    if let Some(m) = model {
        config.llm_model = m;
    }
    if let Some(k) = topk {
        config.topk_tools = k;
    }
    if let Some(n) = max_steps {
        config.max_steps = n;
    }
    if let Some(mode) = approval_mode {
        config.approval_mode = mode;
    }
    if let Some(d) = data_dir {
        config.data_dir = d;
    }
}

/// Print the outcome of a drive-to-completion-or-pause and return the
/// process exit code the spec requires: `0` on `done`, non-zero otherwise,
/// with `runId` surfaced on stdout whenever the run did not finish (§6, §7).
fn report_run(run: &Run) -> Result<i32> {
    match run.status {
        RunStatus::Done => {
            if let Some(output) = final_answer(run) {
                println!("{output}");
            }
            Ok(0)
        }
        RunStatus::Paused => {
            println!("runId: {}", run.run_id);
            println!("status: paused");
            Ok(2)
        }
        RunStatus::Failed => {
            println!("runId: {}", run.run_id);
            println!("status: failed");
            Ok(1)
        }
        RunStatus::Running => {
            // drive() never returns control while still Running; reaching
            // here would mean the loop exited without settling a status.
            println!("runId: {}", run.run_id);
            println!("status: running");
            Ok(1)
        }
    }
}

fn final_answer(run: &Run) -> Option<String> {
    run.steps
        .iter()
        .rev()
        .find(|s| s.kind == StepKind::Final)
        .and_then(|s| s.data.get("output"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

async fn build_embeddings(config: &Config) -> Result<Arc<dyn EmbeddingsProvider>> {
    match config.embedding_backend {
        EmbeddingBackend::FastEmbed => {
            let provider = FastEmbedProvider::new()?;
            Ok(Arc::new(provider))
        }
        EmbeddingBackend::Hash => Ok(Arc::new(HashEmbeddingProvider::new(384))),
    }
}

fn build_llm(config: &Config) -> Result<Arc<dyn LlmProvider>> {
    match config.llm_backend {
        LlmBackend::OpenRouter => {
            let api_key = config
                .llm_api_key
                .clone()
                .ok_or_else(|| Error::Config("no LLM API key configured (set OPENROUTER_API_KEY)".to_string()))?;
            let provider = OpenRouterProvider::new(api_key, config.llm_base_url.clone(), config.llm_model.clone())?;
            Ok(Arc::new(provider))
        }
        LlmBackend::Stub => Ok(Arc::new(StubLlmProvider::new(Vec::new()))),
    }
}

/// Build a populated registry: catalog + cache seeded with the built-in
/// tools, plus any manifest-only entries under `DATA_DIR/tools/*.json`.
async fn build_registry_with_llm(config: &Config, llm: Arc<dyn LlmProvider>) -> Result<Arc<ToolRegistry>> {
    let embeddings = build_embeddings(config).await?;
    let registry = ToolRegistry::new(&config.data_dir, embeddings, &config.resources).await;

    registry.register(Arc::new(CalculatorTool::default())).await;
    registry.register(Arc::new(WebSearchTool::new())).await;
    registry.register(Arc::new(SummarizeTextTool::new(llm))).await;
    registry
        .register(Arc::new(ReadFileTool::new(config.data_dir.join("workspace"))))
        .await;

    let manifest_dir = config.data_dir.join("tools");
    if manifest_dir.is_dir() {
        registry.scan_manifest_dir(&manifest_dir).await?;
    }

    Ok(Arc::new(registry))
}

async fn build_registry(config: &Config) -> Result<Arc<ToolRegistry>> {
    let llm = build_llm(config)?;
    build_registry_with_llm(config, llm).await
}

async fn build_controller(config: &Config) -> Result<AgentController> {
    let llm = build_llm(config)?;
    let registry = build_registry_with_llm(config, llm.clone()).await?;
    let store = RunStore::new(&config.data_dir);

    Ok(AgentController::new(
        registry,
        llm,
        store,
        config.approval_mode,
        config.max_steps,
        config.topk_tools,
    ))
}
