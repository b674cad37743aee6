//! Agent Controller: the run-loop state machine described in §4.4. Drives a
//! `Run` step by step — plan, approve, execute, observe — persisting after
//! every step through the Run Store so a crash or interruption never loses
//! progress already made.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::approval::{self, Decision};
use crate::config::ApprovalMode;
use crate::error::Result;
use crate::planner::inferencer::ArgumentInferencer;
use crate::planner::Planner;
use crate::providers::LlmProvider;
use crate::reliability::ReliabilityWrapper;
use crate::run_store::RunStore;
use crate::tools::registry::ToolRegistry;
use crate::types::{data, Action, Run, RunStatus, Step, StepKind};

/// Owns the collaborators a run needs — planner, inferencer, reliability
/// wrapper, registry, and store — and drives one run's trajectory to
/// completion or pause.
pub struct AgentController {
    registry: Arc<ToolRegistry>,
    planner: Planner,
    inferencer: ArgumentInferencer,
    reliability: ReliabilityWrapper,
    store: RunStore,
    approval_mode: ApprovalMode,
    max_steps: u32,
    topk: usize,
    interrupt: Arc<AtomicBool>,
}

impl AgentController {
    pub fn new(
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmProvider>,
        store: RunStore,
        approval_mode: ApprovalMode,
        max_steps: u32,
        topk: usize,
    ) -> Self {
        AgentController {
            planner: Planner::new(registry.clone(), llm.clone()),
            inferencer: ArgumentInferencer::new(llm),
            reliability: ReliabilityWrapper::new(),
            registry,
            store,
            approval_mode,
            max_steps,
            topk,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A clonable handle the host can flip to cooperatively pause the run
    /// (§5: "a single cooperative flag, set by the host on user-initiated
    /// stop; checked at the top of each loop iteration").
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        self.interrupt.clone()
    }

    pub async fn start(&self, task: &str) -> Result<Run> {
        let run = self.store.create(task).await?;
        self.drive(run).await
    }

    /// Reload a `running`/`paused` run and continue it for up to
    /// `max_steps` additional steps.
    pub async fn resume(&self, run_id: &str) -> Result<Run> {
        let mut run = self.store.load(run_id).await?;
        if !RunStore::is_resumable(run.status) {
            return Err(crate::error::Error::Internal(format!(
                "run {run_id} is not resumable (status {:?})",
                run.status
            )));
        }
        run.status = RunStatus::Running;
        self.drive(run).await
    }

    async fn drive(&self, mut run: Run) -> Result<Run> {
        for _ in 0..self.max_steps {
            if self.interrupt.load(Ordering::SeqCst) {
                self.store
                    .append_step(
                        &mut run,
                        Step::new(&run.run_id, StepKind::Interruption, data::interruption("interrupted by host")),
                    )
                    .await?;
                run.status = RunStatus::Paused;
                self.store.save(&run).await?;
                return Ok(run);
            }

            match self.step(&mut run).await {
                Ok(true) => return Ok(run),
                Ok(false) => continue,
                Err(e) => {
                    warn!(run_id = %run.run_id, error = %e, "run failed with a store I/O error");
                    run.status = RunStatus::Failed;
                    let _ = self.store.save(&run).await;
                    return Err(e);
                }
            }
        }

        info!(run_id = %run.run_id, "run paused after reaching its step budget");
        run.status = RunStatus::Paused;
        self.store.save(&run).await?;
        Ok(run)
    }

    /// Execute one loop iteration. Returns `Ok(true)` once the run has
    /// reached a terminal state (`done` or `paused`) and the caller should
    /// stop driving it.
    async fn step(&self, run: &mut Run) -> Result<bool> {
        let action = self.planner.plan(&run.task, run, self.topk).await;
        let step_num = run.steps.len() as u32;

        let (action_type, tool, rationale) = describe_action(&action);
        self.store
            .append_step(
                run,
                Step::new(&run.run_id, StepKind::Thought, data::thought(step_num, action_type, tool.as_deref(), rationale)),
            )
            .await?;

        match action {
            Action::FinalAnswer { output, .. } => {
                self.store
                    .append_step(run, Step::new(&run.run_id, StepKind::Final, data::final_answer(&output)))
                    .await?;
                run.status = RunStatus::Done;
                self.store.save(run).await?;
                Ok(true)
            }
            Action::AskHuman { question, .. } => self.ask_human(run, &question).await,
            Action::UseTool { tool_name, args, .. } => self.use_tool(run, &tool_name, args).await,
        }
    }

    async fn ask_human(&self, run: &mut Run, question: &str) -> Result<bool> {
        if self.approval_mode == ApprovalMode::Always {
            let summary = format!("ask the human: {question}");
            self.store
                .append_step(run, Step::new(&run.run_id, StepKind::ApprovalRequest, data::approval_request(&summary, false)))
                .await?;

            let approved = approval::prompt_approval(&summary).await?;
            self.store
                .append_step(run, Step::new(&run.run_id, StepKind::ApprovalResponse, data::approval_response(approved)))
                .await?;
            if !approved {
                run.status = RunStatus::Paused;
                self.store.save(run).await?;
                return Ok(true);
            }
        }

        let answer = approval::prompt_question(question).await?;
        self.store
            .append_step(run, Step::new(&run.run_id, StepKind::Observation, data::human_answer(&answer)))
            .await?;
        Ok(false)
    }

    async fn use_tool(&self, run: &mut Run, tool_name: &str, mut args: Value) -> Result<bool> {
        let tool = match self.registry.get_or_load(tool_name).await {
            Some(t) => t,
            None => {
                self.store
                    .append_step(
                        run,
                        Step::new(&run.run_id, StepKind::Observation, data::observation_err(&format!("unknown tool: {tool_name}"))),
                    )
                    .await?;
                return Ok(false);
            }
        };

        if tool.schema().validate(&args).is_err() {
            if let Some(repaired) = self.inferencer.infer(&tool, &run.task, run, &args).await {
                args = repaired;
            }
        }

        let summary = approval::summarize_call(tool_name, &args, 50);
        self.store
            .append_step(
                run,
                Step::new(&run.run_id, StepKind::ApprovalRequest, data::approval_request(&summary, tool.sensitive())),
            )
            .await?;

        let approved = match approval::decide(self.approval_mode, tool.sensitive()) {
            Decision::Approve => true,
            Decision::Deny => false,
            Decision::AskHuman => approval::prompt_approval(&summary).await?,
        };
        self.store
            .append_step(run, Step::new(&run.run_id, StepKind::ApprovalResponse, data::approval_response(approved)))
            .await?;

        if !approved {
            run.status = RunStatus::Paused;
            self.store.save(run).await?;
            return Ok(true);
        }

        if tool.schema().validate(&args).is_err() {
            self.store
                .append_step(run, Step::new(&run.run_id, StepKind::Observation, data::observation_err("schema_validation")))
                .await?;
            return Ok(false);
        }

        self.store
            .append_step(run, Step::new(&run.run_id, StepKind::Tool, data::tool_call(tool_name, &args)))
            .await?;

        match self.reliability.execute(&tool, args).await {
            Ok(result) => {
                self.registry.record_usage(tool_name).await;
                self.store
                    .append_step(run, Step::new(&run.run_id, StepKind::Observation, data::observation_ok(&result)))
                    .await?;
            }
            Err(e) => {
                self.store
                    .append_step(run, Step::new(&run.run_id, StepKind::Observation, data::observation_err(&e.to_string())))
                    .await?;
            }
        }

        Ok(false)
    }
}

fn describe_action(action: &Action) -> (&'static str, Option<String>, &str) {
    match action {
        Action::UseTool { tool_name, rationale, .. } => ("use_tool", Some(tool_name.clone()), rationale.as_str()),
        Action::AskHuman { rationale, .. } => ("ask_human", None, rationale.as_str()),
        Action::FinalAnswer { rationale, .. } => ("final_answer", None, rationale.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceBounds;
    use crate::providers::embeddings::HashEmbeddingProvider;
    use crate::providers::llm::StubLlmProvider;
    use crate::providers::EmbeddingsProvider;
    use crate::tools::builtin::CalculatorTool;
    use crate::tools::traits::{Field, FieldKind, ObjectSchema, Tool};
    use async_trait::async_trait;
    use serde_json::json;

    async fn controller(llm_script: Vec<String>, max_steps: u32) -> (AgentController, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let embeddings: Arc<dyn EmbeddingsProvider> = Arc::new(HashEmbeddingProvider::new(32));
        let registry = Arc::new(ToolRegistry::new(dir.path(), embeddings, &ResourceBounds::default()).await);
        registry.register(Arc::new(CalculatorTool::default())).await;
        registry.register(Arc::new(FakeWebSearchTool)).await;

        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(llm_script));
        let store = RunStore::new(dir.path());
        let controller = AgentController::new(registry, llm, store, ApprovalMode::Auto, max_steps, 8);
        (controller, dir)
    }

    struct FakeWebSearchTool;

    #[async_trait]
    impl Tool for FakeWebSearchTool {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "fake web search for tests"
        }
        fn schema(&self) -> &ObjectSchema {
            static SCHEMA: std::sync::OnceLock<ObjectSchema> = std::sync::OnceLock::new();
            SCHEMA.get_or_init(|| {
                ObjectSchema::new(vec![
                    Field { name: "query", kind: FieldKind::String, required: true },
                    Field { name: "maxResults", kind: FieldKind::Number, required: false },
                ])
            })
        }
        async fn run(&self, args: Value) -> Result<Value> {
            Ok(json!({ "query": args["query"], "results": [], "snippetText": "" }))
        }
    }

    #[tokio::test]
    async fn pure_math_run_reaches_done() {
        let (controller, _dir) = controller(vec![], 10).await;
        let run = controller.start("2*(3+4)/5").await.unwrap();

        assert_eq!(run.status, RunStatus::Done);
        assert!(run.steps.iter().any(|s| s.kind == StepKind::Tool && s.data["tool"] == "calculator"));
        let final_step = run.steps.iter().find(|s| s.kind == StepKind::Final).unwrap();
        assert_eq!(final_step.data["output"], "2.8");
    }

    #[tokio::test]
    async fn schema_repair_runs_the_inferred_arguments() {
        let scripted_use_tool = json!({
            "type": "use_tool",
            "tool_name": "web_search",
            "args": "latest party planning tips",
            "rationale": "look it up",
        })
        .to_string();
        let scripted_final = json!({
            "type": "final_answer",
            "output": "done",
            "rationale": "enough info gathered",
        })
        .to_string();
        let (controller, _dir) = controller(vec![scripted_use_tool, scripted_final], 10).await;

        let run = controller.start("help me plan a birthday party").await.unwrap();

        let tool_step = run.steps.iter().find(|s| s.kind == StepKind::Tool).unwrap();
        assert_eq!(tool_step.data["args"]["query"], "latest party planning tips");
        assert_eq!(tool_step.data["args"]["maxResults"], 5);
        assert_eq!(run.status, RunStatus::Done);
    }

    #[tokio::test]
    async fn interruption_pauses_before_any_step_is_taken() {
        let (controller, _dir) = controller(vec![], 10).await;
        controller.interrupt_flag().store(true, Ordering::SeqCst);

        let run = controller.start("2*(3+4)/5").await.unwrap();

        assert_eq!(run.status, RunStatus::Paused);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].kind, StepKind::Interruption);
    }

    #[tokio::test]
    async fn resume_continues_a_paused_run_to_completion() {
        let scripted_final = json!({
            "type": "final_answer",
            "output": "done",
            "rationale": "nothing more to do",
        })
        .to_string();
        let (controller, _dir) = controller(vec![scripted_final], 10).await;
        controller.interrupt_flag().store(true, Ordering::SeqCst);

        let mut run = controller.start("help me plan a birthday party").await.unwrap();
        assert_eq!(run.status, RunStatus::Paused);
        assert_eq!(run.steps.len(), 1);
        assert_eq!(run.steps[0].kind, StepKind::Interruption);

        controller.interrupt_flag().store(false, Ordering::SeqCst);
        let resumed = controller.resume(&run.run_id).await.unwrap();
        assert_eq!(resumed.status, RunStatus::Done);
        run = resumed;
        assert!(run.steps.iter().any(|s| s.kind == StepKind::Final));
    }
}
