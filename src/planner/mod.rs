//! Planner: produces the next `Action` given `(task, history, k)` (§4.2).
//! Four stages run in order, the first usable result wins: candidate
//! retrieval (side effect only — warms the cache for the LLM step),
//! intelligent fallback, pattern-based heuristic fallback, then an LLM
//! ReAct step. The Argument Inferencer (§4.3) lives alongside it in
//! [`inferencer`] but is invoked by the agent controller, not the planner.

mod heuristics;
pub mod inferencer;
pub mod json_extract;
mod math;

use std::sync::Arc;

use tracing::warn;

use crate::providers::LlmProvider;
use crate::tools::registry::ToolRegistry;
use crate::types::{Action, Run};

use json_extract::extract_balanced_json;

pub struct Planner {
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmProvider>,
}

impl Planner {
    pub fn new(registry: Arc<ToolRegistry>, llm: Arc<dyn LlmProvider>) -> Self {
        Planner { registry, llm }
    }

    /// Run the full pipeline and return the next action.
    pub async fn plan(&self, task: &str, run: &Run, k: usize) -> Action {
        let query = build_query(task, run);
        let candidates = self.registry.search_tools(&query, k.max(15)).await;

        if let Some(action) = heuristics::intelligent_fallback(task, run).filter(|a| !is_duplicate(run, a)) {
            return action;
        }
        if let Some(action) = heuristics::heuristic_fallback(task, run).filter(|a| !is_duplicate(run, a)) {
            return action;
        }
        if let Some(action) = self.llm_step(task, run, &candidates).await.filter(|a| !is_duplicate(run, a)) {
            return action;
        }
        if let Some(action) = heuristics::intelligent_fallback(task, run).filter(|a| !is_duplicate(run, a)) {
            return action;
        }

        Action::AskHuman {
            question: "I need more specific guidance to proceed.".to_string(),
            rationale: "no heuristic or model-proposed action was usable".to_string(),
        }
    }

    async fn llm_step(
        &self,
        task: &str,
        run: &Run,
        candidates: &[Arc<dyn crate::tools::traits::Tool>],
    ) -> Option<Action> {
        let prompt = build_react_prompt(task, run, candidates);
        let completion = match self.llm.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "planner's LLM step failed to produce a completion");
                return None;
            }
        };

        let value = extract_balanced_json(&completion)?;
        let action: Action = serde_json::from_value(value).ok()?;

        if let Action::UseTool { tool_name, .. } = &action {
            if self.registry.get_or_load(tool_name).await.is_none() {
                warn!(tool = %tool_name, "planner proposed an unknown tool");
                return None;
            }
        }

        Some(action)
    }
}

fn is_duplicate(run: &Run, action: &Action) -> bool {
    matches!(action, Action::UseTool { tool_name, args, .. } if run.has_identical_tool_call(tool_name, args))
}

/// `task + lastN(history, 3)`, truncated to 500 characters (§4.2 stage 1).
fn build_query(task: &str, run: &Run) -> String {
    let history = run.history();
    let last_three = history.iter().rev().take(3).rev().cloned().collect::<Vec<_>>().join(" ");
    let combined = format!("{task} {last_three}");
    combined.chars().take(500).collect()
}

fn tail_chars(s: &str, n: usize) -> String {
    let total = s.chars().count();
    if total <= n {
        return s.to_string();
    }
    s.chars().skip(total - n).collect()
}

fn build_react_prompt(task: &str, run: &Run, candidates: &[Arc<dyn crate::tools::traits::Tool>]) -> String {
    let history_joined = run.history().join("\n");
    let history_tail = tail_chars(&history_joined, 1500);
    let catalog = candidates
        .iter()
        .map(|t| format!("- {}: {}", t.name(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an autonomous agent deciding the next action to take.\n\
         Task: {task}\n\
         Recent history:\n{history}\n\
         Available tools:\n{catalog}\n\n\
         Respond with exactly one JSON object describing your next action. It must have a \"type\" \
         field equal to one of \"use_tool\", \"ask_human\", or \"final_answer\":\n\
         - {{\"type\": \"use_tool\", \"tool_name\": \"<name>\", \"args\": {{...}}, \"rationale\": \"...\"}}\n\
         - {{\"type\": \"ask_human\", \"question\": \"...\", \"rationale\": \"...\"}}\n\
         - {{\"type\": \"final_answer\", \"output\": \"...\", \"rationale\": \"...\"}}\n\
         Respond with the JSON object only, no other text.",
        task = task,
        history = history_tail,
        catalog = catalog,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceBounds;
    use crate::providers::embeddings::HashEmbeddingProvider;
    use crate::providers::llm::StubLlmProvider;
    use crate::providers::EmbeddingsProvider;
    use crate::tools::builtin::{CalculatorTool, WebSearchTool};
    use serde_json::json;

    async fn registry_with_builtins() -> Arc<ToolRegistry> {
        let dir = tempfile::tempdir().unwrap();
        let embeddings: Arc<dyn EmbeddingsProvider> = Arc::new(HashEmbeddingProvider::new(32));
        let registry = ToolRegistry::new(dir.path(), embeddings, &ResourceBounds::default()).await;
        registry.register(Arc::new(CalculatorTool::default())).await;
        registry.register(Arc::new(WebSearchTool::new())).await;
        Arc::new(registry)
    }

    #[tokio::test]
    async fn pure_math_task_proposes_calculator_without_calling_the_llm() {
        let registry = registry_with_builtins().await;
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![]));
        let planner = Planner::new(registry, llm);

        let run = Run::new("r1".to_string(), "2*(3+4)/5".to_string());
        let action = planner.plan("2*(3+4)/5", &run, 8).await;
        assert_eq!(
            action,
            Action::UseTool {
                tool_name: "calculator".to_string(),
                args: json!({ "expr": "2*(3+4)/5" }),
                rationale: "task reads as an arithmetic expression".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn falls_through_to_the_llm_step_when_no_heuristic_fires() {
        let registry = registry_with_builtins().await;
        let scripted = json!({
            "type": "final_answer",
            "output": "done",
            "rationale": "nothing left to do",
        })
        .to_string();
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![scripted]));
        let planner = Planner::new(registry, llm);

        let run = Run::new("r1".to_string(), "write a haiku about autumn".to_string());
        let action = planner.plan("write a haiku about autumn", &run, 8).await;
        assert_eq!(
            action,
            Action::FinalAnswer {
                output: "done".to_string(),
                rationale: "nothing left to do".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn falls_back_to_ask_human_when_the_llm_step_is_unparseable() {
        let registry = registry_with_builtins().await;
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec!["not json at all".to_string()]));
        let planner = Planner::new(registry, llm);

        let run = Run::new("r1".to_string(), "write a haiku about autumn".to_string());
        let action = planner.plan("write a haiku about autumn", &run, 8).await;
        assert!(matches!(action, Action::AskHuman { .. }));
    }

    #[tokio::test]
    async fn llm_step_rejects_an_action_naming_an_unknown_tool() {
        let registry = registry_with_builtins().await;
        let scripted = json!({
            "type": "use_tool",
            "tool_name": "does_not_exist",
            "args": {},
            "rationale": "x",
        })
        .to_string();
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![scripted]));
        let planner = Planner::new(registry, llm);

        let run = Run::new("r1".to_string(), "write a haiku about autumn".to_string());
        let action = planner.plan("write a haiku about autumn", &run, 8).await;
        assert!(matches!(action, Action::AskHuman { .. }));
    }
}
