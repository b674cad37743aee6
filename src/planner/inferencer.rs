//! Argument Inferencer: repair tool arguments that failed schema validation
//! (or arrived as a bare string) per §4.3. Deterministic shortcuts cover the
//! three built-in tools the spec names explicitly; everything else falls
//! back to an LLM-based repair.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::providers::LlmProvider;
use crate::tools::traits::Tool;
use crate::types::Run;

use super::json_extract::extract_balanced_json;
use super::math::{looks_like_math, sanitize_math_expr};

pub struct ArgumentInferencer {
    llm: Arc<dyn LlmProvider>,
}

impl ArgumentInferencer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        ArgumentInferencer { llm }
    }

    /// Produce repaired arguments for `tool`, given the failing `partial_args`
    /// (which may be a bare string, a partially-filled object, or `null`).
    /// Returns `None` if no repair could be made.
    pub async fn infer(&self, tool: &Arc<dyn Tool>, task: &str, run: &Run, partial_args: &Value) -> Option<Value> {
        if let Some(args) = deterministic_shortcut(tool.name(), task, run, partial_args) {
            return Some(args);
        }
        self.llm_infer(tool, task, run, partial_args).await
    }

    async fn llm_infer(&self, tool: &Arc<dyn Tool>, task: &str, run: &Run, partial_args: &Value) -> Option<Value> {
        let prompt = build_prompt(tool, task, run, partial_args);
        let completion = self.llm.complete(&prompt).await.ok()?;
        extract_balanced_json(&completion)
    }
}

fn deterministic_shortcut(tool_name: &str, task: &str, run: &Run, partial_args: &Value) -> Option<Value> {
    match tool_name {
        "web_search" => {
            let query = as_bare_string(partial_args)
                .or_else(|| partial_args.get("query").and_then(Value::as_str).map(str::to_string))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| task.to_string());
            Some(json!({ "query": query, "maxResults": 5 }))
        }
        "summarize_text" => {
            let joined = run.history().join("\n");
            let text: String = joined.chars().take(4000).collect();
            Some(json!({
                "text": text,
                "instruction": "Summarize succinctly with key bullets",
            }))
        }
        "calculator" => {
            let source = as_bare_string(partial_args)
                .or_else(|| partial_args.get("expr").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| task.to_string());
            let sanitized = sanitize_math_expr(&source);
            looks_like_math(&sanitized).then_some(json!({ "expr": sanitized }))
        }
        _ => None,
    }
}

fn as_bare_string(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

fn build_prompt(tool: &Arc<dyn Tool>, task: &str, run: &Run, partial_args: &Value) -> String {
    let history = run.history();
    let last_six: String = history
        .iter()
        .rev()
        .take(6)
        .rev()
        .cloned()
        .collect::<Vec<_>>()
        .join("\n");
    let last_six: String = last_six.chars().take(1200).collect();

    format!(
        "You are repairing arguments for a tool call that failed validation.\n\
         Tool: {name}\n\
         Description: {desc}\n\
         Expected argument keys: {keys}\n\
         Task: {task}\n\
         Recent history:\n{history}\n\
         Partial arguments so far: {partial}\n\n\
         Respond with exactly one JSON object containing the corrected arguments, and nothing else.",
        name = tool.name(),
        desc = tool.description(),
        keys = tool.schema().keys().join(", "),
        task = task,
        history = last_six,
        partial = partial_args,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::StubLlmProvider;
    use crate::tools::builtin::{CalculatorTool, WebSearchTool};

    fn run() -> Run {
        Run::new("r1".to_string(), "find the latest rust release".to_string())
    }

    #[tokio::test]
    async fn web_search_shortcut_wraps_a_bare_string() {
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![]));
        let inferencer = ArgumentInferencer::new(llm);
        let tool: Arc<dyn Tool> = Arc::new(WebSearchTool::new());

        let args = inferencer
            .infer(&tool, "find the latest rust release", &run(), &json!("latest rust release"))
            .await
            .unwrap();
        assert_eq!(args["query"], "latest rust release");
        assert_eq!(args["maxResults"], 5);
    }

    #[tokio::test]
    async fn web_search_shortcut_falls_back_to_task_when_args_are_empty() {
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![]));
        let inferencer = ArgumentInferencer::new(llm);
        let tool: Arc<dyn Tool> = Arc::new(WebSearchTool::new());

        let args = inferencer
            .infer(&tool, "find the latest rust release", &run(), &Value::Null)
            .await
            .unwrap();
        assert_eq!(args["query"], "find the latest rust release");
    }

    #[tokio::test]
    async fn calculator_shortcut_sanitizes_a_math_expression() {
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec![]));
        let inferencer = ArgumentInferencer::new(llm);
        let tool: Arc<dyn Tool> = Arc::new(CalculatorTool::default());

        let args = inferencer
            .infer(&tool, "what is 2*(3+4)?", &run(), &Value::Null)
            .await
            .unwrap();
        assert_eq!(args["expr"], "2*(3+4)");
    }

    #[tokio::test]
    async fn calculator_shortcut_declines_non_math_text() {
        let llm: Arc<dyn LlmProvider> = Arc::new(StubLlmProvider::new(vec!["{\"expr\": \"1+1\"}".to_string()]));
        let inferencer = ArgumentInferencer::new(llm);
        let tool: Arc<dyn Tool> = Arc::new(CalculatorTool::default());

        let args = inferencer
            .infer(&tool, "tell me a story", &run(), &Value::Null)
            .await
            .unwrap();
        assert_eq!(args["expr"], "1+1");
    }
}
