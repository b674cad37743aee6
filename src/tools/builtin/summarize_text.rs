//! Summarize-text tool: asks the LLM provider to condense a block of text.
//! Backs the planner's summarization heuristics (§4.2).

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::tools::traits::{Field, FieldKind, ObjectSchema, Tool};

pub struct SummarizeTextTool {
    llm: Arc<dyn LlmProvider>,
    schema: ObjectSchema,
}

impl SummarizeTextTool {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        SummarizeTextTool {
            llm,
            schema: ObjectSchema::new(vec![
                Field { name: "text", kind: FieldKind::String, required: true },
                Field { name: "instruction", kind: FieldKind::String, required: false },
            ]),
        }
    }
}

#[async_trait]
impl Tool for SummarizeTextTool {
    fn name(&self) -> &str {
        "summarize_text"
    }

    fn description(&self) -> &str {
        "Summarize a block of text, optionally following a specific instruction."
    }

    fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let text = args
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ToolExecutionError("summarize_text: missing `text`".to_string()))?;
        let instruction = args
            .get("instruction")
            .and_then(Value::as_str)
            .unwrap_or("Summarize succinctly with key bullets");

        let prompt = format!(
            "{instruction}\n\nText:\n---\n{text}\n---\n\nRespond with the summary only, no preamble.",
            instruction = instruction,
            text = text,
        );

        let output = self.llm.complete(&prompt).await?;
        Ok(json!({ "output": output.trim() }))
    }
}
