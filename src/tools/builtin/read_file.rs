//! Read-file tool: reads a file from within a confined workspace directory.
//! Backs the planner's "file read intent" heuristic, which asks the human
//! for a path and then lets this tool read it.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::tools::traits::{Field, FieldKind, ObjectSchema, Tool};

pub struct ReadFileTool {
    workspace: PathBuf,
    schema: ObjectSchema,
}

impl ReadFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        ReadFileTool {
            workspace,
            schema: ObjectSchema::new(vec![Field {
                name: "path",
                kind: FieldKind::String,
                required: true,
            }]),
        }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file within the agent's workspace."
    }

    fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    fn categories(&self) -> &[&'static str] {
        &["filesystem"]
    }

    async fn run(&self, args: Value) -> Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ToolExecutionError("read_file: missing `path`".to_string()))?;

        use std::path::Component;
        if std::path::Path::new(path)
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(Error::ToolExecutionError(
                "read_file: path escapes the workspace".to_string(),
            ));
        }
        let full_path = self.workspace.join(path);

        let content = tokio::fs::read_to_string(&full_path)
            .await
            .map_err(|e| Error::ToolExecutionError(format!("read_file: {}", e)))?;

        Ok(json!({ "path": path, "content": content }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_file_within_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi there").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let out = tool.run(json!({"path": "hello.txt"})).await.unwrap();
        assert_eq!(out["content"], "hi there");
    }

    #[tokio::test]
    async fn rejects_paths_escaping_the_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let err = tool.run(json!({"path": "../../etc/passwd"})).await.unwrap_err();
        assert!(err.to_string().contains("escapes"));
    }
}
