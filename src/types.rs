//! Core data model: actions, steps, runs, and the history projection built
//! from them. These types are shared by the planner, the agent controller,
//! and the run store.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::{new_id, now_ms};

/// The planner's decision for the next step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    UseTool {
        tool_name: String,
        args: Value,
        rationale: String,
    },
    AskHuman {
        question: String,
        rationale: String,
    },
    FinalAnswer {
        output: String,
        rationale: String,
    },
}

/// The discriminant of a `Step`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    Thought,
    Tool,
    Observation,
    Final,
    ApprovalRequest,
    ApprovalResponse,
    Interruption,
}

/// One atomic entry in a run's trajectory. `data` is a free-form JSON payload
/// whose shape depends on `kind`; see the `data::*` constructors below for
/// the shapes this crate actually produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub run_id: String,
    pub kind: StepKind,
    pub ts: i64,
    pub data: Value,
}

impl Step {
    pub fn new(run_id: &str, kind: StepKind, data: Value) -> Self {
        Step {
            id: new_id(),
            run_id: run_id.to_string(),
            kind,
            ts: now_ms(),
            data,
        }
    }
}

/// Constructors for the `data` payload of each step kind, kept in one place
/// so the agent controller and the planner agree on field names.
pub mod data {
    use super::Value;
    use serde_json::json;

    pub fn thought(step: u32, action_type: &str, tool: Option<&str>, rationale: &str) -> Value {
        json!({
            "step": step,
            "actionType": action_type,
            "tool": tool,
            "rationale": rationale,
        })
    }

    pub fn tool_call(tool: &str, args: &Value) -> Value {
        json!({ "tool": tool, "args": args })
    }

    pub fn observation_ok(result: &Value) -> Value {
        json!({ "result": result })
    }

    pub fn observation_err(error: &str) -> Value {
        json!({ "error": error })
    }

    pub fn human_answer(answer: &str) -> Value {
        json!({ "answer": answer })
    }

    pub fn final_answer(output: &str) -> Value {
        json!({ "output": output })
    }

    pub fn approval_request(summary: &str, sensitive: bool) -> Value {
        json!({ "summary": summary, "sensitive": sensitive })
    }

    pub fn approval_response(approved: bool) -> Value {
        json!({ "approved": approved })
    }

    pub fn interruption(reason: &str) -> Value {
        json!({ "reason": reason })
    }
}

/// Lifecycle status of a `Run`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
    Done,
    Failed,
}

/// A single task execution: a unique id, the originating task, and its
/// append-only step log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub task: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub status: RunStatus,
    pub steps: Vec<Step>,
}

impl Run {
    pub fn new(run_id: String, task: String) -> Self {
        let ts = now_ms();
        Run {
            run_id,
            task,
            created_at: ts,
            updated_at: ts,
            status: RunStatus::Running,
            steps: Vec::new(),
        }
    }

    /// Append a step and bump `updatedAt`. Enforces the monotonic-timestamp
    /// invariant by clamping to the previous step's timestamp if the clock
    /// ever appears to go backwards.
    pub fn append_step(&mut self, mut step: Step) {
        if let Some(last) = self.steps.last() {
            if step.ts < last.ts {
                step.ts = last.ts;
            }
        }
        self.updated_at = now_ms().max(step.ts);
        self.steps.push(step);
    }

    /// The readable projection of past steps supplied to the planner.
    pub fn history(&self) -> Vec<String> {
        build_history(&self.steps)
    }

    /// Number of `tool` steps recorded so far that invoked `name`.
    pub fn tool_use_count(&self, name: &str) -> usize {
        self.steps
            .iter()
            .filter(|s| {
                s.kind == StepKind::Tool
                    && s.data.get("tool").and_then(Value::as_str) == Some(name)
            })
            .count()
    }

    /// True if the history already contains a `tool` step invoking `name`
    /// with byte-identical (string-equal JSON) arguments.
    pub fn has_identical_tool_call(&self, name: &str, args: &Value) -> bool {
        let args_str = args.to_string();
        self.steps.iter().any(|s| {
            s.kind == StepKind::Tool
                && s.data.get("tool").and_then(Value::as_str) == Some(name)
                && s.data
                    .get("args")
                    .map(|a| a.to_string() == args_str)
                    .unwrap_or(false)
        })
    }

    /// The observation immediately following the most recent `tool` step
    /// invoking `name`, if any.
    pub fn last_observation_for(&self, name: &str) -> Option<&Value> {
        let mut found_tool = false;
        for s in &self.steps {
            if found_tool && s.kind == StepKind::Observation {
                return Some(&s.data);
            }
            found_tool = s.kind == StepKind::Tool
                && s.data.get("tool").and_then(Value::as_str) == Some(name);
        }
        None
    }
}

/// Reconstruct the readable history projection from a step slice.
pub fn build_history(steps: &[Step]) -> Vec<String> {
    let mut out = Vec::new();
    for step in steps {
        match step.kind {
            StepKind::Tool => {
                let tool = step.data.get("tool").and_then(Value::as_str).unwrap_or("?");
                let args = step
                    .data
                    .get("args")
                    .cloned()
                    .unwrap_or(Value::Null)
                    .to_string();
                out.push(format!("Used {} with {}", tool, args));
            }
            StepKind::Observation => {
                if let Some(answer) = step.data.get("answer").and_then(Value::as_str) {
                    out.push(format!("Human: {}", answer));
                } else {
                    out.push(format!("Observed: {}", step.data));
                }
            }
            StepKind::Final => {
                let output = step.data.get("output").and_then(Value::as_str).unwrap_or("");
                out.push(format!("Final: {}", output));
            }
            _ => {}
        }
    }
    out
}

/// Per-tool circuit breaker state. Closed when `opened_until` is absent or
/// in the past.
#[derive(Debug, Clone, Default)]
pub struct BreakerState {
    pub failures: u32,
    pub opened_until: Option<i64>,
}

impl BreakerState {
    pub fn is_open(&self, now: i64) -> bool {
        self.opened_until.map(|t| now < t).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn history_projection_matches_shapes() {
        let mut run = Run::new("r1".into(), "task".into());
        run.append_step(Step::new(
            "r1",
            StepKind::Tool,
            data::tool_call("calculator", &json!({"expr": "1+1"})),
        ));
        run.append_step(Step::new(
            "r1",
            StepKind::Observation,
            data::observation_ok(&json!({"value": 2})),
        ));
        run.append_step(Step::new("r1", StepKind::Final, data::final_answer("2")));

        let hist = run.history();
        assert_eq!(hist[0], "Used calculator with {\"expr\":\"1+1\"}");
        assert!(hist[1].starts_with("Observed:"));
        assert_eq!(hist[2], "Final: 2");
    }

    #[test]
    fn identical_tool_call_detection() {
        let mut run = Run::new("r1".into(), "task".into());
        let args = json!({"expr": "1+1"});
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("calculator", &args)));
        assert!(run.has_identical_tool_call("calculator", &args));
        assert!(!run.has_identical_tool_call("calculator", &json!({"expr": "2+2"})));
    }

    #[test]
    fn updated_at_never_before_created_at() {
        let mut run = Run::new("r1".into(), "task".into());
        run.append_step(Step::new("r1", StepKind::Thought, json!({})));
        assert!(run.updated_at >= run.created_at);
    }

    #[test]
    fn breaker_state_open_window() {
        let mut b = BreakerState::default();
        assert!(!b.is_open(100));
        b.opened_until = Some(200);
        assert!(b.is_open(150));
        assert!(!b.is_open(250));
    }
}
