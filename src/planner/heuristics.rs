//! Intelligent and heuristic fallback stages of the planner pipeline
//! (§4.2, stages 2 and 3). Each function returns `None` when its condition
//! doesn't fire, letting the caller fall through to the next stage.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::types::{Action, Run, StepKind};

use super::math::{looks_like_math, sanitize_math_expr};

fn wants_summary_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(summarize|summary|brief|bullets)\b").expect("valid regex"))
}

fn info_gathering_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(find|search|who is|current|latest|version)\b").expect("valid regex")
    })
}

fn generic_search_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(search|find|look up|google|web|current|latest|version)\b").expect("valid regex")
    })
}

fn vs_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\bvs\.?\b|\bversus\b").expect("valid regex"))
}

fn file_read_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(read|open|load)\b[^.!?]*\bfile\b").expect("valid regex"))
}

/// The observation `data` payload immediately following each invocation of
/// `tool_name`, in chronological order.
fn observations_for<'a>(run: &'a Run, tool_name: &str) -> Vec<&'a Value> {
    let mut out = Vec::new();
    let mut pending = false;
    for step in &run.steps {
        if pending && step.kind == StepKind::Observation {
            out.push(&step.data);
            pending = false;
        }
        pending = step.kind == StepKind::Tool && step.data.get("tool").and_then(Value::as_str) == Some(tool_name);
    }
    out
}

fn last_summarize_output(run: &Run) -> Option<String> {
    observations_for(run, "summarize_text")
        .last()
        .and_then(|obs| obs.get("result"))
        .and_then(|r| r.get("output"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn collect_web_snippets(run: &Run) -> Vec<String> {
    observations_for(run, "web_search")
        .into_iter()
        .filter_map(|obs| obs.get("result")?.get("snippetText")?.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn calculator_value_for(run: &Run, expr: &str) -> Option<f64> {
    let mut matched = false;
    for step in &run.steps {
        if matched && step.kind == StepKind::Observation {
            return step.data.get("result")?.get("value")?.as_f64();
        }
        matched = step.kind == StepKind::Tool
            && step.data.get("tool").and_then(Value::as_str) == Some("calculator")
            && step.data.get("args").and_then(|a| a.get("expr")).and_then(Value::as_str) == Some(expr);
    }
    None
}

/// Stage 2: heuristics over the task and the run's trajectory that don't
/// need textual pattern matching on the task itself (besides the
/// "wants a summary" / "information-gathering" keyword checks).
pub fn intelligent_fallback(task: &str, run: &Run) -> Option<Action> {
    if let Some(output) = last_summarize_output(run) {
        if !output.is_empty() {
            return Some(Action::FinalAnswer {
                output,
                rationale: "a summary has already been produced".to_string(),
            });
        }
    }

    let web_snippets = collect_web_snippets(run);
    let has_web_results = !web_snippets.is_empty();
    let already_summarized = run.tool_use_count("summarize_text") > 0;

    if wants_summary_pattern().is_match(task) && has_web_results && !already_summarized {
        return Some(Action::UseTool {
            tool_name: "summarize_text".to_string(),
            args: json!({ "text": web_snippets.join(" "), "instruction": task }),
            rationale: "task asks for a summary and web results are available".to_string(),
        });
    }

    if run.tool_use_count("web_search") >= 3 && has_web_results && !already_summarized {
        let joined = web_snippets.join(" ");
        let output: String = joined.chars().take(500).collect();
        return Some(Action::FinalAnswer {
            output,
            rationale: "enough web results have been gathered to answer directly".to_string(),
        });
    }

    if info_gathering_pattern().is_match(task) && run.tool_use_count("web_search") < 2 {
        return Some(Action::UseTool {
            tool_name: "web_search".to_string(),
            args: json!({ "query": task, "maxResults": 5 }),
            rationale: "task reads as an information-gathering request".to_string(),
        });
    }

    None
}

/// Stage 3: pattern-based heuristics (comparison, single math expression,
/// generic web search, file-read intent), tried in that order.
pub fn heuristic_fallback(task: &str, run: &Run) -> Option<Action> {
    comparison_heuristic(task, run)
        .or_else(|| single_math_heuristic(task, run))
        .or_else(|| generic_web_search_heuristic(task, run))
        .or_else(|| file_read_intent_heuristic(task))
}

fn comparison_heuristic(task: &str, run: &Run) -> Option<Action> {
    if !vs_pattern().is_match(task) {
        return None;
    }
    let mut parts = vs_pattern().splitn(task, 2);
    let left_raw = parts.next()?.trim();
    let right_raw = parts.next()?.trim();

    let left = sanitize_math_expr(left_raw);
    let right = sanitize_math_expr(right_raw);
    if !looks_like_math(&left) || !looks_like_math(&right) {
        return None;
    }

    match (calculator_value_for(run, &left), calculator_value_for(run, &right)) {
        (Some(lv), Some(rv)) => {
            let relation = if lv < rv {
                "less than"
            } else if lv > rv {
                "greater than"
            } else {
                "equal to"
            };
            Some(Action::FinalAnswer {
                output: format!("L = {lv} vs R = {rv} \u{21d2} L is {relation} R"),
                rationale: "both sides of the comparison have been evaluated".to_string(),
            })
        }
        (None, _) => Some(Action::UseTool {
            tool_name: "calculator".to_string(),
            args: json!({ "expr": left }),
            rationale: format!("evaluate the left side of the comparison: `{left}`"),
        }),
        (Some(_), None) => Some(Action::UseTool {
            tool_name: "calculator".to_string(),
            args: json!({ "expr": right }),
            rationale: format!("evaluate the right side of the comparison: `{right}`"),
        }),
    }
}

fn single_math_heuristic(task: &str, run: &Run) -> Option<Action> {
    let sanitized = sanitize_math_expr(task);
    if !looks_like_math(&sanitized) {
        return None;
    }

    if let Some(value) = calculator_value_for(run, &sanitized) {
        return Some(Action::FinalAnswer {
            output: value.to_string(),
            rationale: "the arithmetic expression has already been evaluated".to_string(),
        });
    }

    let args = json!({ "expr": sanitized });
    if run.has_identical_tool_call("calculator", &args) {
        return None;
    }
    Some(Action::UseTool {
        tool_name: "calculator".to_string(),
        args,
        rationale: "task reads as an arithmetic expression".to_string(),
    })
}

fn generic_web_search_heuristic(task: &str, run: &Run) -> Option<Action> {
    if !generic_search_pattern().is_match(task) {
        return None;
    }
    let args = json!({ "query": task, "maxResults": 5 });
    if run.has_identical_tool_call("web_search", &args) {
        return None;
    }
    Some(Action::UseTool {
        tool_name: "web_search".to_string(),
        args,
        rationale: "task reads as a web lookup".to_string(),
    })
}

fn file_read_intent_heuristic(task: &str) -> Option<Action> {
    if !file_read_pattern().is_match(task) {
        return None;
    }
    Some(Action::AskHuman {
        question: "Which file path should I read?".to_string(),
        rationale: "task requests reading a file".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{data, Step};

    #[test]
    fn single_math_proposes_calculator() {
        let run = Run::new("r1".to_string(), "2*(3+4)/5".to_string());
        let action = heuristic_fallback("2*(3+4)/5", &run).unwrap();
        assert_eq!(
            action,
            Action::UseTool {
                tool_name: "calculator".to_string(),
                args: json!({ "expr": "2*(3+4)/5" }),
                rationale: "task reads as an arithmetic expression".to_string(),
            }
        );
    }

    #[test]
    fn single_math_answers_directly_once_the_expression_is_evaluated() {
        let mut run = Run::new("r1".to_string(), "2*(3+4)/5".to_string());
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("calculator", &json!({"expr": "2*(3+4)/5"}))));
        run.append_step(Step::new("r1", StepKind::Observation, data::observation_ok(&json!({"value": 2.8}))));

        let action = heuristic_fallback("2*(3+4)/5", &run).unwrap();
        assert_eq!(
            action,
            Action::FinalAnswer {
                output: "2.8".to_string(),
                rationale: "the arithmetic expression has already been evaluated".to_string(),
            }
        );
    }

    #[test]
    fn single_math_does_not_repeat_an_identical_call() {
        let mut run = Run::new("r1".to_string(), "1+1".to_string());
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("calculator", &json!({"expr": "1+1"}))));
        assert!(heuristic_fallback("1+1", &run).is_none());
    }

    #[test]
    fn comparison_evaluates_left_side_first() {
        let run = Run::new("r1".to_string(), "1+2 vs 2*2".to_string());
        let action = heuristic_fallback("1+2 vs 2*2", &run).unwrap();
        assert_eq!(
            action,
            Action::UseTool {
                tool_name: "calculator".to_string(),
                args: json!({ "expr": "1+2" }),
                rationale: "evaluate the left side of the comparison: `1+2`".to_string(),
            }
        );
    }

    #[test]
    fn comparison_evaluates_right_side_after_left_is_known() {
        let mut run = Run::new("r1".to_string(), "1+2 vs 2*2".to_string());
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("calculator", &json!({"expr": "1+2"}))));
        run.append_step(Step::new("r1", StepKind::Observation, data::observation_ok(&json!({"value": 3.0}))));
        let action = heuristic_fallback("1+2 vs 2*2", &run).unwrap();
        assert_eq!(
            action,
            Action::UseTool {
                tool_name: "calculator".to_string(),
                args: json!({ "expr": "2*2" }),
                rationale: "evaluate the right side of the comparison: `2*2`".to_string(),
            }
        );
    }

    #[test]
    fn comparison_emits_final_answer_once_both_sides_are_known() {
        let mut run = Run::new("r1".to_string(), "1+2 vs 2*2".to_string());
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("calculator", &json!({"expr": "1+2"}))));
        run.append_step(Step::new("r1", StepKind::Observation, data::observation_ok(&json!({"value": 3.0}))));
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("calculator", &json!({"expr": "2*2"}))));
        run.append_step(Step::new("r1", StepKind::Observation, data::observation_ok(&json!({"value": 4.0}))));

        let action = heuristic_fallback("1+2 vs 2*2", &run).unwrap();
        match action {
            Action::FinalAnswer { output, .. } => {
                assert!(output.contains("3"));
                assert!(output.contains("4"));
                assert!(output.contains("less than"));
            }
            other => panic!("expected a final answer, got {other:?}"),
        }
    }

    #[test]
    fn intelligent_fallback_answers_from_a_prior_summary() {
        let mut run = Run::new("r1".to_string(), "summarize the findings".to_string());
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("summarize_text", &json!({"text": "..."}))));
        run.append_step(Step::new(
            "r1",
            StepKind::Observation,
            data::observation_ok(&json!({"output": "- point one\n- point two"})),
        ));

        let action = intelligent_fallback("summarize the findings", &run).unwrap();
        assert_eq!(
            action,
            Action::FinalAnswer {
                output: "- point one\n- point two".to_string(),
                rationale: "a summary has already been produced".to_string(),
            }
        );
    }

    #[test]
    fn intelligent_fallback_requests_a_summary_once_web_results_exist() {
        let mut run = Run::new("r1".to_string(), "summarize the latest rust release".to_string());
        run.append_step(Step::new("r1", StepKind::Tool, data::tool_call("web_search", &json!({"query": "rust release"}))));
        run.append_step(Step::new(
            "r1",
            StepKind::Observation,
            data::observation_ok(&json!({"snippetText": "Rust 1.80 was released."})),
        ));

        let action = intelligent_fallback("summarize the latest rust release", &run).unwrap();
        assert_eq!(
            action,
            Action::UseTool {
                tool_name: "summarize_text".to_string(),
                args: json!({"text": "Rust 1.80 was released.", "instruction": "summarize the latest rust release"}),
                rationale: "task asks for a summary and web results are available".to_string(),
            }
        );
    }

    #[test]
    fn intelligent_fallback_proposes_a_web_search_for_information_requests() {
        let run = Run::new("r1".to_string(), "what is the latest rust version".to_string());
        let action = intelligent_fallback("what is the latest rust version", &run).unwrap();
        assert_eq!(
            action,
            Action::UseTool {
                tool_name: "web_search".to_string(),
                args: json!({"query": "what is the latest rust version", "maxResults": 5}),
                rationale: "task reads as an information-gathering request".to_string(),
            }
        );
    }

    #[test]
    fn file_read_intent_asks_the_human_for_a_path() {
        let run = Run::new("r1".to_string(), "read the config file".to_string());
        let action = heuristic_fallback("read the config file", &run).unwrap();
        assert_eq!(
            action,
            Action::AskHuman {
                question: "Which file path should I read?".to_string(),
                rationale: "task requests reading a file".to_string(),
            }
        );
    }
}
