//! Pull a balanced JSON object out of raw model output. Models wrap their
//! answer in prose, code fences, or both; this scans for `{...}` spans with
//! matching braces (respecting string literals and escapes) and keeps the
//! last complete one, per §4.2: "parse the first balanced JSON object found
//! at the end of the output."

use serde_json::Value;

/// Scan `text` for top-level balanced `{...}` spans and return the value of
/// the last one that parses as JSON. Returns `None` if no span parses.
pub fn extract_balanced_json(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut stack: Vec<usize> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut best: Option<Value> = None;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(i),
            b'}' => {
                if let Some(start) = stack.pop() {
                    if stack.is_empty() {
                        if let Ok(candidate) = serde_json::from_str::<Value>(&text[start..=i]) {
                            best = Some(candidate);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_a_bare_object() {
        let v = extract_balanced_json(r#"{"type":"final_answer","output":"42"}"#).unwrap();
        assert_eq!(v, json!({"type": "final_answer", "output": "42"}));
    }

    #[test]
    fn extracts_object_wrapped_in_prose_and_fences() {
        let text = "Here is my answer:\n```json\n{\"type\": \"use_tool\", \"toolName\": \"calculator\", \"args\": {\"expr\": \"1+1\"}, \"rationale\": \"math\"}\n```\nLet me know if that helps.";
        let v = extract_balanced_json(text).unwrap();
        assert_eq!(v["toolName"], "calculator");
        assert_eq!(v["args"]["expr"], "1+1");
    }

    #[test]
    fn ignores_braces_inside_string_literals() {
        let text = r#"{"type": "final_answer", "output": "use {curly} braces in prose"}"#;
        let v = extract_balanced_json(text).unwrap();
        assert_eq!(v["output"], "use {curly} braces in prose");
    }

    #[test]
    fn keeps_the_last_complete_object_when_several_appear() {
        let text = r#"First I considered {"scratch": true} but settled on {"type": "final_answer", "output": "done"}"#;
        let v = extract_balanced_json(text).unwrap();
        assert_eq!(v["type"], "final_answer");
    }

    #[test]
    fn returns_none_for_unbalanced_input() {
        assert!(extract_balanced_json("{\"type\": \"final_answer\"").is_none());
    }

    #[test]
    fn returns_none_for_prose_with_no_object() {
        assert!(extract_balanced_json("I don't know how to answer that.").is_none());
    }
}
