//! Approval Policy: a pure decision function over `(mode, sensitive)` plus
//! the interactive yes/no prompt it sometimes defers to.

use dialoguer::{theme::ColorfulTheme, Confirm};

use crate::config::ApprovalMode;
use crate::error::{Error, Result};

/// Pure decision for `(mode, sensitive)`. `always` has no pure answer — it
/// defers to [`prompt_approval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
    AskHuman,
}

pub fn decide(mode: ApprovalMode, sensitive: bool) -> Decision {
    match mode {
        ApprovalMode::Auto => Decision::Approve,
        ApprovalMode::Sensitive => {
            if sensitive {
                Decision::Deny
            } else {
                Decision::Approve
            }
        }
        ApprovalMode::Always => Decision::AskHuman,
    }
}

/// Blocking interactive yes/no prompt, run off the async executor since
/// `dialoguer` does raw terminal I/O. Always returns a bool outcome; the
/// caller is responsible for recording the `approval-response` step
/// regardless of the answer.
pub async fn prompt_approval(summary: &str) -> Result<bool> {
    let prompt = format!("Approve: {summary}?");
    tokio::task::spawn_blocking(move || {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(false)
            .interact()
    })
    .await
    .map_err(|e| Error::Internal(format!("approval prompt task panicked: {e}")))?
    .map_err(|e| Error::Internal(format!("approval prompt failed: {e}")))
}

/// Blocking interactive free-text prompt, used for `AskHuman` actions.
pub async fn prompt_question(question: &str) -> Result<String> {
    let prompt = question.to_string();
    tokio::task::spawn_blocking(move || {
        dialoguer::Input::<String>::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()
    })
    .await
    .map_err(|e| Error::Internal(format!("question prompt task panicked: {e}")))?
    .map_err(|e| Error::Internal(format!("question prompt failed: {e}")))
}

/// Truncate a JSON value's string form to `n` characters for the
/// approval-request summary (`name(truncatedArgs[..50])`, §4.4).
pub fn summarize_call(tool_name: &str, args: &serde_json::Value, n: usize) -> String {
    let args_str = args.to_string();
    let truncated: String = args_str.chars().take(n).collect();
    format!("{tool_name}({truncated})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_always_approves() {
        assert_eq!(decide(ApprovalMode::Auto, true), Decision::Approve);
        assert_eq!(decide(ApprovalMode::Auto, false), Decision::Approve);
    }

    #[test]
    fn sensitive_mode_denies_sensitive_tools_only() {
        assert_eq!(decide(ApprovalMode::Sensitive, true), Decision::Deny);
        assert_eq!(decide(ApprovalMode::Sensitive, false), Decision::Approve);
    }

    #[test]
    fn always_mode_defers_to_human() {
        assert_eq!(decide(ApprovalMode::Always, false), Decision::AskHuman);
        assert_eq!(decide(ApprovalMode::Always, true), Decision::AskHuman);
    }

    #[test]
    fn summarize_call_truncates_to_n_chars() {
        let args = serde_json::json!({"expr": "1+2+3+4+5+6+7+8+9+10+11+12+13+14+15"});
        let summary = summarize_call("calculator", &args, 10);
        assert!(summary.starts_with("calculator("));
        assert!(summary.len() <= "calculator(".len() + 10 + 1);
    }
}
