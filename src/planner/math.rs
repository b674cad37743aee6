//! Math-expression sanitization shared by the planner's heuristic fallback
//! and the argument inferencer's `calculator` shortcut (§4.2, §4.3).

use std::sync::OnceLock;

use regex::Regex;

fn math_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d\s*[+\-*/^]\s*\d").expect("math pattern is a valid regex"))
}

/// Strip everything but digits, the five arithmetic operators, parentheses,
/// and whitespace; keep a `.` only when it sits between two digits (so a
/// sentence-ending period is dropped but `3.14` survives); collapse runs of
/// whitespace to single spaces.
pub fn sanitize_math_expr(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(chars.len());

    for (i, &c) in chars.iter().enumerate() {
        if c == '.' {
            let prev_digit = i > 0 && chars[i - 1].is_ascii_digit();
            let next_digit = i + 1 < chars.len() && chars[i + 1].is_ascii_digit();
            if prev_digit && next_digit {
                out.push('.');
            }
            continue;
        }
        let allowed = c.is_ascii_digit()
            || c.is_whitespace()
            || matches!(c, '-' | '+' | '*' | '/' | '^' | '(' | ')');
        if allowed {
            out.push(c);
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether a sanitized expression contains a recognizable
/// number-operator-number pattern, i.e. is worth handing to `calculator`.
pub fn looks_like_math(sanitized: &str) -> bool {
    math_pattern().is_match(sanitized)
}
