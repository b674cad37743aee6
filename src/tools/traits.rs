//! The uniform capability set every tool exposes: `{describe, validate, run}`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Retry policy consumed by the reliability wrapper. Defaults mirror §3:
/// 2 retries, 400ms base delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 2,
            base_delay_ms: 400,
        }
    }
}

/// Circuit breaker policy consumed by the reliability wrapper. Defaults
/// mirror §3: 3-failure threshold, 30s cooldown.
#[derive(Debug, Clone, Copy)]
pub struct BreakerPolicy {
    pub failure_threshold: u32,
    pub cooldown_ms: i64,
}

impl Default for BreakerPolicy {
    fn default() -> Self {
        BreakerPolicy {
            failure_threshold: 3,
            cooldown_ms: 30_000,
        }
    }
}

/// The kind of a top-level schema field, for light validation and the
/// inferencer's "hinted keys" introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Number,
    Bool,
    Any,
}

/// One top-level argument field.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

/// A value-object argument schema: validates a JSON object against a flat
/// set of top-level fields and exposes `keys()` for introspection by the
/// argument inferencer's LLM-based fallback.
#[derive(Debug, Clone, Default)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
}

impl ObjectSchema {
    pub fn new(fields: Vec<Field>) -> Self {
        ObjectSchema { fields }
    }

    /// Validate `args`: must be a JSON object, every required field present,
    /// and present fields matching their declared kind (loosely — `Any`
    /// accepts anything, numbers accept numeric JSON values only).
    pub fn validate(&self, args: &Value) -> std::result::Result<Value, Vec<String>> {
        let obj = match args.as_object() {
            Some(o) => o,
            None => return Err(vec!["arguments must be a JSON object".to_string()]),
        };

        let mut issues = Vec::new();
        for field in &self.fields {
            match obj.get(field.name) {
                None if field.required => {
                    issues.push(format!("missing required field `{}`", field.name));
                }
                Some(v) => {
                    let ok = match field.kind {
                        FieldKind::String => v.is_string(),
                        FieldKind::Number => v.is_number(),
                        FieldKind::Bool => v.is_boolean(),
                        FieldKind::Any => true,
                    };
                    if !ok {
                        issues.push(format!("field `{}` has the wrong type", field.name));
                    }
                }
                None => {}
            }
        }

        if issues.is_empty() {
            Ok(args.clone())
        } else {
            Err(issues)
        }
    }

    /// Top-level key names, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.to_string()).collect()
    }
}

/// A uniform tool capability set. Implemented once per built-in tool and,
/// in principle, once per dynamically loaded tool.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn schema(&self) -> &ObjectSchema;

    /// Whether this tool requires explicit approval under `sensitive` mode.
    fn sensitive(&self) -> bool {
        false
    }
    fn retry(&self) -> RetryPolicy {
        RetryPolicy::default()
    }
    fn breaker(&self) -> BreakerPolicy {
        BreakerPolicy::default()
    }
    /// Catalog categories this tool belongs to; `"core"` tools are exempt
    /// from the cache's idle-timeout sweep.
    fn categories(&self) -> &[&'static str] {
        &[]
    }
    /// Relative ranking hint, 0-100.
    fn priority(&self) -> u8 {
        50
    }

    async fn run(&self, args: Value) -> Result<Value>;
}
