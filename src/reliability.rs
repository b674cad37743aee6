//! Reliability Wrapper: per-tool retry with exponential backoff and a
//! failure-threshold circuit breaker. Breaker state is per-tool-name,
//! process-local, in-memory, guarded by a single mutex (the cheaper of the
//! two shapes the specification allows for shared mutable state).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoffBuilder;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::clock::now_ms;
use crate::error::{Error, Result};
use crate::tools::traits::Tool;
use crate::types::BreakerState;

/// Wraps tool execution with retry + circuit breaker. One instance is
/// shared across an agent run (or a whole process); breaker state survives
/// across runs since it is keyed only by tool name.
pub struct ReliabilityWrapper {
    breakers: Mutex<HashMap<String, BreakerState>>,
}

impl ReliabilityWrapper {
    pub fn new() -> Self {
        ReliabilityWrapper {
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// `execute(tool, args)` per §4.5: open breaker fails fast; otherwise
    /// retries up to `tool.retry().retries` times with `baseDelayMs *
    /// 2^attempt` backoff, then trips the breaker on exhaustion.
    pub async fn execute(&self, tool: &Arc<dyn Tool>, args: serde_json::Value) -> Result<serde_json::Value> {
        let name = tool.name().to_string();
        let now = now_ms();

        {
            let breakers = self.breakers.lock().await;
            if let Some(state) = breakers.get(&name) {
                if state.is_open(now) {
                    return Err(Error::CircuitOpen(name));
                }
            }
        }

        let retry = tool.retry();
        let breaker_policy = tool.breaker();

        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(retry.base_delay_ms))
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        let mut last_err = Error::ToolExecutionError(format!("{name}: never attempted"));

        for attempt in 0..=retry.retries {
            match tool.run(args.clone()).await {
                Ok(value) => {
                    self.reset(&name).await;
                    return Ok(value);
                }
                Err(e) => {
                    last_err = Error::ToolExecutionError(e.to_string());
                    if attempt < retry.retries {
                        let delay = backoff.next_backoff().unwrap_or(Duration::from_millis(retry.base_delay_ms));
                        warn!(tool = %name, attempt, delay_ms = delay.as_millis() as u64, "tool failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        self.record_failure(&name, &breaker_policy).await;
        Err(last_err)
    }

    async fn reset(&self, name: &str) {
        let mut breakers = self.breakers.lock().await;
        if let Some(state) = breakers.get_mut(name) {
            state.failures = 0;
        }
    }

    async fn record_failure(&self, name: &str, policy: &crate::tools::traits::BreakerPolicy) {
        let mut breakers = self.breakers.lock().await;
        let state = breakers.entry(name.to_string()).or_default();
        state.failures += 1;
        if state.failures >= policy.failure_threshold {
            state.opened_until = Some(now_ms() + policy.cooldown_ms);
            state.failures = 0;
            info!(tool = name, cooldown_ms = policy.cooldown_ms, "circuit breaker opened");
        }
    }

    #[cfg(test)]
    async fn breaker_state(&self, name: &str) -> Option<BreakerState> {
        self.breakers.lock().await.get(name).cloned()
    }
}

impl Default for ReliabilityWrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::tools::traits::{BreakerPolicy, ObjectSchema, RetryPolicy};

    #[tokio::test]
    async fn retries_before_failing() {
        let wrapper = ReliabilityWrapper::new();
        let t: Arc<dyn Tool> = Arc::new(AlwaysFailsCounting::new(
            RetryPolicy { retries: 2, base_delay_ms: 1 },
            BreakerPolicy { failure_threshold: 100, cooldown_ms: 1000 },
        ));
        let err = wrapper.execute(&t, serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn opens_circuit_after_threshold_and_fails_fast() {
        let wrapper = ReliabilityWrapper::new();
        let t: Arc<dyn Tool> = Arc::new(AlwaysFailsCounting::new(
            RetryPolicy { retries: 0, base_delay_ms: 1 },
            BreakerPolicy { failure_threshold: 2, cooldown_ms: 10_000 },
        ));

        let e1 = wrapper.execute(&t, serde_json::json!({})).await.unwrap_err();
        assert!(!matches!(e1, Error::CircuitOpen(_)));
        let e2 = wrapper.execute(&t, serde_json::json!({})).await.unwrap_err();
        assert!(!matches!(e2, Error::CircuitOpen(_)));

        let e3 = wrapper.execute(&t, serde_json::json!({})).await.unwrap_err();
        assert!(matches!(e3, Error::CircuitOpen(_)));

        let state = wrapper.breaker_state("always_fails_counting").await.unwrap();
        assert!(state.opened_until.is_some());
    }

    struct AlwaysFailsCounting {
        schema: ObjectSchema,
        retry: RetryPolicy,
        breaker: BreakerPolicy,
    }

    impl AlwaysFailsCounting {
        fn new(retry: RetryPolicy, breaker: BreakerPolicy) -> Self {
            AlwaysFailsCounting {
                schema: ObjectSchema::new(vec![]),
                retry,
                breaker,
            }
        }
    }

    #[async_trait]
    impl Tool for AlwaysFailsCounting {
        fn name(&self) -> &str {
            "always_fails_counting"
        }
        fn description(&self) -> &str {
            "a tool that always fails"
        }
        fn schema(&self) -> &ObjectSchema {
            &self.schema
        }
        fn retry(&self) -> RetryPolicy {
            self.retry
        }
        fn breaker(&self) -> BreakerPolicy {
            self.breaker
        }
        async fn run(&self, _args: serde_json::Value) -> Result<serde_json::Value> {
            Err(Error::ToolExecutionError("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn success_resets_failure_counter() {
        let wrapper = ReliabilityWrapper::new();
        let t: Arc<dyn Tool> = Arc::new(AlwaysFailsCounting::new(
            RetryPolicy { retries: 0, base_delay_ms: 1 },
            BreakerPolicy { failure_threshold: 2, cooldown_ms: 10_000 },
        ));
        let _ = wrapper.execute(&t, serde_json::json!({})).await;
        assert_eq!(wrapper.breaker_state("always_fails_counting").await.unwrap().failures, 1);

        // A tool succeeding resets the counter; use calculator as a quick stand-in.
        let calc: Arc<dyn Tool> = Arc::new(crate::tools::builtin::CalculatorTool::default());
        let ok = wrapper.execute(&calc, serde_json::json!({"expr": "1+1"})).await;
        assert!(ok.is_ok());
        assert!(wrapper.breaker_state("calculator").await.is_none());
    }
}
