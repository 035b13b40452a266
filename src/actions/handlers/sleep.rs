use crate::actions::step::kind_of;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Waits for the given number of seconds
pub struct SleepFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl SleepFlowHandler {
    /// Creates a new sleep handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.sleep")
                .with_aliases(["sleep"])
                .with_description("Wait for a number of seconds"),
        }
    }
}

impl Default for SleepFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for SleepFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(SleepProcessor {
            invocation,
            duration: Duration::ZERO,
        })
    }
}

struct SleepProcessor {
    invocation: ActionInvocation,
    duration: Duration,
}

fn seconds(value: &Value) -> FlowResult<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        other => {
            return Err(FlowError::validation(format!(
                "expected a number of seconds, got {}",
                kind_of(other)
            )))
        }
    };
    seconds
        .filter(|s| s.is_finite() && *s >= 0.0)
        .ok_or_else(|| FlowError::validation(format!("invalid number of seconds: {value}")))
}

#[async_trait]
impl ActionProcessor for SleepProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let seconds = seconds(&self.invocation.options)?;
        self.duration = Duration::try_from_secs_f64(seconds).map_err(|e| {
            FlowError::validation(format!("cannot sleep for {seconds} seconds: {e}"))
        })?;
        Ok(())
    }

    async fn execute(&mut self, _snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        debug!("Sleeping for {:?}", self.duration);
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{flow_with, run_step, RecordingHandler};
    use serde_json::json;

    #[test]
    fn test_seconds() {
        assert_eq!(seconds(&json!(1.5)).unwrap(), 1.5);
        assert_eq!(seconds(&json!("0.25")).unwrap(), 0.25);
        assert!(seconds(&json!(-1)).is_err());
        assert!(seconds(&json!("soon")).is_err());
        assert!(seconds(&json!(null)).is_err());
    }

    #[tokio::test]
    async fn test_sleep_step() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let snapshot = run_step(&flow, json!({"sleep": 0.01})).await;
        assert!(snapshot.successful);
    }

    #[tokio::test]
    async fn test_overflowing_duration_is_a_validation_failure() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let snapshot = run_step(&flow, json!({"sleep": 1e300})).await;

        assert!(!snapshot.successful);
        let failure = snapshot.failure_record().unwrap();
        assert!(failure.message.contains("cannot sleep for"), "{}", failure.message);
        assert!(!failure.message.contains("panicked"));
    }
}
