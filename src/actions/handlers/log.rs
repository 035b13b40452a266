use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::error::{FlowError, FlowResult};
use crate::template::value_to_string;
use async_trait::async_trait;
use tracing::info;

/// Writes a message to the log and to the snapshot
pub struct LogHandler {
    metadata: ActionHandlerMetadata,
}

impl LogHandler {
    /// Creates a new log handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.log")
                .with_aliases(["log"])
                .with_description("Log a message"),
        }
    }
}

impl Default for LogHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for LogHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(LogProcessor { invocation })
    }
}

struct LogProcessor {
    invocation: ActionInvocation,
}

#[async_trait]
impl ActionProcessor for LogProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        if self.invocation.options.is_null() {
            return Err(FlowError::validation("log requires a message"));
        }
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let message = self
            .invocation
            .context
            .mask_secrets(&value_to_string(&self.invocation.options));
        info!("{}", message);
        snapshot.log(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::actions::StepPayload;
    use crate::context::FlowContext;
    use crate::testing::{flow_with, run_step_in, RecordingHandler};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_log_is_masked() {
        let flow = flow_with(true, Vec::<RecordingHandler>::new());
        let context = Arc::new(FlowContext::default().with_secrets(json!({"token": "abc123"})));
        let snapshot = run_step_in(
            &flow,
            json!({"log": "token is <$ secrets.token $>"}),
            &context,
        )
        .await;

        assert!(snapshot.successful);
        assert!(snapshot
            .steps
            .iter()
            .any(|s| matches!(&s.step, StepPayload::Log(m) if m == "token is {MASKED}")));
    }

    #[tokio::test]
    async fn test_log_requires_message() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let context = Arc::new(FlowContext::default());
        assert!(!run_step_in(&flow, json!({"log": null}), &context).await.successful);
    }
}
