//! No-op placeholder

use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;

pub struct VoidFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl VoidFlowHandler {
    /// Creates a new void handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.void")
                .with_aliases(["void", "noop"])
                .with_description("Do nothing"),
        }
    }
}

impl Default for VoidFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for VoidFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(VoidProcessor { invocation })
    }
}

struct VoidProcessor {
    invocation: ActionInvocation,
}

#[async_trait]
impl ActionProcessor for VoidProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        if !self.invocation.options.is_null() {
            return Err(FlowError::validation("void does not accept options"));
        }
        Ok(())
    }

    async fn execute(&mut self, _snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{flow_with, run_step, RecordingHandler};
    use serde_json::json;

    #[tokio::test]
    async fn test_void() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        assert!(run_step(&flow, json!({"void": null})).await.successful);
        assert!(run_step(&flow, json!({"noop": null})).await.successful);
        assert!(!run_step(&flow, json!({"void": {"a": 1}})).await.successful);
    }
}
