//! Dispatch of a step computed at runtime

use crate::actions::step::kind_of;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use serde_json::Value;

/// Passthrough: options are a step document (or a template producing one)
pub struct InvokeFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl InvokeFlowHandler {
    /// Creates a new invoke handler, registered under `@`
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.invoke")
                .with_aliases(["invoke", "@"])
                .with_description("Run a step document")
                .skip_template_processing(),
        }
    }
}

impl Default for InvokeFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for InvokeFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(InvokeProcessor {
            invocation,
            step: None,
        })
    }
}

struct InvokeProcessor {
    invocation: ActionInvocation,
    step: Option<StepDocument>,
}

#[async_trait]
impl ActionProcessor for InvokeProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            options,
            ..
        } = &self.invocation;

        let document = match options {
            Value::String(_) => flow.resolve_local(options, context, parameters, wd)?,
            Value::Object(_) => options.clone(),
            other => {
                return Err(FlowError::validation(format!(
                    "expected a step or a template producing one, got {}",
                    kind_of(other)
                )))
            }
        };
        self.step = Some(
            StepDocument::parse(&document)
                .map_err(|e| FlowError::validation(e.to_string()))?,
        );
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let step = self
            .step
            .as_ref()
            .ok_or_else(|| FlowError::validation("invoke options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let child = flow.execute_document(wd, step, context, parameters).await;
        snapshot.register_child_action_snapshot(child);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::FlowContext;
    use crate::testing::{flow_with, run_step, run_step_in, RecordingHandler};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_invokes_inline_step() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let snapshot = run_step(&flow, json!({"@": {"rec": {"id": "inner"}}})).await;

        assert!(snapshot.successful);
        assert_eq!(recorder.completed_ids(), vec!["inner"]);
    }

    #[tokio::test]
    async fn test_invokes_step_from_context() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let context = Arc::new(
            FlowContext::default().with_ctx(json!({"step": {"rec": {"id": "computed"}}})),
        );
        let snapshot = run_step_in(&flow, json!({"invoke": "<$ ctx.step $>"}), &context).await;

        assert!(snapshot.successful);
        assert_eq!(recorder.completed_ids(), vec!["computed"]);
    }

    #[tokio::test]
    async fn test_child_failure_is_exposed() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let snapshot = run_step(&flow, json!({"invoke": {"rec": {"fail": true}}})).await;
        assert!(!snapshot.successful);
    }

    #[tokio::test]
    async fn test_rejects_malformed_step() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let snapshot = run_step(&flow, json!({"invoke": {"a": 1, "b": 2}})).await;
        assert!(!snapshot.successful);
    }
}
