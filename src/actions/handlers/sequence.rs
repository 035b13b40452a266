//! Sequential execution of child steps

use super::StepListOptions;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use tracing::debug;

/// Runs children strictly in order and stops at the first failed child
pub struct SequenceFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl SequenceFlowHandler {
    /// Creates a new sequence handler, aliased `--`
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.sequence")
                .with_aliases(["sequence", "sync", "--"])
                .with_description("Run steps one after another")
                .skip_template_processing(),
        }
    }
}

impl Default for SequenceFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for SequenceFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(SequenceProcessor {
            invocation,
            options: None,
        })
    }
}

struct SequenceProcessor {
    invocation: ActionInvocation,
    options: Option<StepListOptions>,
}

#[async_trait]
impl ActionProcessor for SequenceProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        self.options = Some(StepListOptions::parse(&self.invocation.options)?);
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let options = self
            .options
            .as_ref()
            .ok_or_else(|| FlowError::validation("sequence options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let total = options.steps.len();
        for (index, step) in options.steps.iter().enumerate() {
            let child_parameters = if options.share_parameters {
                parameters.share()
            } else {
                parameters.fork()
            };
            let child = flow
                .execute_document(wd, step, context, &child_parameters)
                .await;
            let failed = !child.successful;
            snapshot.register_child_action_snapshot(child);

            if failed {
                debug!(
                    "Sequence stopped at step {}/{} ({})",
                    index + 1,
                    total,
                    step.label()
                );
                break;
            }
        }
        Ok(())
    }
}
