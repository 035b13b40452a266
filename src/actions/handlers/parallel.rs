//! Concurrent execution of child steps

use super::StepListOptions;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;

/// Runs every child concurrently and waits for all of them
pub struct ParallelFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl ParallelFlowHandler {
    /// Creates a new parallel handler, aliased `||`
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.parallel")
                .with_aliases(["parallel", "async", "||"])
                .with_description("Run steps concurrently")
                .skip_template_processing(),
        }
    }
}

impl Default for ParallelFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for ParallelFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(ParallelProcessor {
            invocation,
            options: None,
        })
    }
}

struct ParallelProcessor {
    invocation: ActionInvocation,
    options: Option<StepListOptions>,
}

#[async_trait]
impl ActionProcessor for ParallelProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        self.options = Some(StepListOptions::parse(&self.invocation.options)?);
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let options = self
            .options
            .as_ref()
            .ok_or_else(|| FlowError::validation("parallel options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        debug!("Launching {} parallel steps", options.steps.len());
        let branches = options.steps.iter().map(|step| {
            let branch_parameters = if options.share_parameters {
                parameters.share()
            } else {
                parameters.fork()
            };
            async move {
                flow.execute_document(wd, step, context, &branch_parameters)
                    .await
            }
        });

        // join_all keeps declaration order regardless of completion order
        for child in join_all(branches).await {
            snapshot.register_child_action_snapshot(child);
        }
        Ok(())
    }
}
