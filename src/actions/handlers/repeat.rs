//! Fixed-count repetition of a step

use super::{as_count, parse_options};
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::context::{IterationParameters, SharedParameters};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RepeatOptions {
    times: Value,
    action: Value,
    #[serde(default, rename = "async")]
    concurrent: bool,
    #[serde(default)]
    share_parameters: bool,
}

struct Prepared {
    times: usize,
    action: StepDocument,
    concurrent: bool,
    share_parameters: bool,
}

/// Runs the same step `times` times with `iteration.index` 0..times
pub struct RepeatFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl RepeatFlowHandler {
    /// Creates a new repeat handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.repeat")
                .with_aliases(["repeat"])
                .with_description("Run a step a fixed number of times")
                .skip_template_processing(),
        }
    }
}

impl Default for RepeatFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for RepeatFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(RepeatProcessor {
            invocation,
            prepared: None,
        })
    }
}

struct RepeatProcessor {
    invocation: ActionInvocation,
    prepared: Option<Prepared>,
}

impl RepeatProcessor {
    /// Parameters for one iteration.
    ///
    /// With `shareParameters` every iteration gets a handle to the caller's
    /// parameters object, so writes are visible to later iterations and to
    /// the caller once the repeat is over, as with `sequence` and `parallel`.
    /// The index stays on the handle and never lands in the shared object.
    /// Otherwise each iteration works on an independent fork.
    fn iteration_parameters(&self, share: bool, index: usize) -> SharedParameters {
        let iteration = IterationParameters::index(index);
        if share {
            self.invocation.parameters.share_for_iteration(iteration)
        } else {
            self.invocation.parameters.fork_for_iteration(iteration)
        }
    }
}

#[async_trait]
impl ActionProcessor for RepeatProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: RepeatOptions = parse_options(&self.invocation.options)?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let times = as_count(
            &flow.resolve_local(&options.times, context, parameters, wd)?,
            "times",
        )?;
        if times < 1 {
            return Err(FlowError::validation("times must be at least 1"));
        }

        self.prepared = Some(Prepared {
            times: usize::try_from(times)
                .map_err(|_| FlowError::validation(format!("times {times} is too large")))?,
            action: StepDocument::parse(&options.action)?,
            concurrent: options.concurrent,
            share_parameters: options.share_parameters,
        });
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| FlowError::validation("repeat options were not validated"))?;
        let ActionInvocation {
            flow, context, wd, ..
        } = &self.invocation;

        let share = prepared.share_parameters;
        debug!(
            "Repeating {} times ({})",
            prepared.times,
            if prepared.concurrent { "async" } else { "sync" }
        );

        if prepared.concurrent {
            let branches = (0..prepared.times).map(|index| {
                let branch_parameters = self.iteration_parameters(share, index);
                let action = &prepared.action;
                async move {
                    flow.execute_document(wd, action, context, &branch_parameters)
                        .await
                }
            });
            for child in join_all(branches).await {
                snapshot.register_child_action_snapshot(child);
            }
        } else {
            for index in 0..prepared.times {
                let branch_parameters = self.iteration_parameters(share, index);
                let child = flow
                    .execute_document(wd, &prepared.action, context, &branch_parameters)
                    .await;
                snapshot.register_child_action_snapshot(child);
            }
        }
        Ok(())
    }
}
