//! Iteration over the values of a list or a mapping

use super::parse_options;
use crate::actions::step::kind_of;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::context::IterationParameters;
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForEachOptions {
    of: Value,
    action: Value,
    #[serde(default, rename = "async")]
    concurrent: bool,
}

struct Prepared {
    iterations: Vec<IterationParameters>,
    action: StepDocument,
    concurrent: bool,
}

/// Runs `action` once per element of `of`
pub struct ForEachFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl ForEachFlowHandler {
    /// Creates a new each handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.each")
                .with_aliases(["for.each", "each"])
                .with_description("Run a step for every element of a list or mapping")
                .skip_template_processing(),
        }
    }
}

impl Default for ForEachFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for ForEachFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(ForEachProcessor {
            invocation,
            prepared: None,
        })
    }
}

struct ForEachProcessor {
    invocation: ActionInvocation,
    prepared: Option<Prepared>,
}

/// Loop state for every element; mapping keys become `iteration.key`
fn iterations_of(of: Value) -> FlowResult<Vec<IterationParameters>> {
    match of {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(index, value)| IterationParameters {
                index,
                value: Some(value),
                key: None,
            })
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .enumerate()
            .map(|(index, (key, value))| IterationParameters {
                index,
                value: Some(value),
                key: Some(key),
            })
            .collect()),
        other => Err(FlowError::validation(format!(
            "of must resolve to a list or a mapping, got {}",
            kind_of(&other)
        ))),
    }
}

#[async_trait]
impl ActionProcessor for ForEachProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: ForEachOptions = parse_options(&self.invocation.options)?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let of = flow.resolve_local(&options.of, context, parameters, wd)?;
        self.prepared = Some(Prepared {
            iterations: iterations_of(of)?,
            action: StepDocument::parse(&options.action)?,
            concurrent: options.concurrent,
        });
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| FlowError::validation("each options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        debug!(
            "Iterating over {} elements ({})",
            prepared.iterations.len(),
            if prepared.concurrent { "async" } else { "sync" }
        );

        if prepared.concurrent {
            let branches = prepared.iterations.iter().map(|iteration| {
                let branch_parameters = parameters.fork_for_iteration(iteration.clone());
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
            for iteration in &prepared.iterations {
                let branch_parameters = parameters.fork_for_iteration(iteration.clone());
                let child = flow
                    .execute_document(wd, &prepared.action, context, &branch_parameters)
                    .await;
                snapshot.register_child_action_snapshot(child);
            }
        }
        Ok(())
    }
}
