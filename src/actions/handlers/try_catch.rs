//! Failure absorption with catch / finally blocks

use super::parse_options;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TryOptions {
    action: Value,
    #[serde(default)]
    catch: Option<Value>,
    #[serde(default)]
    finally: Option<Value>,
}

struct Prepared {
    action: StepDocument,
    catch: Option<StepDocument>,
    finally: Option<StepDocument>,
}

/// Runs `action`; a failure is absorbed unless the recovery blocks fail too.
///
/// Both `catch` and `finally` run only when `action` failed.
pub struct TryCatchFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl TryCatchFlowHandler {
    /// Creates a new try/catch handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.try")
                .with_aliases(["try"])
                .with_description("Absorb the failure of a step")
                .skip_template_processing(),
        }
    }
}

impl Default for TryCatchFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for TryCatchFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(TryProcessor {
            invocation,
            prepared: None,
        })
    }
}

struct TryProcessor {
    invocation: ActionInvocation,
    prepared: Option<Prepared>,
}

#[async_trait]
impl ActionProcessor for TryProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: TryOptions = parse_options(&self.invocation.options)?;
        self.prepared = Some(Prepared {
            action: StepDocument::parse(&options.action)?,
            catch: options.catch.as_ref().map(StepDocument::parse).transpose()?,
            finally: options.finally.as_ref().map(StepDocument::parse).transpose()?,
        });
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| FlowError::validation("try options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let child = flow
            .execute_document(wd, &prepared.action, context, parameters)
            .await;
        let failed = !child.successful;
        snapshot.register_child_action_snapshot(child);
        if !failed {
            return Ok(());
        }

        debug!("Try block failed, absorbing");
        snapshot.ignore_child_failure = true;

        for block in [&prepared.catch, &prepared.finally].into_iter().flatten() {
            let child = flow.execute_document(wd, block, context, parameters).await;
            snapshot.ignore_child_failure = child.successful;
            snapshot.register_child_action_snapshot(child);
        }
        Ok(())
    }
}
