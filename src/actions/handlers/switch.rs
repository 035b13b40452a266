//! Branch selection by value

use super::parse_options;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::error::{FlowError, FlowResult};
use crate::template::value_to_string;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SwitchOptions {
    value: Value,
    is: Map<String, Value>,
    #[serde(default, rename = "else")]
    otherwise: Option<Value>,
}

struct Prepared {
    value: Value,
    branches: Vec<(String, StepDocument)>,
    otherwise: Option<StepDocument>,
}

/// Runs the step registered under the resolved value, else the `else` step
pub struct SwitchFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl SwitchFlowHandler {
    /// Creates a new switch handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.switch")
                .with_aliases(["switch", "if"])
                .with_description("Run the step matching a value")
                .skip_template_processing(),
        }
    }
}

impl Default for SwitchFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for SwitchFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(SwitchProcessor {
            invocation,
            prepared: None,
        })
    }
}

struct SwitchProcessor {
    invocation: ActionInvocation,
    prepared: Option<Prepared>,
}

#[async_trait]
impl ActionProcessor for SwitchProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: SwitchOptions = parse_options(&self.invocation.options)?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let value = flow.resolve_local(&options.value, context, parameters, wd)?;
        let branches = options
            .is
            .iter()
            .map(|(label, step)| Ok((label.clone(), StepDocument::parse(step)?)))
            .collect::<FlowResult<Vec<_>>>()?;
        let otherwise = options
            .otherwise
            .as_ref()
            .map(StepDocument::parse)
            .transpose()?;

        self.prepared = Some(Prepared {
            value,
            branches,
            otherwise,
        });
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| FlowError::validation("switch options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let key = value_to_string(&prepared.value);
        let selected = prepared
            .branches
            .iter()
            .find(|(label, _)| *label == key)
            .map(|(_, step)| step)
            .or(prepared.otherwise.as_ref());

        match selected {
            Some(step) => {
                debug!("Switch on \"{}\" selected {}", key, step.label());
                let child = flow.execute_document(wd, step, context, parameters).await;
                snapshot.register_child_action_snapshot(child);
            }
            None => {
                let message = format!("No branch matches \"{key}\", skipping");
                info!("{}", context.mask_secrets(&message));
                snapshot.log(message);
            }
        }
        Ok(())
    }
}
