//! Condition-driven loop

use super::parse_options;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::context::IterationParameters;
use crate::error::{FlowError, FlowResult};
use crate::template::value_to_string;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WhileOptions {
    value: Value,
    #[serde(default)]
    is: Option<Value>,
    #[serde(default)]
    not: Option<Value>,
    action: Value,
}

#[derive(Debug, Clone)]
enum Expectation {
    Is(Value),
    Not(Value),
}

struct Prepared {
    value: Value,
    expectation: Expectation,
    action: StepDocument,
}

/// Runs `action` while `value` equals `is` (or differs from `not`)
pub struct WhileFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl WhileFlowHandler {
    /// Creates a new while handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.while")
                .with_aliases(["while"])
                .with_description("Repeat a step while a condition holds")
                .skip_template_processing(),
        }
    }
}

impl Default for WhileFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for WhileFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(WhileProcessor {
            invocation,
            prepared: None,
        })
    }
}

struct WhileProcessor {
    invocation: ActionInvocation,
    prepared: Option<Prepared>,
}

impl WhileProcessor {
    /// Re-resolve both sides and compare their string forms
    fn condition_holds(&self, prepared: &Prepared) -> FlowResult<bool> {
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;
        let resolve = |value: &Value| {
            flow.resolve_local(value, context, parameters, wd)
                .map(|v| value_to_string(&v))
        };

        let actual = resolve(&prepared.value)?;
        Ok(match &prepared.expectation {
            Expectation::Is(expected) => actual == resolve(expected)?,
            Expectation::Not(unexpected) => actual != resolve(unexpected)?,
        })
    }
}

#[async_trait]
impl ActionProcessor for WhileProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: WhileOptions = parse_options(&self.invocation.options)?;
        let expectation = match (options.is, options.not) {
            (Some(is), None) => Expectation::Is(is),
            (None, Some(not)) => Expectation::Not(not),
            _ => {
                return Err(FlowError::validation(
                    "exactly one of is or not must be provided",
                ))
            }
        };

        self.prepared = Some(Prepared {
            value: options.value,
            expectation,
            action: StepDocument::parse(&options.action)?,
        });
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| FlowError::validation("while options were not validated"))?;

        let mut index = 0;
        while self.condition_holds(prepared)? {
            let ActionInvocation {
                flow,
                context,
                parameters,
                wd,
                ..
            } = &self.invocation;
            let branch_parameters = parameters.fork_for_iteration(IterationParameters::index(index));
            let child = flow
                .execute_document(wd, &prepared.action, context, &branch_parameters)
                .await;
            let failed = !child.successful;
            snapshot.register_child_action_snapshot(child);

            if failed {
                debug!("While loop stopped after failed iteration {}", index);
                break;
            }
            index += 1;
        }
        debug!("While loop finished after {} iterations", index);
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
    async fn test_false_at_entry_runs_nothing() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let snapshot = run_step(
            &flow,
            json!({"while": {"value": "a", "is": "b", "action": {"rec": {}}}}),
        )
        .await;

        assert!(snapshot.successful);
        assert_eq!(recorder.invocation_count(), 0);
    }

    #[tokio::test]
    async fn test_loops_until_condition_changes() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let context = Arc::new(FlowContext::default().with_ctx(json!({"n": 0})));
        let snapshot = run_step_in(
            &flow,
            json!({"while": {
                "value": "<$ ctx.n < 3 $>",
                "is": true,
                "action": {"--": [
                    {"rec": {"id": "<$ iteration.index $>"}},
                    {"ctx": {"$.n": {"inline": "<$ ctx.n + 1 $>"}}}
                ]}
            }}),
            &context,
        )
        .await;

        assert!(snapshot.successful);
        assert_eq!(recorder.completed_ids(), vec!["0", "1", "2"]);
        assert_eq!(context.ctx()["n"], json!(3));
    }

    #[tokio::test]
    async fn test_not_condition() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let context = Arc::new(FlowContext::default().with_ctx(json!({"state": "pending"})));
        let snapshot = run_step_in(
            &flow,
            json!({"while": {
                "value": "<$ ctx.state $>",
                "not": "done",
                "action": {"ctx": {"$.state": {"inline": "done"}}}
            }}),
            &context,
        )
        .await;

        assert!(snapshot.successful);
        assert_eq!(snapshot.children().count(), 1);
    }

    #[tokio::test]
    async fn test_stops_after_failed_iteration() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let snapshot = run_step(
            &flow,
            json!({"while": {"value": 1, "is": "1", "action": {"rec": {"fail": true}}}}),
        )
        .await;

        assert!(!snapshot.successful);
        assert_eq!(recorder.invocation_count(), 1);
    }

    #[tokio::test]
    async fn test_requires_exactly_one_of_is_or_not() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let both = run_step(
            &flow,
            json!({"while": {"value": 1, "is": 1, "not": 2, "action": {"void": null}}}),
        )
        .await;
        let neither = run_step(
            &flow,
            json!({"while": {"value": 1, "action": {"void": null}}}),
        )
        .await;

        assert!(!both.successful);
        assert!(!neither.successful);
    }
}
