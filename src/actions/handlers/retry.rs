//! Re-invocation of a failing step

use super::{as_count, parse_options};
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument,
};
use crate::context::{IterationParameters, TargetSpec};
use crate::error::{ErrorCode, FlowError, FlowResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct ErrorCodeTargets {
    #[serde(default)]
    assign_to: Option<TargetSpec>,
    #[serde(default)]
    push_to: Option<TargetSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RetryOptions {
    action: Value,
    attempts: Value,
    #[serde(default)]
    error_code: Option<ErrorCodeTargets>,
}

struct Prepared {
    action: StepDocument,
    attempts: u64,
    error_code: ErrorCodeTargets,
}

/// Runs `action` up to `attempts` times, stopping at the first success
pub struct RetryFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl RetryFlowHandler {
    /// Creates a new retry handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.retry")
                .with_aliases(["retry"])
                .with_description("Retry a failing step")
                .skip_template_processing(),
        }
    }
}

impl Default for RetryFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for RetryFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(RetryProcessor {
            invocation,
            prepared: None,
        })
    }
}

struct RetryProcessor {
    invocation: ActionInvocation,
    prepared: Option<Prepared>,
}

#[async_trait]
impl ActionProcessor for RetryProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: RetryOptions = parse_options(&self.invocation.options)?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let attempts = as_count(
            &flow.resolve_local(&options.attempts, context, parameters, wd)?,
            "attempts",
        )?;
        if attempts < 1 {
            return Err(FlowError::validation("attempts must be at least 1"));
        }

        let error_code = options.error_code.unwrap_or_default();
        for target in [&error_code.assign_to, &error_code.push_to].into_iter().flatten() {
            target.validate()?;
        }

        self.prepared = Some(Prepared {
            action: StepDocument::parse(&options.action)?,
            attempts,
            error_code,
        });
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let prepared = self
            .prepared
            .as_ref()
            .ok_or_else(|| FlowError::validation("retry options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let mut succeeded = false;
        let mut last_code = None;
        for attempt in 0..prepared.attempts {
            let index = usize::try_from(attempt).unwrap_or(usize::MAX);
            let attempt_parameters = parameters.fork_for_iteration(IterationParameters::index(index));
            let child = flow
                .execute_document(wd, &prepared.action, context, &attempt_parameters)
                .await;
            succeeded = child.successful;
            if !succeeded {
                last_code = Some(
                    child
                        .error_code()
                        .unwrap_or_else(|| ErrorCode::UNEXPECTED.to_string()),
                );
            }
            snapshot.register_child_action_snapshot(child);

            if succeeded {
                debug!("Retry succeeded on attempt {}", attempt + 1);
                break;
            }
            debug!("Attempt {}/{} failed", attempt + 1, prepared.attempts);
        }

        if !succeeded {
            warn!("All {} attempts failed", prepared.attempts);
            let code = Value::String(last_code.unwrap_or_else(|| ErrorCode::UNEXPECTED.to_string()));
            if let Some(target) = &prepared.error_code.assign_to {
                target.assign(&code, context, parameters)?;
            }
            if let Some(target) = &prepared.error_code.push_to {
                target.push(&code, context, parameters)?;
            }
        }

        snapshot.ignore_child_failure = succeeded;
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
    async fn test_exhaustion_assigns_error_code() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let context = Arc::new(FlowContext::default());
        let snapshot = run_step_in(
            &flow,
            json!({"retry": {
                "attempts": 2,
                "action": {"rec": {"fail": true, "code": "E_DOWN"}},
                "errorCode": {"assignTo": "$.lastError", "pushTo": {"ctx": "$.errors"}}
            }}),
            &context,
        )
        .await;

        assert!(!snapshot.successful);
        assert_eq!(recorder.invocation_count(), 2);
        assert_eq!(snapshot.children().count(), 2);
        assert_eq!(context.ctx()["lastError"], json!("E_DOWN"));
        assert_eq!(context.ctx()["errors"], json!(["E_DOWN"]));
    }

    #[tokio::test]
    async fn test_missing_code_defaults_to_unexpected() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let context = Arc::new(FlowContext::default());
        run_step_in(
            &flow,
            json!({"retry": {
                "attempts": 1,
                "action": {"rec": {"fail": true}},
                "errorCode": {"assignTo": {"ctx": "$.code", "secrets": "$.code"}}
            }}),
            &context,
        )
        .await;

        assert_eq!(context.ctx()["code"], json!("UNEXPECTED"));
        assert_eq!(context.secrets()["code"], json!("UNEXPECTED"));
    }

    #[tokio::test]
    async fn test_stops_at_first_success() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let snapshot = run_step(
            &flow,
            json!({"retry": {
                "attempts": 5,
                "action": {"rec": {"id": "<$ iteration.index $>", "fail": "<$ iteration.index < 2 $>"}}
            }}),
        )
        .await;

        assert!(snapshot.successful);
        assert!(snapshot.child_failure);
        assert_eq!(recorder.completed_ids(), vec!["0", "1", "2"]);
    }

    #[tokio::test]
    async fn test_attempts_must_be_positive() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let snapshot = run_step(
            &flow,
            json!({"retry": {"attempts": 0, "action": {"void": null}}}),
        )
        .await;
        assert!(!snapshot.successful);
    }

    #[tokio::test]
    async fn test_invalid_target_path_fails_validation() {
        let recorder = RecordingHandler::new("rec");
        let flow = flow_with(false, [recorder.clone()]);
        let snapshot = run_step(
            &flow,
            json!({"retry": {
                "attempts": 1,
                "action": {"rec": {}},
                "errorCode": {"assignTo": "no-dollar"}
            }}),
        )
        .await;

        assert!(!snapshot.successful);
        assert_eq!(recorder.invocation_count(), 0);
    }
}
