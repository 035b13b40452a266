//! Built-in action handlers
//!
//! Flow-control handlers opt out of template processing: their child steps
//! are handed to the dispatcher untouched and only their own scalar control
//! fields are resolved, with the local delimiter, when they need them.

use super::step::{kind_of, parse_step_list, StepDocument};
use super::ActionHandler;
use crate::error::{FlowError, FlowResult};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

pub mod context_values;
pub mod error;
pub mod foreach;
pub mod invoke;
pub mod log;
pub mod parallel;
pub mod repeat;
pub mod retry;
pub mod sequence;
pub mod sleep;
pub mod switch;
pub mod try_catch;
pub mod virtual_handler;
pub mod void;
pub mod while_loop;

pub use context_values::{ContextValuesHandler, SecretValuesHandler};
pub use error::ErrorHandler;
pub use foreach::ForEachFlowHandler;
pub use invoke::InvokeFlowHandler;
pub use log::LogHandler;
pub use parallel::ParallelFlowHandler;
pub use repeat::RepeatFlowHandler;
pub use retry::RetryFlowHandler;
pub use sequence::SequenceFlowHandler;
pub use sleep::SleepFlowHandler;
pub use switch::SwitchFlowHandler;
pub use try_catch::TryCatchFlowHandler;
pub use virtual_handler::VirtualFlowHandler;
pub use void::VoidFlowHandler;
pub use while_loop::WhileFlowHandler;

/// Every handler registered by [`ActionHandlersRegistry::with_defaults`](super::ActionHandlersRegistry::with_defaults)
pub fn builtin_handlers() -> Vec<Arc<dyn ActionHandler>> {
    vec![
        Arc::new(SequenceFlowHandler::new()),
        Arc::new(ParallelFlowHandler::new()),
        Arc::new(ForEachFlowHandler::new()),
        Arc::new(RepeatFlowHandler::new()),
        Arc::new(WhileFlowHandler::new()),
        Arc::new(SwitchFlowHandler::new()),
        Arc::new(TryCatchFlowHandler::new()),
        Arc::new(RetryFlowHandler::new()),
        Arc::new(InvokeFlowHandler::new()),
        Arc::new(VoidFlowHandler::new()),
        Arc::new(VirtualFlowHandler::new()),
        Arc::new(ContextValuesHandler::new()),
        Arc::new(SecretValuesHandler::new()),
        Arc::new(SleepFlowHandler::new()),
        Arc::new(ErrorHandler::new()),
        Arc::new(LogHandler::new()),
    ]
}

/// Deserialize step options, reporting shape errors as validation errors
pub(crate) fn parse_options<T: DeserializeOwned>(options: &Value) -> FlowResult<T> {
    T::deserialize(options).map_err(|e| FlowError::validation(e.to_string()))
}

/// Children of `sequence` / `parallel`: a bare list or `{actions, shareParameters}`
#[derive(Debug, Clone)]
pub(crate) struct StepListOptions {
    pub steps: Vec<StepDocument>,
    /// Children get the caller's own parameters handle instead of a fork,
    /// so their writes reach siblings and the caller. `repeat` follows the
    /// same rule.
    pub share_parameters: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DetailedStepList {
    actions: Value,
    #[serde(default)]
    share_parameters: bool,
}

impl StepListOptions {
    pub fn parse(options: &Value) -> FlowResult<Self> {
        match options {
            Value::Array(_) => Ok(Self {
                steps: parse_step_list(options)?,
                share_parameters: false,
            }),
            Value::Object(_) => {
                let detailed: DetailedStepList = parse_options(options)?;
                Ok(Self {
                    steps: parse_step_list(&detailed.actions)?,
                    share_parameters: detailed.share_parameters,
                })
            }
            other => Err(FlowError::validation(format!(
                "expected a list of steps or {{actions, shareParameters}}, got {}",
                kind_of(other)
            ))),
        }
    }
}

/// Non-negative integer that may arrive as a number or a numeric string
pub(crate) fn as_count(value: &Value, field: &str) -> FlowResult<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| {
        FlowError::validation(format!(
            "{field} must be a non-negative integer, got {value}"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_list_options() {
        let list = StepListOptions::parse(&json!([{"void": null}])).unwrap();
        assert_eq!(list.steps.len(), 1);
        assert!(!list.share_parameters);

        let detailed = StepListOptions::parse(&json!({
            "actions": [{"void": null}, {"void": null}],
            "shareParameters": true
        }))
        .unwrap();
        assert_eq!(detailed.steps.len(), 2);
        assert!(detailed.share_parameters);

        assert!(StepListOptions::parse(&json!([])).is_err());
        assert!(StepListOptions::parse(&json!("void")).is_err());
        assert!(StepListOptions::parse(&json!({"actions": [], "extra": 1})).is_err());
    }

    #[test]
    fn test_as_count() {
        assert_eq!(as_count(&json!(3), "times").unwrap(), 3);
        assert_eq!(as_count(&json!(" 4 "), "times").unwrap(), 4);
        assert!(as_count(&json!(-1), "times").is_err());
        assert!(as_count(&json!(1.5), "times").is_err());
        assert!(as_count(&json!(true), "times").is_err());
    }

    #[test]
    fn test_builtin_ids_are_unique() {
        let handlers = builtin_handlers();
        let mut keys: Vec<String> = handlers
            .iter()
            .flat_map(|h| h.metadata().keys().map(str::to_string).collect::<Vec<_>>())
            .collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
    }
}
