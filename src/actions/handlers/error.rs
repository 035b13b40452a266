use super::parse_options;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ErrorOptions {
    Message(String),
    Detailed {
        message: String,
        #[serde(default)]
        code: Option<String>,
    },
}

/// Always fails with the configured message and optional code
pub struct ErrorHandler {
    metadata: ActionHandlerMetadata,
}

impl ErrorHandler {
    /// Creates a new error handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.error")
                .with_aliases(["error", "fail"])
                .with_description("Fail the step"),
        }
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for ErrorHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(ErrorProcessor {
            invocation,
            options: None,
        })
    }
}

struct ErrorProcessor {
    invocation: ActionInvocation,
    options: Option<ErrorOptions>,
}

#[async_trait]
impl ActionProcessor for ErrorProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        self.options = Some(parse_options(&self.invocation.options)?);
        Ok(())
    }

    async fn execute(&mut self, _snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        Err(match self.options.clone() {
            Some(ErrorOptions::Message(message)) => FlowError::action(message),
            Some(ErrorOptions::Detailed {
                message,
                code: Some(code),
            }) => FlowError::action_with_code(message, code),
            Some(ErrorOptions::Detailed { message, code: None }) => FlowError::action(message),
            None => FlowError::validation("error options were not validated"),
        })
    }
}
