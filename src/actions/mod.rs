//! Action handler architecture
//!
//! Every step key in a flow document resolves to an [`ActionHandler`]. The
//! handler is an immutable descriptor; for each invocation it produces an
//! [`ActionProcessor`] that validates the step's options, decides whether the
//! step should run and then executes it. Flow-control handlers recurse into
//! the dispatcher through [`ActionInvocation::flow`].

use crate::context::{FlowContext, SharedParameters};
use crate::error::FlowResult;
use crate::flow::FlowService;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

pub mod handlers;
pub mod registry;
pub mod snapshot;
pub mod step;

pub use registry::ActionHandlersRegistry;
pub use snapshot::{ActionSnapshot, FailureRecord, SnapshotStep, StepPayload};
pub use step::{parse_step_list, StepDocument, METADATA_PREFIX};

/// Descriptor of a handler: identity, aliases and dispatch flags
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionHandlerMetadata {
    pub id: String,
    pub version: String,
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Options are handed over exactly as written, without local template resolution
    pub skip_template_processing: bool,
}

impl ActionHandlerMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            aliases: Vec::new(),
            description: None,
            skip_template_processing: false,
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn skip_template_processing(mut self) -> Self {
        self.skip_template_processing = true;
        self
    }

    /// Id followed by every alias
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// Everything a processor is bound to for one step invocation
#[derive(Clone)]
pub struct ActionInvocation {
    pub id_or_alias: String,
    pub options: Value,
    pub context: Arc<FlowContext>,
    pub parameters: SharedParameters,
    pub wd: PathBuf,
    pub flow: FlowService,
}

/// Per-invocation unit of work; discarded after use
#[async_trait]
pub trait ActionProcessor: Send {
    /// Reject invalid options
    async fn validate(&mut self) -> FlowResult<()>;

    /// Whether `execute` should run at all
    async fn is_should_execute(&mut self) -> FlowResult<bool> {
        Ok(true)
    }

    /// Perform the step; may mutate the context and the parameters
    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()>;
}

/// Core trait that every step handler implements
pub trait ActionHandler: Send + Sync {
    fn metadata(&self) -> &ActionHandlerMetadata;

    /// Bind a fresh processor to one invocation
    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_builder() {
        let metadata = ActionHandlerMetadata::new("test.handler")
            .with_aliases(["t", "test"])
            .with_description("Test handler")
            .skip_template_processing();

        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["test.handler", "t", "test"]);
        assert!(metadata.skip_template_processing);
        assert_eq!(metadata.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(metadata.description.as_deref(), Some("Test handler"));
    }
}
