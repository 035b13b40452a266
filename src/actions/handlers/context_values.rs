//! Inline assignment into `ctx` and `secrets`

use super::parse_options;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::context::{ContextPath, FlowContext};
use crate::error::{FlowError, FlowResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ValueEntry {
    inline: Value,
    #[serde(default, rename = "override")]
    override_: bool,
    #[serde(default)]
    push: bool,
    #[serde(default)]
    children: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Store {
    Ctx,
    Secrets,
}

impl Store {
    fn name(self) -> &'static str {
        match self {
            Self::Ctx => "ctx",
            Self::Secrets => "secrets",
        }
    }

    fn update<R>(self, context: &FlowContext, f: impl FnOnce(&mut Value) -> R) -> R {
        match self {
            Self::Ctx => context.update_ctx(f),
            Self::Secrets => context.update_secrets(f),
        }
    }
}

/// Assigns or pushes inline values into `ctx`
pub struct ContextValuesHandler {
    metadata: ActionHandlerMetadata,
}

impl ContextValuesHandler {
    /// Creates a new handler for `ctx` values
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.context.values")
                .with_aliases(["ctx"])
                .with_description("Assign values to ctx"),
        }
    }
}

impl Default for ContextValuesHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for ContextValuesHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(ValuesProcessor::new(invocation, Store::Ctx))
    }
}

/// Assigns or pushes inline values into `secrets`
pub struct SecretValuesHandler {
    metadata: ActionHandlerMetadata,
}

impl SecretValuesHandler {
    /// Creates a new handler for `secrets` values
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.secret.values")
                .with_aliases(["secrets"])
                .with_description("Assign values to secrets"),
        }
    }
}

impl Default for SecretValuesHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for SecretValuesHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(ValuesProcessor::new(invocation, Store::Secrets))
    }
}

struct ValuesProcessor {
    invocation: ActionInvocation,
    store: Store,
    entries: Vec<(ContextPath, ValueEntry)>,
}

impl ValuesProcessor {
    fn new(invocation: ActionInvocation, store: Store) -> Self {
        Self {
            invocation,
            store,
            entries: Vec::new(),
        }
    }
}

#[async_trait]
impl ActionProcessor for ValuesProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let entries: Map<String, Value> = parse_options(&self.invocation.options)?;
        if entries.is_empty() {
            return Err(FlowError::validation(format!(
                "{} requires at least one path",
                self.store.name()
            )));
        }

        self.entries = entries
            .iter()
            .map(|(path, entry)| {
                let entry: ValueEntry = parse_options(entry)
                    .map_err(|e| FlowError::validation(format!("{path}: {e}")))?;
                Ok((ContextPath::parse(path)?, entry))
            })
            .collect::<FlowResult<Vec<_>>>()?;
        Ok(())
    }

    async fn execute(&mut self, _snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let context = &self.invocation.context;
        for (path, entry) in &self.entries {
            debug!("Writing {} at {}", self.store.name(), path);
            let value = entry.inline.clone();
            self.store.update(context, |root| {
                if entry.push {
                    path.push(root, value, entry.children, entry.override_)
                } else {
                    path.assign(root, value, entry.override_)
                }
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::context::FlowContext;
    use crate::testing::{flow_with, run_step_in, RecordingHandler};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_assign_and_push() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let context = Arc::new(FlowContext::default().with_ctx(json!({"keep": 1})));
        let snapshot = run_step_in(
            &flow,
            json!({"--": [
                {"ctx": {
                    "$": {"inline": {"root": true}},
                    "$.list": {"inline": [1, 2], "push": true, "children": true}
                }},
                {"ctx": {"$.list": {"inline": 3, "push": true}}}
            ]}),
            &context,
        )
        .await;

        assert!(snapshot.successful);
        assert_eq!(context.ctx(), json!({"keep": 1, "root": true, "list": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn test_secrets_are_separate() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let context = Arc::new(FlowContext::default());
        run_step_in(
            &flow,
            json!({"secrets": {"$.token": {"inline": "abc"}}}),
            &context,
        )
        .await;

        assert_eq!(context.secrets(), json!({"token": "abc"}));
        assert_eq!(context.ctx(), json!({}));
    }

    #[tokio::test]
    async fn test_invalid_entries() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let context = Arc::new(FlowContext::default());
        for options in [
            json!({}),
            json!({"nope": {"inline": 1}}),
            json!({"$.a": {"value": 1}}),
            json!({"$.a": 5}),
        ] {
            let snapshot = run_step_in(&flow, json!({"ctx": options}), &context).await;
            assert!(!snapshot.successful);
        }
    }

    #[tokio::test]
    async fn test_root_scalar_is_rejected() {
        let flow = flow_with(false, Vec::<RecordingHandler>::new());
        let context = Arc::new(FlowContext::default());
        let snapshot = run_step_in(&flow, json!({"ctx": {"$": {"inline": 1}}}), &context).await;
        assert!(!snapshot.successful);
    }
}
