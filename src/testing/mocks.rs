//! Mock handlers for deterministic flow tests

use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
};
use crate::context::{deep_merge, DelegatedParameters};
use crate::error::{FlowError, FlowResult};
use crate::template::value_to_string;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// What a [`RecordingHandler`] saw when it executed
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInvocation {
    pub id: String,
    pub options: Value,
    pub parameters: DelegatedParameters,
}

#[derive(Debug, Default)]
struct RecordingLog {
    invocations: Vec<RecordedInvocation>,
    started: Vec<String>,
    completed: Vec<String>,
}

/// Options understood by [`RecordingHandler`]
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RecordingOptions {
    id: Option<Value>,
    delay_ms: Option<u64>,
    fail: bool,
    code: Option<String>,
    message: Option<String>,
    skip: bool,
    set_parameter: Option<Map<String, Value>>,
}

/// Handler that records every execution.
///
/// Options: `id` (label used in [`started_ids`](Self::started_ids) and
/// [`completed_ids`](Self::completed_ids)), `delayMs`, `fail` with optional
/// `code` / `message`, `skip` (should-execute returns false) and
/// `setParameter` (merged into the branch's `parameters`).
///
/// Clones share the same log.
#[derive(Clone)]
pub struct RecordingHandler {
    metadata: ActionHandlerMetadata,
    log: Arc<Mutex<RecordingLog>>,
}

impl RecordingHandler {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            metadata: ActionHandlerMetadata::new(id).with_description("Recording test handler"),
            log: Arc::default(),
        }
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metadata = self.metadata.with_aliases(aliases);
        self
    }

    fn with_log<R>(&self, f: impl FnOnce(&mut RecordingLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut log)
    }

    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.with_log(|log| log.invocations.clone())
    }

    pub fn invocation_count(&self) -> usize {
        self.with_log(|log| log.invocations.len())
    }

    /// Ids in the order executions started
    pub fn started_ids(&self) -> Vec<String> {
        self.with_log(|log| log.started.clone())
    }

    /// Ids in the order executions finished, failed ones included
    pub fn completed_ids(&self) -> Vec<String> {
        self.with_log(|log| log.completed.clone())
    }
}

impl ActionHandler for RecordingHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(RecordingProcessor {
            handler: self.clone(),
            invocation,
            options: RecordingOptions::default(),
        })
    }
}

struct RecordingProcessor {
    handler: RecordingHandler,
    invocation: ActionInvocation,
    options: RecordingOptions,
}

#[async_trait]
impl ActionProcessor for RecordingProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options = &self.invocation.options;
        if !(options.is_null() || options.is_object()) {
            return Err(FlowError::validation("recording options must be a mapping"));
        }
        self.options = RecordingOptions::deserialize(options)
            .map_err(|e| FlowError::validation(e.to_string()))?;
        Ok(())
    }

    async fn is_should_execute(&mut self) -> FlowResult<bool> {
        Ok(!self.options.skip)
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let id = self
            .options
            .id
            .as_ref()
            .map(value_to_string)
            .unwrap_or_default();
        let parameters = &self.invocation.parameters;

        self.handler.with_log(|log| {
            log.invocations.push(RecordedInvocation {
                id: id.clone(),
                options: self.invocation.options.clone(),
                parameters: parameters.snapshot(),
            });
            log.started.push(id.clone());
        });

        if let Some(delay) = self.options.delay_ms {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if let Some(values) = &self.options.set_parameter {
            parameters.update(|p| {
                let base = p
                    .parameters
                    .get_or_insert_with(|| Value::Object(Map::new()));
                deep_merge(base, Value::Object(values.clone()));
            });
        }

        self.handler.with_log(|log| log.completed.push(id.clone()));
        snapshot.log(format!("recorded {id}"));

        if self.options.fail {
            let message = self
                .options
                .message
                .clone()
                .unwrap_or_else(|| format!("{id} failed"));
            return Err(match &self.options.code {
                Some(code) => FlowError::action_with_code(message, code.clone()),
                None => FlowError::action(message),
            });
        }
        Ok(())
    }
}

/// Handler whose execution panics
pub struct PanickingHandler;

static PANICKING_METADATA: once_cell::sync::Lazy<ActionHandlerMetadata> =
    once_cell::sync::Lazy::new(|| ActionHandlerMetadata::new("test.panic"));

impl ActionHandler for PanickingHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &PANICKING_METADATA
    }

    fn processor(&self, _invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(PanickingProcessor)
    }
}

struct PanickingProcessor;

#[async_trait]
impl ActionProcessor for PanickingProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        Ok(())
    }

    async fn execute(&mut self, _snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        panic!("panicking handler invoked")
    }
}
