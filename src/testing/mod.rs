//! Testing utilities
//!
//! Mock handlers plus small helpers to build a dispatcher and run a single
//! step against a fresh context.

use crate::actions::{
    handlers::builtin_handlers, ActionHandler, ActionHandlersRegistry, ActionSnapshot,
};
use crate::config::FlowConfig;
use crate::context::{FlowContext, SharedParameters};
use crate::flow::FlowService;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::error;

pub mod mocks;

pub use mocks::{PanickingHandler, RecordedInvocation, RecordingHandler};

/// Dispatcher over the built-in handlers plus the given recorders
pub fn flow_with<I>(debug: bool, recorders: I) -> FlowService
where
    I: IntoIterator<Item = RecordingHandler>,
{
    let registry = ActionHandlersRegistry::new();
    let handlers = builtin_handlers()
        .into_iter()
        .chain(recorders.into_iter().map(|r| Arc::new(r) as Arc<dyn ActionHandler>));
    for handler in handlers {
        if let Err(err) = registry.register(handler) {
            error!("Failed to register test handler: {}", err);
        }
    }
    FlowService::with_registry(
        registry,
        FlowConfig {
            debug,
            ..Default::default()
        },
    )
}

/// Run `step` against a fresh context
pub async fn run_step(flow: &FlowService, step: Value) -> ActionSnapshot {
    run_step_in(flow, step, &Arc::new(FlowContext::default())).await
}

/// Run `step` against `context` with empty parameters.
///
/// A malformed step yields a failed snapshot keyed `<invalid>`.
pub async fn run_step_in(
    flow: &FlowService,
    step: Value,
    context: &Arc<FlowContext>,
) -> ActionSnapshot {
    let wd = std::env::temp_dir();
    match flow
        .execute_step(&wd, &step, context, &SharedParameters::default())
        .await
    {
        Ok(snapshot) => snapshot,
        Err(err) => {
            let mut snapshot = ActionSnapshot::new("<invalid>", Map::new(), wd, 0, false);
            snapshot.failure(&err);
            snapshot
        }
    }
}
