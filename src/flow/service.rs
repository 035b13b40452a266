//! Step dispatcher
//!
//! [`FlowService::execute_document`] drives one step through its lifecycle:
//! handler lookup, local template resolution, validation, the should-execute
//! check and execution. Every error raised on the way, panics included, ends
//! up as a `failure` step on the returned snapshot; the dispatcher never
//! returns an error for a step that has been parsed.

use crate::actions::{
    ActionHandler, ActionHandlersRegistry, ActionInvocation, ActionSnapshot, StepDocument,
};
use crate::config::FlowConfig;
use crate::context::{deep_merge, diff_values, FlowContext, SharedParameters};
use crate::error::{FlowError, FlowResult};
use crate::template::{build_scope, TemplateResolver};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

struct ServiceInner {
    registry: ActionHandlersRegistry,
    config: FlowConfig,
    idx: AtomicUsize,
}

/// Dispatcher shared by the runner and every flow-control handler
#[derive(Clone)]
pub struct FlowService {
    inner: Arc<ServiceInner>,
}

impl FlowService {
    /// Service over the built-in handlers
    pub fn new(config: FlowConfig) -> FlowResult<Self> {
        Ok(Self::with_registry(
            ActionHandlersRegistry::with_defaults()?,
            config,
        ))
    }

    pub fn with_registry(registry: ActionHandlersRegistry, config: FlowConfig) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                registry,
                config,
                idx: AtomicUsize::new(0),
            }),
        }
    }

    /// Static handlers registered at startup
    pub fn registry(&self) -> &ActionHandlersRegistry {
        &self.inner.registry
    }

    pub fn config(&self) -> &FlowConfig {
        &self.inner.config
    }

    /// Handlers defined at runtime win over the static ones
    pub fn find_handler(
        &self,
        context: &FlowContext,
        id_or_alias: &str,
    ) -> Option<Arc<dyn ActionHandler>> {
        context
            .dynamic_action_handlers()
            .find(id_or_alias)
            .or_else(|| self.inner.registry.find(id_or_alias))
    }

    /// Parse a raw step and dispatch it
    pub async fn execute_step(
        &self,
        wd: &Path,
        step: &Value,
        context: &Arc<FlowContext>,
        parameters: &SharedParameters,
    ) -> FlowResult<ActionSnapshot> {
        let document = StepDocument::parse(step)?;
        Ok(self
            .execute_document(wd, &document, context, parameters)
            .await)
    }

    /// Dispatch a step given as its parts
    pub async fn execute_action(
        &self,
        wd: &Path,
        id_or_alias: &str,
        metadata: Map<String, Value>,
        options: Value,
        context: &Arc<FlowContext>,
        parameters: &SharedParameters,
    ) -> ActionSnapshot {
        let step = StepDocument {
            id_or_alias: id_or_alias.to_string(),
            options,
            metadata,
        };
        self.execute_document(wd, &step, context, parameters).await
    }

    /// Run one step through its full lifecycle
    pub async fn execute_document(
        &self,
        wd: &Path,
        step: &StepDocument,
        context: &Arc<FlowContext>,
        parameters: &SharedParameters,
    ) -> ActionSnapshot {
        let idx = self.inner.idx.fetch_add(1, Ordering::SeqCst);
        let id_or_alias = step.id_or_alias.as_str();
        let label = step.label();
        let mut snapshot = ActionSnapshot::new(
            id_or_alias,
            step.metadata.clone(),
            wd,
            idx,
            self.config().debug,
        );

        let Some(handler) = self.find_handler(context, id_or_alias) else {
            warn!("[{}] No handler found for {}", idx, id_or_alias);
            snapshot.failure(&FlowError::HandlerNotFound(id_or_alias.to_string()));
            return snapshot;
        };

        let parameters = match self.apply_parameters_override(step, context, parameters, wd) {
            Ok(parameters) => parameters,
            Err(err) => {
                warn!("[{}] {} invalid $parameters: {}", idx, label, err);
                snapshot.failure(&err);
                return snapshot;
            }
        };

        let options = if handler.metadata().skip_template_processing {
            step.options.clone()
        } else {
            match self.resolve_local(&step.options, context, &parameters, wd) {
                Ok(resolved) => resolved,
                Err(err) => {
                    warn!("[{}] {} template resolution failed: {}", idx, label, err);
                    snapshot.failure(&err);
                    return snapshot;
                }
            }
        };

        info!("[{}] -> {}", idx, label);
        if snapshot.is_debug() {
            snapshot.set_options(context.mask_value(&options));
            snapshot.set_parameters(parameters.snapshot());
            trace!(
                "[{}] {} options: {}",
                idx,
                label,
                context.mask_secrets(&options.to_string())
            );
        }
        snapshot.start();

        let mut processor = handler.processor(ActionInvocation {
            id_or_alias: id_or_alias.to_string(),
            options,
            context: Arc::clone(context),
            parameters,
            wd: wd.to_path_buf(),
            flow: self.clone(),
        });

        if let Err(err) = guarded(processor.validate()).await {
            warn!("[{}] {} validation failed: {}", idx, label, context.mask_secrets(&err.to_string()));
            snapshot.failure(&err);
            return snapshot;
        }
        snapshot.validated();
        debug!("[{}] {} validated", idx, label);

        match guarded(processor.is_should_execute()).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("[{}] {} skipped", idx, label);
                snapshot.skipped();
                return snapshot;
            }
            Err(err) => {
                warn!("[{}] {} failed: {}", idx, label, context.mask_secrets(&err.to_string()));
                snapshot.failure(&err);
                return snapshot;
            }
        }

        let ctx_before = snapshot.is_debug().then(|| context.ctx());
        let result = guarded(processor.execute(&mut snapshot)).await;
        if let Some(before) = ctx_before {
            snapshot.set_context_changes(diff_values(&before, &context.ctx()));
        }

        match result {
            Ok(()) => snapshot.success(),
            Err(err) => {
                warn!("[{}] {} failed: {}", idx, label, context.mask_secrets(&err.to_string()));
                snapshot.failure(&err);
            }
        }

        if snapshot.successful {
            info!("[{}] <- {} succeeded in {}ms", idx, label, snapshot.duration);
        } else {
            info!("[{}] <- {} failed in {}ms", idx, label, snapshot.duration);
        }
        snapshot
    }

    /// Resolve local-scope tags in `value`
    pub fn resolve_local(
        &self,
        value: &Value,
        context: &FlowContext,
        parameters: &SharedParameters,
        wd: &Path,
    ) -> FlowResult<Value> {
        resolve_with(context.delimiters().local, value, context, parameters, wd)
    }

    /// Resolve global-scope tags in `value`
    pub fn resolve_global(
        &self,
        value: &Value,
        context: &FlowContext,
        parameters: &SharedParameters,
        wd: &Path,
    ) -> FlowResult<Value> {
        resolve_with(context.delimiters().global, value, context, parameters, wd)
    }

    /// Fork the branch parameters and merge `$parameters` over them
    fn apply_parameters_override(
        &self,
        step: &StepDocument,
        context: &FlowContext,
        parameters: &SharedParameters,
        wd: &Path,
    ) -> FlowResult<SharedParameters> {
        let Some(overlay) = step.parameters_override() else {
            return Ok(parameters.clone());
        };
        let overlay = self.resolve_local(overlay, context, parameters, wd)?;
        if !overlay.is_object() {
            return Err(FlowError::validation("$parameters must be a mapping"));
        }

        let forked = parameters.fork();
        forked.update(|p| {
            let base = p
                .parameters
                .get_or_insert_with(|| Value::Object(Map::new()));
            deep_merge(base, overlay);
        });
        Ok(forked)
    }
}

fn resolve_with(
    delimiter: char,
    value: &Value,
    context: &FlowContext,
    parameters: &SharedParameters,
    wd: &Path,
) -> FlowResult<Value> {
    let resolver = TemplateResolver::new(delimiter);
    if !contains_tags(&resolver, value) {
        return Ok(value.clone());
    }
    let scope = build_scope(context, &parameters.snapshot(), wd);
    resolver.resolve_value(value, &scope)
}

fn contains_tags(resolver: &TemplateResolver, value: &Value) -> bool {
    match value {
        Value::String(s) => resolver.has_tags(s),
        Value::Array(items) => items.iter().any(|v| contains_tags(resolver, v)),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| resolver.has_tags(k) || contains_tags(resolver, v)),
        _ => false,
    }
}

/// Await a processor call, turning a panic into an action error
async fn guarded<T, F>(future: F) -> FlowResult<T>
where
    F: Future<Output = FlowResult<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(FlowError::action(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
