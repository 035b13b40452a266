//! Runtime definition of new handlers
//!
//! A `virtual` step registers a dynamic handler in the run's context. Every
//! invocation of that handler validates the caller's options against the
//! optional JSON schema, merges them with the declared defaults and runs the
//! fixed `action` with `parameters` set to the merged options.
//!
//! Merge strategies are captured as closures when the handler is defined:
//! a plain deep merge, a merge template rendered against `options` and
//! `defaults`, or per-path modifier expressions receiving `value` and
//! `defaults`.

use super::parse_options;
use crate::actions::{
    ActionHandler, ActionHandlerMetadata, ActionInvocation, ActionProcessor, ActionSnapshot,
    StepDocument, METADATA_PREFIX,
};
use crate::context::{deep_merge, ContextPath};
use crate::error::{FlowError, FlowResult};
use crate::template::{build_scope, TemplateResolver};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Merge of caller options over defaults, evaluated against a template scope
type MergeFn = Arc<dyn Fn(&Value, &Value, &tera::Context) -> FlowResult<Value> + Send + Sync>;

#[derive(Clone)]
pub enum MergeStrategy {
    DeepMerge,
    Function(MergeFn),
    Modifiers(Vec<(ContextPath, MergeFn)>),
}

impl MergeStrategy {
    /// Template value rendered with `options` and `defaults` in scope
    fn function(template: Value, delimiter: char) -> Self {
        let resolver = TemplateResolver::new(delimiter);
        Self::Function(Arc::new(move |options, defaults, scope| {
            let mut scope = scope.clone();
            scope.insert("options", options);
            scope.insert("defaults", defaults);
            resolver.resolve_value(&template, &scope)
        }))
    }

    /// Bare tera expressions per path, with `value` and `defaults` in scope
    fn modifiers(modifiers: Map<String, Value>, delimiter: char) -> FlowResult<Self> {
        let mut compiled = Vec::with_capacity(modifiers.len());
        for (raw_path, expression) in modifiers {
            let path = ContextPath::parse(&raw_path)?;
            let expression = expression.as_str().map(str::to_string).ok_or_else(|| {
                FlowError::validation(format!("modifier for {raw_path} must be an expression string"))
            })?;
            let resolver = TemplateResolver::new(delimiter);
            let modifier: MergeFn = Arc::new(move |value, defaults, scope| {
                let mut scope = scope.clone();
                scope.insert("value", value);
                scope.insert("defaults", defaults);
                resolver.evaluate(&expression, &scope)
            });
            compiled.push((path, modifier));
        }
        Ok(Self::Modifiers(compiled))
    }

    pub fn merge(&self, options: &Value, defaults: &Value, scope: &tera::Context) -> FlowResult<Value> {
        let deep_merged = || {
            let mut merged = defaults.clone();
            if !options.is_null() {
                deep_merge(&mut merged, options.clone());
            }
            merged
        };

        match self {
            Self::DeepMerge => Ok(deep_merged()),
            Self::Function(merge) => merge(options, defaults, scope),
            Self::Modifiers(modifiers) => {
                let mut merged = deep_merged();
                for (path, modifier) in modifiers {
                    let value = path.get(options).cloned().unwrap_or(Value::Null);
                    let default = path.get(defaults).cloned().unwrap_or(Value::Null);
                    let modified = modifier(&value, &default, scope)?;
                    path.assign(&mut merged, modified, true)?;
                }
                Ok(merged)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct DefaultsOptions {
    #[serde(default)]
    values: Option<Value>,
    #[serde(default)]
    merge_function: Option<Value>,
    #[serde(default)]
    modifiers: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct VirtualOptions {
    id: String,
    #[serde(default)]
    aliases: Vec<String>,
    #[serde(default)]
    defaults: Option<DefaultsOptions>,
    #[serde(default)]
    parameters_schema: Option<Value>,
    action: Value,
}

/// Everything a dynamic handler needs per invocation
struct VirtualDefinition {
    defaults: Value,
    merge: MergeStrategy,
    schema: Option<jsonschema::Validator>,
    action: StepDocument,
}

/// Registers a dynamic handler built from its options
pub struct VirtualFlowHandler {
    metadata: ActionHandlerMetadata,
}

impl VirtualFlowHandler {
    /// Creates a new virtual handler
    pub fn new() -> Self {
        Self {
            metadata: ActionHandlerMetadata::new("actionflow.flow.virtual")
                .with_aliases(["virtual"])
                .with_description("Define a new handler at runtime")
                .skip_template_processing(),
        }
    }
}

impl Default for VirtualFlowHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionHandler for VirtualFlowHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(VirtualProcessor {
            invocation,
            handler: None,
        })
    }
}

struct VirtualProcessor {
    invocation: ActionInvocation,
    handler: Option<Arc<DynamicHandler>>,
}

#[async_trait]
impl ActionProcessor for VirtualProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let options: VirtualOptions = parse_options(&self.invocation.options)?;
        if options.id.is_empty() {
            return Err(FlowError::validation("id must not be empty"));
        }
        let metadata = ActionHandlerMetadata::new(options.id).with_aliases(options.aliases);
        if let Some(key) = metadata.keys().find(|k| k.starts_with(METADATA_PREFIX)) {
            return Err(FlowError::validation(format!(
                "\"{key}\" must not start with \"{METADATA_PREFIX}\""
            )));
        }

        let delimiter = self.invocation.context.delimiters().local;
        let defaults = options.defaults.unwrap_or_default();
        let merge = match (defaults.merge_function, defaults.modifiers) {
            (Some(_), Some(_)) => {
                return Err(FlowError::validation(
                    "mergeFunction and modifiers cannot be combined",
                ))
            }
            (Some(template), None) => MergeStrategy::function(template, delimiter),
            (None, Some(modifiers)) => MergeStrategy::modifiers(modifiers, delimiter)?,
            (None, None) => MergeStrategy::DeepMerge,
        };

        let schema = options
            .parameters_schema
            .as_ref()
            .map(|schema| {
                jsonschema::validator_for(schema)
                    .map_err(|e| FlowError::validation(format!("invalid parametersSchema: {e}")))
            })
            .transpose()?;

        self.handler = Some(Arc::new(DynamicHandler {
            metadata,
            definition: Arc::new(VirtualDefinition {
                defaults: defaults.values.unwrap_or_else(|| Value::Object(Map::new())),
                merge,
                schema,
                action: StepDocument::parse(&options.action)?,
            }),
        }));
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| FlowError::validation("virtual options were not validated"))?;
        let id = handler.metadata.id.clone();

        self.invocation
            .context
            .dynamic_action_handlers()
            .register(handler)?;
        info!("Registered dynamic handler {}", id);
        snapshot.log(format!("registered dynamic handler {id}"));
        Ok(())
    }
}

/// Handler produced by a `virtual` step
pub struct DynamicHandler {
    metadata: ActionHandlerMetadata,
    definition: Arc<VirtualDefinition>,
}

impl ActionHandler for DynamicHandler {
    fn metadata(&self) -> &ActionHandlerMetadata {
        &self.metadata
    }

    fn processor(&self, invocation: ActionInvocation) -> Box<dyn ActionProcessor> {
        Box::new(DynamicProcessor {
            invocation,
            definition: Arc::clone(&self.definition),
            merged: None,
        })
    }
}

struct DynamicProcessor {
    invocation: ActionInvocation,
    definition: Arc<VirtualDefinition>,
    merged: Option<Value>,
}

#[async_trait]
impl ActionProcessor for DynamicProcessor {
    async fn validate(&mut self) -> FlowResult<()> {
        let ActionInvocation {
            options,
            context,
            parameters,
            wd,
            id_or_alias,
            ..
        } = &self.invocation;

        if let Some(schema) = &self.definition.schema {
            if !schema.is_valid(options) {
                let errors: Vec<String> = schema
                    .iter_errors(options)
                    .map(|e| e.to_string())
                    .collect();
                return Err(FlowError::validation(format!(
                    "options of {id_or_alias} do not match parametersSchema: {}",
                    errors.join("; ")
                )));
            }
        }

        let scope = build_scope(context, &parameters.snapshot(), wd);
        let merged = self
            .definition
            .merge
            .merge(options, &self.definition.defaults, &scope)?;
        debug!("Merged options for {}", id_or_alias);
        self.merged = Some(merged);
        Ok(())
    }

    async fn execute(&mut self, snapshot: &mut ActionSnapshot) -> FlowResult<()> {
        let merged = self
            .merged
            .clone()
            .ok_or_else(|| FlowError::validation("dynamic handler options were not validated"))?;
        let ActionInvocation {
            flow,
            context,
            parameters,
            wd,
            ..
        } = &self.invocation;

        let branch_parameters = parameters.fork();
        branch_parameters.set_parameters(merged);
        let child = flow
            .execute_document(wd, &self.definition.action, context, &branch_parameters)
            .await;
        snapshot.register_child_action_snapshot(child);
        Ok(())
    }
}
