//! Shared run state
//!
//! One [`FlowContext`] exists per top-level run. It is handed to every
//! handler invocation as `Arc<FlowContext>` and carries the user-visible
//! `ctx` tree, the `secrets` tree, the entity audit trail, the registry of
//! handlers defined at runtime and the template delimiters.
//!
//! Each field sits behind its own lock, so a single read or write is atomic.
//! Read-modify-write sequences that span an `.await` are last-write-wins;
//! concurrent branches should write to distinct paths.

use crate::actions::ActionHandlersRegistry;
use crate::template::TemplateDelimiters;
use serde_json::{Map, Value};
use std::sync::{PoisonError, RwLock};

pub mod diff;
pub mod entities;
pub mod parameters;
pub mod paths;

pub use diff::{diff_values, ChangeKind, ValueChange};
pub use entities::{EntityLog, EntityRecord};
pub use parameters::{DelegatedParameters, IterationParameters, SharedParameters};
pub use paths::{deep_merge, ContextPath, TargetPaths, TargetSpec};

/// Replacement written in place of secret values
pub const MASK: &str = "{MASKED}";

#[derive(Debug)]
pub struct FlowContext {
    ctx: RwLock<Value>,
    secrets: RwLock<Value>,
    entities: RwLock<EntityLog>,
    dynamic_action_handlers: ActionHandlersRegistry,
    delimiters: TemplateDelimiters,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self::new(TemplateDelimiters::default())
    }
}

impl FlowContext {
    pub fn new(delimiters: TemplateDelimiters) -> Self {
        Self {
            ctx: RwLock::new(Value::Object(Map::new())),
            secrets: RwLock::new(Value::Object(Map::new())),
            entities: RwLock::new(EntityLog::default()),
            dynamic_action_handlers: ActionHandlersRegistry::new(),
            delimiters,
        }
    }

    pub fn with_ctx(self, ctx: Value) -> Self {
        *self.ctx.write().unwrap_or_else(PoisonError::into_inner) = ctx;
        self
    }

    pub fn with_secrets(self, secrets: Value) -> Self {
        *self.secrets.write().unwrap_or_else(PoisonError::into_inner) = secrets;
        self
    }

    /// Copy of the current `ctx` tree
    pub fn ctx(&self) -> Value {
        self.ctx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the current `secrets` tree
    pub fn secrets(&self) -> Value {
        self.secrets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Copy of the entity audit trail
    pub fn entities(&self) -> EntityLog {
        self.entities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate `ctx` under its write lock
    pub fn update_ctx<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.ctx.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Mutate `secrets` under its write lock
    pub fn update_secrets<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let mut guard = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn update_entities(&self, f: impl FnOnce(&mut EntityLog)) {
        let mut guard = self.entities.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn register_entity(&self, record: EntityRecord) {
        self.update_entities(|log| log.register(record));
    }

    pub fn unregister_entity(&self, record: EntityRecord) {
        self.update_entities(|log| log.unregister(record));
    }

    pub fn entity_created(&self, record: EntityRecord) {
        self.update_entities(|log| log.created(record));
    }

    pub fn entity_updated(&self, record: EntityRecord) {
        self.update_entities(|log| log.updated(record));
    }

    pub fn entity_deleted(&self, record: EntityRecord) {
        self.update_entities(|log| log.deleted(record));
    }

    /// Handlers registered at runtime for this run only
    pub fn dynamic_action_handlers(&self) -> &ActionHandlersRegistry {
        &self.dynamic_action_handlers
    }

    pub fn delimiters(&self) -> TemplateDelimiters {
        self.delimiters
    }

    /// Replace every occurrence of a secret string value in `text`
    pub fn mask_secrets(&self, text: &str) -> String {
        let mut secrets = Vec::new();
        collect_strings(&self.secrets(), &mut secrets);
        // Longest first so a secret containing another is masked whole
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut masked = text.to_string();
        for secret in secrets.iter().filter(|s| !s.is_empty()) {
            masked = masked.replace(secret.as_str(), MASK);
        }
        masked
    }

    /// Mask secret values inside every string of `value`
    pub fn mask_value(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.mask_secrets(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.mask_value(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.mask_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| collect_strings(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_strings(v, out)),
        _ => {}
    }
}
