//! Registry mapping step keys (handler ids and aliases) to handlers

use super::step::METADATA_PREFIX;
use super::ActionHandler;
use crate::error::{FlowError, FlowResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

#[derive(Default)]
struct RegistryState {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
    /// alias -> id
    aliases: HashMap<String, String>,
}

/// Registry that manages the available action handlers
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct ActionHandlersRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl ActionHandlersRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with every built-in handler
    pub fn with_defaults() -> FlowResult<Self> {
        let registry = Self::new();
        for handler in super::handlers::builtin_handlers() {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    /// Registers a handler under its id and aliases.
    ///
    /// Re-registering an id replaces the previous handler and its aliases.
    pub fn register(&self, handler: Arc<dyn ActionHandler>) -> FlowResult<()> {
        let metadata = handler.metadata();
        if let Some(key) = metadata.keys().find(|k| k.starts_with(METADATA_PREFIX)) {
            return Err(FlowError::Registry(format!(
                "handler key \"{key}\" must not start with \"{METADATA_PREFIX}\""
            )));
        }
        if metadata.id.is_empty() {
            return Err(FlowError::Registry("handler id must not be empty".into()));
        }

        let id = metadata.id.clone();
        let mut state = self.write();
        if state.handlers.contains_key(&id) {
            debug!("Replacing action handler {}", id);
            state.aliases.retain(|_, target| *target != id);
        }
        for alias in &metadata.aliases {
            if let Some(previous) = state.aliases.insert(alias.clone(), id.clone()) {
                if previous != id {
                    warn!("Alias {} moved from {} to {}", alias, previous, id);
                }
            }
        }
        debug!("Registered action handler {}", id);
        state.handlers.insert(id, handler);
        Ok(())
    }

    /// Removes a handler and every alias pointing to it
    pub fn unregister(&self, id: &str) -> Option<Arc<dyn ActionHandler>> {
        let mut state = self.write();
        let removed = state.handlers.remove(id);
        if removed.is_some() {
            state.aliases.retain(|_, target| target != id);
            debug!("Unregistered action handler {}", id);
        }
        removed
    }

    /// Exact id match first, then alias lookup
    pub fn find(&self, id_or_alias: &str) -> Option<Arc<dyn ActionHandler>> {
        let state = self.read();
        state.handlers.get(id_or_alias).cloned().or_else(|| {
            state
                .aliases
                .get(id_or_alias)
                .and_then(|id| state.handlers.get(id))
                .cloned()
        })
    }

    /// Drops every handler
    pub fn cleanup(&self) {
        let mut state = self.write();
        state.handlers.clear();
        state.aliases.clear();
    }

    /// Registered handler ids, sorted
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.read().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().handlers.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ActionHandlersRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionHandlersRegistry")
            .field("handlers", &self.list())
            .finish()
    }
}
