//! Per-branch delegated parameters
//!
//! Unlike [`FlowContext`](super::FlowContext), parameters are not shared by
//! the whole run: flow-control handlers fork them for every branch they
//! create, so concurrent iterations never observe each other's writes unless
//! a handler explicitly shares the same handle.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

/// Loop state handed to the body of `each`, `repeat` and `while`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationParameters {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl IterationParameters {
    pub fn index(index: usize) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DelegatedParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration: Option<IterationParameters>,
}

/// Handle to a parameters object; clones of the handle share the object
///
/// A handle may also carry its own loop state. It overlays the shared
/// object's `iteration` in [`snapshot`](Self::snapshot) without being
/// written into it, so concurrent iterations over one object each keep
/// their own index.
#[derive(Debug, Clone, Default)]
pub struct SharedParameters {
    inner: Arc<RwLock<DelegatedParameters>>,
    iteration: Option<IterationParameters>,
}

impl SharedParameters {
    pub fn new(parameters: DelegatedParameters) -> Self {
        Self {
            inner: Arc::new(RwLock::new(parameters)),
            iteration: None,
        }
    }

    /// Deep copy into a new, independent handle
    pub fn fork(&self) -> Self {
        Self::new(self.snapshot())
    }

    /// Another handle to the same object
    pub fn share(&self) -> Self {
        self.clone()
    }

    /// Another handle to the same object, with its own loop state
    pub fn share_for_iteration(&self, iteration: IterationParameters) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            iteration: Some(iteration),
        }
    }

    /// Whether both handles point at the same object
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current state as an owned value
    pub fn snapshot(&self) -> DelegatedParameters {
        let mut parameters = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(iteration) = &self.iteration {
            parameters.iteration = Some(iteration.clone());
        }
        parameters
    }

    /// Run `f` against the shared object while holding the write lock
    pub fn update<R>(&self, f: impl FnOnce(&mut DelegatedParameters) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set_iteration(&self, iteration: IterationParameters) {
        self.update(|p| p.iteration = Some(iteration));
    }

    pub fn set_parameters(&self, parameters: Value) {
        self.update(|p| p.parameters = Some(parameters));
    }

    /// Fork and stamp the copy with loop state
    pub fn fork_for_iteration(&self, iteration: IterationParameters) -> Self {
        let forked = self.fork();
        forked.set_iteration(iteration);
        forked
    }
}

impl From<DelegatedParameters> for SharedParameters {
    fn from(parameters: DelegatedParameters) -> Self {
        Self::new(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> SharedParameters {
        SharedParameters::new(DelegatedParameters {
            wd: Some(PathBuf::from("/work")),
            parameters: Some(json!({"list": [1, 2], "nested": {"a": 1}})),
            iteration: None,
        })
    }

    #[test]
    fn test_fork_is_equal_but_independent() {
        let parent = sample();
        let child = parent.fork();

        assert_eq!(parent.snapshot(), child.snapshot());
        assert!(!parent.ptr_eq(&child));

        child.update(|p| {
            p.parameters = Some(json!({"list": [9], "nested": {"a": 2}}));
        });
        assert_eq!(
            parent.snapshot().parameters,
            Some(json!({"list": [1, 2], "nested": {"a": 1}}))
        );
    }

    #[test]
    fn test_share_sees_mutations() {
        let parent = sample();
        let shared = parent.share();
        assert!(parent.ptr_eq(&shared));

        shared.set_iteration(IterationParameters::index(3));
        assert_eq!(parent.snapshot().iteration, Some(IterationParameters::index(3)));
    }

    #[test]
    fn test_fork_for_iteration_leaves_parent_untouched() {
        let parent = sample();
        let child = parent.fork_for_iteration(IterationParameters {
            index: 1,
            value: Some(json!("b")),
            key: Some("second".to_string()),
        });

        assert_eq!(parent.snapshot().iteration, None);
        let iteration = child.snapshot().iteration.unwrap();
        assert_eq!(iteration.index, 1);
        assert_eq!(iteration.key.as_deref(), Some("second"));
    }

    #[test]
    fn test_shared_iterations_keep_their_own_index() {
        let parent = sample();
        let first = parent.share_for_iteration(IterationParameters::index(0));
        let second = parent.share_for_iteration(IterationParameters::index(1));
        assert!(first.ptr_eq(&parent) && second.ptr_eq(&parent));

        first.set_parameters(json!({"written": "by first"}));

        assert_eq!(first.snapshot().iteration, Some(IterationParameters::index(0)));
        assert_eq!(second.snapshot().iteration, Some(IterationParameters::index(1)));
        assert_eq!(parent.snapshot().iteration, None);
        assert_eq!(second.snapshot().parameters, Some(json!({"written": "by first"})));
        assert_eq!(parent.snapshot().parameters, Some(json!({"written": "by first"})));
    }

    #[test]
    fn test_fork_keeps_the_iteration_overlay() {
        let shared = sample().share_for_iteration(IterationParameters::index(4));
        let forked = shared.fork();

        assert!(!forked.ptr_eq(&shared));
        assert_eq!(forked.snapshot().iteration, Some(IterationParameters::index(4)));
    }
}
