//! Template resolution for step options
//!
//! Option values may embed expressions wrapped in delimiter tags:
//! `<% expr %>` for the global scope and `<$ expr $>` for the local scope
//! (both characters are configurable). The global scope is rendered once
//! over the whole pipeline before the first dispatch; the local scope is
//! rendered per step, right before the step's handler validates its options.
//!
//! Expressions are tera expressions evaluated against the variables built by
//! [`build_scope`]. Tera's filters and functions are the utility surface.

use crate::context::{DelegatedParameters, FlowContext};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

pub mod resolver;

pub use resolver::TemplateResolver;

/// Marker characters for the two template scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateDelimiters {
    pub global: char,
    pub local: char,
}

impl Default for TemplateDelimiters {
    fn default() -> Self {
        Self {
            global: '%',
            local: '$',
        }
    }
}

impl TemplateDelimiters {
    /// Both scopes must use distinct punctuation characters
    pub fn validate(&self) -> Result<(), String> {
        for ch in [self.global, self.local] {
            if ch.is_alphanumeric() || ch.is_whitespace() || ch == '<' || ch == '>' {
                return Err(format!("'{ch}' cannot be used as a template delimiter"));
            }
        }
        if self.global == self.local {
            return Err(format!(
                "global and local delimiters must differ (both are '{}')",
                self.global
            ));
        }
        Ok(())
    }
}

/// Build the variables visible to template expressions
pub fn build_scope(
    context: &FlowContext,
    parameters: &DelegatedParameters,
    wd: &Path,
) -> tera::Context {
    let mut scope = tera::Context::new();
    scope.insert("ctx", &context.ctx());
    scope.insert("secrets", &context.secrets());
    scope.insert("entities", &context.entities());
    scope.insert(
        "parameters",
        &parameters
            .parameters
            .clone()
            .unwrap_or_else(|| Value::Object(Map::new())),
    );
    scope.insert("iteration", &parameters.iteration);
    scope.insert("cwd", &wd.display().to_string());
    scope.insert("env", &std::env::vars().collect::<BTreeMap<_, _>>());
    scope
}

/// String form of a value as it appears when spliced into text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}
