//! Path-addressing mini-language for `assignTo` / `pushTo`
//!
//! A path is `$` optionally followed by `.segment` parts, e.g. `$.build.tags`.
//! Numeric segments index into arrays. `$` alone addresses the root.

use super::{FlowContext, SharedParameters};
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextPath {
    raw: String,
    segments: Vec<String>,
}

impl ContextPath {
    pub fn parse(raw: &str) -> FlowResult<Self> {
        let rest = raw
            .strip_prefix('$')
            .ok_or_else(|| FlowError::path(raw, "path must start with \"$\""))?;

        let segments = if rest.is_empty() {
            Vec::new()
        } else {
            let rest = rest
                .strip_prefix('.')
                .ok_or_else(|| FlowError::path(raw, "expected \".\" after \"$\""))?;
            let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
            if segments.iter().any(|s| s.is_empty()) {
                return Err(FlowError::path(raw, "empty path segment"));
            }
            segments
        };

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Read the value at this path
    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut current = root;
        for segment in &self.segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Write `value` at this path.
    ///
    /// Objects are deep-merged into existing objects unless `override_` is
    /// set; anything else replaces the previous value.
    pub fn assign(&self, root: &mut Value, value: Value, override_: bool) -> FlowResult<()> {
        if self.is_root() {
            if !value.is_object() {
                return Err(FlowError::path(
                    &self.raw,
                    "only objects can be assigned to the root",
                ));
            }
            if override_ || !root.is_object() {
                *root = value;
            } else {
                deep_merge(root, value);
            }
            return Ok(());
        }

        let slot = self.slot_mut(root)?;
        if !override_ && slot.is_object() && value.is_object() {
            deep_merge(slot, value);
        } else {
            *slot = value;
        }
        Ok(())
    }

    /// Append `value` to the array at this path, creating it when missing
    pub fn push(
        &self,
        root: &mut Value,
        value: Value,
        children: bool,
        override_: bool,
    ) -> FlowResult<()> {
        let slot = if self.is_root() {
            root
        } else {
            self.slot_mut(root)?
        };

        if override_ || slot.is_null() {
            *slot = Value::Array(Vec::new());
        }

        let items = slot.as_array_mut().ok_or_else(|| {
            FlowError::path(&self.raw, "push target exists and is not an array")
        })?;

        match value {
            Value::Array(values) if children => items.extend(values),
            other => items.push(other),
        }
        Ok(())
    }

    /// Walk to the parent container, creating objects on the way
    fn slot_mut<'a>(&self, root: &'a mut Value) -> FlowResult<&'a mut Value> {
        let mut current = root;
        for segment in &self.segments {
            if current.is_null() {
                *current = Value::Object(Map::new());
            }
            current = match current {
                Value::Object(map) => map.entry(segment.clone()).or_insert(Value::Null),
                Value::Array(items) => {
                    let index = segment.parse::<usize>().map_err(|_| {
                        FlowError::path(&self.raw, format!("\"{segment}\" is not an array index"))
                    })?;
                    items.get_mut(index).ok_or_else(|| {
                        FlowError::path(&self.raw, format!("array index {index} out of bounds"))
                    })?
                }
                _ => {
                    return Err(FlowError::path(
                        &self.raw,
                        format!("cannot descend into a scalar at \"{segment}\""),
                    ))
                }
            };
        }
        Ok(current)
    }
}

impl fmt::Display for ContextPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Recursively merge `overlay` into `base`; non-object values replace
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Where a value should be written: any combination of ctx, secrets and parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctx: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<String>,
    #[serde(default, rename = "override")]
    pub override_: bool,
    /// Only meaningful for push: spread array values into the target
    #[serde(default)]
    pub children: bool,
}

/// `assignTo` / `pushTo` option: a ctx path shorthand or explicit targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    Path(String),
    Targets(TargetPaths),
}

impl TargetSpec {
    pub fn paths(&self) -> TargetPaths {
        match self {
            Self::Path(path) => TargetPaths {
                ctx: Some(path.clone()),
                ..Default::default()
            },
            Self::Targets(targets) => targets.clone(),
        }
    }

    /// Check that at least one target is given and every path parses
    pub fn validate(&self) -> FlowResult<()> {
        let paths = self.paths();
        let all = [&paths.ctx, &paths.secrets, &paths.parameters];
        if all.iter().all(|p| p.is_none()) {
            return Err(FlowError::validation(
                "target requires at least one of ctx, secrets or parameters",
            ));
        }
        for path in all.into_iter().flatten() {
            ContextPath::parse(path)?;
        }
        Ok(())
    }

    /// Assign `value` to every configured target
    pub fn assign(
        &self,
        value: &Value,
        context: &FlowContext,
        parameters: &SharedParameters,
    ) -> FlowResult<()> {
        self.apply(context, parameters, |path, root, override_, _| {
            path.assign(root, value.clone(), override_)
        })
    }

    /// Push `value` to every configured target
    pub fn push(
        &self,
        value: &Value,
        context: &FlowContext,
        parameters: &SharedParameters,
    ) -> FlowResult<()> {
        self.apply(context, parameters, |path, root, override_, children| {
            path.push(root, value.clone(), children, override_)
        })
    }

    fn apply<F>(&self, context: &FlowContext, parameters: &SharedParameters, write: F) -> FlowResult<()>
    where
        F: Fn(&ContextPath, &mut Value, bool, bool) -> FlowResult<()>,
    {
        let targets = self.paths();
        let (override_, children) = (targets.override_, targets.children);

        if let Some(raw) = &targets.ctx {
            let path = ContextPath::parse(raw)?;
            context.update_ctx(|ctx| write(&path, ctx, override_, children))?;
        }
        if let Some(raw) = &targets.secrets {
            let path = ContextPath::parse(raw)?;
            context.update_secrets(|secrets| write(&path, secrets, override_, children))?;
        }
        if let Some(raw) = &targets.parameters {
            let path = ContextPath::parse(raw)?;
            parameters.update(|p| {
                let root = p
                    .parameters
                    .get_or_insert_with(|| Value::Object(Map::new()));
                write(&path, root, override_, children)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DelegatedParameters;
    use serde_json::json;

    #[test]
    fn test_parse_paths() {
        assert!(ContextPath::parse("$").unwrap().is_root());
        assert_eq!(
            ContextPath::parse("$.a.b.0").unwrap().segments(),
            &["a".to_string(), "b".to_string(), "0".to_string()]
        );
        assert!(ContextPath::parse("a.b").is_err());
        assert!(ContextPath::parse("$a").is_err());
        assert!(ContextPath::parse("$.a..b").is_err());
    }

    #[test]
    fn test_assign_creates_intermediate_objects() {
        let mut root = json!({});
        ContextPath::parse("$.a.b")
            .unwrap()
            .assign(&mut root, json!(1), false)
            .unwrap();
        assert_eq!(root, json!({"a": {"b": 1}}));
    }

    #[test]
    fn test_assign_merges_objects_unless_override() {
        let mut root = json!({"a": {"x": 1}});
        let path = ContextPath::parse("$.a").unwrap();
        path.assign(&mut root, json!({"y": 2}), false).unwrap();
        assert_eq!(root, json!({"a": {"x": 1, "y": 2}}));

        path.assign(&mut root, json!({"z": 3}), true).unwrap();
        assert_eq!(root, json!({"a": {"z": 3}}));
    }

    #[test]
    fn test_root_assignment() {
        let mut root = json!({"keep": true});
        let path = ContextPath::parse("$").unwrap();
        path.assign(&mut root, json!({"added": 1}), false).unwrap();
        assert_eq!(root, json!({"keep": true, "added": 1}));

        path.assign(&mut root, json!({"only": 1}), true).unwrap();
        assert_eq!(root, json!({"only": 1}));

        assert!(path.assign(&mut root, json!(5), false).is_err());
    }

    #[test]
    fn test_assign_into_array_index() {
        let mut root = json!({"list": [{"a": 1}, {"a": 2}]});
        ContextPath::parse("$.list.1.a")
            .unwrap()
            .assign(&mut root, json!(5), false)
            .unwrap();
        assert_eq!(root, json!({"list": [{"a": 1}, {"a": 5}]}));

        assert!(ContextPath::parse("$.list.7.a")
            .unwrap()
            .assign(&mut root, json!(5), false)
            .is_err());
    }

    #[test]
    fn test_cannot_descend_into_scalar() {
        let mut root = json!({"a": 1});
        let err = ContextPath::parse("$.a.b")
            .unwrap()
            .assign(&mut root, json!(2), false)
            .unwrap_err();
        assert!(err.to_string().contains("scalar"));
    }

    #[test]
    fn test_push() {
        let mut root = json!({});
        let path = ContextPath::parse("$.codes").unwrap();
        path.push(&mut root, json!("E1"), false, false).unwrap();
        path.push(&mut root, json!(["E2", "E3"]), true, false).unwrap();
        path.push(&mut root, json!(["E4"]), false, false).unwrap();
        assert_eq!(root, json!({"codes": ["E1", "E2", "E3", ["E4"]]}));

        let mut scalar = json!({"codes": 1});
        assert!(path.push(&mut scalar, json!("x"), false, false).is_err());
        path.push(&mut scalar, json!("x"), false, true).unwrap();
        assert_eq!(scalar, json!({"codes": ["x"]}));
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let mut base = json!({"a": {"list": [1, 2], "keep": 1}});
        deep_merge(&mut base, json!({"a": {"list": [3]}}));
        assert_eq!(base, json!({"a": {"list": [3], "keep": 1}}));
    }

    #[test]
    fn test_target_spec_shorthand_and_validation() {
        let target: TargetSpec = serde_json::from_value(json!("$.code")).unwrap();
        assert_eq!(target.paths().ctx.as_deref(), Some("$.code"));
        assert!(target.validate().is_ok());

        let empty: TargetSpec = serde_json::from_value(json!({"override": true})).unwrap();
        assert!(empty.validate().is_err());

        let bad: TargetSpec = serde_json::from_value(json!({"ctx": "code"})).unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_target_spec_writes_every_target() {
        let context = FlowContext::default();
        let parameters = SharedParameters::new(DelegatedParameters::default());
        let target: TargetSpec = serde_json::from_value(json!({
            "ctx": "$.result",
            "secrets": "$.result",
            "parameters": "$.result"
        }))
        .unwrap();

        target.assign(&json!("done"), &context, &parameters).unwrap();

        assert_eq!(context.ctx()["result"], json!("done"));
        assert_eq!(context.secrets()["result"], json!("done"));
        assert_eq!(
            parameters.snapshot().parameters,
            Some(json!({"result": "done"}))
        );
    }
}
