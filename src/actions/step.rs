//! Step document parsing
//!
//! A step is a mapping with exactly one key naming a handler (its id or an
//! alias) plus any number of metadata keys starting with [`METADATA_PREFIX`].

use crate::error::{FlowError, FlowResult};
use serde_json::{Map, Value};

/// Marker that distinguishes metadata keys from the handler key
pub const METADATA_PREFIX: char = '$';

#[derive(Debug, Clone, PartialEq)]
pub struct StepDocument {
    pub id_or_alias: String,
    pub options: Value,
    pub metadata: Map<String, Value>,
}

impl StepDocument {
    pub fn parse(value: &Value) -> FlowResult<Self> {
        let map = value.as_object().ok_or_else(|| {
            FlowError::InvalidStep(format!("expected a mapping, got {}", kind_of(value)))
        })?;

        let mut metadata = Map::new();
        let mut handler_keys = Vec::new();
        for (key, item) in map {
            if key.starts_with(METADATA_PREFIX) {
                metadata.insert(key.clone(), item.clone());
            } else {
                handler_keys.push((key, item));
            }
        }

        match handler_keys.as_slice() {
            [(key, options)] => Ok(Self {
                id_or_alias: (*key).clone(),
                options: (*options).clone(),
                metadata,
            }),
            [] => Err(FlowError::InvalidStep(
                "step has no handler key".to_string(),
            )),
            many => Err(FlowError::InvalidStep(format!(
                "step must have exactly one handler key, found {}: {}",
                many.len(),
                many.iter()
                    .map(|(k, _)| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// `$title` metadata, used in log lines
    pub fn title(&self) -> Option<&str> {
        self.metadata.get("$title").and_then(Value::as_str)
    }

    /// Label for log lines: the title when present, else the step key
    pub fn label(&self) -> &str {
        self.title().unwrap_or(&self.id_or_alias)
    }

    /// `$parameters` metadata, merged over the branch parameters for this step
    pub fn parameters_override(&self) -> Option<&Value> {
        self.metadata.get("$parameters")
    }
}

/// Parse a non-empty list of steps
pub fn parse_step_list(value: &Value) -> FlowResult<Vec<StepDocument>> {
    let items = value.as_array().ok_or_else(|| {
        FlowError::validation(format!("expected a list of steps, got {}", kind_of(value)))
    })?;
    if items.is_empty() {
        return Err(FlowError::validation("list of steps must not be empty"));
    }
    items.iter().map(StepDocument::parse).collect()
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_key_with_metadata() {
        let step = StepDocument::parse(&json!({
            "$title": "Say hello",
            "log": "hello",
            "$parameters": {"a": 1}
        }))
        .unwrap();

        assert_eq!(step.id_or_alias, "log");
        assert_eq!(step.options, json!("hello"));
        assert_eq!(step.title(), Some("Say hello"));
        assert_eq!(step.label(), "Say hello");
        assert_eq!(step.parameters_override(), Some(&json!({"a": 1})));
        assert_eq!(step.metadata.len(), 2);
    }

    #[test]
    fn test_rejects_zero_or_many_keys() {
        assert!(matches!(
            StepDocument::parse(&json!({})),
            Err(FlowError::InvalidStep(_))
        ));
        assert!(matches!(
            StepDocument::parse(&json!({"$title": "only metadata"})),
            Err(FlowError::InvalidStep(_))
        ));
        let err = StepDocument::parse(&json!({"a": 1, "b": 2})).unwrap_err();
        assert!(err.to_string().contains("found 2"));
        assert!(matches!(
            StepDocument::parse(&json!(["log"])),
            Err(FlowError::InvalidStep(_))
        ));
    }

    #[test]
    fn test_step_list() {
        let steps = parse_step_list(&json!([{"void": null}, {"log": "x"}])).unwrap();
        assert_eq!(steps.len(), 2);
        assert!(parse_step_list(&json!([])).is_err());
        assert!(parse_step_list(&json!({"void": null})).is_err());
        assert!(parse_step_list(&json!([{"a": 1, "b": 2}])).is_err());
    }
}
