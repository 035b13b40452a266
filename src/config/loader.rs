//! Flow document loading from YAML

use crate::error::{FlowError, FlowResult};
use crate::flow::FlowDocument;
use serde_json::{Map, Number, Value};
use std::path::Path;
use tokio::fs;
use tracing::debug;

pub async fn load_flow_document(path: &Path) -> FlowResult<FlowDocument> {
    debug!("Loading flow document from {}", path.display());
    let content = fs::read_to_string(path).await?;
    parse_flow_document(&content)
}

pub fn parse_flow_document(content: &str) -> FlowResult<FlowDocument> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;
    FlowDocument::from_value(yaml_to_json(yaml)?)
}

/// Convert YAML into JSON; scalar mapping keys become strings
pub fn yaml_to_json(value: serde_yaml::Value) -> FlowResult<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => yaml_number(&n)?,
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Array(
            items
                .into_iter()
                .map(yaml_to_json)
                .collect::<FlowResult<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (key, item) in mapping {
                map.insert(yaml_key(key)?, yaml_to_json(item)?);
            }
            Value::Object(map)
        }
        Yaml::Tagged(tagged) => yaml_to_json(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> FlowResult<Value> {
    if let Some(i) = n.as_i64() {
        Ok(Value::Number(i.into()))
    } else if let Some(u) = n.as_u64() {
        Ok(Value::Number(u.into()))
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| FlowError::InvalidDocument(format!("unsupported number {n}")))
    }
}

fn yaml_key(key: serde_yaml::Value) -> FlowResult<String> {
    use serde_yaml::Value as Yaml;

    match key {
        Yaml::String(s) => Ok(s),
        Yaml::Bool(b) => Ok(b.to_string()),
        Yaml::Number(n) => Ok(n.to_string()),
        Yaml::Null => Ok("null".to_string()),
        other => Err(FlowError::InvalidDocument(format!(
            "mapping keys must be scalars, got {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_parse_document() {
        let document = parse_flow_document(
            r#"
version: 1.0.0
description: demo
pipeline:
  $title: root
  --:
    - ctx:
        $.answer:
          inline: 42
    - switch:
        value: 1
        is:
          1:
            void:
"#,
        )
        .unwrap();

        assert_eq!(document.version, "1.0.0");
        let root = document.root_step().unwrap();
        assert_eq!(root.id_or_alias, "--");
        assert_eq!(root.title(), Some("root"));
        assert_eq!(root.options[1]["switch"]["is"]["1"], json!({"void": null}));
        assert_eq!(root.options[0]["ctx"]["$.answer"]["inline"], json!(42));
    }

    #[test]
    fn test_yaml_errors() {
        assert!(matches!(
            parse_flow_document("version: [unclosed"),
            Err(FlowError::Yaml(_))
        ));
        assert!(matches!(
            parse_flow_document("version: 1.0.0\npipeline: []\n"),
            Err(FlowError::InvalidDocument(_))
        ));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("flow.yml");
        std::fs::write(&path, "version: 1.0.0\npipeline:\n  void:\n").unwrap();

        let document = load_flow_document(&path).await.unwrap();
        assert_eq!(document.root_step().unwrap().id_or_alias, "void");
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = load_flow_document(Path::new("/nonexistent/flow.yml"))
            .await
            .unwrap_err();
        assert!(matches!(err, FlowError::Io(_)));
    }
}
