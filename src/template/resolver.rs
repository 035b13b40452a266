//! Delimiter-scoped template resolver
//!
//! Walks a JSON value tree and replaces every `<D expr D>` tag whose
//! delimiter `D` belongs to this resolver. Tags of the other scope are left
//! untouched so they can be rendered later, with the variables of the step
//! that eventually runs them.

use super::value_to_string;
use crate::error::{FlowError, FlowResult};
use serde_json::{Map, Value};
use tera::Tera;

/// Variable name used to carry an expression result out of tera
const RESULT_VAR: &str = "__actionflow_value";

/// Parsed piece of a template string
#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expression(String),
}

/// Resolver bound to one delimiter scope
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    open: String,
    close: String,
}

impl TemplateResolver {
    /// Create a resolver for tags of the form `<D ... D>`
    pub fn new(delimiter: char) -> Self {
        Self {
            open: format!("<{delimiter}"),
            close: format!("{delimiter}>"),
        }
    }

    /// Whether the string contains an opening tag of this scope
    pub fn has_tags(&self, input: &str) -> bool {
        input.contains(&self.open)
    }

    /// Resolve every tag of this scope inside `value`
    pub fn resolve_value(&self, value: &Value, scope: &tera::Context) -> FlowResult<Value> {
        match value {
            Value::String(s) => self.resolve_string(s, scope),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_value(item, scope))
                .collect::<FlowResult<Vec<_>>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = Map::with_capacity(map.len());
                for (key, item) in map {
                    let key = if self.has_tags(key) {
                        value_to_string(&self.resolve_string(key, scope)?)
                    } else {
                        key.clone()
                    };
                    resolved.insert(key, self.resolve_value(item, scope)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve a single string.
    ///
    /// A string made of exactly one tag yields the expression's structured
    /// value; otherwise results are spliced into the surrounding text.
    pub fn resolve_string(&self, input: &str, scope: &tera::Context) -> FlowResult<Value> {
        if !self.has_tags(input) {
            return Ok(Value::String(input.to_string()));
        }

        let segments = self.parse(input)?;
        if let [Segment::Expression(expr)] = segments.as_slice() {
            return self.evaluate(expr, scope);
        }

        let mut output = String::with_capacity(input.len());
        for segment in &segments {
            match segment {
                Segment::Literal(text) => output.push_str(text),
                Segment::Expression(expr) => {
                    output.push_str(&value_to_string(&self.evaluate(expr, scope)?))
                }
            }
        }
        Ok(Value::String(output))
    }

    /// Evaluate a bare expression (no delimiters) to a value
    pub fn evaluate(&self, expr: &str, scope: &tera::Context) -> FlowResult<Value> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(FlowError::template("empty template expression"));
        }

        let source = format!("{{% set {RESULT_VAR} = {expr} %}}{{{{ {RESULT_VAR} | json_encode() }}}}");
        let rendered = Tera::one_off(&source, scope, false)
            .map_err(|e| FlowError::template(format!("`{expr}`: {}", tera_error_message(&e))))?;

        serde_json::from_str(&rendered).map_err(|e| {
            FlowError::template(format!("`{expr}` produced an unreadable value: {e}"))
        })
    }

    fn parse(&self, input: &str) -> FlowResult<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut rest = input;

        while let Some(start) = rest.find(&self.open) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + self.open.len()..];
            let end = after_open.find(&self.close).ok_or_else(|| {
                FlowError::template(format!(
                    "unterminated tag: missing \"{}\" in \"{input}\"",
                    self.close
                ))
            })?;
            segments.push(Segment::Expression(strip_output_markers(&after_open[..end])));
            rest = &after_open[end + self.close.len()..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(segments)
    }
}

/// Drop EJS-style output markers (`<%-`, `<%=`, `-%>`) hugging the tags
fn strip_output_markers(raw: &str) -> String {
    let mut expr = raw;
    if let Some(stripped) = expr.strip_prefix(&['-', '=', '_'][..]) {
        expr = stripped;
    }
    if let Some(stripped) = expr.strip_suffix(&['-', '_'][..]) {
        expr = stripped;
    }
    expr.trim().to_string()
}

/// Tera hides the useful detail in the source chain
fn tera_error_message(err: &tera::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope() -> tera::Context {
        let mut scope = tera::Context::new();
        scope.insert("ctx", &json!({"name": "world", "items": [1, 2, 3], "count": 2}));
        scope.insert("parameters", &json!({"flag": true}));
        scope
    }

    #[test]
    fn test_plain_strings_are_untouched() {
        let resolver = TemplateResolver::new('$');
        let value = resolver.resolve_string("no tags here", &scope()).unwrap();
        assert_eq!(value, json!("no tags here"));
    }

    #[test]
    fn test_interpolation_inside_text() {
        let resolver = TemplateResolver::new('$');
        let value = resolver
            .resolve_string("hello <$- ctx.name $>!", &scope())
            .unwrap();
        assert_eq!(value, json!("hello world!"));
    }

    #[test]
    fn test_single_tag_keeps_structure() {
        let resolver = TemplateResolver::new('$');
        assert_eq!(
            resolver.resolve_string("<$- ctx.items $>", &scope()).unwrap(),
            json!([1, 2, 3])
        );
        assert_eq!(
            resolver.resolve_string("<$= ctx.count + 1 $>", &scope()).unwrap(),
            json!(3)
        );
        assert_eq!(
            resolver.resolve_string("<$ parameters.flag $>", &scope()).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn test_other_scope_is_deferred() {
        let global = TemplateResolver::new('%');
        let value = json!({
            "outer": "<% ctx.name %>",
            "inner": "<$ iteration.index $>"
        });
        let resolved = global.resolve_value(&value, &scope()).unwrap();
        assert_eq!(resolved["outer"], json!("world"));
        assert_eq!(resolved["inner"], json!("<$ iteration.index $>"));
    }

    #[test]
    fn test_nested_values_and_keys() {
        let resolver = TemplateResolver::new('$');
        let value = json!({
            "<$- ctx.name $>": ["a <$- ctx.count $>", {"deep": "<$- ctx.name | upper $>"}],
            "number": 5
        });
        let resolved = resolver.resolve_value(&value, &scope()).unwrap();
        assert_eq!(
            resolved,
            json!({"world": ["a 2", {"deep": "WORLD"}], "number": 5})
        );
    }

    #[test]
    fn test_unterminated_tag_is_an_error() {
        let resolver = TemplateResolver::new('$');
        let err = resolver.resolve_string("<$ ctx.name", &scope()).unwrap_err();
        assert!(matches!(err, FlowError::Template(_)));
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn test_undefined_variable_is_an_error() {
        let resolver = TemplateResolver::new('$');
        let err = resolver
            .resolve_string("<$ ctx.missing $>", &scope())
            .unwrap_err();
        assert!(matches!(err, FlowError::Template(_)));
    }

    #[test]
    fn test_default_filter_covers_missing_values() {
        let resolver = TemplateResolver::new('$');
        let value = resolver
            .resolve_string("<$ ctx.missing | default(value='fallback') $>", &scope())
            .unwrap();
        assert_eq!(value, json!("fallback"));
    }

    #[test]
    fn test_strip_output_markers() {
        assert_eq!(strip_output_markers("- ctx.a "), "ctx.a");
        assert_eq!(strip_output_markers("= ctx.a -"), "ctx.a");
        assert_eq!(strip_output_markers(" -1 "), "-1");
    }
}
