//! Path-level differences between two context states

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Compare two values; objects are compared key by key, anything else as a whole
pub fn diff_values(before: &Value, after: &Value) -> Vec<ValueChange> {
    let mut changes = Vec::new();
    collect("$", before, after, &mut changes);
    changes
}

fn collect(path: &str, before: &Value, after: &Value, changes: &mut Vec<ValueChange>) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = format!("{path}.{key}");
                match new.get(key) {
                    Some(new_value) => collect(&child, old_value, new_value, changes),
                    None => changes.push(ValueChange {
                        path: child,
                        kind: ChangeKind::Removed,
                    }),
                }
            }
            for key in new.keys().filter(|key| !old.contains_key(*key)) {
                changes.push(ValueChange {
                    path: format!("{path}.{key}"),
                    kind: ChangeKind::Added,
                });
            }
        }
        (old, new) if old != new => changes.push(ValueChange {
            path: path.to_string(),
            kind: ChangeKind::Changed,
        }),
        _ => {}
    }
}
