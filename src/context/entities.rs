//! Audit trail of domain objects touched by a flow

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl EntityRecord {
    pub fn new(entity_type: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Ordered lists of entity records.
///
/// `created` and `updated` entities are also `registered`; `deleted`
/// entities are also `unregistered`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityLog {
    pub registered: Vec<EntityRecord>,
    pub unregistered: Vec<EntityRecord>,
    pub created: Vec<EntityRecord>,
    pub updated: Vec<EntityRecord>,
    pub deleted: Vec<EntityRecord>,
}

impl EntityLog {
    pub fn register(&mut self, record: EntityRecord) {
        self.registered.push(record);
    }

    pub fn unregister(&mut self, record: EntityRecord) {
        self.unregistered.push(record);
    }

    pub fn created(&mut self, record: EntityRecord) {
        self.registered.push(record.clone());
        self.created.push(record);
    }

    pub fn updated(&mut self, record: EntityRecord) {
        self.registered.push(record.clone());
        self.updated.push(record);
    }

    pub fn deleted(&mut self, record: EntityRecord) {
        self.unregistered.push(record.clone());
        self.deleted.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty() && self.unregistered.is_empty()
    }
}
