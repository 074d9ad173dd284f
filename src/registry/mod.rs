// Copyright (c) 2025 - Cowboy AI, Inc.
//! Registry Adapter - the object-collection seam
//!
//! The engine never talks HTTP. It sees the registry as a set of
//! collections keyed by [`EntityKind`] supporting three operations:
//!
//! ```text
//! list(kind, filter)        -> [Entity]      (get-by-filter)
//! create(kind, fields)      -> Entity
//! save(kind, id, changes)   -> Entity        (persist in-place changes)
//! ```
//!
//! [`Registry::get`] is derived from `list` and is where duplicate natural
//! keys surface as [`RegistryError::Ambiguous`] instead of being silently
//! picked.
//!
//! References between collections are opaque [`EntityId`]s.

pub mod memory;
#[cfg(feature = "http")]
pub mod netbox;

pub use memory::InMemoryRegistry;
#[cfg(feature = "http")]
pub use netbox::{NetBoxConfig, NetBoxRegistry};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::domain::{EntityId, EntityKind};

/// Field map sent to and received from the registry
pub type Fields = serde_json::Map<String, Value>;

/// Errors raised by a registry implementation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry unreachable, timed out, or token rejected
    #[error("Registry unavailable: {0}")]
    Unreachable(String),

    /// A lookup expected at most one entity
    #[error("Lookup matched {count} entities")]
    Ambiguous { count: usize },

    /// Create or update refused (validation, conflict)
    #[error("Registry rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Response could not be interpreted
    #[error("Malformed registry response: {0}")]
    Malformed(String),
}

/// An entity as stored in the registry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub id: EntityId,
    pub fields: Fields,
}

impl Entity {
    /// Build from a registry JSON object carrying an integer `id`
    pub fn from_json(value: Value) -> Result<Self, RegistryError> {
        let Value::Object(fields) = value else {
            return Err(RegistryError::Malformed("expected a JSON object".to_string()));
        };

        let id = fields
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| RegistryError::Malformed("object without integer 'id'".to_string()))?;

        Ok(Self {
            id: EntityId(id),
            fields,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Text value of a field, if it is a plain string
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }
}

/// Equality filter over registry fields, in query-string order
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter(Vec<(String, String)>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: &str, value: impl ToString) -> Self {
        self.0.push((field.to_string(), value.to_string()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        f.write_str(&parts.join("&"))
    }
}

/// Reduce a registry field to the scalar it denotes
///
/// The registry nests related objects (`{"id": 3, "name": ...}`) and choice
/// fields (`{"value": "active", "label": "Active"}`) in its responses while
/// accepting the bare id or value on writes. Comparisons go through this.
pub fn scalar_of(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("value") {
                inner.clone()
            } else if let Some(id) = map.get("id") {
                id.clone()
            } else {
                value.clone()
            }
        }
        other => other.clone(),
    }
}

/// Query-string form of a field value, as used by filters
pub fn filter_text(value: &Value) -> Option<String> {
    match scalar_of(value) {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Object-collection interface the engine reconciles against
///
/// Implementations must not enforce natural-key uniqueness themselves; the
/// resolver owns that contract.
#[async_trait]
pub trait Registry: Send + Sync {
    /// All entities of `kind` matching every pair of `filter`
    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Entity>, RegistryError>;

    /// Zero-or-one lookup; more than one match is an error
    async fn get(&self, kind: EntityKind, filter: &Filter) -> Result<Option<Entity>, RegistryError> {
        let mut matches = self.list(kind, filter).await?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(matches.pop()),
            count => Err(RegistryError::Ambiguous { count }),
        }
    }

    /// Create an entity from `fields`
    async fn create(&self, kind: EntityKind, fields: &Fields) -> Result<Entity, RegistryError>;

    /// Persist `changes` onto the existing entity `id`
    async fn save(
        &self,
        kind: EntityKind,
        id: EntityId,
        changes: &Fields,
    ) -> Result<Entity, RegistryError>;

    /// Verify the registry is reachable and the credentials are accepted
    async fn health_check(&self) -> Result<(), RegistryError>;

    /// Name used in logs
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_of_nested_values() {
        assert_eq!(scalar_of(&json!({"value": "active", "label": "Active"})), json!("active"));
        assert_eq!(scalar_of(&json!({"id": 4, "name": "homelab"})), json!(4));
        assert_eq!(scalar_of(&json!(1500)), json!(1500));
        assert_eq!(filter_text(&json!({"id": 4})), Some("4".to_string()));
        assert_eq!(filter_text(&Value::Null), None);
    }

    #[test]
    fn test_entity_from_json() {
        let entity = Entity::from_json(json!({"id": 9, "name": "sw1"})).unwrap();
        assert_eq!(entity.id, EntityId(9));
        assert_eq!(entity.text("name"), Some("sw1"));

        assert!(Entity::from_json(json!({"name": "sw1"})).is_err());
        assert!(Entity::from_json(json!([1, 2])).is_err());
    }

    #[test]
    fn test_filter_display() {
        let filter = Filter::new().with("device_id", 3).with("name", "eth0");
        assert_eq!(filter.to_string(), "device_id=3&name=eth0");
    }
}
