// Copyright (c) 2025 - Cowboy AI, Inc.
//! Desired entity state
//!
//! A [`Desired`] is what the reconciler wants one registry entity to look
//! like. It separates fields by update policy:
//!
//! | Part | On create | On update |
//! |---|---|---|
//! | `key` | lookup filter | lookup filter |
//! | `attributes` | written | overwritten when different |
//! | `create_only` | written | never touched |
//! | `custom_fields` | written | merged per key when different |
//! | `sections` | written | marked section replaced |

use serde_json::Value;

use crate::domain::{EntityId, EntityKind};
use crate::registry::{Fields, Filter};
use crate::reconcile::convert::slugify;

/// A marked free-text section maintained inside a text field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub field: String,
    pub marker: String,
    pub content: String,
}

/// Target state of one registry entity
#[derive(Debug, Clone, PartialEq)]
pub struct Desired {
    pub kind: EntityKind,
    pub key: Filter,
    pub attributes: Fields,
    pub create_only: Fields,
    pub custom_fields: Fields,
    pub sections: Vec<Section>,
}

impl Desired {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            key: Filter::new(),
            attributes: Fields::new(),
            create_only: Fields::new(),
            custom_fields: Fields::new(),
            sections: Vec::new(),
        }
    }

    /// Entity keyed by its single natural-key field, e.g. `name` or `model`.
    /// Slugged kinds get their slug as a create-only field.
    pub fn keyed(kind: EntityKind, value: &str) -> Self {
        let field = kind.key_fields()[0];
        let mut desired = Self::new(kind).key(field, value).set(field, value);
        if kind.has_slug() {
            desired = desired.on_create("slug", slugify(value));
        }
        desired
    }

    /// Add a natural-key filter pair
    pub fn key(mut self, field: &str, value: impl ToString) -> Self {
        self.key = self.key.with(field, value);
        self
    }

    /// Set a diffed attribute
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(field.to_string(), value.into());
        self
    }

    /// Set a diffed attribute when a value is present
    pub fn set_opt<V: Into<Value>>(self, field: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.set(field, value),
            None => self,
        }
    }

    /// Reference another entity through a diffed relation field
    pub fn relate(self, field: &str, id: EntityId) -> Self {
        self.set(field, id.0)
    }

    /// Set a field written only when the entity is created
    pub fn on_create(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.create_only.insert(field.to_string(), value.into());
        self
    }

    /// Reference another entity only at creation time
    pub fn relate_on_create(self, field: &str, id: EntityId) -> Self {
        self.on_create(field, id.0)
    }

    pub fn custom_field(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.custom_fields.insert(field.to_string(), value.into());
        self
    }

    /// Maintain `content` under `marker` inside the text field `field`
    pub fn section(mut self, field: &str, marker: &str, content: impl Into<String>) -> Self {
        self.sections.push(Section {
            field: field.to_string(),
            marker: marker.to_string(),
            content: content.into(),
        });
        self
    }

    /// Value of a field as it would be written on create
    pub fn create_value(&self, field: &str) -> Option<&Value> {
        self.attributes
            .get(field)
            .or_else(|| self.create_only.get(field))
    }

    /// Human readable natural key, also the cache key of the resolver
    pub fn label(&self) -> String {
        self.key.to_string()
    }
}
