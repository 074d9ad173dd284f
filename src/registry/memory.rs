// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory registry
//!
//! A process-local [`Registry`] that behaves like the REST registry where
//! the engine can observe it:
//!
//! - filters match on field equality; `<field>_id` filters match the related
//!   id stored in `<field>`
//! - creates are refused when a required relation is missing or points at
//!   an entity that does not exist (the registry's foreign-key validation)
//! - no natural-key uniqueness is enforced
//!
//! It also records every create and save so tests can assert on write
//! counts, and can be switched offline or told to reject a kind.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use super::{filter_text, scalar_of, Entity, Fields, Filter, Registry, RegistryError};
use crate::domain::{AssignedObject, EntityId, EntityKind};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    collections: BTreeMap<EntityKind, Vec<Entity>>,
    creates: Vec<(EntityKind, EntityId)>,
    saves: Vec<(EntityKind, EntityId)>,
    lists: usize,
    offline: bool,
    rejected_kinds: BTreeSet<EntityKind>,
}

impl MemoryState {
    fn exists(&self, kind: EntityKind, id: &Value) -> bool {
        let Some(id) = scalar_of(id).as_u64() else {
            return false;
        };
        self.collections
            .get(&kind)
            .map(|entities| entities.iter().any(|e| e.id == EntityId(id)))
            .unwrap_or(false)
    }

    fn validate_relations(&self, kind: EntityKind, fields: &Fields) -> Result<(), RegistryError> {
        for dep in kind.dependencies() {
            match fields.get(dep.field) {
                None | Some(Value::Null) if dep.required => {
                    return Err(rejected(format!("{}: This field is required.", dep.field)));
                }
                None | Some(Value::Null) => {}
                Some(id) if !self.exists(dep.kind, id) => {
                    return Err(rejected(format!(
                        "{}: Related object not found using the provided numeric ID: {}",
                        dep.field, id
                    )));
                }
                Some(_) => {}
            }
        }

        if kind == EntityKind::IpAddress {
            let object_type = fields.get("assigned_object_type").and_then(Value::as_str);
            let object_id = fields.get("assigned_object_id").and_then(Value::as_u64);
            if let (Some(object_type), Some(object_id)) = (object_type, object_id) {
                let assigned = AssignedObject::from_parts(object_type, EntityId(object_id))
                    .ok_or_else(|| rejected(format!("Invalid content type: {}", object_type)))?;
                let interface_kind = match assigned {
                    AssignedObject::DeviceInterface(_) => EntityKind::DeviceInterface,
                    AssignedObject::VmInterface(_) => EntityKind::VmInterface,
                };
                if !self.exists(interface_kind, &Value::from(object_id)) {
                    return Err(rejected(format!(
                        "assigned_object_id: {} {} does not exist",
                        interface_kind, object_id
                    )));
                }
            }
        }

        Ok(())
    }
}

fn rejected(body: String) -> RegistryError {
    RegistryError::Rejected { status: 400, body }
}

fn matches(entity: &Entity, filter: &Filter) -> bool {
    filter.pairs().iter().all(|(key, expected)| {
        let value = entity.fields.get(key).or_else(|| {
            key.strip_suffix("_id")
                .and_then(|related| entity.fields.get(related))
        });
        value.and_then(filter_text).as_deref() == Some(expected.as_str())
    })
}

/// Registry kept entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    state: Mutex<MemoryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an entity without validation (seeding pre-existing data)
    pub fn insert(&self, kind: EntityKind, mut fields: Fields) -> EntityId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = EntityId(state.next_id);
        fields.insert("id".to_string(), Value::from(id.0));
        state
            .collections
            .entry(kind)
            .or_default()
            .push(Entity { id, fields });
        id
    }

    /// Make every call fail with [`RegistryError::Unreachable`]
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Refuse creates and saves of `kind`
    pub fn reject(&self, kind: EntityKind) {
        self.lock().rejected_kinds.insert(kind);
    }

    pub fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        self.lock().collections.get(&kind).cloned().unwrap_or_default()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.lock().collections.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// First entity of `kind` whose `field` has the filter text `value`
    pub fn find(&self, kind: EntityKind, field: &str, value: &str) -> Option<Entity> {
        let filter = Filter::new().with(field, value);
        self.lock()
            .collections
            .get(&kind)
            .and_then(|entities| entities.iter().find(|e| matches(e, &filter)).cloned())
    }

    pub fn entity(&self, kind: EntityKind, id: EntityId) -> Option<Entity> {
        self.lock()
            .collections
            .get(&kind)
            .and_then(|entities| entities.iter().find(|e| e.id == id).cloned())
    }

    /// Creates performed so far, in order
    pub fn creates(&self) -> Vec<(EntityKind, EntityId)> {
        self.lock().creates.clone()
    }

    /// Saves performed so far, in order
    pub fn saves(&self) -> Vec<(EntityKind, EntityId)> {
        self.lock().saves.clone()
    }

    /// Reads (`list`/`get`) served so far
    pub fn lists(&self) -> usize {
        self.lock().lists
    }

    pub fn reset_counters(&self) {
        let mut state = self.lock();
        state.creates.clear();
        state.saves.clear();
        state.lists = 0;
    }

    /// Full copy of every collection, for before/after comparisons
    pub fn snapshot(&self) -> BTreeMap<EntityKind, Vec<Entity>> {
        self.lock().collections.clone()
    }
}

#[async_trait]
impl Registry for InMemoryRegistry {
    async fn list(&self, kind: EntityKind, filter: &Filter) -> Result<Vec<Entity>, RegistryError> {
        let mut state = self.lock();
        if state.offline {
            return Err(RegistryError::Unreachable("in-memory registry offline".to_string()));
        }
        state.lists += 1;

        Ok(state
            .collections
            .get(&kind)
            .map(|entities| {
                entities
                    .iter()
                    .filter(|e| matches(e, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create(&self, kind: EntityKind, fields: &Fields) -> Result<Entity, RegistryError> {
        let mut state = self.lock();
        if state.offline {
            return Err(RegistryError::Unreachable("in-memory registry offline".to_string()));
        }
        if state.rejected_kinds.contains(&kind) {
            return Err(rejected(format!("{} creation refused", kind)));
        }
        state.validate_relations(kind, fields)?;

        state.next_id += 1;
        let id = EntityId(state.next_id);
        let mut stored = fields.clone();
        stored.insert("id".to_string(), Value::from(id.0));
        let entity = Entity { id, fields: stored };

        state
            .collections
            .entry(kind)
            .or_default()
            .push(entity.clone());
        state.creates.push((kind, id));
        Ok(entity)
    }

    async fn save(
        &self,
        kind: EntityKind,
        id: EntityId,
        changes: &Fields,
    ) -> Result<Entity, RegistryError> {
        let mut state = self.lock();
        if state.offline {
            return Err(RegistryError::Unreachable("in-memory registry offline".to_string()));
        }
        if state.rejected_kinds.contains(&kind) {
            return Err(rejected(format!("{} update refused", kind)));
        }

        let entity = state
            .collections
            .get_mut(&kind)
            .and_then(|entities| entities.iter_mut().find(|e| e.id == id))
            .ok_or_else(|| RegistryError::Rejected {
                status: 404,
                body: format!("{} {} not found", kind, id),
            })?;

        for (key, value) in changes {
            entity.fields.insert(key.clone(), value.clone());
        }
        let updated = entity.clone();
        state.saves.push((kind, id));
        Ok(updated)
    }

    async fn health_check(&self) -> Result<(), RegistryError> {
        if self.lock().offline {
            return Err(RegistryError::Unreachable("in-memory registry offline".to_string()));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "in-memory-registry"
    }
}
