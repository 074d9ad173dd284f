// Copyright (c) 2025 - Cowboy AI, Inc.
//! Entity Resolver - the generic "ensure exists" primitive
//!
//! One resolver serves every entity kind. It is parameterized by the
//! [`Desired`] state (kind, natural key, fields) and by the dependency list
//! of the kind ([`EntityKind::dependencies`]):
//!
//! ```text
//! ensure(desired)
//!   ├─ required dependency missing  → MissingDependency
//!   ├─ get(kind, natural key)
//!   │    ├─ 0 matches → create       → (id, created)
//!   │    ├─ 1 match   → existing     → (id, not created)
//!   │    └─ n matches → AmbiguousMatch
//! upsert(desired) = ensure + diff/apply on the existing entity
//! ```
//!
//! The resolver lives for a whole run and caches dependency outcomes:
//! resolved ids are reused, and a dependency that failed is not retried
//! within the run (its dependents are skipped instead).
//!
//! Lookup-then-create is not atomic. Two processes reconciling the same
//! registry concurrently can create duplicates; deployments run one sync
//! process at a time.

use std::collections::HashMap;
use tracing::{debug, info};

use super::desired::Desired;
use super::upsert;
use crate::domain::{EntityId, EntityKind};
use crate::errors::{SyncError, SyncResult};
use crate::registry::{Entity, Filter, Registry};
use crate::report::{Outcome, PhaseStats};

/// Entity located or created by [`Resolver::ensure`]
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub entity: Entity,
    pub created: bool,
}

impl Resolved {
    pub fn id(&self) -> EntityId {
        self.entity.id
    }
}

#[derive(Debug, Clone)]
enum Cached {
    Resolved(EntityId),
    Failed(String),
}

/// Natural-key resolver bound to one registry for one run
pub struct Resolver<'r, R: Registry + ?Sized> {
    registry: &'r R,
    cache: HashMap<(EntityKind, String), Cached>,
    stats: PhaseStats,
}

impl<'r, R: Registry + ?Sized> Resolver<'r, R> {
    pub fn new(registry: &'r R) -> Self {
        Self {
            registry,
            cache: HashMap::new(),
            stats: PhaseStats::default(),
        }
    }

    pub fn registry(&self) -> &'r R {
        self.registry
    }

    fn check_dependencies(desired: &Desired) -> SyncResult<()> {
        for dep in desired.kind.dependencies().iter().filter(|d| d.required) {
            let present = desired
                .create_value(dep.field)
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if !present {
                return Err(SyncError::MissingDependency {
                    kind: desired.kind,
                    key: desired.label(),
                    dependency: format!("{} ({})", dep.field, dep.kind),
                });
            }
        }
        Ok(())
    }

    /// Resolve the natural key to an existing entity or create it
    pub async fn ensure(&mut self, desired: &Desired) -> SyncResult<Resolved> {
        if desired.key.is_empty() {
            return Err(SyncError::DataShape(format!(
                "{} without a natural key",
                desired.kind
            )));
        }

        let existing = self
            .registry
            .get(desired.kind, &desired.key)
            .await
            .map_err(|e| SyncError::from_registry(e, desired.kind, desired.label()))?;

        if let Some(entity) = existing {
            return Ok(Resolved {
                entity,
                created: false,
            });
        }

        // Existing entities may predate a dependency; only creation needs them
        Self::check_dependencies(desired)?;

        let fields = upsert::create_fields(desired);
        let entity = self
            .registry
            .create(desired.kind, &fields)
            .await
            .map_err(|e| SyncError::from_registry(e, desired.kind, desired.label()))?;

        info!(kind = %desired.kind, key = %desired.label(), id = %entity.id, "created");
        Ok(Resolved {
            entity,
            created: true,
        })
    }

    /// Ensure the entity exists and carries the desired attributes
    pub async fn upsert(&mut self, desired: &Desired) -> SyncResult<(EntityId, Outcome)> {
        let resolved = self.ensure(desired).await?;
        let outcome = if resolved.created {
            Outcome::Created
        } else if upsert::apply(self.registry, &resolved.entity, desired).await? {
            info!(kind = %desired.kind, key = %desired.label(), id = %resolved.id(), "updated");
            Outcome::Updated
        } else {
            Outcome::Unchanged
        };

        self.stats.record(outcome);
        self.remember(desired.kind, &desired.key, Ok(resolved.id()));
        Ok((resolved.id(), outcome))
    }

    /// Upsert a dependency entity once per run
    ///
    /// A previously failed dependency yields `MissingDependency` without
    /// touching the registry again. Connectivity failures are not cached.
    pub async fn dependency(&mut self, desired: &Desired) -> SyncResult<EntityId> {
        let cache_key = (desired.kind, desired.label());
        match self.cache.get(&cache_key) {
            Some(Cached::Resolved(id)) => return Ok(*id),
            Some(Cached::Failed(reason)) => {
                return Err(SyncError::MissingDependency {
                    kind: desired.kind,
                    key: desired.label(),
                    dependency: format!("earlier failure: {}", reason),
                })
            }
            None => {}
        }

        match self.upsert(desired).await {
            Ok((id, _)) => Ok(id),
            Err(err) => {
                if !err.is_phase_fatal() {
                    self.remember(desired.kind, &desired.key, Err(err.to_string()));
                }
                Err(err)
            }
        }
    }

    /// Update an entity that must already exist; never creates
    ///
    /// The entity is read once per call since its current fields are needed
    /// for the diff; its id is remembered for later lookups.
    pub async fn update_existing(&mut self, desired: &Desired) -> SyncResult<(EntityId, Outcome)> {
        if let Some(Cached::Failed(reason)) = self.cache.get(&(desired.kind, desired.label())) {
            return Err(SyncError::MissingDependency {
                kind: desired.kind,
                key: desired.label(),
                dependency: format!("earlier failure: {}", reason),
            });
        }

        let entity = self
            .registry
            .get(desired.kind, &desired.key)
            .await
            .map_err(|e| SyncError::from_registry(e, desired.kind, desired.label()))?
            .ok_or_else(|| SyncError::MissingDependency {
                kind: desired.kind,
                key: desired.label(),
                dependency: format!("{} '{}' does not exist", desired.kind, desired.label()),
            })?;
        self.remember(desired.kind, &desired.key, Ok(entity.id));

        let outcome = if upsert::apply(self.registry, &entity, desired).await? {
            info!(kind = %desired.kind, key = %desired.label(), id = %entity.id, "updated");
            Outcome::Updated
        } else {
            Outcome::Unchanged
        };
        self.stats.record(outcome);
        Ok((entity.id, outcome))
    }

    /// Id of an existing entity; `None` when it does not exist or failed
    /// earlier in the run
    pub async fn lookup(&mut self, kind: EntityKind, key: &Filter) -> SyncResult<Option<EntityId>> {
        match self.cache.get(&(kind, key.to_string())) {
            Some(Cached::Resolved(id)) => return Ok(Some(*id)),
            Some(Cached::Failed(_)) => return Ok(None),
            None => {}
        }

        let found = self
            .registry
            .get(kind, key)
            .await
            .map_err(|e| SyncError::from_registry(e, kind, key.to_string()))?;

        if let Some(entity) = &found {
            debug!(kind = %kind, key = %key, id = %entity.id, "resolved from registry");
            self.remember(kind, key, Ok(entity.id));
        }
        Ok(found.map(|e| e.id))
    }

    /// Record the outcome for `kind`/`key` so later lookups reuse it
    pub fn remember(&mut self, kind: EntityKind, key: &Filter, result: Result<EntityId, String>) {
        let cached = match result {
            Ok(id) => Cached::Resolved(id),
            Err(reason) => Cached::Failed(reason),
        };
        self.cache.insert((kind, key.to_string()), cached);
    }

    /// Counts accumulated since the last call
    pub fn take_stats(&mut self) -> PhaseStats {
        std::mem::take(&mut self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Fields, InMemoryRegistry};
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_ensure_creates_once() {
        let registry = InMemoryRegistry::new();
        let mut resolver = Resolver::new(&registry);
        let site = Desired::keyed(EntityKind::Site, "homelab");

        let first = resolver.ensure(&site).await.unwrap();
        let second = resolver.ensure(&site).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id(), second.id());
        assert_eq!(registry.count(EntityKind::Site), 1);
    }

    #[tokio::test]
    async fn test_ensure_refuses_missing_dependency() {
        let registry = InMemoryRegistry::new();
        let mut resolver = Resolver::new(&registry);
        let device_type = Desired::keyed(EntityKind::DeviceType, "OPNsense");

        let err = resolver.ensure(&device_type).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingDependency { .. }));
        assert_eq!(registry.count(EntityKind::DeviceType), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_match_is_surfaced() {
        let registry = InMemoryRegistry::new();
        registry.insert(EntityKind::Manufacturer, fields(json!({"name": "Docker"})));
        registry.insert(EntityKind::Manufacturer, fields(json!({"name": "Docker"})));
        let mut resolver = Resolver::new(&registry);

        let err = resolver
            .ensure(&Desired::keyed(EntityKind::Manufacturer, "Docker"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::AmbiguousMatch { count: 2, .. }));
        assert_eq!(registry.count(EntityKind::Manufacturer), 2);
    }

    #[tokio::test]
    async fn test_failed_dependency_is_not_retried() {
        let registry = InMemoryRegistry::new();
        registry.reject(EntityKind::Site);
        let mut resolver = Resolver::new(&registry);
        let site = Desired::keyed(EntityKind::Site, "homelab");

        let first = resolver.dependency(&site).await.unwrap_err();
        assert!(matches!(first, SyncError::Persistence { .. }));

        let second = resolver.dependency(&site).await.unwrap_err();
        assert!(matches!(second, SyncError::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn test_upsert_counts_outcomes() {
        let registry = InMemoryRegistry::new();
        let mut resolver = Resolver::new(&registry);

        let site = Desired::keyed(EntityKind::Site, "homelab").set("description", "lab");
        resolver.upsert(&site).await.unwrap();
        resolver.upsert(&site).await.unwrap();
        let (_, outcome) = resolver
            .upsert(&site.clone().set("description", "home lab"))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Updated);

        let stats = resolver.take_stats();
        assert_eq!((stats.created, stats.updated, stats.unchanged), (1, 1, 1));
        assert_eq!(resolver.take_stats(), PhaseStats::default());
    }

    #[tokio::test]
    async fn test_update_existing_never_creates() {
        let registry = InMemoryRegistry::new();
        let mut resolver = Resolver::new(&registry);
        let device = Desired::keyed(EntityKind::Device, "truenas01")
            .section("comments", "=== Storage Pools ===", "tank");

        let err = resolver.update_existing(&device).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingDependency { .. }));
        assert_eq!(registry.count(EntityKind::Device), 0);
    }

    #[tokio::test]
    async fn test_update_existing_reads_once_and_remembers() {
        let registry = InMemoryRegistry::new();
        let seeded = registry.insert(
            EntityKind::Device,
            fields(json!({"name": "truenas01", "comments": "Rack A"})),
        );
        let mut resolver = Resolver::new(&registry);
        let device = Desired::keyed(EntityKind::Device, "truenas01")
            .section("comments", "=== Storage Pools ===", "tank: ONLINE");

        let (id, outcome) = resolver.update_existing(&device).await.unwrap();
        assert_eq!((id, outcome), (seeded, Outcome::Updated));
        assert_eq!(registry.lists(), 1);

        let found = resolver
            .lookup(EntityKind::Device, &device.key)
            .await
            .unwrap();
        assert_eq!(found, Some(seeded));
        assert_eq!(registry.lists(), 1);

        let (_, outcome) = resolver.update_existing(&device).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(registry.lists(), 2);
        assert_eq!(registry.saves().len(), 1);
    }
}
