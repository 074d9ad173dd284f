// Copyright (c) 2025 - Cowboy AI, Inc.
//! Property-Based Tests for Reconciliation
//!
//! For any consistent snapshot (every natural key carries one set of
//! attributes, though it may appear several times):
//!
//! 1. A second pass writes nothing
//! 2. Each natural key maps to exactly one registry entity
//! 3. Record order does not change the resulting inventory

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use cim_inventory_sync::domain::{attr, rel, CanonicalRecord, EntityKind, RecordKind};
use cim_inventory_sync::registry::InMemoryRegistry;
use cim_inventory_sync::{PhaseStats, ReconcileOptions, Reconciler};

// ============================================================================
// Generators
// ============================================================================

const ROLES: [&str; 3] = ["switch", "router", "storage"];
const MODELS: [&str; 3] = ["TL-SG3428", "ER7206", "TrueNAS-SCALE"];

/// Device whose attributes are a function of its name
fn device(name: &str) -> CanonicalRecord {
    let index = name.as_bytes()[0] as usize % ROLES.len();
    let status = if name.len() % 2 == 0 { "active" } else { "offline" };
    CanonicalRecord::new(RecordKind::Device, name)
        .attr(attr::STATUS, status)
        .rel(rel::ROLE, ROLES[index])
        .rel(rel::MANUFACTURER, "Acme")
        .rel(rel::DEVICE_TYPE, MODELS[index])
}

fn vlan(vid: i64) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Vlan, format!("VLAN{}", vid))
        .attr(attr::VID, vid)
        .rel(rel::VLAN_GROUP, if vid < 100 { "core" } else { "edge" })
}

fn prefix(octet: u8, length: u8) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Prefix, format!("10.{}.0.0/{}", octet, length))
        .attr(attr::DESCRIPTION, format!("net {}", octet))
}

/// Consistent snapshot with duplicated records
fn snapshot_strategy() -> impl Strategy<Value = Vec<CanonicalRecord>> {
    (
        prop::collection::vec("[a-e][0-9]{0,2}", 0..8),
        prop::collection::vec(1i64..=4094, 0..6),
        prop::collection::btree_map(any::<u8>(), 8u8..=30, 0..4),
    )
        .prop_map(|(names, vids, prefixes)| {
            let mut records: Vec<CanonicalRecord> = names.iter().map(|n| device(n)).collect();
            records.extend(vids.into_iter().map(vlan));
            records.extend(prefixes.into_iter().map(|(octet, len)| prefix(octet, len)));
            records
        })
}

// ============================================================================
// Helpers
// ============================================================================

fn reconcile(registry: &InMemoryRegistry, records: Vec<CanonicalRecord>) -> PhaseStats {
    tokio_test::block_on(async {
        let mut reconciler = Reconciler::new(registry, ReconcileOptions::default());
        reconciler
            .reconcile(records)
            .await
            .expect("in-memory registry never fails a phase");
        let (stats, failures) = reconciler.finish_phase();
        assert!(failures.is_empty(), "{:?}", failures);
        stats
    })
}

/// Natural key text of every entity of `kind`
fn keys(registry: &InMemoryRegistry, kind: EntityKind) -> Vec<String> {
    let field = kind.key_fields()[0];
    registry
        .entities(kind)
        .iter()
        .filter_map(|e| e.field(field).map(|v| v.to_string()))
        .collect()
}

/// Order-free view of the inventory: key → status/description per kind
fn inventory(registry: &InMemoryRegistry) -> BTreeMap<EntityKind, BTreeSet<String>> {
    let mut view = BTreeMap::new();
    for kind in [
        EntityKind::Device,
        EntityKind::DeviceRole,
        EntityKind::DeviceType,
        EntityKind::Vlan,
        EntityKind::VlanGroup,
        EntityKind::Prefix,
    ] {
        let field = kind.key_fields()[0];
        let entries = registry
            .entities(kind)
            .iter()
            .map(|e| {
                format!(
                    "{:?}|{:?}|{:?}",
                    e.field(field),
                    e.field("status"),
                    e.field("description")
                )
            })
            .collect();
        view.insert(kind, entries);
    }
    view
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Reconciling the same snapshot twice: the second pass is a no-op
    #[test]
    fn prop_second_pass_writes_nothing(records in snapshot_strategy()) {
        let registry = InMemoryRegistry::new();
        reconcile(&registry, records.clone());
        let before = registry.snapshot();
        registry.reset_counters();

        let stats = reconcile(&registry, records);

        prop_assert_eq!(stats.writes(), 0);
        prop_assert!(registry.creates().is_empty());
        prop_assert!(registry.saves().is_empty());
        prop_assert_eq!(registry.snapshot(), before);
    }

    /// No natural key is ever stored twice, however often it is reported
    #[test]
    fn prop_natural_keys_are_unique(records in snapshot_strategy()) {
        let registry = InMemoryRegistry::new();
        let mut doubled = records.clone();
        doubled.extend(records.clone());
        reconcile(&registry, doubled);
        reconcile(&registry, records);

        for kind in [EntityKind::Device, EntityKind::Site, EntityKind::Vlan, EntityKind::Prefix] {
            let keys = keys(&registry, kind);
            let distinct: BTreeSet<&String> = keys.iter().collect();
            prop_assert_eq!(keys.len(), distinct.len(), "duplicate {} key", kind);
        }
    }

    /// Shuffling the snapshot yields the same inventory
    #[test]
    fn prop_record_order_is_irrelevant(
        (records, shuffled) in snapshot_strategy()
            .prop_flat_map(|r| (Just(r.clone()), Just(r).prop_shuffle()))
    ) {
        let ordered = InMemoryRegistry::new();
        let reordered = InMemoryRegistry::new();

        reconcile(&ordered, records);
        reconcile(&reordered, shuffled);

        prop_assert_eq!(inventory(&ordered), inventory(&reordered));
    }
}
