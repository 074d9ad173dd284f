// Copyright (c) 2025 - Cowboy AI, Inc.
//! Reconciliation integration tests
//!
//! Full runs of scripted collectors against the in-memory registry.

mod fixtures;

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use serde_json::json;
use test_case::test_case;

use cim_inventory_sync::collector::{AdapterError, SnapshotCollector};
use cim_inventory_sync::domain::{attr, rel, CanonicalRecord, EntityKind, RecordKind};
use cim_inventory_sync::reconcile::{memory_mb_from_bytes, vcpus_from_quota, PrefixPolicy};
use cim_inventory_sync::registry::{Entity, InMemoryRegistry, Registry};
use cim_inventory_sync::{PhaseStatus, ReconcileOptions, RunReport, RunStatus, SyncOrchestrator};

use fixtures::*;

fn docker_options() -> ReconcileOptions {
    ReconcileOptions {
        prefix_policy: PrefixPolicy::new(16),
        custom_fields: true,
        ..ReconcileOptions::default()
    }
}

async fn run(registry: &InMemoryRegistry, collector: &SnapshotCollector) -> RunReport {
    SyncOrchestrator::new(registry, docker_options())
        .run(collector)
        .await
}

fn only(registry: &InMemoryRegistry, kind: EntityKind) -> Entity {
    let entities = registry.entities(kind);
    assert_eq!(entities.len(), 1, "expected exactly one {}", kind);
    entities.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_first_run_builds_inventory() {
    let registry = InMemoryRegistry::new();

    let report = run(&registry, &homelab_snapshot()).await;

    assert!(report.success(), "{:#?}", report);
    assert_eq!(report.phases.len(), 3);
    for kind in [
        EntityKind::Site,
        EntityKind::DeviceRole,
        EntityKind::Manufacturer,
        EntityKind::DeviceType,
        EntityKind::Device,
        EntityKind::ClusterType,
        EntityKind::Cluster,
        EntityKind::VirtualMachine,
        EntityKind::VmInterface,
        EntityKind::IpAddress,
        EntityKind::VlanGroup,
        EntityKind::Prefix,
    ] {
        assert_eq!(registry.count(kind), 1, "{}", kind);
    }
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let registry = InMemoryRegistry::new();
    let collector = homelab_snapshot();
    run(&registry, &collector).await;

    let before = registry.snapshot();
    registry.reset_counters();
    let report = run(&registry, &collector).await;

    assert!(report.success());
    assert_eq!(report.totals().writes(), 0);
    assert!(registry.creates().is_empty());
    assert!(registry.saves().is_empty());
    assert_eq!(registry.snapshot(), before);
}

#[tokio::test]
async fn test_dependencies_exist_before_dependents() {
    let registry = InMemoryRegistry::new();
    run(&registry, &homelab_snapshot()).await;

    let creates = registry.creates();
    let position = |kind: EntityKind| creates.iter().position(|(k, _)| *k == kind).unwrap();

    assert!(position(EntityKind::Site) < position(EntityKind::Device));
    assert!(position(EntityKind::Manufacturer) < position(EntityKind::DeviceType));
    assert!(position(EntityKind::DeviceType) < position(EntityKind::Device));
    assert!(position(EntityKind::ClusterType) < position(EntityKind::Cluster));
    assert!(position(EntityKind::Cluster) < position(EntityKind::VirtualMachine));
    assert!(position(EntityKind::VirtualMachine) < position(EntityKind::VmInterface));
    assert!(position(EntityKind::VmInterface) < position(EntityKind::IpAddress));
}

#[tokio::test]
async fn test_natural_keys_stay_unique_across_phases_and_runs() {
    let registry = InMemoryRegistry::new();
    // the host device shows up in two phases of every run
    let collector = homelab_snapshot().with_phase("extra", vec![host_device(), switch("sw1")]);
    run(&registry, &collector).await;
    run(&registry, &collector).await;

    let names: Vec<String> = registry
        .entities(EntityKind::Device)
        .iter()
        .filter_map(|d| d.text("name").map(str::to_string))
        .collect();
    let unique: HashSet<&String> = names.iter().collect();
    assert_eq!(names.len(), unique.len());
    assert_eq!(names.len(), 2);
    assert_eq!(registry.count(EntityKind::Site), 1);
}

#[tokio::test]
async fn test_bare_container_address_gets_source_default_prefix() {
    let registry = InMemoryRegistry::new();
    run(&registry, &homelab_snapshot()).await;

    let ip = only(&registry, EntityKind::IpAddress);
    let interface = only(&registry, EntityKind::VmInterface);
    assert_eq!(ip.text("address"), Some("10.10.0.5/16"));
    assert_eq!(ip.text("description"), Some("Container: grafana"));
    assert_eq!(ip.field("assigned_object_id"), Some(&json!(interface.id.0)));
    assert_eq!(interface.text("mac_address"), Some("02:42:0A:0A:00:05"));
}

#[tokio::test]
async fn test_container_resources_are_converted() {
    let registry = InMemoryRegistry::new();
    run(&registry, &homelab_snapshot()).await;

    let vm = only(&registry, EntityKind::VirtualMachine);
    assert_eq!(vm.field("vcpus"), Some(&json!(2)));
    assert_eq!(vm.field("memory"), Some(&json!(512)));
    assert_eq!(vm.field("custom_fields"), Some(&json!({"image": "grafana/grafana:10.2"})));
}

#[test_case(0, 1 ; "no quota means one core")]
#[test_case(50_000, 1 ; "fractional quota is at least one core")]
#[test_case(200_000, 2 ; "two cores")]
#[test_case(250_000, 2 ; "partial core rounds down")]
fn test_vcpus_from_quota(quota: i64, expected: i64) {
    assert_eq!(vcpus_from_quota(quota), expected);
}

#[test_case(0, 512 ; "unlimited memory defaults")]
#[test_case(536_870_912, 512 ; "half a gigabyte")]
#[test_case(4_294_967_296, 4096 ; "four gigabytes")]
fn test_memory_from_bytes(bytes: i64, expected: i64) {
    assert_eq!(memory_mb_from_bytes(bytes), expected);
}

#[tokio::test]
async fn test_volume_section_keeps_human_comments() {
    let registry = InMemoryRegistry::new();
    run(&registry, &homelab_snapshot()).await;

    let host = only(&registry, EntityKind::Device);
    let comments = host.text("comments").unwrap().to_string();
    assert!(comments.starts_with(VOLUMES_MARKER));
    assert!(comments.contains("grafana-data (local)"));

    // an operator adds a note; later runs must leave it alone
    let mut changes = serde_json::Map::new();
    changes.insert(
        "comments".to_string(),
        json!(format!("Rack A, shelf 2\n\n{}", comments)),
    );
    registry
        .save(EntityKind::Device, host.id, &changes)
        .await
        .unwrap();

    let collector = SnapshotCollector::new("docker").with_phase(
        "volumes",
        vec![host_device(), volume("grafana-data"), volume("loki-data")],
    );
    let report = run(&registry, &collector).await;
    assert!(report.success(), "{:#?}", report);
    assert_eq!(report.totals().updated, 1);

    let host = only(&registry, EntityKind::Device);
    let comments = host.text("comments").unwrap();
    assert!(comments.starts_with("Rack A, shelf 2"));
    assert!(comments.contains("loki-data (local)"));
    assert!(!comments.contains("prometheus-data"));
    assert_eq!(comments.matches(VOLUMES_MARKER).count(), 1);
}

#[tokio::test]
async fn test_sections_from_two_sources_share_one_device() {
    let registry = InMemoryRegistry::new();
    let docker = SnapshotCollector::new("docker").with_phase(
        "volumes",
        vec![
            storage_host_device(),
            volume("grafana-data").rel(rel::DEVICE, STORAGE_HOST),
        ],
    );
    let truenas = SnapshotCollector::new("truenas").with_phase(
        "storage",
        vec![storage_host_device(), pool("tank", "ONLINE")],
    );

    for round in 0..3 {
        let volumes = run(&registry, &docker).await;
        let pools = run(&registry, &truenas).await;
        assert!(volumes.success() && pools.success());
        if round > 0 {
            assert_eq!(volumes.totals().updated, 0, "round {}", round);
            assert_eq!(pools.totals().updated, 0, "round {}", round);
        }
    }

    let device = only(&registry, EntityKind::Device);
    let comments = device.text("comments").unwrap();
    assert_eq!(
        comments,
        format!(
            "{}\ngrafana-data (local): /var/lib/docker/volumes/grafana-data/_data\n\n{}\ntank: ONLINE (0/0 bytes)",
            VOLUMES_MARKER, POOLS_MARKER
        )
    );
}

#[tokio::test]
async fn test_bad_record_does_not_fail_phase() {
    let registry = InMemoryRegistry::new();
    let collector = SnapshotCollector::new("opnsense").with_phase(
        "vlans",
        vec![
            CanonicalRecord::new(RecordKind::Vlan, "IoT").attr(attr::VID, 30i64),
            CanonicalRecord::new(RecordKind::Vlan, "untagged"),
            CanonicalRecord::new(RecordKind::Vlan, "Guests").attr(attr::VID, 40i64),
        ],
    );

    let report = run(&registry, &collector).await;

    let phase = report.phase("vlans").unwrap();
    assert_eq!(phase.status, PhaseStatus::Completed);
    assert_eq!(phase.stats.created, 2);
    assert_eq!(phase.stats.skipped, 1);
    assert_eq!(phase.failures[0].name, "untagged");
    assert_eq!(phase.failures[0].error, "data_shape");
    assert_eq!(registry.count(EntityKind::Vlan), 2);
}

#[tokio::test]
async fn test_empty_snapshot_writes_nothing() {
    let registry = InMemoryRegistry::new();
    let collector = SnapshotCollector::new("omada").with_phase("switches", Vec::new());

    let report = run(&registry, &collector).await;

    assert!(report.success());
    assert_eq!(report.phases[0].records, 0);
    assert_eq!(report.totals().writes(), 0);
    assert!(registry.creates().is_empty());
}

#[tokio::test]
async fn test_duplicate_registry_entries_are_ambiguous() {
    let registry = InMemoryRegistry::new();
    seed(&registry, EntityKind::Site, json!({"name": "homelab", "slug": "homelab"}));
    seed(&registry, EntityKind::Site, json!({"name": "homelab", "slug": "homelab-2"}));
    let collector = SnapshotCollector::new("omada")
        .with_phase("switches", vec![switch("sw1")])
        .with_phase("gateways", vec![switch("gw1")]);

    let report = run(&registry, &collector).await;

    let first = report.phase("switches").unwrap();
    assert!(first.succeeded());
    assert_eq!(first.failures[0].error, "ambiguous_match");
    // the failed site is not looked up again later in the run
    let second = report.phase("gateways").unwrap();
    assert_eq!(second.failures[0].error, "missing_dependency");
    assert_eq!(registry.count(EntityKind::Device), 0);
    assert_eq!(registry.count(EntityKind::Site), 2);
}

#[tokio::test]
async fn test_address_on_unknown_interface_is_missing_dependency() {
    let registry = InMemoryRegistry::new();
    let collector = SnapshotCollector::new("docker").with_phase(
        "containers",
        vec![host_device(), container(), container_address()],
    );

    let report = run(&registry, &collector).await;

    let phase = report.phase("containers").unwrap();
    assert!(phase.succeeded());
    assert_eq!(phase.failures.len(), 1);
    assert_eq!(phase.failures[0].kind, RecordKind::Address);
    assert_eq!(phase.failures[0].error, "missing_dependency");
    assert_eq!(registry.count(EntityKind::IpAddress), 0);
}

#[tokio::test]
async fn test_volumes_for_unknown_device_are_skipped() {
    let registry = InMemoryRegistry::new();
    let collector = SnapshotCollector::new("docker")
        .with_phase("volumes", vec![volume("grafana-data"), volume("loki-data")]);

    let report = run(&registry, &collector).await;

    let phase = report.phase("volumes").unwrap();
    assert_eq!(phase.stats.skipped, 2);
    assert!(registry.creates().is_empty());
}

#[tokio::test]
async fn test_rejected_write_is_persistence_failure() {
    let registry = InMemoryRegistry::new();
    registry.reject(EntityKind::Prefix);

    let collector = SnapshotCollector::new("docker").with_phase("networks", network_records());
    let report = run(&registry, &collector).await;

    let phase = report.phase("networks").unwrap();
    assert!(phase.succeeded());
    assert_eq!(phase.failures[0].error, "persistence");
    assert_eq!(registry.count(EntityKind::VlanGroup), 1);
}

#[tokio::test]
async fn test_failing_source_phase_leaves_others_running() {
    let registry = InMemoryRegistry::new();
    let collector = SnapshotCollector::new("truenas")
        .with_failed_phase("storage-pools", AdapterError::Connectivity("timed out".into()))
        .with_phase("interfaces", vec![switch("truenas01")]);

    let report = run(&registry, &collector).await;

    assert_eq!(report.status, RunStatus::Done);
    assert!(!report.success());
    assert!(!report.phase("storage-pools").unwrap().succeeded());
    assert!(report.phase("interfaces").unwrap().succeeded());
    assert_eq!(registry.count(EntityKind::Device), 1);
}

#[tokio::test]
async fn test_explicit_relations_override_run_site() {
    let registry = InMemoryRegistry::new();
    let collector = SnapshotCollector::new("omada")
        .with_phase("switches", vec![switch("sw1").rel(rel::SITE, "garage")]);

    run(&registry, &collector).await;

    assert!(registry.find(EntityKind::Site, "name", "garage").is_some());
    assert!(registry.find(EntityKind::Site, "name", "homelab").is_none());
}
