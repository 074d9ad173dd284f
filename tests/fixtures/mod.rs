// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-inventory-sync
//!
//! Deterministic canonical records shaped like what the collectors emit.
//!
//! # Design Principles
//! - Fixtures are the ONLY place that builds multi-record snapshots
//! - Names, addresses and sizes are fixed constants
//! - Registry seeding goes through [`seed`] so tests read as data

#![allow(dead_code)]

use serde_json::Value;

use cim_inventory_sync::collector::SnapshotCollector;
use cim_inventory_sync::domain::{attr, rel, CanonicalRecord, EntityId, EntityKind, RecordKind};
use cim_inventory_sync::registry::InMemoryRegistry;

pub const HOST: &str = "docker01";
pub const CONTAINER: &str = "grafana";
pub const NETWORK: &str = "monitoring";
pub const CONTAINER_IP: &str = "10.10.0.5";
pub const VOLUMES_MARKER: &str = "=== Docker Volumes ===";
pub const STORAGE_HOST: &str = "truenas01";
pub const POOLS_MARKER: &str = "=== Storage Pools ===";

/// 2 cores as a Docker CPU quota
pub const CPU_QUOTA: i64 = 200_000;
/// 512 MiB
pub const MEMORY_BYTES: i64 = 536_870_912;

pub fn host_device() -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Device, HOST)
        .attr(attr::ROLE_COLOR, "9c27b0")
        .rel(rel::ROLE, "container-host")
        .rel(rel::MANUFACTURER, "Docker")
        .rel(rel::DEVICE_TYPE, "Docker Host")
}

pub fn switch(name: &str) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Device, name)
        .attr(attr::STATUS, "active")
        .rel(rel::ROLE, "switch")
        .rel(rel::MANUFACTURER, "TP-Link")
        .rel(rel::DEVICE_TYPE, "TL-SG3428")
}

pub fn network_records() -> Vec<CanonicalRecord> {
    vec![
        CanonicalRecord::new(RecordKind::VlanGroup, "Docker Networks"),
        CanonicalRecord::new(RecordKind::Prefix, "10.10.0.0/16")
            .attr(attr::DESCRIPTION, "Docker network: monitoring (bridge)"),
    ]
}

pub fn container() -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::VirtualMachine, CONTAINER)
        .attr(attr::STATUS, "active")
        .attr(attr::CPU_QUOTA, CPU_QUOTA)
        .attr(attr::MEMORY_BYTES, MEMORY_BYTES)
        .attr(attr::COMMENTS, "Image: grafana/grafana:10.2")
        .attr("cf_image", "grafana/grafana:10.2")
        .rel(rel::CLUSTER, HOST)
        .rel(rel::CLUSTER_TYPE, "Docker")
}

pub fn container_interface() -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Interface, NETWORK)
        .attr(attr::MAC_ADDRESS, "02:42:0a:0a:00:05")
        .rel(rel::VIRTUAL_MACHINE, CONTAINER)
}

/// Container address as Docker reports it: no prefix length
pub fn container_address() -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Address, CONTAINER_IP)
        .attr(attr::NETWORK, NETWORK)
        .attr(attr::DESCRIPTION, "Container: grafana")
        .rel(rel::VIRTUAL_MACHINE, CONTAINER)
        .rel(rel::INTERFACE, NETWORK)
}

pub fn container_records() -> Vec<CanonicalRecord> {
    vec![
        host_device(),
        container(),
        container_interface(),
        container_address(),
    ]
}

pub fn volume(name: &str) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Volume, name)
        .attr(attr::SECTION, VOLUMES_MARKER)
        .attr(
            attr::DESCRIPTION,
            format!("{} (local): /var/lib/docker/volumes/{}/_data", name, name),
        )
        .rel(rel::DEVICE, HOST)
}

/// A storage appliance that also runs Docker
pub fn storage_host_device() -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Device, STORAGE_HOST)
        .rel(rel::ROLE, "storage")
        .rel(rel::MANUFACTURER, "iXsystems")
        .rel(rel::DEVICE_TYPE, "TrueNAS-SCALE")
}

pub fn pool(name: &str, status: &str) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Volume, name)
        .attr(attr::SECTION, POOLS_MARKER)
        .attr(attr::DESCRIPTION, format!("{}: {} (0/0 bytes)", name, status))
        .rel(rel::DEVICE, STORAGE_HOST)
}

pub fn volume_records() -> Vec<CanonicalRecord> {
    vec![host_device(), volume("grafana-data"), volume("prometheus-data")]
}

/// A container host the way the docker collector reports it, phase by phase
pub fn homelab_snapshot() -> SnapshotCollector {
    SnapshotCollector::new("docker")
        .with_phase("networks", network_records())
        .with_phase("containers", container_records())
        .with_phase("volumes", volume_records())
}

/// Store a pre-existing entity
pub fn seed(registry: &InMemoryRegistry, kind: EntityKind, fields: Value) -> EntityId {
    let fields = fields.as_object().cloned().expect("fixture fields must be an object");
    registry.insert(kind, fields)
}
