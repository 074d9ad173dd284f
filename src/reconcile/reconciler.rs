// Copyright (c) 2025 - Cowboy AI, Inc.
//! Record → entity mapping
//!
//! The [`Reconciler`] turns one phase worth of [`CanonicalRecord`]s into
//! resolver calls. Dependency entities named by a record's relations are
//! ensured first (and cached for the run), then the record's own entity.
//!
//! | Record | Entities touched |
//! |---|---|
//! | device | Site, DeviceRole, Manufacturer, DeviceType, Device |
//! | virtual_machine | Site, ClusterType, Cluster, VirtualMachine |
//! | interface | DeviceInterface or VmInterface |
//! | address | IpAddress (assigned to an interface) |
//! | prefix | Prefix |
//! | vlan_group / vlan | VlanGroup / Vlan |
//! | volume | comments section of an existing Device |
//!
//! Record-level failures skip the record and are collected; phase-fatal
//! failures (connectivity) end the phase.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::convert::{memory_mb_from_bytes, vcpus_from_quota};
use super::desired::Desired;
use super::linker::{self, InterfaceSpec, PrefixPolicy};
use super::resolver::Resolver;
use super::upsert::section_content;
use crate::domain::{
    attr, order_for_reconciliation, rel, AssignedObject, CanonicalRecord, EntityId, EntityKind,
    IpAddressWithCidr, MacAddress, Mtu, Owner, OwnerKind, RecordKind, VlanId,
};
use crate::errors::{SyncError, SyncResult};
use crate::registry::{Filter, Registry};
use crate::report::{PhaseStats, RecordFailure};

/// Status written when a record does not carry one
pub const DEFAULT_STATUS: &str = "active";

/// Comments field the volume sections are merged into
const SECTION_FIELD: &str = "comments";

/// Reconciliation settings shared by every phase of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Site used when a record names none
    pub site: String,
    pub prefix_policy: PrefixPolicy,
    /// Write `cf_*` attributes into `custom_fields`
    pub custom_fields: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            site: "homelab".to_string(),
            prefix_policy: PrefixPolicy::default(),
            custom_fields: false,
        }
    }
}

fn missing(kind: EntityKind, record: &CanonicalRecord, dependency: &str) -> SyncError {
    SyncError::MissingDependency {
        kind,
        key: record.name.clone(),
        dependency: dependency.to_string(),
    }
}

fn required_relation<'a>(
    record: &'a CanonicalRecord,
    kind: EntityKind,
    relation: &str,
) -> SyncResult<&'a str> {
    record
        .relation(relation)
        .ok_or_else(|| missing(kind, record, relation))
}

/// Maps records of one source onto the registry
pub struct Reconciler<'r, R: Registry + ?Sized> {
    resolver: Resolver<'r, R>,
    options: ReconcileOptions,
    failures: Vec<RecordFailure>,
    skipped: u32,
}

impl<'r, R: Registry + ?Sized> Reconciler<'r, R> {
    pub fn new(registry: &'r R, options: ReconcileOptions) -> Self {
        Self {
            resolver: Resolver::new(registry),
            options,
            failures: Vec::new(),
            skipped: 0,
        }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Reconcile one phase snapshot
    ///
    /// Returns `Err` only for phase-fatal errors; counts and skipped records
    /// are collected with [`Reconciler::finish_phase`] either way.
    pub async fn reconcile(&mut self, mut records: Vec<CanonicalRecord>) -> SyncResult<()> {
        order_for_reconciliation(&mut records);
        let (volumes, records): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|record| record.kind == RecordKind::Volume);

        for record in &records {
            debug!(kind = %record.kind, name = %record.name, "reconciling record");
            match self.record(record).await {
                Ok(()) => {}
                Err(err) if err.is_phase_fatal() => return Err(err),
                Err(err) => self.skip(record.kind, &record.name, 1, &err),
            }
        }

        for ((device, marker), lines) in group_volumes(&volumes) {
            let count = lines.len() as u32;
            match self.volume_section(&device, &marker, &lines).await {
                Ok(()) => {}
                Err(err) if err.is_phase_fatal() => return Err(err),
                Err(err) => self.skip(RecordKind::Volume, &device, count, &err),
            }
        }

        Ok(())
    }

    /// Counts and failures since the previous call
    pub fn finish_phase(&mut self) -> (PhaseStats, Vec<RecordFailure>) {
        let mut stats = self.resolver.take_stats();
        stats.skipped = std::mem::take(&mut self.skipped);
        (stats, std::mem::take(&mut self.failures))
    }

    fn skip(&mut self, kind: RecordKind, name: &str, count: u32, err: &SyncError) {
        warn!(kind = %kind, name = %name, error = %err, "skipping record");
        self.skipped += count;
        self.failures.push(RecordFailure::new(kind, name, err));
    }

    async fn record(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        match record.kind {
            RecordKind::Device => self.device(record).await,
            RecordKind::VirtualMachine => self.virtual_machine(record).await,
            RecordKind::Interface => self.interface(record).await,
            RecordKind::Address => self.address(record).await,
            RecordKind::Prefix => self.prefix(record).await,
            RecordKind::VlanGroup => self.vlan_group(record).await,
            RecordKind::Vlan => self.vlan(record).await,
            RecordKind::Volume => Err(SyncError::DataShape(format!(
                "volume '{}' outside a section",
                record.name
            ))),
        }
    }

    fn with_custom_fields(&self, mut desired: Desired, record: &CanonicalRecord) -> Desired {
        if self.options.custom_fields {
            for (field, value) in record.custom_fields() {
                desired = desired.custom_field(field, value.to_json());
            }
        }
        desired
    }

    async fn site(&mut self, record: &CanonicalRecord) -> SyncResult<EntityId> {
        let name = record
            .relation(rel::SITE)
            .unwrap_or(self.options.site.as_str())
            .to_string();
        self.resolver
            .dependency(&Desired::keyed(EntityKind::Site, &name))
            .await
    }

    async fn device(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let role = required_relation(record, EntityKind::Device, rel::ROLE)?;
        let manufacturer = required_relation(record, EntityKind::Device, rel::MANUFACTURER)?;
        let model = required_relation(record, EntityKind::Device, rel::DEVICE_TYPE)?;

        let site = self.site(record).await?;

        let mut role_desired = Desired::keyed(EntityKind::DeviceRole, role);
        if let Some(color) = record.text(attr::ROLE_COLOR) {
            role_desired = role_desired.on_create("color", color);
        }
        let role = self.resolver.dependency(&role_desired).await?;

        let manufacturer = self
            .resolver
            .dependency(&Desired::keyed(EntityKind::Manufacturer, manufacturer))
            .await?;
        let device_type = self
            .resolver
            .dependency(
                &Desired::keyed(EntityKind::DeviceType, model)
                    .relate_on_create("manufacturer", manufacturer),
            )
            .await?;

        let desired = Desired::keyed(EntityKind::Device, &record.name)
            .set("status", record.text(attr::STATUS).unwrap_or(DEFAULT_STATUS))
            .set_opt("comments", record.text(attr::COMMENTS))
            .set_opt("description", record.text(attr::DESCRIPTION))
            .relate_on_create("device_type", device_type)
            .relate_on_create("role", role)
            .relate_on_create("site", site);
        let desired = self.with_custom_fields(desired, record);

        let (id, _) = self.resolver.upsert(&desired).await?;
        debug!(device = %record.name, id = %id, "device reconciled");
        Ok(())
    }

    async fn virtual_machine(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let kind = EntityKind::VirtualMachine;
        let cluster = required_relation(record, kind, rel::CLUSTER)?;
        let cluster_type = required_relation(record, kind, rel::CLUSTER_TYPE)?;

        let site = self.site(record).await?;
        let cluster_type = self
            .resolver
            .dependency(&Desired::keyed(EntityKind::ClusterType, cluster_type))
            .await?;
        let cluster = self
            .resolver
            .dependency(
                &Desired::keyed(EntityKind::Cluster, cluster)
                    .relate_on_create("type", cluster_type)
                    .relate_on_create("site", site),
            )
            .await?;

        let vcpus = record.int(attr::VCPUS).or_else(|| {
            record
                .attributes
                .get(attr::CPU_QUOTA)
                .map(|quota| vcpus_from_quota(quota.as_i64().unwrap_or(0)))
        });
        let memory = record.int(attr::MEMORY_MB).or_else(|| {
            record
                .attributes
                .get(attr::MEMORY_BYTES)
                .map(|bytes| memory_mb_from_bytes(bytes.as_i64().unwrap_or(0)))
        });

        let desired = Desired::keyed(kind, &record.name)
            .set("status", record.text(attr::STATUS).unwrap_or(DEFAULT_STATUS))
            .set_opt("vcpus", vcpus)
            .set_opt("memory", memory)
            .set_opt("comments", record.text(attr::COMMENTS))
            .relate_on_create("cluster", cluster);
        let desired = self.with_custom_fields(desired, record);

        self.resolver.upsert(&desired).await?;
        Ok(())
    }

    /// Owner named by the record's `device` or `virtual_machine` relation
    async fn owner(&mut self, record: &CanonicalRecord, kind: EntityKind) -> SyncResult<Owner> {
        let (owner_kind, name) = if let Some(name) = record.relation(rel::DEVICE) {
            (OwnerKind::Device, name)
        } else if let Some(name) = record.relation(rel::VIRTUAL_MACHINE) {
            (OwnerKind::VirtualMachine, name)
        } else {
            return Err(SyncError::DataShape(format!(
                "{} '{}' names no device or virtual machine",
                record.kind, record.name
            )));
        };

        let filter = Filter::new().with("name", name);
        match self
            .resolver
            .lookup(owner_kind.entity_kind(), &filter)
            .await?
        {
            Some(id) => Ok(Owner {
                kind: owner_kind,
                id,
            }),
            None => Err(missing(
                kind,
                record,
                &format!("{} '{}'", owner_kind.entity_kind(), name),
            )),
        }
    }

    async fn interface(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let owner = self.owner(record, EntityKind::DeviceInterface).await?;

        let mut spec = InterfaceSpec::new(record.name.as_str());
        spec.enabled = record.flag(attr::ENABLED);
        spec.description = record.text(attr::DESCRIPTION).map(str::to_string);
        spec.interface_type = record.text(attr::INTERFACE_TYPE).map(str::to_string);

        // A bad MAC or MTU drops that attribute, not the interface
        if let Some(raw) = record.text(attr::MAC_ADDRESS) {
            match MacAddress::new(raw) {
                Ok(mac) if !mac.is_unspecified() => spec.mac_address = Some(mac),
                Ok(_) => {}
                Err(err) => warn!(interface = %record.name, error = %err, "ignoring MAC address"),
            }
        }
        if let Some(raw) = record.int(attr::MTU) {
            match Mtu::new(raw) {
                Ok(mtu) => spec.mtu = Some(mtu),
                Err(err) => warn!(interface = %record.name, error = %err, "ignoring MTU"),
            }
        }

        linker::link_interface(&mut self.resolver, owner, &spec).await?;
        Ok(())
    }

    async fn address(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let address = linker::normalize_address(
            &record.name,
            record.attributes.get(attr::PREFIX_LENGTH),
            record.text(attr::NETWORK),
            &self.options.prefix_policy,
        )?;

        let interface = required_relation(record, EntityKind::IpAddress, rel::INTERFACE)?;
        let owner = self.owner(record, EntityKind::IpAddress).await?;
        let key = linker::interface_key(owner, interface).key;
        let interface_id = self
            .resolver
            .lookup(owner.kind.interface_kind(), &key)
            .await?
            .ok_or_else(|| missing(EntityKind::IpAddress, record, &format!("interface {}", key)))?;

        linker::link_address(
            &mut self.resolver,
            AssignedObject::interface(owner.kind, interface_id),
            &address,
            record.text(attr::STATUS).unwrap_or(DEFAULT_STATUS),
            record.text(attr::DESCRIPTION),
        )
        .await?;
        Ok(())
    }

    async fn prefix(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let prefix = IpAddressWithCidr::new(&record.name)?;
        if prefix.prefix_length().is_none() {
            return Err(SyncError::DataShape(format!(
                "prefix '{}' without a length",
                record.name
            )));
        }

        let desired = Desired::keyed(EntityKind::Prefix, &prefix.as_cidr())
            .set("status", record.text(attr::STATUS).unwrap_or(DEFAULT_STATUS))
            .set_opt("description", record.text(attr::DESCRIPTION));
        let desired = self.with_custom_fields(desired, record);

        self.resolver.upsert(&desired).await?;
        Ok(())
    }

    async fn vlan_group(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let desired = Desired::keyed(EntityKind::VlanGroup, &record.name)
            .set_opt("description", record.text(attr::DESCRIPTION));
        self.resolver.upsert(&desired).await?;
        Ok(())
    }

    async fn vlan(&mut self, record: &CanonicalRecord) -> SyncResult<()> {
        let vid = record
            .int(attr::VID)
            .ok_or_else(|| SyncError::DataShape(format!("vlan '{}' without a tag", record.name)))?;
        let vid = VlanId::new(vid)?;

        let mut desired = Desired::new(EntityKind::Vlan)
            .key("vid", vid)
            .set("vid", vid.value())
            .set("name", record.name.as_str())
            .set("status", record.text(attr::STATUS).unwrap_or(DEFAULT_STATUS))
            .set_opt("description", record.text(attr::DESCRIPTION));

        if let Some(group) = record.relation(rel::VLAN_GROUP) {
            let group = self
                .resolver
                .dependency(&Desired::keyed(EntityKind::VlanGroup, group))
                .await?;
            desired = desired.relate("group", group);
        }

        self.resolver.upsert(&desired).await?;
        Ok(())
    }

    async fn volume_section(&mut self, device: &str, marker: &str, lines: &[String]) -> SyncResult<()> {
        let desired = Desired::new(EntityKind::Device)
            .key("name", device)
            .section(SECTION_FIELD, marker, section_content(lines));
        self.resolver.update_existing(&desired).await?;
        Ok(())
    }
}

/// Volume lines grouped by (device, section marker), in first-seen order
fn group_volumes(volumes: &[CanonicalRecord]) -> Vec<((String, String), Vec<String>)> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();

    for volume in volumes {
        let device = volume.relation(rel::DEVICE).unwrap_or_default().to_string();
        let marker = volume.text(attr::SECTION).unwrap_or_default().to_string();
        let line = volume
            .text(attr::DESCRIPTION)
            .unwrap_or(volume.name.as_str())
            .to_string();

        let key = (device, marker);
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(line);
    }

    order
        .into_iter()
        .map(|key| {
            let lines = groups.remove(&key).unwrap_or_default();
            (key, lines)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use serde_json::json;

    fn host() -> CanonicalRecord {
        CanonicalRecord::new(RecordKind::Device, "docker01")
            .rel(rel::ROLE, "container-host")
            .rel(rel::MANUFACTURER, "Docker")
            .rel(rel::DEVICE_TYPE, "Docker Host")
    }

    fn container() -> CanonicalRecord {
        CanonicalRecord::new(RecordKind::VirtualMachine, "grafana")
            .attr(attr::STATUS, "active")
            .attr(attr::CPU_QUOTA, 200_000i64)
            .attr(attr::MEMORY_BYTES, 536_870_912i64)
            .attr("cf_image", "grafana/grafana")
            .rel(rel::CLUSTER, "docker01")
            .rel(rel::CLUSTER_TYPE, "Docker")
    }

    #[tokio::test]
    async fn test_device_creates_dependencies_first() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        reconciler.reconcile(vec![host()]).await.unwrap();
        let (stats, failures) = reconciler.finish_phase();
        assert!(failures.is_empty());
        assert_eq!(stats.created, 5);

        let kinds: Vec<EntityKind> = registry.creates().into_iter().map(|(k, _)| k).collect();
        assert_eq!(
            kinds,
            vec![
                EntityKind::Site,
                EntityKind::DeviceRole,
                EntityKind::Manufacturer,
                EntityKind::DeviceType,
                EntityKind::Device,
            ]
        );
    }

    #[tokio::test]
    async fn test_vm_units_are_converted() {
        let registry = InMemoryRegistry::new();
        let options = ReconcileOptions {
            custom_fields: true,
            ..ReconcileOptions::default()
        };
        let mut reconciler = Reconciler::new(&registry, options);

        reconciler.reconcile(vec![container()]).await.unwrap();
        let vm = registry
            .find(EntityKind::VirtualMachine, "name", "grafana")
            .unwrap();
        assert_eq!(vm.field("vcpus"), Some(&json!(2)));
        assert_eq!(vm.field("memory"), Some(&json!(512)));
        assert_eq!(
            vm.field("custom_fields"),
            Some(&json!({"image": "grafana/grafana"}))
        );
    }

    #[tokio::test]
    async fn test_custom_fields_off_by_default() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        reconciler.reconcile(vec![container()]).await.unwrap();
        let vm = registry
            .find(EntityKind::VirtualMachine, "name", "grafana")
            .unwrap();
        assert_eq!(vm.field("custom_fields"), None);
    }

    #[tokio::test]
    async fn test_missing_relation_skips_record_only() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let orphan = CanonicalRecord::new(RecordKind::Device, "ghost").rel(rel::ROLE, "switch");
        reconciler.reconcile(vec![orphan, host()]).await.unwrap();

        let (stats, failures) = reconciler.finish_phase();
        assert_eq!(stats.skipped, 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error, "missing_dependency");
        assert!(registry.find(EntityKind::Device, "name", "docker01").is_some());
    }

    #[tokio::test]
    async fn test_interface_and_address_link_to_owner() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let records = vec![
            CanonicalRecord::new(RecordKind::Address, "192.168.0.10")
                .rel(rel::DEVICE, "docker01")
                .rel(rel::INTERFACE, "Management"),
            CanonicalRecord::new(RecordKind::Interface, "Management")
                .attr(attr::MAC_ADDRESS, "aa-bb-cc-dd-ee-ff")
                .attr(attr::MTU, 20_000i64)
                .rel(rel::DEVICE, "docker01"),
            host(),
        ];
        reconciler.reconcile(records).await.unwrap();
        let (_, failures) = reconciler.finish_phase();
        assert!(failures.is_empty(), "{:?}", failures);

        let interface = registry
            .find(EntityKind::DeviceInterface, "name", "Management")
            .unwrap();
        assert_eq!(interface.text("mac_address"), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(interface.field("mtu"), None);

        let ip = registry
            .find(EntityKind::IpAddress, "address", "192.168.0.10/24")
            .unwrap();
        assert_eq!(ip.text("assigned_object_type"), Some("dcim.interface"));
        assert_eq!(ip.field("assigned_object_id"), Some(&json!(interface.id.0)));
    }

    #[tokio::test]
    async fn test_vlan_needs_a_tag() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let records = vec![
            CanonicalRecord::new(RecordKind::Vlan, "iot")
                .attr(attr::VID, 30i64)
                .rel(rel::VLAN_GROUP, "OPNsense VLANs"),
            CanonicalRecord::new(RecordKind::Vlan, "untagged"),
        ];
        reconciler.reconcile(records).await.unwrap();

        let (stats, failures) = reconciler.finish_phase();
        assert_eq!((stats.created, stats.skipped), (2, 1));
        assert_eq!(failures[0].error, "data_shape");
        let vlan = registry.find(EntityKind::Vlan, "vid", "30").unwrap();
        assert!(vlan.field("group").is_some());
    }

    #[tokio::test]
    async fn test_volumes_merge_into_host_comments() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());
        reconciler.reconcile(vec![host()]).await.unwrap();
        reconciler.finish_phase();

        let volume = |name: &str| {
            CanonicalRecord::new(RecordKind::Volume, name)
                .attr(attr::SECTION, "=== Docker Volumes ===")
                .attr(attr::DESCRIPTION, format!("{} (local): /var/lib/{}", name, name))
                .rel(rel::DEVICE, "docker01")
        };
        reconciler
            .reconcile(vec![volume("data"), volume("logs")])
            .await
            .unwrap();
        let (stats, _) = reconciler.finish_phase();
        assert_eq!(stats.updated, 1);

        let device = registry.find(EntityKind::Device, "name", "docker01").unwrap();
        assert_eq!(
            device.text("comments"),
            Some("=== Docker Volumes ===\ndata (local): /var/lib/data\nlogs (local): /var/lib/logs")
        );

        reconciler
            .reconcile(vec![volume("data"), volume("logs")])
            .await
            .unwrap();
        let (stats, _) = reconciler.finish_phase();
        assert_eq!((stats.updated, stats.unchanged), (0, 1));
    }

    #[tokio::test]
    async fn test_registry_outage_is_phase_fatal() {
        let registry = InMemoryRegistry::new();
        registry.set_offline(true);
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        let err = reconciler.reconcile(vec![host()]).await.unwrap_err();
        assert!(matches!(err, SyncError::Connectivity(_)));
        let (stats, failures) = reconciler.finish_phase();
        assert_eq!(stats.writes(), 0);
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_is_unchanged() {
        let registry = InMemoryRegistry::new();
        let mut reconciler = Reconciler::new(&registry, ReconcileOptions::default());

        reconciler.reconcile(vec![host(), container()]).await.unwrap();
        reconciler.finish_phase();
        reconciler.reconcile(vec![host(), container()]).await.unwrap();
        let (stats, _) = reconciler.finish_phase();
        assert_eq!(stats.writes(), 0);
        assert_eq!(stats.unchanged, 2);
    }
}
