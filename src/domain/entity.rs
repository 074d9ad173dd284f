// Copyright (c) 2025 - Cowboy AI, Inc.
//! Registry Entity Taxonomy
//!
//! Every collection the engine manages is an [`EntityKind`]. The kind carries
//! the three facts the generic resolver is parameterized by:
//!
//! - **natural key** - the filter fields that uniquely identify an entity
//! - **dependencies** - the relation fields that must point at existing
//!   entities before this one may be created
//! - **tier** - the topological rank derived from the dependencies
//!
//! ```text
//! tier 0  Manufacturer  Site  DeviceRole  ClusterType  VlanGroup  Prefix
//! tier 1  DeviceType    Cluster           Vlan
//! tier 2  Device        VirtualMachine
//! tier 3  DeviceInterface  VmInterface
//! tier 4  IpAddress
//! ```
//!
//! Polymorphic relations are tagged unions: an interface has exactly one
//! [`Owner`], an address has at most one [`AssignedObject`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque registry identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry entity collections managed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Manufacturer,
    Site,
    DeviceRole,
    DeviceType,
    Device,
    ClusterType,
    Cluster,
    VirtualMachine,
    DeviceInterface,
    VmInterface,
    IpAddress,
    VlanGroup,
    Vlan,
    Prefix,
}

/// A relation field that must reference an existing entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    /// Field on the dependent entity holding the referenced id
    pub field: &'static str,
    /// Kind of the referenced entity
    pub kind: EntityKind,
    /// Whether creation is refused without it
    pub required: bool,
}

const fn required(field: &'static str, kind: EntityKind) -> Dependency {
    Dependency {
        field,
        kind,
        required: true,
    }
}

const fn optional(field: &'static str, kind: EntityKind) -> Dependency {
    Dependency {
        field,
        kind,
        required: false,
    }
}

impl EntityKind {
    /// All kinds in tier order
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Manufacturer,
        EntityKind::Site,
        EntityKind::DeviceRole,
        EntityKind::ClusterType,
        EntityKind::VlanGroup,
        EntityKind::Prefix,
        EntityKind::DeviceType,
        EntityKind::Cluster,
        EntityKind::Vlan,
        EntityKind::Device,
        EntityKind::VirtualMachine,
        EntityKind::DeviceInterface,
        EntityKind::VmInterface,
        EntityKind::IpAddress,
    ];

    /// REST endpoint path below `/api/`
    pub fn endpoint(&self) -> &'static str {
        match self {
            EntityKind::Manufacturer => "dcim/manufacturers",
            EntityKind::Site => "dcim/sites",
            EntityKind::DeviceRole => "dcim/device-roles",
            EntityKind::DeviceType => "dcim/device-types",
            EntityKind::Device => "dcim/devices",
            EntityKind::ClusterType => "virtualization/cluster-types",
            EntityKind::Cluster => "virtualization/clusters",
            EntityKind::VirtualMachine => "virtualization/virtual-machines",
            EntityKind::DeviceInterface => "dcim/interfaces",
            EntityKind::VmInterface => "virtualization/interfaces",
            EntityKind::IpAddress => "ipam/ip-addresses",
            EntityKind::VlanGroup => "ipam/vlan-groups",
            EntityKind::Vlan => "ipam/vlans",
            EntityKind::Prefix => "ipam/prefixes",
        }
    }

    /// Filter fields forming the natural key
    pub fn key_fields(&self) -> &'static [&'static str] {
        match self {
            EntityKind::DeviceType => &["model"],
            EntityKind::DeviceInterface => &["device_id", "name"],
            EntityKind::VmInterface => &["virtual_machine_id", "name"],
            EntityKind::IpAddress => &["address"],
            EntityKind::Vlan => &["vid"],
            EntityKind::Prefix => &["prefix"],
            _ => &["name"],
        }
    }

    /// Relations that must be resolved before this kind is created
    pub fn dependencies(&self) -> &'static [Dependency] {
        const DEVICE_TYPE: [Dependency; 1] = [required("manufacturer", EntityKind::Manufacturer)];
        const DEVICE: [Dependency; 3] = [
            required("device_type", EntityKind::DeviceType),
            required("role", EntityKind::DeviceRole),
            required("site", EntityKind::Site),
        ];
        const CLUSTER: [Dependency; 2] = [
            required("type", EntityKind::ClusterType),
            required("site", EntityKind::Site),
        ];
        const VIRTUAL_MACHINE: [Dependency; 1] = [required("cluster", EntityKind::Cluster)];
        const DEVICE_INTERFACE: [Dependency; 1] = [required("device", EntityKind::Device)];
        const VM_INTERFACE: [Dependency; 1] =
            [required("virtual_machine", EntityKind::VirtualMachine)];
        const VLAN: [Dependency; 1] = [optional("group", EntityKind::VlanGroup)];

        match self {
            EntityKind::DeviceType => &DEVICE_TYPE,
            EntityKind::Device => &DEVICE,
            EntityKind::Cluster => &CLUSTER,
            EntityKind::VirtualMachine => &VIRTUAL_MACHINE,
            EntityKind::DeviceInterface => &DEVICE_INTERFACE,
            EntityKind::VmInterface => &VM_INTERFACE,
            EntityKind::Vlan => &VLAN,
            // The address assignment is polymorphic and handled by the linker
            _ => &[],
        }
    }

    /// Topological rank: a kind only depends on kinds of a lower tier
    pub fn tier(&self) -> u8 {
        match self {
            EntityKind::Manufacturer
            | EntityKind::Site
            | EntityKind::DeviceRole
            | EntityKind::ClusterType
            | EntityKind::VlanGroup
            | EntityKind::Prefix => 0,
            EntityKind::DeviceType | EntityKind::Cluster | EntityKind::Vlan => 1,
            EntityKind::Device | EntityKind::VirtualMachine => 2,
            EntityKind::DeviceInterface | EntityKind::VmInterface => 3,
            EntityKind::IpAddress => 4,
        }
    }

    /// Whether the registry requires a `slug` on create
    pub fn has_slug(&self) -> bool {
        matches!(
            self,
            EntityKind::Manufacturer
                | EntityKind::Site
                | EntityKind::DeviceRole
                | EntityKind::DeviceType
                | EntityKind::ClusterType
                | EntityKind::VlanGroup
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Manufacturer => "manufacturer",
            EntityKind::Site => "site",
            EntityKind::DeviceRole => "device role",
            EntityKind::DeviceType => "device type",
            EntityKind::Device => "device",
            EntityKind::ClusterType => "cluster type",
            EntityKind::Cluster => "cluster",
            EntityKind::VirtualMachine => "virtual machine",
            EntityKind::DeviceInterface => "device interface",
            EntityKind::VmInterface => "vm interface",
            EntityKind::IpAddress => "ip address",
            EntityKind::VlanGroup => "vlan group",
            EntityKind::Vlan => "vlan",
            EntityKind::Prefix => "prefix",
        };
        f.write_str(name)
    }
}

/// Kind of entity that can own an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Device,
    VirtualMachine,
}

impl OwnerKind {
    /// Entity kind of the owner itself
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            OwnerKind::Device => EntityKind::Device,
            OwnerKind::VirtualMachine => EntityKind::VirtualMachine,
        }
    }

    /// Interface collection for interfaces owned by this kind
    pub fn interface_kind(&self) -> EntityKind {
        match self {
            OwnerKind::Device => EntityKind::DeviceInterface,
            OwnerKind::VirtualMachine => EntityKind::VmInterface,
        }
    }

    /// Relation field naming the owner on an interface
    pub fn relation_field(&self) -> &'static str {
        match self {
            OwnerKind::Device => "device",
            OwnerKind::VirtualMachine => "virtual_machine",
        }
    }

    /// Filter field selecting interfaces by owner id
    pub fn filter_field(&self) -> &'static str {
        match self {
            OwnerKind::Device => "device_id",
            OwnerKind::VirtualMachine => "virtual_machine_id",
        }
    }
}

/// The owner of an interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    pub kind: OwnerKind,
    pub id: EntityId,
}

impl Owner {
    pub fn device(id: EntityId) -> Self {
        Self {
            kind: OwnerKind::Device,
            id,
        }
    }

    pub fn virtual_machine(id: EntityId) -> Self {
        Self {
            kind: OwnerKind::VirtualMachine,
            id,
        }
    }
}

/// The object an IP address is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AssignedObject {
    DeviceInterface(EntityId),
    VmInterface(EntityId),
}

impl AssignedObject {
    /// Assignment for the interface `id` owned by an entity of `owner` kind
    pub fn interface(owner: OwnerKind, id: EntityId) -> Self {
        match owner {
            OwnerKind::Device => AssignedObject::DeviceInterface(id),
            OwnerKind::VirtualMachine => AssignedObject::VmInterface(id),
        }
    }

    /// Registry content-type label
    pub fn object_type(&self) -> &'static str {
        match self {
            AssignedObject::DeviceInterface(_) => "dcim.interface",
            AssignedObject::VmInterface(_) => "virtualization.vminterface",
        }
    }

    pub fn id(&self) -> EntityId {
        match self {
            AssignedObject::DeviceInterface(id) | AssignedObject::VmInterface(id) => *id,
        }
    }

    /// Rebuild from the registry's `(assigned_object_type, assigned_object_id)`
    pub fn from_parts(object_type: &str, id: EntityId) -> Option<Self> {
        match object_type {
            "dcim.interface" => Some(AssignedObject::DeviceInterface(id)),
            "virtualization.vminterface" => Some(AssignedObject::VmInterface(id)),
            _ => None,
        }
    }
}
