// Copyright (c) 2025 - Cowboy AI, Inc.
//! Canonical Record - the source-independent inventory observation
//!
//! Collectors translate whatever their source speaks into a flat list of
//! records:
//!
//! ```text
//! { kind, name, attributes: map<string, scalar>, relations: map<string, key> }
//! ```
//!
//! Relations hold *natural keys* (names, not registry ids); the reconciler
//! resolves them. Attributes hold scalar values in source units; unit
//! conversion happens in the upsert engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known attribute names
pub mod attr {
    pub const STATUS: &str = "status";
    pub const COMMENTS: &str = "comments";
    pub const DESCRIPTION: &str = "description";
    pub const VCPUS: &str = "vcpus";
    pub const MEMORY_MB: &str = "memory_mb";
    /// CPU quota in hundred-thousandths of a core (container engines)
    pub const CPU_QUOTA: &str = "cpu_quota";
    pub const MEMORY_BYTES: &str = "memory_bytes";
    pub const MAC_ADDRESS: &str = "mac_address";
    pub const MTU: &str = "mtu";
    pub const ENABLED: &str = "enabled";
    /// Physical interface type (device interfaces only)
    pub const INTERFACE_TYPE: &str = "type";
    pub const PREFIX_LENGTH: &str = "prefix_length";
    /// Network the address was observed on, used for prefix policy lookup
    pub const NETWORK: &str = "network";
    pub const VID: &str = "vid";
    pub const ROLE_COLOR: &str = "role_color";
    /// Marker of the free-text section a volume line belongs to
    pub const SECTION: &str = "section";
    /// Attributes with this prefix are written into `custom_fields`
    pub const CUSTOM_FIELD_PREFIX: &str = "cf_";
}

/// Well-known relation names
pub mod rel {
    pub const SITE: &str = "site";
    pub const ROLE: &str = "role";
    pub const MANUFACTURER: &str = "manufacturer";
    pub const DEVICE_TYPE: &str = "device_type";
    pub const CLUSTER: &str = "cluster";
    pub const CLUSTER_TYPE: &str = "cluster_type";
    pub const DEVICE: &str = "device";
    pub const VIRTUAL_MACHINE: &str = "virtual_machine";
    pub const INTERFACE: &str = "interface";
    pub const VLAN_GROUP: &str = "vlan_group";
}

/// Kind of observed item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Device,
    VirtualMachine,
    Interface,
    Address,
    Prefix,
    VlanGroup,
    Vlan,
    /// Volume or pool summary line attached to a parent device
    Volume,
}

impl RecordKind {
    /// Processing rank inside a phase; owners before what they own
    pub fn rank(&self) -> u8 {
        match self {
            RecordKind::VlanGroup | RecordKind::Prefix => 0,
            RecordKind::Vlan => 1,
            RecordKind::Device | RecordKind::VirtualMachine => 2,
            RecordKind::Interface => 3,
            RecordKind::Address => 4,
            RecordKind::Volume => 5,
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Device => "device",
            RecordKind::VirtualMachine => "virtual_machine",
            RecordKind::Interface => "interface",
            RecordKind::Address => "address",
            RecordKind::Prefix => "prefix",
            RecordKind::VlanGroup => "vlan_group",
            RecordKind::Vlan => "vlan",
            RecordKind::Volume => "volume",
        };
        f.write_str(name)
    }
}

/// Scalar attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view; numeric text is accepted since several sources
    /// return numbers as strings
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Bool(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Bool(b) => serde_json::Value::from(*b),
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<u32> for Scalar {
    fn from(value: u32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// One observed item in a source snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub kind: RecordKind,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Scalar>,
    #[serde(default)]
    pub relations: BTreeMap<String, String>,
}

impl CanonicalRecord {
    pub fn new(kind: RecordKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes: BTreeMap::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Set an attribute
    pub fn attr(mut self, key: &str, value: impl Into<Scalar>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Set an attribute when a value is present
    pub fn attr_opt<V: Into<Scalar>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.attr(key, value),
            None => self,
        }
    }

    /// Set a relation to another record's natural key
    pub fn rel(mut self, key: &str, natural_key: impl Into<String>) -> Self {
        self.relations.insert(key.to_string(), natural_key.into());
        self
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(Scalar::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn int(&self, key: &str) -> Option<i64> {
        self.attributes.get(key).and_then(Scalar::as_i64)
    }

    pub fn flag(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Scalar::as_bool)
    }

    pub fn relation(&self, key: &str) -> Option<&str> {
        self.relations
            .get(key)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Attributes destined for `custom_fields`, with the prefix stripped
    pub fn custom_fields(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.attributes.iter().filter_map(|(key, value)| {
            key.strip_prefix(attr::CUSTOM_FIELD_PREFIX)
                .map(|field| (field, value))
        })
    }
}

/// Order records so that owners are processed before what they own.
/// The sort is stable: source order is kept inside a rank.
pub fn order_for_reconciliation(records: &mut [CanonicalRecord]) {
    records.sort_by_key(|record| record.kind.rank());
}
