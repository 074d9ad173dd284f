// Copyright (c) 2025 - Cowboy AI, Inc.
//! Relationship Linker
//!
//! Attaches interfaces to their polymorphic owner and addresses to
//! interfaces:
//!
//! ```text
//! Owner { Device | VirtualMachine }
//!   └─ Interface  key (owner id, name)        dcim/interfaces | virtualization/interfaces
//!        └─ IpAddress  key (address/prefix)   assigned_object = AssignedObject
//! ```
//!
//! Addresses are keyed without their assignment, so an address that moves
//! to another interface is re-pointed rather than duplicated.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::desired::Desired;
use super::resolver::Resolver;
use crate::domain::{
    parse_prefix_length, AssignedObject, EntityId, EntityKind, IpAddressWithCidr, MacAddress, Mtu,
    NetworkError, Owner, OwnerKind, Scalar,
};
use crate::errors::SyncResult;
use crate::registry::Registry;
use crate::report::Outcome;

/// Interface type used when a source does not report one
pub const DEFAULT_INTERFACE_TYPE: &str = "other";

/// Prefix length applied to addresses reported without one
///
/// The per-network table is consulted first, then the source default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixPolicy {
    pub default_prefix: u8,
    #[serde(default)]
    pub by_network: BTreeMap<String, u8>,
}

impl PrefixPolicy {
    pub fn new(default_prefix: u8) -> Self {
        Self {
            default_prefix,
            by_network: BTreeMap::new(),
        }
    }

    /// Override the prefix length for addresses seen on `network`
    pub fn with_network(mut self, network: impl Into<String>, prefix: u8) -> Self {
        self.by_network.insert(network.into(), prefix);
        self
    }

    pub fn prefix_for(&self, network: Option<&str>) -> u8 {
        network
            .and_then(|name| self.by_network.get(name))
            .copied()
            .unwrap_or(self.default_prefix)
    }
}

impl Default for PrefixPolicy {
    fn default() -> Self {
        Self::new(24)
    }
}

/// Bring a reported address into CIDR form
///
/// Precedence: CIDR suffix on `raw`, then `explicit` (prefix length or
/// dotted netmask), then the policy for `network`.
pub fn normalize_address(
    raw: &str,
    explicit: Option<&Scalar>,
    network: Option<&str>,
    policy: &PrefixPolicy,
) -> Result<IpAddressWithCidr, NetworkError> {
    let address = IpAddressWithCidr::new(raw)?;

    let explicit = match explicit {
        Some(Scalar::Int(len)) => {
            Some(u8::try_from(*len).map_err(|_| NetworkError::InvalidCidr(len.to_string()))?)
        }
        Some(Scalar::Text(mask)) if !mask.trim().is_empty() => Some(parse_prefix_length(mask)?),
        _ => None,
    };

    address.with_default_prefix(explicit.unwrap_or_else(|| policy.prefix_for(network)))
}

/// Observed state of one interface
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub name: String,
    pub mac_address: Option<MacAddress>,
    pub mtu: Option<Mtu>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
    /// Physical type, device interfaces only
    pub interface_type: Option<String>,
}

impl InterfaceSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Natural key of the interface `name` owned by `owner`
pub fn interface_key(owner: Owner, name: &str) -> Desired {
    Desired::new(owner.kind.interface_kind())
        .key(owner.kind.filter_field(), owner.id)
        .key("name", name)
}

/// Ensure the interface exists on `owner` with the observed attributes
pub async fn link_interface<R>(
    resolver: &mut Resolver<'_, R>,
    owner: Owner,
    spec: &InterfaceSpec,
) -> SyncResult<(EntityId, Outcome)>
where
    R: Registry + ?Sized,
{
    let mut desired = interface_key(owner, &spec.name)
        .set("name", spec.name.as_str())
        .relate_on_create(owner.kind.relation_field(), owner.id)
        .set_opt("mac_address", spec.mac_address.as_ref().map(MacAddress::as_str))
        .set_opt("mtu", spec.mtu.map(|mtu| mtu.value()))
        .set_opt("enabled", spec.enabled)
        .set_opt("description", spec.description.clone());

    if owner.kind == OwnerKind::Device {
        let interface_type = spec
            .interface_type
            .as_deref()
            .unwrap_or(DEFAULT_INTERFACE_TYPE);
        desired = desired.on_create("type", interface_type);
    }

    resolver.upsert(&desired).await
}

/// Ensure the address exists and is assigned to `assigned`
pub async fn link_address<R>(
    resolver: &mut Resolver<'_, R>,
    assigned: AssignedObject,
    address: &IpAddressWithCidr,
    status: &str,
    description: Option<&str>,
) -> SyncResult<(EntityId, Outcome)>
where
    R: Registry + ?Sized,
{
    let cidr = address.as_cidr();
    let desired = Desired::new(EntityKind::IpAddress)
        .key("address", &cidr)
        .set("address", cidr.as_str())
        .set("status", status)
        .set("assigned_object_type", assigned.object_type())
        .set("assigned_object_id", assigned.id().0)
        .set_opt("description", description);

    resolver.upsert(&desired).await
}
