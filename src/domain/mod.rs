// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory Domain Models
//!
//! # Value Objects with Invariants
//!
//! - [`IpAddressWithCidr`] - IPv4/IPv6 with CIDR notation
//! - [`MacAddress`] - 48-bit MAC address in registry canonical form
//! - [`VlanId`] - IEEE 802.1Q VLAN ID (1-4094)
//! - [`Mtu`] - Maximum Transmission Unit (68-9000 bytes)
//!
//! # Registry Taxonomy
//!
//! - [`EntityKind`] - collections, natural keys, dependency order
//! - [`Owner`] / [`AssignedObject`] - polymorphic relations as tagged unions
//!
//! # Observations
//!
//! - [`CanonicalRecord`] - what a collector saw, independent of its protocol

pub mod entity;
pub mod network;
pub mod record;

pub use entity::{AssignedObject, Dependency, EntityId, EntityKind, Owner, OwnerKind};
pub use network::{parse_prefix_length, IpAddressWithCidr, MacAddress, Mtu, NetworkError, VlanId};
pub use record::{attr, order_for_reconciliation, rel, CanonicalRecord, RecordKind, Scalar};
