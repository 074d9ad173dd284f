// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network Value Objects with Validation Invariants
//!
//! Sources report addresses, MAC addresses, VLAN tags and MTUs in loosely
//! typed JSON. These value objects are the point where that input is
//! validated and brought into the canonical form the registry stores, so
//! that repeated runs compare equal and never trigger spurious updates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use thiserror::Error;

/// Network validation error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Invalid prefix length: {0} (must be 0-32 for IPv4, 0-128 for IPv6)")]
    InvalidPrefixLength(u8),

    #[error("Invalid netmask: {0}")]
    InvalidNetmask(String),

    #[error("Invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("Invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(i64),

    #[error("Invalid MTU: {0} (must be 68-9000)")]
    InvalidMtu(i64),
}

fn max_prefix(address: &IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

/// IP Address with CIDR notation value object
///
/// Invariants:
/// - Valid IP address format
/// - Prefix length within valid range for the address family
///
/// # Examples
///
/// ```rust
/// use cim_inventory_sync::domain::IpAddressWithCidr;
///
/// let ip = IpAddressWithCidr::new("192.168.1.10/24").unwrap();
/// assert_eq!(ip.address().to_string(), "192.168.1.10");
/// assert_eq!(ip.prefix_length(), Some(24));
///
/// let bare = IpAddressWithCidr::new("10.10.0.5").unwrap();
/// assert_eq!(bare.with_default_prefix(16).unwrap().as_cidr(), "10.10.0.5/16");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IpAddressWithCidr {
    address: IpAddr,
    prefix_length: Option<u8>,
}

impl IpAddressWithCidr {
    /// Parse an address with optional `/prefix` suffix
    pub fn new(cidr: impl AsRef<str>) -> Result<Self, NetworkError> {
        let cidr = cidr.as_ref().trim();

        if let Some((addr_str, prefix_str)) = cidr.split_once('/') {
            let address = IpAddr::from_str(addr_str)
                .map_err(|_| NetworkError::InvalidIpAddress(addr_str.to_string()))?;

            let prefix_length = prefix_str
                .parse::<u8>()
                .map_err(|_| NetworkError::InvalidCidr(cidr.to_string()))?;

            Self::from_parts(address, Some(prefix_length))
        } else {
            let address = IpAddr::from_str(cidr)
                .map_err(|_| NetworkError::InvalidIpAddress(cidr.to_string()))?;

            Ok(Self {
                address,
                prefix_length: None,
            })
        }
    }

    /// Create from separate address and prefix
    pub fn from_parts(address: IpAddr, prefix_length: Option<u8>) -> Result<Self, NetworkError> {
        if let Some(prefix) = prefix_length {
            if prefix > max_prefix(&address) {
                return Err(NetworkError::InvalidPrefixLength(prefix));
            }
        }

        Ok(Self {
            address,
            prefix_length,
        })
    }

    /// Fill in `prefix` when no prefix length is present
    ///
    /// An explicit prefix length always wins over the default.
    pub fn with_default_prefix(self, prefix: u8) -> Result<Self, NetworkError> {
        match self.prefix_length {
            Some(_) => Ok(self),
            None => Self::from_parts(self.address, Some(prefix)),
        }
    }

    /// Replace the prefix length
    pub fn with_prefix(self, prefix: u8) -> Result<Self, NetworkError> {
        Self::from_parts(self.address, Some(prefix))
    }

    /// Get the IP address
    pub fn address(&self) -> IpAddr {
        self.address
    }

    /// Get the prefix length
    pub fn prefix_length(&self) -> Option<u8> {
        self.prefix_length
    }

    /// Get as CIDR notation string
    pub fn as_cidr(&self) -> String {
        if let Some(prefix) = self.prefix_length {
            format!("{}/{}", self.address, prefix)
        } else {
            self.address.to_string()
        }
    }
}

impl fmt::Display for IpAddressWithCidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_cidr())
    }
}

impl FromStr for IpAddressWithCidr {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Parse a prefix length given either as a number (`"24"`) or as a dotted
/// IPv4 netmask (`"255.255.255.0"`)
pub fn parse_prefix_length(mask: &str) -> Result<u8, NetworkError> {
    let mask = mask.trim().trim_start_matches('/');

    if let Ok(prefix) = mask.parse::<u8>() {
        return Ok(prefix);
    }

    let netmask = Ipv4Addr::from_str(mask)
        .map_err(|_| NetworkError::InvalidNetmask(mask.to_string()))?;
    let bits = u32::from(netmask);

    // Contiguous ones followed by zeros only
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(NetworkError::InvalidNetmask(mask.to_string()));
    }

    Ok(bits.leading_ones() as u8)
}

/// MAC Address value object
///
/// Represents a 48-bit MAC address. The canonical form is upper-case and
/// colon-separated, which is what the registry stores and returns.
///
/// # Examples
///
/// ```rust
/// use cim_inventory_sync::domain::MacAddress;
///
/// let mac = MacAddress::new("00-1a-2b-3c-4d-5e").unwrap();
/// assert_eq!(mac.as_str(), "00:1A:2B:3C:4D:5E");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create a new MAC address with validation
    pub fn new(mac: impl AsRef<str>) -> Result<Self, NetworkError> {
        let mac = mac.as_ref();
        let mac_clean = mac.trim().replace([':', '-', '.'], "");

        // Exactly 12 hex digits
        if mac_clean.len() != 12 || !mac_clean.is_ascii() {
            return Err(NetworkError::InvalidMacAddress(mac.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, chunk) in mac_clean.as_bytes().chunks(2).enumerate() {
            let hex_str = std::str::from_utf8(chunk)
                .map_err(|_| NetworkError::InvalidMacAddress(mac.to_string()))?;
            octets[i] = u8::from_str_radix(hex_str, 16)
                .map_err(|_| NetworkError::InvalidMacAddress(mac.to_string()))?;
        }

        Ok(Self(octets))
    }

    /// Get the octets
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Canonical string (upper-case, colon-separated)
    pub fn as_str(&self) -> String {
        format!(
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }

    /// All-zero addresses are reported by some sources for "unknown"
    pub fn is_unspecified(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MacAddress {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// VLAN ID value object (IEEE 802.1Q)
///
/// Invariants:
/// - Valid VLAN ID range (1-4094), 0 and 4095 are reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VlanId(u16);

impl VlanId {
    /// Minimum valid VLAN ID
    pub const MIN: u16 = 1;

    /// Maximum valid VLAN ID
    pub const MAX: u16 = 4094;

    /// Create a new VLAN ID with validation
    pub fn new(id: i64) -> Result<Self, NetworkError> {
        if id < i64::from(Self::MIN) || id > i64::from(Self::MAX) {
            return Err(NetworkError::InvalidVlanId(id));
        }

        Ok(Self(id as u16))
    }

    /// Get the VLAN ID value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// MTU (Maximum Transmission Unit) value object
///
/// Invariants:
/// - Valid MTU range (68-9000 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mtu(u32);

impl Mtu {
    /// Minimum MTU (IPv4 minimum)
    pub const MIN: u32 = 68;

    /// Maximum MTU (jumbo frames)
    pub const MAX: u32 = 9000;

    /// Standard Ethernet MTU
    pub const STANDARD_ETHERNET: u32 = 1500;

    /// Create a new MTU with validation
    pub fn new(size: i64) -> Result<Self, NetworkError> {
        if size < i64::from(Self::MIN) || size > i64::from(Self::MAX) {
            return Err(NetworkError::InvalidMtu(size));
        }

        Ok(Self(size as u32))
    }

    /// Get the MTU value
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl Default for Mtu {
    fn default() -> Self {
        Self(Self::STANDARD_ETHERNET)
    }
}

impl fmt::Display for Mtu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
