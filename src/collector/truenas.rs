// Copyright (c) 2025 - Cowboy AI, Inc.
//! TrueNAS SCALE collector
//!
//! Bearer-token REST under `/api/v2.0/`. The appliance is one storage
//! device; pools become summary lines in its comments, interfaces and
//! their INET aliases are linked to it, and VMs land in the `TrueNAS-VMs`
//! cluster.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::http::{self, HttpSettings};
use super::{int, scalar, text, unknown_phase, AdapterError, Collector};
use crate::domain::{attr, rel, CanonicalRecord, RecordKind};

pub const PHASE_STORAGE_POOLS: &str = "storage-pools";
pub const PHASE_INTERFACES: &str = "interfaces";
pub const PHASE_VMS: &str = "vms";

pub const POOLS_MARKER: &str = "=== Storage Pools ===";
pub const VM_CLUSTER: &str = "TrueNAS-VMs";
pub const VM_CLUSTER_TYPE: &str = "KVM";

/// TrueNAS collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrueNasConfig {
    pub url: String,
    pub api_key: String,
    /// Device name of the appliance in the registry
    pub host_name: String,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for TrueNasConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            host_name: "truenas01".to_string(),
            http: HttpSettings::default(),
        }
    }
}

fn appliance_record(name: &str) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Device, name)
        .attr(attr::ROLE_COLOR, "4caf50")
        .rel(rel::ROLE, "storage")
        .rel(rel::MANUFACTURER, "iXsystems")
        .rel(rel::DEVICE_TYPE, "TrueNAS-SCALE")
}

fn list(body: &Value, what: &str) -> Result<Vec<Value>, AdapterError> {
    body.as_array()
        .cloned()
        .ok_or_else(|| AdapterError::Malformed(format!("{} is not a list", what)))
}

/// Pool summary lines for `GET pool`
pub fn pool_records(pools: &[Value], device: &str) -> Vec<CanonicalRecord> {
    pools
        .iter()
        .filter_map(|pool| {
            let name = text(pool, "name")?;
            let status = text(pool, "status").unwrap_or("UNKNOWN");
            let stats = pool
                .pointer("/topology/data/0/stats")
                .cloned()
                .unwrap_or(Value::Null);
            let line = format!(
                "{}: {} ({}/{} bytes)",
                name,
                status,
                int(&stats, "allocated").unwrap_or(0),
                int(&stats, "size").unwrap_or(0)
            );
            Some(
                CanonicalRecord::new(RecordKind::Volume, name)
                    .attr(attr::SECTION, POOLS_MARKER)
                    .attr(attr::DESCRIPTION, line)
                    .rel(rel::DEVICE, device),
            )
        })
        .collect()
}

/// Interface and address records for `GET interface`
pub fn interface_records(interfaces: &[Value], device: &str) -> Vec<CanonicalRecord> {
    let mut records = Vec::new();

    for iface in interfaces {
        let Some(name) = text(iface, "name") else {
            continue;
        };
        let state = iface.get("state").cloned().unwrap_or(Value::Null);

        records.push(
            CanonicalRecord::new(RecordKind::Interface, name)
                .attr(attr::INTERFACE_TYPE, "1000base-t")
                .attr(
                    attr::ENABLED,
                    state.get("active").and_then(Value::as_bool).unwrap_or(false),
                )
                .attr_opt(attr::MAC_ADDRESS, text(&state, "link_address"))
                .attr_opt(attr::MTU, int(iface, "mtu"))
                .rel(rel::DEVICE, device),
        );

        let aliases = state
            .get("aliases")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for alias in aliases.iter().filter(|a| text(a, "type") == Some("INET")) {
            let (Some(address), Some(netmask)) =
                (text(alias, "address"), alias.get("netmask").and_then(scalar))
            else {
                continue;
            };
            records.push(
                CanonicalRecord::new(RecordKind::Address, address)
                    .attr(attr::PREFIX_LENGTH, netmask)
                    .attr(attr::NETWORK, name)
                    .rel(rel::DEVICE, device)
                    .rel(rel::INTERFACE, name),
            );
        }
    }

    records
}

/// Virtual machine records for `GET vm`
pub fn vm_records(vms: &[Value]) -> Vec<CanonicalRecord> {
    vms.iter()
        .filter_map(|vm| {
            let name = text(vm, "name")?;
            let running = vm.pointer("/status/state").and_then(Value::as_str) == Some("RUNNING");
            Some(
                CanonicalRecord::new(RecordKind::VirtualMachine, name)
                    .attr(attr::STATUS, if running { "active" } else { "offline" })
                    .attr(attr::VCPUS, int(vm, "vcpus").unwrap_or(1))
                    .attr(attr::MEMORY_MB, int(vm, "memory").unwrap_or(1024))
                    .rel(rel::CLUSTER, VM_CLUSTER)
                    .rel(rel::CLUSTER_TYPE, VM_CLUSTER_TYPE),
            )
        })
        .collect()
}

/// Identity reported by `GET system/info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrueNasSession {
    pub hostname: String,
    pub version: String,
}

/// TrueNAS REST collector
pub struct TrueNasCollector {
    config: TrueNasConfig,
    client: Client,
}

impl TrueNasCollector {
    pub fn new(config: TrueNasConfig) -> Result<Self, AdapterError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| AdapterError::Config(format!("Invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        let client = config.http.client(headers, false)?;
        Ok(Self { config, client })
    }

    async fn get(&self, endpoint: &str) -> Result<Value, AdapterError> {
        let url = http::join(&self.config.url, &format!("api/v2.0/{}", endpoint));
        http::get_json(&self.client, &url).await
    }
}

#[async_trait]
impl Collector for TrueNasCollector {
    type Session = TrueNasSession;

    fn source(&self) -> &str {
        "truenas"
    }

    fn validate(&self) -> Result<(), AdapterError> {
        if self.config.url.trim().is_empty() || self.config.api_key.trim().is_empty() {
            return Err(AdapterError::Config(
                "TRUENAS_URL and TRUENAS_API_KEY must be set".to_string(),
            ));
        }
        Ok(())
    }

    async fn authenticate(&self) -> Result<TrueNasSession, AdapterError> {
        let info = self.get("system/info").await?;
        let session = TrueNasSession {
            hostname: text(&info, "hostname").unwrap_or("unknown").to_string(),
            version: text(&info, "version").unwrap_or("unknown").to_string(),
        };
        info!(hostname = %session.hostname, version = %session.version, "connected to TrueNAS");
        Ok(session)
    }

    fn phases(&self) -> Vec<String> {
        [PHASE_STORAGE_POOLS, PHASE_INTERFACES, PHASE_VMS]
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    async fn fetch_snapshot(
        &self,
        _session: &TrueNasSession,
        phase: &str,
    ) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let device = self.config.host_name.as_str();
        match phase {
            PHASE_STORAGE_POOLS => {
                let pools = list(&self.get("pool").await?, "pool")?;
                let mut records = vec![appliance_record(device)];
                records.extend(pool_records(&pools, device));
                Ok(records)
            }
            PHASE_INTERFACES => {
                let interfaces = list(&self.get("interface").await?, "interface")?;
                let mut records = vec![appliance_record(device)];
                records.extend(interface_records(&interfaces, device));
                Ok(records)
            }
            PHASE_VMS => Ok(vm_records(&list(&self.get("vm").await?, "vm")?)),
            other => Err(unknown_phase(self.source(), other)),
        }
    }
}
