// Copyright (c) 2025 - Cowboy AI, Inc.
//! Docker Engine collector
//!
//! Reads the Engine HTTP API (`tcp://` or `http://` endpoints; unix sockets
//! are not supported) and reports:
//!
//! - **networks** - the `Docker Networks` VLAN group and one prefix per IPAM
//!   subnet
//! - **containers** - the host as a device, each container as a virtual
//!   machine in a cluster named after the host, one interface and address
//!   per attached network
//! - **volumes** - one summary line per volume, kept in the host's comments

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::http::{self, HttpSettings};
use super::{array, int, text, unknown_phase, AdapterError, Collector};
use crate::domain::{attr, rel, CanonicalRecord, RecordKind};

pub const PHASE_NETWORKS: &str = "networks";
pub const PHASE_CONTAINERS: &str = "containers";
pub const PHASE_VOLUMES: &str = "volumes";

pub const VLAN_GROUP: &str = "Docker Networks";
pub const VOLUMES_MARKER: &str = "=== Docker Volumes ===";
pub const CLUSTER_TYPE: &str = "Docker";

const DEFAULT_NETWORKS: [&str; 3] = ["bridge", "host", "none"];
const SHORT_ID_LEN: usize = 12;

/// Docker collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Engine endpoint, e.g. `tcp://truenas01:2375`
    pub endpoint: String,
    /// Device name of the host in the registry
    pub host_name: String,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:2375".to_string(),
            host_name: "truenas01".to_string(),
            http: HttpSettings::default(),
        }
    }
}

impl DockerConfig {
    /// Endpoint as an HTTP base URL
    pub fn base_url(&self) -> Result<String, AdapterError> {
        let endpoint = self.endpoint.trim();
        if let Some(rest) = endpoint.strip_prefix("tcp://") {
            Ok(format!("http://{}", rest))
        } else if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Ok(endpoint.to_string())
        } else {
            Err(AdapterError::Config(format!(
                "unsupported Docker endpoint '{}' (expected tcp:// or http://)",
                endpoint
            )))
        }
    }
}

/// Container status mapped to registry status
pub fn container_status(state: &str) -> &'static str {
    match state {
        "running" => "active",
        "paused" | "restarting" | "created" => "staged",
        _ => "offline",
    }
}

fn host_record(host: &str) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Device, host)
        .attr(attr::ROLE_COLOR, "9c27b0")
        .rel(rel::ROLE, "container-host")
        .rel(rel::MANUFACTURER, "Docker")
        .rel(rel::DEVICE_TYPE, "Docker Host")
}

/// Records for `GET /networks`
pub fn network_records(networks: &[Value]) -> Vec<CanonicalRecord> {
    let mut records = vec![CanonicalRecord::new(RecordKind::VlanGroup, VLAN_GROUP)];

    for network in networks {
        let Some(name) = text(network, "Name") else {
            continue;
        };
        let has_containers = network
            .get("Containers")
            .and_then(Value::as_object)
            .map(|c| !c.is_empty())
            .unwrap_or(false);
        if DEFAULT_NETWORKS.contains(&name) && !has_containers {
            continue;
        }

        let driver = text(network, "Driver").unwrap_or("unknown");
        let subnets: Vec<&str> = network
            .pointer("/IPAM/Config")
            .and_then(Value::as_array)
            .map(|configs| configs.iter().filter_map(|c| text(c, "Subnet")).collect())
            .unwrap_or_default();

        if subnets.is_empty() {
            debug!(network = %name, "network without subnet");
        }
        for subnet in subnets {
            records.push(
                CanonicalRecord::new(RecordKind::Prefix, subnet)
                    .attr(attr::STATUS, "active")
                    .attr(
                        attr::DESCRIPTION,
                        format!("Docker network: {} ({})", name, driver),
                    ),
            );
        }
    }

    records
}

/// Records for one `GET /containers/{id}/json` document
pub fn container_records(
    inspect: &Value,
    cluster: &str,
) -> Result<Vec<CanonicalRecord>, AdapterError> {
    let name = text(inspect, "Name")
        .map(|n| n.trim_start_matches('/'))
        .ok_or_else(|| AdapterError::Malformed("container without Name".to_string()))?;
    let id = text(inspect, "Id").unwrap_or_default();
    let short_id: String = id.chars().take(SHORT_ID_LEN).collect();
    let image = inspect
        .pointer("/Config/Image")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let state = inspect
        .pointer("/State/Status")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let labels = inspect
        .pointer("/Config/Labels")
        .and_then(Value::as_object)
        .map(|l| l.len())
        .unwrap_or(0);

    let host_config = inspect.get("HostConfig").cloned().unwrap_or(Value::Null);
    let networks = inspect
        .pointer("/NetworkSettings/Networks")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let network_names: Vec<&str> = networks.keys().map(String::as_str).collect();

    let mut comments = format!(
        "Container ID: {}\nImage: {}\nNetworks: {}",
        short_id,
        image,
        network_names.join(", ")
    );
    if labels > 0 {
        comments.push_str(&format!("\nLabels: {} labels", labels));
    }

    let mut records = vec![CanonicalRecord::new(RecordKind::VirtualMachine, name)
        .attr(attr::STATUS, container_status(state))
        .attr(attr::CPU_QUOTA, int(&host_config, "CpuQuota").unwrap_or(0))
        .attr(attr::MEMORY_BYTES, int(&host_config, "Memory").unwrap_or(0))
        .attr(attr::COMMENTS, comments)
        .attr("cf_container_id", short_id.as_str())
        .attr("cf_image", image)
        .rel(rel::CLUSTER, cluster)
        .rel(rel::CLUSTER_TYPE, CLUSTER_TYPE)];

    for (network, settings) in &networks {
        let Some(address) = text(settings, "IPAddress") else {
            continue;
        };
        records.push(
            CanonicalRecord::new(RecordKind::Interface, network.as_str())
                .attr_opt(attr::MAC_ADDRESS, text(settings, "MacAddress"))
                .rel(rel::VIRTUAL_MACHINE, name),
        );
        records.push(
            CanonicalRecord::new(RecordKind::Address, address)
                .attr_opt(
                    attr::PREFIX_LENGTH,
                    int(settings, "IPPrefixLen").filter(|len| *len > 0),
                )
                .attr(attr::NETWORK, network.as_str())
                .attr(attr::DESCRIPTION, format!("Container: {}", name))
                .rel(rel::VIRTUAL_MACHINE, name)
                .rel(rel::INTERFACE, network.as_str()),
        );
    }

    Ok(records)
}

/// Records for `GET /volumes`
pub fn volume_records(volumes: &Value, host: &str) -> Result<Vec<CanonicalRecord>, AdapterError> {
    let volumes = match volumes.get("Volumes") {
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(_) => array(volumes, "Volumes")?,
    };

    Ok(volumes
        .iter()
        .filter_map(|volume| {
            let name = text(volume, "Name")?;
            let driver = text(volume, "Driver").unwrap_or("local");
            let mountpoint = text(volume, "Mountpoint").unwrap_or_default();
            Some(
                CanonicalRecord::new(RecordKind::Volume, name)
                    .attr(attr::SECTION, VOLUMES_MARKER)
                    .attr(
                        attr::DESCRIPTION,
                        format!("{} ({}): {}", name, driver, mountpoint),
                    )
                    .rel(rel::DEVICE, host),
            )
        })
        .collect())
}

/// Engine identity confirmed by `GET /info`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DockerSession {
    pub engine_name: String,
}

/// Records for every inspected container
///
/// A container whose inspect request failed, or whose document cannot be
/// mapped, is skipped with a warning; the rest of the phase proceeds.
pub fn inspected_records(
    inspections: Vec<(String, Result<Value, AdapterError>)>,
    cluster: &str,
) -> Vec<CanonicalRecord> {
    let mut records = Vec::new();
    for (id, inspect) in inspections {
        match inspect.and_then(|inspect| container_records(&inspect, cluster)) {
            Ok(container) => records.extend(container),
            Err(err) => warn!(container = %id, error = %err, "skipping container"),
        }
    }
    records
}

/// Docker Engine API collector
pub struct DockerCollector {
    config: DockerConfig,
    client: Client,
}

impl DockerCollector {
    pub fn new(config: DockerConfig) -> Result<Self, AdapterError> {
        let client = config.http.client(HeaderMap::new(), false)?;
        Ok(Self { config, client })
    }

    async fn get(&self, path: &str) -> Result<Value, AdapterError> {
        let url = http::join(&self.config.base_url()?, path);
        http::get_json(&self.client, &url).await
    }

    async fn containers(&self) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let host = &self.config.host_name;
        let mut records = vec![host_record(host)];

        let listing = self.get("containers/json?all=true").await?;
        let containers = listing
            .as_array()
            .ok_or_else(|| AdapterError::Malformed("container list is not an array".into()))?;

        let mut inspections = Vec::with_capacity(containers.len());
        for container in containers {
            let Some(id) = text(container, "Id") else {
                continue;
            };
            let inspect = self.get(&format!("containers/{}/json", id)).await;
            inspections.push((id.to_string(), inspect));
        }
        records.extend(inspected_records(inspections, host));
        Ok(records)
    }
}

#[async_trait]
impl Collector for DockerCollector {
    type Session = DockerSession;

    fn source(&self) -> &str {
        "docker"
    }

    fn validate(&self) -> Result<(), AdapterError> {
        if self.config.host_name.trim().is_empty() {
            return Err(AdapterError::Config("Docker host name is empty".to_string()));
        }
        self.config.base_url().map(|_| ())
    }

    async fn authenticate(&self) -> Result<DockerSession, AdapterError> {
        let info = self.get("info").await?;
        let engine_name = text(&info, "Name").unwrap_or("unknown").to_string();
        info!(
            engine = %engine_name,
            containers = int(&info, "Containers").unwrap_or(0),
            running = int(&info, "ContainersRunning").unwrap_or(0),
            images = int(&info, "Images").unwrap_or(0),
            "connected to Docker"
        );
        Ok(DockerSession { engine_name })
    }

    fn phases(&self) -> Vec<String> {
        [PHASE_NETWORKS, PHASE_CONTAINERS, PHASE_VOLUMES]
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    async fn fetch_snapshot(
        &self,
        _session: &DockerSession,
        phase: &str,
    ) -> Result<Vec<CanonicalRecord>, AdapterError> {
        match phase {
            PHASE_NETWORKS => {
                let networks = self.get("networks").await?;
                let networks = networks
                    .as_array()
                    .ok_or_else(|| AdapterError::Malformed("network list is not an array".into()))?;
                Ok(network_records(networks))
            }
            PHASE_CONTAINERS => self.containers().await,
            PHASE_VOLUMES => {
                let volumes = self.get("volumes").await?;
                let mut records = vec![host_record(&self.config.host_name)];
                records.extend(volume_records(&volumes, &self.config.host_name)?);
                Ok(records)
            }
            other => Err(unknown_phase(self.source(), other)),
        }
    }
}
