// Copyright (c) 2025 - Cowboy AI, Inc.
//! OPNsense firewall collector
//!
//! Key/secret REST (HTTP basic auth) under `/api/`. The firewall itself is
//! one device; its interfaces, VLANs, rule count and static routes are read
//! phase by phase. Every list endpoint answers `{"rows": [...]}`.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use super::http::{self, HttpSettings};
use super::{array, int, text, unknown_phase, AdapterError, Collector};
use crate::domain::{attr, rel, CanonicalRecord, RecordKind};

pub const PHASE_INTERFACES: &str = "interfaces";
pub const PHASE_VLANS: &str = "vlans";
pub const PHASE_FIREWALL_RULES: &str = "firewall-rules";
pub const PHASE_ROUTES: &str = "routes";

const INTERFACES_ENDPOINT: &str = "interfaces/overview/export";
const VLANS_ENDPOINT: &str = "interfaces/vlan_settings/searchItem";
const RULES_ENDPOINT: &str = "firewall/filter/searchRule";
const ROUTES_ENDPOINT: &str = "routes/routes/searchRoute";

/// OPNsense collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpnsenseConfig {
    pub url: String,
    pub api_key: String,
    pub api_secret: String,
    /// Device name of the firewall in the registry
    pub device_name: String,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for OpnsenseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            device_name: "opnsense".to_string(),
            http: HttpSettings::default(),
        }
    }
}

fn firewall_record(name: &str) -> CanonicalRecord {
    CanonicalRecord::new(RecordKind::Device, name)
        .attr(attr::ROLE_COLOR, "f44336")
        .rel(rel::ROLE, "firewall")
        .rel(rel::MANUFACTURER, "Deciso")
        .rel(rel::DEVICE_TYPE, "OPNsense")
}

/// Records for `interfaces/overview/export` rows
pub fn interface_records(rows: &[Value], device: &str) -> Vec<CanonicalRecord> {
    let mut records = Vec::new();

    for row in rows {
        let Some(name) = text(row, "identifier").or_else(|| text(row, "descr")) else {
            continue;
        };
        let enabled = text(row, "status")
            .map(|s| s.eq_ignore_ascii_case("up"))
            .unwrap_or(false);

        records.push(
            CanonicalRecord::new(RecordKind::Interface, name)
                .attr(attr::ENABLED, enabled)
                .attr(attr::INTERFACE_TYPE, "1000base-t")
                .attr_opt(attr::MAC_ADDRESS, text(row, "macaddr"))
                .attr_opt(attr::DESCRIPTION, text(row, "descr"))
                .rel(rel::DEVICE, device),
        );

        if let Some(ip) = text(row, "ipaddr").filter(|ip| *ip != "None") {
            records.push(
                CanonicalRecord::new(RecordKind::Address, ip)
                    .attr(attr::NETWORK, name)
                    .rel(rel::DEVICE, device)
                    .rel(rel::INTERFACE, name),
            );
        }
    }

    records
}

/// Records for `interfaces/vlan_settings/searchItem` rows
///
/// Rows without a tag are still reported so the skip shows up in the
/// phase report.
pub fn vlan_records(rows: &[Value]) -> Vec<CanonicalRecord> {
    rows.iter()
        .map(|row| {
            let vid = int(row, "tag");
            let name = match (text(row, "descr"), vid) {
                (Some(descr), _) => descr.to_string(),
                (None, Some(vid)) => format!("VLAN{}", vid),
                (None, None) => "untagged".to_string(),
            };
            CanonicalRecord::new(RecordKind::Vlan, name).attr_opt(attr::VID, vid)
        })
        .collect()
}

/// Firewall device carrying the rule count
pub fn rule_count_record(rows: &[Value], device: &str) -> CanonicalRecord {
    firewall_record(device).attr("cf_firewall_rule_count", rows.len() as i64)
}

/// Records for `routes/routes/searchRoute` rows
pub fn route_records(rows: &[Value]) -> Vec<CanonicalRecord> {
    rows.iter()
        .filter_map(|row| {
            let network = text(row, "network")?;
            let gateway = text(row, "gateway").unwrap_or("unknown");
            Some(
                CanonicalRecord::new(RecordKind::Prefix, network)
                    .attr(attr::DESCRIPTION, format!("Route via {}", gateway)),
            )
        })
        .collect()
}

/// OPNsense REST collector
pub struct OpnsenseCollector {
    config: OpnsenseConfig,
    client: Client,
}

impl OpnsenseCollector {
    pub fn new(config: OpnsenseConfig) -> Result<Self, AdapterError> {
        let client = config.http.client(HeaderMap::new(), false)?;
        Ok(Self { config, client })
    }

    async fn rows(&self, endpoint: &str) -> Result<Vec<Value>, AdapterError> {
        let url = http::join(&self.config.url, &format!("api/{}", endpoint));
        let request = self
            .client
            .get(&url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret));
        let body = http::send_json(request, &url).await?;
        Ok(array(&body, "rows")?.clone())
    }
}

#[async_trait]
impl Collector for OpnsenseCollector {
    /// Basic auth is per request; the session only proves it works
    type Session = ();

    fn source(&self) -> &str {
        "opnsense"
    }

    fn validate(&self) -> Result<(), AdapterError> {
        if self.config.url.trim().is_empty()
            || self.config.api_key.trim().is_empty()
            || self.config.api_secret.trim().is_empty()
        {
            return Err(AdapterError::Config(
                "OPNSENSE_URL, OPNSENSE_API_KEY and OPNSENSE_API_SECRET must be set".to_string(),
            ));
        }
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        let rows = self.rows(INTERFACES_ENDPOINT).await?;
        info!(interfaces = rows.len(), "connected to OPNsense");
        Ok(())
    }

    fn phases(&self) -> Vec<String> {
        [
            PHASE_INTERFACES,
            PHASE_VLANS,
            PHASE_FIREWALL_RULES,
            PHASE_ROUTES,
        ]
        .iter()
        .map(|p| p.to_string())
        .collect()
    }

    async fn fetch_snapshot(
        &self,
        _session: &(),
        phase: &str,
    ) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let device = self.config.device_name.as_str();
        match phase {
            PHASE_INTERFACES => {
                let rows = self.rows(INTERFACES_ENDPOINT).await?;
                let mut records = vec![firewall_record(device)];
                records.extend(interface_records(&rows, device));
                Ok(records)
            }
            PHASE_VLANS => Ok(vlan_records(&self.rows(VLANS_ENDPOINT).await?)),
            PHASE_FIREWALL_RULES => {
                let rows = self.rows(RULES_ENDPOINT).await?;
                Ok(vec![rule_count_record(&rows, device)])
            }
            PHASE_ROUTES => Ok(route_records(&self.rows(ROUTES_ENDPOINT).await?)),
            other => Err(unknown_phase(self.source(), other)),
        }
    }
}
