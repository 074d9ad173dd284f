// Copyright (c) 2025 - Cowboy AI, Inc.
//! Omada SDN controller collector
//!
//! Session-authenticated REST. AUTH is three calls:
//!
//! ```text
//! POST /api/v2/login                          -> token (Csrf-Token header) + cookie
//! GET  /api/v2/controllers                    -> controller id
//! GET  /api/v2/controllers/{c}/sites          -> site id by name
//! ```
//!
//! Every response is an envelope `{errorCode, msg, result}`; a non-zero
//! `errorCode` is an error even on HTTP 200.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::http::{self, HttpSettings};
use super::{int, text, unknown_phase, AdapterError, Collector};
use crate::domain::{attr, rel, CanonicalRecord, RecordKind};

pub const PHASE_ACCESS_POINTS: &str = "access-points";
pub const PHASE_SWITCHES: &str = "switches";
pub const PHASE_GATEWAYS: &str = "gateways";

pub const MANUFACTURER: &str = "TP-Link";
pub const MANAGEMENT_INTERFACE: &str = "Management";

/// Omada collector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OmadaConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    /// Controller site to read
    pub site_name: String,
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for OmadaConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            site_name: "Default".to_string(),
            http: HttpSettings::default(),
        }
    }
}

/// What one phase reads and how its devices are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFamily {
    pub endpoint: &'static str,
    pub role: &'static str,
    pub role_color: &'static str,
    pub default_model: &'static str,
}

pub fn family(phase: &str) -> Option<DeviceFamily> {
    match phase {
        PHASE_ACCESS_POINTS => Some(DeviceFamily {
            endpoint: "eaps",
            role: "access-point",
            role_color: "4caf50",
            default_model: "Unknown AP",
        }),
        PHASE_SWITCHES => Some(DeviceFamily {
            endpoint: "switches",
            role: "switch",
            role_color: "ff9800",
            default_model: "Unknown Switch",
        }),
        PHASE_GATEWAYS => Some(DeviceFamily {
            endpoint: "gateways",
            role: "router",
            role_color: "f44336",
            default_model: "Unknown Gateway",
        }),
        _ => None,
    }
}

/// Payload of an Omada response envelope
pub fn unwrap_envelope(body: Value, what: &str) -> Result<Value, AdapterError> {
    match body.get("errorCode").and_then(Value::as_i64) {
        Some(0) => Ok(body.get("result").cloned().unwrap_or(Value::Null)),
        Some(code) => Err(AdapterError::Malformed(format!(
            "{}: error {}: {}",
            what,
            code,
            text(&body, "msg").unwrap_or("unknown error")
        ))),
        None => Err(AdapterError::Malformed(format!(
            "{}: response without errorCode",
            what
        ))),
    }
}

fn comments(device: &Value, family: &DeviceFamily, mac: &str) -> String {
    let uptime = int(device, "uptime").unwrap_or(0);
    match family.endpoint {
        "eaps" => format!(
            "MAC: {}\nClients: {}\nUptime: {}s",
            mac,
            int(device, "clients").unwrap_or(0),
            uptime
        ),
        "switches" => format!(
            "MAC: {}\nPorts: {}\nUptime: {}s",
            mac,
            int(device, "portNum").unwrap_or(0),
            uptime
        ),
        _ => format!("MAC: {}\nUptime: {}s", mac, uptime),
    }
}

/// Records for the `data` list of one device family
pub fn device_records(devices: &[Value], family: &DeviceFamily) -> Vec<CanonicalRecord> {
    let mut records = Vec::new();

    for device in devices {
        let mac = text(device, "mac").unwrap_or_default();
        let name = text(device, "name")
            .or_else(|| text(device, "mac"))
            .unwrap_or("unknown");
        let model = text(device, "model").unwrap_or(family.default_model);
        let status = if int(device, "status") == Some(1) {
            "active"
        } else {
            "offline"
        };

        records.push(
            CanonicalRecord::new(RecordKind::Device, name)
                .attr(attr::STATUS, status)
                .attr(attr::COMMENTS, comments(device, family, mac))
                .attr(attr::ROLE_COLOR, family.role_color)
                .rel(rel::ROLE, family.role)
                .rel(rel::MANUFACTURER, MANUFACTURER)
                .rel(rel::DEVICE_TYPE, model),
        );

        if let (Some(ip), false) = (text(device, "ip"), mac.is_empty()) {
            records.push(
                CanonicalRecord::new(RecordKind::Interface, MANAGEMENT_INTERFACE)
                    .attr(attr::MAC_ADDRESS, mac)
                    .attr(attr::INTERFACE_TYPE, "other")
                    .rel(rel::DEVICE, name),
            );
            records.push(
                CanonicalRecord::new(RecordKind::Address, ip)
                    .attr(attr::NETWORK, MANAGEMENT_INTERFACE)
                    .rel(rel::DEVICE, name)
                    .rel(rel::INTERFACE, MANAGEMENT_INTERFACE),
            );
        }
    }

    records
}

/// Controller session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmadaSession {
    pub token: String,
    pub controller_id: String,
    pub site_id: String,
}

/// Omada controller collector
pub struct OmadaCollector {
    config: OmadaConfig,
    client: Client,
}

impl OmadaCollector {
    pub fn new(config: OmadaConfig) -> Result<Self, AdapterError> {
        let client = config.http.client(HeaderMap::new(), true)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        http::join(&self.config.url, path)
    }

    async fn get(&self, token: &str, path: &str) -> Result<Value, AdapterError> {
        let url = self.url(path);
        let body = http::send_json(self.client.get(&url).header("Csrf-Token", token), &url).await?;
        unwrap_envelope(body, path)
    }
}

#[async_trait]
impl Collector for OmadaCollector {
    type Session = OmadaSession;

    fn source(&self) -> &str {
        "omada"
    }

    fn validate(&self) -> Result<(), AdapterError> {
        let missing: Vec<&str> = [
            ("OMADA_URL", &self.config.url),
            ("OMADA_USERNAME", &self.config.username),
            ("OMADA_PASSWORD", &self.config.password),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AdapterError::Config(format!("{} must be set", missing.join(", "))))
        }
    }

    async fn authenticate(&self) -> Result<OmadaSession, AdapterError> {
        let login = self.url("api/v2/login");
        let body = http::send_json(
            self.client.post(&login).json(&json!({
                "username": self.config.username,
                "password": self.config.password,
            })),
            &login,
        )
        .await?;
        let result = unwrap_envelope(body, "login").map_err(|e| AdapterError::Auth(e.to_string()))?;
        let token = text(&result, "token")
            .ok_or_else(|| AdapterError::Auth("login returned no token".to_string()))?
            .to_string();

        let controllers = self.get(&token, "api/v2/controllers").await?;
        let controller_id = controllers
            .as_array()
            .and_then(|list| list.first())
            .and_then(|c| text(c, "omadacId"))
            .ok_or_else(|| AdapterError::Auth("no controller available".to_string()))?
            .to_string();

        let sites = self
            .get(&token, &format!("api/v2/controllers/{}/sites", controller_id))
            .await?;
        let site_id = sites
            .as_array()
            .into_iter()
            .flatten()
            .find(|site| text(site, "name") == Some(self.config.site_name.as_str()))
            .and_then(|site| text(site, "id"))
            .ok_or_else(|| {
                AdapterError::Auth(format!("site '{}' not found", self.config.site_name))
            })?
            .to_string();

        info!(controller = %controller_id, site = %self.config.site_name, "logged in to Omada");
        Ok(OmadaSession {
            token,
            controller_id,
            site_id,
        })
    }

    fn phases(&self) -> Vec<String> {
        [PHASE_ACCESS_POINTS, PHASE_SWITCHES, PHASE_GATEWAYS]
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    async fn fetch_snapshot(
        &self,
        session: &OmadaSession,
        phase: &str,
    ) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let family = family(phase).ok_or_else(|| unknown_phase(self.source(), phase))?;
        let path = format!(
            "api/v2/controllers/{}/sites/{}/{}",
            session.controller_id, session.site_id, family.endpoint
        );
        let result = self.get(&session.token, &path).await?;

        let devices = result
            .get("data")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(device_records(&devices, &family))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_envelope() {
        let ok = unwrap_envelope(json!({"errorCode": 0, "result": {"token": "t"}}), "login");
        assert_eq!(ok.unwrap(), json!({"token": "t"}));

        let err = unwrap_envelope(json!({"errorCode": -30109, "msg": "bad password"}), "login");
        assert!(matches!(err, Err(AdapterError::Malformed(msg)) if msg.contains("bad password")));

        assert!(unwrap_envelope(json!({"result": []}), "sites").is_err());
    }

    #[test]
    fn test_access_point_records() {
        let family = family(PHASE_ACCESS_POINTS).unwrap();
        let devices = vec![
            json!({"name": "ap-living", "model": "EAP245(EU)", "mac": "AA-BB-CC-00-11-22",
                   "ip": "192.168.0.21", "status": 1, "uptime": 3600, "clients": 7}),
            json!({"mac": "AA-BB-CC-00-11-33", "status": 0}),
        ];
        let records = device_records(&devices, &family);
        assert_eq!(records.len(), 4);

        let ap = &records[0];
        assert_eq!(ap.text(attr::STATUS), Some("active"));
        assert_eq!(
            ap.text(attr::COMMENTS),
            Some("MAC: AA-BB-CC-00-11-22\nClients: 7\nUptime: 3600s")
        );
        assert_eq!(ap.relation(rel::DEVICE_TYPE), Some("EAP245(EU)"));
        assert_eq!(ap.relation(rel::ROLE), Some("access-point"));

        assert_eq!(records[1].kind, RecordKind::Interface);
        assert_eq!(records[2].kind, RecordKind::Address);
        assert_eq!(records[2].name, "192.168.0.21");

        let unnamed = &records[3];
        assert_eq!(unnamed.name, "AA-BB-CC-00-11-33");
        assert_eq!(unnamed.text(attr::STATUS), Some("offline"));
        assert_eq!(unnamed.relation(rel::DEVICE_TYPE), Some("Unknown AP"));
    }

    #[test]
    fn test_switch_comments() {
        let family = family(PHASE_SWITCHES).unwrap();
        let records = device_records(
            &[json!({"name": "sw-core", "mac": "AA", "portNum": 24, "uptime": 5})],
            &family,
        );
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].text(attr::COMMENTS),
            Some("MAC: AA\nPorts: 24\nUptime: 5s")
        );
    }

    #[test]
    fn test_validate_lists_missing_settings() {
        let collector = OmadaCollector::new(OmadaConfig {
            url: "https://omada.local".to_string(),
            ..OmadaConfig::default()
        })
        .unwrap();
        let err = collector.validate().unwrap_err();
        assert_eq!(
            err,
            AdapterError::Config("OMADA_USERNAME, OMADA_PASSWORD must be set".to_string())
        );
    }
}
