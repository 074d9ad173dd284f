// Copyright (c) 2025 - Cowboy AI, Inc.
//! Collector Adapters - one failure domain per inventory source
//!
//! A collector speaks its source's protocol and hands the engine nothing
//! but [`CanonicalRecord`]s:
//!
//! ```text
//! validate()                       INIT   configuration present?
//! authenticate()        -> Session AUTH   reachable, credentials accepted
//! fetch_snapshot(&Session, phase)  PHASE  records of one entity family
//! ```
//!
//! The session is an explicit value bounded to one run. Collectors never
//! raise into the core; every failure is an [`AdapterError`].
//!
//! | Collector | Phases |
//! |---|---|
//! | [`docker`] | networks, containers, volumes |
//! | [`omada`] | access-points, switches, gateways |
//! | [`opnsense`] | interfaces, vlans, firewall-rules, routes |
//! | [`truenas`] | storage-pools, interfaces, vms |
//! | [`snapshot`] | whatever the snapshot file names |

#[cfg(feature = "http")]
pub mod docker;
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub mod omada;
#[cfg(feature = "http")]
pub mod opnsense;
pub mod snapshot;
#[cfg(feature = "http")]
pub mod truenas;

#[cfg(feature = "http")]
pub use docker::{DockerCollector, DockerConfig};
#[cfg(feature = "http")]
pub use http::HttpSettings;
#[cfg(feature = "http")]
pub use omada::{OmadaCollector, OmadaConfig};
#[cfg(feature = "http")]
pub use opnsense::{OpnsenseCollector, OpnsenseConfig};
pub use snapshot::{SnapshotCollector, SnapshotPhase};
#[cfg(feature = "http")]
pub use truenas::{TrueNasCollector, TrueNasConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{CanonicalRecord, Scalar};
use crate::errors::SyncError;

/// Failures of a source adapter
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum AdapterError {
    /// Source unreachable or timed out
    #[error("Source unreachable: {0}")]
    Connectivity(String),

    /// Credentials rejected or session could not be established
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Response did not have the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Required configuration missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<AdapterError> for SyncError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Connectivity(msg) | AdapterError::Auth(msg) => {
                SyncError::Connectivity(msg)
            }
            AdapterError::Malformed(msg) => SyncError::DataShape(msg),
            AdapterError::Config(msg) => SyncError::Configuration(msg),
        }
    }
}

/// A source of inventory snapshots
#[async_trait]
pub trait Collector: Send + Sync {
    /// Per-run authenticated state
    type Session: Send + Sync;

    /// Source name used in logs and reports
    fn source(&self) -> &str;

    /// Check configuration before any network traffic
    fn validate(&self) -> Result<(), AdapterError>;

    /// Establish a session with the source
    async fn authenticate(&self) -> Result<Self::Session, AdapterError>;

    /// Phase names in execution order
    fn phases(&self) -> Vec<String>;

    /// Records of one phase
    async fn fetch_snapshot(
        &self,
        session: &Self::Session,
        phase: &str,
    ) -> Result<Vec<CanonicalRecord>, AdapterError>;
}

/// Scalar view of a JSON value; `None` for null, arrays and objects
pub fn scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::Bool(b) => Some(Scalar::Bool(*b)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Scalar::Int),
        Value::String(s) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

/// Non-empty string field of a JSON object
pub fn text<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Integer field of a JSON object, accepting numeric strings
pub fn int(value: &Value, field: &str) -> Option<i64> {
    value.get(field).and_then(scalar).and_then(|s| s.as_i64())
}

/// Array field of a JSON object, or a malformed-response error
pub fn array<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>, AdapterError> {
    value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| AdapterError::Malformed(format!("expected array '{}'", field)))
}

/// Error for a phase name the collector does not know
pub fn unknown_phase(source: &str, phase: &str) -> AdapterError {
    AdapterError::Config(format!("{} has no phase '{}'", source, phase))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_helpers() {
        let value = json!({"name": " eth0 ", "mtu": "9000", "tag": 30, "empty": "", "rows": []});
        assert_eq!(text(&value, "name"), Some("eth0"));
        assert_eq!(text(&value, "empty"), None);
        assert_eq!(int(&value, "mtu"), Some(9000));
        assert_eq!(int(&value, "tag"), Some(30));
        assert!(array(&value, "rows").unwrap().is_empty());
        assert!(array(&value, "missing").is_err());
        assert_eq!(scalar(&json!(null)), None);
    }

    #[test]
    fn test_adapter_error_classification() {
        assert!(SyncError::from(AdapterError::Auth("401".into())).is_phase_fatal());
        assert_eq!(
            SyncError::from(AdapterError::Malformed("no rows".into())).label(),
            "data_shape"
        );
    }
}
