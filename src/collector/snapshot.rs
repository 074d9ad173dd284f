// Copyright (c) 2025 - Cowboy AI, Inc.
//! Recorded snapshots
//!
//! A [`SnapshotCollector`] replays phases captured earlier (or written by
//! hand) instead of talking to a live source. Used to rehearse a sync
//! against the in-memory registry and to script collectors in tests.
//!
//! ```json
//! {
//!   "source": "lab",
//!   "phases": [
//!     { "name": "devices", "records": [ { "kind": "device", "name": "sw1", ... } ] },
//!     { "name": "storage", "error": { "kind": "connectivity", "message": "timeout" } }
//!   ]
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{unknown_phase, AdapterError, Collector};
use crate::domain::CanonicalRecord;

/// One recorded phase: its records, or the error the source produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPhase {
    pub name: String,
    #[serde(default)]
    pub records: Vec<CanonicalRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<AdapterError>,
}

/// Collector replaying recorded phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCollector {
    pub source: String,
    #[serde(default)]
    pub phases: Vec<SnapshotPhase>,
    /// Error returned by `authenticate`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_error: Option<AdapterError>,
}

impl SnapshotCollector {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            phases: Vec::new(),
            auth_error: None,
        }
    }

    /// Load a snapshot document from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AdapterError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| AdapterError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| AdapterError::Malformed(format!("{}: {}", path.display(), e)))
    }

    pub fn with_phase(mut self, name: &str, records: Vec<CanonicalRecord>) -> Self {
        self.phases.push(SnapshotPhase {
            name: name.to_string(),
            records,
            error: None,
        });
        self
    }

    pub fn with_failed_phase(mut self, name: &str, error: AdapterError) -> Self {
        self.phases.push(SnapshotPhase {
            name: name.to_string(),
            records: Vec::new(),
            error: Some(error),
        });
        self
    }

    pub fn with_auth_error(mut self, error: AdapterError) -> Self {
        self.auth_error = Some(error);
        self
    }
}

#[async_trait]
impl Collector for SnapshotCollector {
    type Session = ();

    fn source(&self) -> &str {
        &self.source
    }

    fn validate(&self) -> Result<(), AdapterError> {
        if self.source.trim().is_empty() {
            return Err(AdapterError::Config("snapshot without a source name".to_string()));
        }
        Ok(())
    }

    async fn authenticate(&self) -> Result<(), AdapterError> {
        match &self.auth_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn phases(&self) -> Vec<String> {
        self.phases.iter().map(|p| p.name.clone()).collect()
    }

    async fn fetch_snapshot(
        &self,
        _session: &(),
        phase: &str,
    ) -> Result<Vec<CanonicalRecord>, AdapterError> {
        let recorded = self
            .phases
            .iter()
            .find(|p| p.name == phase)
            .ok_or_else(|| unknown_phase(&self.source, phase))?;
        match &recorded.error {
            Some(err) => Err(err.clone()),
            None => Ok(recorded.records.clone()),
        }
    }
}
