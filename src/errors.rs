// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for inventory reconciliation
//!
//! Every failure the engine can observe is classified into one of the
//! variants of [`SyncError`]. The classification decides the scope at which
//! the error is caught:
//!
//! | Variant | Caught at | Effect |
//! |---|---|---|
//! | `Connectivity` | phase | phase fails, run continues, success cleared |
//! | `AmbiguousMatch` | record | record skipped |
//! | `MissingDependency` | record | record skipped, not retried this run |
//! | `DataShape` | record | record skipped |
//! | `Persistence` | record | record skipped |
//! | `Configuration` | run | run aborted before any phase |

use thiserror::Error;

use crate::domain::{EntityKind, NetworkError};
use crate::registry::RegistryError;

/// Errors that can occur while reconciling inventory into the registry
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Source or registry unreachable, or credentials rejected
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Natural-key lookup matched more than one registry entity
    #[error("Ambiguous match: {count} {kind} entities match {key}")]
    AmbiguousMatch {
        kind: EntityKind,
        key: String,
        count: usize,
    },

    /// A dependency of the entity could not be resolved
    #[error("Missing dependency for {kind} '{key}': {dependency}")]
    MissingDependency {
        kind: EntityKind,
        key: String,
        dependency: String,
    },

    /// A source record lacks a field required for the operation
    #[error("Data shape error: {0}")]
    DataShape(String),

    /// The registry rejected a create or update
    #[error("Persistence error on {kind} '{key}': {reason}")]
    Persistence {
        kind: EntityKind,
        key: String,
        reason: String,
    },

    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Whether the error must abort the whole phase rather than one record
    pub fn is_phase_fatal(&self) -> bool {
        matches!(self, SyncError::Connectivity(_) | SyncError::Configuration(_))
    }

    /// Short machine-readable label used in reports and log fields
    pub fn label(&self) -> &'static str {
        match self {
            SyncError::Connectivity(_) => "connectivity",
            SyncError::AmbiguousMatch { .. } => "ambiguous_match",
            SyncError::MissingDependency { .. } => "missing_dependency",
            SyncError::DataShape(_) => "data_shape",
            SyncError::Persistence { .. } => "persistence",
            SyncError::Configuration(_) => "configuration",
        }
    }

    /// Classify a registry failure raised while handling `kind`/`key`
    pub fn from_registry(err: RegistryError, kind: EntityKind, key: impl Into<String>) -> Self {
        let key = key.into();
        match err {
            RegistryError::Unreachable(msg) => SyncError::Connectivity(msg),
            RegistryError::Ambiguous { count } => SyncError::AmbiguousMatch { kind, key, count },
            RegistryError::Rejected { status, body } => SyncError::Persistence {
                kind,
                key,
                reason: format!("registry returned {}: {}", status, body),
            },
            RegistryError::Malformed(reason) => SyncError::Persistence { kind, key, reason },
        }
    }
}

impl From<NetworkError> for SyncError {
    fn from(err: NetworkError) -> Self {
        SyncError::DataShape(err.to_string())
    }
}

/// Result type for reconciliation operations
pub type SyncResult<T> = Result<T, SyncError>;
