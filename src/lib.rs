// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory reconciliation for a NetBox source of truth
//!
//! Collectors read live infrastructure (container hosts, SDN controllers,
//! firewalls, storage appliances) and emit canonical records; the
//! reconciler upserts them into the registry in dependency order, writing
//! only what changed.
//!
//! ```text
//! Collector ──CanonicalRecord──▶ Reconciler ──▶ Resolver ──▶ Registry
//!     ▲                               │
//!     └──────── SyncOrchestrator ─────┴──▶ RunReport
//! ```

pub mod collector;
#[cfg(feature = "http")]
pub mod config;
pub mod domain;
pub mod errors;
pub mod orchestrator;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod state_machine;

// Re-export commonly used types
pub use collector::{AdapterError, Collector, SnapshotCollector};
#[cfg(feature = "http")]
pub use config::{ConfigError, Source, SyncConfig};
pub use domain::{CanonicalRecord, EntityKind, RecordKind};
pub use errors::{SyncError, SyncResult};
pub use orchestrator::SyncOrchestrator;
pub use reconcile::{ReconcileOptions, Reconciler};
pub use registry::{InMemoryRegistry, Registry, RegistryError};
pub use report::{PhaseReport, PhaseStats, PhaseStatus, RunReport, RunStatus};
