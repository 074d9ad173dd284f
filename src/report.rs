// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run and phase reports
//!
//! The orchestrator returns a [`RunReport`] instead of printing progress:
//! one [`PhaseReport`] per phase with the counts of entities created,
//! updated, left unchanged and records skipped, plus the reason of every
//! skip. Reports serialize to JSON for structured output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::RecordKind;
use crate::errors::SyncError;

/// Result of one upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
}

/// Entity counts of one phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub created: u32,
    pub updated: u32,
    pub unchanged: u32,
    pub skipped: u32,
}

impl PhaseStats {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Entities written (created or updated)
    pub fn writes(&self) -> u32 {
        self.created + self.updated
    }

    pub fn merge(&mut self, other: &PhaseStats) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.skipped += other.skipped;
    }
}

impl fmt::Display for PhaseStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} unchanged, {} skipped",
            self.created, self.updated, self.unchanged, self.skipped
        )
    }
}

/// A record that was skipped, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFailure {
    pub kind: RecordKind,
    pub name: String,
    pub error: String,
    pub message: String,
}

impl RecordFailure {
    pub fn new(kind: RecordKind, name: &str, err: &SyncError) -> Self {
        Self {
            kind,
            name: name.to_string(),
            error: err.label().to_string(),
            message: err.to_string(),
        }
    }
}

/// How a phase ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub phase: String,
    pub status: PhaseStatus,
    pub records: usize,
    pub stats: PhaseStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RecordFailure>,
}

impl PhaseReport {
    pub fn succeeded(&self) -> bool {
        self.status == PhaseStatus::Completed
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every phase was attempted
    Done,
    /// Setup failed before any phase ran
    Aborted(String),
}

/// Outcome of one source's sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub phases: Vec<PhaseReport>,
}

impl RunReport {
    /// Report for a run that could not even be set up
    pub fn aborted(source: &str, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::now_v7(),
            source: source.to_string(),
            started_at: now,
            finished_at: now,
            status: RunStatus::Aborted(reason.into()),
            phases: Vec::new(),
        }
    }

    /// Success only when setup passed and every phase completed
    pub fn success(&self) -> bool {
        self.status == RunStatus::Done && self.phases.iter().all(PhaseReport::succeeded)
    }

    pub fn phase(&self, name: &str) -> Option<&PhaseReport> {
        self.phases.iter().find(|p| p.phase == name)
    }

    pub fn totals(&self) -> PhaseStats {
        let mut totals = PhaseStats::default();
        for phase in &self.phases {
            totals.merge(&phase.stats);
        }
        totals
    }
}
