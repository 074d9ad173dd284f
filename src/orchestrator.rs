// Copyright (c) 2025 - Cowboy AI, Inc.
//! Sync Orchestration
//!
//! Drives one [`Collector`] through a run against one [`Registry`]:
//!
//! ```text
//! INIT ──validate──▶ AUTH ──registry health + authenticate──▶ PHASE[1..n] ──▶ DONE
//!   │                  │
//!   └──────────────────┴──────────▶ ABORTED (no phase runs)
//! ```
//!
//! Phases run in the collector's declared order. A phase whose fetch fails,
//! or whose reconciliation hits a connectivity error, is reported as failed
//! and the next phase still runs. Records within a phase that fail on their
//! own are skipped and listed in the phase report.
//!
//! The dependency cache lives for one run, so a site or manufacturer ensured
//! in the first phase is not looked up again in later ones.

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::collector::Collector;
use crate::errors::SyncError;
use crate::reconcile::{ReconcileOptions, Reconciler};
use crate::registry::Registry;
use crate::report::{PhaseReport, PhaseStats, PhaseStatus, RunReport, RunStatus};
use crate::state_machine::{RunInput, RunState, StateMachine};

/// Runs collectors against a registry
pub struct SyncOrchestrator<'r, R: Registry + ?Sized> {
    registry: &'r R,
    options: ReconcileOptions,
}

impl<'r, R: Registry + ?Sized> SyncOrchestrator<'r, R> {
    pub fn new(registry: &'r R, options: ReconcileOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Run every phase of `collector` and report the outcome
    ///
    /// Never returns an error: setup failures end as
    /// [`RunStatus::Aborted`], phase failures as [`PhaseStatus::Failed`].
    pub async fn run<C: Collector + ?Sized>(&self, collector: &C) -> RunReport {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let source = collector.source().to_string();
        info!(%run_id, source = %source, registry = self.registry.name(), "sync run starting");

        let mut phases = Vec::new();
        let status = match self.drive(collector, &mut phases).await {
            Ok(()) => RunStatus::Done,
            Err(reason) => {
                error!(%run_id, source = %source, reason = %reason, "sync run aborted");
                RunStatus::Aborted(reason)
            }
        };

        let report = RunReport {
            run_id,
            source,
            started_at,
            finished_at: Utc::now(),
            status,
            phases,
        };
        info!(
            %run_id,
            source = %report.source,
            success = report.success(),
            totals = %report.totals(),
            "sync run finished"
        );
        report
    }

    async fn drive<C: Collector + ?Sized>(
        &self,
        collector: &C,
        phases: &mut Vec<PhaseReport>,
    ) -> Result<(), String> {
        let mut state = RunState::Init;

        if let Err(err) = collector.validate() {
            return abort(&mut state, SyncError::from(err));
        }
        advance(&mut state, RunInput::Validated)?;

        if let Err(err) = self.registry.health_check().await {
            let err = SyncError::Connectivity(format!("{}: {}", self.registry.name(), err));
            return abort(&mut state, err);
        }
        let session = match collector.authenticate().await {
            Ok(session) => session,
            Err(err) => return abort(&mut state, SyncError::from(err)),
        };

        let names = collector.phases();
        advance(&mut state, RunInput::Authenticated { phases: names.len() })?;

        let mut reconciler = Reconciler::new(self.registry, self.options.clone());
        for name in names {
            debug!(state = %state, phase = %name, "entering phase");
            let report = run_phase(collector, &session, &mut reconciler, &name).await;
            phases.push(report);
            advance(&mut state, RunInput::PhaseFinished)?;
        }

        debug!(state = %state, "run complete");
        Ok(())
    }
}

fn advance(state: &mut RunState, input: RunInput) -> Result<(), String> {
    let (next, ()) = state.transition(&input).map_err(|e| e.to_string())?;
    *state = next;
    Ok(())
}

fn abort(state: &mut RunState, err: SyncError) -> Result<(), String> {
    let reason = err.to_string();
    advance(state, RunInput::SetupFailed(reason.clone()))?;
    Err(reason)
}

async fn run_phase<C, R>(
    collector: &C,
    session: &C::Session,
    reconciler: &mut Reconciler<'_, R>,
    phase: &str,
) -> PhaseReport
where
    C: Collector + ?Sized,
    R: Registry + ?Sized,
{
    let source = collector.source();

    let records = match collector.fetch_snapshot(session, phase).await {
        Ok(records) => records,
        Err(err) => {
            let err = SyncError::from(err);
            warn!(source, phase, error = %err, "phase fetch failed");
            return PhaseReport {
                phase: phase.to_string(),
                status: PhaseStatus::Failed(err.to_string()),
                records: 0,
                stats: PhaseStats::default(),
                failures: Vec::new(),
            };
        }
    };

    let count = records.len();
    info!(source, phase, records = count, "reconciling phase");
    let result = reconciler.reconcile(records).await;
    let (stats, failures) = reconciler.finish_phase();

    let status = match result {
        Ok(()) => {
            info!(source, phase, stats = %stats, "phase completed");
            PhaseStatus::Completed
        }
        Err(err) => {
            error!(source, phase, error = %err, stats = %stats, "phase failed");
            PhaseStatus::Failed(err.to_string())
        }
    };

    PhaseReport {
        phase: phase.to_string(),
        status,
        records: count,
        stats,
        failures,
    }
}
