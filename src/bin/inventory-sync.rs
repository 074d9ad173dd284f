// Copyright (c) 2025 - Cowboy AI, Inc.
//! Inventory Sync CLI
//!
//! Reconciles one or more live sources into NetBox, one run per source.
//!
//! Run with: cargo run --bin inventory-sync -- docker truenas
//!
//! Prerequisites:
//! 1. NetBox API accessible (via NETBOX_URL environment variable)
//! 2. NetBox API token set (via NETBOX_TOKEN environment variable)
//! 3. Source credentials set (OMADA_*, OPNSENSE_*, TRUENAS_*, DOCKER_HOST)
//!
//! `--dry-run` reconciles into an in-memory registry instead of NetBox and
//! `--snapshot FILE` replays a recorded snapshot instead of live sources.
//! The process exits non-zero when any run aborted or any phase failed.

use anyhow::{Context, Result};
use clap::Parser;
use cim_inventory_sync::{
    collector::{
        Collector, DockerCollector, OmadaCollector, OpnsenseCollector, SnapshotCollector,
        TrueNasCollector,
    },
    config::log_filter,
    registry::{InMemoryRegistry, NetBoxRegistry, Registry},
    AdapterError, ReconcileOptions, RunReport, RunStatus, Source, SyncConfig, SyncOrchestrator,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "inventory-sync")]
#[command(about = "Reconcile live infrastructure inventory into NetBox")]
struct Args {
    /// Sources to sync, in order (default: all)
    #[arg(value_enum)]
    sources: Vec<Source>,

    /// Replay a recorded snapshot file instead of live sources
    #[arg(long, conflicts_with = "sources")]
    snapshot: Option<PathBuf>,

    /// Reconcile into an in-memory registry; NetBox is never contacted
    #[arg(long)]
    dry_run: bool,

    /// Print the run reports as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Emit log lines as JSON
    #[arg(long, env = "SYNC_LOG_JSON")]
    log_json: bool,
}

async fn run_collector<C>(
    registry: &dyn Registry,
    options: ReconcileOptions,
    collector: Result<C, AdapterError>,
    source: &str,
) -> RunReport
where
    C: Collector,
{
    match collector {
        Ok(collector) => SyncOrchestrator::new(registry, options).run(&collector).await,
        Err(err) => {
            error!("❌ Could not set up {} collector: {}", source, err);
            RunReport::aborted(source, err.to_string())
        }
    }
}

async fn run_source(registry: &dyn Registry, config: &SyncConfig, source: Source) -> RunReport {
    let options = config.reconcile_options(source);
    let name = source.as_str();
    match source {
        Source::Docker => {
            let collector = DockerCollector::new(config.docker.clone());
            run_collector(registry, options, collector, name).await
        }
        Source::Omada => {
            let collector = OmadaCollector::new(config.omada.clone());
            run_collector(registry, options, collector, name).await
        }
        Source::Opnsense => {
            let collector = OpnsenseCollector::new(config.opnsense.clone());
            run_collector(registry, options, collector, name).await
        }
        Source::Truenas => {
            let collector = TrueNasCollector::new(config.truenas.clone());
            run_collector(registry, options, collector, name).await
        }
    }
}

fn log_report(report: &RunReport) {
    match &report.status {
        RunStatus::Aborted(reason) => {
            error!("❌ {}: aborted: {}", report.source, reason);
            return;
        }
        RunStatus::Done => {}
    }
    for phase in &report.phases {
        if phase.succeeded() {
            info!("✅ {}/{}: {}", report.source, phase.phase, phase.stats);
        } else {
            warn!("⚠️ {}/{}: failed: {:?}", report.source, phase.phase, phase.status);
        }
        for failure in &phase.failures {
            warn!(
                "  - skipped {} '{}' ({}): {}",
                failure.kind, failure.name, failure.error, failure.message
            );
        }
    }
    info!("📊 {} totals: {}", report.source, report.totals());
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG wins over the info default
    let filter = log_filter(std::env::var("RUST_LOG").ok().as_deref());
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("🚀 Starting inventory sync");

    let config = SyncConfig::from_env().context("Invalid sync configuration")?;

    let memory = InMemoryRegistry::new();
    let netbox;
    let registry: &dyn Registry = if args.dry_run {
        info!("🧪 Dry run: reconciling into an in-memory registry");
        &memory
    } else {
        let netbox_config = config
            .require_netbox()
            .context("NETBOX_TOKEN not set (or use --dry-run)")?;
        info!("🔧 NetBox URL: {}", netbox_config.base_url);
        netbox = NetBoxRegistry::new(netbox_config.clone())
            .context("Failed to create NetBox client")?;
        &netbox
    };

    let mut reports = Vec::new();
    if let Some(path) = &args.snapshot {
        let collector = SnapshotCollector::from_file(path)
            .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
        let options = match collector.source.parse::<Source>() {
            Ok(source) => config.reconcile_options(source),
            Err(_) => ReconcileOptions {
                custom_fields: config.custom_fields,
                ..ReconcileOptions::default()
            },
        };
        info!("📼 Replaying snapshot of {}", collector.source);
        reports.push(SyncOrchestrator::new(registry, options).run(&collector).await);
    } else {
        let sources = if args.sources.is_empty() {
            Source::ALL.to_vec()
        } else {
            args.sources.clone()
        };
        for source in sources {
            info!("🔌 Syncing {}", source);
            reports.push(run_source(registry, &config, source).await);
        }
    }

    for report in &reports {
        log_report(report);
    }
    if args.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to encode reports")?;
        println!("{}", json);
    }

    if reports.iter().all(RunReport::success) {
        info!("✅ Inventory sync complete");
        Ok(())
    } else {
        error!("❌ Inventory sync finished with failures");
        std::process::exit(1);
    }
}
