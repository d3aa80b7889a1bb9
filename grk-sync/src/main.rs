//! grk-sync - Patient media sync
//!
//! Matches recorder folders and XML exports below a source tree against the GRK
//! registry spreadsheet, assigns GRK numbers to new cases and copies their image
//! and video files to `destination/grk_NNNN/DD.MM.YYYY/`.
//!
//! All run parameters come from the command line; `--config` only tunes schema
//! names, folder patterns and copy options.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use grk_common::events::{EventBus, SyncEvent};
use grk_common::SyncConfig;
use grk_sync::models::{SyncReport, SyncRequest};
use grk_sync::workflow::SyncSession;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Command-line arguments for grk-sync
#[derive(Parser, Debug)]
#[command(name = "grk-sync")]
#[command(about = "Sync recorder media into the GRK registry layout")]
#[command(version)]
struct Args {
    /// Folder searched for recorder folders and XML exports
    #[arg(short, long)]
    source: PathBuf,

    /// Destination root of the grk_NNNN tree
    #[arg(short, long)]
    destination: PathBuf,

    /// Registry spreadsheet (.xlsx), created if missing
    #[arg(short, long)]
    registry: PathBuf,

    /// Configuration file (TOML); defaults to the user config file if present
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Plan only, copy nothing and leave the registry untouched
    #[arg(long)]
    dry_run: bool,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main]
async fn main() -> ExitCode {
    let filter_handle = init_tracing();
    let args = Args::parse();

    info!(
        "Starting grk-sync v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match run(args, &filter_handle).await {
        Ok(report) => {
            log_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Sync failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `info` until the configured level is known
fn init_tracing() -> FilterHandle {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    handle
}

async fn run(args: Args, filter_handle: &FilterHandle) -> Result<SyncReport> {
    let config = SyncConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    if std::env::var_os("RUST_LOG").is_none() {
        match EnvFilter::try_new(&config.logging.level) {
            Ok(filter) => {
                if let Err(e) = filter_handle.reload(filter) {
                    warn!("Cannot apply log level: {}", e);
                }
            }
            Err(e) => warn!(level = %config.logging.level, "Invalid log level: {}", e),
        }
    }

    let event_bus = EventBus::new(1024);
    let progress_task = tokio::spawn(log_progress(event_bus.subscribe()));

    let session = SyncSession::new(config, event_bus).context("Invalid folder pattern configuration")?;
    let request = SyncRequest::new(&args.source, &args.destination, &args.registry)
        .with_dry_run(args.dry_run);

    let result = session.run(&request).await;

    drop(session);
    let _ = progress_task.await;

    let report = result?;
    if let Some(path) = &args.report {
        write_report(&report, path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
    }
    Ok(report)
}

fn write_report(report: &SyncReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    info!("Report written to {}", path.display());
    Ok(())
}

/// Log transfer progress in 10 % steps until the bus closes
async fn log_progress(mut rx: broadcast::Receiver<SyncEvent>) {
    let mut last_step = None;
    loop {
        match rx.recv().await {
            Ok(SyncEvent::TransferProgress { permille }) => {
                let step = permille / 100;
                if last_step.map_or(true, |last| step > last) {
                    last_step = Some(step);
                    info!("Copy progress: {}%", step * 10);
                }
            }
            Ok(SyncEvent::TransferFailed { message }) => {
                warn!("Copy aborted: {}", message);
            }
            Ok(SyncEvent::SessionCompleted { .. }) | Err(RecvError::Closed) => break,
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!("Progress logger skipped {} events", skipped);
            }
        }
    }
}

fn log_report(report: &SyncReport) {
    info!(
        session_id = %report.session_id,
        candidates = report.candidates,
        registry_rows = report.registry_rows,
        fresh_numbers = report.reconcile.fresh_numbers,
        reused_numbers = report.reconcile.reused_numbers,
        copy_units = report.copy_units.len(),
        planned_files = report.planned_files,
        "Sync summary"
    );

    if let Some(transfer) = &report.transfer {
        info!(
            files_copied = transfer.files_copied,
            files_skipped = transfer.files_skipped,
            bytes_copied = transfer.bytes_copied,
            "Copy summary"
        );
    }

    for missing in &report.missing_sources {
        warn!("Source folder vanished before copying: {}", missing.display());
    }

    if report.dry_run {
        info!("Dry run: nothing copied, registry not written");
    }
}
