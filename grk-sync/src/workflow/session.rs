//! Sync session orchestrator

use crate::extractors::RecordExtractor;
use crate::models::{SyncReport, SyncRequest};
use crate::services::{reconcile, CopyPlanner, FolderScanner, RecordStore, TransferExecutor};
use chrono::Utc;
use grk_common::events::{EventBus, SyncEvent};
use grk_common::{Error, PatientRecord, Result, SyncConfig};
use tracing::{info, warn};
use uuid::Uuid;

/// Runs sync sessions with one immutable configuration
#[derive(Debug, Clone)]
pub struct SyncSession {
    config: SyncConfig,
    event_bus: EventBus,
    extractor: RecordExtractor,
    store: RecordStore,
}

impl SyncSession {
    /// Build the session components; fails on an invalid folder pattern
    pub fn new(config: SyncConfig, event_bus: EventBus) -> Result<Self> {
        let extractor = RecordExtractor::new(&config)?;
        let store = RecordStore::new(&config);
        Ok(Self {
            config,
            event_bus,
            extractor,
            store,
        })
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Run one sync end to end
    ///
    /// The registry is written only after the transfer reported completion; any
    /// error before that leaves it untouched.
    pub async fn run(&self, request: &SyncRequest) -> Result<SyncReport> {
        request.validate()?;

        let session_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            session_id = %session_id,
            source = %request.source_root.display(),
            destination = %request.destination_root.display(),
            registry = %request.registry_path.display(),
            dry_run = request.dry_run,
            "Sync session started"
        );
        self.event_bus.emit_lossy(SyncEvent::SessionStarted {
            session_id,
            source_root: request.source_root.clone(),
            destination_root: request.destination_root.clone(),
            timestamp: started_at,
        });

        if !request.dry_run {
            std::fs::create_dir_all(&request.destination_root)
                .map_err(|e| Error::io_at(&request.destination_root, e))?;
        }

        let existing = self.store.load(&request.registry_path)?;
        if !request.dry_run {
            self.store.ensure_writable(&request.registry_path)?;
        }

        let candidates: Vec<PatientRecord> =
            self.extractor.extract(&request.source_root)?.collect();
        info!(session_id = %session_id, candidates = candidates.len(), "Extraction complete");
        self.event_bus.emit_lossy(SyncEvent::ExtractionCompleted {
            session_id,
            candidates: candidates.len(),
        });
        let candidate_count = candidates.len();

        let reconciliation = reconcile(existing, candidates)?;
        self.event_bus.emit_lossy(SyncEvent::ReconciliationCompleted {
            session_id,
            rows: reconciliation.table.len(),
            fresh_numbers: reconciliation.stats.fresh_numbers,
            copy_units: reconciliation.copy_units.len(),
        });

        let mut planner = CopyPlanner::new(&request.destination_root)
            .with_scanner(FolderScanner::new(self.config.scan.ignore_patterns.clone()));
        if request.dry_run {
            planner = planner.without_directory_creation();
        }
        let plan = planner.plan(&reconciliation.copy_units)?;
        for missing in &plan.missing_sources {
            warn!(session_id = %session_id, source = %missing.display(), "Source folder missing at plan time");
        }
        self.event_bus.emit_lossy(SyncEvent::PlanReady {
            session_id,
            files: plan.entries.len(),
            total_bytes: plan.total_bytes,
            missing_sources: plan.missing_sources.len(),
        });

        let mut report = SyncReport {
            session_id,
            dry_run: request.dry_run,
            candidates: candidate_count,
            reconcile: reconciliation.stats,
            registry_rows: reconciliation.table.len(),
            copy_units: reconciliation.copy_units.clone(),
            planned_files: plan.entries.len(),
            planned_bytes: plan.total_bytes,
            missing_sources: plan.missing_sources.clone(),
            transfer: None,
            registry_saved: false,
            started_at,
            ended_at: started_at,
        };

        if !request.dry_run {
            let (sources, destinations) = plan.transfer_lists();
            let mut executor = TransferExecutor::new(self.event_bus.clone())
                .with_chunk_size(self.config.transfer.chunk_size)
                .with_destination_root(&request.destination_root);
            executor.set_transfer_list(sources, destinations)?;

            let summary = executor.begin()?.wait().await?;
            report.transfer = Some(summary);

            self.store
                .save(&reconciliation.table, &request.registry_path)?;
            report.registry_saved = true;
            self.event_bus.emit_lossy(SyncEvent::RegistrySaved {
                session_id,
                path: request.registry_path.clone(),
                rows: reconciliation.table.len(),
            });
        }

        report.ended_at = Utc::now();
        info!(
            session_id = %session_id,
            registry_rows = report.registry_rows,
            fresh_numbers = report.reconcile.fresh_numbers,
            planned_files = report.planned_files,
            dry_run = report.dry_run,
            "Sync session completed"
        );
        self.event_bus.emit_lossy(SyncEvent::SessionCompleted {
            session_id,
            dry_run: request.dry_run,
            timestamp: report.ended_at,
        });

        Ok(report)
    }
}
