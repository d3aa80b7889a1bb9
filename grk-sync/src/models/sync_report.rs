//! Sync run report

use crate::services::{ReconcileStats, TransferSummary};
use chrono::{DateTime, Utc};
use grk_common::CopyUnit;
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

/// Outcome of one sync session
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub session_id: Uuid,

    pub dry_run: bool,

    /// Candidate records extracted from the source tree
    pub candidates: usize,

    pub reconcile: ReconcileStats,

    /// Rows in the merged registry table
    pub registry_rows: usize,

    /// Folders scheduled for copying
    pub copy_units: Vec<CopyUnit>,

    /// Files in the copy plan
    pub planned_files: usize,

    pub planned_bytes: u64,

    /// Unit folders that vanished before planning
    pub missing_sources: Vec<PathBuf>,

    /// `None` for a dry run
    pub transfer: Option<TransferSummary>,

    /// True once the registry was written back
    pub registry_saved: bool,

    pub started_at: DateTime<Utc>,

    pub ended_at: DateTime<Utc>,
}
