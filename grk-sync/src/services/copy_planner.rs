//! Copy Planner
//!
//! Expands [`CopyUnit`]s into file-level copy entries. Only files whose content
//! sniffs as image or video are planned; the extension is not consulted.
//!
//! Destination layout: `destination_root/<grk label>/<procedure date>/<relative path>`

use super::folder_scanner::{FolderScanner, ScanError};
use grk_common::{CopyUnit, Error, Result};
use infer::MatcherType;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One file to copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyEntry {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Source size in bytes at planning time
    pub size: u64,
}

/// File-level copy plan
#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyPlan {
    pub entries: Vec<CopyEntry>,
    /// Unit folders that no longer exist
    pub missing_sources: Vec<PathBuf>,
    pub total_bytes: u64,
}

impl CopyPlan {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Split into parallel source and destination lists
    pub fn transfer_lists(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        self.entries
            .iter()
            .map(|e| (e.source.clone(), e.destination.clone()))
            .unzip()
    }
}

/// Copy planner
#[derive(Debug, Clone)]
pub struct CopyPlanner {
    destination_root: PathBuf,
    scanner: FolderScanner,
    create_directories: bool,
}

impl CopyPlanner {
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            scanner: FolderScanner::default(),
            create_directories: true,
        }
    }

    /// Plan without touching the destination tree (dry run)
    pub fn without_directory_creation(mut self) -> Self {
        self.create_directories = false;
        self
    }

    /// Use a scanner with a custom ignore list
    pub fn with_scanner(mut self, scanner: FolderScanner) -> Self {
        self.scanner = scanner;
        self
    }

    /// Plan the copy of every media file of every unit
    ///
    /// Parent folders of planned destinations are created here unless disabled; a
    /// unit without media files creates nothing.
    pub fn plan(&self, units: &[CopyUnit]) -> Result<CopyPlan> {
        let mut plan = CopyPlan::default();
        let mut planned: HashSet<(PathBuf, PathBuf)> = HashSet::new();

        for unit in units {
            let files = match self.scanner.list_files(&unit.source_directory) {
                Ok(files) => files,
                Err(ScanError::PathNotFound(dir)) => {
                    warn!(
                        source = %dir.display(),
                        label = %unit.target_label,
                        "Source folder vanished, skipping"
                    );
                    if !plan.missing_sources.contains(&dir) {
                        plan.missing_sources.push(dir);
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut unit_files = 0usize;
            for source in files {
                if !is_media_file(&source) {
                    debug!(file = %source.display(), "Not a media file, skipped");
                    continue;
                }

                let destination = self.destination_for(unit, &source)?;
                if !planned.insert((source.clone(), destination.clone())) {
                    continue;
                }

                let size = std::fs::metadata(&source)
                    .map_err(|e| Error::io_at(&source, e))?
                    .len();
                if self.create_directories {
                    if let Some(parent) = destination.parent() {
                        std::fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
                    }
                }

                plan.total_bytes += size;
                plan.entries.push(CopyEntry {
                    source,
                    destination,
                    size,
                });
                unit_files += 1;
            }

            debug!(
                source = %unit.source_directory.display(),
                label = %unit.target_label,
                procedure_date = %unit.procedure_date,
                files = unit_files,
                "Unit planned"
            );
        }

        info!(
            files = plan.entries.len(),
            total_bytes = plan.total_bytes,
            missing_sources = plan.missing_sources.len(),
            "Copy plan ready"
        );

        Ok(plan)
    }

    fn destination_for(&self, unit: &CopyUnit, source: &Path) -> Result<PathBuf> {
        let relative = source.strip_prefix(&unit.source_directory).map_err(|_| {
            Error::Internal(format!(
                "{} is not below {}",
                source.display(),
                unit.source_directory.display()
            ))
        })?;
        let relative = relative.to_string_lossy().replace('\\', "/");

        let destination = format!(
            "{}/{}/{}/{}",
            self.destination_root.to_string_lossy().replace('\\', "/"),
            unit.target_label,
            unit.procedure_date,
            relative
        );
        Ok(PathBuf::from(destination))
    }
}

/// True when the file content sniffs as an image or a video
pub fn is_media_file(path: &Path) -> bool {
    match infer::get_from_path(path) {
        Ok(Some(kind)) => matches!(kind.matcher_type(), MatcherType::Image | MatcherType::Video),
        Ok(None) => false,
        Err(e) => {
            warn!(file = %path.display(), error = %e, "Cannot sniff file type");
            false
        }
    }
}
