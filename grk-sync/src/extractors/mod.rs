//! Record extraction
//!
//! Turns a source tree into a single-pass stream of candidate records.
//!
//! # Strategy chain
//! Every discovered unit runs through the same ordered chain; the first strategy
//! returning a record wins:
//! 1. **PatientXmlStrategy** - flat `Patient` XML export
//! 2. **ExportedTreatmentXmlStrategy** - nested `ExportedTreatment` XML export
//! 3. **FolderPatternStrategy** - folder-name patterns in configured priority order
//!
//! XML units are visited before plain paths. A directory yields at most one
//! candidate: whichever unit claims it first.

pub mod folder_pattern;
pub mod xml_export;

pub use folder_pattern::FolderPatternStrategy;
pub use xml_export::{ExportedTreatmentXmlStrategy, PatientXmlStrategy};

use crate::services::FolderScanner;
use crate::types::{RecordStrategy, SourceUnit};
use grk_common::{PatientRecord, Result, SyncConfig};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Character that may not appear in a patient id
pub const INVALID_ID_SEPARATOR: char = '_';

/// Character introducing a suffix qualifier that is cut off
pub const ID_SUFFIX_SEPARATOR: char = '-';

/// Clean an external patient id
///
/// Rejects the raw id when it contains `_` anywhere, suffix included, then cuts
/// it at the first `-`. An empty remainder is rejected too.
pub fn normalize_patient_id(raw: &str) -> Option<String> {
    if raw.contains(INVALID_ID_SEPARATOR) {
        return None;
    }
    let id = raw.split(ID_SUFFIX_SEPARATOR).next().unwrap_or("").trim();
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}

/// Record extractor
///
/// Built once per run from the immutable [`SyncConfig`].
#[derive(Clone)]
pub struct RecordExtractor {
    scanner: FolderScanner,
    strategies: Arc<[Box<dyn RecordStrategy>]>,
}

impl std::fmt::Debug for RecordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("RecordExtractor")
            .field("scanner", &self.scanner)
            .field("strategies", &names)
            .finish()
    }
}

impl RecordExtractor {
    /// Build the default strategy chain from configuration
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let strategies: Vec<Box<dyn RecordStrategy>> = vec![
            Box::new(PatientXmlStrategy::new(config.xml.patient_root.clone())),
            Box::new(ExportedTreatmentXmlStrategy::new(
                config.xml.treatment_root.clone(),
            )),
            Box::new(FolderPatternStrategy::new(&config.patterns)?),
        ];

        Ok(Self::with_strategies(
            FolderScanner::new(config.scan.ignore_patterns.clone()),
            strategies,
        ))
    }

    /// Build an extractor with an explicit strategy chain
    pub fn with_strategies(scanner: FolderScanner, strategies: Vec<Box<dyn RecordStrategy>>) -> Self {
        Self {
            scanner,
            strategies: strategies.into(),
        }
    }

    /// Scan `root` and return the candidate stream
    ///
    /// Discovery happens here (a missing root is an error); records are produced
    /// lazily as the stream is consumed.
    pub fn extract(&self, root: &Path) -> Result<CandidateRecords> {
        let units = self.scanner.discover_units(root)?;
        info!(
            root = %root.display(),
            units = units.len(),
            "Source tree discovered"
        );

        Ok(CandidateRecords {
            units: units.into_iter(),
            strategies: Arc::clone(&self.strategies),
            claimed: HashSet::new(),
        })
    }
}

/// Single-pass stream of candidate records
pub struct CandidateRecords {
    units: std::vec::IntoIter<SourceUnit>,
    strategies: Arc<[Box<dyn RecordStrategy>]>,
    claimed: HashSet<PathBuf>,
}

impl CandidateRecords {
    fn run_chain(&self, unit: &SourceUnit) -> Option<PatientRecord> {
        self.strategies.iter().find_map(|strategy| {
            strategy.extract(unit).map(|record| {
                if record.provenance.is_some() {
                    record
                } else {
                    record.with_provenance(strategy.name())
                }
            })
        })
    }
}

impl Iterator for CandidateRecords {
    type Item = PatientRecord;

    fn next(&mut self) -> Option<PatientRecord> {
        while let Some(unit) = self.units.next() {
            let Some(record) = self.run_chain(&unit) else {
                continue;
            };
            let Some(directory) = record.source_directory.clone() else {
                continue;
            };
            if !self.claimed.insert(directory) {
                continue;
            }

            debug!(
                unit = %unit.path().display(),
                patient_id = %record.patient_id,
                procedure_date = %record.procedure_date,
                provenance = record.provenance.as_deref().unwrap_or(""),
                "Candidate record extracted"
            );
            return Some(record);
        }
        None
    }
}
