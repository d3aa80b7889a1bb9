//! Core types and trait definitions for record extraction
//!
//! A scan of the source tree produces [`SourceUnit`]s. Each unit is run through an
//! ordered chain of [`RecordStrategy`] implementations; the first strategy that
//! returns a record wins and later strategies are not consulted.

use grk_common::PatientRecord;
use std::path::{Path, PathBuf};

/// One discovered unit of the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceUnit {
    /// An XML export; its folder is the record's source directory
    XmlDocument(PathBuf),
    /// Any other walked path, candidate for folder-name matching
    Path(PathBuf),
}

impl SourceUnit {
    /// Filesystem path of the unit
    pub fn path(&self) -> &Path {
        match self {
            SourceUnit::XmlDocument(p) | SourceUnit::Path(p) => p,
        }
    }

    /// True for XML exports
    pub fn is_xml(&self) -> bool {
        matches!(self, SourceUnit::XmlDocument(_))
    }
}

/// One way of turning a unit into a candidate record
///
/// Implementations never fail: anything they cannot interpret yields `None` so
/// the next strategy in the chain gets its turn.
pub trait RecordStrategy: Send + Sync {
    /// Strategy name, recorded as provenance when no finer name applies
    fn name(&self) -> &str;

    /// Try to extract a candidate record from the unit
    fn extract(&self, unit: &SourceUnit) -> Option<PatientRecord>;
}
