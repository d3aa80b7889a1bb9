//! Registry record model
//!
//! One [`PatientRecord`] is one row of the registry: a patient/procedure pair and
//! the GRK number it was filed under. Candidate records produced while scanning
//! carry two run-only fields (`source_directory`, `provenance`) that are never
//! written back to the registry.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Prefix of the destination folder label for a GRK number
pub const GRK_LABEL_PREFIX: &str = "grk_";

/// Destination folder label for a GRK number (`grk_0007`)
pub fn grk_label(grk_number: u32) -> String {
    format!("{}{:04}", GRK_LABEL_PREFIX, grk_number)
}

/// A patient/procedure row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Sequential internal identifier, `None` until assigned
    pub grk_number: Option<u32>,

    /// External patient identifier (may repeat across procedure dates)
    pub patient_id: String,

    /// `"last, first"`, lower-cased; `None` when the registry row has no name
    pub name: Option<String>,

    /// `DD.MM.YYYY` or [`crate::dates::BIRTH_DATE_UNKNOWN`]
    pub birth_date: String,

    /// `DD.MM.YYYY`
    pub procedure_date: String,

    /// Folder the record was extracted from (run-only)
    #[serde(skip)]
    pub source_directory: Option<PathBuf>,

    /// Extraction strategy or folder pattern that produced the record (run-only)
    #[serde(skip)]
    pub provenance: Option<String>,
}

impl PatientRecord {
    /// Create a candidate record discovered in `source_directory`
    pub fn candidate(
        patient_id: impl Into<String>,
        name: impl Into<String>,
        birth_date: impl Into<String>,
        procedure_date: impl Into<String>,
        source_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            grk_number: None,
            patient_id: patient_id.into(),
            name: Some(name.into()),
            birth_date: birth_date.into(),
            procedure_date: procedure_date.into(),
            source_directory: Some(source_directory.into()),
            provenance: None,
        }
    }

    /// Attach the name of the strategy that produced this record
    pub fn with_provenance(mut self, provenance: impl Into<String>) -> Self {
        self.provenance = Some(provenance.into());
        self
    }

    /// True when the row carries a usable name
    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Uniqueness key of a case
    pub fn case_key(&self) -> (&str, &str) {
        (&self.patient_id, &self.procedure_date)
    }

    /// Fallback identity key (name + birth date)
    pub fn identity_key(&self) -> Option<(&str, &str)> {
        self.name
            .as_deref()
            .map(|name| (name, self.birth_date.as_str()))
    }

    /// Copy without the run-only fields, as persisted in the registry
    pub fn persisted(&self) -> Self {
        Self {
            source_directory: None,
            provenance: None,
            ..self.clone()
        }
    }
}

/// Compose the registry name from its two halves
///
/// Both halves are lower-cased; either may be empty.
pub fn compose_name(family: &str, given: &str) -> String {
    format!(
        "{}, {}",
        family.trim().to_lowercase(),
        given.trim().to_lowercase()
    )
}

/// Ordered registry table; row order is significant for number assignment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTable {
    rows: Vec<PatientRecord>,
}

impl RecordTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `rows` in the given order
    pub fn from_rows(rows: Vec<PatientRecord>) -> Self {
        Self { rows }
    }

    /// Append a row
    pub fn push(&mut self, record: PatientRecord) {
        self.rows.push(record);
    }

    /// Rows in table order
    pub fn rows(&self) -> &[PatientRecord] {
        &self.rows
    }

    /// Consume into rows
    pub fn into_rows(self) -> Vec<PatientRecord> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Highest assigned GRK number, 0 when none is assigned
    pub fn max_grk_number(&self) -> u32 {
        self.rows
            .iter()
            .filter_map(|r| r.grk_number)
            .max()
            .unwrap_or(0)
    }

    /// Find the row for a case key
    pub fn find_case(&self, patient_id: &str, procedure_date: &str) -> Option<&PatientRecord> {
        self.rows
            .iter()
            .find(|r| r.patient_id == patient_id && r.procedure_date == procedure_date)
    }
}

impl FromIterator<PatientRecord> for RecordTable {
    fn from_iter<I: IntoIterator<Item = PatientRecord>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

/// One folder's worth of files to copy under a GRK label
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CopyUnit {
    /// Destination folder label (`grk_0001`)
    pub target_label: String,
    /// Procedure date, used as the second destination level
    pub procedure_date: String,
    /// Folder whose media files are copied
    pub source_directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grk_label_zero_padded() {
        assert_eq!(grk_label(1), "grk_0001");
        assert_eq!(grk_label(42), "grk_0042");
        assert_eq!(grk_label(12345), "grk_12345");
    }

    #[test]
    fn test_compose_name_lowercases_both_halves() {
        assert_eq!(compose_name("Muster", "Max"), "muster, max");
        assert_eq!(compose_name("", "Max"), ", max");
    }

    #[test]
    fn test_max_grk_number_of_empty_table_is_zero() {
        assert_eq!(RecordTable::new().max_grk_number(), 0);
    }

    #[test]
    fn test_has_name() {
        let mut record = PatientRecord::candidate("A1", "smith, john", "00.00.0000", "01.01.2020", "/x");
        assert!(record.has_name());
        record.name = Some("   ".to_string());
        assert!(!record.has_name());
        record.name = None;
        assert!(!record.has_name());
    }

    #[test]
    fn test_persisted_strips_run_only_fields() {
        let record = PatientRecord::candidate("A1", "smith, john", "00.00.0000", "01.01.2020", "/x")
            .with_provenance("full_info");
        let persisted = record.persisted();
        assert_eq!(persisted.source_directory, None);
        assert_eq!(persisted.provenance, None);
        assert_eq!(persisted.patient_id, "A1");
    }
}
