//! Clinical XML export extraction
//!
//! Two export schemas are understood, told apart by their root element:
//!
//! ```xml
//! <Patient>
//!   <LastName/> <FirstName/> <BirthDate/> <PatientID/> <ProcedureDate/>
//! </Patient>
//!
//! <ExportedTreatment>
//!   <Patient> <LastName/> <FirstName/> <DateOfBirth/> <PatientID/> </Patient>
//!   <Treatment> <StartDate/> </Treatment>
//! </ExportedTreatment>
//! ```
//!
//! Only the fields above are read; everything else in the document is ignored.
//! A document that does not parse, has another root, or lacks a usable procedure
//! date yields no record, so the folder patterns get a chance at the same file.

use super::normalize_patient_id;
use crate::types::{RecordStrategy, SourceUnit};
use grk_common::dates::{normalize_source_date, BIRTH_DATE_UNKNOWN};
use grk_common::records::compose_name;
use grk_common::PatientRecord;
use roxmltree::{Document, Node};
use std::path::Path;

/// Strategy for the flat `Patient` export
#[derive(Debug, Clone)]
pub struct PatientXmlStrategy {
    root_name: String,
}

/// Strategy for the nested `ExportedTreatment` export
#[derive(Debug, Clone)]
pub struct ExportedTreatmentXmlStrategy {
    root_name: String,
}

impl PatientXmlStrategy {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
        }
    }

    fn from_document(&self, doc: &Document<'_>, path: &Path) -> Option<PatientRecord> {
        let root = doc.root_element();
        if root.tag_name().name() != self.root_name {
            return None;
        }

        let procedure_date = normalize_source_date(child_text(root, "ProcedureDate")?)?;
        let birth_date = child_text(root, "BirthDate")
            .and_then(normalize_source_date)
            .unwrap_or_else(|| BIRTH_DATE_UNKNOWN.to_string());

        build_record(
            root,
            child_text(root, "PatientID"),
            birth_date,
            procedure_date,
            path,
            &self.root_name,
        )
    }
}

impl ExportedTreatmentXmlStrategy {
    pub fn new(root_name: impl Into<String>) -> Self {
        Self {
            root_name: root_name.into(),
        }
    }

    fn from_document(&self, doc: &Document<'_>, path: &Path) -> Option<PatientRecord> {
        let root = doc.root_element();
        if root.tag_name().name() != self.root_name {
            return None;
        }

        let patient = child(root, "Patient")?;
        let treatment = child(root, "Treatment")?;

        let procedure_date = child_text(treatment, "StartDate")
            .or_else(|| child_text(treatment, "Date"))
            .and_then(normalize_source_date)?;
        let birth_date = child_text(patient, "DateOfBirth")
            .and_then(normalize_source_date)
            .unwrap_or_else(|| BIRTH_DATE_UNKNOWN.to_string());

        build_record(
            patient,
            child_text(patient, "PatientID"),
            birth_date,
            procedure_date,
            path,
            &self.root_name,
        )
    }
}

impl RecordStrategy for PatientXmlStrategy {
    fn name(&self) -> &str {
        &self.root_name
    }

    fn extract(&self, unit: &SourceUnit) -> Option<PatientRecord> {
        let SourceUnit::XmlDocument(path) = unit else {
            return None;
        };
        with_document(path, |doc| self.from_document(doc, path))
    }
}

impl RecordStrategy for ExportedTreatmentXmlStrategy {
    fn name(&self) -> &str {
        &self.root_name
    }

    fn extract(&self, unit: &SourceUnit) -> Option<PatientRecord> {
        let SourceUnit::XmlDocument(path) = unit else {
            return None;
        };
        with_document(path, |doc| self.from_document(doc, path))
    }
}

/// Read and parse an XML file, then hand the document to `f`
///
/// Unreadable or malformed files are logged and yield `None`.
fn with_document<T>(path: &Path, f: impl FnOnce(&Document<'_>) -> Option<T>) -> Option<T> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "XML export unreadable");
            return None;
        }
    };

    match Document::parse(&text) {
        Ok(doc) => f(&doc),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "XML export malformed");
            None
        }
    }
}

fn build_record(
    name_node: Node<'_, '_>,
    raw_patient_id: Option<&str>,
    birth_date: String,
    procedure_date: String,
    path: &Path,
    provenance: &str,
) -> Option<PatientRecord> {
    let patient_id = normalize_patient_id(raw_patient_id.unwrap_or(""))?;
    let source_directory = path.parent()?;

    let name = compose_name(
        child_text(name_node, "LastName").unwrap_or(""),
        child_text(name_node, "FirstName").unwrap_or(""),
    );

    Some(
        PatientRecord::candidate(patient_id, name, birth_date, procedure_date, source_directory)
            .with_provenance(provenance),
    )
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|n| n.is_element() && n.has_tag_name(name))
}

/// Trimmed, non-empty text of a direct child element
fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Option<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
