//! Folder-name pattern extraction
//!
//! Recorder software encodes patient data in the name of the folder it writes a
//! case into. Each configured pattern is a regex over the full `/`-separated path
//! with named groups for the fields. The unit's directory is the path prefix up to
//! the end of the last capture group, i.e. through the trailing numeric run.

use super::normalize_patient_id;
use crate::types::{RecordStrategy, SourceUnit};
use grk_common::config::{FolderPatternConfig, BIRTH_PATTERN_GROUPS};
use grk_common::dates::{from_parts, BIRTH_DATE_UNKNOWN};
use grk_common::records::compose_name;
use grk_common::{Error, PatientRecord, Result};
use regex::{Captures, Regex};
use std::path::{Path, PathBuf};

/// A compiled folder pattern
#[derive(Debug, Clone)]
struct CompiledPattern {
    name: String,
    regex: Regex,
    has_birth_date: bool,
}

/// Folder pattern strategy; patterns are tried in priority order
#[derive(Debug, Clone)]
pub struct FolderPatternStrategy {
    patterns: Vec<CompiledPattern>,
}

impl FolderPatternStrategy {
    /// Compile the pattern table
    ///
    /// Every regex is wrapped in `^(?:…)$` so only full-path matches count.
    pub fn new(patterns: &[FolderPatternConfig]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                // Validates the capture groups
                let raw = p.compile()?;
                let has_birth_date = raw
                    .capture_names()
                    .flatten()
                    .any(|n| BIRTH_PATTERN_GROUPS.contains(&n));
                let regex = Regex::new(&format!("^(?:{})$", p.regex)).map_err(|e| {
                    Error::Config(format!("Pattern '{}' does not compile: {}", p.name, e))
                })?;
                Ok(CompiledPattern {
                    name: p.name.clone(),
                    regex,
                    has_birth_date,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    /// Match a path against the patterns, first valid match wins
    pub fn match_path(&self, path: &Path) -> Option<PatientRecord> {
        let normalized = path.to_string_lossy().replace('\\', "/");

        self.patterns.iter().find_map(|pattern| {
            let caps = pattern.regex.captures(&normalized)?;
            let record = pattern.build_record(&caps);
            if record.is_none() {
                tracing::debug!(
                    path = %normalized,
                    pattern = %pattern.name,
                    "Pattern matched but patient id is invalid"
                );
            }
            record
        })
    }
}

impl CompiledPattern {
    fn build_record(&self, caps: &Captures<'_>) -> Option<PatientRecord> {
        let patient_id = normalize_patient_id(group(caps, "patient_id"))?;

        let directory_end = caps.iter().skip(1).flatten().map(|m| m.end()).max()?;
        let whole = caps.get(0)?.as_str();
        let directory = PathBuf::from(&whole[..directory_end]);

        let birth_date = if self.has_birth_date
            && BIRTH_PATTERN_GROUPS.iter().all(|g| caps.name(g).is_some())
        {
            from_parts(group(caps, "birth_year"), group(caps, "birth_month"), group(caps, "birth_day"))
        } else {
            BIRTH_DATE_UNKNOWN.to_string()
        };

        let record = PatientRecord::candidate(
            patient_id,
            compose_name(group(caps, "family"), group(caps, "given")),
            birth_date,
            from_parts(group(caps, "op_year"), group(caps, "op_month"), group(caps, "op_day")),
            directory,
        )
        .with_provenance(self.name.clone());

        Some(record)
    }
}

fn group<'h>(caps: &Captures<'h>, name: &str) -> &'h str {
    caps.name(name).map(|m| m.as_str()).unwrap_or("")
}

impl RecordStrategy for FolderPatternStrategy {
    fn name(&self) -> &str {
        "folder_pattern"
    }

    fn extract(&self, unit: &SourceUnit) -> Option<PatientRecord> {
        self.match_path(unit.path())
    }
}
