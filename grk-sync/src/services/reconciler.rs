//! Reconciliation Engine
//!
//! Merges this run's candidate records into the registry table and hands out GRK
//! numbers.
//!
//! # Algorithm
//! 1. Existing rows followed by candidate rows
//! 2. Keep the first row per `(patient_id, procedure_date)`
//! 3. Drop rows without a name
//! 4. Unnumbered rows, in table order:
//!    - patient id shared with another row → first sibling number, else fresh
//!    - `(name, birth_date)` shared with another row → first number among the
//!      identity-view rows with the same name, else fresh
//!    - otherwise fresh
//!
//! Fresh numbers start at `max + 1` and are handed out densely; running past
//! `u32::MAX` is an error, never a wrap. The duplicate
//! views are snapshots: invalidated after each assignment, recomputed before the
//! next lookup, so a number assigned to one row is visible to its later siblings.

use grk_common::records::grk_label;
use grk_common::{CopyUnit, Error, PatientRecord, RecordTable, Result};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Counters of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    /// Rows loaded from the registry
    pub existing_rows: usize,
    /// Candidate records received
    pub candidates: usize,
    /// Candidates rejected for a blank patient id
    pub invalid_candidates: usize,
    /// Rows dropped as `(patient_id, procedure_date)` duplicates
    pub duplicates_dropped: usize,
    /// Rows dropped for a missing name
    pub nameless_dropped: usize,
    /// GRK numbers handed out for the first time
    pub fresh_numbers: usize,
    /// Rows that took over a sibling's GRK number
    pub reused_numbers: usize,
}

/// Result of [`reconcile`]
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// Merged table, ready to be saved
    pub table: RecordTable,
    /// Folders to copy, in resolution order
    pub copy_units: Vec<CopyUnit>,
    pub stats: ReconcileStats,
}

/// How an unnumbered row got its number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Fresh,
    Reused(u32),
}

/// Rows sharing an identity key with at least one other row
///
/// Holds the shared keys only; membership of a row is a key lookup.
#[derive(Debug, Default)]
struct DuplicateViews {
    patient_ids: HashSet<String>,
    identities: HashSet<(String, String)>,
    stale: bool,
}

impl DuplicateViews {
    fn compute(rows: &[PatientRecord]) -> Self {
        let mut id_counts: HashMap<&str, usize> = HashMap::new();
        let mut identity_counts: HashMap<(&str, &str), usize> = HashMap::new();

        for row in rows {
            if !row.patient_id.is_empty() {
                *id_counts.entry(row.patient_id.as_str()).or_default() += 1;
            }
            if let Some(key) = row.identity_key() {
                *identity_counts.entry(key).or_default() += 1;
            }
        }

        Self {
            patient_ids: id_counts
                .into_iter()
                .filter(|(_, n)| *n > 1)
                .map(|(id, _)| id.to_string())
                .collect(),
            identities: identity_counts
                .into_iter()
                .filter(|(_, n)| *n > 1)
                .map(|((name, birth), _)| (name.to_string(), birth.to_string()))
                .collect(),
            stale: false,
        }
    }

    fn invalidate(&mut self) {
        self.stale = true;
    }

    fn ensure_fresh(&mut self, rows: &[PatientRecord]) {
        if self.stale {
            *self = Self::compute(rows);
        }
    }

    fn in_patient_id_view(&self, row: &PatientRecord) -> bool {
        self.patient_ids.contains(row.patient_id.as_str())
    }

    fn in_identity_view(&self, row: &PatientRecord) -> bool {
        row.identity_key().is_some_and(|(name, birth)| {
            self.identities
                .contains(&(name.to_string(), birth.to_string()))
        })
    }
}

/// Merge `candidates` into `existing` and assign GRK numbers
///
/// Fails only when a fresh number would exceed `u32::MAX`.
pub fn reconcile(
    existing: RecordTable,
    candidates: impl IntoIterator<Item = PatientRecord>,
) -> Result<Reconciliation> {
    let mut stats = ReconcileStats {
        existing_rows: existing.len(),
        ..ReconcileStats::default()
    };

    let mut candidates: Vec<PatientRecord> = candidates.into_iter().collect();
    stats.candidates = candidates.len();
    candidates.retain(|c| !c.patient_id.trim().is_empty());
    stats.invalid_candidates = stats.candidates - candidates.len();

    let merged = RecordTable::from_rows(merge_rows(existing, &candidates, &mut stats));
    let highest = merged.max_grk_number();
    let mut next_id = highest.checked_add(1);
    let mut rows = merged.into_rows();

    let mut views = DuplicateViews::compute(&rows);
    let mut copy_units = Vec::new();

    for idx in 0..rows.len() {
        if rows[idx].grk_number.is_some() {
            continue;
        }
        views.ensure_fresh(&rows);

        let number = match resolve(&rows, idx, &views) {
            Resolution::Reused(number) => {
                stats.reused_numbers += 1;
                number
            }
            Resolution::Fresh => {
                let number = next_id.ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "no GRK number left after {} for patient {}",
                        highest, rows[idx].patient_id
                    ))
                })?;
                next_id = number.checked_add(1);
                stats.fresh_numbers += 1;
                number
            }
        };
        rows[idx].grk_number = Some(number);
        views.invalidate();

        let row = &rows[idx];
        debug!(
            patient_id = %row.patient_id,
            procedure_date = %row.procedure_date,
            grk_number = number,
            "GRK number assigned"
        );

        let label = grk_label(number);
        copy_units.extend(
            candidates
                .iter()
                .filter(|c| c.case_key() == row.case_key())
                .filter_map(|c| c.source_directory.as_ref())
                .map(|dir| CopyUnit {
                    target_label: label.clone(),
                    procedure_date: row.procedure_date.clone(),
                    source_directory: dir.clone(),
                }),
        );
    }

    info!(
        rows = rows.len(),
        candidates = stats.candidates,
        duplicates_dropped = stats.duplicates_dropped,
        nameless_dropped = stats.nameless_dropped,
        fresh_numbers = stats.fresh_numbers,
        reused_numbers = stats.reused_numbers,
        copy_units = copy_units.len(),
        "Reconciliation complete"
    );

    Ok(Reconciliation {
        table: RecordTable::from_rows(rows),
        copy_units,
        stats,
    })
}

/// Steps 1-3: concatenate, dedupe on the case key, drop nameless rows
fn merge_rows(
    existing: RecordTable,
    candidates: &[PatientRecord],
    stats: &mut ReconcileStats,
) -> Vec<PatientRecord> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut rows = Vec::with_capacity(existing.len() + candidates.len());

    for row in existing.into_rows().into_iter().chain(candidates.iter().cloned()) {
        let key = (row.patient_id.clone(), row.procedure_date.clone());
        if !seen.insert(key) {
            stats.duplicates_dropped += 1;
            continue;
        }
        if !row.has_name() {
            stats.nameless_dropped += 1;
            continue;
        }
        rows.push(row);
    }

    rows
}

fn resolve(rows: &[PatientRecord], idx: usize, views: &DuplicateViews) -> Resolution {
    let row = &rows[idx];

    let sibling_number = if views.in_patient_id_view(row) {
        first_number(rows, |r| r.patient_id == row.patient_id)
    } else if views.in_identity_view(row) {
        first_number(rows, |r| views.in_identity_view(r) && r.name == row.name)
    } else {
        None
    };

    match sibling_number {
        Some(number) => Resolution::Reused(number),
        None => Resolution::Fresh,
    }
}

/// First assigned number in table-scan order among rows matching `sibling`
fn first_number(rows: &[PatientRecord], sibling: impl Fn(&PatientRecord) -> bool) -> Option<u32> {
    rows.iter()
        .filter(|r| sibling(r))
        .find_map(|r| r.grk_number)
}
