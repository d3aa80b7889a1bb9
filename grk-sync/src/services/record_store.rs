//! Registry spreadsheet adapter
//!
//! Loads the registry tab into a [`RecordTable`] and writes it back. The tab
//! name and the five column headers come from [`RegistryConfig`]; columns are
//! located by header so their order in an existing file does not matter.
//!
//! Writes go to `<registry>.tmp` first and are renamed over the target, so a
//! failed save leaves the previous registry untouched.

use calamine::{open_workbook, Data, Range, Reader, Xlsx};
use grk_common::config::RegistryConfig;
use grk_common::dates::to_registry_date;
use grk_common::{Error, PatientRecord, RecordTable, Result, SyncConfig};
use rust_xlsxwriter::{Format, Workbook};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column positions of the registry fields inside the tab
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    grk_number: usize,
    name: usize,
    birth_date: usize,
    procedure_date: usize,
    patient_id: usize,
}

/// Registry spreadsheet store
#[derive(Debug, Clone)]
pub struct RecordStore {
    config: RegistryConfig,
}

static EMPTY_CELL: Data = Data::Empty;

impl RecordStore {
    pub fn new(config: &SyncConfig) -> Self {
        Self::with_registry_config(config.registry.clone())
    }

    pub fn with_registry_config(config: RegistryConfig) -> Self {
        Self { config }
    }

    /// Load the registry
    ///
    /// A registry that does not exist yet loads as an empty table; it is created
    /// by the first [`save`](Self::save).
    pub fn load(&self, path: &Path) -> Result<RecordTable> {
        if !path.exists() {
            info!(path = %path.display(), "Registry not found, starting with an empty table");
            return Ok(RecordTable::new());
        }

        let mut workbook: Xlsx<_> = open_workbook(path).map_err(|e| {
            Error::Spreadsheet(format!("Cannot open {}: {}", path.display(), e))
        })?;

        if !workbook
            .sheet_names()
            .iter()
            .any(|n| n == &self.config.sheet_name)
        {
            return Err(Error::Schema {
                path: path.to_path_buf(),
                message: format!("missing tab '{}'", self.config.sheet_name),
            });
        }

        let range = workbook
            .worksheet_range(&self.config.sheet_name)
            .map_err(|e| Error::Spreadsheet(format!("Cannot read {}: {}", path.display(), e)))?;

        let table = self.table_from_range(&range, path)?;
        info!(path = %path.display(), rows = table.len(), "Registry loaded");
        Ok(table)
    }

    fn table_from_range(&self, range: &Range<Data>, path: &Path) -> Result<RecordTable> {
        let mut rows = range.rows();

        let Some(header) = rows.next() else {
            return Ok(RecordTable::new());
        };
        let columns = self.locate_columns(header, path)?;

        let mut table = RecordTable::new();
        for (offset, row) in rows.enumerate() {
            if row.iter().all(|c| matches!(c, Data::Empty)) {
                continue;
            }
            let cell = |idx: usize| row.get(idx).unwrap_or(&EMPTY_CELL);

            let grk_number = cell_to_grk_number(cell(columns.grk_number)).map_err(|message| {
                Error::Schema {
                    path: path.to_path_buf(),
                    message: format!("data row {}: {}", offset + 1, message),
                }
            })?;

            table.push(PatientRecord {
                grk_number,
                patient_id: cell_to_string(cell(columns.patient_id)).unwrap_or_default(),
                name: cell_to_string(cell(columns.name)),
                birth_date: cell_to_string(cell(columns.birth_date)).unwrap_or_default(),
                procedure_date: cell_to_string(cell(columns.procedure_date)).unwrap_or_default(),
                source_directory: None,
                provenance: None,
            });
        }

        Ok(table)
    }

    fn locate_columns(&self, header: &[Data], path: &Path) -> Result<ColumnMap> {
        let position = |wanted: &str| -> Result<usize> {
            header
                .iter()
                .position(|c| cell_to_string(c).as_deref() == Some(wanted))
                .ok_or_else(|| Error::Schema {
                    path: path.to_path_buf(),
                    message: format!("missing column '{}'", wanted),
                })
        };

        let cols = &self.config.columns;
        Ok(ColumnMap {
            grk_number: position(&cols.grk_number)?,
            name: position(&cols.name)?,
            birth_date: position(&cols.birth_date)?,
            procedure_date: position(&cols.procedure_date)?,
            patient_id: position(&cols.patient_id)?,
        })
    }

    /// Fail unless the registry can be opened for writing
    ///
    /// Catches a registry held open by another program before any file is copied.
    /// Nothing is truncated or modified.
    pub fn ensure_writable(&self, path: &Path) -> Result<()> {
        if path.exists() {
            OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| Error::io_at(path, e))?;
        } else {
            let parent = registry_parent(path);
            if !parent.is_dir() {
                return Err(Error::NotFound(format!(
                    "Registry folder {}",
                    parent.display()
                )));
            }
        }
        debug!(path = %path.display(), "Registry is writable");
        Ok(())
    }

    /// Overwrite the registry with `table`
    ///
    /// Run-only fields are not columns and are therefore dropped.
    pub fn save(&self, table: &RecordTable, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(&self.config.sheet_name)
            .map_err(xlsx_error)?;

        for (col, title) in self.config.columns.ordered().iter().enumerate() {
            worksheet
                .write_string_with_format(0, col as u16, *title, &header_format)
                .map_err(xlsx_error)?;
        }

        for (idx, record) in table.rows().iter().enumerate() {
            let row = idx as u32 + 1;
            if let Some(grk) = record.grk_number {
                worksheet.write_number(row, 0, grk as f64).map_err(xlsx_error)?;
            }
            if let Some(name) = &record.name {
                worksheet.write_string(row, 1, name).map_err(xlsx_error)?;
            }
            worksheet
                .write_string(row, 2, &record.birth_date)
                .map_err(xlsx_error)?;
            worksheet
                .write_string(row, 3, &record.procedure_date)
                .map_err(xlsx_error)?;
            worksheet
                .write_string(row, 4, &record.patient_id)
                .map_err(xlsx_error)?;
        }

        let temp_path = temp_path_for(path);
        workbook.save(&temp_path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            xlsx_error(e)
        })?;
        std::fs::rename(&temp_path, path).map_err(|e| {
            let _ = std::fs::remove_file(&temp_path);
            Error::io_at(path, e)
        })?;

        info!(path = %path.display(), rows = table.len(), "Registry saved");
        Ok(())
    }
}

fn xlsx_error(err: rust_xlsxwriter::XlsxError) -> Error {
    match err {
        rust_xlsxwriter::XlsxError::IoError(e) => Error::Io(e),
        other => Error::Spreadsheet(other.to_string()),
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn registry_parent(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Text of a cell; blank cells are `None`
///
/// Whole numbers lose their `.0` (ids typed into a numeric column), spreadsheet
/// dates are rendered `DD.MM.YYYY`.
fn cell_to_string(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::Empty | Data::Error(_) => return None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| to_registry_date(d.date()))
            .unwrap_or_else(|| dt.as_f64().to_string()),
    };
    (!text.is_empty()).then_some(text)
}

/// GRK number of a cell; blank cells are `None`
///
/// Anything that is not a whole number in `1..=u32::MAX` is rejected rather than
/// coerced.
fn cell_to_grk_number(cell: &Data) -> std::result::Result<Option<u32>, String> {
    match cell {
        Data::Empty => Ok(None),
        Data::String(s) if s.trim().is_empty() => Ok(None),
        Data::Int(i) => grk_from_int(*i).map(Some),
        Data::Float(f) => grk_from_float(*f).map(Some),
        Data::String(s) => {
            let text = s.trim();
            if let Ok(i) = text.parse::<i64>() {
                grk_from_int(i).map(Some)
            } else if let Ok(f) = text.parse::<f64>() {
                grk_from_float(f).map(Some)
            } else {
                Err(format!("GRK number '{}' is not a number", text))
            }
        }
        other => Err(format!("GRK number cell {:?} is not a number", other)),
    }
}

fn grk_from_int(value: i64) -> std::result::Result<u32, String> {
    u32::try_from(value)
        .ok()
        .filter(|n| *n >= 1)
        .ok_or_else(|| format!("GRK number {} is out of range", value))
}

fn grk_from_float(value: f64) -> std::result::Result<u32, String> {
    if !value.is_finite() || value.fract() != 0.0 {
        return Err(format!("GRK number {} is not a whole number", value));
    }
    if value < 1.0 || value > f64::from(u32::MAX) {
        return Err(format!("GRK number {} is out of range", value));
    }
    Ok(value as u32)
}
