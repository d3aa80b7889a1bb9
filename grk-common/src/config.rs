//! Configuration loading
//!
//! All tunables of a sync run live in one immutable [`SyncConfig`] that is handed to
//! the extractor and the registry store at construction. Resolution order:
//! 1. Explicit config file (`--config`), must exist and parse
//! 2. User config file (`~/.config/grk/grk-sync.toml`), optional
//! 3. Compiled defaults
//!
//! Missing optional files never stop a run; they log a warning and fall back.

use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Named capture groups a folder pattern must define
pub const REQUIRED_PATTERN_GROUPS: &[&str] =
    &["family", "given", "patient_id", "op_year", "op_month", "op_day"];

/// Birth date groups; a pattern defines all of them or none
pub const BIRTH_PATTERN_GROUPS: &[&str] = &["birth_year", "birth_month", "birth_day"];

/// Complete configuration of a sync run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub registry: RegistryConfig,
    pub xml: XmlSchemaConfig,
    /// Folder-name patterns in priority order
    pub patterns: Vec<FolderPatternConfig>,
    pub scan: ScanConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

/// Registry spreadsheet layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Name of the tab holding the records
    pub sheet_name: String,
    pub columns: RegistryColumns,
}

/// Header names of the five registry columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryColumns {
    pub grk_number: String,
    pub name: String,
    pub birth_date: String,
    pub procedure_date: String,
    pub patient_id: String,
}

impl RegistryColumns {
    /// Headers in the order they are written
    pub fn ordered(&self) -> [&str; 5] {
        [
            &self.grk_number,
            &self.name,
            &self.birth_date,
            &self.procedure_date,
            &self.patient_id,
        ]
    }
}

/// Root element names of the supported XML exports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XmlSchemaConfig {
    pub patient_root: String,
    pub treatment_root: String,
}

/// One named folder-name pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPatternConfig {
    /// Recorded as the provenance of every record it produces
    pub name: String,
    /// Regex matched against the whole `/`-separated path
    pub regex: String,
}

/// Directory traversal options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Entries whose file name contains one of these are skipped
    pub ignore_patterns: Vec<String>,
}

/// Transfer options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Bytes copied per read/write cycle
    pub chunk_size: usize,
}

/// Logging options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            xml: XmlSchemaConfig::default(),
            patterns: default_patterns(),
            scan: ScanConfig::default(),
            transfer: TransferConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            sheet_name: "Patienten".to_string(),
            columns: RegistryColumns::default(),
        }
    }
}

impl Default for RegistryColumns {
    fn default() -> Self {
        Self {
            grk_number: "GRK Nummer".to_string(),
            name: "Name".to_string(),
            birth_date: "Geburtsdatum".to_string(),
            procedure_date: "OP-Datum".to_string(),
            patient_id: "Patient-ID".to_string(),
        }
    }
}

impl Default for XmlSchemaConfig {
    fn default() -> Self {
        Self {
            patient_root: "Patient".to_string(),
            treatment_root: "ExportedTreatment".to_string(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ignore_patterns: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: 8 * 1024,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Storz-style recorder folder names, highest priority first
///
/// - `full_info`: `family_given_YYYYMMDD(birth)_id_YYYYMMDD(op)_HHMMSS` + two 2-digit runs
/// - `name_id_opdate_time`: `family_given_id_YYYYMMDD(op)_HHMM` + a digit run (no birth date)
pub fn default_patterns() -> Vec<FolderPatternConfig> {
    vec![
        FolderPatternConfig {
            name: "full_info".to_string(),
            regex: r"^.*/(?P<family>.*?)_(?P<given>.*?)_(?P<birth_year>\d{4})(?P<birth_month>\d{2})(?P<birth_day>\d{2})_(?P<patient_id>.*?)_(?P<op_year>\d{4})(?P<op_month>\d{2})(?P<op_day>\d{2})_\d{6}(\d{2})(\d{2}).*$".to_string(),
        },
        FolderPatternConfig {
            name: "name_id_opdate_time".to_string(),
            regex: r"^.*/(?P<family>.*?)_(?P<given>.*?)_(?P<patient_id>.*?)_(?P<op_year>\d{4})(?P<op_month>\d{2})(?P<op_day>\d{2})_(\d{2})(\d{2})(\d+).*$".to_string(),
        },
    ]
}

impl SyncConfig {
    /// Resolve configuration from an explicit file, the user config file, or defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let config = Self::from_file(path)?;
            info!("Configuration loaded from {}", path.display());
            return Ok(config);
        }

        match default_config_path() {
            Some(path) if path.exists() => match Self::from_file(&path) {
                Ok(config) => {
                    info!("Configuration loaded from {}", path.display());
                    Ok(config)
                }
                Err(e) => {
                    warn!("Ignoring user config {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            _ => {
                info!("No config file found, using compiled defaults");
                Ok(Self::default())
            }
        }
    }

    /// Read and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the pattern table and limits
    pub fn validate(&self) -> Result<()> {
        if self.registry.sheet_name.trim().is_empty() {
            return Err(Error::Config("registry.sheet_name must not be empty".to_string()));
        }
        if self.transfer.chunk_size == 0 {
            return Err(Error::Config("transfer.chunk_size must be positive".to_string()));
        }
        for pattern in &self.patterns {
            pattern.compile()?;
        }
        Ok(())
    }
}

impl FolderPatternConfig {
    /// Compile the regex and check its capture groups
    pub fn compile(&self) -> Result<Regex> {
        let regex = Regex::new(&self.regex).map_err(|e| {
            Error::Config(format!("Pattern '{}' does not compile: {}", self.name, e))
        })?;

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        if let Some(missing) = REQUIRED_PATTERN_GROUPS.iter().find(|g| !names.contains(*g)) {
            return Err(Error::Config(format!(
                "Pattern '{}' lacks capture group '{}'",
                self.name, missing
            )));
        }

        let birth_groups = BIRTH_PATTERN_GROUPS
            .iter()
            .filter(|g| names.contains(*g))
            .count();
        if birth_groups != 0 && birth_groups != BIRTH_PATTERN_GROUPS.len() {
            return Err(Error::Config(format!(
                "Pattern '{}' must define all of {:?} or none",
                self.name, BIRTH_PATTERN_GROUPS
            )));
        }

        Ok(regex)
    }
}

/// Platform location of the user config file
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("grk").join("grk-sync.toml"))
}
