//! Configuration file loading
//!
//! - Explicit file must exist and parse
//! - Partial files keep the compiled defaults for everything they omit
//! - Folder patterns are validated at load time

use grk_common::config::{default_patterns, SyncConfig};
use grk_common::Error;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_full_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grk-sync.toml");
    fs::write(
        &path,
        r#"
[registry]
sheet_name = "Faelle"

[registry.columns]
grk_number = "GRK"
name = "Patient"
birth_date = "Geb."
procedure_date = "OP"
patient_id = "PID"

[xml]
patient_root = "PatientExport"

[[patterns]]
name = "dash_separated"
regex = '^.*/(?P<family>[^/]*?)-(?P<given>[^/]*?)-(?P<patient_id>\d+)-(?P<op_year>\d{4})(?P<op_month>\d{2})(?P<op_day>\d{2})(\d+).*$'

[scan]
ignore_patterns = ["@eaDir"]

[transfer]
chunk_size = 65536

[logging]
level = "debug"
"#,
    )
    .unwrap();

    let config = SyncConfig::load(Some(&path)).unwrap();

    assert_eq!(config.registry.sheet_name, "Faelle");
    assert_eq!(
        config.registry.columns.ordered(),
        ["GRK", "Patient", "Geb.", "OP", "PID"]
    );
    assert_eq!(config.xml.patient_root, "PatientExport");
    assert_eq!(config.xml.treatment_root, "ExportedTreatment");
    assert_eq!(config.patterns.len(), 1);
    assert_eq!(config.patterns[0].name, "dash_separated");
    assert_eq!(config.scan.ignore_patterns, vec!["@eaDir".to_string()]);
    assert_eq!(config.transfer.chunk_size, 65536);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn test_empty_file_is_all_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grk-sync.toml");
    fs::write(&path, "").unwrap();

    let config = SyncConfig::load(Some(&path)).unwrap();
    assert_eq!(config, SyncConfig::default());
    assert_eq!(config.patterns, default_patterns());
}

#[test]
fn test_malformed_file_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grk-sync.toml");
    fs::write(&path, "[registry\nsheet_name = ").unwrap();

    assert!(matches!(SyncConfig::load(Some(&path)), Err(Error::Config(_))));
}

#[test]
fn test_invalid_regex_is_config_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("grk-sync.toml");
    fs::write(
        &path,
        "[[patterns]]\nname = \"bad\"\nregex = '(?P<family>unclosed'\n",
    )
    .unwrap();

    assert!(matches!(SyncConfig::load(Some(&path)), Err(Error::Config(_))));
}

#[test]
fn test_defaults_survive_toml_round_trip() {
    let text = toml::to_string(&SyncConfig::default()).unwrap();
    let parsed = SyncConfig::from_toml_str(&text).unwrap();
    assert_eq!(parsed, SyncConfig::default());
}
