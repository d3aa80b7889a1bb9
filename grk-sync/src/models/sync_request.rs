//! Sync run request

use grk_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Paths of one sync run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Tree holding recorder folders and XML exports
    pub source_root: PathBuf,

    /// Root of the `grk_NNNN/DD.MM.YYYY/...` tree, created when missing
    pub destination_root: PathBuf,

    /// Registry spreadsheet (`.xlsx`), created on the first run
    pub registry_path: PathBuf,

    /// Plan only: nothing is copied and the registry is not written
    #[serde(default)]
    pub dry_run: bool,
}

impl SyncRequest {
    pub fn new(
        source_root: impl Into<PathBuf>,
        destination_root: impl Into<PathBuf>,
        registry_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_root: source_root.into(),
            destination_root: destination_root.into(),
            registry_path: registry_path.into(),
            dry_run: false,
        }
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Check the inputs before anything is read
    ///
    /// The destination root itself may be missing; it is created by the session.
    pub fn validate(&self) -> Result<()> {
        if !self.source_root.is_dir() {
            return Err(Error::NotFound(format!(
                "Source folder {}",
                self.source_root.display()
            )));
        }

        if self.destination_root.exists() && !self.destination_root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Destination {} is not a folder",
                self.destination_root.display()
            )));
        }

        if self.registry_path.is_dir() {
            return Err(Error::InvalidInput(format!(
                "Registry {} is a folder",
                self.registry_path.display()
            )));
        }
        let registry_dir = match self.registry_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if !registry_dir.is_dir() {
            return Err(Error::NotFound(format!(
                "Registry folder {}",
                registry_dir.display()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_accepts_missing_destination_and_registry() {
        let temp = TempDir::new().unwrap();
        let request = SyncRequest::new(
            temp.path(),
            temp.path().join("out"),
            temp.path().join("registry.xlsx"),
        );
        request.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_missing_source() {
        let temp = TempDir::new().unwrap();
        let request = SyncRequest::new(
            temp.path().join("nope"),
            temp.path().join("out"),
            temp.path().join("registry.xlsx"),
        );
        assert!(matches!(request.validate(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_validate_rejects_file_as_destination() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("out"), b"x").unwrap();
        let request = SyncRequest::new(
            temp.path(),
            temp.path().join("out"),
            temp.path().join("registry.xlsx"),
        );
        assert!(matches!(request.validate(), Err(Error::InvalidInput(_))));
    }
}
