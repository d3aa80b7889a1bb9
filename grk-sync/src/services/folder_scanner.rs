//! Source tree scanner
//!
//! Recursive discovery of extraction units and of the files inside a folder.
//! Traversal is sequential and sorted by file name so that repeated runs over an
//! unchanged tree see the same order, which keeps GRK number assignment stable.

use crate::types::SourceUnit;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

impl From<ScanError> for grk_common::Error {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PathNotFound(p) => grk_common::Error::NotFound(p.display().to_string()),
            ScanError::NotADirectory(p) => {
                grk_common::Error::InvalidInput(format!("Not a directory: {}", p.display()))
            }
        }
    }
}

/// Source tree scanner
#[derive(Debug, Clone)]
pub struct FolderScanner {
    ignore_patterns: Vec<String>,
}

impl FolderScanner {
    /// Create scanner skipping entries whose name contains one of `ignore_patterns`
    pub fn new(ignore_patterns: Vec<String>) -> Self {
        Self { ignore_patterns }
    }

    /// Discover extraction units below `root`
    ///
    /// XML exports come first (in walk order), followed by every walked path
    /// (files and folders, the root itself excluded) for folder-name matching.
    /// XML files appear in both groups so a malformed export can still be
    /// matched by name.
    pub fn discover_units(&self, root: &Path) -> Result<Vec<SourceUnit>, ScanError> {
        let paths = self.walk(root, false)?;

        let mut units: Vec<SourceUnit> = paths
            .iter()
            .filter(|p| p.is_file() && is_xml_path(p))
            .cloned()
            .map(SourceUnit::XmlDocument)
            .collect();
        let xml_count = units.len();

        units.extend(paths.into_iter().map(SourceUnit::Path));

        tracing::debug!(
            root = %root.display(),
            xml_documents = xml_count,
            paths = units.len() - xml_count,
            "Source tree scanned"
        );

        Ok(units)
    }

    /// All regular files below `dir`, sorted by walk order
    pub fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
        self.walk(dir, true)
    }

    fn walk(&self, root: &Path, files_only: bool) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut symlink_visited = HashSet::new();
        let mut found = Vec::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !files_only || entry.file_type().is_file() {
                        found.push(entry.into_path());
                    }
                }
                Err(e) => {
                    // Unreadable entries are skipped, the scan continues
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        Ok(found)
    }

    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        let file_name = entry.file_name().to_string_lossy();

        if self
            .ignore_patterns
            .iter()
            .any(|pattern| file_name.contains(pattern.as_str()))
        {
            return false;
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FolderScanner {
    fn default() -> Self {
        Self::new(grk_common::config::ScanConfig::default().ignore_patterns)
    }
}

/// True when the path has an `.xml` extension (any case)
pub fn is_xml_path(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case("xml"))
}
