use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Extension matched when a target does not name a specific file
pub const MANIFEST_EXTENSION: &str = "toml";

/// Default manifest file name
pub const MANIFEST_FILENAME: &str = "component.toml";

/// A directory tree to search for component manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTarget {
    pub directory: PathBuf,

    /// Only files with exactly this name are kept; `None` keeps every
    /// `.toml` file
    #[serde(default = "default_filename")]
    pub filename: Option<String>,

    #[serde(default)]
    pub skip_dirs: Vec<String>,

    #[serde(default)]
    pub skip_files: Vec<String>,
}

fn default_filename() -> Option<String> {
    Some(MANIFEST_FILENAME.to_string())
}

impl SourceTarget {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            filename: default_filename(),
            skip_dirs: Vec::new(),
            skip_files: Vec::new(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Match every `.toml` file instead of one file name
    pub fn any_manifest(mut self) -> Self {
        self.filename = None;
        self
    }

    pub fn skip_dir(mut self, name: impl Into<String>) -> Self {
        self.skip_dirs.push(name.into());
        self
    }

    pub fn skip_file(mut self, name: impl Into<String>) -> Self {
        self.skip_files.push(name.into());
        self
    }

    /// Walk the directory and return matching files, sorted.
    ///
    /// A missing directory yields nothing. Unreadable subdirectories are
    /// logged and skipped.
    pub fn locations(&self) -> Vec<PathBuf> {
        let mut results = Vec::new();
        if !self.directory.is_dir() {
            debug!(
                "Discovery directory {} does not exist, nothing to scan",
                self.directory.display()
            );
            return results;
        }

        let mut pending = vec![self.directory.clone()];
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cannot read directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };

                if file_type.is_dir() {
                    if !self.skip_dirs.contains(&name) {
                        pending.push(path);
                    }
                } else if self.matches(&name, &path) {
                    results.push(path);
                }
            }
        }

        results.sort();
        results
    }

    fn matches(&self, name: &str, path: &Path) -> bool {
        if self.skip_files.iter().any(|skip| skip == name) {
            return false;
        }
        match &self.filename {
            Some(filename) => filename == name,
            None => path.extension().and_then(|e| e.to_str()) == Some(MANIFEST_EXTENSION),
        }
    }
}

/// Locations of several targets, in target order
pub fn collect_locations(targets: &[SourceTarget]) -> Vec<PathBuf> {
    targets.iter().flat_map(SourceTarget::locations).collect()
}
