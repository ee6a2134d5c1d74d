//! The list of files an `import` run processes.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::ImportKind;
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManifestEntry {
    pub file_name: PathBuf,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    /// Reads a JSON manifest. Relative file names are resolved against the
    /// manifest's own directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ManifestRead {
            path: path.to_path_buf(),
            source,
        })?;
        let mut manifest: Manifest =
            serde_json::from_str(&raw).map_err(|source| ConfigError::ManifestParse {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(base) = path.parent() {
            for entry in &mut manifest.files {
                if entry.file_name.is_relative() {
                    entry.file_name = base.join(&entry.file_name);
                }
            }
        }
        Ok(manifest)
    }

    pub fn single(file_name: PathBuf, kind: ImportKind) -> Self {
        Manifest {
            files: vec![ManifestEntry { file_name, kind }],
        }
    }
}
