//! Error types for the import pipeline.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a repository implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unexpected value '{value}' in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    #[error("{0}")]
    Other(String),
}

/// Progress of a single import run. On failure the run reports the last
/// stage it reached before the transaction was rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Started,
    BatchRecorded,
    RegistryLoaded,
    RowsParsed,
    FacilitiesReconciled,
    StatisticsResolved,
    Committed,
    RolledBack,
}

impl fmt::Display for ImportStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportStage::Started => "started",
            ImportStage::BatchRecorded => "batch recorded",
            ImportStage::RegistryLoaded => "registry loaded",
            ImportStage::RowsParsed => "rows parsed",
            ImportStage::FacilitiesReconciled => "facilities reconciled",
            ImportStage::StatisticsResolved => "statistics resolved",
            ImportStage::Committed => "committed",
            ImportStage::RolledBack => "rolled back",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to read {}: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to decode {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("no facility registered for building code {building_code} after reconciliation")]
    ReconciliationInconsistency { building_code: String },

    #[error("age class {name} is not registered")]
    MissingAgeClass { name: String },

    #[error("import rolled back after stage '{stage}': {source}")]
    RolledBack { stage: ImportStage, source: Box<ImportError> },
}

impl ImportError {
    /// The underlying failure, looking through a rollback wrapper.
    pub fn root(&self) -> &ImportError {
        match self {
            ImportError::RolledBack { source, .. } => source.root(),
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} env var missing")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid { key: &'static str, value: String, reason: String },

    #[error("failed to read manifest {}: {source}", .path.display())]
    ManifestRead { path: PathBuf, source: io::Error },

    #[error("failed to parse manifest {}: {source}", .path.display())]
    ManifestParse { path: PathBuf, source: serde_json::Error },
}
