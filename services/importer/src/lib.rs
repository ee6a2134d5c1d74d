//! Importer - Loads municipal childcare CSV exports into the facility registry
//!
//! Pipeline per file, inside one transaction:
//! - Record the import batch
//! - Load the facility registry and age classes
//! - Decode and validate rows
//! - Register facilities seen for the first time
//! - Write one monthly statistic per facility and age class
//!
//! The `report` module turns the latest batch of each kind into the GeoJSON
//! served by the api service.

pub mod batch;
pub mod clock;
pub mod config;
pub mod decoder;
pub mod domain;
pub mod error;
pub mod import;
pub mod manifest;
pub mod mapper;
pub mod reconcile;
pub mod report;
pub mod repository;
pub mod stats;

#[cfg(test)]
mod test_support;

pub use domain::ImportKind;
pub use error::{ImportError, RepositoryError};
pub use import::{ImportSummary, Importer};
