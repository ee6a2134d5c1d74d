//! Persistence contract consumed by the import pipeline.
//!
//! Every operation runs inside a transaction obtained from an [`ImportStore`].
//! The transaction value is passed explicitly through the pipeline so that a
//! caller can run several imports inside one scope.

use async_trait::async_trait;

use crate::domain::{AgeClass, Facility, ImportBatch, ImportKind, MonthlyStatistic, NewFacility};
use crate::error::RepositoryError;

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::{PgImportStore, PgImportTransaction};

#[async_trait]
pub trait ImportRepository: Send {
    /// The full facility registry.
    async fn fetch_facilities(&mut self) -> Result<Vec<Facility>, RepositoryError>;

    async fn insert_facilities(&mut self, facilities: &[NewFacility])
        -> Result<(), RepositoryError>;

    async fn insert_import_batch(
        &mut self,
        file_name: &str,
        kind: ImportKind,
    ) -> Result<(), RepositoryError>;

    /// The most recently created batch of `kind`, ties broken by id.
    ///
    /// Returns `Err(RepositoryError::NotFound)` if no batch of that kind exists.
    async fn fetch_latest_import_batch(
        &mut self,
        kind: ImportKind,
    ) -> Result<ImportBatch, RepositoryError>;

    async fn insert_monthly_statistics(
        &mut self,
        statistics: &[MonthlyStatistic],
    ) -> Result<(), RepositoryError>;

    async fn fetch_age_classes(&mut self) -> Result<Vec<AgeClass>, RepositoryError>;
}

/// A unit of work. Dropping it without committing discards its writes.
#[async_trait]
pub trait ImportTransaction: ImportRepository {
    async fn commit(self) -> Result<(), RepositoryError>;

    async fn rollback(self) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ImportStore: Send + Sync {
    type Transaction: ImportTransaction;

    async fn begin(&self) -> Result<Self::Transaction, RepositoryError>;
}
