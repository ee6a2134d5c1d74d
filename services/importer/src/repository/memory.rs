//! In-memory transactional store for exercising the pipeline without a
//! database. Each transaction works on a snapshot that replaces the shared
//! state only on commit.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{ImportRepository, ImportStore, ImportTransaction};
use crate::domain::{AgeClass, Facility, ImportBatch, ImportKind, MonthlyStatistic, NewFacility};
use crate::error::RepositoryError;
use crate::mapper::AGE_CLASS_COLUMNS;

/// Operation that should fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    InsertBatch,
    InsertFacilities,
    InsertStatistics,
    Commit,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub facilities: Vec<Facility>,
    pub batches: Vec<ImportBatch>,
    pub statistics: Vec<MonthlyStatistic>,
    pub age_classes: Vec<AgeClass>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_at: Option<FailPoint>,
}

impl MemoryStore {
    /// A store with the six age classes registered under ids 1 to 6.
    pub fn seeded() -> Self {
        let age_classes = AGE_CLASS_COLUMNS
            .iter()
            .zip(1..)
            .map(|(name, id)| AgeClass {
                id,
                name: name.to_string(),
            })
            .collect();
        let state = MemoryState {
            age_classes,
            ..MemoryState::default()
        };
        MemoryStore {
            state: Arc::new(Mutex::new(state)),
            fail_at: None,
        }
    }

    pub fn failing_at(mut self, point: FailPoint) -> Self {
        self.fail_at = Some(point);
        self
    }

    pub fn with_facility(self, name: &str, building_code: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let id = next_id(state.facilities.iter().map(|f| f.id));
            state.facilities.push(Facility {
                id,
                name: name.to_string(),
                building_code: building_code.to_string(),
            });
        }
        self
    }

    /// Committed state.
    pub fn snapshot(&self) -> MemoryState {
        self.state.lock().unwrap().clone()
    }
}

fn next_id(ids: impl Iterator<Item = i64>) -> i64 {
    ids.max().unwrap_or(0) + 1
}

fn injected(point: FailPoint) -> RepositoryError {
    RepositoryError::Other(format!("injected failure at {point:?}"))
}

#[async_trait]
impl ImportStore for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, RepositoryError> {
        let working = self.snapshot();
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.state),
            working,
            fail_at: self.fail_at,
        })
    }
}

pub struct MemoryTransaction {
    shared: Arc<Mutex<MemoryState>>,
    working: MemoryState,
    fail_at: Option<FailPoint>,
}

impl MemoryTransaction {
    fn check(&self, point: FailPoint) -> Result<(), RepositoryError> {
        if self.fail_at == Some(point) {
            return Err(injected(point));
        }
        Ok(())
    }

    /// Uncommitted state as seen inside the transaction.
    pub fn working(&self) -> &MemoryState {
        &self.working
    }
}

#[async_trait]
impl ImportRepository for MemoryTransaction {
    async fn fetch_facilities(&mut self) -> Result<Vec<Facility>, RepositoryError> {
        Ok(self.working.facilities.clone())
    }

    async fn insert_facilities(
        &mut self,
        facilities: &[NewFacility],
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::InsertFacilities)?;
        for facility in facilities {
            let code = &facility.building_code;
            if self.working.facilities.iter().any(|f| &f.building_code == code) {
                return Err(RepositoryError::Other(format!("duplicate building code {code}")));
            }
            let id = next_id(self.working.facilities.iter().map(|f| f.id));
            self.working.facilities.push(Facility {
                id,
                name: facility.name.clone(),
                building_code: code.clone(),
            });
        }
        Ok(())
    }

    async fn insert_import_batch(
        &mut self,
        file_name: &str,
        kind: ImportKind,
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::InsertBatch)?;
        let id = next_id(self.working.batches.iter().map(|b| b.id));
        self.working.batches.push(ImportBatch {
            id,
            file_name: file_name.to_string(),
            kind,
        });
        Ok(())
    }

    async fn fetch_latest_import_batch(
        &mut self,
        kind: ImportKind,
    ) -> Result<ImportBatch, RepositoryError> {
        self.working
            .batches
            .iter()
            .filter(|b| b.kind == kind)
            .max_by_key(|b| b.id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("import batch of kind {kind}")))
    }

    async fn insert_monthly_statistics(
        &mut self,
        statistics: &[MonthlyStatistic],
    ) -> Result<(), RepositoryError> {
        self.check(FailPoint::InsertStatistics)?;
        self.working.statistics.extend_from_slice(statistics);
        Ok(())
    }

    async fn fetch_age_classes(&mut self) -> Result<Vec<AgeClass>, RepositoryError> {
        Ok(self.working.age_classes.clone())
    }
}

#[async_trait]
impl ImportTransaction for MemoryTransaction {
    async fn commit(self) -> Result<(), RepositoryError> {
        self.check(FailPoint::Commit)?;
        *self.shared.lock().unwrap() = self.working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::seeded();
        let mut tx = store.begin().await.unwrap();
        tx.insert_import_batch("a.csv", ImportKind::Waiting).await.unwrap();
        assert_eq!(tx.working().batches.len(), 1);
        assert!(store.snapshot().batches.is_empty());

        tx.rollback().await.unwrap();
        assert!(store.snapshot().batches.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_writes() {
        let store = MemoryStore::seeded();
        let mut tx = store.begin().await.unwrap();
        let facility = NewFacility {
            name: "A".to_string(),
            building_code: "1".to_string(),
        };
        tx.insert_facilities(&[facility]).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.snapshot().facilities[0].id, 1);
    }

    #[tokio::test]
    async fn test_latest_batch_per_kind() {
        let store = MemoryStore::seeded();
        let mut tx = store.begin().await.unwrap();
        tx.insert_import_batch("w1.csv", ImportKind::Waiting).await.unwrap();
        tx.insert_import_batch("c1.csv", ImportKind::Children).await.unwrap();
        tx.insert_import_batch("w2.csv", ImportKind::Waiting).await.unwrap();

        let waiting = tx.fetch_latest_import_batch(ImportKind::Waiting).await.unwrap();
        assert_eq!(waiting.file_name, "w2.csv");
        let children = tx.fetch_latest_import_batch(ImportKind::Children).await.unwrap();
        assert_eq!(children.file_name, "c1.csv");
        let acceptance = tx.fetch_latest_import_batch(ImportKind::Acceptance).await;
        assert!(matches!(acceptance, Err(RepositoryError::NotFound(_))));
    }
}
