//! PostgreSQL implementation of the import repository.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};

use super::{ImportRepository, ImportStore, ImportTransaction};
use crate::domain::{AgeClass, Facility, ImportBatch, ImportKind, MonthlyStatistic, NewFacility};
use crate::error::RepositoryError;

/// Rows per multi-row INSERT. Seven binds per statistic keeps this well under
/// the protocol's 65535 parameter limit.
const INSERT_CHUNK_SIZE: usize = 1000;

const FETCH_FACILITIES: &str = "SELECT id, name, building_code FROM preschools ORDER BY id";

const INSERT_IMPORT_BATCH: &str =
    "INSERT INTO csv_import_histories (file_name, kind) VALUES ($1, $2)";

const FETCH_LATEST_IMPORT_BATCH: &str = r#"
    SELECT id, file_name, kind
    FROM csv_import_histories
    WHERE kind = $1
    ORDER BY created_at DESC, id DESC
    LIMIT 1
"#;

const FETCH_AGE_CLASSES: &str = "SELECT id, name FROM age_classes ORDER BY id";

const INSERT_FACILITIES: &str = "INSERT INTO preschools (name, building_code) ";

const INSERT_MONTHLY_STATISTICS: &str = "INSERT INTO preschool_monthly_stats \
    (csv_import_history_id, preschool_id, age_class_id, target_month, kind, value) ";

#[derive(Clone)]
pub struct PgImportStore {
    pool: PgPool,
}

impl PgImportStore {
    pub fn new(pool: PgPool) -> Self {
        PgImportStore { pool }
    }
}

#[async_trait]
impl ImportStore for PgImportStore {
    type Transaction = PgImportTransaction;

    async fn begin(&self) -> Result<PgImportTransaction, RepositoryError> {
        let tx = self.pool.begin().await?;
        Ok(PgImportTransaction { tx })
    }
}

pub struct PgImportTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ImportRepository for PgImportTransaction {
    async fn fetch_facilities(&mut self) -> Result<Vec<Facility>, RepositoryError> {
        let facilities = sqlx::query_as::<_, Facility>(FETCH_FACILITIES)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(facilities)
    }

    async fn insert_facilities(
        &mut self,
        facilities: &[NewFacility],
    ) -> Result<(), RepositoryError> {
        for chunk in facilities.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_FACILITIES);
            builder.push_values(chunk, |mut row, facility| {
                row.push_bind(&facility.name)
                    .push_bind(&facility.building_code);
            });
            builder.build().execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn insert_import_batch(
        &mut self,
        file_name: &str,
        kind: ImportKind,
    ) -> Result<(), RepositoryError> {
        sqlx::query(INSERT_IMPORT_BATCH)
            .bind(file_name)
            .bind(kind.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn fetch_latest_import_batch(
        &mut self,
        kind: ImportKind,
    ) -> Result<ImportBatch, RepositoryError> {
        let row: Option<(i64, String, String)> = sqlx::query_as(FETCH_LATEST_IMPORT_BATCH)
            .bind(kind.as_str())
            .fetch_optional(&mut *self.tx)
            .await?;
        let (id, file_name, raw_kind) = row
            .ok_or_else(|| RepositoryError::NotFound(format!("import batch of kind {kind}")))?;
        let kind = raw_kind
            .parse::<ImportKind>()
            .map_err(|_| RepositoryError::InvalidColumn {
                column: "csv_import_histories.kind",
                value: raw_kind.clone(),
            })?;
        Ok(ImportBatch {
            id,
            file_name,
            kind,
        })
    }

    async fn insert_monthly_statistics(
        &mut self,
        statistics: &[MonthlyStatistic],
    ) -> Result<(), RepositoryError> {
        for chunk in statistics.chunks(INSERT_CHUNK_SIZE) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(INSERT_MONTHLY_STATISTICS);
            builder.push_values(chunk, |mut row, stat| {
                row.push_bind(stat.import_batch_id)
                    .push_bind(stat.facility_id)
                    .push_bind(stat.age_class_id)
                    .push_bind(stat.target_month)
                    .push_bind(stat.kind.as_str())
                    .push_bind(&stat.value);
            });
            builder.build().execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn fetch_age_classes(&mut self) -> Result<Vec<AgeClass>, RepositoryError> {
        let classes = sqlx::query_as::<_, AgeClass>(FETCH_AGE_CLASSES)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(classes)
    }
}

#[async_trait]
impl ImportTransaction for PgImportTransaction {
    async fn commit(self) -> Result<(), RepositoryError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), RepositoryError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
