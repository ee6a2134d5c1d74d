//! Import orchestration.
//!
//! One file is imported as a single unit of work: the batch record, any new
//! facilities, and every statistic either all become visible on commit or none
//! do.

use std::path::Path;

use chrono::NaiveDate;
use encoding_rs::Encoding;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::clock::{first_day_of_month, Clock, FixedClock, SystemClock};
use crate::config::ImporterConfig;
use crate::decoder::CsvRows;
use crate::domain::ImportKind;
use crate::error::{ImportError, ImportStage};
use crate::mapper::{map_row, ColumnLayout, RowOutcome};
use crate::reconcile::{FacilityReconciler, FacilityRegistry};
use crate::repository::{ImportRepository, ImportStore, ImportTransaction};
use crate::stats::{resolve_age_classes, StatisticsBuilder};

/// What a single import wrote (or, for a dry run, would have written).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub batch_id: i64,
    pub file_name: String,
    pub kind: ImportKind,
    pub target_month: NaiveDate,
    /// Data rows read, header rows excluded.
    pub rows_read: usize,
    pub rows_skipped: usize,
    pub facilities_inserted: usize,
    pub statistics_inserted: usize,
}

pub struct Importer {
    clock: Box<dyn Clock>,
    encoding: &'static Encoding,
}

impl Importer {
    pub fn new(clock: Box<dyn Clock>, encoding: &'static Encoding) -> Self {
        Importer { clock, encoding }
    }

    pub fn from_config(config: &ImporterConfig) -> Self {
        let clock: Box<dyn Clock> = match config.target_month {
            Some(month) => Box::new(FixedClock(month)),
            None => Box::new(SystemClock),
        };
        Importer::new(clock, config.encoding)
    }

    /// Imports `file` in a transaction of its own. On failure everything the
    /// run wrote is rolled back and the error carries the last stage reached.
    #[instrument(skip_all, fields(file = %file.display(), kind = %kind))]
    pub async fn import_csv<S: ImportStore>(
        &self,
        store: &S,
        file: &Path,
        kind: ImportKind,
    ) -> Result<ImportSummary, ImportError> {
        let mut stage = ImportStage::Started;
        let mut tx = store
            .begin()
            .await
            .map_err(|err| rolled_back(&mut stage, err.into()))?;

        let summary = match self.run(&mut tx, file, kind, &mut stage).await {
            Ok(summary) => summary,
            Err(err) => return Err(abort(tx, &mut stage, err).await),
        };

        tx.commit()
            .await
            .map_err(|err| rolled_back(&mut stage, err.into()))?;
        advance(&mut stage, ImportStage::Committed);
        info!(
            batch_id = summary.batch_id,
            rows_read = summary.rows_read,
            rows_skipped = summary.rows_skipped,
            facilities_inserted = summary.facilities_inserted,
            statistics_inserted = summary.statistics_inserted,
            "import committed"
        );
        Ok(summary)
    }

    /// Imports `file` inside a transaction owned by the caller. Nothing is
    /// committed or rolled back here; the caller decides the outcome for the
    /// whole scope.
    #[instrument(skip_all, fields(file = %file.display(), kind = %kind))]
    pub async fn import_csv_in<T>(
        &self,
        tx: &mut T,
        file: &Path,
        kind: ImportKind,
    ) -> Result<ImportSummary, ImportError>
    where
        T: ImportRepository + ?Sized,
    {
        let mut stage = ImportStage::Started;
        self.run(tx, file, kind, &mut stage).await.inspect_err(|err| {
            error!(stage = %stage, error = %err, "import failed inside caller transaction");
        })
    }

    /// Runs the whole import and always rolls it back.
    #[instrument(skip_all, fields(file = %file.display(), kind = %kind))]
    pub async fn dry_run<S: ImportStore>(
        &self,
        store: &S,
        file: &Path,
        kind: ImportKind,
    ) -> Result<ImportSummary, ImportError> {
        let mut stage = ImportStage::Started;
        let mut tx = store
            .begin()
            .await
            .map_err(|err| rolled_back(&mut stage, err.into()))?;

        match self.run(&mut tx, file, kind, &mut stage).await {
            Ok(summary) => {
                tx.rollback()
                    .await
                    .map_err(|err| rolled_back(&mut stage, err.into()))?;
                info!(
                    rows_read = summary.rows_read,
                    statistics = summary.statistics_inserted,
                    "dry run rolled back"
                );
                Ok(summary)
            }
            Err(err) => Err(abort(tx, &mut stage, err).await),
        }
    }

    async fn run<T>(
        &self,
        tx: &mut T,
        file: &Path,
        kind: ImportKind,
        stage: &mut ImportStage,
    ) -> Result<ImportSummary, ImportError>
    where
        T: ImportRepository + ?Sized,
    {
        let file_name = file.to_string_lossy().into_owned();

        tx.insert_import_batch(&file_name, kind).await?;
        let batch = tx.fetch_latest_import_batch(kind).await?;
        advance(stage, ImportStage::BatchRecorded);

        let facilities = tx.fetch_facilities().await?;
        debug!(facilities = facilities.len(), "registry loaded");
        let mut registry = FacilityRegistry::new(facilities);
        let age_class_ids = resolve_age_classes(&tx.fetch_age_classes().await?)?;
        advance(stage, ImportStage::RegistryLoaded);

        let target_month = first_day_of_month(self.clock.today());
        let rows = CsvRows::open(file, self.encoding)?;
        let layout = ColumnLayout::resolve(rows.headers());

        let mut reconciler = FacilityReconciler::new();
        let mut builder = StatisticsBuilder::new(batch.id, target_month, kind, age_class_ids);
        let mut rows_read = 0;
        let mut rows_skipped = 0;

        for row in rows {
            let row = row?;
            rows_read += 1;
            match map_row(&row.record, &layout) {
                RowOutcome::Mapped(mapped) => {
                    reconciler.observe(&registry, &mapped.name, &mapped.building_code);
                    builder.push_row(&mapped);
                }
                RowOutcome::Skipped(reason) => {
                    rows_skipped += 1;
                    debug!(line = row.line, ?reason, "row skipped");
                }
            }
        }
        advance(stage, ImportStage::RowsParsed);

        let new_facilities = reconciler.into_new_facilities();
        if !new_facilities.is_empty() {
            tx.insert_facilities(&new_facilities).await?;
            registry = FacilityRegistry::new(tx.fetch_facilities().await?);
        }
        advance(stage, ImportStage::FacilitiesReconciled);

        let statistics = builder.resolve(&registry)?;
        advance(stage, ImportStage::StatisticsResolved);
        if !statistics.is_empty() {
            tx.insert_monthly_statistics(&statistics).await?;
        }

        Ok(ImportSummary {
            batch_id: batch.id,
            file_name,
            kind,
            target_month,
            rows_read,
            rows_skipped,
            facilities_inserted: new_facilities.len(),
            statistics_inserted: statistics.len(),
        })
    }
}

fn advance(stage: &mut ImportStage, next: ImportStage) {
    debug!(from = %stage, to = %next, "import stage");
    *stage = next;
}

/// Moves `stage` to `RolledBack`. The error keeps the stage reached before the
/// failure.
fn rolled_back(stage: &mut ImportStage, source: ImportError) -> ImportError {
    let reached = *stage;
    advance(stage, ImportStage::RolledBack);
    error!(stage = %reached, error = %source, "import rolled back");
    ImportError::RolledBack {
        stage: reached,
        source: Box::new(source),
    }
}

async fn abort<T: ImportTransaction>(
    tx: T,
    stage: &mut ImportStage,
    err: ImportError,
) -> ImportError {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "rollback failed");
    }
    rolled_back(stage, err)
}
