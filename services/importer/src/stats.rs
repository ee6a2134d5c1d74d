//! Accumulates monthly statistics until facility ids are known.

use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::domain::{AgeClass, ImportKind, MonthlyStatistic};
use crate::error::ImportError;
use crate::mapper::{FacilityRow, AGE_CLASS_COLUMNS};
use crate::reconcile::FacilityRegistry;

/// Maps the six age-class columns to their reference ids, in column order.
pub fn resolve_age_classes(classes: &[AgeClass]) -> Result<[i64; 6], ImportError> {
    let mut ids = [0; 6];
    for (slot, name) in ids.iter_mut().zip(AGE_CLASS_COLUMNS) {
        *slot = classes
            .iter()
            .find(|class| class.name == name)
            .map(|class| class.id)
            .ok_or_else(|| ImportError::MissingAgeClass {
                name: name.to_string(),
            })?;
    }
    Ok(ids)
}

/// A statistic whose facility id is still unknown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingStatistic {
    pub age_class_id: i64,
    pub value: String,
}

#[derive(Debug)]
pub struct StatisticsBuilder {
    import_batch_id: i64,
    target_month: NaiveDate,
    kind: ImportKind,
    age_class_ids: [i64; 6],
    pending: IndexMap<String, Vec<PendingStatistic>>,
}

impl StatisticsBuilder {
    pub fn new(
        import_batch_id: i64,
        target_month: NaiveDate,
        kind: ImportKind,
        age_class_ids: [i64; 6],
    ) -> Self {
        StatisticsBuilder {
            import_batch_id,
            target_month,
            kind,
            age_class_ids,
            pending: IndexMap::new(),
        }
    }

    /// Records one statistic per age class. A repeated building code replaces
    /// the earlier row's statistics.
    pub fn push_row(&mut self, row: &FacilityRow) {
        let stats = self
            .age_class_ids
            .iter()
            .zip(&row.counts)
            .map(|(age_class_id, value)| PendingStatistic {
                age_class_id: *age_class_id,
                value: value.clone(),
            })
            .collect();
        self.pending.insert(row.building_code.clone(), stats);
    }

    fn len(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Backfills facility ids from the registry. A code the registry does not
    /// know is an inconsistency: every code was either registered already or
    /// inserted during this run.
    pub fn resolve(
        self,
        registry: &FacilityRegistry,
    ) -> Result<Vec<MonthlyStatistic>, ImportError> {
        let mut resolved = Vec::with_capacity(self.len());
        for (building_code, stats) in self.pending {
            let facility = registry.get(&building_code).ok_or_else(|| {
                ImportError::ReconciliationInconsistency {
                    building_code: building_code.clone(),
                }
            })?;
            resolved.extend(stats.into_iter().map(|stat| MonthlyStatistic {
                import_batch_id: self.import_batch_id,
                facility_id: facility.id,
                age_class_id: stat.age_class_id,
                target_month: self.target_month,
                kind: self.kind,
                value: stat.value,
            }));
        }
        Ok(resolved)
    }
}
