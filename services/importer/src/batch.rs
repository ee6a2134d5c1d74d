//! Sequential driver for importing several files.

use std::path::PathBuf;

use tracing::{error, info};

use crate::domain::ImportKind;
use crate::error::ImportError;
use crate::import::{ImportSummary, Importer};
use crate::manifest::ManifestEntry;
use crate::repository::ImportStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first file that fails.
    #[default]
    Halt,
    /// Import every file and report failures at the end.
    KeepGoing,
}

#[derive(Debug)]
pub struct FileOutcome {
    pub file_name: PathBuf,
    pub kind: ImportKind,
    pub result: Result<ImportSummary, ImportError>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    /// Entries never attempted because an earlier file failed under `Halt`.
    pub not_attempted: usize,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.result.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Imports each entry in its own transaction, one file at a time.
pub async fn run_batch<S: ImportStore>(
    importer: &Importer,
    store: &S,
    entries: &[ManifestEntry],
    policy: FailurePolicy,
    dry_run: bool,
) -> BatchReport {
    let mut report = BatchReport::default();

    for (index, entry) in entries.iter().enumerate() {
        let result = if dry_run {
            importer.dry_run(store, &entry.file_name, entry.kind).await
        } else {
            importer.import_csv(store, &entry.file_name, entry.kind).await
        };

        let failed = result.is_err();
        if let Err(err) = &result {
            error!(
                file = %entry.file_name.display(),
                kind = %entry.kind,
                error = %err,
                cause = %err.root(),
                "file import failed"
            );
        }
        report.outcomes.push(FileOutcome {
            file_name: entry.file_name.clone(),
            kind: entry.kind,
            result,
        });

        if failed && policy == FailurePolicy::Halt {
            report.not_attempted = entries.len() - index - 1;
            break;
        }
    }

    info!(
        files = report.outcomes.len(),
        failed = report.failures().count(),
        not_attempted = report.not_attempted,
        "batch finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::repository::memory::MemoryStore;
    use crate::test_support::{sample_csv, write_sjis};
    use chrono::NaiveDate;

    fn importer() -> Importer {
        let today = NaiveDate::from_ymd_opt(2025, 9, 1).unwrap();
        Importer::new(Box::new(FixedClock(today)), encoding_rs::SHIFT_JIS)
    }

    fn entry(file_name: PathBuf, kind: ImportKind) -> ManifestEntry {
        ManifestEntry { file_name, kind }
    }

    fn entries(dir: &std::path::Path) -> Vec<ManifestEntry> {
        let waiting = sample_csv(&["西区,14103,横浜保育園,12345,10,12,15,18,20,20,95,2024/06/01"]);
        let children = sample_csv(&["西区,14103,横浜保育園,12345,1,2,3,4,5,6,21,2024/06/01"]);
        vec![
            entry(write_sjis(dir, "waiting.csv", &waiting), ImportKind::Waiting),
            entry(dir.join("missing.csv"), ImportKind::Acceptance),
            entry(write_sjis(dir, "children.csv", &children), ImportKind::Children),
        ]
    }

    #[tokio::test]
    async fn test_halt_stops_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::seeded();
        let entries = entries(dir.path());

        let report = run_batch(&importer(), &store, &entries, FailurePolicy::Halt, false).await;

        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.not_attempted, 1);
        assert!(!report.is_success());
        assert_eq!(store.snapshot().batches.len(), 1);
    }

    #[tokio::test]
    async fn test_keep_going_imports_remaining_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::seeded();
        let entries = entries(dir.path());

        let report =
            run_batch(&importer(), &store, &entries, FailurePolicy::KeepGoing, false).await;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.not_attempted, 0);
        let failed: Vec<ImportKind> = report.failures().map(|outcome| outcome.kind).collect();
        assert_eq!(failed, vec![ImportKind::Acceptance]);
        assert!(!report.is_success());

        let state = store.snapshot();
        assert_eq!(state.batches.len(), 2);
        assert_eq!(state.facilities.len(), 1);
        assert_eq!(state.statistics.len(), 12);
    }

    #[tokio::test]
    async fn test_dry_run_batch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::seeded();
        let all = entries(dir.path());
        let good: Vec<ManifestEntry> = all
            .into_iter()
            .filter(|entry| entry.kind != ImportKind::Acceptance)
            .collect();

        let report = run_batch(&importer(), &store, &good, FailurePolicy::Halt, true).await;

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);
        assert!(store.snapshot().batches.is_empty());
    }
}
