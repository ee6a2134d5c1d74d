//! Domain types shared by the import pipeline and the report.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Which figure a municipal export carries. Each kind is published as its own
/// CSV file with an identical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportKind {
    /// Children on the waiting list.
    Waiting,
    /// Places still open for acceptance.
    Acceptance,
    /// Children currently enrolled.
    Children,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Waiting => "waiting",
            ImportKind::Acceptance => "acceptance",
            ImportKind::Children => "children",
        }
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "waiting" => Ok(ImportKind::Waiting),
            "acceptance" => Ok(ImportKind::Acceptance),
            "children" => Ok(ImportKind::Children),
            other => Err(format!("unknown import kind '{other}'")),
        }
    }
}

/// A registered childcare facility.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    /// Municipal facility number; the key CSV rows are reconciled on.
    pub building_code: String,
}

/// A facility seen in an export but not yet registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFacility {
    pub name: String,
    pub building_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct AgeClass {
    pub id: i64,
    pub name: String,
}

/// One recorded import run. Every statistic written by the run points at it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBatch {
    pub id: i64,
    pub file_name: String,
    pub kind: ImportKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyStatistic {
    pub import_batch_id: i64,
    pub facility_id: i64,
    pub age_class_id: i64,
    pub target_month: NaiveDate,
    pub kind: ImportKind,
    pub value: String,
}
