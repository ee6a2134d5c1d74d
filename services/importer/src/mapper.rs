//! Row validation and field extraction.
//!
//! Column positions are resolved by name from the export's header block. Rows
//! missing any required field are skipped, never rejected.

use csv::StringRecord;
use tracing::warn;

pub const REGION_COLUMN: &str = "施設所在区";
pub const AREA_CODE_COLUMN: &str = "標準地域コード";
pub const NAME_COLUMN: &str = "施設・事業名";
pub const CODE_COLUMN: &str = "施設番号";

/// Age-class columns in ascending age order. The names double as the keys of
/// the `age_classes` reference table.
pub const AGE_CLASS_COLUMNS: [&str; 6] =
    ["０歳児", "１歳児", "２歳児", "３歳児", "４歳児", "５歳児"];

/// Value stored for an age class with no data.
pub const ZERO: &str = "0";
const NO_DATA: &str = "-";

/// Where each field lives in a data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub region: usize,
    pub area_code: usize,
    pub name: usize,
    pub code: usize,
    pub ages: [usize; 6],
}

impl ColumnLayout {
    /// The published export layout: region, area code, name, code, six ages,
    /// total, updated.
    pub fn fixed() -> Self {
        ColumnLayout {
            region: 0,
            area_code: 1,
            name: 2,
            code: 3,
            ages: [4, 5, 6, 7, 8, 9],
        }
    }

    /// Builds a layout from a header row, or `None` if any expected name is absent.
    pub fn from_header(header: &StringRecord) -> Option<Self> {
        let find = |name: &str| header.iter().position(|field| field.trim() == name);

        let mut ages = [0; 6];
        for (slot, column) in ages.iter_mut().zip(AGE_CLASS_COLUMNS) {
            *slot = find(column)?;
        }
        Some(ColumnLayout {
            region: find(REGION_COLUMN)?,
            area_code: find(AREA_CODE_COLUMN)?,
            name: find(NAME_COLUMN)?,
            code: find(CODE_COLUMN)?,
            ages,
        })
    }

    /// Resolves from the last header row, falling back to the fixed layout.
    pub fn resolve(headers: &[StringRecord]) -> Self {
        match headers.last().and_then(Self::from_header) {
            Some(layout) => layout,
            None => {
                warn!("header row does not name every expected column, using fixed layout");
                Self::fixed()
            }
        }
    }
}

/// A validated data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityRow {
    pub region: String,
    pub area_code: String,
    pub name: String,
    pub building_code: String,
    /// Normalized counts, indexed like [`AGE_CLASS_COLUMNS`].
    pub counts: [String; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The required column is absent or blank.
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Mapped(FacilityRow),
    Skipped(SkipReason),
}

pub fn map_row(record: &StringRecord, layout: &ColumnLayout) -> RowOutcome {
    match extract(record, layout) {
        Ok(row) => RowOutcome::Mapped(row),
        Err(reason) => RowOutcome::Skipped(reason),
    }
}

fn extract(record: &StringRecord, layout: &ColumnLayout) -> Result<FacilityRow, SkipReason> {
    let required = |index: usize, column: &'static str| match record.get(index).map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(SkipReason::MissingField(column)),
    };

    Ok(FacilityRow {
        region: required(layout.region, REGION_COLUMN)?,
        area_code: required(layout.area_code, AREA_CODE_COLUMN)?,
        name: required(layout.name, NAME_COLUMN)?,
        building_code: required(layout.code, CODE_COLUMN)?,
        counts: layout.ages.map(|index| normalize_count(record.get(index))),
    })
}

/// `-`, blank, and absent all mean "no data" and become `"0"`.
pub fn normalize_count(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        None | Some("") | Some(NO_DATA) => ZERO.to_string(),
        Some(value) => value.to_string(),
    }
}
