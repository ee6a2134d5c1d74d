//! GeoJSON report of the latest statistics per facility.
//!
//! For every kind only the most recent import batch counts. Each located
//! facility becomes a `Point` feature carrying one entry per age class with the
//! three figures side by side; a kind with no value shows as `"-"`.

use std::collections::HashMap;

use serde::Serialize;
use sqlx::PgConnection;
use tracing::{debug, instrument};

use crate::domain::{ImportBatch, ImportKind};
use crate::error::RepositoryError;

const CRS_NAME: &str = "urn:ogc:def:crs:OGC:1.3:CRS84";

const FETCH_LATEST_IMPORT_BATCHES: &str = r#"
    SELECT DISTINCT ON (kind) id, file_name, kind
    FROM csv_import_histories
    ORDER BY kind, created_at DESC, id DESC
"#;

const FETCH_FACILITIES_WITH_LOCATION: &str = r#"
    SELECT p.id, p.name, l.longitude, l.latitude
    FROM preschools p
    JOIN preschool_locations l ON l.preschool_id = p.id
    ORDER BY p.id
"#;

const FETCH_STAT_ROWS: &str = r#"
    SELECT ms.preschool_id,
           ac.name AS age_class,
           COALESCE(MAX(CASE WHEN ms.kind = 'waiting' THEN ms.value END), '-') AS waiting,
           COALESCE(MAX(CASE WHEN ms.kind = 'children' THEN ms.value END), '-') AS children,
           COALESCE(MAX(CASE WHEN ms.kind = 'acceptance' THEN ms.value END), '-') AS acceptance
    FROM preschool_monthly_stats ms
    JOIN age_classes ac ON ac.id = ms.age_class_id
    WHERE ms.csv_import_history_id = ANY($1)
    GROUP BY ms.preschool_id, ac.id, ac.name
    ORDER BY ms.preschool_id, ac.id
"#;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct LocatedFacility {
    pub id: i64,
    pub name: String,
    pub longitude: f64,
    pub latitude: f64,
}

/// One facility and age class with the three kinds pivoted into columns.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StatRow {
    pub preschool_id: i64,
    pub age_class: String,
    pub waiting: String,
    pub children: String,
    pub acceptance: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub crs: Crs,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Crs {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub properties: CrsProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrsProperties {
    pub name: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub properties: FeatureProperties,
    pub geometry: Geometry,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureProperties {
    pub id: i64,
    pub name: String,
    pub stats: Vec<AgeClassStat>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeClassStat {
    pub age_class: String,
    pub acceptance_count: String,
    pub children_count: String,
    pub waiting_count: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Longitude, latitude, elevation.
    pub coordinates: [f64; 3],
}

/// The latest batch of each kind that has been imported at least once.
pub async fn fetch_latest_import_batches(
    connection: &mut PgConnection,
) -> Result<Vec<ImportBatch>, RepositoryError> {
    let rows: Vec<(i64, String, String)> = sqlx::query_as(FETCH_LATEST_IMPORT_BATCHES)
        .fetch_all(&mut *connection)
        .await?;
    rows.into_iter()
        .map(|(id, file_name, raw_kind)| {
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
        })
        .collect()
}

pub async fn fetch_facilities_with_location(
    connection: &mut PgConnection,
) -> Result<Vec<LocatedFacility>, RepositoryError> {
    let facilities = sqlx::query_as::<_, LocatedFacility>(FETCH_FACILITIES_WITH_LOCATION)
        .fetch_all(&mut *connection)
        .await?;
    Ok(facilities)
}

pub async fn fetch_stat_rows(
    connection: &mut PgConnection,
    batch_ids: &[i64],
) -> Result<Vec<StatRow>, RepositoryError> {
    if batch_ids.is_empty() {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as::<_, StatRow>(FETCH_STAT_ROWS)
        .bind(batch_ids)
        .fetch_all(&mut *connection)
        .await?;
    Ok(rows)
}

/// Builds the report from the latest batches. Every query runs on `connection`,
/// so inside a transaction uncommitted imports are included.
#[instrument(skip_all)]
pub async fn fetch_report(
    connection: &mut PgConnection,
) -> Result<FeatureCollection, RepositoryError> {
    let batches = fetch_latest_import_batches(&mut *connection).await?;
    let batch_ids: Vec<i64> = batches.iter().map(|batch| batch.id).collect();
    debug!(?batch_ids, "latest import batches");

    let facilities = fetch_facilities_with_location(&mut *connection).await?;
    let stats = fetch_stat_rows(&mut *connection, &batch_ids).await?;
    Ok(build_feature_collection(facilities, stats))
}

/// Assembles the collection. Features are ordered by facility id; stats keep
/// the order they arrive in. Stat rows for facilities without a location are
/// dropped.
pub fn build_feature_collection(
    mut facilities: Vec<LocatedFacility>,
    stats: Vec<StatRow>,
) -> FeatureCollection {
    let mut by_facility: HashMap<i64, Vec<AgeClassStat>> = HashMap::new();
    for row in stats {
        by_facility.entry(row.preschool_id).or_default().push(AgeClassStat {
            age_class: row.age_class,
            acceptance_count: row.acceptance,
            children_count: row.children,
            waiting_count: row.waiting,
        });
    }

    facilities.sort_by_key(|facility| facility.id);
    let features = facilities
        .into_iter()
        .map(|facility| Feature {
            kind: "Feature",
            geometry: Geometry {
                kind: "Point",
                coordinates: [facility.longitude, facility.latitude, 0.0],
            },
            properties: FeatureProperties {
                id: facility.id,
                stats: by_facility.remove(&facility.id).unwrap_or_default(),
                name: facility.name,
            },
        })
        .collect();

    FeatureCollection {
        kind: "FeatureCollection",
        crs: Crs {
            kind: "name",
            properties: CrsProperties { name: CRS_NAME },
        },
        features,
    }
}
