//! API Service - Serves the childcare facility report
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /preschool-data - Latest statistics per facility as GeoJSON

use anyhow::Context;
use axum::{
    extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router,
};
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use importer::report::{self, FeatureCollection};
use importer::RepositoryError;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    pool: PgPool,
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn build_report(pool: &PgPool) -> Result<FeatureCollection, RepositoryError> {
    let mut connection = pool.acquire().await?;
    report::fetch_report(&mut connection).await
}

async fn preschool_data_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match build_report(&state.pool).await {
        Ok(collection) => Json(collection).into_response(),
        Err(e) => {
            error!(error = %e, "failed to build report");
            let body = ErrorResponse {
                error: e.to_string(),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn router(state: Arc<AppState>) -> Router {
    // CORS for the map frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/preschool-data", get(preschool_data_handler))
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let max_connections = match std::env::var("DB_MAX_CONNECTIONS") {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid DB_MAX_CONNECTIONS '{raw}'"))?,
        Err(_) => 5,
    };

    info!("connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    let app = router(Arc::new(AppState { pool }));

    info!(%bind, "api listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
