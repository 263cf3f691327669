//! Mediashelf media catalog server
//!
//! Imports spreadsheet exports of books, movies, games and music into a typed
//! catalog and enriches the entries with cover images found by direct
//! download or by identifier search, behind a REST JSON API.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod tabular;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    /// Cancelled on shutdown; aborts in-flight lookups
    pub shutdown: CancellationToken,
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let upload_limit = state.config.import.max_upload_bytes;

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        // Catalog
        .route("/categories/:category/fields", get(api::catalog::category_fields))
        .route("/import/:category", post(api::catalog::import_file))
        .route("/entities/:category", get(api::catalog::list_entities))
        .route("/entities/:category/:id", get(api::catalog::get_entity))
        // Enrichment
        .route("/entities/:category/:id/enrich", post(api::enrichment::enrich_entity))
        .route("/lookup/:category/:id_type/:value", get(api::enrichment::lookup_cover))
        .route("/enrichment/run", post(api::enrichment::run_batch))
        .layer(DefaultBodyLimit::max(upload_limit))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
