//! Cover enrichment and lookup endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{Category, EnrichmentResult, IdentifierType},
    services::scheduler::BatchSummary,
    AppState,
};

use super::{Parameter, ValidPath};

/// Cover search result
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CoverLookupResponse {
    pub category: Category,
    pub id_type: IdentifierType,
    /// Normalized identifier value
    pub value: String,
    pub image_url: String,
}

/// Enrich one entity now
#[utoipa::path(
    post,
    path = "/entities/{category}/{id}/enrich",
    tag = "enrichment",
    params(
        ("category" = Category, Path, description = "books, movies, games or music"),
        ("id" = i64, Path, description = "Entity ID")
    ),
    responses(
        (status = 200, description = "Enrichment outcome", body = EnrichmentResult),
        (status = 404, description = "Entity not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Entity is already being enriched", body = crate::error::ErrorResponse),
        (status = 422, description = "Entity is marked as a permanent failure", body = crate::error::ErrorResponse)
    )
)]
pub async fn enrich_entity(
    State(state): State<AppState>,
    ValidPath(path): ValidPath<(Parameter<Category>, Parameter<i64>)>,
) -> AppResult<Json<EnrichmentResult>> {
    let (Parameter(category), Parameter(id)) = path;
    // 404 for an unknown id or one from another category
    state.services.catalog.get_in_category(category, id).await?;

    let result = state.services.scheduler.enrich_one(id, &state.shutdown).await?;
    Ok(Json(result))
}

/// Run one background enrichment batch now
#[utoipa::path(
    post,
    path = "/enrichment/run",
    tag = "enrichment",
    responses(
        (status = 200, description = "Batch counts", body = BatchSummary)
    )
)]
pub async fn run_batch(State(state): State<AppState>) -> AppResult<Json<BatchSummary>> {
    Ok(Json(state.services.scheduler.run_once(&state.shutdown).await?))
}

/// Search a cover by identifier without touching the catalog
#[utoipa::path(
    get,
    path = "/lookup/{category}/{id_type}/{value}",
    tag = "enrichment",
    params(
        ("category" = Category, Path, description = "books, movies, games or music"),
        ("id_type" = IdentifierType, Path, description = "isbn, lccn, oclc, olid, upc or ean"),
        ("value" = String, Path, description = "Identifier value")
    ),
    responses(
        (status = 200, description = "Cover found", body = CoverLookupResponse),
        (status = 400, description = "Invalid category or identifier type", body = crate::error::ErrorResponse),
        (status = 404, description = "No cover found", body = crate::error::ErrorResponse),
        (status = 502, description = "Lookup service error", body = crate::error::ErrorResponse)
    )
)]
pub async fn lookup_cover(
    State(state): State<AppState>,
    ValidPath(path): ValidPath<(Parameter<Category>, Parameter<IdentifierType>, String)>,
) -> AppResult<Json<CoverLookupResponse>> {
    let (Parameter(category), Parameter(id_type), value) = path;
    let image_url = state
        .services
        .enrichment
        .search_cover(category, id_type, &value, &state.shutdown)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No cover found for {} {}", id_type, value)))?;

    Ok(Json(CoverLookupResponse {
        category,
        id_type,
        value: id_type.normalize(&value),
        image_url,
    }))
}
