//! Catalog endpoints: import schema, spreadsheet import and entity queries

use axum::{extract::State, http::StatusCode, Json};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::{Category, ImportReport, MediaEntity},
    tabular::{schema::descriptors, FieldDescriptor},
    AppState,
};

use super::{Parameter, ValidPath, ValidQuery};

/// Import query parameters
#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct ImportQuery {
    /// Queue the imported entities for cover enrichment
    #[param(value_type = Option<bool>)]
    pub enrich: Option<Parameter<bool>>,
}

/// Multipart upload of a CSV export
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImportUpload {
    /// The CSV file
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// Importable fields of a category
#[utoipa::path(
    get,
    path = "/categories/{category}/fields",
    tag = "catalog",
    params(
        ("category" = Category, Path, description = "books, movies, games or music")
    ),
    responses(
        (status = 200, description = "Import schema", body = Vec<FieldDescriptor>),
        (status = 400, description = "Unknown category", body = crate::error::ErrorResponse)
    )
)]
pub async fn category_fields(ValidPath(category): ValidPath<Parameter<Category>>) -> Json<Vec<FieldDescriptor>> {
    Json(descriptors(category.into_inner()))
}

/// Import a CSV export into a category
#[utoipa::path(
    post,
    path = "/import/{category}",
    tag = "catalog",
    params(
        ("category" = Category, Path, description = "Target category"),
        ImportQuery
    ),
    request_body(content = ImportUpload, content_type = "multipart/form-data", description = "CSV export"),
    responses(
        (status = 201, description = "Import report", body = ImportReport),
        (status = 400, description = "Unreadable upload or invalid parameter", body = crate::error::ErrorResponse)
    )
)]
pub async fn import_file(
    State(state): State<AppState>,
    ValidPath(category): ValidPath<Parameter<Category>>,
    ValidQuery(query): ValidQuery<ImportQuery>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ImportReport>)> {
    let category = category.into_inner();
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read uploaded file: {}", e)))?;
            data = Some(bytes);
            break;
        }
    }
    let data = data.ok_or_else(|| AppError::BadRequest("No file field found in multipart data".to_string()))?;

    let mut report = state.services.catalog.import(category, &data).await?;

    let enrich = query.enrich.map_or(false, Parameter::into_inner);
    if enrich && !report.ids.is_empty() {
        let scheduler = state.services.scheduler.clone();
        let ids = report.ids.clone();
        let cancel = state.shutdown.clone();
        tokio::spawn(async move {
            match scheduler.enrich_ids(&ids, &cancel).await {
                Ok(summary) => tracing::info!("Post-import enrichment finished: {:?}", summary),
                Err(e) => tracing::error!("Post-import enrichment failed: {}", e),
            }
        });
        report.enrichment_queued = true;
    }

    Ok((StatusCode::CREATED, Json(report)))
}

/// List the entities of a category
#[utoipa::path(
    get,
    path = "/entities/{category}",
    tag = "catalog",
    params(
        ("category" = Category, Path, description = "books, movies, games or music")
    ),
    responses(
        (status = 200, description = "Entities ordered by id", body = Vec<serde_json::Value>),
        (status = 400, description = "Unknown category", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_entities(
    State(state): State<AppState>,
    ValidPath(category): ValidPath<Parameter<Category>>,
) -> AppResult<Json<Vec<MediaEntity>>> {
    Ok(Json(state.services.catalog.list(category.into_inner()).await?))
}

/// Get one entity
#[utoipa::path(
    get,
    path = "/entities/{category}/{id}",
    tag = "catalog",
    params(
        ("category" = Category, Path, description = "books, movies, games or music"),
        ("id" = i64, Path, description = "Entity ID")
    ),
    responses(
        (status = 200, description = "Entity", body = serde_json::Value),
        (status = 404, description = "Entity not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_entity(
    State(state): State<AppState>,
    ValidPath(path): ValidPath<(Parameter<Category>, Parameter<i64>)>,
) -> AppResult<Json<MediaEntity>> {
    let (Parameter(category), Parameter(id)) = path;
    Ok(Json(state.services.catalog.get_in_category(category, id).await?))
}
