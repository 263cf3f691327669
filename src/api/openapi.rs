//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{catalog, enrichment, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mediashelf API",
        version = "1.0.0",
        description = "Media catalog import and cover enrichment REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        // Catalog
        catalog::category_fields,
        catalog::import_file,
        catalog::list_entities,
        catalog::get_entity,
        // Enrichment
        enrichment::enrich_entity,
        enrichment::run_batch,
        enrichment::lookup_cover,
    ),
    components(
        schemas(
            // Catalog
            crate::models::Category,
            crate::models::IdentifierType,
            crate::models::ImportReport,
            catalog::ImportUpload,
            crate::models::MappingWarning,
            crate::tabular::FieldDescriptor,
            crate::tabular::ConverterKind,
            // Enrichment
            crate::models::EnrichmentResult,
            crate::models::EnrichmentState,
            crate::services::scheduler::BatchSummary,
            enrichment::CoverLookupResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "catalog", description = "Spreadsheet import and catalog queries"),
        (name = "enrichment", description = "Cover image lookup and enrichment")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
