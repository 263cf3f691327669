//! Business logic services

pub mod catalog;
pub mod enrichment;
pub mod images;
pub mod lookup;
pub mod scheduler;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    error::AppResult,
    models::Category,
    repository::EntityStore,
    tabular::{converters::STANDARD_REGISTRY, RecordMapper},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub enrichment: enrichment::EnrichmentService,
    pub scheduler: scheduler::EnrichmentScheduler,
}

impl Services {
    /// Wire the HTTP-backed lookup services over the given store
    pub fn new(store: Arc<dyn EntityStore>, config: &AppConfig) -> AppResult<Self> {
        let client = lookup::build_http_client(&config.enrichment)?;

        let books = Arc::new(lookup::OpenLibraryCoverSearch::new(
            client.clone(),
            config.enrichment.openlibrary_url.clone(),
        ));
        let barcodes = Arc::new(lookup::UpcLookupCoverSearch::new(
            client.clone(),
            config.enrichment.upc_lookup_url.clone(),
        ));

        let enrichment = enrichment::EnrichmentService::new(
            Arc::new(lookup::HttpImageFetcher::new(client, config.enrichment.max_image_bytes)),
            Arc::new(images::FileSystemImageStore::new(config.enrichment.image_dir.clone())),
        )
        .with_search(Category::Books, books)
        .with_search(Category::Movies, barcodes.clone())
        .with_search(Category::Games, barcodes.clone())
        .with_search(Category::Music, barcodes);

        Ok(Self::with_enrichment(store, enrichment, config))
    }

    /// Build the services around an already configured enrichment service
    pub fn with_enrichment(
        store: Arc<dyn EntityStore>,
        enrichment: enrichment::EnrichmentService,
        config: &AppConfig,
    ) -> Self {
        let mapper = RecordMapper::new(STANDARD_REGISTRY.clone(), &config.import);
        Self {
            catalog: catalog::CatalogService::new(store.clone(), mapper, config.import.csv_delimiter),
            scheduler: scheduler::EnrichmentScheduler::new(store, enrichment.clone(), &config.enrichment),
            enrichment,
        }
    }
}
