//! Catalog service: tabular import and entity queries

use std::sync::Arc;

use crate::{
    error::{AppError, AppResult},
    models::{Category, Entity, ImportReport, MediaEntity},
    repository::EntityStore,
    tabular::{read_table, RecordMapper},
};

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn EntityStore>,
    mapper: RecordMapper,
    csv_delimiter: char,
}

impl CatalogService {
    pub fn new(store: Arc<dyn EntityStore>, mapper: RecordMapper, csv_delimiter: char) -> Self {
        Self {
            store,
            mapper,
            csv_delimiter,
        }
    }

    /// Import a delimited export into `category`.
    ///
    /// Malformed cells and untitled rows are reported in the returned
    /// warnings; only an unreadable file fails the whole import.
    pub async fn import(&self, category: Category, data: &[u8]) -> AppResult<ImportReport> {
        let table = read_table(data, self.csv_delimiter)?;

        let outcome = self.mapper.map_category(category, &table.headers, &table.rows);
        if !outcome.unmatched_columns.is_empty() {
            tracing::info!(
                "Import into {}: ignoring unknown columns {:?}",
                category,
                outcome.unmatched_columns
            );
        }

        let imported = outcome.entities.len();
        let ids = if imported > 0 {
            self.store.insert_many(outcome.entities).await?
        } else {
            Vec::new()
        };

        tracing::info!(
            "Imported {} {} ({} skipped, {} warnings)",
            imported,
            category,
            outcome.skipped,
            outcome.warnings.len()
        );

        Ok(ImportReport {
            category,
            imported,
            skipped: outcome.skipped,
            ids,
            warnings: outcome.warnings,
            unmatched_columns: outcome.unmatched_columns,
            enrichment_queued: false,
        })
    }

    /// Get an entity, checking that it belongs to `category`
    pub async fn get_in_category(&self, category: Category, id: i64) -> AppResult<MediaEntity> {
        let entity = self.store.get(id).await?;
        if entity.category() != category {
            return Err(AppError::NotFound(format!("No {} with id {}", category, id)));
        }
        Ok(entity)
    }

    pub async fn list(&self, category: Category) -> AppResult<Vec<MediaEntity>> {
        self.store.list(Some(category)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryEntityStore, MockEntityStore};

    fn service(store: Arc<dyn EntityStore>) -> CatalogService {
        CatalogService::new(store, RecordMapper::default(), ',')
    }

    #[tokio::test]
    async fn test_import_books_csv() {
        let store = Arc::new(InMemoryEntityStore::new());
        let svc = service(store.clone());
        let csv = "Title,Author,Pages,ISBN,Shelf\n\
                   Dune,Herbert|Anderson,412,9780441172719,A1\n\
                   ,Nobody,1,,\n\
                   Emma,Austen,lots,,\n";

        let report = svc.import(Category::Books, csv.as_bytes()).await.unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.ids, vec![1, 2]);
        assert_eq!(report.unmatched_columns, vec!["Shelf"]);
        assert_eq!(report.warnings.len(), 2);
        assert!(!report.enrichment_queued);

        let dune = svc.get_in_category(Category::Books, 1).await.unwrap();
        assert_eq!(dune.title(), "Dune");
        assert!(dune.image_lookup().is_none());
        assert_eq!(svc.list(Category::Books).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_get_in_wrong_category_is_not_found() {
        let store = Arc::new(InMemoryEntityStore::new());
        let svc = service(store);
        svc.import(Category::Movies, b"Title\nAlien\n").await.unwrap();

        let err = svc.get_in_category(Category::Books, 1).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_import_without_entities_does_not_touch_store() {
        let mut store = MockEntityStore::new();
        store.expect_insert_many().never();
        let svc = service(Arc::new(store));

        let report = svc.import(Category::Games, b"Title,Platform\n,Switch\n").await.unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_import_rejects_empty_file() {
        let svc = service(Arc::new(MockEntityStore::new()));
        assert!(svc.import(Category::Books, b"").await.is_err());
    }
}
