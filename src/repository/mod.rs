//! Repository layer for catalog entities

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{Category, CoverImage, Entity, ImageLookup, MediaEntity},
};

pub use memory::InMemoryEntityStore;

/// Enrichment fields written back for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRecord {
    pub id: i64,
    /// Replaces the stored cover when present
    pub cover: Option<CoverImage>,
    pub lookup: ImageLookup,
}

impl EnrichmentRecord {
    /// The enrichment fields of an entity, `None` before its first attempt
    pub fn from_entity<E: Entity + ?Sized>(entity: &E) -> Option<Self> {
        Some(Self {
            id: entity.id()?,
            cover: entity.cover_image().cloned(),
            lookup: entity.image_lookup()?.clone(),
        })
    }

    /// Apply to a stored entity. A failed attempt never replaces the state of
    /// an entity that already has a cover; returns false when ignored.
    pub fn apply_to<E: Entity + ?Sized>(self, entity: &mut E) -> bool {
        let common = entity.common_mut();
        match self.cover {
            Some(cover) => common.cover_image = Some(cover),
            None if common.cover_image.is_some() => return false,
            None => {}
        }
        common.image_lookup = Some(self.lookup);
        true
    }
}

/// Entity persistence used by the import and enrichment services
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Store new entities, assigning ids in input order
    async fn insert_many(&self, entities: Vec<MediaEntity>) -> AppResult<Vec<i64>>;

    async fn get(&self, id: i64) -> AppResult<MediaEntity>;

    /// All entities, optionally restricted to one category, ordered by id
    async fn list(&self, category: Option<Category>) -> AppResult<Vec<MediaEntity>>;

    /// Write back enrichment outcomes. Only `cover_image` and `image_lookup`
    /// change; either every record is applied or none is.
    async fn record_enrichments(&self, records: Vec<EnrichmentRecord>) -> AppResult<()>;

    /// Entities due for a cover lookup, oldest id first
    async fn pending_enrichment(&self, retry_before: DateTime<Utc>, limit: usize) -> AppResult<Vec<MediaEntity>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, CatalogFields, ImageSource};

    fn cover() -> CoverImage {
        CoverImage {
            reference: "ab.jpg".to_string(),
            source_url: "http://img/dune.jpg".to_string(),
            content_type: Some("image/jpeg".to_string()),
            sha256: "ab".to_string(),
            size_bytes: 3,
            source: ImageSource::DirectUrl,
            fetched_at: Utc::now(),
        }
    }

    fn book() -> Book {
        Book {
            common: CatalogFields {
                id: Some(1),
                title: "Dune".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_record_requires_an_attempt() {
        assert_eq!(EnrichmentRecord::from_entity(&book()), None);

        let mut attempted = book();
        attempted.common.image_lookup = Some(ImageLookup::retryable(Utc::now(), "timeout"));
        let record = EnrichmentRecord::from_entity(&attempted).unwrap();
        assert_eq!(record.id, 1);
        assert!(record.cover.is_none());
    }

    #[test]
    fn test_failure_does_not_replace_saved_cover() {
        let mut stored = book();
        stored.common.cover_image = Some(cover());
        stored.common.image_lookup = Some(ImageLookup::succeeded(Utc::now()));

        let failure = EnrichmentRecord {
            id: 1,
            cover: None,
            lookup: ImageLookup::retryable(Utc::now(), "timed out"),
        };
        assert!(!failure.apply_to(&mut stored));
        assert_eq!(stored.cover_image().map(|c| c.reference.as_str()), Some("ab.jpg"));
        assert!(stored.image_lookup().unwrap().failure_reason.is_none());
    }

    #[test]
    fn test_success_replaces_cover_and_lookup() {
        let mut stored = book();
        stored.common.image_lookup = Some(ImageLookup::retryable(Utc::now(), "timeout"));

        let success = EnrichmentRecord {
            id: 1,
            cover: Some(cover()),
            lookup: ImageLookup::succeeded(Utc::now()),
        };
        assert!(success.apply_to(&mut stored));
        assert_eq!(stored.cover_image().map(|c| c.reference.as_str()), Some("ab.jpg"));
        assert!(stored.image_lookup().unwrap().failure_reason.is_none());
    }
}
