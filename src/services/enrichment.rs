//! Cover image enrichment.
//!
//! For one entity: try the entity's own image URL, then search the category's
//! lookup service by the entity's identifier. The outcome is written to the
//! entity's `cover_image` / `image_lookup` fields only once it is definitive;
//! a cancelled run leaves the entity untouched.
//!
//! An entity with neither an image URL nor a usable identifier can never
//! succeed. It is marked as a permanent failure without any network call, and
//! callers are expected to stop submitting it.
//!
//! An entity with an image URL but no identifier whose download fails is only
//! a retryable failure: the URL may serve an image later. Schedulers retry it
//! once every `retry_after` with no attempt limit.

use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::images::ImageStore;
use super::lookup::{CoverSearch, ImageFetcher, LookupError};
use crate::{
    error::{AppError, AppResult},
    models::{
        Category, CoverImage, EnrichmentResult, Entity, IdentifierType, ImageLookup, ImageSource,
        LookupIdentifier,
    },
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentError {
    #[error("enrichment cancelled")]
    Cancelled,
}

impl From<EnrichmentError> for AppError {
    fn from(e: EnrichmentError) -> Self {
        AppError::Internal(e.to_string())
    }
}

/// Definitive outcome, before it is applied to the entity
enum Outcome {
    Succeeded { image_url: String, cover: CoverImage },
    Retryable(String),
    Permanent(String),
}

async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, EnrichmentError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EnrichmentError::Cancelled),
        output = fut => Ok(output),
    }
}

#[derive(Clone)]
pub struct EnrichmentService {
    fetcher: Arc<dyn ImageFetcher>,
    images: Arc<dyn ImageStore>,
    searches: HashMap<Category, Arc<dyn CoverSearch>>,
}

impl EnrichmentService {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, images: Arc<dyn ImageStore>) -> Self {
        Self {
            fetcher,
            images,
            searches: HashMap::new(),
        }
    }

    /// Use `search` for entities of `category`
    pub fn with_search(mut self, category: Category, search: Arc<dyn CoverSearch>) -> Self {
        self.searches.insert(category, search);
        self
    }

    /// Search a cover without touching any entity
    pub async fn search_cover(
        &self,
        category: Category,
        id_type: IdentifierType,
        value: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Option<String>> {
        let search = self.searches.get(&category).ok_or_else(|| {
            AppError::BusinessRule(format!("No cover search service configured for {}", category))
        })?;
        if !search.supports(id_type) {
            return Err(LookupError::Unsupported {
                service: search.name(),
                id_type,
            }
            .into());
        }
        let value = id_type.normalize(value);
        if value.is_empty() {
            return Err(AppError::Validation(format!("Empty {} value", id_type)));
        }
        Ok(cancellable(cancel, search.search(id_type, &value)).await??)
    }

    /// Enrich one entity and record the outcome on it.
    ///
    /// Returns `Err(Cancelled)` only when `cancel` fires before a definitive
    /// outcome; every lookup failure is reported in the result instead.
    pub async fn enrich<E>(&self, entity: &mut E, cancel: &CancellationToken) -> Result<EnrichmentResult, EnrichmentError>
    where
        E: Entity + ?Sized,
    {
        if cancel.is_cancelled() {
            return Err(EnrichmentError::Cancelled);
        }

        let category = entity.category();
        let image_url = entity.image_url().map(String::from);
        let identifier = entity.lookup_identifier();

        let outcome = self.attempt(category, image_url, identifier, cancel).await?;

        let now = Utc::now();
        let common = entity.common_mut();
        let result = match outcome {
            Outcome::Succeeded { image_url, cover } => {
                tracing::info!("Cover found for {} '{}' at {}", category, common.title, image_url);
                let saved = cover.reference.clone();
                common.cover_image = Some(cover);
                common.image_lookup = Some(ImageLookup::succeeded(now));
                EnrichmentResult::succeeded(image_url, saved)
            }
            Outcome::Retryable(reason) => {
                tracing::warn!("Cover lookup failed for {} '{}': {}", category, common.title, reason);
                common.image_lookup = Some(ImageLookup::retryable(now, reason.clone()));
                EnrichmentResult::retryable(reason)
            }
            Outcome::Permanent(reason) => {
                tracing::info!(
                    "Cover lookup impossible for {} '{}', not retrying: {}",
                    category,
                    common.title,
                    reason
                );
                common.image_lookup = Some(ImageLookup::permanent(now, reason.clone()));
                EnrichmentResult::permanent(reason)
            }
        };

        Ok(result)
    }

    async fn attempt(
        &self,
        category: Category,
        image_url: Option<String>,
        identifier: Option<LookupIdentifier>,
        cancel: &CancellationToken,
    ) -> Result<Outcome, EnrichmentError> {
        if image_url.is_none() && identifier.is_none() {
            return Ok(Outcome::Permanent(format!(
                "No image URL and no {} to search by",
                category.lookup_identifier_type()
            )));
        }

        let mut failures = Vec::new();

        if let Some(url) = image_url {
            match self.download(&url, ImageSource::DirectUrl, cancel).await? {
                Ok(cover) => {
                    return Ok(Outcome::Succeeded {
                        image_url: url,
                        cover,
                    })
                }
                Err(e) => failures.push(format!("direct download failed: {}", e)),
            }
        }

        let Some(identifier) = identifier else {
            return Ok(Outcome::Retryable(failures.join("; ")));
        };

        let Some(search) = self.searches.get(&category) else {
            failures.push(format!("no cover search service configured for {}", category));
            return Ok(Outcome::Retryable(failures.join("; ")));
        };

        let LookupIdentifier { id_type, value } = identifier;
        if !search.supports(id_type) {
            failures.push(
                LookupError::Unsupported {
                    service: search.name(),
                    id_type,
                }
                .to_string(),
            );
            return Ok(Outcome::Retryable(failures.join("; ")));
        }
        if !id_type.is_valid(&value) {
            tracing::warn!("{} '{}' does not look valid, searching anyway", id_type, value);
        }

        match cancellable(cancel, search.search(id_type, &value)).await? {
            Ok(Some(found)) => {
                let source = ImageSource::Search {
                    service: search.name(),
                };
                match self.download(&found, source, cancel).await? {
                    Ok(cover) => {
                        return Ok(Outcome::Succeeded {
                            image_url: found,
                            cover,
                        })
                    }
                    Err(e) => failures.push(format!("download of search result failed: {}", e)),
                }
            }
            Ok(None) => failures.push(format!(
                "{} found no cover for {} {}",
                search.name(),
                id_type,
                value
            )),
            Err(e) => failures.push(format!("{} search failed: {}", search.name(), e)),
        }

        Ok(Outcome::Retryable(failures.join("; ")))
    }

    async fn download(
        &self,
        url: &str,
        source: ImageSource,
        cancel: &CancellationToken,
    ) -> Result<Result<CoverImage, LookupError>, EnrichmentError> {
        let image = match cancellable(cancel, self.fetcher.fetch(url)).await? {
            Ok(image) => image,
            Err(e) => return Ok(Err(e)),
        };
        Ok(self.images.save(&image, source).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Book, CatalogFields, MediaEntity, Movie};
    use crate::services::images::MockImageStore;
    use crate::services::lookup::{FetchedImage, MockCoverSearch, MockImageFetcher};
    use mockall::predicate::eq;

    fn book(isbn: Option<&str>, image_url: Option<&str>) -> Book {
        Book {
            common: CatalogFields {
                title: "Dune".to_string(),
                image_url: image_url.map(String::from),
                ..Default::default()
            },
            isbn: isbn.map(String::from),
            ..Default::default()
        }
    }

    fn fetched(url: &str) -> FetchedImage {
        FetchedImage {
            url: url.to_string(),
            bytes: vec![0xFF, 0xD8, 0xFF],
            content_type: Some("image/jpeg".to_string()),
        }
    }

    fn stored(image: &FetchedImage, source: ImageSource) -> CoverImage {
        CoverImage {
            reference: "abc.jpg".to_string(),
            source_url: image.url.clone(),
            content_type: image.content_type.clone(),
            sha256: "abc".to_string(),
            size_bytes: image.bytes.len() as u64,
            source,
            fetched_at: Utc::now(),
        }
    }

    fn accepting_store() -> MockImageStore {
        let mut images = MockImageStore::new();
        images.expect_save().returning(|image, source| Ok(stored(image, source)));
        images
    }

    fn untouched_search() -> MockCoverSearch {
        let mut search = MockCoverSearch::new();
        search.expect_search().never();
        search.expect_name().return_const("openlibrary".to_string());
        search.expect_supports().return_const(true);
        search
    }

    fn service(fetcher: MockImageFetcher, images: MockImageStore, search: MockCoverSearch) -> EnrichmentService {
        EnrichmentService::new(Arc::new(fetcher), Arc::new(images))
            .with_search(Category::Books, Arc::new(search))
    }

    #[tokio::test]
    async fn test_no_identifier_no_url_is_permanent_without_network() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().never();
        let mut images = MockImageStore::new();
        images.expect_save().never();

        let svc = service(fetcher, images, untouched_search());
        let mut entity = book(None, None);

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, crate::models::EnrichmentState::FailedPermanent);
        assert!(result.permanent_failure);
        assert!(!result.success);
        let lookup = entity.image_lookup().unwrap();
        assert!(lookup.permanent_failure);
        assert!(lookup.failure_reason.as_deref().unwrap().contains("isbn"));
        assert!(entity.cover_image().is_none());
    }

    #[tokio::test]
    async fn test_direct_url_success_skips_search() {
        let mut fetcher = MockImageFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("http://img.example/dune.jpg"))
            .times(1)
            .returning(|url| Ok(fetched(url)));

        let svc = service(fetcher, accepting_store(), untouched_search());
        let mut entity = book(Some("9780441172719"), Some("http://img.example/dune.jpg"));

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.image_url.as_deref(), Some("http://img.example/dune.jpg"));
        assert_eq!(result.saved_image.as_deref(), Some("abc.jpg"));
        assert_eq!(entity.cover_image().unwrap().source, ImageSource::DirectUrl);
        let lookup = entity.image_lookup().unwrap();
        assert!(lookup.failure_reason.is_none());
        assert!(!lookup.permanent_failure);
    }

    #[tokio::test]
    async fn test_falls_back_to_search_when_direct_download_fails() {
        let mut fetcher = MockImageFetcher::new();
        fetcher
            .expect_fetch()
            .with(eq("http://img.example/broken.jpg"))
            .times(1)
            .returning(|url| {
                Err(LookupError::Status {
                    url: url.to_string(),
                    status: 404,
                })
            });
        fetcher
            .expect_fetch()
            .with(eq("https://covers.example/b/id/1-L.jpg"))
            .times(1)
            .returning(|url| Ok(fetched(url)));

        let mut search = MockCoverSearch::new();
        search.expect_name().return_const("openlibrary".to_string());
        search.expect_supports().return_const(true);
        search
            .expect_search()
            .with(eq(IdentifierType::Isbn), eq("9780441172719"))
            .times(1)
            .returning(|_, _| Ok(Some("https://covers.example/b/id/1-L.jpg".to_string())));

        let svc = service(fetcher, accepting_store(), search);
        let mut entity = book(Some("978-0-441-17271-9"), Some("http://img.example/broken.jpg"));

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(
            entity.cover_image().unwrap().source,
            ImageSource::Search {
                service: "openlibrary".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_search_without_match_is_retryable() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().never();
        let mut search = MockCoverSearch::new();
        search.expect_name().return_const("openlibrary".to_string());
        search.expect_supports().return_const(true);
        search.expect_search().times(1).returning(|_, _| Ok(None));

        let svc = service(fetcher, MockImageStore::new(), search);
        let mut entity = book(Some("9780441172719"), None);
        let before = Utc::now();

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, crate::models::EnrichmentState::FailedRetryable);
        assert!(!result.permanent_failure);
        assert!(result.error.as_deref().unwrap().contains("no cover"));
        let lookup = entity.image_lookup().unwrap();
        assert!(!lookup.permanent_failure);
        assert!(lookup.attempted_at >= before);
        assert!(lookup.failure_reason.is_some());
    }

    #[tokio::test]
    async fn test_network_error_is_retryable_and_keeps_previous_cover() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().never();
        let mut search = MockCoverSearch::new();
        search.expect_name().return_const("openlibrary".to_string());
        search.expect_supports().return_const(true);
        search
            .expect_search()
            .returning(|_, _| Err(LookupError::Timeout("http://ol".to_string())));

        let svc = service(fetcher, MockImageStore::new(), search);
        let mut entity = book(Some("9780441172719"), None);
        let previous = stored(&fetched("http://old"), ImageSource::DirectUrl);
        entity.common.cover_image = Some(previous.clone());

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(entity.cover_image(), Some(&previous));
    }

    #[tokio::test]
    async fn test_failed_url_without_identifier_stays_retryable() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().times(1).returning(|url| {
            Err(LookupError::Status {
                url: url.to_string(),
                status: 404,
            })
        });
        let svc = service(fetcher, MockImageStore::new(), untouched_search());
        let mut entity = book(None, Some("http://img.example/gone.jpg"));

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert_eq!(result.state, crate::models::EnrichmentState::FailedRetryable);
        assert!(!result.permanent_failure);
        let attempted_at = entity.image_lookup().unwrap().attempted_at;
        assert!(!entity.is_enrichment_due(attempted_at - chrono::Duration::seconds(1)));
        assert!(entity.is_enrichment_due(attempted_at));
    }

    #[tokio::test]
    async fn test_running_twice_on_permanent_entity_gives_same_state() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().never();
        let svc = service(fetcher, MockImageStore::new(), untouched_search());
        let mut entity = MediaEntity::from(Movie {
            common: CatalogFields {
                title: "Alien".to_string(),
                ..Default::default()
            },
            ..Default::default()
        });

        let first = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();
        let second = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert_eq!(first.state, second.state);
        assert!(entity.is_permanent_failure());
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_entity_untouched() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().never();
        let svc = service(fetcher, MockImageStore::new(), untouched_search());
        let mut entity = book(Some("9780441172719"), Some("http://img.example/dune.jpg"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = svc.enrich(&mut entity, &cancel).await;

        assert_eq!(result, Err(EnrichmentError::Cancelled));
        assert!(entity.image_lookup().is_none());
        assert!(entity.cover_image().is_none());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_in_flight_call() {
        struct Hanging;

        #[async_trait::async_trait]
        impl ImageFetcher for Hanging {
            async fn fetch(&self, _url: &str) -> Result<FetchedImage, LookupError> {
                std::future::pending().await
            }
        }

        let svc = EnrichmentService::new(Arc::new(Hanging), Arc::new(MockImageStore::new()));
        let mut entity = book(None, Some("http://img.example/slow.jpg"));
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                cancel.cancel();
            })
        };

        let result = svc.enrich(&mut entity, &cancel).await;
        canceller.await.unwrap();

        assert_eq!(result, Err(EnrichmentError::Cancelled));
        assert!(entity.image_lookup().is_none());
    }

    #[tokio::test]
    async fn test_missing_search_service_is_retryable() {
        let mut fetcher = MockImageFetcher::new();
        fetcher.expect_fetch().never();
        let svc = EnrichmentService::new(Arc::new(fetcher), Arc::new(MockImageStore::new()));
        let mut entity = MediaEntity::from(Movie {
            common: CatalogFields {
                title: "Alien".to_string(),
                ..Default::default()
            },
            upc: Some("024543617907".to_string()),
            ..Default::default()
        });

        let result = svc.enrich(&mut entity, &CancellationToken::new()).await.unwrap();

        assert!(!result.permanent_failure);
        assert!(result.error.unwrap().contains("no cover search service"));
    }

    #[tokio::test]
    async fn test_search_cover_rejects_unsupported_type() {
        let mut search = MockCoverSearch::new();
        search.expect_name().return_const("openlibrary".to_string());
        search.expect_supports().with(eq(IdentifierType::Upc)).return_const(false);
        search.expect_search().never();
        let svc = service(MockImageFetcher::new(), MockImageStore::new(), search);

        let err = svc
            .search_cover(Category::Books, IdentifierType::Upc, "012345678905", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
