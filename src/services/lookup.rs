//! External lookup services: direct image download and cover search.
//!
//! Both are fallible, latency-bearing dependencies behind async traits so the
//! enrichment orchestrator can be driven by mocks in tests.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::{
    config::EnrichmentConfig,
    error::{AppError, AppResult},
    models::IdentifierType,
};

/// Failure of one external call. Always retryable from the pipeline's view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("request to {url} failed: {reason}")]
    Network { url: String, reason: String },

    #[error("request to {0} timed out")]
    Timeout(String),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {source_name}: {reason}")]
    Malformed { source_name: String, reason: String },

    #[error("{service} does not support {id_type} identifiers")]
    Unsupported { service: String, id_type: IdentifierType },

    #[error("failed to store image: {0}")]
    Storage(String),
}

impl LookupError {
    fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            LookupError::Timeout(url.to_string())
        } else {
            LookupError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl From<LookupError> for AppError {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::Timeout(_) => AppError::LookupTimeout(e.to_string()),
            LookupError::Unsupported { .. } => AppError::Validation(e.to_string()),
            LookupError::Storage(msg) => AppError::Internal(msg),
            _ => AppError::Lookup(e.to_string()),
        }
    }
}

/// Downloaded image payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub url: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// "Resolve image by direct URL"
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, LookupError>;
}

/// "Search cover by identifier", one implementation per external API
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CoverSearch: Send + Sync {
    /// Service name recorded as the image source
    fn name(&self) -> String;

    fn supports(&self, id_type: IdentifierType) -> bool;

    /// URL of a cover image, `None` when the service has no match
    async fn search(&self, id_type: IdentifierType, value: &str) -> Result<Option<String>, LookupError>;
}

/// Shared HTTP client for every outbound lookup
pub fn build_http_client(config: &EnrichmentConfig) -> AppResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

// ---------------------------------------------------------------------------
// Direct download
// ---------------------------------------------------------------------------

/// Plain HTTP GET of an image resource
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpImageFetcher {
    pub fn new(client: Client, max_bytes: usize) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedImage, LookupError> {
        tracing::debug!("Downloading image {}", url);

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let malformed = |reason: String| LookupError::Malformed {
            source_name: url.to_string(),
            reason,
        };

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

        match content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => {}
            Some(ct) => return Err(malformed(format!("expected an image, got {}", ct))),
            None => return Err(malformed("response has no content type".to_string())),
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes as u64 {
                return Err(malformed(format!("image is {} bytes, limit is {}", len, self.max_bytes)));
            }
        }

        // Content-Length may be absent (chunked), so the cap is enforced while reading
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| LookupError::from_reqwest(url, e))?
        {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(malformed(format!("image exceeds the {} byte limit", self.max_bytes)));
            }
            bytes.extend_from_slice(&chunk);
        }

        if bytes.is_empty() {
            return Err(malformed("empty body".to_string()));
        }

        Ok(FetchedImage {
            url: url.to_string(),
            bytes,
            content_type,
        })
    }
}

// ---------------------------------------------------------------------------
// Open Library (books)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OpenLibraryCover {
    small: Option<String>,
    medium: Option<String>,
    large: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenLibraryBook {
    cover: Option<OpenLibraryCover>,
}

/// Book covers from the Open Library "books" API
#[derive(Clone)]
pub struct OpenLibraryCoverSearch {
    client: Client,
    base_url: String,
}

impl OpenLibraryCoverSearch {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn bibkey_prefix(id_type: IdentifierType) -> Option<&'static str> {
        match id_type {
            IdentifierType::Isbn => Some("ISBN"),
            IdentifierType::Lccn => Some("LCCN"),
            IdentifierType::Oclc => Some("OCLC"),
            IdentifierType::Olid => Some("OLID"),
            IdentifierType::Upc | IdentifierType::Ean => None,
        }
    }
}

#[async_trait]
impl CoverSearch for OpenLibraryCoverSearch {
    fn name(&self) -> String {
        "openlibrary".to_string()
    }

    fn supports(&self, id_type: IdentifierType) -> bool {
        Self::bibkey_prefix(id_type).is_some()
    }

    async fn search(&self, id_type: IdentifierType, value: &str) -> Result<Option<String>, LookupError> {
        let prefix = Self::bibkey_prefix(id_type).ok_or_else(|| LookupError::Unsupported {
            service: self.name(),
            id_type,
        })?;
        let bibkey = format!("{}:{}", prefix, value);
        let url = format!("{}/api/books", self.base_url);

        tracing::debug!("Open Library lookup for {}", bibkey);

        let response = self
            .client
            .get(&url)
            .query(&[("bibkeys", bibkey.as_str()), ("format", "json"), ("jscmd", "data")])
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(&url, e))?;

        if !response.status().is_success() {
            return Err(LookupError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        let mut books: HashMap<String, OpenLibraryBook> =
            response.json().await.map_err(|e| LookupError::Malformed {
                source_name: self.name(),
                reason: e.to_string(),
            })?;

        let cover = books
            .remove(&bibkey)
            .and_then(|book| book.cover)
            .and_then(|c| c.large.or(c.medium).or(c.small))
            .filter(|u| !u.trim().is_empty());

        Ok(cover)
    }
}

// ---------------------------------------------------------------------------
// UPC lookup (movies, games, music)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct UpcItem {
    #[serde(default)]
    images: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct UpcLookupResponse {
    #[serde(default)]
    items: Vec<UpcItem>,
}

/// Product images from a UPC/EAN lookup API
#[derive(Clone)]
pub struct UpcLookupCoverSearch {
    client: Client,
    base_url: String,
}

impl UpcLookupCoverSearch {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl CoverSearch for UpcLookupCoverSearch {
    fn name(&self) -> String {
        "upclookup".to_string()
    }

    fn supports(&self, id_type: IdentifierType) -> bool {
        matches!(id_type, IdentifierType::Upc | IdentifierType::Ean)
    }

    async fn search(&self, id_type: IdentifierType, value: &str) -> Result<Option<String>, LookupError> {
        if !self.supports(id_type) {
            return Err(LookupError::Unsupported {
                service: self.name(),
                id_type,
            });
        }
        let url = format!("{}/prod/trial/lookup", self.base_url);

        tracing::debug!("UPC lookup for {} {}", id_type, value);

        let response = self
            .client
            .get(&url)
            .query(&[("upc", value)])
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(&url, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Ok(None),
            status if !status.is_success() => {
                return Err(LookupError::Status {
                    url,
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        let body: UpcLookupResponse = response.json().await.map_err(|e| LookupError::Malformed {
            source_name: self.name(),
            reason: e.to_string(),
        })?;

        Ok(body
            .items
            .into_iter()
            .flat_map(|item| item.images)
            .find(|u| !u.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_library_supported_types() {
        let search = OpenLibraryCoverSearch::new(Client::new(), "http://localhost/");
        assert!(search.supports(IdentifierType::Isbn));
        assert!(search.supports(IdentifierType::Olid));
        assert!(!search.supports(IdentifierType::Upc));
        assert_eq!(search.base_url, "http://localhost");
    }

    #[test]
    fn test_upc_supported_types() {
        let search = UpcLookupCoverSearch::new(Client::new(), "http://localhost");
        assert!(search.supports(IdentifierType::Upc));
        assert!(search.supports(IdentifierType::Ean));
        assert!(!search.supports(IdentifierType::Isbn));
    }

    #[test]
    fn test_lookup_error_maps_to_app_error() {
        let err: AppError = LookupError::Timeout("http://x".to_string()).into();
        assert!(matches!(err, AppError::LookupTimeout(_)));

        let err: AppError = LookupError::Unsupported {
            service: "openlibrary".to_string(),
            id_type: IdentifierType::Upc,
        }
        .into();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
