//! Cover image and lookup bookkeeping models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// State of the last background cover lookup for an entity.
///
/// Absent until the first enrichment attempt. Never written by the importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLookup {
    pub attempted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Terminal: the entity is never submitted again
    #[serde(default)]
    pub permanent_failure: bool,
}

impl ImageLookup {
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            attempted_at: at,
            failure_reason: None,
            permanent_failure: false,
        }
    }

    pub fn retryable(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            attempted_at: at,
            failure_reason: Some(reason.into()),
            permanent_failure: false,
        }
    }

    pub fn permanent(at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            attempted_at: at,
            failure_reason: Some(reason.into()),
            permanent_failure: true,
        }
    }
}

/// Where a cover image came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// The entity's own image URL
    DirectUrl,
    /// An external search service
    Search { service: String },
}

/// Stored cover image. Replaced wholesale on every successful enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverImage {
    /// Location of the saved file, relative to the image directory
    pub reference: String,
    pub source_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub sha256: String,
    pub size_bytes: u64,
    pub source: ImageSource,
    pub fetched_at: DateTime<Utc>,
}

/// Terminal state of one enrichment run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentState {
    Succeeded,
    FailedRetryable,
    FailedPermanent,
}

/// Outcome of enriching one entity, as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EnrichmentResult {
    pub state: EnrichmentState,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub permanent_failure: bool,
}

impl EnrichmentResult {
    pub fn succeeded(image_url: String, saved_image: String) -> Self {
        Self {
            state: EnrichmentState::Succeeded,
            success: true,
            image_url: Some(image_url),
            saved_image: Some(saved_image),
            error: None,
            permanent_failure: false,
        }
    }

    pub fn retryable(error: String) -> Self {
        Self {
            state: EnrichmentState::FailedRetryable,
            success: false,
            image_url: None,
            saved_image: None,
            error: Some(error),
            permanent_failure: false,
        }
    }

    pub fn permanent(error: String) -> Self {
        Self {
            state: EnrichmentState::FailedPermanent,
            success: false,
            image_url: None,
            saved_image: None,
            error: Some(error),
            permanent_failure: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_round_trips_unchanged() {
        let lookup = ImageLookup::permanent(Utc::now(), "no identifier");
        let json = serde_json::to_string(&lookup).unwrap();
        assert!(json.contains("\"permanentFailure\":true"));
        let back: ImageLookup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, lookup);
    }

    #[test]
    fn test_succeeded_lookup_has_no_reason() {
        let json = serde_json::to_value(ImageLookup::succeeded(Utc::now())).unwrap();
        assert!(json.get("failureReason").is_none());
        assert_eq!(json["permanentFailure"], false);
    }
}
