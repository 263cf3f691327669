//! Data models for Mediashelf

pub mod entity;
pub mod enums;
pub mod image;
pub mod import_report;

// Re-export commonly used types
pub use entity::{Book, CatalogFields, Entity, Game, LookupIdentifier, MediaEntity, Movie, Music};
pub use enums::{Category, Condition, IdentifierType, StrictEnum};
pub use image::{CoverImage, EnrichmentResult, EnrichmentState, ImageLookup, ImageSource};
pub use import_report::{ImportReport, MappingWarning};
