//! Catalog entity variants (books, movies, games, music).
//!
//! Every variant embeds the same [`CatalogFields`] block and implements
//! [`Entity`], so the import and enrichment pipeline can treat them uniformly.
//! [`MediaEntity`] is the tagged union used by storage and the API.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{Category, Condition, IdentifierType};
use super::image::{CoverImage, ImageLookup};

/// Fields shared by every entity variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFields {
    /// Assigned by the store on first save
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub title: String,
    /// Display / packaging format ("Paperback", "Blu-ray", ...)
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub cover_image: Option<CoverImage>,
    #[serde(default)]
    pub image_lookup: Option<ImageLookup>,
}

/// Identifier an entity can be searched by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupIdentifier {
    pub id_type: IdentifierType,
    /// Normalized value, never empty
    pub value: String,
}

impl LookupIdentifier {
    fn from_raw(id_type: IdentifierType, raw: Option<&str>) -> Option<Self> {
        let value = id_type.normalize(raw?);
        if value.is_empty() {
            return None;
        }
        Some(Self { id_type, value })
    }
}

/// Capability set shared by all entity variants
pub trait Entity {
    fn common(&self) -> &CatalogFields;

    fn common_mut(&mut self) -> &mut CatalogFields;

    fn category(&self) -> Category;

    /// Value of the variant's designated lookup field, when usable
    fn lookup_identifier(&self) -> Option<LookupIdentifier>;

    fn id(&self) -> Option<i64> {
        self.common().id
    }

    fn title(&self) -> &str {
        &self.common().title
    }

    fn format(&self) -> Option<&str> {
        self.common().format.as_deref()
    }

    /// Image URL, when non-blank
    fn image_url(&self) -> Option<&str> {
        self.common()
            .image_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }

    fn cover_image(&self) -> Option<&CoverImage> {
        self.common().cover_image.as_ref()
    }

    fn image_lookup(&self) -> Option<&ImageLookup> {
        self.common().image_lookup.as_ref()
    }

    /// True once the entity has been marked as never resolvable
    fn is_permanent_failure(&self) -> bool {
        self.image_lookup().map_or(false, |l| l.permanent_failure)
    }

    /// An entity without a title carries no usable data
    fn is_empty(&self) -> bool {
        self.title().trim().is_empty()
    }

    /// Eligible for a background lookup: no cover yet, not permanent, and
    /// either never attempted or last failed at or before `retry_before`
    fn is_enrichment_due(&self, retry_before: DateTime<Utc>) -> bool {
        if self.cover_image().is_some() {
            return false;
        }
        match self.image_lookup() {
            None => true,
            Some(lookup) => {
                !lookup.permanent_failure
                    && lookup.failure_reason.is_some()
                    && lookup.attempted_at <= retry_before
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(flatten)]
    pub common: CatalogFields,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub isbn: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub page_count: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub read: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    #[serde(flatten)]
    pub common: CatalogFields,
    #[serde(default)]
    pub directors: Vec<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Minutes
    #[serde(default)]
    pub runtime: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub watched: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    #[serde(flatten)]
    pub common: CatalogFields,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub developers: Vec<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Music {
    #[serde(flatten)]
    pub common: CatalogFields,
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub upc: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    /// Minutes
    #[serde(default)]
    pub length: Option<i32>,
    #[serde(default)]
    pub tracks: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// UPC-A or EAN-13 depending on the digit count
fn barcode_identifier(raw: Option<&str>) -> Option<LookupIdentifier> {
    let digits = IdentifierType::Upc.normalize(raw?);
    let id_type = if digits.len() == 13 {
        IdentifierType::Ean
    } else {
        IdentifierType::Upc
    };
    LookupIdentifier::from_raw(id_type, Some(&digits))
}

impl Entity for Book {
    fn common(&self) -> &CatalogFields {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CatalogFields {
        &mut self.common
    }

    fn category(&self) -> Category {
        Category::Books
    }

    fn lookup_identifier(&self) -> Option<LookupIdentifier> {
        LookupIdentifier::from_raw(IdentifierType::Isbn, self.isbn.as_deref())
    }
}

impl Entity for Movie {
    fn common(&self) -> &CatalogFields {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CatalogFields {
        &mut self.common
    }

    fn category(&self) -> Category {
        Category::Movies
    }

    fn lookup_identifier(&self) -> Option<LookupIdentifier> {
        barcode_identifier(self.upc.as_deref())
    }
}

impl Entity for Game {
    fn common(&self) -> &CatalogFields {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CatalogFields {
        &mut self.common
    }

    fn category(&self) -> Category {
        Category::Games
    }

    fn lookup_identifier(&self) -> Option<LookupIdentifier> {
        barcode_identifier(self.upc.as_deref())
    }
}

impl Entity for Music {
    fn common(&self) -> &CatalogFields {
        &self.common
    }

    fn common_mut(&mut self) -> &mut CatalogFields {
        &mut self.common
    }

    fn category(&self) -> Category {
        Category::Music
    }

    fn lookup_identifier(&self) -> Option<LookupIdentifier> {
        barcode_identifier(self.upc.as_deref())
    }
}

/// Any catalog entity, tagged by category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category")]
pub enum MediaEntity {
    #[serde(rename = "books")]
    Book(Book),
    #[serde(rename = "movies")]
    Movie(Movie),
    #[serde(rename = "games")]
    Game(Game),
    #[serde(rename = "music")]
    Music(Music),
}

impl MediaEntity {
    fn as_entity(&self) -> &dyn Entity {
        match self {
            MediaEntity::Book(e) => e,
            MediaEntity::Movie(e) => e,
            MediaEntity::Game(e) => e,
            MediaEntity::Music(e) => e,
        }
    }

    fn as_entity_mut(&mut self) -> &mut dyn Entity {
        match self {
            MediaEntity::Book(e) => e,
            MediaEntity::Movie(e) => e,
            MediaEntity::Game(e) => e,
            MediaEntity::Music(e) => e,
        }
    }
}

impl Entity for MediaEntity {
    fn common(&self) -> &CatalogFields {
        self.as_entity().common()
    }

    fn common_mut(&mut self) -> &mut CatalogFields {
        self.as_entity_mut().common_mut()
    }

    fn category(&self) -> Category {
        self.as_entity().category()
    }

    fn lookup_identifier(&self) -> Option<LookupIdentifier> {
        self.as_entity().lookup_identifier()
    }
}

impl From<Book> for MediaEntity {
    fn from(e: Book) -> Self {
        MediaEntity::Book(e)
    }
}

impl From<Movie> for MediaEntity {
    fn from(e: Movie) -> Self {
        MediaEntity::Movie(e)
    }
}

impl From<Game> for MediaEntity {
    fn from(e: Game) -> Self {
        MediaEntity::Game(e)
    }
}

impl From<Music> for MediaEntity {
    fn from(e: Music) -> Self {
        MediaEntity::Music(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, isbn: Option<&str>) -> Book {
        Book {
            common: CatalogFields {
                title: title.to_string(),
                ..Default::default()
            },
            isbn: isbn.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_book_lookup_identifier_is_normalized() {
        let id = book("Dune", Some("978-0-441-17271-9")).lookup_identifier().unwrap();
        assert_eq!(id.id_type, IdentifierType::Isbn);
        assert_eq!(id.value, "9780441172719");
    }

    #[test]
    fn test_blank_identifier_is_not_usable() {
        assert!(book("Dune", Some("  ")).lookup_identifier().is_none());
        assert!(book("Dune", None).lookup_identifier().is_none());
    }

    #[test]
    fn test_barcode_identifier_type_follows_length() {
        let movie = Movie {
            upc: Some("5 012345 678900".to_string()),
            ..Default::default()
        };
        assert_eq!(movie.lookup_identifier().unwrap().id_type, IdentifierType::Ean);

        let game = Game {
            upc: Some("012345678905".to_string()),
            ..Default::default()
        };
        assert_eq!(game.lookup_identifier().unwrap().id_type, IdentifierType::Upc);
    }

    #[test]
    fn test_is_empty() {
        assert!(book("   ", None).is_empty());
        assert!(!book("Dune", None).is_empty());
    }

    #[test]
    fn test_media_entity_serializes_with_category_tag() {
        let entity = MediaEntity::from(book("Dune", Some("9780441172719")));
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["category"], "books");
        assert_eq!(json["title"], "Dune");
        assert_eq!(json["isbn"], "9780441172719");

        let back: MediaEntity = serde_json::from_value(json).unwrap();
        assert_eq!(back, entity);
        assert_eq!(back.category(), Category::Books);
    }

    #[test]
    fn test_enrichment_due() {
        use crate::models::ImageLookup;
        use chrono::Duration;

        let now = Utc::now();
        let mut b = book("Dune", Some("9780441172719"));
        assert!(b.is_enrichment_due(now));

        b.common.image_lookup = Some(ImageLookup::retryable(now - Duration::hours(2), "timeout"));
        assert!(b.is_enrichment_due(now - Duration::hours(1)));
        assert!(!b.is_enrichment_due(now - Duration::hours(3)));

        b.common.image_lookup = Some(ImageLookup::permanent(now - Duration::days(30), "no id"));
        assert!(!b.is_enrichment_due(now));
    }

    #[test]
    fn test_blank_image_url_is_ignored() {
        let mut b = book("Dune", None);
        b.common.image_url = Some(" ".to_string());
        assert!(b.image_url().is_none());
    }
}
