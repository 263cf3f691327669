//! Static import schemas.
//!
//! Each entity variant declares its importable fields as a table of
//! [`FieldSpec`]s: declared name, optional header override, converter kind,
//! list flag and an assignment function. The mapper iterates these tables
//! generically.

use serde::Serialize;
use utoipa::ToSchema;

use super::converters::{CellValue, ConverterKind};
use crate::models::{Book, Category, Entity, Game, MediaEntity, Movie, Music};

/// Importable field of entity type `T`
pub struct FieldSpec<T> {
    /// Declared field name
    pub name: &'static str,
    /// Column header accepted instead of `name`
    pub header: Option<&'static str>,
    pub kind: ConverterKind,
    /// Multi-valued cell, split on the list delimiter
    pub list: bool,
    /// Designated lookup identifier of the variant
    pub lookup_identifier: bool,
    pub assign: fn(&mut T, CellValue),
}

impl<T> FieldSpec<T> {
    pub const fn new(name: &'static str, kind: ConverterKind, assign: fn(&mut T, CellValue)) -> Self {
        Self {
            name,
            header: None,
            kind,
            list: false,
            lookup_identifier: false,
            assign,
        }
    }

    pub const fn text(name: &'static str, assign: fn(&mut T, CellValue)) -> Self {
        Self::new(name, ConverterKind::Text, assign)
    }

    pub const fn list(name: &'static str, assign: fn(&mut T, CellValue)) -> Self {
        let mut spec = Self::new(name, ConverterKind::Text, assign);
        spec.list = true;
        spec
    }

    pub const fn header(mut self, header: &'static str) -> Self {
        self.header = Some(header);
        self
    }

    pub const fn identifier(mut self) -> Self {
        self.lookup_identifier = true;
        self
    }

    /// Header the binder looks for
    pub fn column_name(&self) -> &'static str {
        self.header.unwrap_or(self.name)
    }

    pub fn descriptor(&self) -> FieldDescriptor {
        FieldDescriptor {
            name: self.name,
            header: self.header,
            column: self.column_name(),
            kind: self.kind,
            list: self.list,
            lookup_identifier: self.lookup_identifier,
        }
    }
}

/// Serializable view of a [`FieldSpec`]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldDescriptor {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<&'static str>,
    pub column: &'static str,
    pub kind: ConverterKind,
    pub list: bool,
    pub lookup_identifier: bool,
}

/// Entity variant that can be produced by the record mapper
pub trait Importable: Entity + Default + Into<MediaEntity> + Send + 'static {
    fn fields() -> &'static [FieldSpec<Self>];
}

/// Import schema of a category
pub fn descriptors(category: Category) -> Vec<FieldDescriptor> {
    fn collect<T: Importable>() -> Vec<FieldDescriptor> {
        T::fields().iter().map(FieldSpec::descriptor).collect()
    }

    match category {
        Category::Books => collect::<Book>(),
        Category::Movies => collect::<Movie>(),
        Category::Games => collect::<Game>(),
        Category::Music => collect::<Music>(),
    }
}

static BOOK_FIELDS: &[FieldSpec<Book>] = &[
    FieldSpec::<Book>::text("Title", |e, v| e.common.title = v.into_text().unwrap_or_default()),
    FieldSpec::<Book>::list("Author", |e, v| e.authors = v.into_list()),
    FieldSpec::<Book>::text("ISBN", |e, v| e.isbn = v.into_text()).identifier(),
    FieldSpec::<Book>::text("Publisher", |e, v| e.publisher = v.into_text()),
    FieldSpec::<Book>::new("PublicationDate", ConverterKind::Date, |e, v| {
        e.publication_date = v.into_date()
    })
    .header("Publication Date"),
    FieldSpec::<Book>::new("PageCount", ConverterKind::Integer, |e, v| e.page_count = v.into_int())
        .header("Pages"),
    FieldSpec::<Book>::list("Genre", |e, v| e.genres = v.into_list()),
    FieldSpec::<Book>::text("Format", |e, v| e.common.format = v.into_text()),
    FieldSpec::<Book>::new("Condition", ConverterKind::Condition, |e, v| {
        e.common.condition = v.into_condition()
    }),
    FieldSpec::<Book>::new("Read", ConverterKind::Boolean, |e, v| {
        e.read = v.into_bool().unwrap_or_default()
    }),
    FieldSpec::<Book>::text("ImageUrl", |e, v| e.common.image_url = v.into_text()).header("Image URL"),
    FieldSpec::<Book>::text("Notes", |e, v| e.common.notes = v.into_text()),
];

static MOVIE_FIELDS: &[FieldSpec<Movie>] = &[
    FieldSpec::<Movie>::text("Title", |e, v| e.common.title = v.into_text().unwrap_or_default()),
    FieldSpec::<Movie>::list("Director", |e, v| e.directors = v.into_list()),
    FieldSpec::<Movie>::text("UPC", |e, v| e.upc = v.into_text()).identifier(),
    FieldSpec::<Movie>::new("Year", ConverterKind::Integer, |e, v| e.year = v.into_int()),
    FieldSpec::<Movie>::new("Runtime", ConverterKind::Duration, |e, v| e.runtime = v.into_int()),
    FieldSpec::<Movie>::list("Genre", |e, v| e.genres = v.into_list()),
    FieldSpec::<Movie>::text("Format", |e, v| e.common.format = v.into_text()),
    FieldSpec::<Movie>::new("Condition", ConverterKind::Condition, |e, v| {
        e.common.condition = v.into_condition()
    }),
    FieldSpec::<Movie>::new("Watched", ConverterKind::Boolean, |e, v| {
        e.watched = v.into_bool().unwrap_or_default()
    }),
    FieldSpec::<Movie>::text("ImageUrl", |e, v| e.common.image_url = v.into_text()).header("Image URL"),
    FieldSpec::<Movie>::text("Notes", |e, v| e.common.notes = v.into_text()),
];

static GAME_FIELDS: &[FieldSpec<Game>] = &[
    FieldSpec::<Game>::text("Title", |e, v| e.common.title = v.into_text().unwrap_or_default()),
    FieldSpec::<Game>::text("Platform", |e, v| e.platform = v.into_text()),
    FieldSpec::<Game>::list("Developer", |e, v| e.developers = v.into_list()),
    FieldSpec::<Game>::text("Publisher", |e, v| e.publisher = v.into_text()),
    FieldSpec::<Game>::text("UPC", |e, v| e.upc = v.into_text()).identifier(),
    FieldSpec::<Game>::new("Year", ConverterKind::Integer, |e, v| e.year = v.into_int()),
    FieldSpec::<Game>::list("Genre", |e, v| e.genres = v.into_list()),
    FieldSpec::<Game>::text("Format", |e, v| e.common.format = v.into_text()),
    FieldSpec::<Game>::new("Condition", ConverterKind::Condition, |e, v| {
        e.common.condition = v.into_condition()
    }),
    FieldSpec::<Game>::new("Completed", ConverterKind::Boolean, |e, v| {
        e.completed = v.into_bool().unwrap_or_default()
    }),
    FieldSpec::<Game>::text("ImageUrl", |e, v| e.common.image_url = v.into_text()).header("Image URL"),
    FieldSpec::<Game>::text("Notes", |e, v| e.common.notes = v.into_text()),
];

static MUSIC_FIELDS: &[FieldSpec<Music>] = &[
    FieldSpec::<Music>::text("Title", |e, v| e.common.title = v.into_text().unwrap_or_default()),
    FieldSpec::<Music>::list("Artist", |e, v| e.artists = v.into_list()),
    FieldSpec::<Music>::text("UPC", |e, v| e.upc = v.into_text()).identifier(),
    FieldSpec::<Music>::text("Label", |e, v| e.label = v.into_text()),
    FieldSpec::<Music>::new("Year", ConverterKind::Integer, |e, v| e.year = v.into_int()),
    FieldSpec::<Music>::new("Length", ConverterKind::Duration, |e, v| e.length = v.into_int()),
    FieldSpec::<Music>::new("Tracks", ConverterKind::Integer, |e, v| e.tracks = v.into_int()),
    FieldSpec::<Music>::list("Genre", |e, v| e.genres = v.into_list()),
    FieldSpec::<Music>::text("Format", |e, v| e.common.format = v.into_text()),
    FieldSpec::<Music>::new("Condition", ConverterKind::Condition, |e, v| {
        e.common.condition = v.into_condition()
    }),
    FieldSpec::<Music>::text("ImageUrl", |e, v| e.common.image_url = v.into_text()).header("Image URL"),
    FieldSpec::<Music>::text("Notes", |e, v| e.common.notes = v.into_text()),
];

impl Importable for Book {
    fn fields() -> &'static [FieldSpec<Self>] {
        BOOK_FIELDS
    }
}

impl Importable for Movie {
    fn fields() -> &'static [FieldSpec<Self>] {
        MOVIE_FIELDS
    }
}

impl Importable for Game {
    fn fields() -> &'static [FieldSpec<Self>] {
        GAME_FIELDS
    }
}

impl Importable for Music {
    fn fields() -> &'static [FieldSpec<Self>] {
        MUSIC_FIELDS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn check_schema<T: Importable>() {
        let fields = T::fields();
        let columns: HashSet<_> = fields.iter().map(|f| f.column_name().to_lowercase()).collect();
        assert_eq!(columns.len(), fields.len(), "duplicate column names");
        assert_eq!(fields.iter().filter(|f| f.lookup_identifier).count(), 1);
        assert!(fields.iter().any(|f| f.name == "Title"));
    }

    #[test]
    fn test_schemas_are_consistent() {
        check_schema::<Book>();
        check_schema::<Movie>();
        check_schema::<Game>();
        check_schema::<Music>();
    }

    #[test]
    fn test_descriptors_expose_overrides() {
        let fields = descriptors(Category::Books);
        let date = fields.iter().find(|f| f.name == "PublicationDate").unwrap();
        assert_eq!(date.column, "Publication Date");
        assert_eq!(date.kind, ConverterKind::Date);

        let isbn = fields.iter().find(|f| f.lookup_identifier).unwrap();
        assert_eq!(isbn.name, "ISBN");
    }

    #[test]
    fn test_assign_sets_field() {
        let spec = Book::fields().iter().find(|f| f.name == "PageCount").unwrap();
        let mut book = Book::default();
        (spec.assign)(&mut book, CellValue::Int(412));
        assert_eq!(book.page_count, Some(412));
    }
}
