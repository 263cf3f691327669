//! Header-to-field binding.
//!
//! A field binds to the column whose header equals its header override, or its
//! declared name when it has no override. Comparison ignores case and
//! surrounding whitespace only; "PublicationDate" never matches
//! "Publication Date".

use unicode_normalization::UnicodeNormalization;

use super::schema::FieldSpec;

fn normalize_header(header: &str) -> String {
    header
        .trim_start_matches('\u{feff}')
        .trim()
        .nfc()
        .collect::<String>()
        .to_lowercase()
}

/// Header row prepared for repeated lookups
#[derive(Debug, Clone)]
pub struct HeaderBinder {
    headers: Vec<String>,
}

impl HeaderBinder {
    pub fn new<S: AsRef<str>>(headers: &[S]) -> Self {
        Self {
            headers: headers.iter().map(|h| normalize_header(h.as_ref())).collect(),
        }
    }

    /// Column index of the first header equal to `name`
    pub fn resolve_name(&self, name: &str) -> Option<usize> {
        let wanted = normalize_header(name);
        self.headers.iter().position(|h| *h == wanted)
    }

    /// Column bound to `field`, `None` when the sheet has no such column
    pub fn resolve<T>(&self, field: &FieldSpec<T>) -> Option<usize> {
        self.resolve_name(field.column_name())
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}

/// One-shot form of [`HeaderBinder::resolve`]
pub fn resolve_column<T, S: AsRef<str>>(field: &FieldSpec<T>, headers: &[S]) -> Option<usize> {
    HeaderBinder::new(headers).resolve(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Book;
    use crate::tabular::schema::Importable;

    fn book_field(name: &str) -> &'static FieldSpec<Book> {
        Book::fields()
            .iter()
            .find(|f| f.name == name)
            .unwrap()
    }

    #[test]
    fn test_override_matches_regardless_of_case() {
        let field = book_field("PublicationDate");
        assert_eq!(resolve_column(field, &["Title", "Publication Date"]), Some(1));
        assert_eq!(resolve_column(field, &["Title", "PUBLICATION DATE"]), Some(1));
        assert_eq!(resolve_column(field, &["publication date "]), Some(0));
    }

    #[test]
    fn test_override_does_not_match_declared_name() {
        let field = book_field("PublicationDate");
        assert_eq!(resolve_column(field, &["Title", "PublicationDate"]), None);
    }

    #[test]
    fn test_declared_name_without_override() {
        let field = book_field("Title");
        assert_eq!(resolve_column(field, &["Author", "TITLE"]), Some(1));
        assert_eq!(resolve_column(field, &["Name"]), None);
    }

    #[test]
    fn test_first_matching_column_wins() {
        let binder = HeaderBinder::new(&["Title", "title"]);
        assert_eq!(binder.resolve_name("Title"), Some(0));
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let binder = HeaderBinder::new(&["\u{feff}Title", "Author"]);
        assert_eq!(binder.resolve_name("title"), Some(0));
        assert_eq!(binder.len(), 2);
    }
}
