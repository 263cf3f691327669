//! Shared domain enums

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ---------------------------------------------------------------------------
// Strict enum parsing
// ---------------------------------------------------------------------------

/// Enum with a closed set of declared members.
///
/// Parsing accepts a member token (case-insensitive) or the numeric value of a
/// *declared* member. A number that fits the representation but names no member
/// is rejected.
pub trait StrictEnum: Copy + Sized + 'static {
    /// Every declared member, in declaration order
    const MEMBERS: &'static [Self];

    /// Canonical lowercase token
    fn code(&self) -> &'static str;

    /// Declared numeric value
    fn value(&self) -> i32;

    /// Alternative spellings accepted on input
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn from_value(value: i64) -> Option<Self> {
        Self::MEMBERS
            .iter()
            .copied()
            .find(|m| i64::from(m.value()) == value)
    }

    fn parse_strict(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(number) = raw.parse::<i64>() {
            return Self::from_value(number);
        }
        Self::MEMBERS.iter().copied().find(|m| {
            m.code().eq_ignore_ascii_case(raw)
                || m.aliases().iter().any(|a| a.eq_ignore_ascii_case(raw))
        })
    }

    /// Comma separated list of canonical tokens, for error messages
    fn valid_tokens() -> String {
        Self::MEMBERS
            .iter()
            .map(|m| m.code())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Media category of a catalog entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
#[repr(i16)]
pub enum Category {
    Books = 1,
    Movies = 2,
    Games = 3,
    Music = 4,
}

impl StrictEnum for Category {
    const MEMBERS: &'static [Self] = &[
        Category::Books,
        Category::Movies,
        Category::Games,
        Category::Music,
    ];

    fn code(&self) -> &'static str {
        match self {
            Category::Books => "books",
            Category::Movies => "movies",
            Category::Games => "games",
            Category::Music => "music",
        }
    }

    fn value(&self) -> i32 {
        *self as i32
    }
}

impl Category {
    /// Identifier type used to search covers for this category
    pub fn lookup_identifier_type(&self) -> IdentifierType {
        match self {
            Category::Books => IdentifierType::Isbn,
            Category::Movies | Category::Games | Category::Music => IdentifierType::Upc,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Physical condition of a copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i16)]
pub enum Condition {
    New = 1,
    LikeNew = 2,
    Good = 3,
    Fair = 4,
    Poor = 5,
}

impl StrictEnum for Condition {
    const MEMBERS: &'static [Self] = &[
        Condition::New,
        Condition::LikeNew,
        Condition::Good,
        Condition::Fair,
        Condition::Poor,
    ];

    fn code(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::LikeNew => "like_new",
            Condition::Good => "good",
            Condition::Fair => "fair",
            Condition::Poor => "poor",
        }
    }

    fn value(&self) -> i32 {
        *self as i32
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            Condition::LikeNew => &["like new", "like-new", "likenew"],
            _ => &[],
        }
    }
}

// ---------------------------------------------------------------------------
// IdentifierType
// ---------------------------------------------------------------------------

/// External identifier kinds understood by the lookup services
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    Isbn,
    Lccn,
    Oclc,
    Olid,
    Upc,
    Ean,
}

static ISBN10_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{9}[\dX]$").unwrap());
static ISBN13_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^97[89]\d{10}$").unwrap());
static LCCN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{0,3}\d{8,10}$").unwrap());
static OCLC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,10}$").unwrap());
static OLID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^OL\d+[MWA]$").unwrap());
static UPC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{12}$").unwrap());
static EAN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{13}$").unwrap());

impl IdentifierType {
    pub const ALL: [IdentifierType; 6] = [
        IdentifierType::Isbn,
        IdentifierType::Lccn,
        IdentifierType::Oclc,
        IdentifierType::Olid,
        IdentifierType::Upc,
        IdentifierType::Ean,
    ];

    /// Canonical short code
    pub fn code(&self) -> &'static str {
        match self {
            IdentifierType::Isbn => "isbn",
            IdentifierType::Lccn => "lccn",
            IdentifierType::Oclc => "oclc",
            IdentifierType::Olid => "olid",
            IdentifierType::Upc => "upc",
            IdentifierType::Ean => "ean",
        }
    }

    pub fn valid_types() -> String {
        Self::ALL
            .iter()
            .map(|t| t.code())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Resolve a type token such as `"ISBN"`.
    ///
    /// The error message is returned to API callers as is.
    pub fn try_parse(token: &str) -> Result<Self, String> {
        let token = token.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.code().eq_ignore_ascii_case(token))
            .ok_or_else(|| {
                format!(
                    "Invalid identifier type '{}'. Valid types are: {}",
                    token,
                    Self::valid_types()
                )
            })
    }

    /// Canonical form of an identifier value of this type
    pub fn normalize(&self, value: &str) -> String {
        match self {
            IdentifierType::Isbn => normalize_isbn(value),
            IdentifierType::Olid => value.trim().to_ascii_uppercase(),
            IdentifierType::Lccn => value
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect::<String>()
                .to_ascii_lowercase(),
            IdentifierType::Oclc => {
                let value = value.trim();
                let value = value
                    .strip_prefix("(OCoLC)")
                    .or_else(|| value.strip_prefix("ocm"))
                    .or_else(|| value.strip_prefix("ocn"))
                    .unwrap_or(value);
                value.trim().to_string()
            }
            IdentifierType::Upc | IdentifierType::Ean => value
                .chars()
                .filter(|c| c.is_ascii_digit())
                .collect(),
        }
    }

    /// Whether a normalized value looks like an identifier of this type
    pub fn is_valid(&self, value: &str) -> bool {
        let value = self.normalize(value);
        match self {
            IdentifierType::Isbn => ISBN10_RE.is_match(&value) || ISBN13_RE.is_match(&value),
            IdentifierType::Lccn => LCCN_RE.is_match(&value),
            IdentifierType::Oclc => OCLC_RE.is_match(&value),
            IdentifierType::Olid => OLID_RE.is_match(&value),
            IdentifierType::Upc => UPC_RE.is_match(&value),
            IdentifierType::Ean => EAN_RE.is_match(&value),
        }
    }

    /// Guess the type of a raw identifier string
    pub fn classify(value: &str) -> Option<Self> {
        [
            IdentifierType::Olid,
            IdentifierType::Isbn,
            IdentifierType::Ean,
            IdentifierType::Upc,
            IdentifierType::Lccn,
            IdentifierType::Oclc,
        ]
        .into_iter()
        .find(|t| t.is_valid(value))
    }
}

impl std::fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Strip separators from an ISBN and upper-case the check digit
pub fn normalize_isbn(isbn: &str) -> String {
    isbn.chars()
        .filter(|c| c.is_ascii_digit() || *c == 'X' || *c == 'x')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse_names_and_values() {
        assert_eq!(Category::parse_strict("Books"), Some(Category::Books));
        assert_eq!(Category::parse_strict("MOVIES"), Some(Category::Movies));
        assert_eq!(Category::parse_strict("games"), Some(Category::Games));
        assert_eq!(Category::parse_strict("2"), Some(Category::Movies));
    }

    #[test]
    fn test_category_accepts_only_listed_tokens() {
        for singular in ["book", "movie", "game"] {
            assert_eq!(Category::parse_strict(singular), None);
        }
        assert_eq!(Category::valid_tokens(), "books, movies, games, music");
    }

    #[test]
    fn test_category_rejects_undeclared_value() {
        assert_eq!(Category::parse_strict("0"), None);
        assert_eq!(Category::parse_strict("5"), None);
        assert_eq!(Category::parse_strict("-1"), None);
        assert_eq!(Category::parse_strict(""), None);
        assert_eq!(Category::parse_strict("comics"), None);
    }

    #[test]
    fn test_condition_aliases() {
        assert_eq!(Condition::parse_strict("Like New"), Some(Condition::LikeNew));
        assert_eq!(Condition::parse_strict("like_new"), Some(Condition::LikeNew));
        assert_eq!(Condition::parse_strict("5"), Some(Condition::Poor));
        assert_eq!(Condition::parse_strict("6"), None);
    }

    #[test]
    fn test_identifier_type_parse_is_case_insensitive() {
        assert_eq!(IdentifierType::try_parse("isbn"), Ok(IdentifierType::Isbn));
        assert_eq!(IdentifierType::try_parse("ISBN"), Ok(IdentifierType::Isbn));
        assert_eq!(IdentifierType::try_parse("Olid"), Ok(IdentifierType::Olid));
    }

    #[test]
    fn test_identifier_type_unknown_lists_valid_types() {
        let err = IdentifierType::try_parse("asin").unwrap_err();
        assert!(err.contains("asin"));
        assert!(err.ends_with("Valid types are: isbn, lccn, oclc, olid, upc, ean"));
    }

    #[test]
    fn test_identifier_type_does_not_accept_numbers() {
        assert!(IdentifierType::try_parse("1").is_err());
    }

    #[test]
    fn test_normalize_isbn() {
        assert_eq!(normalize_isbn("978-2-07-036822-8"), "9782070368228");
        assert_eq!(normalize_isbn("0-8044-2957-x"), "080442957X");
    }

    #[test]
    fn test_validation() {
        assert!(IdentifierType::Isbn.is_valid("978-0-441-17271-9"));
        assert!(IdentifierType::Isbn.is_valid("0441172717"));
        assert!(!IdentifierType::Isbn.is_valid("12345"));
        assert!(IdentifierType::Upc.is_valid("0 12345 67890 5"));
        assert!(IdentifierType::Olid.is_valid("ol7353617m"));
        assert!(IdentifierType::Oclc.is_valid("(OCoLC)123456"));
        assert!(IdentifierType::Lccn.is_valid("n78-890351"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(IdentifierType::classify("9780441172719"), Some(IdentifierType::Isbn));
        assert_eq!(IdentifierType::classify("5012345678900"), Some(IdentifierType::Ean));
        assert_eq!(IdentifierType::classify("012345678905"), Some(IdentifierType::Upc));
        assert_eq!(IdentifierType::classify("OL7353617M"), Some(IdentifierType::Olid));
        assert_eq!(IdentifierType::classify("not an id"), None);
    }
}
