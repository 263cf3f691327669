//! Strictly parsed route parameters.
//!
//! `Parameter<T>` deserializes from a single path or query segment and runs
//! `T`'s strict parser. Enum targets must name a *declared* member: a number
//! that fits the representation but names no member is rejected. Failures
//! surface as a 400 listing the accepted tokens.

use chrono::NaiveDate;
use serde::{de, Deserialize, Deserializer};
use std::fmt;

use crate::models::{Category, Condition, IdentifierType, StrictEnum};

/// Value type usable in a [`Parameter`]
pub trait ParamValue: Sized {
    /// Parse `raw`; the error message is returned to the caller as is
    fn parse_param(raw: &str) -> Result<Self, String>;
}

fn strict_enum<E: StrictEnum>(what: &str, raw: &str) -> Result<E, String> {
    E::parse_strict(raw).ok_or_else(|| {
        format!(
            "Invalid {} '{}'. Valid values are: {}",
            what,
            raw.trim(),
            E::valid_tokens()
        )
    })
}

impl ParamValue for Category {
    fn parse_param(raw: &str) -> Result<Self, String> {
        strict_enum("category", raw)
    }
}

impl ParamValue for Condition {
    fn parse_param(raw: &str) -> Result<Self, String> {
        strict_enum("condition", raw)
    }
}

impl ParamValue for IdentifierType {
    fn parse_param(raw: &str) -> Result<Self, String> {
        IdentifierType::try_parse(raw)
    }
}

impl ParamValue for bool {
    fn parse_param(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(format!("Invalid boolean '{}'. Valid values are: true, false", raw))
        }
    }
}

impl ParamValue for NaiveDate {
    fn parse_param(raw: &str) -> Result<Self, String> {
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| format!("Invalid date '{}'. Expected YYYY-MM-DD", raw.trim()))
    }
}

impl ParamValue for i64 {
    fn parse_param(raw: &str) -> Result<Self, String> {
        raw.trim()
            .parse()
            .map_err(|_| format!("Invalid number '{}'", raw.trim()))
    }
}

/// Typed route parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parameter<T>(pub T);

impl<T: ParamValue> Parameter<T> {
    pub fn try_parse(raw: &str) -> Result<Self, String> {
        T::parse_param(raw).map(Parameter)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<'de, T: ParamValue> Deserialize<'de> for Parameter<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor<T>(std::marker::PhantomData<T>);

        impl<'de, T: ParamValue> de::Visitor<'de> for Visitor<T> {
            type Value = Parameter<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a route parameter")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Parameter::try_parse(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(Visitor(std::marker::PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Shelf {
        Books = 1,
        Movies = 2,
    }

    impl StrictEnum for Shelf {
        const MEMBERS: &'static [Self] = &[Shelf::Books, Shelf::Movies];

        fn code(&self) -> &'static str {
            match self {
                Shelf::Books => "books",
                Shelf::Movies => "movies",
            }
        }

        fn value(&self) -> i32 {
            *self as i32
        }
    }

    impl ParamValue for Shelf {
        fn parse_param(raw: &str) -> Result<Self, String> {
            strict_enum("shelf", raw)
        }
    }

    #[test]
    fn test_undeclared_numeric_value_is_rejected() {
        assert_eq!(Parameter::<Shelf>::try_parse("2"), Ok(Parameter(Shelf::Movies)));
        let err = Parameter::<Shelf>::try_parse("3").unwrap_err();
        assert_eq!(err, "Invalid shelf '3'. Valid values are: books, movies");
    }

    #[test]
    fn test_enum_tokens_are_case_insensitive() {
        assert_eq!(Parameter::<Category>::try_parse("MOVIES").unwrap().into_inner(), Category::Movies);
        assert_eq!(Parameter::<Category>::try_parse("4").unwrap().into_inner(), Category::Music);
        assert!(Parameter::<Category>::try_parse("0").is_err());
        assert!(Parameter::<Condition>::try_parse("like new").is_ok());
    }

    #[test]
    fn test_identifier_type_lists_valid_types() {
        let err = Parameter::<IdentifierType>::try_parse("asin").unwrap_err();
        assert!(err.ends_with("isbn, lccn, oclc, olid, upc, ean"));
    }

    #[test]
    fn test_bool_and_date() {
        assert_eq!(Parameter::<bool>::try_parse("True"), Ok(Parameter(true)));
        assert!(Parameter::<bool>::try_parse("1").is_err());
        assert_eq!(
            Parameter::<NaiveDate>::try_parse("2024-02-29").unwrap().0,
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        assert!(Parameter::<NaiveDate>::try_parse("2023-02-29").is_err());
    }

    #[test]
    fn test_deserialize_from_json_string() {
        let p: Parameter<Category> = serde_json::from_str("\"books\"").unwrap();
        assert_eq!(p.0, Category::Books);
        let err = serde_json::from_str::<Parameter<Category>>("\"films\"").unwrap_err();
        assert!(err.to_string().contains("books, movies, games, music"));
    }
}
