//! Cell value converters.
//!
//! A converter turns one raw spreadsheet cell into a typed [`CellValue`]. The
//! [`ConverterRegistry`] maps a [`ConverterKind`] to its converter; kinds with
//! no registered converter pass the raw string through unchanged.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;

use crate::models::enums::{Condition, StrictEnum};

/// Logical conversion applied to a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConverterKind {
    Text,
    Boolean,
    /// "H:MM" or bare minutes, stored as total minutes
    Duration,
    Integer,
    Date,
    Condition,
}

/// Typed value produced by a converter
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// Blank input for a nullable kind
    Empty,
    Text(String),
    Bool(bool),
    Int(i32),
    Date(NaiveDate),
    Condition(Condition),
    List(Vec<String>),
}

impl CellValue {
    /// Trimmed text, `None` when blank or not text
    pub fn into_text(self) -> Option<String> {
        match self {
            CellValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            _ => None,
        }
    }

    pub fn into_bool(self) -> Option<bool> {
        match self {
            CellValue::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn into_int(self) -> Option<i32> {
        match self {
            CellValue::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn into_date(self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn into_condition(self) -> Option<Condition> {
        match self {
            CellValue::Condition(c) => Some(c),
            _ => None,
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            CellValue::List(items) => items,
            CellValue::Text(s) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }
}

/// Failure to convert a single cell
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert '{value}' to {kind:?}: {reason}")]
pub struct ConversionError {
    pub kind: ConverterKind,
    pub value: String,
    pub reason: String,
}

impl ConversionError {
    fn new(kind: ConverterKind, value: &str, reason: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Stateless string-to-value conversion
pub trait Converter: Send + Sync {
    fn convert(&self, raw: &str) -> Result<CellValue, ConversionError>;
}

/// "true"/"false" in any case, otherwise only "1" is true. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanConverter;

impl Converter for BooleanConverter {
    fn convert(&self, raw: &str) -> Result<CellValue, ConversionError> {
        let raw = raw.trim();
        let value = if raw.eq_ignore_ascii_case("true") {
            true
        } else if raw.eq_ignore_ascii_case("false") {
            false
        } else {
            raw == "1"
        };
        Ok(CellValue::Bool(value))
    }
}

/// "H:MM" or a bare number of minutes
#[derive(Debug, Default, Clone, Copy)]
pub struct DurationConverter;

impl DurationConverter {
    fn parse_part(raw: &str, part: &str) -> Result<i32, ConversionError> {
        part.trim()
            .parse::<u32>()
            .ok()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| {
                ConversionError::new(ConverterKind::Duration, raw, format!("'{}' is not a number", part.trim()))
            })
    }
}

impl Converter for DurationConverter {
    fn convert(&self, raw: &str) -> Result<CellValue, ConversionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CellValue::Empty);
        }

        let minutes = match trimmed.split_once(':') {
            Some((hours, minutes)) => {
                if minutes.contains(':') {
                    return Err(ConversionError::new(
                        ConverterKind::Duration,
                        raw,
                        "expected H:MM",
                    ));
                }
                let hours = Self::parse_part(raw, hours)?;
                let minutes = Self::parse_part(raw, minutes)?;
                hours
                    .checked_mul(60)
                    .and_then(|h| h.checked_add(minutes))
                    .ok_or_else(|| ConversionError::new(ConverterKind::Duration, raw, "duration too large"))?
            }
            None => Self::parse_part(raw, trimmed)?,
        };

        Ok(CellValue::Int(minutes))
    }
}

/// Nullable integer, locale-invariant (no grouping separators)
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegerConverter;

impl Converter for IntegerConverter {
    fn convert(&self, raw: &str) -> Result<CellValue, ConversionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CellValue::Empty);
        }
        trimmed
            .parse::<i32>()
            .map(CellValue::Int)
            .map_err(|e| ConversionError::new(ConverterKind::Integer, raw, e.to_string()))
    }
}

/// Calendar date in one of a few unambiguous spreadsheet layouts
#[derive(Debug, Clone)]
pub struct DateConverter {
    formats: Vec<&'static str>,
}

impl Default for DateConverter {
    fn default() -> Self {
        Self {
            formats: vec!["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"],
        }
    }
}

impl Converter for DateConverter {
    fn convert(&self, raw: &str) -> Result<CellValue, ConversionError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(CellValue::Empty);
        }
        self.formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
            .map(CellValue::Date)
            .ok_or_else(|| {
                ConversionError::new(
                    ConverterKind::Date,
                    raw,
                    format!("expected one of {}", self.formats.join(", ")),
                )
            })
    }
}

/// Copy condition, a declared [`Condition`] token or value
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionConverter;

impl Converter for ConditionConverter {
    fn convert(&self, raw: &str) -> Result<CellValue, ConversionError> {
        if raw.trim().is_empty() {
            return Ok(CellValue::Empty);
        }
        Condition::parse_strict(raw)
            .map(CellValue::Condition)
            .ok_or_else(|| {
                ConversionError::new(
                    ConverterKind::Condition,
                    raw,
                    format!("valid values are: {}", Condition::valid_tokens()),
                )
            })
    }
}

/// Converters keyed by kind. Read-only once built, shared across workers.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: HashMap<ConverterKind, Arc<dyn Converter>>,
}

impl ConverterRegistry {
    /// Registry with no converters: every kind passes text through
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in converters
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry
            .register(ConverterKind::Boolean, BooleanConverter)
            .register(ConverterKind::Duration, DurationConverter)
            .register(ConverterKind::Integer, IntegerConverter)
            .register(ConverterKind::Date, DateConverter::default())
            .register(ConverterKind::Condition, ConditionConverter);
        registry
    }

    /// Add or replace the converter for `kind`
    pub fn register(&mut self, kind: ConverterKind, converter: impl Converter + 'static) -> &mut Self {
        self.converters.insert(kind, Arc::new(converter));
        self
    }

    pub fn contains(&self, kind: ConverterKind) -> bool {
        self.converters.contains_key(&kind)
    }

    pub fn convert(&self, kind: ConverterKind, raw: &str) -> Result<CellValue, ConversionError> {
        match self.converters.get(&kind) {
            Some(converter) => converter.convert(raw),
            None => Ok(CellValue::Text(raw.to_string())),
        }
    }
}

/// Shared registry with the built-in converters
pub static STANDARD_REGISTRY: Lazy<Arc<ConverterRegistry>> =
    Lazy::new(|| Arc::new(ConverterRegistry::standard()));
