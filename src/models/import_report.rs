//! Import report models returned by the tabular import endpoint.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::enums::Category;

/// A cell that could not be converted, or a row that was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MappingWarning {
    /// 1-based data row number (the header row is not counted)
    pub row: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

/// Report returned after importing a spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImportReport {
    pub category: Category,
    pub imported: usize,
    pub skipped: usize,
    /// Ids assigned by the store, in input row order
    pub ids: Vec<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<MappingWarning>,
    /// Headers that matched no field and were ignored
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmatched_columns: Vec<String>,
    /// True when the new entities were queued for cover enrichment
    pub enrichment_queued: bool,
}
