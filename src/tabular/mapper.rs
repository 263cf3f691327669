//! Record mapper: header row + data rows to typed entities.

use std::sync::Arc;

use super::binder::HeaderBinder;
use super::converters::{CellValue, ConverterRegistry, STANDARD_REGISTRY};
use super::schema::{FieldSpec, Importable};
use crate::config::{ImportConfig, MalformedCellPolicy};
use crate::models::{Book, Category, Entity, Game, MappingWarning, MediaEntity, Movie, Music};

/// Entities produced from one batch, in input row order
#[derive(Debug, Clone)]
pub struct MappingOutcome<T> {
    pub entities: Vec<T>,
    pub warnings: Vec<MappingWarning>,
    /// Rows that produced no entity
    pub skipped: usize,
    /// Headers that no field bound to
    pub unmatched_columns: Vec<String>,
}

impl<T> MappingOutcome<T> {
    fn map_entities<U>(self, f: impl FnMut(T) -> U) -> MappingOutcome<U> {
        MappingOutcome {
            entities: self.entities.into_iter().map(f).collect(),
            warnings: self.warnings,
            skipped: self.skipped,
            unmatched_columns: self.unmatched_columns,
        }
    }
}

/// Stateless mapper; safe to share between requests
#[derive(Clone)]
pub struct RecordMapper {
    registry: Arc<ConverterRegistry>,
    list_delimiter: char,
    policy: MalformedCellPolicy,
}

impl Default for RecordMapper {
    fn default() -> Self {
        Self::new(STANDARD_REGISTRY.clone(), &ImportConfig::default())
    }
}

impl RecordMapper {
    pub fn new(registry: Arc<ConverterRegistry>, config: &ImportConfig) -> Self {
        Self {
            registry,
            list_delimiter: config.list_delimiter,
            policy: config.malformed_cells,
        }
    }

    pub fn with_policy(mut self, policy: MalformedCellPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Map a batch for a category chosen at runtime
    pub fn map_category(
        &self,
        category: Category,
        headers: &[String],
        rows: &[Vec<String>],
    ) -> MappingOutcome<MediaEntity> {
        match category {
            Category::Books => self.map_all::<Book>(headers, rows).map_entities(Into::into),
            Category::Movies => self.map_all::<Movie>(headers, rows).map_entities(Into::into),
            Category::Games => self.map_all::<Game>(headers, rows).map_entities(Into::into),
            Category::Music => self.map_all::<Music>(headers, rows).map_entities(Into::into),
        }
    }

    /// Map every data row to a `T`.
    ///
    /// Fields with no matching column keep their default. A cell that fails
    /// conversion is reported as a warning and handled per the configured
    /// [`MalformedCellPolicy`]; it never aborts the batch.
    pub fn map_all<T: Importable>(&self, headers: &[String], rows: &[Vec<String>]) -> MappingOutcome<T> {
        let binder = HeaderBinder::new(headers);
        let bindings: Vec<(&FieldSpec<T>, usize)> = T::fields()
            .iter()
            .filter_map(|field| binder.resolve(field).map(|col| (field, col)))
            .collect();

        let unmatched_columns: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !bindings.iter().any(|(_, col)| col == idx))
            .map(|(_, h)| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        tracing::debug!(
            "Bound {} of {} fields for {} rows, unmatched columns: {:?}",
            bindings.len(),
            T::fields().len(),
            rows.len(),
            unmatched_columns
        );

        let mut outcome = MappingOutcome {
            entities: Vec::with_capacity(rows.len()),
            warnings: Vec::new(),
            skipped: 0,
            unmatched_columns,
        };

        for (idx, row) in rows.iter().enumerate() {
            match self.map_row(&bindings, idx + 1, row, &mut outcome.warnings) {
                Some(entity) => outcome.entities.push(entity),
                None => outcome.skipped += 1,
            }
        }

        tracing::info!(
            "Mapped {} rows: {} entities, {} skipped, {} warnings",
            rows.len(),
            outcome.entities.len(),
            outcome.skipped,
            outcome.warnings.len()
        );

        outcome
    }

    fn map_row<T: Importable>(
        &self,
        bindings: &[(&FieldSpec<T>, usize)],
        row_number: usize,
        row: &[String],
        warnings: &mut Vec<MappingWarning>,
    ) -> Option<T> {
        let mut entity = T::default();
        let mut malformed = false;

        for (field, col) in bindings {
            let Some(raw) = row.get(*col) else {
                continue;
            };

            let value = if field.list {
                Ok(CellValue::List(self.split_list(raw)))
            } else {
                self.registry.convert(field.kind, raw)
            };

            match value {
                Ok(value) => (field.assign)(&mut entity, value),
                Err(e) => {
                    tracing::debug!("Row {}: field {} left at default: {}", row_number, field.name, e);
                    malformed = true;
                    warnings.push(MappingWarning {
                        row: row_number,
                        field: Some(field.name.to_string()),
                        value: Some(raw.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }

        if malformed && self.policy == MalformedCellPolicy::SkipRow {
            warnings.push(MappingWarning {
                row: row_number,
                field: None,
                value: None,
                message: "Row skipped because of malformed cells".to_string(),
            });
            return None;
        }

        if entity.is_empty() {
            warnings.push(MappingWarning {
                row: row_number,
                field: None,
                value: None,
                message: "Row skipped: no title".to_string(),
            });
            return None;
        }

        Some(entity)
    }

    fn split_list(&self, raw: &str) -> Vec<String> {
        raw.split(self.list_delimiter)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}
