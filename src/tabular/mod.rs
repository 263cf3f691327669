//! Tabular import: converting spreadsheet exports into catalog entities
//!
//! The pipeline is `reader` (bytes to header + rows), then `mapper`, which
//! binds headers to schema fields (`binder`, `schema`) and converts cells
//! (`converters`).

pub mod binder;
pub mod converters;
pub mod mapper;
pub mod reader;
pub mod schema;

pub use binder::HeaderBinder;
pub use converters::{CellValue, ConversionError, Converter, ConverterKind, ConverterRegistry};
pub use mapper::{MappingOutcome, RecordMapper};
pub use reader::{read_table, Table};
pub use schema::{FieldDescriptor, FieldSpec, Importable};
