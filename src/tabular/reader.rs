//! Delimited text reader for uploaded spreadsheets.

use csv::{ByteRecord, ReaderBuilder};

use crate::error::{AppError, AppResult};

/// Header row plus data rows, cells as text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn decode(record: &ByteRecord) -> Vec<String> {
    record
        .iter()
        .map(|cell| String::from_utf8_lossy(cell).into_owned())
        .collect()
}

/// Parse a CSV (or other single-byte delimited) export.
///
/// Rows may be shorter or longer than the header. Blank lines are dropped.
/// Invalid UTF-8 is replaced rather than rejected.
pub fn read_table(data: &[u8], delimiter: char) -> AppResult<Table> {
    if !delimiter.is_ascii() {
        return Err(AppError::BadRequest(format!(
            "Delimiter '{}' must be a single ASCII character",
            delimiter
        )));
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let mut headers = decode(
        reader
            .byte_headers()
            .map_err(|e| AppError::BadRequest(format!("Unreadable header row: {}", e)))?,
    );
    if let Some(first) = headers.first_mut() {
        *first = first.trim_start_matches('\u{feff}').to_string();
    }
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::BadRequest("Upload has no header row".to_string()));
    }

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    loop {
        match reader.read_byte_record(&mut record) {
            Ok(true) => {
                let row = decode(&record);
                if row.iter().all(|cell| cell.trim().is_empty()) {
                    continue;
                }
                rows.push(row);
            }
            Ok(false) => break,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or_default();
                return Err(AppError::BadRequest(format!(
                    "Malformed CSV near line {}: {}",
                    line, e
                )));
            }
        }
    }

    tracing::debug!("Read table with {} columns and {} rows", headers.len(), rows.len());
    Ok(Table { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_headers_and_rows() {
        let data = "Title,Author\nDune,Herbert|Anderson\n\"Emma, a novel\",Austen\n";
        let table = read_table(data.as_bytes(), ',').unwrap();
        assert_eq!(table.headers, vec!["Title", "Author"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1][0], "Emma, a novel");
    }

    #[test]
    fn test_strips_bom_and_blank_lines() {
        let data = "\u{feff}Title;Pages\nDune;412\n;\n\nEmma;474\n";
        let table = read_table(data.as_bytes(), ';').unwrap();
        assert_eq!(table.headers[0], "Title");
        assert_eq!(table.rows, vec![vec!["Dune", "412"], vec!["Emma", "474"]]);
    }

    #[test]
    fn test_ragged_rows_are_kept() {
        let data = "Title,Author,Pages\nDune\nEmma,Austen,474,extra\n";
        let table = read_table(data.as_bytes(), ',').unwrap();
        assert_eq!(table.rows[0].len(), 1);
        assert_eq!(table.rows[1].len(), 4);
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        assert!(matches!(read_table(b"", ','), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_latin1_cells_do_not_fail() {
        let data = b"Title\nCaf\xe9\n";
        let table = read_table(data, ',').unwrap();
        assert!(table.rows[0][0].starts_with("Caf"));
    }
}
