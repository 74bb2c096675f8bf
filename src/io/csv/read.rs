//! CSV reading operations.

use std::{io::Cursor, path::Path, sync::Arc};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerReader, prelude::{CsvReadOptions, DataType, Field, Schema}};

const SEPARATORS: [u8; 3] = [b',', b';', b'\t'];

/// Reads a CSV file from `path` into a Polars DataFrame, sniffing the separator.
/// Columns named in `string_columns` are read as strings whatever they contain.
pub(crate) fn read_csv(path: &Path, string_columns: &[&str]) -> Result<DataFrame> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("[io::csv::read] Failed to open CSV file: {}", path.display()))?;
    read_csv_bytes(&bytes, string_columns)
        .with_context(|| format!("[io::csv::read] Failed to read CSV from {:?}", path))
}

/// Reads CSV bytes into a Polars DataFrame, sniffing the separator.
pub(crate) fn read_csv_bytes(bytes: &[u8], string_columns: &[&str]) -> Result<DataFrame> {
    let separator = sniff_separator(bytes);
    let header = header_columns(bytes, separator);

    // Only overwrite columns the file actually has.
    let schema = Arc::new(Schema::from_iter(
        string_columns.iter()
            .filter(|c| header.iter().any(|h| h == *c))
            .map(|c| Field::new((*c).into(), DataType::String)),
    ));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .with_schema_overwrite(Some(schema))
        .map_parse_options(|po| po.with_separator(separator))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .context("[io::csv::read] Failed to parse CSV")
}

fn first_line(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == b'\n').unwrap_or(bytes.len());
    let line = &bytes[..end];
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Pick the separator that occurs most often (outside quotes) in the header line.
pub(crate) fn sniff_separator(bytes: &[u8]) -> u8 {
    let mut counts = [0usize; SEPARATORS.len()];
    let mut quoted = false;
    for &b in first_line(bytes) {
        if b == b'"' {
            quoted = !quoted;
        } else if !quoted {
            if let Some(i) = SEPARATORS.iter().position(|&s| s == b) {
                counts[i] += 1;
            }
        }
    }
    // ties resolve to the earlier (more common) separator
    let mut best = 0;
    for i in 1..SEPARATORS.len() {
        if counts[i] > counts[best] {
            best = i;
        }
    }
    SEPARATORS[best]
}

fn header_columns(bytes: &[u8], separator: u8) -> Vec<String> {
    let line = String::from_utf8_lossy(first_line(bytes));
    let line = line.trim_start_matches('\u{feff}');
    line.split(separator as char)
        .map(|c| c.trim().trim_matches('"').to_string())
        .collect()
}

/// Parse a number that may carry locale formatting, e.g. `"4 733,9"` or `"1.234,5"`.
///
/// Spaces (including no-break spaces) are thousands separators. A comma is the
/// decimal separator, in which case any `.` is a thousands separator; without a
/// comma a single `.` is the decimal point.
pub(crate) fn parse_locale_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars()
        .filter(|c| !matches!(c, '\u{00A0}' | '\u{202F}' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let normalized = if cleaned.contains(',') {
        cleaned.replace('.', "").replace(',', ".")
    } else {
        cleaned
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_separators() {
        assert_eq!(sniff_separator(b"year,geo,price\n2000,AT,1"), b',');
        assert_eq!(sniff_separator(b"year;geo;price\r\n2000;AT;1,5"), b';');
        assert_eq!(sniff_separator(b"year\tgeo\n"), b'\t');
        assert_eq!(sniff_separator(b"\"a;b\",c\n"), b',');
        assert_eq!(sniff_separator(b"single\n"), b',');
    }

    #[test]
    fn locale_numbers() {
        assert_eq!(parse_locale_number("4 733,9"), Some(4733.9));
        assert_eq!(parse_locale_number("4\u{a0}733,9"), Some(4733.9));
        assert_eq!(parse_locale_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_locale_number("4733.9"), Some(4733.9));
        assert_eq!(parse_locale_number("250"), Some(250.0));
        assert_eq!(parse_locale_number(":"), None);
        assert_eq!(parse_locale_number("  "), None);
    }

    #[test]
    fn semicolon_file_with_forced_string_key() {
        let csv = b"year;geo;price_eur_tonne\n2000;AT;4 733,9\n2001;NO;120,5\n";
        let df = read_csv_bytes(csv, &["geo", "missing_column"]).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.get_column_names().len(), 3);
        assert_eq!(df.column("geo").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("price_eur_tonne").unwrap().dtype(), &DataType::String);
    }
}
