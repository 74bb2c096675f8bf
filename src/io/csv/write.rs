//! CSV writing operations.

use std::{fs::File, path::Path};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::SerWriter, prelude::CsvWriter};

use crate::common::ensure_parent_exists;

/// Write a DataFrame to a UTF-8 CSV file with a header row. Nulls become empty cells.
pub(crate) fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent_exists(path)?;
    let file = File::create(path)
        .with_context(|| format!("[io::csv::write] Failed to create CSV file: {}", path.display()))?;
    CsvWriter::new(file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("[io::csv::write] Failed to write CSV to {:?}", path))
}
