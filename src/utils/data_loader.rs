//! Data loading utilities

use crate::error::{GenderError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// Default field separator of the ad-request dumps
pub const DEFAULT_DELIMITER: u8 = b';';

/// Loader for headed, delimiter-separated tables
///
/// Every column is read as text; typing happens in the table converters.
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Field separator
    delimiter: u8,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a loader that reads every column as text
    pub fn new() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
        }
    }

    /// Set the field separator
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Load a CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let start = Instant::now();

        let file = File::open(path).map_err(|e| {
            GenderError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let parse_opts = CsvParseOptions::default()
            .with_separator(self.delimiter);

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| GenderError::DataError(format!("{}: {}", path.display(), e)))?;

        debug!(
            path = %path.display(),
            rows = df.height(),
            cols = df.width(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded table"
        );

        Ok(df)
    }
}

/// Writer for delimiter-separated tables
pub struct DataSaver;

impl DataSaver {
    /// Save a frame to CSV with a header row
    pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>, delimiter: u8) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(delimiter)
            .finish(df)
            .map_err(|e| GenderError::DataError(format!("{}: {}", path.display(), e)))
    }
}

/// Shape summary of a table on disk
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub n_rows: usize,
    pub columns: Vec<(String, usize)>,
}

impl TableInfo {
    /// Describe a loaded frame: row count and per-column null counts
    pub fn from_frame(df: &DataFrame) -> Self {
        let columns = df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.null_count()))
            .collect();

        Self {
            n_rows: df.height(),
            columns,
        }
    }
}
