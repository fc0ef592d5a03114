//! I/O error types for geval-io.

use std::path::PathBuf;

use geval_rf::RfError;

/// Errors from reading tables, building datasets, and writing rankings.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when the input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the table file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the table contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the table file.
        path: PathBuf,
    },

    /// Returned when every column is the label or a metadata column.
    #[error("no feature columns in {path}")]
    NoFeatureColumns {
        /// Path to the table file.
        path: PathBuf,
    },

    /// Returned when a named column is absent from the header.
    #[error("column \"{column}\" not found in header of {path}")]
    MissingColumn {
        /// Path to the table file.
        path: PathBuf,
        /// The requested column name.
        column: String,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the table file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when a numeric cell is NaN, Inf, or otherwise not a finite float.
    #[error("non-finite value in {path}: row {row_index}, column \"{column}\", raw value \"{raw}\"")]
    NonFiniteValue {
        /// Path to the table file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Header name of the offending column.
        column: String,
        /// The raw string value that failed to parse.
        raw: String,
    },

    /// Returned when the parsed table is rejected by the dataset or ranking constructors.
    #[error("invalid table contents")]
    Dataset {
        /// The underlying engine error.
        #[from]
        source: RfError,
    },

    /// Returned when an output file cannot be created.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a record cannot be written to an output table.
    #[error("cannot write record to {path}")]
    WriteRecord {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },
}
