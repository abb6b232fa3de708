//! Import functionality
//!
//! Turns workbook sheets into rows of the library tables:
//! - [`sheet`]: reads one sheet into raw tabular data
//! - [`normalize`]: coerces raw cells into clean, typed rows
//! - [`mapping`]: static sheet to table rules
//! - [`populate`]: inserts rows, one transaction per row

use std::path::PathBuf;

pub mod mapping;
pub mod normalize;
pub mod populate;
pub mod sheet;

pub use mapping::{SHEET_SPECS, SheetSpec, import_order};
pub use normalize::{NormalizeWarning, NormalizedSheet, SheetRow, WarningKind, normalize};
pub use populate::{PopulateReport, RowOutcome, RowStatus, populate};
pub use sheet::{MemorySource, RawCell, SheetSource, TabularData, WorkbookSource, read_sheet};
pub use crate::models::{CellValue, Row};

/// Error during import
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, serde::Serialize)]
pub enum ImportError {
    /// Sheet name has no table mapping
    #[error("No table mapping for sheet '{0}'")]
    UnmappedSheet(String),

    /// Required column absent or null
    #[error("Row {row} for {table} is missing required field '{field}'")]
    MissingRequiredField {
        table: String,
        field: String,
        /// 1-based sheet row number (header is row 1)
        row: usize,
    },

    /// Workbook could not be opened
    #[error("Failed to open workbook {}: {message}", .path.display())]
    WorkbookRead { path: PathBuf, message: String },

    /// Sheet missing or unreadable
    #[error("Failed to read sheet '{sheet}': {message}")]
    SheetRead { sheet: String, message: String },

    /// Console output could not be written
    #[error("Failed to write output: {0}")]
    Output(String),
}
