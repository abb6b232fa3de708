//! Spreadsheet sheet reading
//!
//! Loads one named sheet of a workbook into [`TabularData`]. Read failures never
//! propagate: they are logged and produce an empty table, so the orchestrator treats
//! a missing sheet and an empty sheet the same way.

use calamine::{Data, Reader, open_workbook_auto};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::ImportError;

/// A spreadsheet cell before normalization
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    /// Blank cell
    Empty,
    /// Text cell
    String(String),
    /// Numeric cell (spreadsheets store most numbers as floating point)
    Float(f64),
    /// Integer cell
    Int(i64),
    /// Boolean cell
    Bool(bool),
    /// Date/time cell as a spreadsheet serial day number
    DateTime(f64),
    /// Date/time cell stored as an ISO 8601 string
    DateTimeIso(String),
    /// Error cell such as `#N/A` or `#DIV/0!`
    Error(String),
}

impl RawCell {
    /// Check if the cell holds no value
    ///
    /// Whitespace-only text counts as empty.
    pub fn is_null(&self) -> bool {
        match self {
            RawCell::Empty => true,
            RawCell::String(s) => s.trim().is_empty(),
            RawCell::Float(f) => f.is_nan(),
            _ => false,
        }
    }
}

impl From<&Data> for RawCell {
    fn from(value: &Data) -> Self {
        match value {
            Data::Empty => RawCell::Empty,
            Data::String(s) => RawCell::String(s.clone()),
            Data::Float(f) => RawCell::Float(*f),
            Data::Int(i) => RawCell::Int(*i),
            Data::Bool(b) => RawCell::Bool(*b),
            Data::DateTime(dt) => RawCell::DateTime(dt.as_f64()),
            Data::DateTimeIso(s) => RawCell::DateTimeIso(s.clone()),
            Data::DurationIso(s) => RawCell::String(s.clone()),
            Data::Error(e) => RawCell::Error(e.to_string()),
        }
    }
}

/// One sheet's contents: a header row plus data rows
///
/// Every data row has exactly `columns.len()` cells.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularData {
    /// Column names from the header row, as written in the sheet
    pub columns: Vec<String>,
    /// Data rows in sheet order
    pub rows: Vec<Vec<RawCell>>,
}

impl TabularData {
    /// Create an empty table
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from a header and rows, padding or truncating rows to the header width
    pub fn new(columns: Vec<String>, rows: Vec<Vec<RawCell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, RawCell::Empty);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// Check if the table has no data rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of data rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Source of sheet data for the pipeline
pub trait SheetSource {
    /// Read a sheet by name, surfacing the failure cause
    fn try_read(&mut self, sheet_name: &str) -> Result<TabularData, ImportError>;

    /// Read a sheet by name; returns an empty table on any failure
    fn read(&mut self, sheet_name: &str) -> TabularData {
        self.try_read(sheet_name).unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            TabularData::empty()
        })
    }
}

/// Workbook file on disk (`.xlsx`, `.xlsm`, `.xls`, `.xlsb`, `.ods`)
#[derive(Debug, Clone)]
pub struct WorkbookSource {
    path: PathBuf,
}

impl WorkbookSource {
    /// Create a source for the workbook at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Workbook path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SheetSource for WorkbookSource {
    fn try_read(&mut self, sheet_name: &str) -> Result<TabularData, ImportError> {
        try_read_sheet(&self.path, sheet_name)
    }
}

/// In-memory sheets keyed by sheet name
///
/// Used for dry runs over pre-built data and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    sheets: HashMap<String, TabularData>,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet
    pub fn with_sheet(mut self, name: impl Into<String>, data: TabularData) -> Self {
        self.sheets.insert(name.into(), data);
        self
    }
}

impl SheetSource for MemorySource {
    fn try_read(&mut self, sheet_name: &str) -> Result<TabularData, ImportError> {
        self.sheets
            .get(sheet_name)
            .cloned()
            .ok_or_else(|| ImportError::SheetRead {
                sheet: sheet_name.to_string(),
                message: "sheet not found".to_string(),
            })
    }
}

/// Read a sheet from a workbook file
///
/// Returns an empty table if the file or sheet cannot be read.
pub fn read_sheet(path: &Path, sheet_name: &str) -> TabularData {
    match try_read_sheet(path, sheet_name) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("{}", e);
            TabularData::empty()
        }
    }
}

/// Read a sheet from a workbook file, surfacing the failure cause
pub fn try_read_sheet(path: &Path, sheet_name: &str) -> Result<TabularData, ImportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| ImportError::WorkbookRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let range = workbook
        .worksheet_range(sheet_name)
        .map_err(|e| ImportError::SheetRead {
            sheet: sheet_name.to_string(),
            message: e.to_string(),
        })?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(TabularData::empty());
    };

    let columns = header
        .iter()
        .enumerate()
        .map(|(i, cell)| header_name(i, cell))
        .collect();

    let data = rows
        .map(|row| row.iter().map(RawCell::from).collect())
        .collect();

    Ok(TabularData::new(columns, data))
}

fn header_name(index: usize, cell: &Data) -> String {
    let name = match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => other.to_string(),
    };
    if name.is_empty() {
        format!("unnamed_{}", index)
    } else {
        name
    }
}
