//! Row normalization
//!
//! Turns raw sheet rows into clean [`Row`]s:
//!
//! - all-empty rows and placeholder rows (only the first column filled) are dropped
//! - whole-number floats become integers
//! - spreadsheet serial dates become calendar dates or timestamps
//! - dates before 1970 are treated as corrupted date arithmetic and nulled, with a warning
//! - column names are lower-cased
//! - ISBN fields lose surrounding whitespace and a trailing `.0`

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::Serialize;
use std::fmt;

use super::sheet::{RawCell, TabularData};
use crate::models::{CellValue, Row};

/// Earliest year accepted for date cells
pub const MIN_VALID_YEAR: i32 = 1970;

/// Sheet row number of the first data row (the header occupies row 1)
const FIRST_DATA_ROW: usize = 2;

/// Seconds per day, for serial date conversion
const SECONDS_PER_DAY: f64 = 86_400.0;

/// Largest serial accepted (year 9999)
const MAX_SERIAL: f64 = 2_958_465.0;

/// Why a cell value was discarded
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum WarningKind {
    /// Date earlier than 1970, produced by broken date arithmetic in the workbook
    PreEpochDate { value: String },
    /// Spreadsheet error cell such as `#N/A`
    ErrorCell { value: String },
    /// Date cell that could not be converted to a calendar date
    InvalidDate { value: String },
}

/// A discarded value, naming where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeWarning {
    /// Sheet name
    pub sheet: String,
    /// 1-based sheet row number (header is row 1)
    pub row: usize,
    /// Normalized column name
    pub column: String,
    /// What was wrong with the value
    pub kind: WarningKind,
}

impl fmt::Display for NormalizeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} row {}, column '{}': ",
            self.sheet, self.row, self.column
        )?;
        match &self.kind {
            WarningKind::PreEpochDate { value } => write!(
                f,
                "date {} is before {} (corrupted date arithmetic), value discarded",
                value, MIN_VALID_YEAR
            ),
            WarningKind::ErrorCell { value } => {
                write!(f, "error cell {}, value discarded", value)
            }
            WarningKind::InvalidDate { value } => {
                write!(f, "unreadable date {}, value discarded", value)
            }
        }
    }
}

/// A normalized row and where it sits in the sheet
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    /// 1-based sheet row number (header is row 1)
    pub number: usize,
    pub row: Row,
}

impl SheetRow {
    pub fn new(number: usize, row: Row) -> Self {
        Self { number, row }
    }
}

/// Normalized rows of one sheet plus the warnings raised while producing them
#[derive(Debug, Clone, Default)]
pub struct NormalizedSheet {
    /// Sheet name
    pub sheet: String,
    /// Rows in source order
    pub rows: Vec<SheetRow>,
    /// Values discarded during normalization
    pub warnings: Vec<NormalizeWarning>,
    /// Source rows dropped as empty or placeholder rows
    pub skipped_rows: usize,
}

impl NormalizedSheet {
    /// Check if no rows survived normalization
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Normalize every row of a sheet
pub fn normalize(sheet_name: &str, data: &TabularData) -> NormalizedSheet {
    let columns: Vec<String> = data.columns.iter().map(|c| normalize_column_name(c)).collect();

    let mut result = NormalizedSheet {
        sheet: sheet_name.to_string(),
        ..Default::default()
    };

    for (index, cells) in data.rows.iter().enumerate() {
        if !is_data_row(cells) {
            result.skipped_rows += 1;
            continue;
        }

        let sheet_row = index + FIRST_DATA_ROW;
        let mut row = Row::new();

        for (column, cell) in columns.iter().zip(cells) {
            let value = match convert_cell(cell) {
                Ok(value) => value,
                Err(kind) => {
                    let warning = NormalizeWarning {
                        sheet: sheet_name.to_string(),
                        row: sheet_row,
                        column: column.clone(),
                        kind,
                    };
                    tracing::warn!("{}", warning);
                    result.warnings.push(warning);
                    CellValue::Null
                }
            };
            row.insert(column.clone(), value);
        }

        clean_isbn_fields(&mut row);
        result.rows.push(SheetRow::new(sheet_row, row));
    }

    tracing::debug!(
        "Normalized sheet '{}': {} rows kept, {} skipped, {} warnings",
        sheet_name,
        result.rows.len(),
        result.skipped_rows,
        result.warnings.len()
    );

    result
}

/// Lower-case and trim a header for case-insensitive lookup
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A row is data unless every cell after the first is empty
///
/// This covers fully empty rows as well as placeholder rows that only carry an
/// identity in the first column.
fn is_data_row(cells: &[RawCell]) -> bool {
    cells.iter().skip(1).any(|cell| !cell.is_null())
}

/// Convert one raw cell, or explain why its value must be discarded
pub fn convert_cell(cell: &RawCell) -> Result<CellValue, WarningKind> {
    match cell {
        RawCell::Empty => Ok(CellValue::Null),
        RawCell::String(s) if s.trim().is_empty() => Ok(CellValue::Null),
        RawCell::String(s) => Ok(CellValue::Text(s.clone())),
        RawCell::Int(i) => Ok(CellValue::Integer(*i)),
        RawCell::Float(f) => Ok(convert_float(*f)),
        RawCell::Bool(b) => Ok(CellValue::Bool(*b)),
        RawCell::DateTime(serial) => {
            let datetime = serial_to_datetime(*serial).ok_or_else(|| WarningKind::InvalidDate {
                value: serial.to_string(),
            })?;
            resolve_datetime(datetime)
        }
        RawCell::DateTimeIso(s) => match parse_iso(s) {
            Some(datetime) => resolve_datetime(datetime),
            None => Ok(CellValue::Text(s.clone())),
        },
        RawCell::Error(e) => Err(WarningKind::ErrorCell { value: e.clone() }),
    }
}

fn convert_float(value: f64) -> CellValue {
    if value.is_nan() {
        CellValue::Null
    } else if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        CellValue::Integer(value as i64)
    } else {
        CellValue::Float(value)
    }
}

/// Convert a spreadsheet serial day number (1900 date system) to a timestamp
///
/// Rounds to the nearest second to absorb floating point noise.
pub fn serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial.abs() > MAX_SERIAL {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let seconds = (serial * SECONDS_PER_DAY).round() as i64;
    base.checked_add_signed(TimeDelta::try_seconds(seconds)?)
}

fn parse_iso(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

/// Drop pre-1970 values and strip midnight times down to a date
fn resolve_datetime(datetime: NaiveDateTime) -> Result<CellValue, WarningKind> {
    use chrono::Datelike;

    if datetime.year() < MIN_VALID_YEAR {
        return Err(WarningKind::PreEpochDate {
            value: datetime.format("%Y-%m-%d").to_string(),
        });
    }
    if datetime.time() == NaiveTime::MIN {
        Ok(CellValue::Date(datetime.date()))
    } else {
        Ok(CellValue::DateTime(datetime))
    }
}

/// Check if a column holds ISBNs
pub fn is_isbn_column(column: &str) -> bool {
    column.contains("isbn")
}

/// Clean every ISBN-like field of a row
fn clean_isbn_fields(row: &mut Row) {
    let columns: Vec<String> = row
        .columns()
        .filter(|c| is_isbn_column(c))
        .map(str::to_string)
        .collect();

    for column in columns {
        if let Some(value) = row.get_mut(&column) {
            *value = clean_isbn(value);
        }
    }
}

/// Render an ISBN as text without whitespace or a float artifact
pub fn clean_isbn(value: &CellValue) -> CellValue {
    match value {
        CellValue::Integer(i) => CellValue::Text(i.to_string()),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            let cleaned = trimmed.strip_suffix(".0").unwrap_or(trimmed);
            if cleaned.is_empty() {
                CellValue::Null
            } else {
                CellValue::Text(cleaned.to_string())
            }
        }
        other => other.clone(),
    }
}
