//! Table population
//!
//! Inserts normalized rows into the table a sheet maps to. Every row is its own
//! transaction: a failing row is rolled back and reported, and the next row
//! proceeds. The console contract (`[INSERTED into ...]`, `[ERROR] ...`,
//! `[SKIPPED] ...`) is written to the caller's writer.

use serde::Serialize;
use std::io::Write;

use super::ImportError;
use super::mapping::SheetSpec;
use super::normalize::SheetRow;
use crate::models::{CellValue, Row};
use crate::database::{Connector, DatabaseBackend, InsertStatement};

/// What happened to one row
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "cause", rename_all = "snake_case")]
pub enum RowStatus {
    /// Committed
    Inserted,
    /// Failed validation; no insert attempted
    Rejected(ImportError),
    /// Insert attempted and rolled back
    Failed(String),
}

/// Outcome of one row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowOutcome {
    /// 1-based sheet row number
    pub row: usize,
    pub status: RowStatus,
}

/// Result of populating one table
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopulateReport {
    /// Sheet name
    pub sheet: String,
    /// Physical table name
    pub table: String,
    /// False when the sheet was skipped because no session could be opened
    pub connected: bool,
    /// Why the session could not be opened
    pub connect_error: Option<String>,
    /// Rows committed
    pub inserted: usize,
    /// Rows rejected before insert
    pub rejected: usize,
    /// Rows whose insert failed
    pub failed: usize,
    /// Per-row outcomes in sheet order
    pub outcomes: Vec<RowOutcome>,
}

impl PopulateReport {
    fn new(spec: &SheetSpec) -> Self {
        Self {
            sheet: spec.sheet.to_string(),
            table: spec.table.to_string(),
            ..Default::default()
        }
    }

    /// Rows that did not make it into the table
    pub fn errors(&self) -> usize {
        self.rejected + self.failed
    }

    fn record(&mut self, row: usize, status: RowStatus) {
        match status {
            RowStatus::Inserted => self.inserted += 1,
            RowStatus::Rejected(_) => self.rejected += 1,
            RowStatus::Failed(_) => self.failed += 1,
        }
        self.outcomes.push(RowOutcome { row, status });
    }
}

/// Apply a sheet's renames, stripped columns and required-field checks to a row
///
/// # Arguments
/// * `spec` - Sheet rules
/// * `row` - Normalized row
/// * `position` - Sheet row number, used in the error
pub fn prepare_row(spec: &SheetSpec, row: &Row, position: usize) -> Result<Row, ImportError> {
    let mut row = row.clone();

    for (from, to) in spec.renames {
        row.rename(from, to);
    }

    for column in spec.stripped {
        if let Some(value) = row.remove(column)
            && !value.is_null()
        {
            tracing::debug!(
                "Dropped supplied {} {} from {} row {}",
                column,
                value,
                spec.table,
                position
            );
        }
    }

    if let Some(field) = spec
        .required
        .iter()
        .find(|field| row.get(field).is_none_or(CellValue::is_null))
    {
        return Err(ImportError::MissingRequiredField {
            table: spec.table.to_string(),
            field: field.to_string(),
            row: position,
        });
    }

    Ok(row)
}

fn emit(out: &mut dyn Write, line: std::fmt::Arguments<'_>) -> Result<(), ImportError> {
    out.write_fmt(line)
        .and_then(|_| out.write_all(b"\n"))
        .map_err(|e| ImportError::Output(e.to_string()))
}

/// Populate the table a sheet maps to
///
/// Opens one session, inserts each row in its own transaction and closes the
/// session before returning. A connection failure skips the sheet; it is not an
/// error.
///
/// # Arguments
/// * `connector` - Session factory
/// * `sheet_name` - Workbook sheet name (exact)
/// * `rows` - Normalized rows with their sheet row numbers
/// * `out` - Console output
///
/// # Returns
/// Per-row counts and outcomes, or `UnmappedSheet` if the sheet has no table
pub async fn populate<C>(
    connector: &C,
    sheet_name: &str,
    rows: &[SheetRow],
    out: &mut dyn Write,
) -> Result<PopulateReport, ImportError>
where
    C: Connector + ?Sized,
{
    let spec = SheetSpec::for_sheet(sheet_name)
        .ok_or_else(|| ImportError::UnmappedSheet(sheet_name.to_string()))?;

    let mut report = PopulateReport::new(spec);

    let mut backend = match connector.connect().await {
        Ok(backend) => backend,
        Err(e) => {
            tracing::error!("Could not connect to populate {}: {}", spec.table, e);
            emit(out, format_args!("[SKIPPED] {}: could not connect to DB.", sheet_name))?;
            report.connect_error = Some(e.to_string());
            return Ok(report);
        }
    };
    report.connected = true;

    let result = insert_rows(&mut backend, spec, rows, out, &mut report).await;

    if let Err(e) = backend.close().await {
        tracing::error!("Failed to close connection after {}: {}", spec.table, e);
    }

    result?;

    tracing::info!(
        "Populated {}: {} inserted, {} rejected, {} failed",
        spec.table,
        report.inserted,
        report.rejected,
        report.failed
    );

    Ok(report)
}

async fn insert_rows<B>(
    backend: &mut B,
    spec: &SheetSpec,
    rows: &[SheetRow],
    out: &mut dyn Write,
    report: &mut PopulateReport,
) -> Result<(), ImportError>
where
    B: DatabaseBackend + ?Sized,
{
    for source in rows {
        let position = source.number;

        let row = match prepare_row(spec, &source.row, position) {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("{}: {}", e, source.row);
                emit(
                    out,
                    format_args!(
                        "[ERROR] Failed to insert into {}: {}. Row: {}",
                        spec.table, e, source.row
                    ),
                )?;
                report.record(position, RowStatus::Rejected(e));
                continue;
            }
        };

        match insert_row(backend, spec.table, &row).await {
            Ok(()) => {
                emit(out, format_args!("[INSERTED into {}] {}", spec.table, row))?;
                report.record(position, RowStatus::Inserted);
            }
            Err(cause) => {
                tracing::error!("Insert into {} failed (row {}): {}", spec.table, position, cause);
                emit(
                    out,
                    format_args!(
                        "[ERROR] Failed to insert into {} (row {}): {}. Row: {}",
                        spec.table, position, cause, row
                    ),
                )?;
                report.record(position, RowStatus::Failed(cause));
            }
        }
    }

    Ok(())
}

/// Insert one row as its own transaction, rolling back on failure
async fn insert_row<B>(backend: &mut B, table: &str, row: &Row) -> Result<(), String>
where
    B: DatabaseBackend + ?Sized,
{
    let statement = InsertStatement::for_row(table, row).map_err(|e| e.to_string())?;

    backend.begin().await.map_err(|e| e.to_string())?;

    let result = match backend.insert(&statement).await {
        Ok(_) => backend.commit().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        if let Err(rollback) = backend.rollback().await {
            tracing::error!("Rollback on {} failed: {}", table, rollback);
        }
        return Err(e.to_string());
    }

    Ok(())
}
