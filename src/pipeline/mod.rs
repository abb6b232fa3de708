//! Import pipeline
//!
//! Sequences the optional drop, the schema install and the per-sheet
//! read/normalize/populate steps. Sheets load in dependency order so every
//! specialization row finds its `media_item` parent and every transaction finds
//! its client and item.

use serde::Serialize;
use std::io::Write;

use crate::database::schema::{self, InstallReport, LIBRARY_DDL};
use crate::database::{Connector, DatabaseBackend, DatabaseError};
use crate::import::mapping::{SheetSpec, import_order};
use crate::import::normalize::{NormalizeWarning, NormalizedSheet, normalize};
use crate::import::populate::{PopulateReport, populate, prepare_row};
use crate::import::sheet::{SheetSource, TabularData};
use crate::import::ImportError;

/// Error type for pipeline runs
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Schema or session failure
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Import failure that aborts the run
    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    /// Dry-run target matches no sheet or table
    #[error("Unknown table: {0}")]
    UnknownTarget(String),
}

/// What a run does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineMode {
    /// Drop every managed relation
    DropOnly,
    /// Drop, install the schema, then import
    DropAndBuild,
    /// Install the schema, then import
    BuildOnly,
    /// Import into the existing schema
    ImportOnly,
    /// Read and normalize everything, print the rows one table would receive
    DryRun {
        /// Sheet or table name, case-insensitive
        target: String,
    },
}

impl PipelineMode {
    fn drops(&self) -> bool {
        matches!(self, PipelineMode::DropOnly | PipelineMode::DropAndBuild)
    }

    fn installs(&self) -> bool {
        matches!(self, PipelineMode::DropAndBuild | PipelineMode::BuildOnly)
    }

    fn imports(&self) -> bool {
        matches!(
            self,
            PipelineMode::DropAndBuild | PipelineMode::BuildOnly | PipelineMode::ImportOnly
        )
    }
}

/// Why a sheet was not populated
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No rows survived normalization
    Empty,
    /// The sheet could not be read
    Unreadable { cause: String },
    /// No session could be opened
    NoConnection { cause: String },
}

/// Per-sheet result
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SheetStatus {
    /// Nothing inserted
    Skipped { reason: SkipReason },
    /// Rows sent to the database
    Populated(PopulateReport),
    /// Dry run over a sheet other than the target
    Parsed { rows: usize },
    /// Dry run over the target sheet
    Previewed { rows: usize, rejected: usize },
}

/// Result of one sheet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetReport {
    /// Sheet name
    pub sheet: String,
    /// Rows kept by normalization
    pub rows: usize,
    /// Source rows dropped as empty or placeholder rows
    pub skipped_rows: usize,
    /// Values nulled during normalization
    pub warnings: Vec<NormalizeWarning>,
    pub status: SheetStatus,
}

impl SheetReport {
    fn new(sheet: &NormalizedSheet, status: SheetStatus) -> Self {
        Self {
            sheet: sheet.sheet.clone(),
            rows: sheet.rows.len(),
            skipped_rows: sheet.skipped_rows,
            warnings: sheet.warnings.clone(),
            status,
        }
    }

    /// Rows committed
    pub fn inserted(&self) -> usize {
        match &self.status {
            SheetStatus::Populated(report) => report.inserted,
            _ => 0,
        }
    }

    /// Rows rejected or failed
    pub fn errors(&self) -> usize {
        match &self.status {
            SheetStatus::Populated(report) => report.errors(),
            SheetStatus::Previewed { rejected, .. } => *rejected,
            _ => 0,
        }
    }
}

/// Result of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    /// Schema install result, when the mode installs
    pub schema: Option<InstallReport>,
    /// Whether managed relations were dropped
    pub dropped: bool,
    /// Sheets in load order
    pub sheets: Vec<SheetReport>,
}

impl PipelineReport {
    /// Total rows committed
    pub fn inserted(&self) -> usize {
        self.sheets.iter().map(SheetReport::inserted).sum()
    }

    /// Total rows rejected or failed
    pub fn errors(&self) -> usize {
        self.sheets.iter().map(SheetReport::errors).sum()
    }

    /// Every normalization warning, in load order
    pub fn warnings(&self) -> impl Iterator<Item = &NormalizeWarning> {
        self.sheets.iter().flat_map(|s| s.warnings.iter())
    }

    /// Report for a sheet
    pub fn sheet(&self, name: &str) -> Option<&SheetReport> {
        self.sheets.iter().find(|s| s.sheet == name)
    }
}

/// Import pipeline over one connector and one sheet source
pub struct Pipeline<C, S> {
    connector: C,
    source: S,
    ddl: String,
}

impl<C, S> Pipeline<C, S>
where
    C: Connector,
    S: SheetSource,
{
    /// Create a pipeline installing the bundled library schema
    pub fn new(connector: C, source: S) -> Self {
        Self {
            connector,
            source,
            ddl: LIBRARY_DDL.to_string(),
        }
    }

    /// Replace the DDL installed by build modes
    pub fn with_ddl(mut self, ddl: impl Into<String>) -> Self {
        self.ddl = ddl.into();
        self
    }

    /// Session factory
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Run the pipeline
    ///
    /// # Arguments
    /// * `mode` - What to do
    /// * `out` - Console output for insert, error and skip lines
    ///
    /// # Returns
    /// Per-sheet results. Drop and schema failures that prevent the transaction
    /// from completing abort the run; per-statement and per-row failures do not.
    pub async fn run(
        &mut self,
        mode: &PipelineMode,
        out: &mut dyn Write,
    ) -> Result<PipelineReport, PipelineError> {
        let mut report = PipelineReport::default();

        if let PipelineMode::DryRun { target } = mode {
            report.sheets = self.dry_run(target, out)?;
            return Ok(report);
        }

        if mode.drops() {
            self.drop_all().await?;
            report.dropped = true;
        }

        if mode.installs() {
            report.schema = Some(self.install_schema().await?);
        }

        if mode.imports() {
            report.sheets = self.import(out).await?;
        }

        Ok(report)
    }

    /// Drop every managed relation
    pub async fn drop_all(&self) -> Result<(), PipelineError> {
        let mut backend = self.connector.connect().await?;
        let result = schema::drop_all(&mut backend).await;
        close(&mut backend).await;
        Ok(result?)
    }

    /// Install the configured DDL
    pub async fn install_schema(&self) -> Result<InstallReport, PipelineError> {
        let mut backend = self.connector.connect().await?;
        let result = schema::install(&mut backend, &self.ddl).await;
        close(&mut backend).await;
        Ok(result?)
    }

    /// Read and normalize every sheet, in load order
    pub fn read_all(&mut self) -> Vec<NormalizedSheet> {
        self.load_all().into_iter().map(|(sheet, _)| sheet).collect()
    }

    /// Normalized sheets in load order, each with its read failure if any
    fn load_all(&mut self) -> Vec<(NormalizedSheet, Option<String>)> {
        import_order()
            .into_iter()
            .map(|spec| {
                let (data, read_error) = match self.source.try_read(spec.sheet) {
                    Ok(data) => (data, None),
                    Err(e) => {
                        tracing::warn!("{}", e);
                        (TabularData::empty(), Some(e.to_string()))
                    }
                };
                (normalize(spec.sheet, &data), read_error)
            })
            .collect()
    }

    /// Read every sheet, then populate each non-empty one
    pub async fn import(&mut self, out: &mut dyn Write) -> Result<Vec<SheetReport>, PipelineError> {
        let sheets = self.load_all();
        let mut reports = Vec::with_capacity(sheets.len());

        for (sheet, read_error) in &sheets {
            if sheet.is_empty() {
                reports.push(skip_empty(sheet, read_error.as_deref(), out)?);
                continue;
            }

            let populated = populate(&self.connector, &sheet.sheet, &sheet.rows, out).await?;
            let status = if populated.connected {
                SheetStatus::Populated(populated)
            } else {
                SheetStatus::Skipped {
                    reason: SkipReason::NoConnection {
                        cause: populated.connect_error.unwrap_or_default(),
                    },
                }
            };
            reports.push(SheetReport::new(sheet, status));
        }

        Ok(reports)
    }

    /// Read every sheet and print the rows the target table would receive
    ///
    /// Never opens a session.
    pub fn dry_run(
        &mut self,
        target: &str,
        out: &mut dyn Write,
    ) -> Result<Vec<SheetReport>, PipelineError> {
        let target = SheetSpec::find(target)
            .ok_or_else(|| PipelineError::UnknownTarget(target.to_string()))?;

        let sheets = self.load_all();
        let mut reports = Vec::with_capacity(sheets.len());

        for (sheet, read_error) in &sheets {
            if sheet.is_empty() {
                reports.push(skip_empty(sheet, read_error.as_deref(), out)?);
                continue;
            }

            if sheet.sheet != target.sheet {
                reports.push(SheetReport::new(
                    sheet,
                    SheetStatus::Parsed {
                        rows: sheet.rows.len(),
                    },
                ));
                continue;
            }

            let mut rejected = 0;
            for source in &sheet.rows {
                let line = match prepare_row(target, &source.row, source.number) {
                    Ok(row) => format!("[DRY RUN into {}] {}", target.table, row),
                    Err(e) => {
                        rejected += 1;
                        format!(
                            "[ERROR] Would not insert into {}: {}. Row: {}",
                            target.table, e, source.row
                        )
                    }
                };
                writeln!(out, "{}", line).map_err(|e| ImportError::Output(e.to_string()))?;
            }

            reports.push(SheetReport::new(
                sheet,
                SheetStatus::Previewed {
                    rows: sheet.rows.len(),
                    rejected,
                },
            ));
        }

        Ok(reports)
    }
}

fn skip_empty(
    sheet: &NormalizedSheet,
    read_error: Option<&str>,
    out: &mut dyn Write,
) -> Result<SheetReport, ImportError> {
    writeln!(
        out,
        "[SKIPPED] {}: empty or failed to parse. No rows inserted.",
        sheet.sheet
    )
    .map_err(|e| ImportError::Output(e.to_string()))?;

    let reason = match read_error {
        Some(cause) => SkipReason::Unreadable {
            cause: cause.to_string(),
        },
        None => SkipReason::Empty,
    };
    Ok(SheetReport::new(sheet, SheetStatus::Skipped { reason }))
}

async fn close<B: DatabaseBackend>(backend: &mut B) {
    if let Err(e) = backend.close().await {
        tracing::error!("Failed to close connection: {}", e);
    }
}
