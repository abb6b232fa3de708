//! Library database loader
//!
//! Loads the library management database from an Excel workbook:
//! - Schema install and teardown for the library relations
//! - Sheet reading and row normalization (dates, float-encoded integers, ISBNs)
//! - Per-row transactional inserts that survive individual row failures
//! - Pipeline modes: drop, rebuild, build, import and dry run

pub mod database;
pub mod import;
pub mod models;
pub mod pipeline;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
#[cfg(feature = "postgres-backend")]
pub use database::{PostgresBackend, PostgresConnector};
pub use database::{
    Connector, Credentials, DatabaseBackend, DatabaseError, DatabaseResult, LoaderConfig,
};
pub use import::{ImportError, SheetSource, TabularData, WorkbookSource};
pub use models::{CellValue, Row};
pub use pipeline::{Pipeline, PipelineError, PipelineMode, PipelineReport};
