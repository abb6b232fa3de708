//! Database session abstraction
//!
//! This module provides the session layer the import pipeline talks to:
//! - [`Connector`]: opens one session from explicit credentials
//! - [`DatabaseBackend`]: statement execution, parameterized inserts, transaction control
//! - PostgreSQL implementation behind the `postgres-backend` feature
//!
//! Sessions are used strictly sequentially; nothing here is shared across tasks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod config;
pub mod schema;
pub mod statement;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::{PostgresBackend, PostgresConnector};

pub use config::{Credentials, LoaderConfig};
pub use statement::{InsertStatement, quote_identifier};

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema installation or drop failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Transaction control failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Session already closed
    #[error("Connection is closed")]
    Closed,

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result row as a JSON value
pub type QueryRow = serde_json::Value;

/// Query result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of data
    pub rows: Vec<QueryRow>,
    /// Number of rows affected (for INSERT/UPDATE/DELETE)
    pub rows_affected: Option<u64>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<QueryRow>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: None,
            execution_time_ms: 0,
        }
    }

    /// Create an empty result
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One open database session
///
/// Transaction control defaults to plain `BEGIN`/`COMMIT`/`ROLLBACK`/`SAVEPOINT`
/// statements sent through [`DatabaseBackend::execute`].
#[async_trait(?Send)]
pub trait DatabaseBackend {
    /// Execute one or more statements without parameters
    async fn execute(&mut self, sql: &str) -> DatabaseResult<()>;

    /// Execute a parameterized insert
    ///
    /// # Returns
    /// Number of rows inserted
    async fn insert(&mut self, statement: &InsertStatement) -> DatabaseResult<u64>;

    /// Execute a read statement and return its rows
    async fn query(&mut self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Start a transaction
    async fn begin(&mut self) -> DatabaseResult<()> {
        self.execute("BEGIN").await
    }

    /// Commit the open transaction
    async fn commit(&mut self) -> DatabaseResult<()> {
        self.execute("COMMIT").await
    }

    /// Roll back the open transaction
    async fn rollback(&mut self) -> DatabaseResult<()> {
        self.execute("ROLLBACK").await
    }

    /// Set a savepoint inside the open transaction
    async fn savepoint(&mut self, name: &str) -> DatabaseResult<()> {
        self.execute(&format!("SAVEPOINT {}", quote_identifier(name)))
            .await
    }

    /// Release a savepoint, keeping its work
    async fn release_savepoint(&mut self, name: &str) -> DatabaseResult<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", quote_identifier(name)))
            .await
    }

    /// Undo everything since a savepoint
    async fn rollback_to_savepoint(&mut self, name: &str) -> DatabaseResult<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", quote_identifier(name)))
            .await
    }

    /// Get the database backend type name
    fn backend_type(&self) -> &'static str;

    /// Close the session
    ///
    /// Safe to call more than once.
    async fn close(&mut self) -> DatabaseResult<()>;
}

/// Opens database sessions
#[async_trait(?Send)]
pub trait Connector {
    /// Session type produced by this connector
    type Backend: DatabaseBackend;

    /// Open a new session
    ///
    /// Implementations log the failure cause before returning an error.
    async fn connect(&self) -> DatabaseResult<Self::Backend>;
}

/// Output format for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
    /// CSV format
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Format query results for display
pub fn format_query_result(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(&result.rows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_as_csv(result),
        OutputFormat::Table => format_as_table(result),
    }
}

fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn format_as_csv(result: &QueryResult) -> String {
    let mut output = String::new();

    output.push_str(&result.columns.join(","));
    output.push('\n');

    for row in &result.rows {
        let values: Vec<String> = result
            .columns
            .iter()
            .map(|col| match row.get(col).unwrap_or(&serde_json::Value::Null) {
                serde_json::Value::String(s) => {
                    if s.contains(',') || s.contains('"') || s.contains('\n') {
                        format!("\"{}\"", s.replace('"', "\"\""))
                    } else {
                        s.clone()
                    }
                }
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

fn format_as_table(result: &QueryResult) -> String {
    if result.is_empty() {
        return "(0 rows)".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| {
            result
                .columns
                .iter()
                .map(|col| display_value(row.get(col).unwrap_or(&serde_json::Value::Null)))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.len()).collect();
    for row in &cells {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.len());
        }
    }

    let render = |values: &[String]| -> String {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    let mut output = String::new();
    output.push_str(&render(&result.columns[..]));
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    for row in &cells {
        output.push_str(&render(&row[..]));
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", result.row_count()));

    output
}
