//! Library schema installation
//!
//! Installs a DDL file statement by statement inside one transaction and tears the
//! managed relations down again. Each statement runs under its own savepoint so a
//! failing statement is reported without aborting the rest of the file.

use serde::Serialize;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::path::Path;

use super::{DatabaseBackend, DatabaseError, DatabaseResult};

/// Bundled library DDL
pub const LIBRARY_DDL: &str = include_str!("../../sql/library_schema.sql");

/// Drops for every managed relation, children first
pub const DROP_STATEMENTS: &[&str] = &[
    "DROP TABLE IF EXISTS \"transaction\" CASCADE",
    "DROP TABLE IF EXISTS book CASCADE",
    "DROP TABLE IF EXISTS magazine CASCADE",
    "DROP TABLE IF EXISTS digital_media CASCADE",
    "DROP TABLE IF EXISTS media_item CASCADE",
    "DROP TABLE IF EXISTS client CASCADE",
    "DROP TYPE IF EXISTS membership_type CASCADE",
    "DROP TYPE IF EXISTS account_status CASCADE",
    "DROP TYPE IF EXISTS availability_status CASCADE",
];

/// Result of executing one DDL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementOutcome {
    /// 1-based position in the file
    pub index: usize,
    /// Statement text, comments removed
    pub statement: String,
    /// Failure cause, `None` on success
    pub error: Option<String>,
}

impl StatementOutcome {
    /// Whether the statement executed
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// First line of the statement, for log lines
    pub fn summary(&self) -> &str {
        self.statement.lines().next().unwrap_or_default().trim()
    }
}

/// Aggregate result of a schema installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    /// True when every statement executed
    pub success: bool,
    /// Per-statement outcomes in file order
    pub outcomes: Vec<StatementOutcome>,
}

impl Default for InstallReport {
    fn default() -> Self {
        Self {
            success: true,
            outcomes: Vec::new(),
        }
    }
}

impl InstallReport {
    /// Fold one outcome into the report
    pub fn record(mut self, outcome: StatementOutcome) -> Self {
        self.success &= outcome.succeeded();
        self.outcomes.push(outcome);
        self
    }

    /// Outcomes of failed statements
    pub fn failures(&self) -> impl Iterator<Item = &StatementOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    /// Number of statements that executed
    pub fn executed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }
}

/// Split DDL text into statements
///
/// Comments are removed and only top-level `;` tokens end a statement, so
/// semicolons inside string, quoted identifier and dollar-quoted literals are
/// kept. Blank statements are dropped. Text the tokenizer rejects falls back to
/// a plain split on `;`.
pub fn split_statements(ddl: &str) -> Vec<String> {
    let dialect = PostgreSqlDialect {};
    let tokens = match Tokenizer::new(&dialect, ddl).with_unescape(false).tokenize() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("DDL tokenizer failed ({}), splitting on ';'", e);
            return ddl
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    };

    let mut statements = Vec::new();
    let mut current = String::new();

    for token in tokens {
        match token {
            Token::SemiColon => push_statement(&mut statements, &mut current),
            Token::Whitespace(Whitespace::SingleLineComment { .. }) => current.push('\n'),
            Token::Whitespace(Whitespace::MultiLineComment(_)) => current.push(' '),
            other => current.push_str(&other.to_string()),
        }
    }
    push_statement(&mut statements, &mut current);

    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Read a DDL file
pub fn load_ddl(path: &Path) -> DatabaseResult<String> {
    std::fs::read_to_string(path).map_err(|e| {
        DatabaseError::IoError(format!("Failed to read DDL file {}: {}", path.display(), e))
    })
}

/// Install DDL text
///
/// Runs every statement in one transaction, each under a savepoint. Failed
/// statements are logged, rolled back to their savepoint and recorded; the
/// transaction commits once at the end regardless.
///
/// # Returns
/// The per-statement report, or an error if the transaction itself could not be
/// opened or committed
pub async fn install<B>(backend: &mut B, ddl: &str) -> DatabaseResult<InstallReport>
where
    B: DatabaseBackend + ?Sized,
{
    let statements = split_statements(ddl);
    tracing::info!("Installing schema ({} statements)", statements.len());

    backend
        .begin()
        .await
        .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to start transaction: {}", e)))?;

    let mut report = InstallReport::default();
    for (i, statement) in statements.into_iter().enumerate() {
        let outcome = execute_statement(backend, i + 1, statement).await;
        report = report.record(outcome);
    }

    if let Err(e) = backend.commit().await {
        let _ = backend.rollback().await;
        return Err(DatabaseError::MigrationFailed(format!(
            "Failed to commit schema: {}",
            e
        )));
    }

    tracing::info!(
        "Schema installed: {} of {} statements succeeded",
        report.executed(),
        report.outcomes.len()
    );

    Ok(report)
}

async fn execute_statement<B>(backend: &mut B, index: usize, statement: String) -> StatementOutcome
where
    B: DatabaseBackend + ?Sized,
{
    let savepoint = format!("ddl_{}", index);

    let result = match backend.savepoint(&savepoint).await {
        Ok(()) => match backend.execute(&statement).await {
            Ok(()) => backend.release_savepoint(&savepoint).await,
            Err(e) => {
                if let Err(rollback) = backend.rollback_to_savepoint(&savepoint).await {
                    tracing::error!("Failed to roll back statement {}: {}", index, rollback);
                }
                Err(e)
            }
        },
        Err(e) => Err(e),
    };

    let outcome = StatementOutcome {
        index,
        statement,
        error: result.err().map(|e| e.to_string()),
    };

    if let Some(error) = &outcome.error {
        tracing::error!("Statement {} failed ({}): {}", index, outcome.summary(), error);
    } else {
        tracing::debug!("Statement {} executed: {}", index, outcome.summary());
    }

    outcome
}

/// Install a DDL file
pub async fn install_file<B>(backend: &mut B, path: &Path) -> DatabaseResult<InstallReport>
where
    B: DatabaseBackend + ?Sized,
{
    let ddl = load_ddl(path)?;
    install(backend, &ddl).await
}

/// Drop every managed relation and enumerated type
///
/// Runs [`DROP_STATEMENTS`] in one transaction; any failure rolls the whole drop
/// back.
pub async fn drop_all<B>(backend: &mut B) -> DatabaseResult<()>
where
    B: DatabaseBackend + ?Sized,
{
    backend
        .begin()
        .await
        .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to start transaction: {}", e)))?;

    for statement in DROP_STATEMENTS {
        if let Err(e) = backend.execute(statement).await {
            tracing::error!("Drop failed ({}): {}", statement, e);
            let _ = backend.rollback().await;
            return Err(DatabaseError::MigrationFailed(format!(
                "Failed to drop tables: {}",
                e
            )));
        }
    }

    backend
        .commit()
        .await
        .map_err(|e| DatabaseError::MigrationFailed(format!("Failed to commit drop: {}", e)))?;

    tracing::info!("All managed tables dropped");
    Ok(())
}
