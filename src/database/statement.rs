//! Parameterized statement building
//!
//! Identifiers are always double-quoted with embedded quotes doubled, and values are
//! always bound as parameters. No row value is ever written into SQL text.

use crate::models::{CellValue, Row};

use super::{DatabaseError, DatabaseResult};

/// Quote a SQL identifier (`item_id` -> `"item_id"`, `a"b` -> `"a""b"`)
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// An INSERT with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Target table (unquoted)
    pub table: String,
    /// Column names (unquoted), in parameter order
    pub columns: Vec<String>,
    /// Parameter values, `$1` first
    pub params: Vec<CellValue>,
    /// Rendered SQL text with `$n` placeholders
    pub sql: String,
}

impl InsertStatement {
    /// Build `INSERT INTO "table" ("c1", "c2") VALUES ($1, $2)` for a row
    pub fn for_row(table: &str, row: &Row) -> DatabaseResult<Self> {
        if table.trim().is_empty() {
            return Err(DatabaseError::InvalidInput("Invalid table name.".to_string()));
        }
        if row.is_empty() {
            return Err(DatabaseError::InvalidInput(format!(
                "Row for {} has no columns",
                table
            )));
        }

        let columns: Vec<String> = row.columns().map(str::to_string).collect();
        let params: Vec<CellValue> = row.values().cloned().collect();

        let fields = columns
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=columns.len())
            .map(|i| format!("${}", i))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            fields,
            placeholders
        );

        Ok(Self {
            table: table.to_string(),
            columns,
            params,
            sql,
        })
    }

    /// Value bound to a column, if present
    pub fn param(&self, column: &str) -> Option<&CellValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.params[i])
    }
}
