//! Shared test fixtures: an in-memory library database and workbook sheets
//!
//! `MockDatabase` understands just enough SQL for the loader: transaction control,
//! savepoints, the CREATE/DROP statements of the library DDL and parameterized
//! inserts. Inserts are checked against the columns, NOT NULL constraints and enum
//! labels the DDL declared, and enforce the library's primary keys, foreign keys
//! and the `transaction_id` serial, so the tests see the same failures PostgreSQL
//! raises.

#![allow(dead_code)]

use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use libdb_loader::database::{
    Connector, DatabaseBackend, DatabaseError, DatabaseResult, InsertStatement, QueryResult,
};
use libdb_loader::import::{MemorySource, RawCell, SheetRow, TabularData};
use libdb_loader::models::{CellValue, Row};

/// Column as declared by CREATE TABLE
#[derive(Debug, Clone)]
struct ColumnDef {
    name: String,
    /// Lower-cased type name
    ty: String,
    not_null: bool,
    /// SERIAL or DEFAULT clause
    has_default: bool,
}

impl ColumnDef {
    fn parse(entry: &str) -> Option<Self> {
        let mut words = entry.split_whitespace();
        let name = words.next()?.trim_matches('"').to_lowercase();
        if matches!(
            name.as_str(),
            "primary" | "foreign" | "unique" | "check" | "constraint"
        ) {
            return None;
        }
        let ty = words.next().unwrap_or_default().to_lowercase();
        let upper = entry.to_uppercase();
        Some(Self {
            not_null: upper.contains("NOT NULL") || upper.contains("PRIMARY KEY"),
            has_default: ty.contains("serial") || upper.contains("DEFAULT"),
            name,
            ty,
        })
    }
}

/// Top-level comma separated entries of the parenthesized list in `sql`
fn list_entries(sql: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (sql.find('('), sql.rfind(')')) else {
        return Vec::new();
    };
    if end <= start {
        return Vec::new();
    }

    let mut entries = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in sql[start + 1..end].chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                entries.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    entries.push(current);

    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Single-quoted labels of a CREATE TYPE ... AS ENUM statement
fn enum_labels(sql: &str) -> Vec<String> {
    sql.split('\'').skip(1).step_by(2).map(str::to_string).collect()
}

/// Committed database contents
#[derive(Debug, Clone, Default)]
struct Data {
    /// Existing tables and types
    objects: BTreeSet<String>,
    /// Rows per table
    rows: BTreeMap<String, Vec<Row>>,
    /// Declared columns per table
    columns: BTreeMap<String, Vec<ColumnDef>>,
    /// Labels per enumerated type
    enums: BTreeMap<String, Vec<String>>,
}

impl Data {
    fn remove_object(&mut self, name: &str) {
        self.objects.remove(name);
        self.rows.remove(name);
        self.columns.remove(name);
        self.enums.remove(name);
    }

    /// Reject unknown columns, bad enum labels and missing NOT NULL values
    fn check_row(&self, table: &str, row: &Row) -> DatabaseResult<()> {
        let Some(columns) = self.columns.get(table) else {
            return Ok(());
        };

        for (name, value) in row.iter() {
            let Some(column) = columns.iter().find(|c| c.name == name) else {
                return Err(DatabaseError::QueryFailed(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    name, table
                )));
            };

            if let Some(labels) = self.enums.get(&column.ty)
                && !value.is_null()
                && !value.as_text().is_some_and(|l| labels.iter().any(|label| label == l))
            {
                let shown = value.as_text().map(str::to_string).unwrap_or_else(|| value.to_string());
                return Err(DatabaseError::QueryFailed(format!(
                    "invalid input value for enum {}: \"{}\"",
                    column.ty, shown
                )));
            }
        }

        for column in columns.iter().filter(|c| c.not_null) {
            let missing = match row.get(&column.name) {
                Some(value) => value.is_null(),
                None => !column.has_default,
            };
            if missing {
                return Err(DatabaseError::QueryFailed(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name, table
                )));
            }
        }

        Ok(())
    }

    fn key_exists(&self, table: &str, column: &str, key: &CellValue) -> bool {
        self.rows
            .get(table)
            .is_some_and(|rows| rows.iter().any(|r| r.get(column) == Some(key)))
    }

    fn require_key<'a>(row: &'a Row, table: &str, column: &str) -> DatabaseResult<&'a CellValue> {
        match row.get(column) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(DatabaseError::QueryFailed(format!(
                "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                column, table
            ))),
        }
    }

    fn unique(&self, row: &Row, table: &str, column: &str) -> DatabaseResult<()> {
        let key = Self::require_key(row, table, column)?;
        if self.key_exists(table, column, key) {
            return Err(DatabaseError::QueryFailed(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                table
            )));
        }
        Ok(())
    }

    fn references(&self, row: &Row, table: &str, column: &str, parent: &str) -> DatabaseResult<()> {
        let key = Self::require_key(row, table, column)?;
        if !self.key_exists(parent, column, key) {
            return Err(DatabaseError::QueryFailed(format!(
                "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\"",
                table, table, column
            )));
        }
        Ok(())
    }

    fn insert(&mut self, table: &str, mut row: Row, serial: &mut i64) -> DatabaseResult<()> {
        if !self.objects.contains(table) {
            return Err(DatabaseError::QueryFailed(format!(
                "relation \"{}\" does not exist",
                table
            )));
        }

        self.check_row(table, &row)?;

        match table {
            "client" => self.unique(&row, table, "client_id")?,
            "media_item" => self.unique(&row, table, "item_id")?,
            "book" | "magazine" | "digital_media" => {
                self.references(&row, table, "item_id", "media_item")?;
                self.unique(&row, table, "item_id")?;
            }
            "transaction" => {
                self.references(&row, table, "client_id", "client")?;
                self.references(&row, table, "item_id", "media_item")?;
                if row.get("transaction_id").is_none_or(CellValue::is_null) {
                    *serial += 1;
                    row.insert("transaction_id", *serial);
                }
            }
            _ => {}
        }

        self.rows.entry(table.to_string()).or_default().push(row);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    data: Data,
    /// Sequences are not transactional
    serial: i64,
    /// Every statement text, in order
    log: Vec<String>,
    connects: usize,
    closes: usize,
    refuse_connections: bool,
    /// Statements containing this text fail
    poison: Option<String>,
}

/// Shared in-memory database
#[derive(Debug, Clone, Default)]
pub struct MockDatabase {
    state: Rc<RefCell<State>>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector opening sessions on this database
    pub fn connector(&self) -> MockConnector {
        MockConnector { db: self.clone() }
    }

    /// Open a session directly
    pub fn session(&self) -> MockSession {
        MockSession::new(self.clone())
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.borrow_mut().refuse_connections = refuse;
    }

    /// Make every statement containing `fragment` fail
    pub fn poison(&self, fragment: &str) {
        self.state.borrow_mut().poison = Some(fragment.to_string());
    }

    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .borrow()
            .data
            .rows
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.rows(table).len()
    }

    pub fn counts(&self) -> BTreeMap<String, usize> {
        self.state
            .borrow()
            .data
            .rows
            .iter()
            .map(|(table, rows)| (table.clone(), rows.len()))
            .collect()
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.state.borrow().data.objects.contains(name)
    }

    pub fn object_count(&self) -> usize {
        self.state.borrow().data.objects.len()
    }

    pub fn log(&self) -> Vec<String> {
        self.state.borrow().log.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn closes(&self) -> usize {
        self.state.borrow().closes
    }
}

/// Connector for [`MockDatabase`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    db: MockDatabase,
}

#[async_trait(?Send)]
impl Connector for MockConnector {
    type Backend = MockSession;

    async fn connect(&self) -> DatabaseResult<MockSession> {
        if self.db.state.borrow().refuse_connections {
            return Err(DatabaseError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }
        Ok(MockSession::new(self.db.clone()))
    }
}

/// One session on a [`MockDatabase`]
pub struct MockSession {
    db: MockDatabase,
    open: bool,
    /// Contents at BEGIN
    snapshot: Option<Data>,
    savepoints: Vec<(String, Data)>,
    /// Set by a failure inside a transaction, as PostgreSQL does
    aborted: bool,
}

fn object_name(word: Option<&&str>) -> String {
    word.map(|w| w.trim_end_matches(['(', ';']).trim_matches('"').to_lowercase())
        .unwrap_or_default()
}

impl MockSession {
    fn new(db: MockDatabase) -> Self {
        db.state.borrow_mut().connects += 1;
        Self {
            db,
            open: true,
            snapshot: None,
            savepoints: Vec::new(),
            aborted: false,
        }
    }

    fn ensure_open(&self) -> DatabaseResult<()> {
        if self.open { Ok(()) } else { Err(DatabaseError::Closed) }
    }

    fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    fn fail(&mut self, message: String) -> DatabaseError {
        if self.in_transaction() {
            self.aborted = true;
        }
        DatabaseError::QueryFailed(message)
    }

    fn restore(&mut self, data: Data) {
        self.db.state.borrow_mut().data = data;
    }

    fn run_ddl(&mut self, sql: &str, words: &[&str], upper: &[String]) -> Result<(), String> {
        let mut state = self.db.state.borrow_mut();
        let data = &mut state.data;
        let head: Vec<&str> = upper.iter().map(String::as_str).collect();
        let columns = || -> Vec<ColumnDef> {
            list_entries(sql).iter().filter_map(|e| ColumnDef::parse(e)).collect()
        };

        match head.as_slice() {
            ["CREATE", "TABLE", "IF", "NOT", ..] => {
                let name = object_name(words.get(5));
                if data.objects.insert(name.clone()) {
                    data.rows.insert(name.clone(), Vec::new());
                    data.columns.insert(name, columns());
                }
                Ok(())
            }
            ["CREATE", "TABLE", ..] => {
                let name = object_name(words.get(2));
                if !data.objects.insert(name.clone()) {
                    return Err(format!("relation \"{}\" already exists", name));
                }
                data.rows.insert(name.clone(), Vec::new());
                data.columns.insert(name, columns());
                Ok(())
            }
            ["CREATE", "TYPE", ..] => {
                let name = object_name(words.get(2));
                if !data.objects.insert(name.clone()) {
                    return Err(format!("type \"{}\" already exists", name));
                }
                if sql.to_uppercase().contains(" ENUM") {
                    data.enums.insert(name, enum_labels(sql));
                }
                Ok(())
            }
            ["CREATE", "INDEX", ..] | ["CREATE", "UNIQUE", "INDEX", ..] => Ok(()),
            ["DROP", "TABLE" | "TYPE", "IF", "EXISTS", ..] => {
                let name = object_name(words.get(4));
                data.remove_object(&name);
                Ok(())
            }
            _ => Err(format!(
                "syntax error at or near \"{}\"",
                words.first().copied().unwrap_or_default()
            )),
        }
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for MockSession {
    async fn execute(&mut self, sql: &str) -> DatabaseResult<()> {
        self.ensure_open()?;
        self.db.state.borrow_mut().log.push(sql.to_string());

        let words: Vec<&str> = sql.split_whitespace().collect();
        let upper: Vec<String> = words.iter().take(5).map(|w| w.to_uppercase()).collect();
        let head: Vec<&str> = upper.iter().map(String::as_str).collect();

        match head.as_slice() {
            ["BEGIN", ..] => {
                let data = self.db.state.borrow().data.clone();
                self.snapshot = Some(data);
                self.savepoints.clear();
                self.aborted = false;
                return Ok(());
            }
            ["COMMIT", ..] => {
                // Committing an aborted transaction rolls it back
                if self.aborted
                    && let Some(data) = self.snapshot.take()
                {
                    self.restore(data);
                }
                self.snapshot = None;
                self.savepoints.clear();
                self.aborted = false;
                return Ok(());
            }
            ["ROLLBACK", "TO", ..] => {
                let name = object_name(words.last());
                let position = self
                    .savepoints
                    .iter()
                    .rposition(|(n, _)| *n == name)
                    .ok_or_else(|| {
                        DatabaseError::QueryFailed(format!("savepoint \"{}\" does not exist", name))
                    })?;
                let data = self.savepoints[position].1.clone();
                self.savepoints.truncate(position + 1);
                self.restore(data);
                self.aborted = false;
                return Ok(());
            }
            ["ROLLBACK", ..] => {
                if let Some(data) = self.snapshot.take() {
                    self.restore(data);
                }
                self.savepoints.clear();
                self.aborted = false;
                return Ok(());
            }
            _ => {}
        }

        if self.aborted {
            return Err(self.fail(
                "current transaction is aborted, commands ignored until end of transaction block"
                    .to_string(),
            ));
        }

        let poisoned = self
            .db
            .state
            .borrow()
            .poison
            .as_ref()
            .is_some_and(|p| sql.contains(p.as_str()));
        if poisoned {
            return Err(self.fail(format!("simulated failure: {}", sql)));
        }

        match head.as_slice() {
            ["SAVEPOINT", ..] => {
                let data = self.db.state.borrow().data.clone();
                self.savepoints.push((object_name(words.get(1)), data));
                Ok(())
            }
            ["RELEASE", ..] => {
                let name = object_name(words.last());
                if let Some(position) = self.savepoints.iter().rposition(|(n, _)| *n == name) {
                    self.savepoints.truncate(position);
                }
                Ok(())
            }
            _ => match self.run_ddl(sql, &words, &upper) {
                Ok(()) => Ok(()),
                Err(message) => Err(self.fail(message)),
            },
        }
    }

    async fn insert(&mut self, statement: &InsertStatement) -> DatabaseResult<u64> {
        self.ensure_open()?;
        self.db.state.borrow_mut().log.push(statement.sql.clone());

        if self.aborted {
            return Err(self.fail("current transaction is aborted".to_string()));
        }

        let mut row = Row::new();
        for (column, value) in statement.columns.iter().zip(&statement.params) {
            row.insert(column.clone(), value.clone());
        }

        let result = {
            let mut state = self.db.state.borrow_mut();
            let State { data, serial, .. } = &mut *state;
            data.insert(&statement.table, row, serial)
        };

        match result {
            Ok(()) => Ok(1),
            Err(e) => Err(self.fail(e.to_string())),
        }
    }

    async fn query(&mut self, sql: &str) -> DatabaseResult<QueryResult> {
        self.ensure_open()?;
        Err(DatabaseError::QueryFailed(format!("unsupported query: {}", sql)))
    }

    fn backend_type(&self) -> &'static str {
        "mock"
    }

    async fn close(&mut self) -> DatabaseResult<()> {
        if self.open {
            self.open = false;
            if let Some(data) = self.snapshot.take() {
                self.restore(data);
            }
            self.db.state.borrow_mut().closes += 1;
        }
        Ok(())
    }
}

/// Sheet with the given headers
pub fn sheet(columns: &[&str], rows: Vec<Vec<RawCell>>) -> TabularData {
    TabularData::new(columns.iter().map(|c| c.to_string()).collect(), rows)
}

pub fn text(value: &str) -> RawCell {
    RawCell::String(value.to_string())
}

pub fn num(value: f64) -> RawCell {
    RawCell::Float(value)
}

/// Serial day number of 2024-01-01 in the 1900 date system
pub const JAN_1_2024: f64 = 45292.0;

/// Serial day number of 2024-01-15 in the 1900 date system
pub const JAN_15_2024: f64 = 45306.0;

/// Serial day number of 1899-12-31, what a blank date cell plus one day looks like
pub const CORRUPT_DATE: f64 = 1.0;

pub fn client_sheet() -> TabularData {
    sheet(
        &[
            "Client_ID",
            "Name",
            "Membership_Type",
            "Account_Status",
            "Email_Address",
            "Phone_Number",
        ],
        vec![
            vec![
                num(1.0),
                text("Ada Lovelace"),
                text("Regular"),
                text("Active"),
                text("ada@example.com"),
                text("785-555-0101"),
            ],
            vec![
                num(2.0),
                text("Alan Turing"),
                text("Student"),
                text("Inactive"),
                text("alan@example.com"),
                text("785-555-0102"),
            ],
            vec![
                num(3.0),
                text("Grace Hopper"),
                text("Senior Citizen"),
                text("Suspended"),
                text("grace@example.com"),
                text("785-555-0103"),
            ],
        ],
    )
}

/// Ten media items, plus an empty row and a placeholder row that must be skipped
pub fn media_item_sheet() -> TabularData {
    let mut rows: Vec<Vec<RawCell>> = (1..=10)
        .map(|id| {
            vec![
                num(id as f64),
                text(&format!("Title {}", id)),
                num(2000.0 + id as f64),
                RawCell::DateTime(JAN_15_2024),
            ]
        })
        .collect();
    rows.insert(3, vec![RawCell::Empty; 4]);
    rows.push(vec![num(99.0), RawCell::Empty, RawCell::Empty, RawCell::Empty]);

    sheet(&["Item_ID", "Title", "Publication_Year", "Date_Added"], rows)
}

pub fn book_sheet() -> TabularData {
    sheet(
        &["Item_ID", "ISBN", "Author"],
        vec![
            vec![num(1.0), text("9780131103627.0"), text("Kernighan")],
            vec![num(2.0), num(9780262033848.0), text("Cormen")],
            vec![num(3.0), text(" 9780201633610 "), text("Gamma")],
        ],
    )
}

pub fn magazine_sheet() -> TabularData {
    sheet(
        &["Item_ID", "Issue_Number", "Publisher"],
        vec![
            vec![num(4.0), num(12.0), text("Condé Nast")],
            vec![num(5.0), num(7.0), text("Hearst")],
        ],
    )
}

pub fn digital_media_sheet() -> TabularData {
    sheet(
        &["Item_ID", "Media_Format", "File_Size_MB"],
        vec![
            vec![num(6.0), text("PDF"), num(2.5)],
            vec![num(7.0), text("EPUB"), num(1.25)],
        ],
    )
}

pub fn transaction_sheet() -> TabularData {
    sheet(
        &[
            "Transaction_ID",
            "Client_ID",
            "Item_ID",
            "Date_Borrowed",
            "Expected_Return_Date",
            "Date_Returned",
        ],
        vec![
            vec![
                num(501.0),
                num(1.0),
                num(1.0),
                RawCell::DateTime(JAN_1_2024),
                RawCell::DateTime(JAN_15_2024),
                RawCell::DateTime(CORRUPT_DATE),
            ],
            vec![
                num(502.0),
                num(2.0),
                num(6.0),
                RawCell::DateTime(JAN_1_2024),
                RawCell::DateTime(JAN_15_2024),
                RawCell::DateTime(JAN_15_2024 - 4.0),
            ],
        ],
    )
}

/// Complete, consistent workbook
pub fn library_workbook() -> MemorySource {
    MemorySource::new()
        .with_sheet("Client", client_sheet())
        .with_sheet("Transaction", transaction_sheet())
        .with_sheet("MediaItem", media_item_sheet())
        .with_sheet("Book", book_sheet())
        .with_sheet("Magazine", magazine_sheet())
        .with_sheet("DigitalMedia", digital_media_sheet())
}

/// Rows numbered as if they started on the first data row of a sheet
pub fn numbered(rows: Vec<Row>) -> Vec<SheetRow> {
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| SheetRow::new(i + 2, row))
        .collect()
}

/// Client row satisfying every constraint of the client table
pub fn client_row(id: i64, name: &str) -> Row {
    Row::new()
        .with("client_id", id)
        .with("name", name)
        .with("membership_type", "Regular")
        .with("account_status", "Active")
        .with("email_address", format!("client{}@example.com", id))
        .with("phone_number", format!("785-555-{:04}", id))
}

/// Captured console output
pub fn lines(out: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(out).lines().map(str::to_string).collect()
}

/// Database with the bundled library schema installed
pub async fn library_database() -> MockDatabase {
    let db = MockDatabase::new();
    let mut session = db.session();
    let report = libdb_loader::database::schema::install(
        &mut session,
        libdb_loader::database::schema::LIBRARY_DDL,
    )
    .await
    .unwrap();
    assert!(report.success);
    session.close().await.unwrap();
    db
}
