//! PostgreSQL database backend implementation
//!
//! One [`PostgresBackend`] wraps one `tokio-postgres` client plus its connection
//! driver task. Row values are bound through the [`ToSql`] impl for [`CellValue`],
//! which adapts integers, text and dates to the column type the server infers for
//! each placeholder (including user-defined enum types).

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use std::error::Error;
use tokio::task::JoinHandle;
use tokio_postgres::types::{FromSql, IsNull, Kind, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls};

use super::config::Credentials;
use super::statement::InsertStatement;
use super::{Connector, DatabaseBackend, DatabaseError, DatabaseResult, QueryResult};
use crate::models::CellValue;

type BoxError = Box<dyn Error + Sync + Send>;

/// Opens PostgreSQL sessions from explicit credentials
#[derive(Debug, Clone)]
pub struct PostgresConnector {
    credentials: Credentials,
}

impl PostgresConnector {
    /// Create a connector for the given credentials
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }

    /// Credentials this connector uses
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[async_trait(?Send)]
impl Connector for PostgresConnector {
    type Backend = PostgresBackend;

    async fn connect(&self) -> DatabaseResult<PostgresBackend> {
        PostgresBackend::connect(&self.credentials).await
    }
}

/// PostgreSQL database session
pub struct PostgresBackend {
    /// Masked connection target, for log lines
    target: String,
    /// Client; `None` once closed
    client: Option<Client>,
    /// Connection driver task
    driver: Option<JoinHandle<()>>,
}

impl PostgresBackend {
    /// Open a session
    ///
    /// # Arguments
    /// * `credentials` - Host, database, user and password
    ///
    /// # Returns
    /// An open session, or `ConnectionFailed` after logging the cause
    pub async fn connect(credentials: &Credentials) -> DatabaseResult<Self> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&credentials.host)
            .port(credentials.port)
            .dbname(&credentials.name)
            .user(&credentials.user);
        if let Some(password) = &credentials.password {
            config.password(password);
        }

        let target = credentials.masked();

        let (client, connection) = match config.connect(NoTls).await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::error!("DB connection failure ({}): {}", target, e);
                return Err(DatabaseError::ConnectionFailed(format!(
                    "Failed to connect to {}: {}",
                    target, e
                )));
            }
        };

        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        tracing::info!("DB connection successful ({})", target);

        Ok(Self {
            target,
            client: Some(client),
            driver: Some(driver),
        })
    }

    /// Masked connection target
    pub fn target(&self) -> &str {
        &self.target
    }

    fn client(&self) -> DatabaseResult<&Client> {
        self.client.as_ref().ok_or(DatabaseError::Closed)
    }

    /// Convert a PostgreSQL row to a JSON value
    fn row_to_json(row: &tokio_postgres::Row, columns: &[String]) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        for (i, col_name) in columns.iter().enumerate() {
            map.insert(col_name.clone(), Self::get_column_value(row, i));
        }

        serde_json::Value::Object(map)
    }

    /// Get a column value as JSON
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> serde_json::Value {
        use serde_json::Value;

        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v.map(Value::String).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<NaiveDate>>(idx) {
            return v
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<NaiveDateTime>>(idx) {
            return v
                .map(|d| Value::String(d.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<_, Option<EnumLabel>>(idx) {
            return v.map(|l| Value::String(l.0)).unwrap_or(Value::Null);
        }

        Value::Null
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for PostgresBackend {
    async fn execute(&mut self, sql: &str) -> DatabaseResult<()> {
        tracing::debug!("Executing: {}", sql);
        self.client()?
            .batch_execute(sql)
            .await
            .map_err(|e| DatabaseError::QueryFailed(describe(&e)))
    }

    async fn insert(&mut self, statement: &InsertStatement) -> DatabaseResult<u64> {
        let params: Vec<&(dyn ToSql + Sync)> = statement
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        self.client()?
            .execute(statement.sql.as_str(), &params)
            .await
            .map_err(|e| DatabaseError::QueryFailed(describe(&e)))
    }

    async fn query(&mut self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();

        let rows = self
            .client()?
            .query(sql, &[])
            .await
            .map_err(|e| DatabaseError::QueryFailed(describe(&e)))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let json_rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|row| Self::row_to_json(row, &columns))
            .collect();

        Ok(QueryResult {
            columns,
            rows: json_rows,
            rows_affected: None,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&mut self) -> DatabaseResult<()> {
        // Dropping the client ends the connection; the driver task then finishes.
        if self.client.take().is_some() {
            if let Some(driver) = self.driver.take() {
                let _ = driver.await;
            }
            tracing::info!("DB connection closed ({})", self.target);
        }
        Ok(())
    }
}

/// Prefer the server's message (constraint violations etc.) over the generic wrapper
fn describe(error: &tokio_postgres::Error) -> String {
    match error.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => error.to_string(),
    }
}

/// Label of a user-defined enum value
struct EnumLabel(String);

impl<'a> FromSql<'a> for EnumLabel {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}

fn is_textual(ty: &Type) -> bool {
    *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
}

fn is_enum(ty: &Type) -> bool {
    matches!(ty.kind(), Kind::Enum(_))
}

fn write_label(label: &str, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    out.extend_from_slice(label.as_bytes());
    Ok(IsNull::No)
}

fn mismatch(value: &CellValue, ty: &Type) -> BoxError {
    format!("cannot store {} in a column of type {}", value, ty).into()
}

fn integer_to_sql(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::INT2 {
        i16::try_from(value)?.to_sql(ty, out)
    } else if *ty == Type::INT4 {
        i32::try_from(value)?.to_sql(ty, out)
    } else if *ty == Type::INT8 {
        value.to_sql(ty, out)
    } else if *ty == Type::FLOAT4 {
        (value as f32).to_sql(ty, out)
    } else if *ty == Type::FLOAT8 {
        (value as f64).to_sql(ty, out)
    } else if is_textual(ty) || is_enum(ty) {
        write_label(&value.to_string(), out)
    } else {
        Err(mismatch(&CellValue::Integer(value), ty))
    }
}

fn date_to_sql(value: NaiveDateTime, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if *ty == Type::DATE {
        value.date().to_sql(ty, out)
    } else if *ty == Type::TIMESTAMP {
        value.to_sql(ty, out)
    } else if *ty == Type::TIMESTAMPTZ {
        Utc.from_utc_datetime(&value).to_sql(ty, out)
    } else if is_textual(ty) {
        let text = if value.time() == NaiveTime::MIN {
            value.format("%Y-%m-%d").to_string()
        } else {
            value.format("%Y-%m-%d %H:%M:%S").to_string()
        };
        write_label(&text, out)
    } else {
        Err(mismatch(&CellValue::DateTime(value), ty))
    }
}

impl ToSql for CellValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            CellValue::Null => Ok(IsNull::Yes),
            CellValue::Integer(i) => integer_to_sql(*i, ty, out),
            CellValue::Float(v) => {
                if *ty == Type::FLOAT8 {
                    v.to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if is_textual(ty) {
                    write_label(&v.to_string(), out)
                } else {
                    Err(mismatch(self, ty))
                }
            }
            CellValue::Bool(b) => {
                if *ty == Type::BOOL {
                    b.to_sql(ty, out)
                } else if is_textual(ty) {
                    write_label(&b.to_string(), out)
                } else {
                    integer_to_sql(i64::from(*b), ty, out)
                }
            }
            CellValue::Text(s) => {
                if is_textual(ty) || is_enum(ty) {
                    write_label(s, out)
                } else if let Ok(i) = s.trim().parse::<i64>() {
                    integer_to_sql(i, ty, out)
                } else if let Ok(d) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                    date_to_sql(d.and_time(NaiveTime::MIN), ty, out)
                } else {
                    Err(mismatch(self, ty))
                }
            }
            CellValue::Date(d) => date_to_sql(d.and_time(NaiveTime::MIN), ty, out),
            CellValue::DateTime(dt) => date_to_sql(*dt, ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
