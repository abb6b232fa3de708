//! Normalized cell values and rows
//!
//! A [`Row`] is the intermediate representation handed from the normalizer to the
//! populator: an ordered mapping from lower-cased column name to [`CellValue`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::fmt;

/// A single normalized value
///
/// Spreadsheet serial dates and float-encoded integers never reach this type;
/// the normalizer resolves them to [`CellValue::Date`] / [`CellValue::Integer`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum CellValue {
    /// SQL NULL
    Null,
    /// Whole number
    Integer(i64),
    /// Non-integral number
    Float(f64),
    /// Boolean
    Bool(bool),
    /// Text
    Text(String),
    /// Calendar date (timestamps at midnight collapse to this)
    Date(NaiveDate),
    /// Timestamp without time zone
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Check if the value is SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    /// Get the text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get the integer content, if this is an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CellValue::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Text(s) => write!(f, "'{}'", s),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Integer(i64::from(value))
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Null)
    }
}

/// One normalized spreadsheet row
///
/// Field order follows the source sheet's column order. Column names are unique;
/// inserting an existing name replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, CellValue)>,
}

impl Row {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Builder-style insert, handy in tests and fixtures
    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Get a field's value
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Get a mutable reference to a field's value
    pub fn get_mut(&mut self, column: &str) -> Option<&mut CellValue> {
        self.fields
            .iter_mut()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, column: &str) -> Option<CellValue> {
        let index = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(index).1)
    }

    /// Rename a field, keeping its position
    ///
    /// Returns false if `from` is absent. If `to` already exists, the renamed
    /// field replaces it.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        let Some(index) = self.fields.iter().position(|(name, _)| name == from) else {
            return false;
        };
        if from == to {
            return true;
        }
        if let Some(existing) = self.fields.iter().position(|(name, _)| name == to) {
            let value = self.fields.remove(index).1;
            let target = if existing > index { existing - 1 } else { existing };
            self.fields[target].1 = value;
        } else {
            self.fields[index].0 = to.to_string();
        }
        true
    }

    /// Column names in order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Values in column order
    pub fn values(&self) -> impl Iterator<Item = &CellValue> {
        self.fields.iter().map(|(_, value)| value)
    }

    /// Iterate over `(column, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &CellValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, value)?;
        }
        write!(f, "}}")
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
