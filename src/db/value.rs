//! Statement parameters and result rows.
//!
//! [`SqlValue`] is the closed set of values the layer can bind or decode.
//! [`Record`] is an insertion-ordered column → value mapping used for insert
//! and update payloads, where clauses and fetched rows alike.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A single bindable or decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Any integer column (`INT2`, `INT4`, `INT8`).
    Int(i64),
    /// Floating point column.
    Float(f64),
    /// Text, varchar and enum labels.
    Text(String),
    /// Timestamp, normalized to UTC.
    Timestamp(DateTime<Utc>),
    /// UUID.
    Uuid(Uuid),
    /// `JSON` / `JSONB`.
    Json(serde_json::Value),
}

impl SqlValue {
    /// Returns `true` for [`SqlValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    fn kind(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Bool(_) => "bool",
            SqlValue::Int(_) => "integer",
            SqlValue::Float(_) => "float",
            SqlValue::Text(_) => "text",
            SqlValue::Timestamp(_) => "timestamp",
            SqlValue::Uuid(_) => "uuid",
            SqlValue::Json(_) => "json",
        }
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Enums stored as their label.
///
/// Implementors map each variant to the raw value the column holds, so
/// payload normalization never has to guess how to unwrap a tagged value.
pub trait SqlEnum: Sized {
    /// Raw label written to the column.
    fn as_sql_str(&self) -> &'static str;

    /// Parses a stored label.
    fn from_sql_str(raw: &str) -> Option<Self>;
}

/// Conversion from a decoded [`SqlValue`] into a Rust type.
pub trait FromSqlValue: Sized {
    /// Converts `value`; the error message names the mismatch.
    fn from_sql_value(value: &SqlValue) -> Result<Self, String>;
}

fn mismatch(expected: &str, value: &SqlValue) -> String {
    format!("expected {}, found {}", expected, value.kind())
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Bool(b) => Ok(*b),
            other => Err(mismatch("bool", other)),
        }
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Int(i) => Ok(*i),
            other => Err(mismatch("integer", other)),
        }
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        let wide = i64::from_sql_value(value)?;
        i32::try_from(wide).map_err(|_| format!("integer {} does not fit in i32", wide))
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Float(f) => Ok(*f),
            SqlValue::Int(i) => Ok(*i as f64),
            other => Err(mismatch("float", other)),
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Text(s) => Ok(s.clone()),
            other => Err(mismatch("text", other)),
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Timestamp(ts) => Ok(*ts),
            other => Err(mismatch("timestamp", other)),
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Uuid(id) => Ok(*id),
            SqlValue::Text(s) => Uuid::parse_str(s).map_err(|e| e.to_string()),
            other => Err(mismatch("uuid", other)),
        }
    }
}

impl FromSqlValue for serde_json::Value {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Json(v) => Ok(v.clone()),
            other => Err(mismatch("json", other)),
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &SqlValue) -> Result<Self, String> {
        match value {
            SqlValue::Null => Ok(None),
            other => T::from_sql_value(other).map(Some),
        }
    }
}

/// Insertion-ordered column → value mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, SqlValue)>,
}

/// A fetched row: column names in result order.
pub type Row = Record;

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record with room for `capacity` columns.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Builder-style [`Record::insert`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets `column`. An existing column keeps its position.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Returns the raw value of `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Decodes `column` into `T`.
    ///
    /// # Errors
    /// Returns [`DbError::Decode`] if the column is missing or has another type.
    pub fn try_get<T: FromSqlValue>(&self, column: &str) -> DbResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| DbError::decode(column, "column not present in row"))?;
        T::from_sql_value(value).map_err(|message| DbError::decode(column, message))
    }

    /// Decodes an enum column stored as its label.
    ///
    /// # Errors
    /// Returns [`DbError::Decode`] for a missing column or an unknown label.
    pub fn try_get_enum<T: SqlEnum>(&self, column: &str) -> DbResult<T> {
        let raw: String = self.try_get(column)?;
        T::from_sql_str(&raw)
            .ok_or_else(|| DbError::decode(column, format!("unknown value `{}`", raw)))
    }

    /// Removes every `NULL` entry.
    #[must_use]
    pub fn without_nulls(mut self) -> Self {
        self.entries.retain(|(_, value)| !value.is_null());
        self
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Values in column order.
    pub fn values(&self) -> impl Iterator<Item = &SqlValue> {
        self.entries.iter().map(|(_, value)| value)
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when there are no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}
