//! Column values exchanged with the database

use chrono::{NaiveDateTime, Utc};
use sqlx::{
    Any, Row,
    any::{AnyArguments, AnyRow},
    query::Query,
};

use crate::error::RecordError;

/// Storage format for timestamps; sorts lexicographically
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Read as nullable text
    pub fn into_text(self, column: &str) -> Result<Option<String>, RecordError> {
        match self {
            Value::Null => Ok(None),
            Value::Text(text) => Ok(Some(text)),
            Value::Int(v) => Ok(Some(v.to_string())),
            _ => Err(mismatch(column, "text")),
        }
    }

    /// Read as non-null text
    pub fn into_string(self, column: &str) -> Result<String, RecordError> {
        self.into_text(column)?.ok_or_else(|| mismatch(column, "non-null text"))
    }

    /// Read as a flag; accepts the spellings HTML forms and SQLite produce
    pub fn into_bool(self, column: &str) -> Result<bool, RecordError> {
        match self {
            Value::Bool(v) => Ok(v),
            Value::Int(v) => Ok(v != 0),
            Value::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => Ok(true),
                "0" | "false" | "off" | "no" | "" => Ok(false),
                _ => Err(mismatch(column, "boolean")),
            },
            _ => Err(mismatch(column, "boolean")),
        }
    }

    /// Read as a nullable timestamp
    pub fn into_timestamp(self, column: &str) -> Result<Option<NaiveDateTime>, RecordError> {
        match self {
            Value::Null => Ok(None),
            Value::Timestamp(at) => Ok(Some(at)),
            Value::Text(text) => parse_timestamp(&text)
                .map(Some)
                .ok_or_else(|| mismatch(column, "timestamp")),
            _ => Err(mismatch(column, "timestamp")),
        }
    }

    /// Plain JSON rendering used by record serialization
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(v) => serde_json::Value::Bool(*v),
            Value::Int(v) => serde_json::Value::from(*v),
            Value::Text(v) => serde_json::Value::String(v.clone()),
            Value::Timestamp(at) => serde_json::Value::String(format_timestamp(at)),
        }
    }
}

fn mismatch(column: &str, expected: &'static str) -> RecordError {
    RecordError::TypeMismatch {
        column: column.to_string(),
        expected,
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Current UTC time truncated to whole seconds
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

pub fn format_timestamp(at: &NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).ok()
}

/// Bind a value as the next positional parameter
pub fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: Value,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(v),
        Value::Int(v) => query.bind(v),
        Value::Text(v) => query.bind(v),
        Value::Timestamp(at) => query.bind(format_timestamp(&at)),
    }
}

/// Typed column readers for hydrating records from rows.
///
/// Booleans come back as `BOOLEAN` from PostgreSQL and as integers from
/// SQLite; both are accepted.
pub mod read {
    use super::*;

    pub fn int(row: &AnyRow, column: &str) -> Result<i64, sqlx::Error> {
        row.try_get::<i64, _>(column)
    }

    pub fn text(row: &AnyRow, column: &str) -> Result<String, sqlx::Error> {
        row.try_get::<String, _>(column)
    }

    pub fn opt_text(row: &AnyRow, column: &str) -> Result<Option<String>, sqlx::Error> {
        row.try_get::<Option<String>, _>(column)
    }

    pub fn flag(row: &AnyRow, column: &str) -> Result<bool, sqlx::Error> {
        row.try_get::<bool, _>(column)
            .or_else(|_| row.try_get::<i64, _>(column).map(|v| v != 0))
    }

    pub fn opt_timestamp(row: &AnyRow, column: &str) -> Result<Option<NaiveDateTime>, sqlx::Error> {
        match opt_text(row, column)? {
            Some(text) => parse_timestamp(&text).map(Some).ok_or_else(|| {
                sqlx::Error::ColumnDecode {
                    index: column.to_string(),
                    source: format!("invalid timestamp '{text}'").into(),
                }
            }),
            None => Ok(None),
        }
    }
}
