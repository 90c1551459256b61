//! Typed result values keyed by variable name.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One column value, typed from the result metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Integer(i64),
    Double(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    Null,
}

impl SqlValue {
    pub fn text(value: impl Into<String>) -> Self {
        SqlValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Double(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v.to_rfc3339()),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Null => Ok(()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Double(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

/// Ordered value lists per variable name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Values {
    values: BTreeMap<String, Vec<SqlValue>>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_value(&mut self, name: &str, value: SqlValue) {
        self.values.entry(name.to_string()).or_default().push(value);
    }

    /// Make sure `name` is present, with an empty list if it has no value yet.
    pub fn declare(&mut self, name: &str) {
        self.values.entry(name.to_string()).or_default();
    }

    pub fn get(&self, name: &str) -> Option<&[SqlValue]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// First value of `name` rendered as text.
    pub fn first_text(&self, name: &str) -> Option<String> {
        self.get(name).and_then(|v| v.first()).map(ToString::to_string)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SqlValue])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Append every list of `other` to the matching list here.
    pub fn merge(&mut self, other: Values) {
        for (name, mut list) in other.values {
            self.values.entry(name).or_default().append(&mut list);
        }
    }
}
