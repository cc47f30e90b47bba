use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store-agnostic scalar bound into statements and read back from rows.
/// Timestamps travel as epoch milliseconds and booleans as 0/1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Integer(v.timestamp_millis())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Value::Null,
        }
    }
}

/// Named statement parameters. Names are bound without their `:` prefix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A result row keyed by lower-cased column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn from_columns<I, K>(columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: AsRef<str>,
    {
        Self {
            columns: columns
                .into_iter()
                .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(&column.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn required(&self, column: &str) -> Result<&Value, StoreError> {
        self.get(column)
            .ok_or_else(|| StoreError::Decode(format!("missing column '{column}'")))
    }

    fn mismatch(column: &str, expected: &str, actual: &Value) -> StoreError {
        StoreError::Decode(format!(
            "column '{column}' type mismatch: expected {expected}, got {}",
            actual.type_name()
        ))
    }

    pub fn text(&self, column: &str) -> Result<String, StoreError> {
        match self.required(column)? {
            Value::Text(s) => Ok(s.clone()),
            other => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Self::mismatch(column, "text", other)),
        }
    }

    pub fn i64(&self, column: &str) -> Result<i64, StoreError> {
        match self.required(column)? {
            Value::Integer(v) => Ok(*v),
            other => Err(Self::mismatch(column, "integer", other)),
        }
    }

    pub fn opt_i64(&self, column: &str) -> Result<Option<i64>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Integer(v)) => Ok(Some(*v)),
            Some(other) => Err(Self::mismatch(column, "integer", other)),
        }
    }

    pub fn i32(&self, column: &str) -> Result<i32, StoreError> {
        let raw = self.i64(column)?;
        i32::try_from(raw)
            .map_err(|_| StoreError::Decode(format!("column '{column}' out of range: {raw}")))
    }

    pub fn bool(&self, column: &str) -> Result<bool, StoreError> {
        Ok(self.opt_i64(column)?.unwrap_or(0) != 0)
    }

    pub fn opt_f64(&self, column: &str) -> Result<Option<f64>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Real(v)) => Ok(Some(*v)),
            Some(Value::Integer(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(Self::mismatch(column, "real", other)),
        }
    }

    pub fn opt_blob(&self, column: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match self.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Blob(v)) => Ok(Some(v.clone())),
            Some(other) => Err(Self::mismatch(column, "blob", other)),
        }
    }

    pub fn opt_datetime(&self, column: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        match self.opt_i64(column)? {
            None => Ok(None),
            Some(ms) => DateTime::from_timestamp_millis(ms)
                .map(Some)
                .ok_or_else(|| StoreError::Decode(format!("column '{column}' bad timestamp {ms}"))),
        }
    }

    pub fn datetime(&self, column: &str) -> Result<DateTime<Utc>, StoreError> {
        self.opt_datetime(column)?
            .ok_or_else(|| StoreError::Decode(format!("column '{column}' is null")))
    }
}

#[cfg(test)]
mod tests {
    use super::{Params, Row, Value};
    use chrono::{TimeZone, Utc};

    #[test]
    fn row_lookup_ignores_column_case() {
        let row = Row::from_columns([
            ("ID", Value::Text("7".into())),
            ("Rev", Value::Integer(3)),
        ]);
        assert_eq!(row.text("id").expect("id"), "7");
        assert_eq!(row.i32("REV").expect("rev"), 3);
        assert_eq!(row.opt_text("missing").expect("missing"), None);
    }

    #[test]
    fn row_reports_type_mismatch() {
        let row = Row::from_columns([("rev", Value::Text("x".into()))]);
        let err = row.i64("rev").expect_err("text is not an integer");
        assert!(err.to_string().contains("expected integer, got text"));
    }

    #[test]
    fn timestamps_round_trip_as_millis() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let params = Params::new().with("due", at);
        assert_eq!(
            params.get("due"),
            Some(&Value::Integer(at.timestamp_millis()))
        );
        let row = Row::from_columns([("due", Value::Integer(at.timestamp_millis()))]);
        assert_eq!(row.opt_datetime("due").expect("due"), Some(at));
    }

    #[test]
    fn optional_values_bind_as_null() {
        let params = Params::new()
            .with("owner", None::<String>)
            .with("exclusive", true);
        assert_eq!(params.get("owner"), Some(&Value::Null));
        assert_eq!(params.get("exclusive"), Some(&Value::Integer(1)));
    }
}
