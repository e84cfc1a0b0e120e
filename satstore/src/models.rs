use crate::utils::fingerprint::Fingerprint;
use chrono::NaiveDate;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A typed field value of a catalog record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Converts a raw SQLite value back into a `Value`. Dates are stored as ISO text.
    pub fn from_sql_ref(value: ValueRef<'_>, is_date: bool) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(v) => Value::Integer(v),
            ValueRef::Real(v) => Value::Float(v),
            ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                let text = String::from_utf8_lossy(bytes).into_owned();
                if is_date {
                    if let Ok(date) = NaiveDate::parse_from_str(&text, "%Y-%m-%d") {
                        return Value::Date(date);
                    }
                }
                Value::Text(text)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Integer(v) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*v)),
            Value::Float(v) => ToSqlOutput::Owned(rusqlite::types::Value::Real(*v)),
            Value::Date(v) => {
                ToSqlOutput::Owned(rusqlite::types::Value::Text(v.format("%Y-%m-%d").to_string()))
            }
            Value::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// One normalized catalog entry (SATCAT or UCS).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub fields: BTreeMap<String, Value>,
    pub line_fingerprint: Fingerprint,
    pub natural_key: Value,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn has_natural_key(&self) -> bool {
        !self.natural_key.is_null()
    }
}

/// A row read back from a catalog table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRow {
    pub row_id: i64,
    pub line_fingerprint: String,
    pub import_timestamp: String,
    pub fields: BTreeMap<String, Value>,
}

/// Result of checking a record against the rows already stored.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Absent,
    /// The fingerprint is already stored. `stale_rows` are other rows under the
    /// same natural key, only collected when reconciling.
    PresentUnchanged { stale_rows: Vec<i64> },
    /// Same natural key, different fingerprint. Holds the row ids to supersede.
    PresentConflicting { stale_rows: Vec<i64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IngestMode {
    #[default]
    AppendOnly,
    ReconcileByKey,
}

impl IngestMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestMode::AppendOnly => "append-only",
            IngestMode::ReconcileByKey => "reconcile-by-key",
        }
    }
}

impl fmt::Display for IngestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append-only" | "append" => Ok(IngestMode::AppendOnly),
            "reconcile-by-key" | "reconcile" => Ok(IngestMode::ReconcileByKey),
            other => Err(format!("unknown ingest mode '{other}'")),
        }
    }
}

/// Counters of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub seen: usize,
    pub inserted: usize,
    pub unchanged: usize,
    pub duplicates: usize,
    /// Records dropped because a later line of the same input carries their natural key.
    pub replaced: usize,
    /// Stored rows deleted in favour of a newer record under the same key.
    pub superseded: usize,
    pub batches: usize,
}

// --- Catalog bookkeeping models ---

#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub run_id: i64,
    pub source: String,
    pub table_name: String,
    pub mode: String,
    pub file_fingerprint: Option<String>,
    pub start_time: i64, // Unix timestamp
    pub end_time: Option<i64>,
    pub status: String,
    pub details: String, // JSON string
}

/// Validated reference pages for one international designator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub obj_no: String,
    pub nssdc: Option<String>,
    pub celestrak: Option<String>,
    pub wikipedia: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_mode_parse() {
        assert_eq!("append-only".parse::<IngestMode>(), Ok(IngestMode::AppendOnly));
        assert_eq!("reconcile".parse::<IngestMode>(), Ok(IngestMode::ReconcileByKey));
        assert!("upsert".parse::<IngestMode>().is_err());
        assert_eq!(IngestMode::ReconcileByKey.to_string(), "reconcile-by-key");
    }

    #[test]
    fn test_value_from_sql_date() {
        let date = Value::from_sql_ref(ValueRef::Text(b"1957-10-04"), true);
        assert_eq!(date, Value::Date(NaiveDate::from_ymd_opt(1957, 10, 4).unwrap()));
        let text = Value::from_sql_ref(ValueRef::Text(b"1957-10-04"), false);
        assert_eq!(text, Value::Text("1957-10-04".to_string()));
    }
}
