//! Conversion of raw source fields into typed [`Value`]s.
//!
//! Nothing in here fails: malformed input falls through to the next candidate
//! type and finally to the trimmed text (or NULL / the numeric fallback for
//! typed columns).

use crate::models::Value;
use chrono::NaiveDate;

/// Marker used by the UCS database for missing values.
pub const NULL_MARKER: &str = "N/A";

/// Accepted date layouts, tried in order. `%y` must come before `%Y` so that
/// `03/04/21` reads as 2021 and not as the year 21.
pub const DATE_FORMATS: &[&str] = &["%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%Y-%m-%d"];

/// Column type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Float,
    Date,
    /// Single character flag column: non-blank means set.
    Flag,
}

impl FieldKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Integer | FieldKind::Flag => "INTEGER",
            FieldKind::Float => "REAL",
            FieldKind::Date => "DATE",
        }
    }
}

/// What a typed numeric column holds when its raw text is not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericFallback {
    #[default]
    Null,
    /// `-1`, as written by the historical SATCAT importer.
    LegacySentinel,
}

impl NumericFallback {
    fn value(&self, kind: FieldKind) -> Value {
        match (self, kind) {
            (NumericFallback::Null, _) => Value::Null,
            (NumericFallback::LegacySentinel, FieldKind::Float) => Value::Float(-1.0),
            (NumericFallback::LegacySentinel, _) => Value::Integer(-1),
        }
    }
}

/// Untyped normalization: NULL markers, then integer, float, date and finally text.
pub fn normalize(raw: &str) -> Value {
    let trimmed = raw.trim();
    if is_null_marker(trimmed) {
        return Value::Null;
    }
    if let Some(v) = parse_integer(trimmed) {
        return Value::Integer(v);
    }
    if let Some(v) = parse_float(trimmed) {
        return Value::Float(v);
    }
    if let Some(d) = parse_date(trimmed) {
        return Value::Date(d);
    }
    Value::Text(trimmed.to_string())
}

/// Typed normalization for a column of known kind.
pub fn coerce(raw: &str, kind: FieldKind, fallback: NumericFallback) -> Value {
    let trimmed = raw.trim();
    match kind {
        FieldKind::Flag => Value::Integer(if trimmed.is_empty() { 0 } else { 1 }),
        _ if is_null_marker(trimmed) => match kind {
            FieldKind::Integer | FieldKind::Float => fallback.value(kind),
            _ => Value::Null,
        },
        FieldKind::Text => Value::Text(trimmed.to_string()),
        FieldKind::Integer => parse_integer(trimmed)
            .map(Value::Integer)
            .unwrap_or_else(|| fallback.value(kind)),
        FieldKind::Float => parse_float(trimmed)
            .map(Value::Float)
            .unwrap_or_else(|| fallback.value(kind)),
        FieldKind::Date => parse_date(trimmed).map(Value::Date).unwrap_or(Value::Null),
    }
}

fn is_null_marker(trimmed: &str) -> bool {
    trimmed.is_empty() || trimmed == NULL_MARKER
}

fn parse_integer(s: &str) -> Option<i64> {
    let cleaned = s.replace(',', "");
    cleaned.parse::<i64>().ok()
}

fn parse_float(s: &str) -> Option<f64> {
    let cleaned = s.replace(',', "");
    // rejects "inf", "NaN" and friends, which are names rather than numbers here
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
