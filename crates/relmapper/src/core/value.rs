//! Scalar values, records, and primary keys.
//!
//! [`SqlValue`] is the one scalar model shared by reads and writes. It binds
//! to statement parameters through [`ToSql`] and decodes result columns
//! through [`FromSql`], coercing form-style text into the parameter's real
//! type at bind time (so `"5"` binds to an `integer` and `"true"` to a
//! `boolean`).
//!
//! [`Record`] is an insertion-ordered, string-keyed map of values: one per
//! row read, or one per submitted form.

use std::error::Error;
use std::fmt;

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A single scalar column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    /// Any integer width (smallint, integer, bigint, serial variants).
    Int(i64),
    /// real / double precision.
    Float(f64),
    /// numeric / decimal.
    Decimal(Decimal),
    /// Text, varchar, char, and enum labels.
    Text(String),
    /// bytea.
    Bytes(Vec<u8>),
    Uuid(Uuid),
    /// Timestamp without time zone.
    Timestamp(NaiveDateTime),
    /// Timestamp with time zone, normalized to UTC.
    TimestampTz(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(serde_json::Value),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Whether this is a text value that is empty after trimming.
    ///
    /// Blank text is what an untouched form field submits.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        matches!(self, SqlValue::Text(s) if s.trim().is_empty())
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view, parsing text when needed.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
            SqlValue::Decimal(d) if d.fract().is_zero() => d.to_string().parse().ok(),
            _ => None,
        }
    }

    /// Boolean view, accepting the literals PostgreSQL and HTML forms produce.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Int(0) => Some(false),
            SqlValue::Int(1) => Some(true),
            SqlValue::Text(s) => parse_bool_literal(s),
            _ => None,
        }
    }

    /// Decimal view, parsing text when needed.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SqlValue::Int(v) => Some(Decimal::from(*v)),
            SqlValue::Float(v) => Decimal::try_from(*v).ok(),
            SqlValue::Decimal(v) => Some(*v),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(
            self,
            SqlValue::Int(_) | SqlValue::Float(_) | SqlValue::Decimal(_)
        )
    }

    /// Compare a submitted value with a stored one.
    ///
    /// Submitted values usually arrive as text while stored values are typed,
    /// so booleans compare by truth value, numerics compare numerically when
    /// either side is numeric, and everything else compares by its text form.
    #[must_use]
    pub fn loosely_equals(&self, other: &SqlValue) -> bool {
        match (self, other) {
            (SqlValue::Null, SqlValue::Null) => true,
            (SqlValue::Null, _) | (_, SqlValue::Null) => false,
            (SqlValue::Bool(a), b) | (b, SqlValue::Bool(a)) => b.as_bool() == Some(*a),
            (a, b) if a.is_numeric() || b.is_numeric() => match (a.as_decimal(), b.as_decimal()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            (a, b) => a.to_string() == b.to_string(),
        }
    }
}

/// Parse a boolean literal as PostgreSQL accepts it (plus `on`/`off` from forms).
pub fn parse_bool_literal(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Some(true),
        "f" | "false" | "0" | "n" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => Ok(()),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::Float(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => write!(f, "\\x{}", hex::encode(v)),
            SqlValue::Uuid(v) => write!(f, "{}", v),
            SqlValue::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::TimestampTz(v) => f.write_str(&v.to_rfc3339()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::Json(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SqlValue::Null => serializer.serialize_none(),
            SqlValue::Bool(v) => serializer.serialize_bool(*v),
            SqlValue::Int(v) => serializer.serialize_i64(*v),
            SqlValue::Float(v) => serializer.serialize_f64(*v),
            SqlValue::Json(v) => v.serialize(serializer),
            other => serializer.collect_str(other),
        }
    }
}

// ===== Parameter binding =====

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) if *ty == Type::BOOL => v.to_sql(ty, out),
            SqlValue::Int(v) => int_to_sql(*v, ty, out),
            SqlValue::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => v.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
                _ => text_to_sql(&v.to_string(), ty, out),
            },
            SqlValue::Decimal(v) if *ty == Type::NUMERIC => v.to_sql(ty, out),
            SqlValue::Uuid(v) if *ty == Type::UUID => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
            SqlValue::Json(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) if *ty == Type::BYTEA => v.as_slice().to_sql(ty, out),
            SqlValue::Text(s) => text_to_sql(s, ty, out),
            other => text_to_sql(&other.to_string(), ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        _ => text_to_sql(&v.to_string(), ty, out),
    }
}

/// Bind text to a parameter of any type, parsing it when the type is not textual.
fn text_to_sql(s: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BOOL => parse_bool_literal(s)
            .ok_or_else(|| format!("invalid boolean literal '{}'", s))?
            .to_sql(ty, out),
        Type::INT2 => s.trim().parse::<i16>()?.to_sql(ty, out),
        Type::INT4 => s.trim().parse::<i32>()?.to_sql(ty, out),
        Type::INT8 => s.trim().parse::<i64>()?.to_sql(ty, out),
        Type::FLOAT4 => s.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => s.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::UUID => Uuid::parse_str(s.trim())?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?.to_sql(ty, out),
        Type::TIMESTAMP => parse_naive_timestamp(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(ts) => ts.with_timezone(&Utc).to_sql(ty, out),
            Err(_) => parse_naive_timestamp(s)?.and_utc().to_sql(ty, out),
        },
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::BYTEA => match s.strip_prefix("\\x") {
            Some(digits) => hex::decode(digits.trim())?.as_slice().to_sql(ty, out),
            None => s.as_bytes().to_sql(ty, out),
        },
        _ if <&str as ToSql>::accepts(ty) => <&str as ToSql>::to_sql(&s, ty, out),
        // Enum labels and other text-encoded types travel as raw UTF-8.
        _ => {
            out.extend_from_slice(s.as_bytes());
            Ok(IsNull::No)
        }
    }
}

fn parse_naive_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    Err(format!("invalid timestamp literal '{}'", s).into())
}

// ===== Result decoding =====

impl<'a> FromSql<'a> for SqlValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        let value = match *ty {
            Type::BOOL => SqlValue::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => SqlValue::Int(i16::from_sql(ty, raw)?.into()),
            Type::INT4 => SqlValue::Int(i32::from_sql(ty, raw)?.into()),
            Type::INT8 => SqlValue::Int(i64::from_sql(ty, raw)?),
            Type::OID => SqlValue::Int(u32::from_sql(ty, raw)?.into()),
            Type::FLOAT4 => SqlValue::Float(f32::from_sql(ty, raw)?.into()),
            Type::FLOAT8 => SqlValue::Float(f64::from_sql(ty, raw)?),
            Type::NUMERIC => SqlValue::Decimal(Decimal::from_sql(ty, raw)?),
            Type::UUID => SqlValue::Uuid(Uuid::from_sql(ty, raw)?),
            Type::TIMESTAMP => SqlValue::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
            Type::TIMESTAMPTZ => SqlValue::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
            Type::DATE => SqlValue::Date(NaiveDate::from_sql(ty, raw)?),
            Type::TIME => SqlValue::Time(NaiveTime::from_sql(ty, raw)?),
            Type::JSON | Type::JSONB => SqlValue::Json(serde_json::Value::from_sql(ty, raw)?),
            Type::BYTEA => SqlValue::Bytes(raw.to_vec()),
            _ if <String as FromSql>::accepts(ty) || matches!(ty.kind(), Kind::Enum(_)) => {
                SqlValue::Text(std::str::from_utf8(raw)?.to_owned())
            }
            // Projections cast these to text; see `ColumnDescriptor::decodes_natively`.
            _ => return Err(format!("unsupported column type '{}'", ty.name()).into()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, BoxError> {
        Ok(SqlValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

// ===== Conversions =====

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::TimestampTz(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

impl From<PkValue> for SqlValue {
    fn from(v: PkValue) -> Self {
        match v {
            PkValue::Int(i) => SqlValue::Int(i),
            PkValue::Uuid(u) => SqlValue::Uuid(u),
            PkValue::String(s) => SqlValue::Text(s),
        }
    }
}

/// One row: column name to value, in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, SqlValue>);

impl Record {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(IndexMap::with_capacity(capacity))
    }

    /// Insert or replace a value, keeping the original position on replace.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Option<SqlValue> {
        self.0.insert(column.into(), value.into())
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<SqlValue> {
        self.0.shift_remove(column)
    }

    pub fn contains_key(&self, column: &str) -> bool {
        self.0.contains_key(column)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(SqlValue::as_bool)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, SqlValue);
    type IntoIter = indexmap::map::IntoIter<String, SqlValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Represents a primary key value of various types.
///
/// Hashable, so entity assembly can key in-progress entities by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PkValue {
    /// Integer primary key (smallint, integer, bigint, serial variants).
    Int(i64),
    /// UUID primary key.
    Uuid(Uuid),
    /// Text primary key.
    String(String),
}

impl PkValue {
    /// Extract a key from a column value, keeping the value's own type.
    /// NULL and non-key types yield `None`.
    pub fn from_value(value: &SqlValue) -> Option<Self> {
        match value {
            SqlValue::Int(v) => Some(PkValue::Int(*v)),
            SqlValue::Uuid(v) => Some(PkValue::Uuid(*v)),
            SqlValue::Text(s) => Some(PkValue::String(s.clone())),
            _ => None,
        }
    }

    /// Parse a key submitted as text (a form field or URL segment): integers
    /// become `Int`, UUIDs become `Uuid`, anything else stays text.
    pub fn parse_input(input: &str) -> Self {
        let trimmed = input.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return PkValue::Int(v);
        }
        match Uuid::parse_str(trimmed) {
            Ok(v) => PkValue::Uuid(v),
            Err(_) => PkValue::String(input.to_string()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PkValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(v) => write!(f, "{}", v),
            PkValue::Uuid(v) => write!(f, "{}", v),
            PkValue::String(v) => f.write_str(v),
        }
    }
}

impl From<i64> for PkValue {
    fn from(v: i64) -> Self {
        PkValue::Int(v)
    }
}

impl From<i32> for PkValue {
    fn from(v: i32) -> Self {
        PkValue::Int(v as i64)
    }
}

impl From<Uuid> for PkValue {
    fn from(v: Uuid) -> Self {
        PkValue::Uuid(v)
    }
}

impl From<String> for PkValue {
    fn from(v: String) -> Self {
        PkValue::String(v)
    }
}

impl From<&str> for PkValue {
    fn from(v: &str) -> Self {
        PkValue::String(v.to_string())
    }
}
