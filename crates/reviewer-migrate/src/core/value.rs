//! Value types exchanged with a store.
//!
//! [`Value`] is what cursors hand back for a single cell. [`Identifier`] is the
//! hashable subset of values that may key an identifier map (integer object
//! ids, GUIDs and the occasional text key).

use std::cmp::Ordering;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::identifier::{format_guid, parse_guid};
use crate::geometry::Geometry;

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    Null,

    /// Any integer type (object id, short, long).
    Int(i64),

    /// Single or double precision float.
    Double(f64),

    /// Text.
    Text(String),

    /// GUID / GlobalID.
    Guid(Uuid),

    /// Date (timestamps without zone, as the vendor stores them).
    Date(NaiveDateTime),

    /// Binary blob.
    Blob(Vec<u8>),

    /// Feature geometry.
    Geometry(Geometry),
}

/// One row as returned by a search cursor, ordered like the requested fields.
pub type Row = Vec<Value>;

impl Value {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, if it has one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text view of the value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The geometry held by this value, if any.
    #[must_use]
    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Value::Geometry(g) => Some(g),
            _ => None,
        }
    }

    /// Convert to an identifier. NULL, floats, blobs and geometry are not keys.
    #[must_use]
    pub fn to_identifier(&self) -> Option<Identifier> {
        Identifier::from_value(self)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    fn as_guid(&self) -> Option<Uuid> {
        match self {
            Value::Guid(g) => Some(*g),
            Value::Text(s) => parse_guid(s),
            _ => None,
        }
    }

    /// Compare two values the way a store compares a column to a literal.
    ///
    /// Literals parsed from filter text are integers, floats or strings, so a
    /// text literal is coerced to the column's kind (GUID, date, number) before
    /// comparing. Returns `None` when the values are not comparable; NULL is
    /// never comparable.
    #[must_use]
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Double(_), _) | (_, Value::Int(_) | Value::Double(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::Guid(_), _) | (_, Value::Guid(_)) => {
                Some(self.as_guid()?.cmp(&other.as_guid()?))
            }
            (Value::Date(_), _) | (_, Value::Date(_)) => {
                Some(self.as_date()?.cmp(&other.as_date()?))
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Guid(v) => f.write_str(&format_guid(v)),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
            Value::Blob(v) => write!(f, "<blob {} bytes>", v.len()),
            Value::Geometry(g) => write!(f, "<{}>", g.kind()),
        }
    }
}

fn parse_date(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<Geometry> for Value {
    fn from(v: Geometry) -> Self {
        Value::Geometry(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Key of an identifier map: a record id, link id, check run id, etc.
///
/// Text that parses as a GUID is normalized to [`Identifier::Guid`] so that
/// `{ABC...}` stored as text and the same GUID stored natively collide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    /// Integer identifier (object id, RECORDID, SESSIONID).
    Int(i64),
    /// GUID identifier.
    Guid(Uuid),
    /// Any other text identifier.
    Text(String),
}

impl Identifier {
    /// Build an identifier from a cell value. Blank text is not a key.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(Identifier::Int(*v)),
            Value::Guid(v) => Some(Identifier::Guid(*v)),
            Value::Text(s) if s.trim().is_empty() => None,
            Value::Text(s) => Some(match parse_guid(s) {
                Some(g) => Identifier::Guid(g),
                None => Identifier::Text(s.clone()),
            }),
            _ => None,
        }
    }

    /// Mint a fresh random GUID identifier.
    #[must_use]
    pub fn new_guid() -> Self {
        Identifier::Guid(Uuid::new_v4())
    }

    /// Convert back to a cell value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Identifier::Int(v) => Value::Int(*v),
            Identifier::Guid(v) => Value::Guid(*v),
            Identifier::Text(v) => Value::Text(v.clone()),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(v) => write!(f, "{}", v),
            Identifier::Guid(v) => f.write_str(&format_guid(v)),
            Identifier::Text(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Identifier {
    fn from(v: i64) -> Self {
        Identifier::Int(v)
    }
}

impl From<Uuid> for Identifier {
    fn from(v: Uuid) -> Self {
        Identifier::Guid(v)
    }
}
