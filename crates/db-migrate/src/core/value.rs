//! SQL value types for database-agnostic data transfer.
//!
//! Rows travel between drivers as vectors of [`SqlValue`] grouped into a
//! [`Batch`], one batch per copy chunk.

use std::borrow::Cow;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::schema::PkValue;

/// Timestamp layout used when a temporal value is written as text.
pub const DATETIME_TEXT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// SQL value enum for type-safe row handling.
///
/// Uses `Cow` for string and byte data so readers can hand out borrowed
/// slices; batches always hold the owned `'static` form.
///
/// # Example
///
/// ```rust
/// use std::borrow::Cow;
/// use db_migrate::core::SqlValue;
///
/// let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
/// let owned: SqlValue<'static> = borrowed.into_owned();
/// assert_eq!(owned.to_text().as_deref(), Some("hello"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue<'a> {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint).
    I16(i16),

    /// 32-bit signed integer (int).
    I32(i32),

    /// 64-bit signed integer (bigint).
    I64(i64),

    /// 32-bit floating point (real/float4).
    F32(f32),

    /// 64-bit floating point (double precision/float8).
    F64(f64),

    /// Text/string data.
    Text(Cow<'a, str>),

    /// Binary data.
    Bytes(Cow<'a, [u8]>),

    /// UUID value.
    Uuid(Uuid),

    /// Decimal value with arbitrary precision.
    Decimal(Decimal),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),

    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),
}

impl<'a> SqlValue<'a> {
    /// Convert to a fully owned value with `'static` lifetime.
    #[must_use]
    pub fn into_owned(self) -> SqlValue<'static> {
        match self {
            SqlValue::Null => SqlValue::Null,
            SqlValue::Bool(v) => SqlValue::Bool(v),
            SqlValue::I16(v) => SqlValue::I16(v),
            SqlValue::I32(v) => SqlValue::I32(v),
            SqlValue::I64(v) => SqlValue::I64(v),
            SqlValue::F32(v) => SqlValue::F32(v),
            SqlValue::F64(v) => SqlValue::F64(v),
            SqlValue::Text(v) => SqlValue::Text(Cow::Owned(v.into_owned())),
            SqlValue::Bytes(v) => SqlValue::Bytes(Cow::Owned(v.into_owned())),
            SqlValue::Uuid(v) => SqlValue::Uuid(v),
            SqlValue::Decimal(v) => SqlValue::Decimal(v),
            SqlValue::DateTime(v) => SqlValue::DateTime(v),
            SqlValue::DateTimeOffset(v) => SqlValue::DateTimeOffset(v),
            SqlValue::Date(v) => SqlValue::Date(v),
            SqlValue::Time(v) => SqlValue::Time(v),
        }
    }

    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Render the value as the text a database accepts for it in a string
    /// context. NULL renders as `None`; bytes render as lowercase hex.
    #[must_use]
    pub fn to_text(&self) -> Option<Cow<'_, str>> {
        Some(match self {
            SqlValue::Null => return None,
            SqlValue::Bool(v) => Cow::Borrowed(if *v { "1" } else { "0" }),
            SqlValue::I16(v) => Cow::Owned(v.to_string()),
            SqlValue::I32(v) => Cow::Owned(v.to_string()),
            SqlValue::I64(v) => Cow::Owned(v.to_string()),
            SqlValue::F32(v) => Cow::Owned(v.to_string()),
            SqlValue::F64(v) => Cow::Owned(v.to_string()),
            SqlValue::Text(v) => Cow::Borrowed(v.as_ref()),
            SqlValue::Bytes(v) => Cow::Owned(hex::encode(v)),
            SqlValue::Uuid(v) => Cow::Owned(v.to_string()),
            SqlValue::Decimal(v) => Cow::Owned(v.to_string()),
            SqlValue::DateTime(v) => Cow::Owned(v.format(DATETIME_TEXT_FORMAT).to_string()),
            SqlValue::DateTimeOffset(v) => Cow::Owned(v.to_rfc3339()),
            SqlValue::Date(v) => Cow::Owned(v.format("%Y-%m-%d").to_string()),
            SqlValue::Time(v) => Cow::Owned(v.format("%H:%M:%S%.f").to_string()),
        })
    }
}

impl From<bool> for SqlValue<'static> {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue<'static> {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue<'static> {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue<'static> {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue<'static> {
    fn from(v: String) -> Self {
        SqlValue::Text(Cow::Owned(v))
    }
}

impl<'a> From<&'a str> for SqlValue<'a> {
    fn from(v: &'a str) -> Self {
        SqlValue::Text(Cow::Borrowed(v))
    }
}

impl From<Vec<u8>> for SqlValue<'static> {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(Cow::Owned(v))
    }
}

impl<T> From<Option<T>> for SqlValue<'static>
where
    T: Into<SqlValue<'static>>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// A batch of rows read in one chunk.
#[derive(Debug, Default)]
pub struct Batch {
    /// Rows in this batch, in table column order.
    pub rows: Vec<Vec<SqlValue<'static>>>,

    /// Key of the last row, for keyset pagination continuity.
    pub last_key: Option<PkValue>,

    /// Whether the read returned fewer rows than requested.
    pub is_last: bool,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Vec<SqlValue<'static>>>) -> Self {
        Self {
            rows,
            last_key: None,
            is_last: false,
        }
    }

    /// Build a batch from rows read with `limit`, taking the cursor from the
    /// key column at `key_idx` of the last row.
    pub fn from_rows(rows: Vec<Vec<SqlValue<'static>>>, key_idx: Option<usize>, limit: usize) -> Self {
        let last_key = key_idx.and_then(|idx| {
            rows.last()
                .and_then(|row| row.get(idx))
                .and_then(PkValue::from_sql_value)
        });
        let is_last = rows.len() < limit;
        Self {
            rows,
            last_key,
            is_last,
        }
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_into_owned() {
        let borrowed: SqlValue<'_> = SqlValue::Text(Cow::Borrowed("hello"));
        let owned: SqlValue<'static> = borrowed.into_owned();
        assert_eq!(owned, SqlValue::Text(Cow::Owned("hello".to_string())));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(SqlValue::Null.to_text(), None);
        assert_eq!(SqlValue::Bool(true).to_text().as_deref(), Some("1"));
        assert_eq!(SqlValue::Bytes(Cow::Owned(vec![0xde, 0xad])).to_text().as_deref(), Some("dead"));
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .map(SqlValue::DateTime);
        assert_eq!(
            dt.as_ref().and_then(|v| v.to_text()).as_deref(),
            Some("2024-03-01 12:30:00")
        );
    }

    #[test]
    fn test_batch_from_rows_tracks_last_key() {
        let batch = Batch::from_rows(
            vec![
                vec![SqlValue::I64(1), SqlValue::from("a".to_string())],
                vec![SqlValue::I64(2), SqlValue::from("b".to_string())],
            ],
            Some(0),
            10,
        );
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.last_key, Some(PkValue::Int(2)));
        assert!(batch.is_last);
    }

    #[test]
    fn test_batch_full_read_is_not_last() {
        let batch = Batch::from_rows(vec![vec![SqlValue::I32(5)]], None, 1);
        assert!(!batch.is_last);
        assert!(batch.last_key.is_none());
        assert!(Batch::default().is_empty());
    }

    #[test]
    fn test_option_into_null() {
        let v: SqlValue<'static> = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: SqlValue<'static> = Some(3i64).into();
        assert_eq!(v, SqlValue::I64(3));
    }
}
