use crate::record::ValueSet;
use derive_more::From;
use std::cmp::Ordering;
use time::{OffsetDateTime, UtcOffset};

///
/// Value
///
/// A single column value. Which variant is acceptable is decided by the
/// column the value is bound to.
///

#[derive(Clone, Debug, From)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    Time(OffsetDateTime),
    List(Vec<Value>),
    Record(ValueSet),
}

impl Value {
    /// Current time in UTC, truncated to whole milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::Time(truncate_to_millis(OffsetDateTime::now_utc()))
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Time(_) => "time",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_time(&self) -> Option<OffsetDateTime> {
        match self {
            Self::Time(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_record(&self) -> Option<&ValueSet> {
        match self {
            Self::Record(v) => Some(v),
            _ => None,
        }
    }

    /// Ordering between two values of the same scalar type.
    ///
    /// Integers and floats compare numerically with each other. Lists and
    /// nested records have no ordering.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

// Floats compare bit-for-bit and times compare instant and offset, so
// equality means "serializes identically".
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Bytes(a), Self::Bytes(b)) => a == b,
            (Self::Time(a), Self::Time(b)) => a == b && a.offset() == b.offset(),
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Record(a), Self::Record(b)) => a == b,
            _ => false,
        }
    }
}

pub(crate) fn truncate_to_millis(time: OffsetDateTime) -> OffsetDateTime {
    let nanos = time.unix_timestamp_nanos();
    let millis = nanos.div_euclid(1_000_000);

    OffsetDateTime::from_unix_timestamp_nanos(millis * 1_000_000)
        .map_or(time, |t| t.to_offset(time.offset()))
}

pub(crate) fn utc_offset_minutes(offset: UtcOffset) -> i64 {
    i64::from(offset.whole_seconds()) / 60
}

///
/// TESTS
///
