use crate::charset::Charset;
use thiserror::Error as ThisError;

///
/// BitIoError
///
/// Failures raised by the bit streams and the bounded integer fields.
/// `EndOfStream` and `Incomplete` are deliberately distinct: the first means
/// nothing was left to read, the second that a read was cut short.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum BitIoError {
    #[error("end of stream reached")]
    EndOfStream,

    #[error("incomplete read: requested {requested} bits but only {available} available")]
    Incomplete { requested: usize, available: usize },

    #[error("unsupported integer width of {bits} bits: {reason}")]
    InvalidWidth { bits: u32, reason: &'static str },

    #[error("value {value} does not fit in a {kind} field of {bits} bits")]
    ValueOutOfRange {
        value: String,
        bits: u32,
        kind: &'static str,
    },

    #[error("value {value} is outside of the range [{low}, {high}]")]
    RangeViolation { value: i128, low: i64, high: i64 },

    #[error("invalid integer range: [{low}, {high}]")]
    InvalidRange { low: i128, high: i128 },

    #[error("invalid {charset} string data: {reason}")]
    InvalidString { charset: Charset, reason: String },

    #[error("bit length {len} exceeds backing buffer of {bytes} bytes")]
    InvalidLength { len: usize, bytes: usize },
}

impl BitIoError {
    /// Whether the stream ran dry (cleanly or mid-read).
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::EndOfStream | Self::Incomplete { .. })
    }

    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self, Self::Incomplete { .. })
    }

    pub(crate) fn out_of_range(value: impl ToString, bits: u32, signed: bool) -> Self {
        Self::ValueOutOfRange {
            value: value.to_string(),
            bits,
            kind: if signed { "signed" } else { "unsigned" },
        }
    }
}
