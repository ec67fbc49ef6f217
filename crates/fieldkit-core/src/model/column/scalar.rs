use crate::{
    error::{Error, ErrorClass, ErrorOrigin},
    record::value::utc_offset_minutes,
};
use fieldkit_io::{BitReader, BitWriter, Charset, IntegerRange};
use time::{OffsetDateTime, UtcOffset, format_description::well_known::Rfc3339};

// ============================================================================
// IntegerColumn
// ============================================================================

///
/// IntegerColumn
///
/// Either a plain signed/unsigned field of a fixed width, or a range field
/// storing `value - low` in the fewest bits that cover `[low, high]`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct IntegerColumn {
    encoding: IntegerEncoding,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum IntegerEncoding {
    Sized { bits: u32, signed: bool },
    Ranged(IntegerRange),
}

impl IntegerColumn {
    pub const INT64: Self = Self {
        encoding: IntegerEncoding::Sized {
            bits: 64,
            signed: true,
        },
    };

    pub fn sized(bits: u32, signed: bool) -> Result<Self, String> {
        let max = if signed { 64 } else { 63 };
        if bits == 0 || bits > max {
            return Err(format!(
                "{} integer columns are 1 to {max} bits wide, not {bits}",
                if signed { "signed" } else { "unsigned" }
            ));
        }

        Ok(Self {
            encoding: IntegerEncoding::Sized { bits, signed },
        })
    }

    pub fn ranged(low: i64, high: i64) -> Result<Self, String> {
        let range = IntegerRange::new(low, high).map_err(|err| err.to_string())?;

        Ok(Self {
            encoding: IntegerEncoding::Ranged(range),
        })
    }

    #[must_use]
    pub const fn size(&self) -> u32 {
        match self.encoding {
            IntegerEncoding::Sized { bits, .. } => bits,
            IntegerEncoding::Ranged(range) => range.size(),
        }
    }

    #[must_use]
    pub const fn range(&self) -> Option<IntegerRange> {
        match self.encoding {
            IntegerEncoding::Ranged(range) => Some(range),
            IntegerEncoding::Sized { .. } => None,
        }
    }

    /// Inclusive bounds of acceptable values.
    #[must_use]
    pub const fn bounds(&self) -> (i64, i64) {
        match self.encoding {
            IntegerEncoding::Sized { bits: 64, signed: true } => (i64::MIN, i64::MAX),
            IntegerEncoding::Sized { bits, signed: true } => {
                (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
            }
            IntegerEncoding::Sized { bits, signed: false } => (0, ((1u64 << bits) - 1) as i64),
            IntegerEncoding::Ranged(range) => (range.low(), range.high()),
        }
    }

    pub(super) fn check(&self, value: i64) -> Result<(), String> {
        let (low, high) = self.bounds();
        if value < low || value > high {
            return Err(format!("{value} is outside of the allowed range [{low}, {high}]"));
        }

        Ok(())
    }

    pub(super) fn write(&self, value: i64, writer: &mut BitWriter) -> Result<(), Error> {
        match self.encoding {
            IntegerEncoding::Sized { bits, signed } => writer.write_integer(value, bits, signed)?,
            IntegerEncoding::Ranged(range) => range.write(writer, value)?,
        }

        Ok(())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>) -> Result<i64, Error> {
        Ok(match self.encoding {
            IntegerEncoding::Sized { bits, signed } => reader.read_integer(bits, signed)?,
            IntegerEncoding::Ranged(range) => range.read(reader)?,
        })
    }
}

// ============================================================================
// FloatColumn
// ============================================================================

///
/// FloatColumn
///
/// Lossless writes (or double-precision columns) use 64 bits; lossy writes
/// of single-precision columns use 32 bits. The choice is made per write.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FloatColumn {
    double_precision: bool,
    signed: bool,
}

impl FloatColumn {
    pub const DOUBLE: Self = Self::new(true, true);
    pub const SINGLE: Self = Self::new(false, true);

    #[must_use]
    pub const fn new(double_precision: bool, signed: bool) -> Self {
        Self {
            double_precision,
            signed,
        }
    }

    #[must_use]
    pub const fn is_double_precision(&self) -> bool {
        self.double_precision
    }

    #[must_use]
    pub const fn is_signed(&self) -> bool {
        self.signed
    }

    #[must_use]
    pub const fn value_size(&self, lossless: bool) -> usize {
        if lossless || self.double_precision { 64 } else { 32 }
    }

    #[must_use]
    pub const fn can_be_lossy(&self) -> bool {
        !self.double_precision
    }

    pub(super) fn check(&self, value: f64) -> Result<(), String> {
        if !self.signed && value < 0.0 {
            return Err(format!("{value} is negative but the column is unsigned"));
        }

        Ok(())
    }

    pub(super) fn write(&self, value: f64, writer: &mut BitWriter, lossless: bool) -> Result<(), Error> {
        if lossless || self.double_precision {
            writer.write_f64(value);
            return Ok(());
        }

        let single = value as f32;
        if value.is_finite() && single.is_infinite() {
            return Err(Error::new(
                ErrorClass::Validation,
                ErrorOrigin::Record,
                format!("{value} exceeds the single precision range"),
            ));
        }
        writer.write_f32(single);

        Ok(())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<f64, Error> {
        if lossless || self.double_precision {
            Ok(reader.read_f64()?)
        } else {
            Ok(f64::from(reader.read_f32()?))
        }
    }
}

// ============================================================================
// StringColumn
// ============================================================================

///
/// StringColumn
///
/// Byte-length prefixed string. The length field covers `[0, max_length]`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StringColumn {
    max_length: usize,
    charset: Charset,
    length_field: IntegerRange,
}

impl StringColumn {
    pub const DEFAULT_MAX_LENGTH: usize = 256;

    pub fn new(max_length: usize, charset: Charset) -> Result<Self, String> {
        Ok(Self {
            max_length,
            charset,
            length_field: length_field(max_length)?,
        })
    }

    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    #[must_use]
    pub const fn charset(&self) -> Charset {
        self.charset
    }

    pub(super) const fn min_value_size(&self) -> usize {
        self.length_field.size() as usize
    }

    pub(super) const fn max_value_size(&self) -> usize {
        self.length_field.size() as usize + self.max_length * 8
    }

    pub(super) fn check(&self, value: &str) -> Result<(), String> {
        let len = self.charset.encoded_len(value);
        if len > self.max_length {
            return Err(format!(
                "{} string of {len} bytes exceeds the maximum of {} bytes",
                self.charset, self.max_length
            ));
        }

        Ok(())
    }

    pub(super) fn write(&self, value: &str, writer: &mut BitWriter) -> Result<(), Error> {
        let bytes = self.charset.encode(value);
        self.length_field.write(writer, bytes.len() as i64)?;
        writer.write_bytes(&bytes);

        Ok(())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>) -> Result<String, Error> {
        let len = self.length_field.read(reader)? as usize;

        Ok(reader.read_string(len, self.charset)?)
    }
}

// ============================================================================
// BytesColumn
// ============================================================================

///
/// BytesColumn
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BytesColumn {
    max_length: usize,
    length_field: IntegerRange,
}

impl BytesColumn {
    pub fn new(max_length: usize) -> Result<Self, String> {
        Ok(Self {
            max_length,
            length_field: length_field(max_length)?,
        })
    }

    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    pub(super) const fn min_value_size(&self) -> usize {
        self.length_field.size() as usize
    }

    pub(super) const fn max_value_size(&self) -> usize {
        self.length_field.size() as usize + self.max_length * 8
    }

    pub(super) fn check(&self, value: &[u8]) -> Result<(), String> {
        if value.len() > self.max_length {
            return Err(format!(
                "{} bytes exceed the maximum of {}",
                value.len(),
                self.max_length
            ));
        }

        Ok(())
    }

    pub(super) fn write(&self, value: &[u8], writer: &mut BitWriter) -> Result<(), Error> {
        self.length_field.write(writer, value.len() as i64)?;
        writer.write_bytes(value);

        Ok(())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>) -> Result<Vec<u8>, Error> {
        let len = self.length_field.read(reader)? as usize;

        Ok(reader.read_bytes(len)?)
    }
}

fn length_field(max_length: usize) -> Result<IntegerRange, String> {
    let high = i64::try_from(max_length).map_err(|_| format!("maximum length {max_length} is too large"))?;

    IntegerRange::new(0, high).map_err(|err| err.to_string())
}

// ============================================================================
// TimeColumn
// ============================================================================

///
/// TimeColumn
///
/// Millisecond-precise timestamp with a UTC offset. Lossy writes keep whole
/// seconds only and drop the offset, unless the column is configured to
/// retain them.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TimeColumn {
    keep_millis: bool,
    keep_offset: bool,
}

impl TimeColumn {
    pub const MILLIS_SIZE: u32 = 64;
    pub const SECONDS_SIZE: u32 = 40;

    /// Offsets are stored as signed whole minutes.
    pub const OFFSET_SIZE: u32 = 12;

    pub const LOSSLESS: Self = Self::new(true, true);

    #[must_use]
    pub const fn new(keep_millis: bool, keep_offset: bool) -> Self {
        Self {
            keep_millis,
            keep_offset,
        }
    }

    #[must_use]
    pub fn value_size(&self, lossless: bool) -> usize {
        let instant = if lossless || self.keep_millis {
            Self::MILLIS_SIZE
        } else {
            Self::SECONDS_SIZE
        };
        let offset = if lossless || self.keep_offset {
            Self::OFFSET_SIZE
        } else {
            0
        };

        (instant + offset) as usize
    }

    #[must_use]
    pub const fn can_be_lossy(&self) -> bool {
        !(self.keep_millis && self.keep_offset)
    }

    pub(super) fn check(&self, value: OffsetDateTime) -> Result<(), String> {
        if value.nanosecond() % 1_000_000 != 0 {
            return Err("sub-millisecond precision is not supported".into());
        }
        if value.offset().whole_seconds() % 60 != 0 {
            return Err(format!("UTC offset {} is not a whole number of minutes", value.offset()));
        }

        Ok(())
    }

    pub(super) fn write(
        &self,
        value: OffsetDateTime,
        writer: &mut BitWriter,
        lossless: bool,
    ) -> Result<(), Error> {
        let millis = (value.unix_timestamp_nanos() / 1_000_000) as i64;

        if lossless || self.keep_millis {
            writer.write_integer(millis, Self::MILLIS_SIZE, true)?;
        } else {
            writer.write_integer(millis.div_euclid(1000), Self::SECONDS_SIZE, true)?;
        }

        if lossless || self.keep_offset {
            writer.write_integer(utc_offset_minutes(value.offset()), Self::OFFSET_SIZE, true)?;
        }

        Ok(())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<OffsetDateTime, Error> {
        let millis = if lossless || self.keep_millis {
            reader.read_integer(Self::MILLIS_SIZE, true)?
        } else {
            reader.read_integer(Self::SECONDS_SIZE, true)?.saturating_mul(1000)
        };

        let instant = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
            .map_err(|err| invalid_time(&err))?;

        if lossless || self.keep_offset {
            let minutes = reader.read_integer(Self::OFFSET_SIZE, true)?;
            let offset = UtcOffset::from_whole_seconds((minutes * 60) as i32)
                .map_err(|err| invalid_time(&err))?;

            return Ok(instant.to_offset(offset));
        }

        Ok(instant)
    }
}

fn invalid_time(err: &dyn std::fmt::Display) -> Error {
    Error::new(
        ErrorClass::Validation,
        ErrorOrigin::Record,
        format!("invalid time value: {err}"),
    )
}

// ============================================================================
// Text helpers
// ============================================================================

pub(super) fn format_float(value: f64) -> String {
    format!("{value:?}")
}

pub(super) fn format_time(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.to_string())
}

pub(super) fn parse_time(text: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(text.trim(), &Rfc3339).map_err(|err| format!("'{text}' is not an RFC 3339 time: {err}"))
}

pub(super) fn format_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

pub(super) fn parse_hex(text: &str) -> Result<Vec<u8>, String> {
    let text = text.trim();
    if !text.len().is_multiple_of(2) {
        return Err(format!("hex string '{text}' has an odd number of digits"));
    }

    (0..text.len())
        .step_by(2)
        .map(|i| {
            text.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("'{text}' is not a hex string"))
        })
        .collect()
}
