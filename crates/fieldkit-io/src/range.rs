use crate::{error::BitIoError, reader::BitReader, writer::BitWriter};

///
/// IntegerRange
///
/// A bounded integer field. Values in `[low, high]` are stored as the
/// unsigned offset `value - low` using the fewest bits that can hold
/// `high - low` (never fewer than one).
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IntegerRange {
    low: i64,
    high: i64,
    size: u32,
}

impl IntegerRange {
    pub fn new(low: i64, high: i64) -> Result<Self, BitIoError> {
        if high < low {
            return Err(BitIoError::InvalidRange {
                low: i128::from(low),
                high: i128::from(high),
            });
        }

        let span = (i128::from(high) - i128::from(low)) as u64;

        Ok(Self {
            low,
            high,
            size: bit_length(span).max(1),
        })
    }

    /// Range starting at `low` spanning every value a `bits`-wide field holds.
    pub fn for_size(low: i64, bits: u32) -> Result<Self, BitIoError> {
        if bits == 0 || bits > 64 {
            return Err(BitIoError::InvalidWidth {
                bits,
                reason: "range fields are 1 to 64 bits wide",
            });
        }

        let high = i128::from(low) + (1i128 << bits) - 1;
        let high = i64::try_from(high).map_err(|_| BitIoError::InvalidRange {
            low: i128::from(low),
            high,
        })?;

        Ok(Self {
            low,
            high,
            size: bits,
        })
    }

    #[must_use]
    pub const fn low(&self) -> i64 {
        self.low
    }

    #[must_use]
    pub const fn high(&self) -> i64 {
        self.high
    }

    /// Width of the stored field in bits.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub const fn contains(&self, value: i64) -> bool {
        value >= self.low && value <= self.high
    }

    pub fn write(&self, writer: &mut BitWriter, value: i64) -> Result<(), BitIoError> {
        if !self.contains(value) {
            return Err(BitIoError::RangeViolation {
                value: i128::from(value),
                low: self.low,
                high: self.high,
            });
        }

        let offset = (i128::from(value) - i128::from(self.low)) as u64;
        writer.write_unsigned(offset, self.size)
    }

    pub fn read(&self, reader: &mut BitReader<'_>) -> Result<i64, BitIoError> {
        let offset = reader.read_unsigned(self.size)?;
        let value = i128::from(self.low) + i128::from(offset);

        if value > i128::from(self.high) {
            return Err(BitIoError::RangeViolation {
                value,
                low: self.low,
                high: self.high,
            });
        }

        Ok(value as i64)
    }
}

/// Number of significant bits in `value` (`0` for zero).
#[must_use]
pub const fn bit_length(value: u64) -> u32 {
    u64::BITS - value.leading_zeros()
}

///
/// TESTS
///
