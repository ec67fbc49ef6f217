use crate::{bits::BitArray, charset::Charset, error::BitIoError};
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};

///
/// BitWriter
///
/// Forward-only bit sink. Multi-bit fields are written big-endian, most
/// significant bit first. Values that do not fit their field are rejected,
/// never truncated.
///

#[derive(Clone, Debug, Default)]
pub struct BitWriter {
    bits: BitArray,
}

impl BitWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bits: BitArray::new(),
        }
    }

    #[must_use]
    pub const fn bits_written(&self) -> usize {
        self.bits.len()
    }

    #[must_use]
    pub const fn as_bits(&self) -> &BitArray {
        &self.bits
    }

    #[must_use]
    pub fn finish(self) -> BitArray {
        self.bits
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.bits.push(bit);
    }

    pub fn write_bits(&mut self, bits: &BitArray) {
        self.bits.append(bits);
    }

    /// Write `value` into a field of `bits` bits.
    ///
    /// Signed fields use two's complement and accept
    /// `-2^(bits-1) ..= 2^(bits-1) - 1`. Unsigned fields accept
    /// `0 ..= 2^bits - 1` and are limited to 63 bits; use
    /// [`write_unsigned`](Self::write_unsigned) for a full 64-bit field.
    pub fn write_integer(&mut self, value: i64, bits: u32, signed: bool) -> Result<(), BitIoError> {
        check_native_width(bits, signed)?;

        if !fits(value, bits, signed) {
            return Err(BitIoError::out_of_range(value, bits, signed));
        }

        self.push_raw(value as u64, bits);

        Ok(())
    }

    pub fn write_unsigned(&mut self, value: u64, bits: u32) -> Result<(), BitIoError> {
        if bits > u64::BITS {
            return Err(BitIoError::InvalidWidth {
                bits,
                reason: "native fields are at most 64 bits wide",
            });
        }
        if bits < u64::BITS && value >> bits != 0 {
            return Err(BitIoError::out_of_range(value, bits, false));
        }

        self.push_raw(value, bits);

        Ok(())
    }

    /// Write an integer of arbitrary width.
    pub fn write_big_integer(
        &mut self,
        value: &BigInt,
        bits: u32,
        signed: bool,
    ) -> Result<(), BitIoError> {
        let raw = if value.sign() == Sign::Minus {
            if !signed || bits == 0 {
                return Err(BitIoError::out_of_range(value, bits, signed));
            }
            let min = -(BigInt::one() << (bits - 1));
            if *value < min {
                return Err(BitIoError::out_of_range(value, bits, signed));
            }

            // two's complement: 2^bits + value
            ((BigInt::one() << bits) + value)
                .to_biguint()
                .unwrap_or_else(BigUint::zero)
        } else {
            let magnitude = value.magnitude();
            let limit = if signed { bits.saturating_sub(1) } else { bits };
            if magnitude.bits() > u64::from(limit) {
                return Err(BitIoError::out_of_range(value, bits, signed));
            }
            magnitude.clone()
        };

        for i in (0..u64::from(bits)).rev() {
            self.bits.push(raw.bit(i));
        }

        Ok(())
    }

    pub fn write_f32(&mut self, value: f32) {
        self.push_raw(u64::from(value.to_bits()), 32);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.push_raw(value.to_bits(), 64);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.push_raw(u64::from(*byte), 8);
        }
    }

    /// Write the encoded bytes of `value`, returning how many were written.
    /// The byte count itself is not written; callers frame it as they need.
    pub fn write_string(&mut self, value: &str, charset: Charset) -> usize {
        let encoded = charset.encode(value);
        self.write_bytes(&encoded);

        encoded.len()
    }

    fn push_raw(&mut self, raw: u64, bits: u32) {
        for i in (0..bits).rev() {
            self.bits.push((raw >> i) & 1 == 1);
        }
    }
}

pub(crate) fn check_native_width(bits: u32, signed: bool) -> Result<(), BitIoError> {
    if bits > i64::BITS {
        return Err(BitIoError::InvalidWidth {
            bits,
            reason: "native fields are at most 64 bits wide",
        });
    }
    if !signed && bits == i64::BITS {
        return Err(BitIoError::InvalidWidth {
            bits,
            reason: "unsigned native fields are at most 63 bits wide",
        });
    }

    Ok(())
}

const fn fits(value: i64, bits: u32, signed: bool) -> bool {
    if bits == 0 {
        return value == 0;
    }

    if signed {
        if bits == i64::BITS {
            return true;
        }
        let half = 1i64 << (bits - 1);
        value >= -half && value < half
    } else {
        value >= 0 && (value >> bits) == 0
    }
}

///
/// TESTS
///
