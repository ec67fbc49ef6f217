use crate::{bits::BitArray, charset::Charset, error::BitIoError, writer::check_native_width};
use num_bigint::{BigInt, BigUint};
use num_traits::{One, Zero};

///
/// BitReader
///
/// Forward-only bit source over a [`BitArray`].
///
/// A read that finds no bits at all fails with [`BitIoError::EndOfStream`];
/// a read that finds some but not enough fails with
/// [`BitIoError::Incomplete`]. Failed reads consume nothing.
///

#[derive(Clone, Debug)]
pub struct BitReader<'a> {
    bits: &'a BitArray,
    position: usize,
}

impl<'a> BitReader<'a> {
    #[must_use]
    pub const fn new(bits: &'a BitArray) -> Self {
        Self { bits, position: 0 }
    }

    /// Number of bits consumed so far.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Bits left in the underlying array.
    ///
    /// Only an estimate: arrays built from whole bytes include trailing
    /// padding, so this must not drive framing decisions.
    #[must_use]
    pub const fn bits_available(&self) -> usize {
        self.bits.len() - self.position
    }

    #[must_use]
    pub const fn at_end(&self) -> bool {
        self.position >= self.bits.len()
    }

    /// Streams are forward-only; this does nothing.
    pub const fn mark(&mut self) {}

    /// Streams are forward-only; this does nothing.
    pub const fn reset(&mut self) {}

    #[must_use]
    pub const fn mark_supported(&self) -> bool {
        false
    }

    pub fn read_bit(&mut self) -> Result<bool, BitIoError> {
        self.ensure(1)?;
        let bit = self.bits.get(self.position).unwrap_or(false);
        self.position += 1;

        Ok(bit)
    }

    pub fn read_bits(&mut self, count: usize) -> Result<BitArray, BitIoError> {
        self.ensure(count)?;
        let out = self.bits.slice(self.position, self.position + count);
        self.position += count;

        Ok(out)
    }

    pub fn skip(&mut self, count: usize) -> Result<(), BitIoError> {
        self.ensure(count)?;
        self.position += count;

        Ok(())
    }

    /// Read a field written by [`BitWriter::write_integer`](crate::BitWriter::write_integer).
    pub fn read_integer(&mut self, bits: u32, signed: bool) -> Result<i64, BitIoError> {
        check_native_width(bits, signed)?;
        let raw = self.read_raw(bits)?;

        if signed && bits > 0 && bits < u64::BITS && (raw >> (bits - 1)) & 1 == 1 {
            // sign extend
            return Ok((raw | (u64::MAX << bits)) as i64);
        }

        Ok(raw as i64)
    }

    pub fn read_unsigned(&mut self, bits: u32) -> Result<u64, BitIoError> {
        if bits > u64::BITS {
            return Err(BitIoError::InvalidWidth {
                bits,
                reason: "native fields are at most 64 bits wide",
            });
        }

        self.read_raw(bits)
    }

    pub fn read_big_integer(&mut self, bits: u32, signed: bool) -> Result<BigInt, BitIoError> {
        self.ensure(bits as usize)?;

        let mut raw = BigUint::zero();
        for _ in 0..bits {
            raw <<= 1u32;
            if self.read_bit()? {
                raw += 1u32;
            }
        }

        if signed && bits > 0 && raw.bit(u64::from(bits - 1)) {
            return Ok(BigInt::from(raw) - (BigInt::one() << bits));
        }

        Ok(BigInt::from(raw))
    }

    pub fn read_f32(&mut self) -> Result<f32, BitIoError> {
        Ok(f32::from_bits(self.read_raw(32)? as u32))
    }

    pub fn read_f64(&mut self) -> Result<f64, BitIoError> {
        Ok(f64::from_bits(self.read_raw(64)?))
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, BitIoError> {
        self.ensure(count * 8)?;

        (0..count).map(|_| self.read_raw(8).map(|b| b as u8)).collect()
    }

    /// Read `byte_count` bytes and decode them with `charset`.
    pub fn read_string(&mut self, byte_count: usize, charset: Charset) -> Result<String, BitIoError> {
        let bytes = self.read_bytes(byte_count)?;

        charset.decode(&bytes)
    }

    fn read_raw(&mut self, bits: u32) -> Result<u64, BitIoError> {
        self.ensure(bits as usize)?;

        let mut raw = 0u64;
        for _ in 0..bits {
            let bit = self.bits.get(self.position).unwrap_or(false);
            raw = (raw << 1) | u64::from(bit);
            self.position += 1;
        }

        Ok(raw)
    }

    const fn ensure(&self, requested: usize) -> Result<(), BitIoError> {
        if requested == 0 {
            return Ok(());
        }

        let available = self.bits_available();
        if available == 0 {
            return Err(BitIoError::EndOfStream);
        }
        if available < requested {
            return Err(BitIoError::Incomplete {
                requested,
                available,
            });
        }

        Ok(())
    }
}

///
/// TESTS
///
