use crate::error::BitIoError;
use std::fmt;

///
/// BitArray
///
/// Growable, packed bit vector. Bits are stored MSB-first inside each byte and
/// any unused trailing bits of the last byte are kept at zero, so `to_bytes`
/// is always zero padded.
///

#[derive(Clone, Default, Eq, Hash, PartialEq)]
pub struct BitArray {
    bytes: Vec<u8>,
    len: usize,
}

impl BitArray {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            bytes: Vec::new(),
            len: 0,
        }
    }

    /// All-zero array of `len` bits.
    #[must_use]
    pub fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0; len.div_ceil(8)],
            len,
        }
    }

    /// Wrap whole bytes; the array spans `bytes.len() * 8` bits.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Wrap bytes but only keep the first `len` bits.
    pub fn from_bytes_with_len(bytes: &[u8], len: usize) -> Result<Self, BitIoError> {
        if len > bytes.len() * 8 {
            return Err(BitIoError::InvalidLength {
                len,
                bytes: bytes.len(),
            });
        }

        let mut array = Self {
            bytes: bytes[..len.div_ceil(8)].to_vec(),
            len,
        };
        array.clear_padding();

        Ok(array)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes needed to hold this array.
    #[must_use]
    pub const fn byte_len(&self) -> usize {
        self.len.div_ceil(8)
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<bool> {
        (index < self.len).then(|| self.bytes[index / 8] & mask(index) != 0)
    }

    /// Overwrite an existing bit. Returns `false` when `index` is out of bounds.
    pub fn set(&mut self, index: usize, bit: bool) -> bool {
        if index >= self.len {
            return false;
        }

        if bit {
            self.bytes[index / 8] |= mask(index);
        } else {
            self.bytes[index / 8] &= !mask(index);
        }

        true
    }

    pub fn push(&mut self, bit: bool) {
        if self.len.is_multiple_of(8) {
            self.bytes.push(0);
        }
        if bit {
            self.bytes[self.len / 8] |= mask(self.len);
        }
        self.len += 1;
    }

    pub fn append(&mut self, other: &Self) {
        if self.len.is_multiple_of(8) {
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
            return;
        }

        self.extend(other.iter());
    }

    /// Copy of bits `start..end`, clamped to the array length.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len);
        let start = start.min(end);

        (start..end).map(|i| self.bytes[i / 8] & mask(i) != 0).collect()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = bool> + '_ {
        (0..self.len).map(|i| self.bytes[i / 8] & mask(i) != 0)
    }

    /// Packed bytes, zero padded up to the next byte boundary.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Drop every bit at or after `len`.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        self.len = len;
        self.bytes.truncate(len.div_ceil(8));
        self.clear_padding();
    }

    fn clear_padding(&mut self) {
        let used = self.len % 8;
        if used != 0
            && let Some(last) = self.bytes.last_mut()
        {
            *last &= 0xFF << (8 - used);
        }
    }
}

const fn mask(index: usize) -> u8 {
    0x80 >> (index % 8)
}

impl fmt::Debug for BitArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitArray[{}](", self.len)?;
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        f.write_str(")")
    }
}

impl FromIterator<bool> for BitArray {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut array = Self::new();
        array.extend(iter);
        array
    }
}

impl Extend<bool> for BitArray {
    fn extend<I: IntoIterator<Item = bool>>(&mut self, iter: I) {
        for bit in iter {
            self.push(bit);
        }
    }
}

///
/// TESTS
///
