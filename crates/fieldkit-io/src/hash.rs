use crate::bits::BitArray;
use crc::{CRC_16_IBM_3740, Crc};

// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// CRC16 checksum of `bytes`.
#[must_use]
pub fn crc16(bytes: &[u8]) -> u16 {
    CRC16.checksum(bytes)
}

/// CRC16 checksum of a bit array's zero-padded byte form.
#[must_use]
pub fn crc16_bits(bits: &BitArray) -> u16 {
    crc16(bits.as_bytes())
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::{crc16, crc16_bits};
    use crate::BitArray;

    #[test]
    fn matches_ccitt_false_check_value() {
        assert_eq!(crc16(b"123456789"), 0x29B1);
    }

    #[test]
    fn bit_hash_uses_padded_bytes() {
        let bits: BitArray = [true, false, true].into_iter().collect();
        assert_eq!(crc16_bits(&bits), crc16(&[0b1010_0000]));
    }
}
