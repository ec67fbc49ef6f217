use crate::{
    error::Error,
    transmission::{
        MAX_TRANSMISSION_ID, MAX_TRANSMISSION_PARTS, PAYLOAD_HASH_SIZE, TRANSMISSION_ID_SIZE,
        TransmissionError, alphabet,
    },
};
use fieldkit_io::{BitArray, BitReader, BitWriter};
use std::fmt;

///
/// CONSTANTS
///

const PART_NUMBER_SIZE: u32 = 4;

/// Bits in a serialized [`PartHeader`].
pub const HEADER_SIZE: usize =
    (TRANSMISSION_ID_SIZE + PAYLOAD_HASH_SIZE + 2 * PART_NUMBER_SIZE) as usize;

/// Septets used by the header of a text message; the 49th bit is padding.
pub const TEXT_HEADER_SYMBOLS: usize = HEADER_SIZE.div_ceil(alphabet::SYMBOL_BITS as usize);

///
/// PartHeader
///
/// Per-part envelope: which transmission the part belongs to, the payload
/// hash and its position. Part numbers are 1-based.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct PartHeader {
    transmission_id: u32,
    payload_hash: u16,
    part_number: u8,
    total_parts: u8,
}

impl PartHeader {
    pub fn new(
        transmission_id: u32,
        payload_hash: u16,
        part_number: u8,
        total_parts: u8,
    ) -> Result<Self, TransmissionError> {
        if transmission_id > MAX_TRANSMISSION_ID {
            return Err(TransmissionError::IdOutOfRange {
                id: i64::from(transmission_id),
            });
        }
        if part_number == 0 || part_number > total_parts || total_parts > MAX_TRANSMISSION_PARTS {
            return Err(TransmissionError::InvalidPart {
                reason: format!(
                    "part {part_number} of {total_parts} is outside [1, {MAX_TRANSMISSION_PARTS}]"
                ),
            });
        }

        Ok(Self {
            transmission_id,
            payload_hash,
            part_number,
            total_parts,
        })
    }

    #[must_use]
    pub const fn transmission_id(&self) -> u32 {
        self.transmission_id
    }

    #[must_use]
    pub const fn payload_hash(&self) -> u16 {
        self.payload_hash
    }

    #[must_use]
    pub const fn part_number(&self) -> u8 {
        self.part_number
    }

    #[must_use]
    pub const fn total_parts(&self) -> u8 {
        self.total_parts
    }

    /// Whether `other` belongs to the same transmission as this header.
    #[must_use]
    pub const fn same_transmission(&self, other: &Self) -> bool {
        self.transmission_id == other.transmission_id
            && self.payload_hash == other.payload_hash
            && self.total_parts == other.total_parts
    }

    pub fn write(&self, writer: &mut BitWriter) -> Result<(), Error> {
        writer.write_unsigned(u64::from(self.transmission_id), TRANSMISSION_ID_SIZE)?;
        writer.write_unsigned(u64::from(self.payload_hash), PAYLOAD_HASH_SIZE)?;
        writer.write_unsigned(u64::from(self.part_number - 1), PART_NUMBER_SIZE)?;
        writer.write_unsigned(u64::from(self.total_parts - 1), PART_NUMBER_SIZE)?;

        Ok(())
    }

    pub fn read(reader: &mut BitReader<'_>) -> Result<Self, Error> {
        let transmission_id = reader.read_unsigned(TRANSMISSION_ID_SIZE)? as u32;
        let payload_hash = reader.read_unsigned(PAYLOAD_HASH_SIZE)? as u16;
        let part_number = reader.read_unsigned(PART_NUMBER_SIZE)? as u8 + 1;
        let total_parts = reader.read_unsigned(PART_NUMBER_SIZE)? as u8 + 1;

        Ok(Self::new(transmission_id, payload_hash, part_number, total_parts)?)
    }

    fn to_bits(self) -> Result<BitArray, Error> {
        let mut writer = BitWriter::new();
        self.write(&mut writer)?;

        Ok(writer.finish())
    }
}

impl fmt::Display for PartHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} part {}/{} (hash {:#06x})",
            self.transmission_id, self.part_number, self.total_parts, self.payload_hash
        )
    }
}

///
/// MessageBody
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MessageBody {
    Bits(BitArray),
    Text(String),
}

impl MessageBody {
    /// Body size in the unit its transport counts: bits or septets.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Bits(bits) => bits.len(),
            Self::Text(text) => alphabet::text_units(text).unwrap_or_else(|_| text.chars().count()),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Bits(bits) => bits.is_empty(),
            Self::Text(text) => text.is_empty(),
        }
    }
}

///
/// Message
///
/// One transport-level part of a transmission.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    header: PartHeader,
    body: MessageBody,
}

impl Message {
    #[must_use]
    pub const fn binary(header: PartHeader, bits: BitArray) -> Self {
        Self {
            header,
            body: MessageBody::Bits(bits),
        }
    }

    #[must_use]
    pub const fn text(header: PartHeader, text: String) -> Self {
        Self {
            header,
            body: MessageBody::Text(text),
        }
    }

    #[must_use]
    pub const fn header(&self) -> &PartHeader {
        &self.header
    }

    #[must_use]
    pub const fn body(&self) -> &MessageBody {
        &self.body
    }

    #[must_use]
    pub const fn part_number(&self) -> u8 {
        self.header.part_number
    }

    /// Binary wire form: header then body bits, zero-padded to a byte.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let MessageBody::Bits(bits) = &self.body else {
            return Err(TransmissionError::InvalidPart {
                reason: "text messages have no binary form".into(),
            }
            .into());
        };

        let mut writer = BitWriter::new();
        self.header.write(&mut writer)?;
        writer.write_bits(bits);

        Ok(writer.finish().to_bytes())
    }

    /// Parse a binary message. Trailing padding bits become part of the
    /// body; the transmission length field makes them harmless.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let bits = BitArray::from_bytes(bytes);
        let mut reader = BitReader::new(&bits);
        let header = PartHeader::read(&mut reader)?;
        let body = reader.read_bits(reader.bits_available())?;

        Ok(Self::binary(header, body))
    }

    /// Text wire form: the header as 7 basic-alphabet septets, then the body.
    pub fn to_text(&self) -> Result<String, Error> {
        let MessageBody::Text(body) = &self.body else {
            return Err(TransmissionError::InvalidPart {
                reason: "binary messages have no text form".into(),
            }
            .into());
        };

        let mut bits = self.header.to_bits()?;
        while bits.len() % alphabet::SYMBOL_BITS as usize != 0 {
            bits.push(false);
        }

        let mut reader = BitReader::new(&bits);
        let mut text = String::with_capacity(TEXT_HEADER_SYMBOLS + body.len());
        for _ in 0..TEXT_HEADER_SYMBOLS {
            let septet = reader.read_unsigned(alphabet::SYMBOL_BITS)? as u8;
            let c = alphabet::symbol(septet).ok_or_else(|| TransmissionError::InvalidPart {
                reason: format!("header septet {septet:#04x} has no character"),
            })?;
            text.push(c);
        }
        text.push_str(body);

        Ok(text)
    }

    pub fn from_text(input: &str) -> Result<Self, Error> {
        let mut chars = input.chars();
        let mut writer = BitWriter::new();
        for _ in 0..TEXT_HEADER_SYMBOLS {
            let c = chars.next().ok_or_else(|| TransmissionError::InvalidPart {
                reason: "text message is shorter than its header".into(),
            })?;
            let septet =
                alphabet::septet(c).ok_or(TransmissionError::UnknownCharacter { character: c })?;
            writer.write_unsigned(u64::from(septet), alphabet::SYMBOL_BITS)?;
        }

        let bits = writer.finish();
        let header = PartHeader::read(&mut BitReader::new(&bits))?;

        Ok(Self::text(header, chars.collect()))
    }
}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Orders by part number, then header, so a sorted set reassembles in order.
impl Ord for Message {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.header.part_number, self.header.transmission_id, self.header.payload_hash)
            .cmp(&(other.header.part_number, other.header.transmission_id, other.header.payload_hash))
            .then_with(|| self.body_key().cmp(&other.body_key()))
    }
}

impl Message {
    fn body_key(&self) -> (u8, Vec<u8>) {
        match &self.body {
            MessageBody::Bits(bits) => (0, bits.to_bytes()),
            MessageBody::Text(text) => (1, text.as_bytes().to_vec()),
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn header(part: u8, total: u8) -> PartHeader {
        PartHeader::new(0xAB_CDEF, 0x1234, part, total).expect("header")
    }

    #[test]
    fn header_rejects_bad_part_numbers() {
        assert!(PartHeader::new(1, 0, 0, 1).is_err());
        assert!(PartHeader::new(1, 0, 3, 2).is_err());
        assert!(PartHeader::new(1, 0, 1, 17).is_err());
        assert!(PartHeader::new(MAX_TRANSMISSION_ID + 1, 0, 1, 1).is_err());
    }

    #[test]
    fn binary_message_round_trips() {
        let body: BitArray = [true, false, true, true, false].into_iter().collect();
        let message = Message::binary(header(3, 16), body.clone());

        let bytes = message.to_bytes().expect("bytes");
        assert_eq!(bytes.len(), (HEADER_SIZE + 5).div_ceil(8));

        let parsed = Message::from_bytes(&bytes).expect("parse");
        assert_eq!(parsed.header(), message.header());
        let MessageBody::Bits(bits) = parsed.body() else {
            panic!("binary body expected");
        };
        assert_eq!(bits.slice(0, 5), body);
    }

    #[test]
    fn text_message_round_trips() {
        let message = Message::text(header(1, 2), "Grüsse 5€".into());
        let text = message.to_text().expect("text");
        assert_eq!(text.chars().count(), TEXT_HEADER_SYMBOLS + 9);

        assert_eq!(Message::from_text(&text).expect("parse"), message);
    }

    #[test]
    fn messages_sort_by_part_number() {
        let mut parts = vec![
            Message::text(header(3, 3), "c".into()),
            Message::text(header(1, 3), "a".into()),
            Message::text(header(2, 3), "b".into()),
        ];
        parts.sort();

        let order: Vec<u8> = parts.iter().map(Message::part_number).collect();
        assert_eq!(order, [1, 2, 3]);
    }
}
