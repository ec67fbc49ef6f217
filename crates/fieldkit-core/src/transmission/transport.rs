use crate::{
    error::Error,
    transmission::{
        MAX_TRANSMISSION_PARTS, Message, MessageBody, PartHeader, TransmissionError, alphabet,
        message::{HEADER_SIZE, TEXT_HEADER_SYMBOLS},
    },
};
use derive_more::Display;
use fieldkit_io::{BitArray, BitReader, BitWriter};
use serde::{Deserialize, Serialize};

///
/// CONSTANTS
///

/// Payload bytes of one binary SMS.
pub const BINARY_SMS_BYTES: usize = 140;

/// Body bits per binary SMS, after the part header.
pub const BINARY_SMS_BODY_BITS: usize = BINARY_SMS_BYTES * 8 - HEADER_SIZE;

/// Characters of one text SMS.
pub const TEXT_SMS_CHARACTERS: usize = 160;

/// Body units per text SMS. The 7 header characters may each cost two units.
pub const TEXT_SMS_BODY_UNITS: usize = TEXT_SMS_CHARACTERS - 2 * TEXT_HEADER_SYMBOLS;

///
/// TransportKind
///

#[derive(
    Clone, Copy, Debug, Default, Deserialize, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    #[default]
    #[display("binary_sms")]
    BinarySms,
    #[display("text_sms")]
    TextSms,
    #[display("http")]
    Http,
}

impl TransportKind {
    pub const ALL: [Self; 3] = [Self::BinarySms, Self::TextSms, Self::Http];

    /// Stable numeric code used when persisting transmissions.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::BinarySms => 0,
            Self::TextSms => 1,
            Self::Http => 2,
        }
    }

    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::BinarySms),
            1 => Some(Self::TextSms),
            2 => Some(Self::Http),
            _ => None,
        }
    }
}

///
/// Transport
///
/// A concrete transport with its size limits. Determines the body capacity
/// of a transmission and how a body is split into messages.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Transport {
    BinarySms { max_parts: u8 },
    TextSms { max_parts: u8 },
    Http { max_body_bytes: usize },
}

impl Transport {
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        match self {
            Self::BinarySms { .. } => TransportKind::BinarySms,
            Self::TextSms { .. } => TransportKind::TextSms,
            Self::Http { .. } => TransportKind::Http,
        }
    }

    /// Largest transmission body this transport can carry, in bits.
    #[must_use]
    pub const fn max_body_bits(&self) -> usize {
        match self {
            Self::BinarySms { max_parts } => *max_parts as usize * BINARY_SMS_BODY_BITS,
            Self::TextSms { max_parts } => {
                *max_parts as usize * TEXT_SMS_BODY_UNITS * alphabet::SYMBOL_BITS as usize
            }
            Self::Http { max_body_bytes } => *max_body_bytes * 8,
        }
    }

    /// Whether wrapping can need more room than [`max_body_bits`] suggests,
    /// so capacity checks have to wrap for real.
    ///
    /// [`max_body_bits`]: Self::max_body_bits
    #[must_use]
    pub const fn can_wrap_increase_size(&self) -> bool {
        matches!(self, Self::TextSms { .. })
    }

    const fn max_parts(&self) -> usize {
        match self {
            Self::BinarySms { max_parts } | Self::TextSms { max_parts } => {
                if *max_parts > MAX_TRANSMISSION_PARTS {
                    MAX_TRANSMISSION_PARTS as usize
                } else {
                    *max_parts as usize
                }
            }
            Self::Http { .. } => 1,
        }
    }

    /// Split `body` into the messages of transmission `id`.
    pub fn wrap(&self, id: u32, payload_hash: u16, body: &BitArray) -> Result<Vec<Message>, Error> {
        match self {
            Self::BinarySms { .. } => self.wrap_binary(id, payload_hash, body),
            Self::TextSms { .. } => self.wrap_text(id, payload_hash, body),
            Self::Http { max_body_bytes } => {
                if body.byte_len() > *max_body_bytes {
                    return Err(TransmissionError::WrapCapacityExceeded {
                        actual: body.byte_len(),
                        max: *max_body_bytes,
                        unit: "bytes",
                    }
                    .into());
                }
                let header = PartHeader::new(id, payload_hash, 1, 1)?;

                Ok(vec![Message::binary(header, body.clone())])
            }
        }
    }

    fn wrap_binary(&self, id: u32, payload_hash: u16, body: &BitArray) -> Result<Vec<Message>, Error> {
        let chunks: Vec<BitArray> = (0..body.len().max(1))
            .step_by(BINARY_SMS_BODY_BITS)
            .map(|start| body.slice(start, (start + BINARY_SMS_BODY_BITS).min(body.len())))
            .collect();

        self.check_parts(chunks.len())?;
        let total = chunks.len() as u8;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let header = PartHeader::new(id, payload_hash, i as u8 + 1, total)?;
                Ok(Message::binary(header, chunk))
            })
            .collect()
    }

    fn wrap_text(&self, id: u32, payload_hash: u16, body: &BitArray) -> Result<Vec<Message>, Error> {
        let mut padded = body.clone();
        while padded.len() % alphabet::SYMBOL_BITS as usize != 0 {
            padded.push(false);
        }

        let mut reader = BitReader::new(&padded);
        let mut texts = vec![String::new()];
        let mut used = 0;
        while !reader.at_end() {
            let septet = reader.read_unsigned(alphabet::SYMBOL_BITS)? as u8;
            let units = alphabet::units(septet);
            if used + units > TEXT_SMS_BODY_UNITS {
                texts.push(String::new());
                used = 0;
            }
            let c = alphabet::symbol(septet).ok_or_else(|| TransmissionError::InvalidPart {
                reason: format!("septet {septet:#04x} has no character"),
            })?;
            if let Some(text) = texts.last_mut() {
                text.push(c);
            }
            used += units;
        }

        self.check_parts(texts.len())?;
        let total = texts.len() as u8;
        texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let header = PartHeader::new(id, payload_hash, i as u8 + 1, total)?;
                Ok(Message::text(header, text))
            })
            .collect()
    }

    fn check_parts(&self, parts: usize) -> Result<(), TransmissionError> {
        let max = self.max_parts();
        if parts > max {
            return Err(TransmissionError::WrapCapacityExceeded {
                actual: parts,
                max,
                unit: "parts",
            });
        }

        Ok(())
    }

    /// Rejoin message bodies, given in part order.
    pub fn unwrap<'a>(&self, parts: impl IntoIterator<Item = &'a Message>) -> Result<BitArray, Error> {
        let mut writer = BitWriter::new();
        for message in parts {
            match (self.kind(), message.body()) {
                (TransportKind::BinarySms | TransportKind::Http, MessageBody::Bits(bits)) => {
                    writer.write_bits(bits);
                }
                (TransportKind::TextSms, MessageBody::Text(text)) => {
                    for c in text.chars() {
                        let septet = alphabet::septet(c)
                            .ok_or(TransmissionError::UnknownCharacter { character: c })?;
                        writer.write_unsigned(u64::from(septet), alphabet::SYMBOL_BITS)?;
                    }
                }
                (kind, _) => {
                    return Err(TransmissionError::InvalidPart {
                        reason: format!("{} does not fit a {kind} transport", message.header()),
                    }
                    .into());
                }
            }
        }

        Ok(writer.finish())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(len: usize) -> BitArray {
        (0..len).map(|i| i % 3 == 0 || i % 7 == 1).collect()
    }

    #[test]
    fn binary_capacity_is_parts_times_body() {
        let transport = Transport::BinarySms { max_parts: 16 };
        assert_eq!(BINARY_SMS_BODY_BITS, 1072);
        assert_eq!(transport.max_body_bits(), 17_152);
        assert!(!transport.can_wrap_increase_size());
    }

    #[test]
    fn binary_wrap_splits_on_body_boundaries() {
        let transport = Transport::BinarySms { max_parts: 4 };
        let body = bits(BINARY_SMS_BODY_BITS * 2 + 5);

        let messages = transport.wrap(9, 0xBEEF, &body).expect("wrap");
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m.header().total_parts() == 3));

        let bytes: Vec<Vec<u8>> = messages.iter().map(|m| m.to_bytes().expect("bytes")).collect();
        assert!(bytes.iter().all(|b| b.len() <= BINARY_SMS_BYTES));

        let parsed: Vec<Message> = bytes.iter().map(|b| Message::from_bytes(b).expect("parse")).collect();
        let joined = transport.unwrap(&parsed).expect("unwrap");
        assert_eq!(joined.slice(0, body.len()), body);
    }

    #[test]
    fn binary_wrap_rejects_too_many_parts() {
        let transport = Transport::BinarySms { max_parts: 1 };
        let err = transport
            .wrap(1, 0, &bits(BINARY_SMS_BODY_BITS + 1))
            .expect_err("two parts needed");
        assert!(err.is_capacity_exceeded());
    }

    #[test]
    fn text_wrap_respects_unit_budget() {
        let transport = Transport::TextSms { max_parts: 16 };
        let body = bits(5_000);

        let messages = transport.wrap(77, 1, &body).expect("wrap");
        for message in &messages {
            assert!(message.body().len() <= TEXT_SMS_BODY_UNITS);
            let text = message.to_text().expect("text");
            assert_eq!(Message::from_text(&text).expect("parse"), *message);
        }

        let joined = transport.unwrap(&messages).expect("unwrap");
        assert_eq!(joined.slice(0, body.len()), body);
    }

    #[test]
    fn euro_heavy_text_can_outgrow_nominal_capacity() {
        let transport = Transport::TextSms { max_parts: 1 };
        // septet 0x1B repeated: every character costs two units
        let body: BitArray = (0..transport.max_body_bits())
            .map(|i| [false, false, true, true, false, true, true][i % 7])
            .collect();

        let err = transport.wrap(1, 0, &body).expect_err("exceeds one part");
        assert!(err.is_capacity_exceeded());
    }

    #[test]
    fn http_keeps_one_message() {
        let transport = Transport::Http { max_body_bytes: 4 };
        let messages = transport.wrap(3, 2, &bits(32)).expect("wrap");
        assert_eq!(messages.len(), 1);
        assert!(transport.wrap(3, 2, &bits(33)).is_err());
    }

    #[test]
    fn transport_kind_codes_round_trip() {
        for kind in TransportKind::ALL {
            assert_eq!(TransportKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(TransportKind::TextSms.to_string(), "text_sms");
    }
}
