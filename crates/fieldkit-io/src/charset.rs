use crate::error::BitIoError;
use derive_more::Display;

///
/// Charset
///
/// String encodings accepted by [`BitWriter::write_string`](crate::BitWriter::write_string)
/// and [`BitReader::read_string`](crate::BitReader::read_string).
///

#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum Charset {
    #[default]
    #[display("UTF-8")]
    Utf8,

    #[display("UTF-16BE")]
    Utf16Be,
}

impl Charset {
    /// Worst-case number of bytes one `char` can take.
    #[must_use]
    pub const fn max_bytes_per_char(self) -> usize {
        4
    }

    #[must_use]
    pub fn encode(self, value: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => value.as_bytes().to_vec(),
            Self::Utf16Be => value.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// Number of bytes `value` occupies in this charset.
    #[must_use]
    pub fn encoded_len(self, value: &str) -> usize {
        match self {
            Self::Utf8 => value.len(),
            Self::Utf16Be => value.encode_utf16().count() * 2,
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, BitIoError> {
        match self {
            Self::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|err| BitIoError::InvalidString {
                charset: self,
                reason: err.to_string(),
            }),
            Self::Utf16Be => {
                if !bytes.len().is_multiple_of(2) {
                    return Err(BitIoError::InvalidString {
                        charset: self,
                        reason: format!("odd byte count {}", bytes.len()),
                    });
                }

                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();

                String::from_utf16(&units).map_err(|err| BitIoError::InvalidString {
                    charset: self,
                    reason: err.to_string(),
                })
            }
        }
    }
}

///
/// TESTS
///
