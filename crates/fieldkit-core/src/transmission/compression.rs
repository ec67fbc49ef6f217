use crate::transmission::TransmissionError;
use derive_more::Display;
use flate2::{
    Compression as Level,
    read::{DeflateDecoder, GzDecoder},
    write::{DeflateEncoder, GzEncoder},
};
use std::io::{Read, Write};

///
/// CONSTANTS
///

pub const COMPRESSION_FIELD_SIZE: u32 = 2;

/// Upper bound on what a compressed payload may expand to.
pub const MAX_DECOMPRESSED_BYTES: usize = 1 << 24;

///
/// Compression
///
/// Encoding of a records payload body, tagged on the wire with
/// [`COMPRESSION_FIELD_SIZE`] bits.
///

#[derive(Clone, Copy, Debug, Default, Display, Eq, Hash, PartialEq)]
pub enum Compression {
    #[default]
    #[display("none")]
    None,
    #[display("gzip")]
    Gzip,
    #[display("deflate")]
    Deflate,
}

impl Compression {
    /// Every mode, cheapest to decode first.
    pub const ALL: [Self; 3] = [Self::None, Self::Deflate, Self::Gzip];

    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Gzip => 1,
            Self::Deflate => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Result<Self, TransmissionError> {
        match tag {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Deflate),
            _ => Err(TransmissionError::UnknownCompression { tag }),
        }
    }

    pub fn compress(self, bytes: &[u8]) -> Result<Vec<u8>, TransmissionError> {
        let failed = |err: std::io::Error| TransmissionError::Compression {
            mode: self,
            message: err.to_string(),
        };

        match self {
            Self::None => Ok(bytes.to_vec()),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Level::best());
                encoder.write_all(bytes).map_err(failed)?;
                encoder.finish().map_err(failed)
            }
            Self::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), Level::best());
                encoder.write_all(bytes).map_err(failed)?;
                encoder.finish().map_err(failed)
            }
        }
    }

    /// Inverse of [`Self::compress`]; output beyond
    /// [`MAX_DECOMPRESSED_BYTES`] is rejected.
    pub fn decompress(self, bytes: &[u8]) -> Result<Vec<u8>, TransmissionError> {
        let reader: Box<dyn Read + '_> = match self {
            Self::None => return Ok(bytes.to_vec()),
            Self::Gzip => Box::new(GzDecoder::new(bytes)),
            Self::Deflate => Box::new(DeflateDecoder::new(bytes)),
        };

        let mut out = Vec::new();
        reader
            .take(MAX_DECOMPRESSED_BYTES as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|err| TransmissionError::Compression {
                mode: self,
                message: err.to_string(),
            })?;
        if out.len() > MAX_DECOMPRESSED_BYTES {
            return Err(TransmissionError::Compression {
                mode: self,
                message: format!("expands beyond {MAX_DECOMPRESSED_BYTES} bytes"),
            });
        }

        Ok(out)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_round_trips() {
        let text = b"Latitude 51.5 Longitude -0.25 ".repeat(20);
        for mode in Compression::ALL {
            let packed = mode.compress(&text).expect("compress");
            assert_eq!(mode.decompress(&packed).expect("decompress"), text, "{mode}");
        }
    }

    #[test]
    fn deflate_skips_the_gzip_envelope() {
        let text = b"oak ash elm ".repeat(10);
        let gzip = Compression::Gzip.compress(&text).expect("gzip");
        let deflate = Compression::Deflate.compress(&text).expect("deflate");

        assert_eq!(&gzip[..2], &[0x1f, 0x8b]);
        assert!(deflate.len() < gzip.len());
    }

    #[test]
    fn garbage_is_a_compression_error() {
        let err = Compression::Gzip.decompress(b"plainly not gzip").expect_err("garbage");
        assert!(matches!(err, TransmissionError::Compression { mode: Compression::Gzip, .. }));
    }

    #[test]
    fn tags_are_stable() {
        for mode in Compression::ALL {
            assert_eq!(Compression::from_tag(mode.tag()), Ok(mode));
        }
        assert_eq!(
            Compression::from_tag(3),
            Err(TransmissionError::UnknownCompression { tag: 3 })
        );
    }
}
