use crate::{
    error::Error,
    transmission::{FORMAT_VERSION_SIZE, MIN_BODY_LENGTH_BITS, PAYLOAD_TYPE_SIZE, TransmissionError},
};
use fieldkit_io::{BitReader, BitWriter, IntegerRange};

///
/// LengthField
///
/// Payload-length prefix sized for a given body capacity. The field is
/// just wide enough to hold every length in `[0, b]`, where `b` is the
/// largest payload that still fits next to the field itself, so at most
/// one bit of body capacity goes unused.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct LengthField {
    field: IntegerRange,
}

impl LengthField {
    /// Length field for a transport carrying at most `max_body_bits`.
    pub fn for_body(max_body_bits: usize) -> Result<Self, TransmissionError> {
        if max_body_bits < MIN_BODY_LENGTH_BITS {
            return Err(TransmissionError::BodyTooSmall {
                bits: max_body_bits,
                min: MIN_BODY_LENGTH_BITS,
            });
        }

        let available = max_body_bits - (FORMAT_VERSION_SIZE + PAYLOAD_TYPE_SIZE) as usize;
        let high = i64::try_from(max_payload_bits(available)).map_err(|_| TransmissionError::BodyTooSmall {
            bits: max_body_bits,
            min: MIN_BODY_LENGTH_BITS,
        })?;
        let field = IntegerRange::new(0, high).map_err(|err| TransmissionError::InvalidPart {
            reason: err.to_string(),
        })?;

        Ok(Self { field })
    }

    /// Largest payload, in bits, the field can announce.
    #[must_use]
    pub const fn max_payload_bits(&self) -> usize {
        self.field.high() as usize
    }

    /// Width of the field in bits.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.field.size()
    }

    pub fn write(&self, writer: &mut BitWriter, payload_bits: usize) -> Result<(), Error> {
        let length = i64::try_from(payload_bits).unwrap_or(i64::MAX);
        self.field.write(writer, length)?;

        Ok(())
    }

    pub fn read(&self, reader: &mut BitReader<'_>) -> Result<usize, Error> {
        Ok(self.field.read(reader)? as usize)
    }
}

/// Largest `b` such that a length field covering `[0, b]` plus `b` payload
/// bits fit in `available` bits (`available >= 2`):
/// `b = a - floor(log2(a - floor(log2(a)))) - 1`.
#[must_use]
pub const fn max_payload_bits(available: usize) -> usize {
    let a = available;
    let inner = a - floor_log2(a);

    a - floor_log2(inner) - 1
}

const fn floor_log2(value: usize) -> usize {
    (usize::BITS - 1 - value.leading_zeros()) as usize
}

///
/// TESTS
///
