//! Bit-granular I/O primitives for fieldkit.
//!
//! Everything that fieldkit serializes (records, transmission bodies, part
//! envelopes) is written onto a [`BitWriter`] and read back through a
//! [`BitReader`]. Bit order is big-endian, most significant bit first, both
//! within a byte and across multi-bit fields.
//!
//! ## Layout
//! - `bits`: the packed [`BitArray`] container.
//! - `writer` / `reader`: forward-only streams over a `BitArray`.
//! - `range`: [`IntegerRange`], a bounded integer field of minimal width.
//! - `charset`: string encodings supported by the string primitives.
//! - `hash`: CRC16 over serialized bytes.
#![warn(unreachable_pub)]

mod bits;
mod charset;
mod error;
mod hash;
mod range;
mod reader;
mod writer;

pub use bits::BitArray;
pub use charset::Charset;
pub use error::BitIoError;
pub use hash::{crc16, crc16_bits};
pub use range::{IntegerRange, bit_length};
pub use reader::BitReader;
pub use writer::BitWriter;

///
/// CONSTANTS
///

/// Largest width handled with native integer operations.
pub const MAX_NATIVE_INTEGER_BITS: u32 = i64::BITS;
