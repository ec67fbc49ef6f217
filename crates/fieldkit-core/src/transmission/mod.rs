//! Transmission framing protocol.
//!
//! A [`Transmission`] frames a typed [`Payload`] as
//! `[format-version:2][payload-type:5][payload-length][payload-bits]` and
//! splits that body into transport-bounded [`Message`] parts. The receiving
//! side collects parts in any order, joins them by part number and only
//! deserializes the payload once its CRC16 hash checks out.

mod alphabet;
pub mod compression;
pub mod length;
pub mod message;
pub mod payload;
pub mod store;
pub mod transmission;
pub mod transport;


pub use compression::Compression;
pub use length::LengthField;
pub use message::{Message, MessageBody, PartHeader};
pub use payload::{AckPayload, Payload, PayloadType, RecordsPayload, ResendRequestPayload};
pub use store::{TransmissionStore, register_transmission_model, transmission_model};
pub use transmission::{
    Correspondent, MessageSender, ReceivingState, SendingState, Transmission, TransmissionState,
};
pub use transport::{Transport, TransportKind};

use crate::error::{Error, ErrorClass, ErrorDetail, ErrorOrigin};
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

pub const FORMAT_VERSION_SIZE: u32 = 2;

/// Format versions map onto `[2, 5]`, stored as `[0, 3]`.
pub const V2_FORMAT: i64 = 2;
pub const DEFAULT_FORMAT: i64 = V2_FORMAT;
pub const HIGHEST_SUPPORTED_FORMAT: i64 = V2_FORMAT;

pub const PAYLOAD_TYPE_SIZE: u32 = 5;

/// Smallest usable body: format, type, a 1-bit length field and 1 payload bit.
pub const MIN_BODY_LENGTH_BITS: usize = FORMAT_VERSION_SIZE as usize + PAYLOAD_TYPE_SIZE as usize + 2;

pub const TRANSMISSION_ID_SIZE: u32 = 24;
pub const MAX_TRANSMISSION_ID: u32 = (1 << TRANSMISSION_ID_SIZE) - 1;

pub const PAYLOAD_HASH_SIZE: u32 = 16;

/// Parts per transmission; part numbers fit in 4 bits.
pub const MAX_TRANSMISSION_PARTS: u8 = 16;

///
/// TransmissionError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum TransmissionError {
    #[error(
        "payload is too large for this transmission (size: {actual} bits; max: {max} bits; over by {} bits)",
        actual.saturating_sub(*max)
    )]
    PayloadTooLarge { actual: usize, max: usize },

    #[error("body needs {actual} {unit} after wrapping, the transport allows {max}")]
    WrapCapacityExceeded {
        actual: usize,
        max: usize,
        unit: &'static str,
    },

    #[error("transport body capacity of {bits} bits is below the minimum of {min} bits")]
    BodyTooSmall { bits: usize, min: usize },

    #[error("transmission has no payload")]
    MissingPayload,

    #[error("records payload is empty")]
    EmptyPayload,

    #[error("records payload holds {actual} {what}, the maximum is {max}")]
    PayloadLimit {
        what: &'static str,
        actual: usize,
        max: usize,
    },

    #[error("records of model {found} cannot join a payload for model {expected}")]
    MixedModels { expected: u64, found: u64 },

    #[error("transmission has already been sent")]
    AlreadySent,

    #[error("transmission has not been sent")]
    NotSent,

    #[error("{operation} is only possible on the {side} side")]
    WrongSide {
        operation: &'static str,
        side: &'static str,
    },

    #[error("a different {which} ID has already been set (existing: {existing}; new: {new})")]
    IdConflict {
        which: &'static str,
        existing: u32,
        new: u32,
    },

    #[error("transmission ID {id} does not fit in {} bits", TRANSMISSION_ID_SIZE)]
    IdOutOfRange { id: i64 },

    #[error("the local ID must be set before wrapping")]
    MissingLocalId,

    #[error("transmission is incomplete: {reason}")]
    Incomplete { reason: String },

    #[error(
        "unsupported transmission format version {version} (highest supported: {})",
        HIGHEST_SUPPORTED_FORMAT
    )]
    UnsupportedFormat { version: i64 },

    #[error("unknown payload type {tag}")]
    UnknownPayloadType { tag: u8 },

    #[error("payload hash mismatch (expected {expected:#06x}, computed {actual:#06x})")]
    HashMismatch { expected: u16, actual: u16 },

    #[error("invalid message part: {reason}")]
    InvalidPart { reason: String },

    #[error("part {part} was already received with a different body")]
    ConflictingPart { part: u8 },

    #[error("character '{character}' is not part of the SMS alphabet")]
    UnknownCharacter { character: char },

    #[error("unknown payload compression {tag}")]
    UnknownCompression { tag: u8 },

    #[error("{mode} compression failed: {message}")]
    Compression { mode: Compression, message: String },
}

impl TransmissionError {
    const fn class(&self) -> ErrorClass {
        match self {
            Self::PayloadTooLarge { .. }
            | Self::WrapCapacityExceeded { .. }
            | Self::PayloadLimit { .. } => ErrorClass::CapacityExceeded,
            Self::MissingPayload
            | Self::AlreadySent
            | Self::NotSent
            | Self::WrongSide { .. }
            | Self::IdConflict { .. }
            | Self::MissingLocalId => ErrorClass::InvalidState,
            Self::Incomplete { .. } => ErrorClass::IncompleteData,
            Self::UnsupportedFormat { .. }
            | Self::UnknownPayloadType { .. }
            | Self::UnknownCompression { .. }
            | Self::Compression { .. } => ErrorClass::UnsupportedFormat,
            Self::HashMismatch { .. } => ErrorClass::IntegrityVerification,
            Self::BodyTooSmall { .. }
            | Self::EmptyPayload
            | Self::MixedModels { .. }
            | Self::IdOutOfRange { .. }
            | Self::InvalidPart { .. }
            | Self::ConflictingPart { .. }
            | Self::UnknownCharacter { .. } => ErrorClass::Validation,
        }
    }

    const fn capacity(&self) -> Option<ErrorDetail> {
        match self {
            Self::PayloadTooLarge { actual, max }
            | Self::WrapCapacityExceeded { actual, max, .. }
            | Self::PayloadLimit { actual, max, .. } => Some(ErrorDetail::Capacity {
                actual: *actual,
                max: *max,
            }),
            _ => None,
        }
    }
}

impl From<TransmissionError> for Error {
    fn from(err: TransmissionError) -> Self {
        let error = Self::new(err.class(), ErrorOrigin::Transmission, err.to_string());

        match err.capacity() {
            Some(detail) => error.with_detail(detail),
            None => error,
        }
    }
}
