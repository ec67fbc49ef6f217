use fieldkit_io::BitIoError;
use std::fmt;
use thiserror::Error as ThisError;

///
/// Error
///
/// Structured error shared by every fieldkit subsystem. Subsystem errors
/// (`SchemaError`, `ValidationError`, `StoreError`, ...) convert into this
/// type with a stable class and origin so callers can branch on the kind of
/// failure without matching on messages.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct Error {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured detail for failures callers act on directly.
    pub detail: Option<ErrorDetail>,
}

impl Error {
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    #[must_use]
    pub fn with_detail(mut self, detail: ErrorDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Construct a capacity error carrying the actual and allowed sizes.
    pub fn capacity(origin: ErrorOrigin, actual: usize, max: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::CapacityExceeded, origin, message)
            .with_detail(ErrorDetail::Capacity { actual, max })
    }

    /// Construct an invalid-state error for a specific origin.
    pub(crate) fn invalid_state(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::InvalidState, origin, message)
    }

    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self.class, ErrorClass::Validation)
    }

    #[must_use]
    pub const fn is_capacity_exceeded(&self) -> bool {
        matches!(self.class, ErrorClass::CapacityExceeded)
    }

    #[must_use]
    pub const fn is_primary_key_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::PrimaryKeyConflict)
    }

    #[must_use]
    pub const fn is_incomplete(&self) -> bool {
        matches!(self.class, ErrorClass::IncompleteData)
    }

    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(self.class, ErrorClass::IntegrityVerification)
    }

    #[must_use]
    pub const fn is_unsupported(&self) -> bool {
        matches!(self.class, ErrorClass::UnsupportedFormat)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ErrorDetail {
    Capacity { actual: usize, max: usize },
    Column { column: String, constraint: String },
}

impl ErrorDetail {
    /// Amount by which a capacity limit was exceeded.
    #[must_use]
    pub const fn overage(&self) -> Option<usize> {
        match self {
            Self::Capacity { actual, max } => Some(actual.saturating_sub(*max)),
            Self::Column { .. } => None,
        }
    }
}

///
/// ErrorClass
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorClass {
    Validation,
    CapacityExceeded,
    PrimaryKeyConflict,
    IncompleteData,
    IntegrityVerification,
    UnsupportedFormat,
    StorageBackend,
    InvalidState,
    NotFound,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::PrimaryKeyConflict => "primary_key_conflict",
            Self::IncompleteData => "incomplete_data",
            Self::IntegrityVerification => "integrity_verification",
            Self::UnsupportedFormat => "unsupported_format",
            Self::StorageBackend => "storage_backend",
            Self::InvalidState => "invalid_state",
            Self::NotFound => "not_found",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorOrigin {
    Io,
    Schema,
    Record,
    Store,
    Transmission,
    Export,
    Config,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Io => "io",
            Self::Schema => "schema",
            Self::Record => "record",
            Self::Store => "store",
            Self::Transmission => "transmission",
            Self::Export => "export",
            Self::Config => "config",
        };
        write!(f, "{label}")
    }
}

// ============================================================================
// Subsystem conversions
// ============================================================================

impl From<BitIoError> for Error {
    fn from(err: BitIoError) -> Self {
        let class = match &err {
            BitIoError::EndOfStream | BitIoError::Incomplete { .. } => ErrorClass::IncompleteData,
            BitIoError::InvalidString { .. } => ErrorClass::UnsupportedFormat,
            _ => ErrorClass::Validation,
        };

        Self::new(class, ErrorOrigin::Io, err.to_string())
    }
}

///
/// TESTS
///
