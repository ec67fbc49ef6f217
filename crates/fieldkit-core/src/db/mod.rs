//! Record persistence.
//!
//! [`RecordStore`] implements the upsert state machine (insert, update or
//! no-op), auto-increment key allocation, queries, transactions and
//! backups on top of a [`RecordBackend`].

pub mod backend;
pub mod counter;
pub mod query;
pub mod store;


pub use backend::{FileBackend, MemoryBackend, OpaqueRow, RecordBackend, RowId, RowTable};
pub use counter::AutoIncrementDictionary;
pub use query::{CompareOp, Constraint, NO_LIMIT, Order, RecordsQuery, SingleRecordQuery, Source};
pub use store::RecordStore;

use crate::error::{Error, ErrorClass, ErrorOrigin};
use derive_more::Display;
use std::path::PathBuf;
use thiserror::Error as ThisError;

///
/// CONSTANTS
///

/// Suffix appended to a store's base name to form its file name.
pub const DATABASE_NAME_SUFFIX: &str = "-RecordStore";

/// Extension of persisted store files.
pub const DATABASE_FILE_EXTENSION: &str = "cbor";

/// Inserted between the store file name and the timestamp of a backup.
pub const BACKUP_SUFFIX: &str = "_Backup_";

///
/// StoreOutcome
///
/// Effect of a store call. `Updated` is also reported when an update was
/// needed but not allowed.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum StoreOutcome {
    #[display("inserted")]
    Inserted,
    #[display("updated")]
    Updated,
    #[display("unchanged")]
    Unchanged,
}

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("record {reference} conflicts with a stored record holding different values")]
    PrimaryKeyConflict { reference: String },

    #[error("auto-increment counter of schema {schema} is exhausted")]
    CounterExhausted { schema: String },

    #[error("schema '{schema}' does not belong to a model and cannot be stored")]
    UnregisteredSchema { schema: String },

    #[error("no stored record matches {reference}")]
    RecordNotFound { reference: String },

    #[error("record store is closed")]
    Closed,

    #[error("no transaction is open")]
    NoTransaction,

    #[error("{operation} failed on '{}': {source}", path.display())]
    File {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot {operation} the store snapshot: {message}")]
    Codec {
        operation: &'static str,
        message: String,
    },
}

impl StoreError {
    const fn class(&self) -> ErrorClass {
        match self {
            Self::PrimaryKeyConflict { .. } => ErrorClass::PrimaryKeyConflict,
            Self::CounterExhausted { .. } => ErrorClass::CapacityExceeded,
            Self::UnregisteredSchema { .. } | Self::Closed | Self::NoTransaction => {
                ErrorClass::InvalidState
            }
            Self::RecordNotFound { .. } => ErrorClass::NotFound,
            Self::File { .. } | Self::Codec { .. } => ErrorClass::StorageBackend,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Self::new(err.class(), ErrorOrigin::Store, err.to_string())
    }
}
