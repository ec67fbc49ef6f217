//! Schema and column model.
//!
//! A [`Model`] owns up to sixteen sealed [`Schema`]s. Each schema is an
//! ordered [`ColumnSet`] plus indexes and an optional primary key. Columns are
//! tagged variants (see [`ColumnKind`]) that know how to validate, size,
//! bit-serialize and text-format their values.

pub mod column;
pub mod columns;
pub mod index;
pub mod model;
pub mod registry;
pub mod schema;

#[cfg(test)]
mod tests;

pub use column::{
    BytesColumn, Column, ColumnKind, FloatColumn, IntegerColumn, ListColumn, RecordColumn,
    RecordRole, StringColumn, TimeColumn, VirtualColumn, VirtualMapping,
};
pub use columns::ColumnSet;
pub use index::{Index, PrimaryKey};
pub use model::{MAX_MODEL_ID, MAX_SCHEMAS, MODEL_ID_SIZE, Model, RESERVED_MODEL_ID};
pub use registry::SchemaRegistry;
pub use schema::{Schema, SchemaId};

use crate::error::{Error, ErrorClass, ErrorDetail, ErrorOrigin};
use thiserror::Error as ThisError;

///
/// SchemaError
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
pub enum SchemaError {
    #[error("schema '{schema}' is sealed and can no longer be modified")]
    Sealed { schema: String },

    #[error("schema '{schema}' must be sealed first")]
    NotSealed { schema: String },

    #[error("duplicate column name '{name}'")]
    DuplicateColumn { name: String },

    #[error("unknown column '{name}'")]
    UnknownColumn { name: String },

    #[error("invalid column '{name}': {reason}")]
    InvalidColumn { name: String, reason: String },

    #[error("schema '{schema}' already has a primary key")]
    PrimaryKeyAlreadySet { schema: String },

    #[error("primary key column '{column}' must not be optional")]
    OptionalPrimaryKeyColumn { column: String },

    #[error("index '{name}' needs at least one column")]
    EmptyIndex { name: String },

    #[error("name of {len} characters exceeds the maximum of {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("model '{model}' already holds the maximum of {max} schemas")]
    TooManySchemas { model: String, max: usize },

    #[error("model ID {id} does not fit in {bits} bits")]
    ModelIdOutOfRange { id: u64, bits: u32 },

    #[error("a model with ID {id} is already registered")]
    DuplicateModel { id: u64 },

    #[error("unknown model with ID {id}")]
    UnknownModel { id: u64 },

    #[error("unknown schema {id}")]
    UnknownSchema { id: SchemaId },

    #[error("no schema registered for legacy schema ID {schema_id} version {version}")]
    UnknownLegacySchema { schema_id: i64, version: i64 },
}

impl SchemaError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Sealed { .. } | Self::NotSealed { .. } | Self::PrimaryKeyAlreadySet { .. } => {
                ErrorClass::InvalidState
            }
            Self::TooManySchemas { .. } => ErrorClass::CapacityExceeded,
            Self::UnknownModel { .. }
            | Self::UnknownSchema { .. }
            | Self::UnknownLegacySchema { .. } => ErrorClass::NotFound,
            _ => ErrorClass::Validation,
        }
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Self::new(err.class(), ErrorOrigin::Schema, err.to_string())
    }
}

///
/// ValidationError
///
/// A value failed a column constraint. Always names the column and the
/// violated constraint.
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error("invalid value for column '{column}': {constraint}")]
pub struct ValidationError {
    pub column: String,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(column: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            constraint: constraint.into(),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();

        Self::new(ErrorClass::Validation, ErrorOrigin::Record, message).with_detail(
            ErrorDetail::Column {
                column: err.column,
                constraint: err.constraint,
            },
        )
    }
}

///
/// CONSTANTS
///

/// Maximum length of schema and model names.
pub const MAX_NAME_LENGTH: usize = 256;

/// Name of the column added by `Schema::seal` when no primary key was set.
pub const AUTO_KEY_COLUMN_NAME: &str = "AutoKey";

/// Name of the column added by `Schema::seal` to track lossless storage.
pub const LOSSLESS_COLUMN_NAME: &str = "Lossless";
