//! Core runtime for fieldkit: schemas and columns, records, the upserting
//! record store, transmission framing, export/import and configuration.
//!
//! ## Layout
//! - `model`: models, schemas, columns and the schema registry.
//! - `record`: values, value sets, records and record references.
//! - `db`: the record store, its backends and queries.
//! - `transmission`: payload framing, transports and the transmission store.
//! - `export`: schema traversal, CSV export and XML export/import.
//! - `config`: TOML configuration for stores and transports.
//! - `obs`: storage events delivered to observers.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod model;
pub mod obs;
pub mod record;
pub mod transmission;

pub use error::{Error, ErrorClass, ErrorDetail, ErrorOrigin};

///
/// Prelude
///
/// Domain vocabulary only. Stores, exporters and errors are reached
/// through their modules.
///

pub mod prelude {
    pub use crate::{
        db::{Constraint, Order, RecordsQuery, SingleRecordQuery, Source, StoreOutcome},
        model::{Column, ColumnKind, Model, Schema, SchemaId, SchemaRegistry},
        record::{Record, RecordReference, Value, ValueSet},
        transmission::{Payload, Transmission, TransportKind},
    };
}
