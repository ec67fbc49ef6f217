//! ## Crate layout
//! - `core`: schemas, records, the record store, transmission framing,
//!   export/import and configuration.
//! - `io`: bit-level readers and writers, integer ranges and CRC16.
//!
//! The `prelude` module carries what collection and relay code reaches for
//! day to day.

pub use fieldkit_core as core;
pub use fieldkit_io as io;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use crate::core::{Error, ErrorClass, config::Config};

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        db::{
            Constraint, FileBackend, MemoryBackend, Order, RecordStore, RecordsQuery,
            SingleRecordQuery, Source, StoreOutcome,
        },
        export::{CsvExporter, Exporter as _, XmlExporter, XmlImporter},
        model::{
            Column, ColumnKind, FloatColumn, IntegerColumn, ListColumn, Model, RecordColumn,
            Schema, SchemaId, SchemaRegistry, StringColumn, TimeColumn, VirtualColumn,
        },
        obs::{RecordOperation, StorageObserver},
        record::{Record, RecordReference, Value, ValueSet},
        transmission::{
            Correspondent, MessageSender, Payload, RecordsPayload, Transmission,
            TransmissionStore, Transport, TransportKind,
        },
    };
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;

    #[test]
    fn prelude_covers_a_store_round_trip() {
        let mut schema = Schema::new("Plot").expect("schema");
        schema
            .add_column(Column::string("Label", false, 16).expect("label"))
            .expect("add");
        let mut model = Model::new(3, "Quickstart").expect("model");
        let schema = model.add_schema(schema).expect("seal");

        let store = RecordStore::new(MemoryBackend::new());
        let mut record = Record::new(Arc::clone(&schema)).expect("record");
        record.set("Label", "A1").expect("label");
        assert_eq!(store.store(&mut record).expect("store"), StoreOutcome::Inserted);

        let query = RecordsQuery::new(Source::schema(schema.id().expect("id")))
            .with_constraint(Constraint::eq("Label", "A1"));
        assert_eq!(store.retrieve_records(&query).expect("query"), vec![record]);
    }

    #[test]
    fn version_is_exposed() {
        assert!(!super::VERSION.is_empty());
    }
}
