pub(crate) mod codec;
mod file;
mod memory;

pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::{
    db::{AutoIncrementDictionary, StoreError},
    model::SchemaId,
    record::Record,
};
use std::{collections::BTreeMap, path::Path};

///
/// RowId
///
/// Opaque handle of a persisted row. Stable for the lifetime of the row.
///

pub type RowId = u64;

///
/// OpaqueRow
///
/// Persisted row whose schema the current registry does not know. Kept as
/// its stored bytes so that flushing the table writes it back unchanged.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpaqueRow {
    pub schema: SchemaId,
    pub bytes: Vec<u8>,
}

///
/// RowTable
///
/// In-memory image of a store: rows by handle plus the auto-increment
/// counters persisted with them. Rows of unknown schemas are carried
/// along untouched and never show up in queries.
///

#[derive(Clone, Debug, Default)]
pub struct RowTable {
    rows: BTreeMap<RowId, Record>,
    opaque: BTreeMap<RowId, OpaqueRow>,
    next_row: RowId,
    counters: AutoIncrementDictionary,
}

impl RowTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) const fn from_parts(
        rows: BTreeMap<RowId, Record>,
        opaque: BTreeMap<RowId, OpaqueRow>,
        next_row: RowId,
        counters: AutoIncrementDictionary,
    ) -> Self {
        Self {
            rows,
            opaque,
            next_row,
            counters,
        }
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowId, &Record)> {
        self.rows.iter().map(|(id, record)| (*id, record))
    }

    #[must_use]
    pub fn get(&self, id: RowId) -> Option<&Record> {
        self.rows.get(&id)
    }

    pub fn insert(&mut self, record: Record) -> RowId {
        let id = self.next_row;
        self.next_row += 1;
        self.rows.insert(id, record);

        id
    }

    /// Replace the record stored under `id`, returning the previous one.
    pub fn replace(&mut self, id: RowId, record: Record) -> Option<Record> {
        self.rows.get_mut(&id).map(|slot| std::mem::replace(slot, record))
    }

    pub fn remove(&mut self, id: RowId) -> Option<Record> {
        self.rows.remove(&id)
    }

    /// Rows kept back because their schema is not registered.
    pub fn opaque_rows(&self) -> impl Iterator<Item = (RowId, &OpaqueRow)> {
        self.opaque.iter().map(|(id, row)| (*id, row))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub const fn next_row(&self) -> RowId {
        self.next_row
    }

    #[must_use]
    pub const fn counters(&self) -> &AutoIncrementDictionary {
        &self.counters
    }

    pub const fn counters_mut(&mut self) -> &mut AutoIncrementDictionary {
        &mut self.counters
    }
}

///
/// RecordBackend
///
/// Storage behind a `RecordStore`. Backends without real transactions
/// treat `commit` as a flush checkpoint.
///

pub trait RecordBackend {
    /// Human-readable backend name, used in logs.
    fn name(&self) -> &str;

    fn table(&self) -> &RowTable;

    fn table_mut(&mut self) -> &mut RowTable;

    fn start_transaction(&mut self) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    /// File holding the persisted store, if the backend has one.
    fn persisted_file(&self) -> Option<&Path>;

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
