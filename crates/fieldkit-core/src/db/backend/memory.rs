use crate::db::{RecordBackend, RowTable, StoreError};
use std::path::Path;

///
/// MemoryBackend
///
/// Volatile backend with real transactions: starting one snapshots the
/// table, rolling back restores the snapshot.
///

#[derive(Debug, Default)]
pub struct MemoryBackend {
    table: RowTable,
    snapshot: Option<RowTable>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn table(&self) -> &RowTable {
        &self.table
    }

    fn table_mut(&mut self) -> &mut RowTable {
        &mut self.table
    }

    fn start_transaction(&mut self) -> Result<(), StoreError> {
        if self.snapshot.is_none() {
            self.snapshot = Some(self.table.clone());
        }

        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshot = None;

        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if let Some(snapshot) = self.snapshot.take() {
            self.table = snapshot;
        }

        Ok(())
    }

    fn persisted_file(&self) -> Option<&Path> {
        None
    }
}
