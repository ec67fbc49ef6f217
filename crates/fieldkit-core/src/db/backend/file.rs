use crate::{
    db::{
        DATABASE_FILE_EXTENSION, DATABASE_NAME_SUFFIX, RecordBackend, RowTable, StoreError,
        backend::codec,
    },
    model::SchemaRegistry,
};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

///
/// FileBackend
///
/// Single-file backend with one always-open transaction. Commit flushes
/// the whole table to disk; rollback reloads the last flushed state.
///

#[derive(Debug)]
pub struct FileBackend {
    name: String,
    path: PathBuf,
    registry: Arc<SchemaRegistry>,
    table: RowTable,
}

impl FileBackend {
    /// Open (or create) `<folder>/<base_name>-RecordStore.cbor`.
    pub fn open(
        folder: impl AsRef<Path>,
        base_name: &str,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self, StoreError> {
        let folder = folder.as_ref();
        fs::create_dir_all(folder).map_err(|source| StoreError::File {
            operation: "create folder",
            path: folder.to_path_buf(),
            source,
        })?;

        let path = folder.join(Self::file_name(base_name));
        let table = if path.exists() {
            load(&path, &registry)?
        } else {
            RowTable::new()
        };
        tracing::debug!(path = %path.display(), rows = table.len(), "opened file record store");

        Ok(Self {
            name: base_name.to_string(),
            path,
            registry,
            table,
        })
    }

    #[must_use]
    pub fn file_name(base_name: &str) -> String {
        format!("{base_name}{DATABASE_NAME_SUFFIX}.{DATABASE_FILE_EXTENSION}")
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    fn flush(&self) -> Result<(), StoreError> {
        let bytes = codec::encode(&self.table)?;
        let staging = self.path.with_extension(format!("{DATABASE_FILE_EXTENSION}.tmp"));

        fs::write(&staging, bytes).map_err(|source| StoreError::File {
            operation: "write",
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &self.path).map_err(|source| StoreError::File {
            operation: "rename",
            path: self.path.clone(),
            source,
        })
    }
}

impl RecordBackend for FileBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn table(&self) -> &RowTable {
        &self.table
    }

    fn table_mut(&mut self) -> &mut RowTable {
        &mut self.table
    }

    // The single transaction is always open.
    fn start_transaction(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.flush()
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let restored = if self.path.exists() {
            load(&self.path, &self.registry)
        } else {
            Ok(RowTable::new())
        };

        match restored {
            Ok(table) => self.table = table,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "rollback failed, keeping in-memory state");
            }
        }

        Ok(())
    }

    fn persisted_file(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.flush()
    }
}

fn load(path: &Path, registry: &SchemaRegistry) -> Result<RowTable, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::File {
        operation: "read",
        path: path.to_path_buf(),
        source,
    })?;

    codec::decode(&bytes, registry)
}
