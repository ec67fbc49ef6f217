use crate::{
    db::{
        BACKUP_SUFFIX, DATABASE_FILE_EXTENSION, DATABASE_NAME_SUFFIX, RecordBackend, RecordsQuery,
        RowId, SingleRecordQuery, StoreError, StoreOutcome, backend::codec,
    },
    error::{Error, ErrorOrigin},
    obs::{RecordOperation, StorageEvent, StorageObserver},
    record::{Record, RecordReference},
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use time::{OffsetDateTime, macros::format_description};

///
/// StoreState
///

#[derive(Debug)]
struct StoreState<B> {
    backend: B,
    transaction_depth: usize,
    closed: bool,
    // events of the open transaction, delivered once it commits
    pending: Vec<StorageEvent>,
}

///
/// RecordStore
///
/// Upsert engine over a [`RecordBackend`]. Every operation runs under the
/// store lock, so key allocation and the write that uses the key are atomic
/// with respect to other writers. Writes outside an explicit transaction
/// are committed immediately.
///

pub struct RecordStore<B: RecordBackend> {
    state: Mutex<StoreState<B>>,
    observers: RwLock<Vec<Arc<dyn StorageObserver>>>,
}

impl<B: RecordBackend> RecordStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            state: Mutex::new(StoreState {
                backend,
                transaction_depth: 0,
                closed: false,
                pending: Vec::new(),
            }),
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn StorageObserver>) {
        self.observers.write().push(observer);
    }

    /// Run `f` against the backend, e.g. to inspect the row table.
    pub fn with_backend<R>(&self, f: impl FnOnce(&B) -> R) -> R {
        f(&self.state.lock().backend)
    }

    /// Consume the store, returning the backend.
    pub fn into_backend(self) -> B {
        self.state.into_inner().backend
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Insert or update `record`. An unset auto-increment key is allocated
    /// and written back into `record`.
    pub fn store(&self, record: &mut Record) -> Result<StoreOutcome, Error> {
        self.write(|state, events| upsert(state, record, true, events))
    }

    /// Strict insert: storing a record whose primary key is taken by a
    /// record with different values fails with a primary-key conflict.
    pub fn insert(&self, record: &mut Record) -> Result<StoreOutcome, Error> {
        let outcome = self.write(|state, events| upsert(state, record, false, events))?;

        if outcome == StoreOutcome::Updated {
            return Err(StoreError::PrimaryKeyConflict {
                reference: describe(record),
            }
            .into());
        }

        Ok(outcome)
    }

    /// Store every record in one transaction; nothing is kept if any fails.
    pub fn store_all(&self, records: &mut [Record]) -> Result<Vec<StoreOutcome>, Error> {
        self.start_transaction()?;

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records.iter_mut() {
            match self.store(record) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    if let Err(rollback) = self.rollback_transaction() {
                        tracing::warn!(error = %rollback, "rollback after failed batch store failed");
                    }
                    return Err(err);
                }
            }
        }
        self.commit_transaction()?;

        Ok(outcomes)
    }

    /// Delete the stored record with `record`'s primary key.
    pub fn delete(&self, record: &Record) -> Result<bool, Error> {
        let query = record.record_query()?;

        self.write(|state, events| {
            let found = query
                .select(state.backend.table().rows())
                .map(|(row, _)| row);
            let Some(row) = found else {
                return Ok(false);
            };

            remove_row(state, row, events)?;

            Ok(true)
        })
    }

    /// Delete every record the query selects, returning how many were removed.
    pub fn delete_records(&self, query: &RecordsQuery) -> Result<usize, Error> {
        self.write(|state, events| {
            let rows = query
                .select(state.backend.table().rows())
                .into_iter()
                .map(|(row, _)| row)
                .collect::<Vec<_>>();

            for row in &rows {
                remove_row(state, *row, events)?;
            }

            Ok(rows.len())
        })
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn retrieve_records(&self, query: &RecordsQuery) -> Result<Vec<Record>, Error> {
        let state = self.open_state()?;

        Ok(query
            .select(state.backend.table().rows())
            .into_iter()
            .map(|(_, record)| record.clone())
            .collect())
    }

    pub fn retrieve_record(&self, query: &SingleRecordQuery) -> Result<Option<Record>, Error> {
        let state = self.open_state()?;

        Ok(query
            .select(state.backend.table().rows())
            .map(|(_, record)| record.clone()))
    }

    pub fn retrieve_record_references(&self, query: &RecordsQuery) -> Result<Vec<RecordReference>, Error> {
        let state = self.open_state()?;

        query
            .select(state.backend.table().rows())
            .into_iter()
            .map(|(_, record)| record.reference())
            .collect()
    }

    pub fn retrieve_all_records(&self) -> Result<Vec<Record>, Error> {
        self.retrieve_records(&RecordsQuery::all())
    }

    /// Look a record up by reference.
    pub fn retrieve_by_reference(&self, reference: &RecordReference) -> Result<Option<Record>, Error> {
        self.retrieve_record(&reference.record_query()?)
    }

    /// Whether a record with `record`'s primary key is stored.
    pub fn has_record(&self, record: &Record) -> Result<bool, Error> {
        Ok(self.retrieve_record(&record.record_query()?)?.is_some())
    }

    pub fn record_count(&self, query: &RecordsQuery) -> Result<usize, Error> {
        let state = self.open_state()?;

        Ok(query.select(state.backend.table().rows()).len())
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Open a transaction; nested calls only bump the depth.
    pub fn start_transaction(&self) -> Result<(), Error> {
        let mut state = self.open_state()?;
        if state.transaction_depth == 0 {
            state.backend.start_transaction()?;
        }
        state.transaction_depth += 1;

        Ok(())
    }

    /// Close one transaction level; the outermost level commits and
    /// delivers the transaction's events to observers.
    pub fn commit_transaction(&self) -> Result<(), Error> {
        let events = {
            let mut state = self.open_state()?;
            if state.transaction_depth == 0 {
                return Err(StoreError::NoTransaction.into());
            }

            state.transaction_depth -= 1;
            if state.transaction_depth > 0 {
                return Ok(());
            }
            let events = std::mem::take(&mut state.pending);
            commit(&mut *state)?;

            events
        };
        self.notify(&events);

        Ok(())
    }

    /// Roll back the whole transaction, whatever its depth. Observers never
    /// hear about the discarded writes.
    pub fn rollback_transaction(&self) -> Result<(), Error> {
        let mut state = self.open_state()?;
        if state.transaction_depth == 0 {
            return Err(StoreError::NoTransaction.into());
        }

        state.transaction_depth = 0;
        state.pending.clear();
        state.backend.rollback()?;

        Ok(())
    }

    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.state.lock().transaction_depth > 0
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Commit pending changes and copy the persisted store into `folder`.
    /// With `label_as_backup` the copy's name carries a backup suffix and a
    /// sortable timestamp.
    pub fn backup(&self, folder: impl AsRef<Path>, label_as_backup: bool) -> Result<PathBuf, Error> {
        let mut state = self.open_state()?;
        if state.transaction_depth > 0 {
            tracing::debug!(depth = state.transaction_depth, "committing open transaction before backup");
            state.transaction_depth = 0;
        }
        let events = std::mem::take(&mut state.pending);
        commit(&mut *state)?;

        let folder = folder.as_ref();
        fs::create_dir_all(folder).map_err(|source| StoreError::File {
            operation: "create folder",
            path: folder.to_path_buf(),
            source,
        })?;

        let mut file_name = format!("{}{DATABASE_NAME_SUFFIX}", state.backend.name());
        if label_as_backup {
            file_name.push_str(BACKUP_SUFFIX);
            file_name.push_str(&file_timestamp(OffsetDateTime::now_utc())?);
        }
        let destination = folder.join(format!("{file_name}.{DATABASE_FILE_EXTENSION}"));

        match state.backend.persisted_file() {
            Some(source) => {
                fs::copy(source, &destination).map_err(|source| StoreError::File {
                    operation: "copy",
                    path: destination.clone(),
                    source,
                })?;
            }
            None => {
                let bytes = codec::encode(state.backend.table())?;
                fs::write(&destination, bytes).map_err(|source| StoreError::File {
                    operation: "write",
                    path: destination.clone(),
                    source,
                })?;
            }
        }
        tracing::debug!(destination = %destination.display(), "record store backed up");
        drop(state);
        self.notify(&events);

        Ok(destination)
    }

    /// Flush and close the store; later calls fail. An open transaction is
    /// committed.
    pub fn close(&self) -> Result<(), Error> {
        let events = {
            let mut state = self.open_state()?;
            state.transaction_depth = 0;
            let events = std::mem::take(&mut state.pending);
            state.backend.close()?;
            state.closed = true;

            events
        };
        self.notify(&events);

        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn open_state(&self) -> Result<MutexGuard<'_, StoreState<B>>, Error> {
        let state = self.state.lock();
        if state.closed {
            return Err(StoreError::Closed.into());
        }

        Ok(state)
    }

    /// Run a write under the lock. Outside a transaction the write is
    /// committed and observers are notified once the lock is released;
    /// inside one its events wait for the outermost commit.
    fn write<R>(
        &self,
        op: impl FnOnce(&mut StoreState<B>, &mut Vec<StorageEvent>) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut events = Vec::new();
        let result = {
            let mut state = self.open_state()?;
            let result = op(&mut *state, &mut events)?;
            if state.transaction_depth > 0 {
                state.pending.append(&mut events);
            } else if !events.is_empty() {
                commit(&mut *state)?;
            }

            result
        };
        self.notify(&events);

        Ok(result)
    }

    fn notify(&self, events: &[StorageEvent]) {
        if events.is_empty() {
            return;
        }

        let observers = self.observers.read();
        for event in events {
            for observer in observers.iter() {
                observer.record_changed(event.operation, &event.reference);
            }
        }
    }
}

// ============================================================================
// Upsert state machine
// ============================================================================

fn upsert<B: RecordBackend>(
    state: &mut StoreState<B>,
    record: &mut Record,
    update_allowed: bool,
    events: &mut Vec<StorageEvent>,
) -> Result<StoreOutcome, Error> {
    let schema = record.schema().clone();
    let schema_id = schema.id().ok_or_else(|| StoreError::UnregisteredSchema {
        schema: schema.name().to_string(),
    })?;

    // unset auto-increment key: allocate, the record cannot exist yet
    if schema.auto_increment_column().is_some() && record.auto_key().is_none() {
        let key = state.backend.table().counters().peek(schema_id);
        record.set_auto_key(key)?;
        if let Err(err) = record.validate_complete() {
            clear_auto_key(record);
            return Err(err.into());
        }
        if let Err(err) = state.backend.table_mut().counters_mut().next(schema_id) {
            clear_auto_key(record);
            return Err(err.into());
        }

        return Ok(insert_row(state, record, events)?);
    }

    record.validate_complete()?;

    let query = record.record_query()?;
    let previous = query
        .select(state.backend.table().rows())
        .map(|(row, stored)| (row, stored.clone()));

    let outcome = match previous {
        None => insert_row(state, record, events)?,
        Some((_, stored)) if stored.has_equal_values(record) => StoreOutcome::Unchanged,
        Some((row, stored)) if update_allowed => {
            // read-modify-write: keep the stored row, replace its values
            let mut updated = stored;
            *updated = record.value_set().clone();
            state.backend.table_mut().replace(row, updated);
            events.push(StorageEvent {
                operation: RecordOperation::Updated,
                reference: record.reference()?,
            });

            StoreOutcome::Updated
        }
        Some(_) => StoreOutcome::Updated,
    };
    tracing::debug!(schema = %schema_id, outcome = %outcome, "stored record");

    Ok(outcome)
}

fn insert_row<B: RecordBackend>(
    state: &mut StoreState<B>,
    record: &Record,
    events: &mut Vec<StorageEvent>,
) -> Result<StoreOutcome, Error> {
    let reference = record.reference()?;
    if let (Some(id), Some(key)) = (record.schema().id(), record.auto_key()) {
        state.backend.table_mut().counters_mut().observe(id, key);
    }

    state.backend.table_mut().insert(record.clone());
    events.push(StorageEvent {
        operation: RecordOperation::Inserted,
        reference,
    });

    Ok(StoreOutcome::Inserted)
}

fn remove_row<B: RecordBackend>(
    state: &mut StoreState<B>,
    row: RowId,
    events: &mut Vec<StorageEvent>,
) -> Result<(), Error> {
    if let Some(removed) = state.backend.table_mut().remove(row) {
        events.push(StorageEvent {
            operation: RecordOperation::Deleted,
            reference: removed.reference()?,
        });
    }

    Ok(())
}

fn clear_auto_key(record: &mut Record) {
    if let Some(name) = record.schema().auto_increment_column().map(|c| c.name().to_string()) {
        let _ = record.clear(&name);
    }
}

/// Commit the backend; on failure roll back, logging (not returning) any
/// rollback error so the commit error reaches the caller.
fn commit<B: RecordBackend>(state: &mut StoreState<B>) -> Result<(), Error> {
    if let Err(err) = state.backend.commit() {
        if let Err(rollback) = state.backend.rollback() {
            tracing::warn!(
                backend = state.backend.name(),
                error = %rollback,
                "rollback after failed commit failed"
            );
        }

        return Err(err.into());
    }

    Ok(())
}

fn describe(record: &Record) -> String {
    record
        .reference()
        .map_or_else(|_| record.schema().name().to_string(), |r| r.to_string())
}

/// Sortable, file-name safe timestamp (`yyyy-mm-ddThh-mm-ss`).
pub(crate) fn file_timestamp(now: OffsetDateTime) -> Result<String, Error> {
    let format = format_description!("[year]-[month]-[day]T[hour]-[minute]-[second]");

    now.format(&format)
        .map_err(|err| Error::invalid_state(ErrorOrigin::Store, err.to_string()))
}
