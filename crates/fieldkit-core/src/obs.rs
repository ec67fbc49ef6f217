//! Storage event boundary.
//!
//! Record stores report every successful write as a [`RecordOperation`]
//! to the registered [`StorageObserver`]s. Events are delivered after the
//! write is committed and outside of the store lock, so observers may call
//! back into the store.

use crate::record::RecordReference;
use derive_more::Display;

///
/// RecordOperation
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum RecordOperation {
    #[display("inserted")]
    Inserted,
    #[display("updated")]
    Updated,
    #[display("deleted")]
    Deleted,
}

///
/// StorageObserver
///

pub trait StorageObserver: Send + Sync {
    fn record_changed(&self, operation: RecordOperation, reference: &RecordReference);
}

///
/// StorageEvent
///

#[derive(Clone, Debug)]
pub(crate) struct StorageEvent {
    pub operation: RecordOperation,
    pub reference: RecordReference,
}
