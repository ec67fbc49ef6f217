use crate::{db::StoreError, model::SchemaId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// AutoIncrementDictionary
///
/// Next auto-increment key per schema. Owned by one store and persisted
/// alongside its records.
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AutoIncrementDictionary(BTreeMap<SchemaId, i64>);

impl AutoIncrementDictionary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Key the next allocation for `schema` will return.
    #[must_use]
    pub fn peek(&self, schema: SchemaId) -> i64 {
        self.0.get(&schema).copied().unwrap_or(0)
    }

    /// Allocate the next key; the first key of every schema is 0.
    pub fn next(&mut self, schema: SchemaId) -> Result<i64, StoreError> {
        let counter = self.0.entry(schema).or_insert(0);
        let key = *counter;
        *counter = key.checked_add(1).ok_or_else(|| StoreError::CounterExhausted {
            schema: schema.to_string(),
        })?;

        Ok(key)
    }

    /// Make sure future allocations skip a key that was assigned explicitly.
    pub fn observe(&mut self, schema: SchemaId, key: i64) {
        let counter = self.0.entry(schema).or_insert(0);
        if key >= *counter {
            *counter = key.saturating_add(1);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: SchemaId = SchemaId::new(7, 0);

    #[test]
    fn keys_start_at_zero_without_gaps() {
        let mut counters = AutoIncrementDictionary::new();
        let keys = (0..5).map(|_| counters.next(SCHEMA).expect("key")).collect::<Vec<_>>();
        assert_eq!(keys, vec![0, 1, 2, 3, 4]);
        assert_eq!(counters.next(SchemaId::new(7, 1)).expect("key"), 0);
    }

    #[test]
    fn explicit_keys_are_skipped() {
        let mut counters = AutoIncrementDictionary::new();
        counters.observe(SCHEMA, 41);
        counters.observe(SCHEMA, 3);
        assert_eq!(counters.next(SCHEMA).expect("key"), 42);
    }

    #[test]
    fn overflow_is_a_capacity_error() {
        let mut counters = AutoIncrementDictionary::new();
        counters.observe(SCHEMA, i64::MAX - 2);
        assert_eq!(counters.next(SCHEMA).expect("key"), i64::MAX - 1);
        assert!(matches!(
            counters.next(SCHEMA),
            Err(StoreError::CounterExhausted { .. })
        ));
    }
}
