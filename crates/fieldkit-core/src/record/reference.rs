use crate::{
    db::query::SingleRecordQuery,
    error::{Error, ErrorOrigin},
    model::{ColumnSet, Schema},
    record::{Record, ValueSet, primary_key_query},
};
use std::{fmt, sync::Arc};

///
/// RecordReference
///
/// Primary-key-only projection of a record. Serves as a lightweight handle
/// (and foreign-key value) without materializing the whole record.
///

#[derive(Clone, Debug)]
pub struct RecordReference {
    schema: Arc<Schema>,
    values: ValueSet,
}

impl RecordReference {
    pub(crate) fn from_record(record: &Record) -> Result<Self, Error> {
        let schema = record.schema().clone();
        let key_columns = key_columns(&schema)?;

        let mut values = ValueSet::new(key_columns.clone());
        for (i, column) in key_columns.iter().enumerate() {
            if let Some(value) = record.get(column.name()) {
                values.set_at(i, value.clone())?;
            }
        }

        Ok(Self { schema, values })
    }

    pub fn from_values(schema: Arc<Schema>, values: ValueSet) -> Result<Self, Error> {
        let key_columns = key_columns(&schema)?;
        if !values.is_bound_to(&key_columns) {
            return Err(Error::invalid_state(
                ErrorOrigin::Record,
                format!("values do not match the primary key of schema '{}'", schema.name()),
            ));
        }

        Ok(Self { schema, values })
    }

    pub fn from_bytes(schema: Arc<Schema>, bytes: &[u8]) -> Result<Self, Error> {
        let key_columns = key_columns(&schema)?;
        let values = ValueSet::from_bytes(key_columns, bytes, true)?;

        Ok(Self { schema, values })
    }

    pub fn from_text(schema: Arc<Schema>, input: &str) -> Result<Self, Error> {
        let key_columns = key_columns(&schema)?;
        let values = ValueSet::from_text(key_columns, input)?;

        Ok(Self { schema, values })
    }

    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub const fn values(&self) -> &ValueSet {
        &self.values
    }

    /// Whether every key column holds a value.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.values.is_complete()
    }

    /// Key values are always written losslessly.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        self.values.to_bytes(true)
    }

    #[must_use]
    pub fn to_text(&self) -> String {
        self.values.to_text()
    }

    pub fn record_query(&self) -> Result<SingleRecordQuery, Error> {
        primary_key_query(&self.schema, &self.values)
    }
}

impl PartialEq for RecordReference {
    fn eq(&self, other: &Self) -> bool {
        self.schema.id() == other.schema.id() && self.values == other.values
    }
}

impl fmt::Display for RecordReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.schema.name(), self.values.to_text())
    }
}

fn key_columns(schema: &Schema) -> Result<Arc<ColumnSet>, Error> {
    schema.primary_key_columns().cloned().ok_or_else(|| {
        Error::invalid_state(
            ErrorOrigin::Record,
            format!("schema '{}' must be sealed first", schema.name()),
        )
    })
}
