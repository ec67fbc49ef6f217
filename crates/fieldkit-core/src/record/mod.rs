//! Values bound to column sets and schemas.
//!
//! A [`ValueSet`] holds one optional value per column of a [`ColumnSet`]. A
//! [`Record`] is a value set bound to a sealed [`Schema`]; it can be
//! projected onto its primary key as a [`RecordReference`].

pub mod reference;
pub mod text;
pub mod value;


pub use reference::RecordReference;
pub use value::Value;

use crate::{
    db::query::{Constraint, RecordsQuery, SingleRecordQuery, Source},
    error::{Error, ErrorOrigin},
    model::{ColumnSet, Schema, SchemaError, ValidationError},
};
use derive_more::{Deref, DerefMut};
use fieldkit_io::{BitArray, BitReader, BitWriter};
use std::sync::Arc;

// ============================================================================
// ValueSet
// ============================================================================

///
/// ValueSet
///
/// One optional value per column, in column order. Values are validated
/// when set; completeness (every non-optional column holding a value) is
/// enforced when serializing.
///

#[derive(Clone, Debug)]
pub struct ValueSet {
    columns: Arc<ColumnSet>,
    values: Vec<Option<Value>>,
}

impl ValueSet {
    /// Empty value set; columns with a default value start out holding it.
    #[must_use]
    pub fn new(columns: Arc<ColumnSet>) -> Self {
        let values = columns
            .iter()
            .map(|column| column.default_value().cloned())
            .collect();

        Self { columns, values }
    }

    /// Value set from positional values, checked against the columns.
    pub fn with_values(columns: Arc<ColumnSet>, values: Vec<Option<Value>>) -> Result<Self, ValidationError> {
        if values.len() != columns.len() {
            return Err(ValidationError::new(
                columns.name(),
                format!("expected {} values, got {}", columns.len(), values.len()),
            ));
        }
        for (column, value) in columns.iter().zip(&values) {
            if let Some(value) = value {
                column.validate(value)?;
            }
        }

        Ok(Self { columns, values })
    }

    /// Deserialize from bit-packed bytes; the lossless flag must match the
    /// one used when writing.
    pub fn from_bytes(columns: Arc<ColumnSet>, bytes: &[u8], lossless: bool) -> Result<Self, Error> {
        let bits = BitArray::from_bytes(bytes);
        let mut reader = BitReader::new(&bits);

        Self::read_from(columns, &mut reader, lossless)
    }

    pub fn read_from(
        columns: Arc<ColumnSet>,
        reader: &mut BitReader<'_>,
        lossless: bool,
    ) -> Result<Self, Error> {
        let values = columns
            .iter()
            .map(|column| column.read(reader, lossless))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns, values })
    }

    /// Parse the escaped, `;`-separated form produced by [`Self::to_text`].
    pub fn from_text(columns: Arc<ColumnSet>, input: &str) -> Result<Self, ValidationError> {
        let fields = text::split(input, text::FIELD_SEPARATOR)
            .map_err(|reason| ValidationError::new(columns.name(), reason))?;
        if fields.len() != columns.len() {
            return Err(ValidationError::new(
                columns.name(),
                format!("expected {} fields, got {}", columns.len(), fields.len()),
            ));
        }

        let values = columns
            .iter()
            .zip(fields)
            .map(|(column, field)| field.map(|f| column.parse(&f)).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { columns, values })
    }

    #[must_use]
    pub const fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    /// Whether this value set was built for `columns` (same set, or a
    /// structurally identical one).
    #[must_use]
    pub fn is_bound_to(&self, columns: &Arc<ColumnSet>) -> bool {
        Arc::ptr_eq(&self.columns, columns) || *self.columns == **columns
    }

    // ------------------------------------------------------------------
    // Access
    // ------------------------------------------------------------------

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.position(name).and_then(|i| self.get_at(i))
    }

    #[must_use]
    pub fn get_at(&self, position: usize) -> Option<&Value> {
        self.values.get(position).and_then(Option::as_ref)
    }

    #[must_use]
    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        let position = self.position_or_error(name)?;

        self.set_at(position, value.into())
    }

    pub fn set_at(&mut self, position: usize, value: Value) -> Result<(), Error> {
        let column = self
            .columns
            .column_at(position)
            .ok_or_else(|| Error::invalid_state(ErrorOrigin::Record, format!("no column at position {position}")))?;
        column.validate(&value)?;
        self.values[position] = Some(value);

        Ok(())
    }

    pub fn clear(&mut self, name: &str) -> Result<(), Error> {
        let position = self.position_or_error(name)?;
        self.values[position] = None;

        Ok(())
    }

    #[must_use]
    pub fn is_value_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Value of a virtual column, derived from its target column.
    #[must_use]
    pub fn virtual_value(&self, name: &str) -> Option<String> {
        let (target, column) = self.columns.virtual_column(name)?;
        let target_column = self.columns.column_at(target)?;

        column.derive(target_column, self.get_at(target)?)
    }

    /// Deep comparison of the values, ignoring object identity.
    #[must_use]
    pub fn has_equal_values(&self, other: &Self) -> bool {
        self.is_bound_to(&other.columns) && self.values == other.values
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.validate_complete().is_ok()
    }

    /// Check that every non-optional column holds a valid value.
    pub fn validate_complete(&self) -> Result<(), ValidationError> {
        for (column, value) in self.columns.iter().zip(&self.values) {
            column.validate_slot(value.as_ref())?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Binary form
    // ------------------------------------------------------------------

    pub fn write_to(&self, writer: &mut BitWriter, lossless: bool) -> Result<(), Error> {
        self.write_with(writer, lossless, None)
    }

    /// Write every column; the column at `lossless_flag` (if any) records
    /// whether this particular write kept full precision.
    pub(crate) fn write_with(
        &self,
        writer: &mut BitWriter,
        lossless: bool,
        lossless_flag: Option<usize>,
    ) -> Result<(), Error> {
        for (i, (column, value)) in self.columns.iter().zip(&self.values).enumerate() {
            if Some(i) == lossless_flag {
                let stored = value.as_ref().and_then(Value::as_bool).unwrap_or(true);
                column.write(Some(&Value::Boolean(stored && lossless)), writer, lossless)?;
            } else {
                column.write(value.as_ref(), writer, lossless)?;
            }
        }

        Ok(())
    }

    pub fn to_bits(&self, lossless: bool) -> Result<BitArray, Error> {
        let mut writer = BitWriter::new();
        self.write_to(&mut writer, lossless)?;

        Ok(writer.finish())
    }

    pub fn to_bytes(&self, lossless: bool) -> Result<Vec<u8>, Error> {
        Ok(self.to_bits(lossless)?.to_bytes())
    }

    // ------------------------------------------------------------------
    // Text form
    // ------------------------------------------------------------------

    #[must_use]
    pub fn to_text(&self) -> String {
        text::join(
            self.columns
                .iter()
                .zip(&self.values)
                .map(|(column, value)| value.as_ref().map(|v| column.format(v))),
            text::FIELD_SEPARATOR,
        )
    }

    fn position_or_error(&self, name: &str) -> Result<usize, Error> {
        if let Some(position) = self.columns.position(name) {
            return Ok(position);
        }
        if self.columns.virtual_column(name).is_some() {
            return Err(Error::invalid_state(
                ErrorOrigin::Record,
                format!("virtual column '{name}' is read-only"),
            ));
        }

        Err(SchemaError::UnknownColumn {
            name: name.to_string(),
        }
        .into())
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.has_equal_values(other)
    }
}

// ============================================================================
// Record
// ============================================================================

///
/// Record
///
/// Value set bound to a sealed schema. Dereferences to its [`ValueSet`].
///

#[derive(Clone, Debug, Deref, DerefMut)]
pub struct Record {
    schema: Arc<Schema>,

    #[deref]
    #[deref_mut]
    values: ValueSet,
}

impl Record {
    pub fn new(schema: Arc<Schema>) -> Result<Self, Error> {
        ensure_sealed(&schema)?;
        let values = ValueSet::new(schema.columns().clone());

        Ok(Self { schema, values })
    }

    /// Record from positional values, one per (real) column.
    pub fn with_values(schema: Arc<Schema>, values: Vec<Option<Value>>) -> Result<Self, Error> {
        ensure_sealed(&schema)?;
        let values = ValueSet::with_values(schema.columns().clone(), values)?;

        Ok(Self { schema, values })
    }

    pub fn from_bytes(schema: Arc<Schema>, bytes: &[u8], lossless: bool) -> Result<Self, Error> {
        let bits = BitArray::from_bytes(bytes);
        let mut reader = BitReader::new(&bits);

        Self::read_from(schema, &mut reader, lossless)
    }

    pub fn read_from(schema: Arc<Schema>, reader: &mut BitReader<'_>, lossless: bool) -> Result<Self, Error> {
        ensure_sealed(&schema)?;
        let values = ValueSet::read_from(schema.columns().clone(), reader, lossless)?;

        Ok(Self { schema, values })
    }

    pub fn from_text(schema: Arc<Schema>, input: &str) -> Result<Self, Error> {
        ensure_sealed(&schema)?;
        let values = ValueSet::from_text(schema.columns().clone(), input)?;

        Ok(Self { schema, values })
    }

    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub const fn value_set(&self) -> &ValueSet {
        &self.values
    }

    pub(crate) fn into_value_set(self) -> ValueSet {
        self.values
    }

    /// Whether the record was stored losslessly, for schemas tracking it.
    #[must_use]
    pub fn is_lossless(&self) -> Option<bool> {
        let position = self.schema.lossless_column_position()?;

        self.values.get_at(position).and_then(Value::as_bool)
    }

    // ------------------------------------------------------------------
    // Binary form
    // ------------------------------------------------------------------

    /// Write the record; the lossless-flag column, if present, reflects
    /// this write.
    pub fn write_to(&self, writer: &mut BitWriter, lossless: bool) -> Result<(), Error> {
        self.values
            .write_with(writer, lossless, self.schema.lossless_column_position())
    }

    pub fn to_bits(&self, lossless: bool) -> Result<BitArray, Error> {
        let mut writer = BitWriter::new();
        self.write_to(&mut writer, lossless)?;

        Ok(writer.finish())
    }

    pub fn to_bytes(&self, lossless: bool) -> Result<Vec<u8>, Error> {
        Ok(self.to_bits(lossless)?.to_bytes())
    }

    // ------------------------------------------------------------------
    // Keys
    // ------------------------------------------------------------------

    /// Value of the auto-increment key, if the schema has one and it is set.
    #[must_use]
    pub fn auto_key(&self) -> Option<i64> {
        let column = self.schema.auto_increment_column()?;

        self.values.get(column.name()).and_then(Value::as_integer)
    }

    pub(crate) fn set_auto_key(&mut self, key: i64) -> Result<(), Error> {
        let name = self
            .schema
            .auto_increment_column()
            .map(|c| c.name().to_string())
            .ok_or_else(|| {
                Error::invalid_state(
                    ErrorOrigin::Record,
                    format!("schema '{}' has no auto-increment key", self.schema.name()),
                )
            })?;

        self.values.set(&name, key)
    }

    /// Primary-key-only projection of this record.
    pub fn reference(&self) -> Result<RecordReference, Error> {
        RecordReference::from_record(self)
    }

    /// Query matching the stored record with this record's primary key.
    pub fn record_query(&self) -> Result<SingleRecordQuery, Error> {
        self.reference()?.record_query()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.schema.id() == other.schema.id() && self.values == other.values
    }
}

fn ensure_sealed(schema: &Schema) -> Result<(), Error> {
    if schema.is_sealed() {
        Ok(())
    } else {
        Err(SchemaError::NotSealed {
            schema: schema.name().to_string(),
        }
        .into())
    }
}

/// Query selecting records of `schema` whose primary-key columns equal the
/// given values.
pub(crate) fn primary_key_query(schema: &Schema, values: &ValueSet) -> Result<SingleRecordQuery, Error> {
    let id = schema.id().ok_or_else(|| {
        Error::invalid_state(
            ErrorOrigin::Record,
            format!("schema '{}' does not belong to a model", schema.name()),
        )
    })?;

    let constraints = values
        .columns()
        .iter()
        .zip(values.values())
        .map(|(column, value)| match value {
            Some(value) => Constraint::eq(column.name(), value.clone()),
            None => Constraint::is_null(column.name()),
        })
        .collect::<Vec<_>>();

    let query = RecordsQuery::new(Source::schema(id)).with_constraint(Constraint::all(constraints));

    Ok(SingleRecordQuery::First(query))
}
