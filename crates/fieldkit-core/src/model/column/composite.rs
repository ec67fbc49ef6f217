use crate::{
    error::Error,
    model::{Column, ColumnSet, FloatColumn, Schema, SchemaError, SchemaId, column::ColumnKind},
    record::{Value, ValueSet, text},
};
use fieldkit_io::{BitReader, BitWriter, IntegerRange};
use std::sync::Arc;

// ============================================================================
// ListColumn
// ============================================================================

///
/// ListColumn
///
/// Homogeneous list of non-optional element values, length-prefixed with a
/// range field over `[min_length, max_length]`.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ListColumn {
    element: Box<Column>,
    min_length: usize,
    max_length: usize,
    length_field: IntegerRange,
}

impl ListColumn {
    pub const DEFAULT_MAX_LENGTH: usize = 255;

    /// Element name of the points of a line.
    pub const LINE_POINT: &'static str = "Point";

    /// Points a line can hold, so that its length fits 16 bits.
    pub const LINE_MAX_POINTS: usize = (1 << 16) - 1;

    pub fn new(element: Column, min_length: usize, max_length: usize) -> Result<Self, String> {
        if element.is_optional() {
            return Err(format!("list element column '{}' must not be optional", element.name()));
        }

        let low = i64::try_from(min_length).map_err(|err| err.to_string())?;
        let high = i64::try_from(max_length).map_err(|err| err.to_string())?;
        let length_field = IntegerRange::new(low, high).map_err(|err| err.to_string())?;

        Ok(Self {
            element: Box::new(element),
            min_length,
            max_length,
            length_field,
        })
    }

    /// Line: an ordered list of up to [`Self::LINE_MAX_POINTS`] location
    /// points. Points carry latitude and longitude, plus altitude and
    /// accuracy when asked for.
    pub fn line(
        double_precision: bool,
        store_altitude: bool,
        store_accuracy: bool,
    ) -> Result<Self, SchemaError> {
        let point = RecordColumn::location(double_precision, store_altitude, store_accuracy)?;
        let element = Column::new(Self::LINE_POINT, ColumnKind::Record(point), false)?;

        Self::new(element, 0, Self::LINE_MAX_POINTS).map_err(|reason| SchemaError::InvalidColumn {
            name: Self::LINE_POINT.to_string(),
            reason,
        })
    }

    /// Location column of the points, when this list is a line.
    #[must_use]
    pub fn point_column(&self) -> Option<&RecordColumn> {
        match self.element.kind() {
            ColumnKind::Record(point) if point.is_location() && self.element.name() == Self::LINE_POINT => {
                Some(point)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn is_line(&self) -> bool {
        self.point_column().is_some()
    }

    #[must_use]
    pub fn element(&self) -> &Column {
        &self.element
    }

    #[must_use]
    pub const fn min_length(&self) -> usize {
        self.min_length
    }

    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }

    pub(super) fn min_value_size(&self, lossless: bool) -> usize {
        self.length_field.size() as usize + self.min_length * self.element.min_value_size(lossless)
    }

    pub(super) fn max_value_size(&self, lossless: bool) -> usize {
        self.length_field.size() as usize + self.max_length * self.element.max_value_size(lossless)
    }

    pub(super) fn check(&self, items: &[Value]) -> Result<(), String> {
        if items.len() < self.min_length || items.len() > self.max_length {
            return Err(format!(
                "list of {} elements is outside of the allowed length [{}, {}]",
                items.len(),
                self.min_length,
                self.max_length
            ));
        }

        for (i, item) in items.iter().enumerate() {
            self.element
                .validate(item)
                .map_err(|err| format!("element {i}: {}", err.constraint))?;
        }

        Ok(())
    }

    pub(super) fn write(&self, items: &[Value], writer: &mut BitWriter, lossless: bool) -> Result<(), Error> {
        self.length_field.write(writer, items.len() as i64)?;
        for item in items {
            self.element.write_value(item, writer, lossless)?;
        }

        Ok(())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<Vec<Value>, Error> {
        let len = self.length_field.read(reader)? as usize;

        (0..len)
            .map(|_| self.element.read_value(reader, lossless))
            .collect()
    }

    pub(super) fn format(&self, items: &[Value]) -> String {
        text::join(items.iter().map(|item| Some(self.element.format(item))), text::LIST_SEPARATOR)
    }

    pub(super) fn parse(&self, input: &str) -> Result<Vec<Value>, String> {
        if input.is_empty() {
            return Ok(Vec::new());
        }

        text::split(input, text::LIST_SEPARATOR)?
            .into_iter()
            .enumerate()
            .map(|(i, field)| {
                let field = field.ok_or_else(|| format!("element {i} is missing"))?;
                self.element
                    .parse(&field)
                    .map_err(|err| format!("element {i}: {}", err.constraint))
            })
            .collect()
    }

    pub(super) fn equals_with(&self, other: &Self, check_names: bool) -> bool {
        self.min_length == other.min_length
            && self.max_length == other.max_length
            && self.element.equals_with(&other.element, check_names)
    }
}

// ============================================================================
// RecordColumn
// ============================================================================

///
/// RecordRole
///
/// What a nested record column stands for. Exporters can treat locations
/// and foreign keys as leaves instead of descending into them.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordRole {
    Plain,
    Location,
    ForeignKey(SchemaId),
}

///
/// RecordColumn
///

#[derive(Clone, Debug, PartialEq)]
pub struct RecordColumn {
    columns: Arc<ColumnSet>,
    role: RecordRole,
}

impl RecordColumn {
    pub const LATITUDE: &'static str = "Latitude";
    pub const LONGITUDE: &'static str = "Longitude";
    pub const ALTITUDE: &'static str = "Altitude";
    pub const ACCURACY: &'static str = "Accuracy";

    #[must_use]
    pub fn new(columns: ColumnSet) -> Self {
        Self {
            columns: Arc::new(columns),
            role: RecordRole::Plain,
        }
    }

    /// Geographic location: latitude and longitude, optionally altitude and
    /// (always single precision, unsigned) accuracy in metres.
    pub fn location(
        double_precision: bool,
        store_altitude: bool,
        store_accuracy: bool,
    ) -> Result<Self, SchemaError> {
        let coordinate = FloatColumn::new(double_precision, true);

        let mut columns = ColumnSet::new("Location");
        columns.add_column(Column::new(Self::LATITUDE, ColumnKind::Float(coordinate), false)?)?;
        columns.add_column(Column::new(Self::LONGITUDE, ColumnKind::Float(coordinate), false)?)?;
        if store_altitude {
            columns.add_column(Column::new(Self::ALTITUDE, ColumnKind::Float(coordinate), true)?)?;
        }
        if store_accuracy {
            columns.add_column(Column::new(
                Self::ACCURACY,
                ColumnKind::Float(FloatColumn::new(false, false)),
                true,
            )?)?;
        }

        Ok(Self {
            columns: Arc::new(columns),
            role: RecordRole::Location,
        })
    }

    /// Reference to a record of `schema`, holding its primary-key values.
    pub fn foreign_key(schema: &Schema) -> Result<Self, SchemaError> {
        let id = schema.id().ok_or_else(|| SchemaError::NotSealed {
            schema: schema.name().to_string(),
        })?;
        let columns = schema
            .primary_key_columns()
            .cloned()
            .ok_or_else(|| SchemaError::NotSealed {
                schema: schema.name().to_string(),
            })?;

        Ok(Self {
            columns,
            role: RecordRole::ForeignKey(id),
        })
    }

    #[must_use]
    pub const fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    #[must_use]
    pub const fn role(&self) -> RecordRole {
        self.role
    }

    #[must_use]
    pub const fn is_location(&self) -> bool {
        matches!(self.role, RecordRole::Location)
    }

    #[must_use]
    pub const fn is_foreign_key(&self) -> bool {
        matches!(self.role, RecordRole::ForeignKey(_))
    }

    /// Empty value set for this column.
    #[must_use]
    pub fn new_value(&self) -> ValueSet {
        ValueSet::new(self.columns.clone())
    }

    pub(super) fn check(&self, value: &ValueSet) -> Result<(), String> {
        if !value.is_bound_to(&self.columns) {
            return Err(format!(
                "value set does not match column set '{}'",
                self.columns.name()
            ));
        }

        value.validate_complete().map_err(|err| err.to_string())
    }

    pub(super) fn read(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<ValueSet, Error> {
        ValueSet::read_from(self.columns.clone(), reader, lossless)
    }

    pub(super) fn parse(&self, input: &str) -> Result<ValueSet, String> {
        ValueSet::from_text(self.columns.clone(), input).map_err(|err| err.to_string())
    }

    pub(super) fn equals_with(&self, other: &Self, check_names: bool) -> bool {
        self.role == other.role && self.columns.equals_with(&other.columns, check_names)
    }
}
