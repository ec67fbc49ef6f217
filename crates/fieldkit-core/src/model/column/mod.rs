mod composite;
mod derived;
mod scalar;

#[cfg(test)]
mod tests;

pub use composite::{ListColumn, RecordColumn, RecordRole};
pub use derived::{VirtualColumn, VirtualMapping};
pub use scalar::{BytesColumn, FloatColumn, IntegerColumn, StringColumn, TimeColumn};

use crate::{
    error::Error,
    model::{SchemaError, ValidationError},
    record::Value,
};
use fieldkit_io::{BitReader, BitWriter};

///
/// Column
///
/// Named, typed column definition. The variant-specific behaviour lives in
/// [`ColumnKind`]; `Column` adds the name, optionality, default value and the
/// virtual columns derived from it.
///

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    optional: bool,
    default: Option<Value>,
    kind: ColumnKind,
    virtual_columns: Vec<VirtualColumn>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, optional: bool) -> Result<Self, SchemaError> {
        let name = name.into();
        if name.is_empty() {
            return Err(SchemaError::InvalidColumn {
                name,
                reason: "column names must not be empty".into(),
            });
        }

        Ok(Self {
            name,
            optional,
            default: None,
            kind,
            virtual_columns: Vec::new(),
        })
    }

    /// Signed 64-bit integer column.
    pub fn integer(name: impl Into<String>, optional: bool) -> Result<Self, SchemaError> {
        Self::new(name, ColumnKind::Integer(IntegerColumn::INT64), optional)
    }

    pub fn boolean(name: impl Into<String>, optional: bool) -> Result<Self, SchemaError> {
        Self::new(name, ColumnKind::Boolean, optional)
    }

    /// UTF-8 string column holding at most `max_length` bytes.
    pub fn string(
        name: impl Into<String>,
        optional: bool,
        max_length: usize,
    ) -> Result<Self, SchemaError> {
        let name = name.into();
        let kind = StringColumn::new(max_length, fieldkit_io::Charset::Utf8)
            .map_err(|reason| SchemaError::InvalidColumn {
                name: name.clone(),
                reason,
            })?;

        Self::new(name, ColumnKind::String(kind), optional)
    }

    /// Line of location points, see [`ListColumn::line`].
    pub fn line(
        name: impl Into<String>,
        optional: bool,
        double_precision: bool,
        store_altitude: bool,
    ) -> Result<Self, SchemaError> {
        let kind = ListColumn::line(double_precision, store_altitude, false)?;

        Self::new(name, ColumnKind::List(kind), optional)
    }

    /// Attach a default value, validated against this column.
    pub fn with_default(mut self, value: Value) -> Result<Self, ValidationError> {
        self.validate(&value)?;
        self.default = Some(value);

        Ok(self)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn is_optional(&self) -> bool {
        self.optional
    }

    #[must_use]
    pub const fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[must_use]
    pub const fn kind(&self) -> &ColumnKind {
        &self.kind
    }

    #[must_use]
    pub fn virtual_columns(&self) -> &[VirtualColumn] {
        &self.virtual_columns
    }

    pub(crate) fn push_virtual_column(&mut self, column: VirtualColumn) {
        self.virtual_columns.push(column);
    }

    /// Whether this column's value is a nested value set (record, location
    /// or foreign key).
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self.kind, ColumnKind::Record(_))
    }

    // ------------------------------------------------------------------
    // Sizing
    // ------------------------------------------------------------------

    /// Fewest bits a present value can take.
    #[must_use]
    pub fn min_value_size(&self, lossless: bool) -> usize {
        self.kind.min_value_size(lossless)
    }

    /// Most bits a present value can take.
    #[must_use]
    pub fn max_value_size(&self, lossless: bool) -> usize {
        self.kind.max_value_size(lossless)
    }

    /// Fewest bits this column takes, presence flag included.
    #[must_use]
    pub fn min_size(&self, lossless: bool) -> usize {
        if self.optional {
            1
        } else {
            self.min_value_size(lossless)
        }
    }

    /// Most bits this column takes, presence flag included.
    #[must_use]
    pub fn max_size(&self, lossless: bool) -> usize {
        usize::from(self.optional) + self.max_value_size(lossless)
    }

    #[must_use]
    pub fn can_be_lossy(&self) -> bool {
        self.kind.can_be_lossy()
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        self.kind
            .check(value)
            .map_err(|constraint| ValidationError::new(&self.name, constraint))
    }

    /// Validate an optional slot: `None` is only accepted for optional columns.
    pub fn validate_slot(&self, value: Option<&Value>) -> Result<(), ValidationError> {
        match value {
            Some(value) => self.validate(value),
            None if self.optional => Ok(()),
            None => Err(ValidationError::new(&self.name, "a value is required")),
        }
    }

    // ------------------------------------------------------------------
    // Binary form
    // ------------------------------------------------------------------

    /// Write a slot, preceded by a presence bit when the column is optional.
    pub fn write(
        &self,
        value: Option<&Value>,
        writer: &mut BitWriter,
        lossless: bool,
    ) -> Result<(), Error> {
        self.validate_slot(value)?;

        if self.optional {
            writer.write_bit(value.is_some());
        }
        if let Some(value) = value {
            self.kind
                .write(value, writer, lossless)
                .map_err(|err| self.wrap_error(err))?;
        }

        Ok(())
    }

    pub fn write_value(
        &self,
        value: &Value,
        writer: &mut BitWriter,
        lossless: bool,
    ) -> Result<(), Error> {
        self.validate(value)?;

        self.kind
            .write(value, writer, lossless)
            .map_err(|err| self.wrap_error(err))
    }

    pub fn read(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<Option<Value>, Error> {
        if self.optional && !reader.read_bit()? {
            return Ok(None);
        }

        self.read_value(reader, lossless).map(Some)
    }

    pub fn read_value(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<Value, Error> {
        let value = self
            .kind
            .read(reader, lossless)
            .map_err(|err| self.wrap_error(err))?;
        self.validate(&value)?;

        Ok(value)
    }

    // ------------------------------------------------------------------
    // Text form
    // ------------------------------------------------------------------

    #[must_use]
    pub fn format(&self, value: &Value) -> String {
        self.kind.format(value)
    }

    pub fn parse(&self, text: &str) -> Result<Value, ValidationError> {
        let value = self
            .kind
            .parse(text)
            .map_err(|constraint| ValidationError::new(&self.name, constraint))?;
        self.validate(&value)?;

        Ok(value)
    }

    /// Structural comparison, optionally ignoring names (nested included).
    #[must_use]
    pub fn equals_with(&self, other: &Self, check_names: bool) -> bool {
        if check_names {
            return self == other;
        }

        self.optional == other.optional && self.kind.equals_with(&other.kind, false)
    }

    fn wrap_error(&self, err: Error) -> Error {
        let message = format!("column '{}': {}", self.name, err.message);
        Error {
            message,
            ..err
        }
    }
}

///
/// ColumnKind
///

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnKind {
    Integer(IntegerColumn),
    Float(FloatColumn),
    Boolean,
    String(StringColumn),
    Bytes(BytesColumn),
    Time(TimeColumn),
    List(ListColumn),
    Record(RecordColumn),
}

impl ColumnKind {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean => "boolean",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::Time(_) => "time",
            Self::List(_) => "list",
            Self::Record(_) => "record",
        }
    }

    fn min_value_size(&self, lossless: bool) -> usize {
        match self {
            Self::Integer(c) => c.size() as usize,
            Self::Float(c) => c.value_size(lossless),
            Self::Boolean => 1,
            Self::String(c) => c.min_value_size(),
            Self::Bytes(c) => c.min_value_size(),
            Self::Time(c) => c.value_size(lossless),
            Self::List(c) => c.min_value_size(lossless),
            Self::Record(c) => c.columns().min_size(lossless),
        }
    }

    fn max_value_size(&self, lossless: bool) -> usize {
        match self {
            Self::Integer(c) => c.size() as usize,
            Self::Float(c) => c.value_size(lossless),
            Self::Boolean => 1,
            Self::String(c) => c.max_value_size(),
            Self::Bytes(c) => c.max_value_size(),
            Self::Time(c) => c.value_size(lossless),
            Self::List(c) => c.max_value_size(lossless),
            Self::Record(c) => c.columns().max_size(lossless),
        }
    }

    fn can_be_lossy(&self) -> bool {
        match self {
            Self::Float(c) => c.can_be_lossy(),
            Self::Time(c) => c.can_be_lossy(),
            Self::List(c) => c.element().can_be_lossy(),
            Self::Record(c) => c.columns().can_be_lossy(),
            Self::Integer(_) | Self::Boolean | Self::String(_) | Self::Bytes(_) => false,
        }
    }

    fn check(&self, value: &Value) -> Result<(), String> {
        match (self, value) {
            (Self::Integer(c), Value::Integer(v)) => c.check(*v),
            (Self::Float(c), Value::Float(v)) => c.check(*v),
            (Self::Boolean, Value::Boolean(_)) => Ok(()),
            (Self::String(c), Value::String(v)) => c.check(v),
            (Self::Bytes(c), Value::Bytes(v)) => c.check(v),
            (Self::Time(c), Value::Time(v)) => c.check(*v),
            (Self::List(c), Value::List(v)) => c.check(v),
            (Self::Record(c), Value::Record(v)) => c.check(v),
            _ => Err(format!(
                "expected a {} value, got {}",
                self.type_name(),
                value.type_name()
            )),
        }
    }

    fn write(&self, value: &Value, writer: &mut BitWriter, lossless: bool) -> Result<(), Error> {
        match (self, value) {
            (Self::Integer(c), Value::Integer(v)) => c.write(*v, writer),
            (Self::Float(c), Value::Float(v)) => c.write(*v, writer, lossless),
            (Self::Boolean, Value::Boolean(v)) => {
                writer.write_bit(*v);
                Ok(())
            }
            (Self::String(c), Value::String(v)) => c.write(v, writer),
            (Self::Bytes(c), Value::Bytes(v)) => c.write(v, writer),
            (Self::Time(c), Value::Time(v)) => c.write(*v, writer, lossless),
            (Self::List(c), Value::List(v)) => c.write(v, writer, lossless),
            (Self::Record(c), Value::Record(v)) => v.write_to(writer, lossless),
            // unreachable after validation
            _ => Err(ValidationError::new(
                self.type_name(),
                format!("cannot write a {} value", value.type_name()),
            )
            .into()),
        }
    }

    fn read(&self, reader: &mut BitReader<'_>, lossless: bool) -> Result<Value, Error> {
        Ok(match self {
            Self::Integer(c) => Value::Integer(c.read(reader)?),
            Self::Float(c) => Value::Float(c.read(reader, lossless)?),
            Self::Boolean => Value::Boolean(reader.read_bit()?),
            Self::String(c) => Value::String(c.read(reader)?),
            Self::Bytes(c) => Value::Bytes(c.read(reader)?),
            Self::Time(c) => Value::Time(c.read(reader, lossless)?),
            Self::List(c) => Value::List(c.read(reader, lossless)?),
            Self::Record(c) => Value::Record(c.read(reader, lossless)?),
        })
    }

    fn format(&self, value: &Value) -> String {
        match (self, value) {
            (Self::Float(_), Value::Float(v)) => scalar::format_float(*v),
            (Self::Time(_), Value::Time(v)) => scalar::format_time(*v),
            (Self::List(c), Value::List(v)) => c.format(v),
            (_, Value::Integer(v)) => v.to_string(),
            (_, Value::Float(v)) => scalar::format_float(*v),
            (_, Value::Boolean(v)) => v.to_string(),
            (_, Value::String(v)) => v.clone(),
            (_, Value::Bytes(v)) => scalar::format_hex(v),
            (_, Value::Time(v)) => scalar::format_time(*v),
            (_, Value::List(v)) => v
                .iter()
                .map(|item| self.format(item))
                .collect::<Vec<_>>()
                .join(","),
            (_, Value::Record(v)) => v.to_text(),
        }
    }

    fn parse(&self, text: &str) -> Result<Value, String> {
        match self {
            Self::Integer(_) => text
                .trim()
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|err| format!("'{text}' is not an integer: {err}")),
            Self::Float(_) => text
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|err| format!("'{text}' is not a number: {err}")),
            Self::Boolean => match text.trim() {
                "true" | "1" => Ok(Value::Boolean(true)),
                "false" | "0" => Ok(Value::Boolean(false)),
                other => Err(format!("'{other}' is not a boolean")),
            },
            Self::String(_) => Ok(Value::String(text.to_string())),
            Self::Bytes(_) => scalar::parse_hex(text).map(Value::Bytes),
            Self::Time(_) => scalar::parse_time(text).map(Value::Time),
            Self::List(c) => c.parse(text).map(Value::List),
            Self::Record(c) => c.parse(text).map(Value::Record),
        }
    }

    fn equals_with(&self, other: &Self, check_names: bool) -> bool {
        match (self, other) {
            (Self::List(a), Self::List(b)) => a.equals_with(b, check_names),
            (Self::Record(a), Self::Record(b)) => a.equals_with(b, check_names),
            _ => self == other,
        }
    }
}
