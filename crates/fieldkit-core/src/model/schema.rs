use crate::{
    model::{
        AUTO_KEY_COLUMN_NAME, Column, ColumnKind, ColumnSet, Index, IntegerColumn,
        LOSSLESS_COLUMN_NAME, MAX_NAME_LENGTH, PrimaryKey, SchemaError, VirtualColumn,
    },
    record::Value,
};
use derive_more::Deref;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Display, Write},
    sync::Arc,
};

///
/// SchemaId
///
/// Identifies a schema by its model and its number within that model.
///

#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct SchemaId {
    model_id: u64,
    number: u8,
}

impl SchemaId {
    #[must_use]
    pub const fn new(model_id: u64, number: u8) -> Self {
        Self { model_id, number }
    }

    #[must_use]
    pub const fn model_id(&self) -> u64 {
        self.model_id
    }

    #[must_use]
    pub const fn number(&self) -> u8 {
        self.number
    }

    /// `(model_id << 4) + number`; orders schemas the same way `Ord` does.
    #[must_use]
    pub const fn sort_code(&self) -> u64 {
        (self.model_id << 4) + self.number as u64
    }

    #[must_use]
    pub const fn from_sort_code(code: u64) -> Self {
        Self {
            model_id: code >> 4,
            number: (code & 0xF) as u8,
        }
    }
}

impl Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.model_id, self.number)
    }
}

///
/// Schema
///
/// Named column layout of one record kind. Mutable until sealed; sealing
/// adds the auto-increment key and lossless-flag columns when they apply.
/// Dereferences to its [`ColumnSet`].
///

#[derive(Clone, Debug, Deref)]
pub struct Schema {
    id: Option<SchemaId>,
    name: String,
    table_name: String,
    flags: u32,
    #[deref(forward)]
    columns: Arc<ColumnSet>,
    indexes: Vec<Index>,
    primary_key: Option<PrimaryKey>,
    primary_key_columns: Option<Arc<ColumnSet>>,
    sealed: bool,
}

impl Schema {
    /// Track whether each record was stored without loss of precision.
    pub const FLAG_TRACK_LOSSLESSNESS: u32 = 1;

    pub fn new(name: impl Into<String>) -> Result<Self, SchemaError> {
        let name = name.into();
        check_name(&name)?;

        Ok(Self {
            id: None,
            table_name: name.clone(),
            columns: Arc::new(ColumnSet::new(name.clone())),
            name,
            flags: 0,
            indexes: Vec::new(),
            primary_key: None,
            primary_key_columns: None,
            sealed: false,
        })
    }

    #[must_use]
    pub const fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    #[must_use]
    pub const fn id(&self) -> Option<SchemaId> {
        self.id
    }

    pub(crate) const fn assign_id(&mut self, id: SchemaId) {
        self.id = Some(id);
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn set_table_name(&mut self, table_name: impl Into<String>) -> Result<(), SchemaError> {
        self.ensure_unsealed()?;
        let table_name = table_name.into();
        check_name(&table_name)?;
        self.table_name = table_name;

        Ok(())
    }

    #[must_use]
    pub const fn flags(&self) -> u32 {
        self.flags
    }

    #[must_use]
    pub const fn has_flags(&self, flags: u32) -> bool {
        self.flags & flags == flags
    }

    pub(crate) const fn add_flags(&mut self, flags: u32) {
        self.flags |= flags;
    }

    #[must_use]
    pub const fn columns(&self) -> &Arc<ColumnSet> {
        &self.columns
    }

    #[must_use]
    pub const fn is_sealed(&self) -> bool {
        self.sealed
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    pub fn add_column(&mut self, column: Column) -> Result<usize, SchemaError> {
        self.ensure_unsealed()?;

        Arc::make_mut(&mut self.columns).add_column(column)
    }

    pub fn add_virtual_column(&mut self, target: &str, column: VirtualColumn) -> Result<(), SchemaError> {
        self.ensure_unsealed()?;

        Arc::make_mut(&mut self.columns).add_virtual_column(target, column)
    }

    pub fn add_index(&mut self, index: Index) -> Result<(), SchemaError> {
        self.ensure_unsealed()?;
        self.check_index_columns(&index)?;
        self.indexes.push(index);

        Ok(())
    }

    /// Set the primary key. A schema has at most one; a second attempt fails.
    pub fn set_primary_key(&mut self, primary_key: PrimaryKey) -> Result<(), SchemaError> {
        self.ensure_unsealed()?;
        if self.primary_key.is_some() {
            return Err(SchemaError::PrimaryKeyAlreadySet {
                schema: self.name.clone(),
            });
        }

        self.check_index_columns(primary_key.index())?;
        for name in primary_key.columns() {
            let column = self.column_or_error(name)?;
            if column.is_optional() {
                return Err(SchemaError::OptionalPrimaryKeyColumn {
                    column: name.clone(),
                });
            }
            if primary_key.is_auto_increment() && !matches!(column.kind(), ColumnKind::Integer(_)) {
                return Err(SchemaError::InvalidColumn {
                    name: name.clone(),
                    reason: "auto-increment keys must be integer columns".into(),
                });
            }
        }

        self.primary_key = Some(primary_key);

        Ok(())
    }

    /// Add `column` and make it the single-column primary key.
    pub fn add_primary_key_column(&mut self, column: Column) -> Result<(), SchemaError> {
        let name = column.name().to_string();
        if self.primary_key.is_some() {
            return Err(SchemaError::PrimaryKeyAlreadySet {
                schema: self.name.clone(),
            });
        }
        if column.is_optional() {
            return Err(SchemaError::OptionalPrimaryKeyColumn { column: name });
        }
        self.add_column(column)?;

        self.set_primary_key(PrimaryKey::new([name]))
    }

    /// Seal the schema. Idempotent; once sealed, no column or index can be
    /// added.
    pub fn seal(&mut self) -> Result<(), SchemaError> {
        if self.sealed {
            return Ok(());
        }

        if self.primary_key.is_none() {
            let auto_key = Column::new(
                AUTO_KEY_COLUMN_NAME,
                ColumnKind::Integer(IntegerColumn::INT64),
                false,
            )?;
            self.add_column(auto_key)?;
            self.set_primary_key(PrimaryKey::auto_increment(AUTO_KEY_COLUMN_NAME))?;
        }

        if self.has_flags(Self::FLAG_TRACK_LOSSLESSNESS)
            && self.columns.can_be_lossy()
            && !self.contains_name(LOSSLESS_COLUMN_NAME)
        {
            let lossless = Column::boolean(LOSSLESS_COLUMN_NAME, false)?
                .with_default(Value::Boolean(true))
                .map_err(|err| SchemaError::InvalidColumn {
                    name: LOSSLESS_COLUMN_NAME.to_string(),
                    reason: err.constraint,
                })?;
            self.add_column(lossless)?;
        }

        let mut key_columns = ColumnSet::new(format!("{}:PK", self.name));
        if let Some(primary_key) = &self.primary_key {
            for name in primary_key.columns() {
                key_columns.add_column(self.column_or_error(name)?.clone())?;
            }
        }
        self.primary_key_columns = Some(Arc::new(key_columns));
        self.sealed = true;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn primary_key(&self) -> Option<&PrimaryKey> {
        self.primary_key.as_ref()
    }

    /// Copies of the primary-key columns, available once sealed.
    #[must_use]
    pub const fn primary_key_columns(&self) -> Option<&Arc<ColumnSet>> {
        self.primary_key_columns.as_ref()
    }

    /// All indexes, optionally including the primary key's index first.
    #[must_use]
    pub fn indexes(&self, include_primary_key: bool) -> Vec<&Index> {
        let primary = self
            .primary_key
            .as_ref()
            .filter(|_| include_primary_key)
            .map(PrimaryKey::index);

        primary.into_iter().chain(&self.indexes).collect()
    }

    /// The integer column backing an auto-increment primary key.
    #[must_use]
    pub fn auto_increment_column(&self) -> Option<&Column> {
        let primary_key = self.primary_key.as_ref().filter(|pk| pk.is_auto_increment())?;

        primary_key.columns().first().and_then(|name| self.column(name))
    }

    /// Position of the lossless-flag column, if the schema has one.
    #[must_use]
    pub fn lossless_column_position(&self) -> Option<usize> {
        if self.has_flags(Self::FLAG_TRACK_LOSSLESSNESS) {
            self.position(LOSSLESS_COLUMN_NAME)
        } else {
            None
        }
    }

    /// Parameterized comparison: strict protocol checks compare everything,
    /// migration tooling can relax names, columns or indexes.
    #[must_use]
    pub fn equals_with(
        &self,
        other: &Self,
        check_names: bool,
        check_columns: bool,
        check_indexes: bool,
    ) -> bool {
        if self.id != other.id {
            return false;
        }
        if check_names && (self.name != other.name || self.table_name != other.table_name) {
            return false;
        }
        if check_columns && !self.columns.equals_with(&other.columns, check_names) {
            return false;
        }
        if check_indexes && (self.primary_key != other.primary_key || self.indexes != other.indexes) {
            return false;
        }

        true
    }

    /// Human-readable description of the schema layout.
    #[must_use]
    pub fn specification(&self) -> String {
        let mut out = String::new();

        let _ = write!(out, "Schema '{}'", self.name);
        if let Some(id) = self.id {
            let _ = write!(out, " (model {}, schema {})", id.model_id(), id.number());
        }
        let _ = writeln!(out, ", flags {:#x}{}", self.flags, if self.sealed { ", sealed" } else { "" });

        for column in self.columns.iter() {
            let _ = writeln!(
                out,
                "  - {}: {}{} [{}..{} bits lossless, {}..{} bits lossy]",
                column.name(),
                column.kind().type_name(),
                if column.is_optional() { " (optional)" } else { "" },
                column.min_size(true),
                column.max_size(true),
                column.min_size(false),
                column.max_size(false),
            );
            for virtual_column in column.virtual_columns() {
                let _ = writeln!(out, "    ~ {} (virtual)", virtual_column.name());
            }
        }

        if let Some(primary_key) = &self.primary_key {
            let _ = writeln!(out, "  {primary_key}");
        }
        for index in &self.indexes {
            let _ = writeln!(out, "  INDEX {index}");
        }

        out
    }

    fn ensure_unsealed(&self) -> Result<(), SchemaError> {
        if self.sealed {
            return Err(SchemaError::Sealed {
                schema: self.name.clone(),
            });
        }

        Ok(())
    }

    fn column_or_error(&self, name: &str) -> Result<&Column, SchemaError> {
        self.column(name).ok_or_else(|| SchemaError::UnknownColumn {
            name: name.to_string(),
        })
    }

    fn check_index_columns(&self, index: &Index) -> Result<(), SchemaError> {
        if index.columns().is_empty() {
            return Err(SchemaError::EmptyIndex {
                name: index.name().to_string(),
            });
        }
        for name in index.columns() {
            self.column_or_error(name)?;
        }

        Ok(())
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.equals_with(other, true, true, true)
    }
}

pub(crate) fn check_name(name: &str) -> Result<(), SchemaError> {
    let len = name.chars().count();
    if len > MAX_NAME_LENGTH {
        return Err(SchemaError::NameTooLong {
            len,
            max: MAX_NAME_LENGTH,
        });
    }

    Ok(())
}
