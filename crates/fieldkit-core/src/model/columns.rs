use crate::model::{Column, SchemaError, VirtualColumn};

///
/// ColumnSet
///
/// Ordered, named collection of columns. Names are unique across real and
/// virtual columns.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnSet {
    name: String,
    columns: Vec<Column>,
}

impl ColumnSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a column, returning its position.
    pub fn add_column(&mut self, column: Column) -> Result<usize, SchemaError> {
        let new_names =
            std::iter::once(column.name()).chain(column.virtual_columns().iter().map(VirtualColumn::name));
        for name in new_names {
            if self.contains_name(name) {
                return Err(SchemaError::DuplicateColumn {
                    name: name.to_string(),
                });
            }
        }

        self.columns.push(column);

        Ok(self.columns.len() - 1)
    }

    /// Attach a virtual column to the real column `target`.
    pub fn add_virtual_column(&mut self, target: &str, column: VirtualColumn) -> Result<(), SchemaError> {
        if self.contains_name(column.name()) {
            return Err(SchemaError::DuplicateColumn {
                name: column.name().to_string(),
            });
        }

        let position = self.position(target).ok_or_else(|| SchemaError::UnknownColumn {
            name: target.to_string(),
        })?;
        self.columns[position].push_virtual_column(column);

        Ok(())
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    #[must_use]
    pub fn column_at(&self, position: usize) -> Option<&Column> {
        self.columns.get(position)
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    /// Locate a virtual column together with the position of its target.
    #[must_use]
    pub fn virtual_column(&self, name: &str) -> Option<(usize, &VirtualColumn)> {
        self.columns.iter().enumerate().find_map(|(i, c)| {
            c.virtual_columns()
                .iter()
                .find(|v| v.name() == name)
                .map(|v| (i, v))
        })
    }

    #[must_use]
    pub fn has_virtual_columns(&self) -> bool {
        self.columns.iter().any(|c| !c.virtual_columns().is_empty())
    }

    #[must_use]
    pub fn contains_name(&self, name: &str) -> bool {
        self.column(name).is_some() || self.virtual_column(name).is_some()
    }

    #[must_use]
    pub fn min_size(&self, lossless: bool) -> usize {
        self.columns.iter().map(|c| c.min_size(lossless)).sum()
    }

    #[must_use]
    pub fn max_size(&self, lossless: bool) -> usize {
        self.columns.iter().map(|c| c.max_size(lossless)).sum()
    }

    #[must_use]
    pub fn can_be_lossy(&self) -> bool {
        self.columns.iter().any(Column::can_be_lossy)
    }

    /// Structural comparison of the columns, optionally ignoring names.
    #[must_use]
    pub fn equals_with(&self, other: &Self, check_names: bool) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|(a, b)| a.equals_with(b, check_names))
    }
}

impl<'a> IntoIterator for &'a ColumnSet {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
