use crate::{
    model::{Column, ColumnKind, ColumnSet, RecordColumn, RecordRole, VirtualColumn},
    record::{Value, ValueSet},
};

/// Separator between the names of a qualified (nested) column name.
pub const QUALIFIED_NAME_SEPARATOR: char = '.';

///
/// ColumnPointer
///
/// Path from a top-level column set to one leaf column. A pointer to a
/// virtual column ends at the virtual column's target.
///

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnPointer {
    steps: Vec<Step>,
    column: Column,
    virtual_column: Option<VirtualColumn>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
struct Step {
    position: usize,
    name: String,
}

impl ColumnPointer {
    /// Leaf column, or the target of a virtual column.
    #[must_use]
    pub const fn column(&self) -> &Column {
        &self.column
    }

    #[must_use]
    pub const fn virtual_column(&self) -> Option<&VirtualColumn> {
        self.virtual_column.as_ref()
    }

    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        self.virtual_column.is_some()
    }

    /// Number of column sets entered to reach the leaf (1 for top-level).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    /// Column names from the top level down to the leaf.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let leaf = self
            .virtual_column
            .as_ref()
            .map_or_else(|| self.column.name(), VirtualColumn::name);
        let parents = self.steps.len().saturating_sub(1);

        self.steps[..parents]
            .iter()
            .map(|step| step.name.as_str())
            .chain(std::iter::once(leaf))
    }

    /// `Outer.Inner.Leaf`
    #[must_use]
    pub fn qualified_name(&self) -> String {
        self.names()
            .collect::<Vec<_>>()
            .join(&QUALIFIED_NAME_SEPARATOR.to_string())
    }

    /// Value of the pointed-at column (the target, for virtual columns).
    #[must_use]
    pub fn value<'a>(&self, values: &'a ValueSet) -> Option<&'a Value> {
        let (last, parents) = self.steps.split_last()?;

        let mut current = values;
        for step in parents {
            current = current.get_at(step.position)?.as_record()?;
        }

        current.get_at(last.position)
    }

    /// Text of the pointed-at value: the column's text form, or the derived
    /// string of a virtual column.
    #[must_use]
    pub fn text(&self, values: &ValueSet) -> Option<String> {
        let value = self.value(values)?;

        match &self.virtual_column {
            Some(virtual_column) => virtual_column.derive(&self.column, value),
            None => Some(self.column.format(value)),
        }
    }
}

///
/// ColumnVisitor
///

pub trait ColumnVisitor {
    fn visit(&mut self, pointer: ColumnPointer);
}

impl ColumnVisitor for Vec<ColumnPointer> {
    fn visit(&mut self, pointer: ColumnPointer) {
        self.push(pointer);
    }
}

///
/// SchemaTraverser
///
/// Depth-first walk over the leaf columns of a column set, in declaration
/// order. Plain nested records are always entered; locations and foreign
/// keys are entered unless self traversal is on, in which case they are
/// visited as a single leaf. Virtual columns follow their target.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SchemaTraverser {
    include_virtual_columns: bool,
    location_self_traversal: bool,
    foreign_key_self_traversal: bool,
}

impl SchemaTraverser {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            include_virtual_columns: false,
            location_self_traversal: false,
            foreign_key_self_traversal: false,
        }
    }

    #[must_use]
    pub const fn with_virtual_columns(mut self, include: bool) -> Self {
        self.include_virtual_columns = include;
        self
    }

    #[must_use]
    pub const fn with_location_self_traversal(mut self, enabled: bool) -> Self {
        self.location_self_traversal = enabled;
        self
    }

    #[must_use]
    pub const fn with_foreign_key_self_traversal(mut self, enabled: bool) -> Self {
        self.foreign_key_self_traversal = enabled;
        self
    }

    pub fn traverse(&self, columns: &ColumnSet, visitor: &mut impl ColumnVisitor) {
        let mut steps = Vec::new();
        self.walk(columns, &mut steps, visitor);
    }

    /// Collect every leaf pointer.
    #[must_use]
    pub fn leaves(&self, columns: &ColumnSet) -> Vec<ColumnPointer> {
        let mut pointers = Vec::new();
        self.traverse(columns, &mut pointers);

        pointers
    }

    /// Whether the traversal enters `column` rather than visiting it.
    #[must_use]
    pub const fn enters(&self, column: &RecordColumn) -> bool {
        match column.role() {
            RecordRole::Plain => true,
            RecordRole::Location => !self.location_self_traversal,
            RecordRole::ForeignKey(_) => !self.foreign_key_self_traversal,
        }
    }

    fn walk(&self, columns: &ColumnSet, steps: &mut Vec<Step>, visitor: &mut impl ColumnVisitor) {
        for (position, column) in columns.iter().enumerate() {
            steps.push(Step {
                position,
                name: column.name().to_string(),
            });

            match column.kind() {
                ColumnKind::Record(record) if self.enters(record) => {
                    self.walk(record.columns(), steps, visitor);
                }
                _ => visitor.visit(ColumnPointer {
                    steps: steps.clone(),
                    column: column.clone(),
                    virtual_column: None,
                }),
            }

            if self.include_virtual_columns {
                for virtual_column in column.virtual_columns() {
                    visitor.visit(ColumnPointer {
                        steps: steps.clone(),
                        column: column.clone(),
                        virtual_column: Some(virtual_column.clone()),
                    });
                }
            }

            steps.pop();
        }
    }
}
