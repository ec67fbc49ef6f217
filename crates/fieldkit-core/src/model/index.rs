use std::fmt::{self, Display};

///
/// Index
/// Ordered subset of a schema's columns, referenced by name.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Index {
    name: String,
    columns: Vec<String>,
    unique: bool,
}

impl Index {
    pub fn new<I, S>(name: impl Into<String>, columns: I, unique: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
            unique,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.unique
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = self.columns.join(", ");

        if self.unique {
            write!(f, "UNIQUE {}({})", self.name, columns)
        } else {
            write!(f, "{}({})", self.name, columns)
        }
    }
}

///
/// PrimaryKey
/// Always-unique index; may be backed by an auto-incrementing integer column.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrimaryKey {
    index: Index,
    auto_increment: bool,
}

impl PrimaryKey {
    pub const DEFAULT_NAME: &'static str = "PK";

    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: Index::new(Self::DEFAULT_NAME, columns, true),
            auto_increment: false,
        }
    }

    /// Single integer column whose values are allocated by the record store.
    pub fn auto_increment(column: impl Into<String>) -> Self {
        Self {
            index: Index::new(Self::DEFAULT_NAME, [column.into()], true),
            auto_increment: true,
        }
    }

    #[must_use]
    pub const fn index(&self) -> &Index {
        &self.index
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        self.index.columns()
    }

    #[must_use]
    pub const fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }
}

impl Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PRIMARY KEY({})", self.index.columns.join(", "))?;
        if self.auto_increment {
            f.write_str(" AUTO_INCREMENT")?;
        }

        Ok(())
    }
}
