//! Record queries: source filter, constraint, order and limit.

use crate::{model::SchemaId, record::{Record, Value}};
use std::{cmp::Ordering, collections::BTreeSet};

/// Limit value meaning "no limit".
pub const NO_LIMIT: usize = 0;

///
/// Source
///
/// Which schemas a query draws records from.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Source {
    #[default]
    Any,
    Schemata(BTreeSet<SchemaId>),
    Excluding(BTreeSet<SchemaId>),
}

impl Source {
    #[must_use]
    pub fn schema(id: SchemaId) -> Self {
        Self::Schemata(BTreeSet::from([id]))
    }

    pub fn schemata(ids: impl IntoIterator<Item = SchemaId>) -> Self {
        Self::Schemata(ids.into_iter().collect())
    }

    pub fn excluding(ids: impl IntoIterator<Item = SchemaId>) -> Self {
        Self::Excluding(ids.into_iter().collect())
    }

    #[must_use]
    pub fn admits(&self, id: Option<SchemaId>) -> bool {
        match (self, id) {
            (Self::Any, _) => true,
            (Self::Schemata(ids), Some(id)) => ids.contains(&id),
            (Self::Excluding(ids), Some(id)) => !ids.contains(&id),
            (Self::Excluding(_), None) => true,
            (Self::Schemata(_), None) => false,
        }
    }
}

///
/// CompareOp
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, left: &Value, right: &Value) -> bool {
        let ordering = left.compare(right);
        let equal = left == right || ordering == Some(Ordering::Equal);

        match self {
            Self::Eq => equal,
            Self::Ne => !equal,
            Self::Lt => ordering == Some(Ordering::Less),
            Self::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Self::Gt => ordering == Some(Ordering::Greater),
            Self::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        }
    }
}

///
/// Constraint
///
/// Predicate over a record's column values. Comparisons against a missing
/// value never hold; use [`Constraint::is_null`] to select those.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull(String),
    NotNull(String),
    And(Vec<Self>),
    Or(Vec<Self>),
    Not(Box<Self>),
}

impl Constraint {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn not_null(column: impl Into<String>) -> Self {
        Self::NotNull(column.into())
    }

    /// Conjunction; a single constraint is returned as is.
    #[must_use]
    pub fn all(mut constraints: Vec<Self>) -> Self {
        if constraints.len() == 1 {
            constraints.remove(0)
        } else {
            Self::And(constraints)
        }
    }

    /// Disjunction; a single constraint is returned as is.
    #[must_use]
    pub fn any(mut constraints: Vec<Self>) -> Self {
        if constraints.len() == 1 {
            constraints.remove(0)
        } else {
            Self::Or(constraints)
        }
    }

    #[must_use]
    pub fn negate(constraint: Self) -> Self {
        Self::Not(Box::new(constraint))
    }

    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::Compare { column, op, value } => record
                .get(column)
                .is_some_and(|stored| op.holds(stored, value)),
            Self::IsNull(column) => record.get(column).is_none(),
            Self::NotNull(column) => record.get(column).is_some(),
            Self::And(all) => all.iter().all(|c| c.matches(record)),
            Self::Or(any) => any.iter().any(|c| c.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }
}

///
/// Order
///
/// Sort keys, applied left to right. Missing values sort first in
/// ascending order.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Order {
    keys: Vec<(String, bool)>,
}

impl Order {
    pub fn by(column: impl Into<String>, ascending: bool) -> Self {
        Self {
            keys: vec![(column.into(), ascending)],
        }
    }

    #[must_use]
    pub fn then(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.keys.push((column.into(), ascending));
        self
    }

    #[must_use]
    pub fn keys(&self) -> &[(String, bool)] {
        &self.keys
    }

    #[must_use]
    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (column, ascending) in &self.keys {
            let ordering = compare_slots(a.get(column), b.get(column));
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }
}

fn compare_slots(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

///
/// RecordsQuery
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordsQuery {
    source: Source,
    constraint: Option<Constraint>,
    order: Option<Order>,
    limit: usize,
}

impl RecordsQuery {
    #[must_use]
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            constraint: None,
            order: None,
            limit: NO_LIMIT,
        }
    }

    /// Every record of every schema.
    #[must_use]
    pub const fn all() -> Self {
        Self::new(Source::Any)
    }

    #[must_use]
    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }

    #[must_use]
    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    #[must_use]
    pub const fn constraint(&self) -> Option<&Constraint> {
        self.constraint.as_ref()
    }

    #[must_use]
    pub const fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    #[must_use]
    pub fn matches(&self, record: &Record) -> bool {
        self.source.admits(record.schema().id())
            && self.constraint.as_ref().is_none_or(|c| c.matches(record))
    }

    /// Filter by source, then constraint; stable-sort; then limit.
    pub fn select<'a, K>(&self, rows: impl IntoIterator<Item = (K, &'a Record)>) -> Vec<(K, &'a Record)> {
        let mut selected = rows
            .into_iter()
            .filter(|(_, record)| self.matches(record))
            .collect::<Vec<_>>();

        if let Some(order) = &self.order {
            selected.sort_by(|(_, a), (_, b)| order.compare(a, b));
        }
        if self.limit != NO_LIMIT {
            selected.truncate(self.limit);
        }

        selected
    }
}

///
/// SingleRecordQuery
///

#[derive(Clone, Debug, PartialEq)]
pub enum SingleRecordQuery {
    /// First record the query yields.
    First(RecordsQuery),

    /// Record with the largest (or smallest) value in `column`; records
    /// without a value are skipped.
    Extreme {
        query: RecordsQuery,
        column: String,
        max: bool,
    },
}

impl SingleRecordQuery {
    #[must_use]
    pub const fn query(&self) -> &RecordsQuery {
        match self {
            Self::First(query) | Self::Extreme { query, .. } => query,
        }
    }

    pub fn select<'a, K>(&self, rows: impl IntoIterator<Item = (K, &'a Record)>) -> Option<(K, &'a Record)> {
        match self {
            Self::First(query) => query.select(rows).into_iter().next(),
            Self::Extreme { query, column, max } => {
                let candidates = query
                    .select(rows)
                    .into_iter()
                    .filter(|(_, record)| record.get(column).is_some());

                // first extreme wins on ties
                candidates.reduce(|best, candidate| {
                    let ordering = compare_slots(candidate.1.get(column), best.1.get(column));
                    let better = if *max {
                        ordering == Ordering::Greater
                    } else {
                        ordering == Ordering::Less
                    };
                    if better { candidate } else { best }
                })
            }
        }
    }
}
