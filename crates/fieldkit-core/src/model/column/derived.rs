use crate::{model::Column, record::Value};
use std::collections::BTreeMap;

///
/// VirtualColumn
///
/// Read-only string column derived from a real target column. Virtual
/// columns are never serialized or stored; exporters may include them.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualColumn {
    name: String,
    mapping: VirtualMapping,
}

///
/// VirtualMapping
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VirtualMapping {
    /// Integer (or boolean, as 0/1) codes mapped to labels.
    Labels(BTreeMap<i64, String>),

    /// Text form of the target value.
    Text,
}

impl VirtualColumn {
    pub fn new(name: impl Into<String>, mapping: VirtualMapping) -> Self {
        Self {
            name: name.into(),
            mapping,
        }
    }

    /// Label mapping built from `(code, label)` pairs.
    pub fn labels<I, S>(name: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let labels = labels.into_iter().map(|(k, v)| (k, v.into())).collect();

        Self::new(name, VirtualMapping::Labels(labels))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn mapping(&self) -> &VirtualMapping {
        &self.mapping
    }

    /// Derive this column's value from the target's value.
    #[must_use]
    pub fn derive(&self, target: &Column, value: &Value) -> Option<String> {
        match &self.mapping {
            VirtualMapping::Labels(labels) => {
                let code = match value {
                    Value::Integer(v) => *v,
                    Value::Boolean(v) => i64::from(*v),
                    _ => return None,
                };
                labels.get(&code).cloned()
            }
            VirtualMapping::Text => Some(target.format(value)),
        }
    }
}
