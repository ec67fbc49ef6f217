use crate::model::{Schema, SchemaError, SchemaId, schema::check_name};
use std::sync::Arc;

///
/// CONSTANTS
///

/// Schemas per model; schema numbers fit in 4 bits.
pub const MAX_SCHEMAS: usize = 16;

/// Width of a model ID.
pub const MODEL_ID_SIZE: u32 = 56;

pub const MAX_MODEL_ID: u64 = (1 << MODEL_ID_SIZE) - 1;

/// Model ID reserved for internal bookkeeping schemas (transmissions).
pub const RESERVED_MODEL_ID: u64 = 0;

///
/// Model
///
/// Namespace of up to sixteen schemas, numbered in the order they were added.
///

#[derive(Clone, Debug)]
pub struct Model {
    id: u64,
    name: String,
    default_schema_flags: u32,
    schemas: Vec<Arc<Schema>>,
}

impl Model {
    pub fn new(id: u64, name: impl Into<String>) -> Result<Self, SchemaError> {
        if id > MAX_MODEL_ID {
            return Err(SchemaError::ModelIdOutOfRange {
                id,
                bits: MODEL_ID_SIZE,
            });
        }
        let name = name.into();
        check_name(&name)?;

        Ok(Self {
            id,
            name,
            default_schema_flags: 0,
            schemas: Vec::new(),
        })
    }

    /// Flags OR-ed into every schema added from now on.
    #[must_use]
    pub const fn with_default_schema_flags(mut self, flags: u32) -> Self {
        self.default_schema_flags = flags;
        self
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn default_schema_flags(&self) -> u32 {
        self.default_schema_flags
    }

    /// Assign the next schema number, seal the schema and take ownership.
    pub fn add_schema(&mut self, mut schema: Schema) -> Result<Arc<Schema>, SchemaError> {
        if self.schemas.len() >= MAX_SCHEMAS {
            return Err(SchemaError::TooManySchemas {
                model: self.name.clone(),
                max: MAX_SCHEMAS,
            });
        }
        if schema.is_sealed() {
            return Err(SchemaError::Sealed {
                schema: schema.name().to_string(),
            });
        }

        let number = self.schemas.len() as u8;
        schema.assign_id(SchemaId::new(self.id, number));
        schema.add_flags(self.default_schema_flags);
        schema.seal()?;

        let schema = Arc::new(schema);
        self.schemas.push(schema.clone());

        Ok(schema)
    }

    #[must_use]
    pub fn schema(&self, number: u8) -> Option<&Arc<Schema>> {
        self.schemas.get(usize::from(number))
    }

    #[must_use]
    pub fn schema_by_name(&self, name: &str) -> Option<&Arc<Schema>> {
        self.schemas.iter().find(|s| s.name() == name)
    }

    #[must_use]
    pub fn schemas(&self) -> &[Arc<Schema>] {
        &self.schemas
    }
}
