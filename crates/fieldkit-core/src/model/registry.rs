use crate::model::{Model, Schema, SchemaError, SchemaId};
use std::{collections::BTreeMap, sync::Arc};

///
/// SchemaRegistry
///
/// Resolves schema and model identifiers to their definitions. Record
/// stores, transmissions and importers all look schemas up through here.
///

#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    models: BTreeMap<u64, Arc<Model>>,
    legacy: BTreeMap<(i64, i64), SchemaId>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: Model) -> Result<Arc<Model>, SchemaError> {
        if self.models.contains_key(&model.id()) {
            return Err(SchemaError::DuplicateModel { id: model.id() });
        }

        let model = Arc::new(model);
        self.models.insert(model.id(), model.clone());

        Ok(model)
    }

    /// Map a legacy `(schema-id, schema-version)` pair onto a registered schema.
    pub fn add_legacy_alias(
        &mut self,
        schema_id: i64,
        version: i64,
        id: SchemaId,
    ) -> Result<(), SchemaError> {
        self.schema(id)?;
        self.legacy.insert((schema_id, version), id);

        Ok(())
    }

    pub fn model(&self, id: u64) -> Result<&Arc<Model>, SchemaError> {
        self.models.get(&id).ok_or(SchemaError::UnknownModel { id })
    }

    pub fn schema(&self, id: SchemaId) -> Result<&Arc<Schema>, SchemaError> {
        self.model(id.model_id())?
            .schema(id.number())
            .ok_or(SchemaError::UnknownSchema { id })
    }

    pub fn legacy_schema(&self, schema_id: i64, version: i64) -> Result<&Arc<Schema>, SchemaError> {
        let id = self
            .legacy
            .get(&(schema_id, version))
            .ok_or(SchemaError::UnknownLegacySchema { schema_id, version })?;

        self.schema(*id)
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.models.values()
    }

    pub fn schemata(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.models.values().flat_map(|m| m.schemas())
    }
}
