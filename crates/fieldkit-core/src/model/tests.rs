use super::*;
use fieldkit_io::Charset;

fn site_schema() -> Schema {
    let mut schema = Schema::new("Site").expect("schema");
    schema
        .add_column(Column::string("Name", false, 64).expect("name"))
        .expect("add name");
    schema
        .add_column(Column::new("Depth", ColumnKind::Float(FloatColumn::SINGLE), true).expect("depth"))
        .expect("add depth");

    schema
}

// ============================================================================
// Schema
// ============================================================================

#[test]
fn sealing_adds_auto_key() {
    let mut model = Model::new(7, "Survey").expect("model");
    let schema = model.add_schema(site_schema()).expect("add");

    assert!(schema.is_sealed());
    assert_eq!(schema.id(), Some(SchemaId::new(7, 0)));

    let key = schema.auto_increment_column().expect("auto key");
    assert_eq!(key.name(), AUTO_KEY_COLUMN_NAME);
    assert_eq!(schema.position(AUTO_KEY_COLUMN_NAME), Some(2));
    assert_eq!(schema.primary_key_columns().map(|pk| pk.len()), Some(1));
}

#[test]
fn explicit_primary_key_suppresses_auto_key() {
    let mut schema = Schema::new("Person").expect("schema");
    schema
        .add_primary_key_column(Column::string("Email", false, 128).expect("email"))
        .expect("pk");
    schema.seal().expect("seal");

    assert!(!schema.contains_name(AUTO_KEY_COLUMN_NAME));
    assert!(schema.auto_increment_column().is_none());
    assert_eq!(schema.primary_key().map(PrimaryKey::columns), Some(&["Email".to_string()][..]));
}

#[test]
fn sealed_schema_rejects_changes() {
    let mut schema = site_schema();
    schema.seal().expect("seal");
    schema.seal().expect("sealing twice is a no-op");

    let err = schema
        .add_column(Column::integer("Late", true).expect("column"))
        .expect_err("sealed");
    assert!(matches!(err, SchemaError::Sealed { .. }));
    assert!(schema.add_index(Index::new("ByName", ["Name"], false)).is_err());

    let mut model = Model::new(1, "M").expect("model");
    assert!(matches!(model.add_schema(schema), Err(SchemaError::Sealed { .. })));
}

#[test]
fn rejected_key_column_is_not_added() {
    let mut schema = Schema::new("Badge").expect("schema");
    let err = schema
        .add_primary_key_column(Column::string("Code", true, 16).expect("code"))
        .expect_err("optional key");
    assert!(matches!(err, SchemaError::OptionalPrimaryKeyColumn { .. }));
    assert!(schema.column("Code").is_none());

    schema
        .add_primary_key_column(Column::string("Code", false, 16).expect("code"))
        .expect("required key");
    assert_eq!(schema.columns().len(), 1);
}

#[test]
fn primary_key_rules() {
    let mut schema = site_schema();
    let err = schema
        .set_primary_key(PrimaryKey::new(["Depth"]))
        .expect_err("optional column");
    assert!(matches!(err, SchemaError::OptionalPrimaryKeyColumn { .. }));

    let err = schema
        .set_primary_key(PrimaryKey::auto_increment("Name"))
        .expect_err("auto key must be integer");
    assert!(matches!(err, SchemaError::InvalidColumn { .. }));

    assert!(matches!(
        schema.set_primary_key(PrimaryKey::new(["Missing"])),
        Err(SchemaError::UnknownColumn { .. })
    ));

    schema.set_primary_key(PrimaryKey::new(["Name"])).expect("pk");
    assert!(matches!(
        schema.set_primary_key(PrimaryKey::new(["Name"])),
        Err(SchemaError::PrimaryKeyAlreadySet { .. })
    ));
}

#[test]
fn duplicate_names_are_rejected_across_virtual_columns() {
    let mut schema = site_schema();
    assert!(matches!(
        schema.add_column(Column::integer("Name", false).expect("column")),
        Err(SchemaError::DuplicateColumn { .. })
    ));

    schema
        .add_virtual_column("Depth", VirtualColumn::new("DepthText", VirtualMapping::Text))
        .expect("virtual");
    assert!(schema.add_column(Column::integer("DepthText", false).expect("column")).is_err());
    assert!(
        schema
            .add_virtual_column("Nope", VirtualColumn::new("Other", VirtualMapping::Text))
            .is_err()
    );
}

#[test]
fn lossless_flag_column_only_for_lossy_schemas() {
    let mut model = Model::new(3, "Flags").expect("model");

    let lossy = site_schema().with_flags(Schema::FLAG_TRACK_LOSSLESSNESS);
    let lossy = model.add_schema(lossy).expect("lossy");
    assert!(lossy.lossless_column_position().is_some());
    let flag = lossy.column(LOSSLESS_COLUMN_NAME).expect("flag column");
    assert_eq!(flag.default_value(), Some(&crate::record::Value::Boolean(true)));

    let mut exact = Schema::new("Exact")
        .expect("schema")
        .with_flags(Schema::FLAG_TRACK_LOSSLESSNESS);
    exact
        .add_column(Column::integer("N", false).expect("n"))
        .expect("add");
    let exact = model.add_schema(exact).expect("exact");
    assert!(exact.lossless_column_position().is_none());
}

#[test]
fn model_default_flags_reach_schemas() {
    let mut model = Model::new(4, "Defaults")
        .expect("model")
        .with_default_schema_flags(Schema::FLAG_TRACK_LOSSLESSNESS);
    let schema = model.add_schema(site_schema()).expect("add");
    assert!(schema.has_flags(Schema::FLAG_TRACK_LOSSLESSNESS));
}

#[test]
fn sizes_add_up_over_columns() {
    let mut model = Model::new(2, "Sizes").expect("model");
    let schema = model.add_schema(site_schema()).expect("add");

    // Name 7-bit length, Depth presence bit (+32 or +64), AutoKey 64
    assert_eq!(schema.min_size(false), 7 + 1 + 64);
    assert_eq!(schema.max_size(false), 7 + 64 * 8 + 1 + 32 + 64);
    assert_eq!(schema.max_size(true), 7 + 64 * 8 + 1 + 64 + 64);
    assert!(schema.can_be_lossy());
}

#[test]
fn equality_can_relax_names() {
    let mut model = Model::new(9, "Eq").expect("model");
    let a = model.add_schema(site_schema()).expect("a");

    let mut other = Model::new(9, "Eq").expect("model");
    let mut renamed = Schema::new("Location").expect("schema");
    renamed
        .add_column(Column::string("Label", false, 64).expect("label"))
        .expect("add");
    renamed
        .add_column(Column::new("Depth", ColumnKind::Float(FloatColumn::SINGLE), true).expect("depth"))
        .expect("add");
    let b = other.add_schema(renamed).expect("b");

    assert_ne!(*a, *b);
    assert!(a.equals_with(&b, false, true, false));
    assert!(!a.equals_with(&b, true, true, false));
}

#[test]
fn specification_lists_columns() {
    let mut model = Model::new(5, "Woodland").expect("model");
    let schema = model.add_schema(site_schema()).expect("add");

    let text = schema.specification();
    assert!(text.starts_with("Schema 'Site' (model 5, schema 0)"));
    assert!(text.contains("  - Depth: float (optional)"));
    assert!(text.contains(AUTO_KEY_COLUMN_NAME));
}

#[test]
fn names_have_a_length_limit() {
    let long = "x".repeat(MAX_NAME_LENGTH + 1);
    assert!(matches!(Schema::new(long.clone()), Err(SchemaError::NameTooLong { .. })));
    assert!(Model::new(1, long).is_err());
}

// ============================================================================
// Model
// ============================================================================

#[test]
fn model_numbers_schemas_in_order() {
    let mut model = Model::new(11, "Order").expect("model");
    for i in 0..MAX_SCHEMAS {
        let schema = model
            .add_schema(Schema::new(format!("S{i}")).expect("schema"))
            .expect("add");
        assert_eq!(schema.id().map(|id| usize::from(id.number())), Some(i));
    }

    let err = model
        .add_schema(Schema::new("Overflow").expect("schema"))
        .expect_err("full");
    assert!(matches!(err, SchemaError::TooManySchemas { max: MAX_SCHEMAS, .. }));
    assert_eq!(model.schema_by_name("S3").and_then(|s| s.id()), Some(SchemaId::new(11, 3)));
}

#[test]
fn model_id_must_fit() {
    assert!(Model::new(MAX_MODEL_ID, "Max").is_ok());
    assert!(matches!(
        Model::new(MAX_MODEL_ID + 1, "TooBig"),
        Err(SchemaError::ModelIdOutOfRange { bits: MODEL_ID_SIZE, .. })
    ));
}

#[test]
fn schema_id_sort_code_round_trips() {
    let id = SchemaId::new(0x00AB_CDEF, 9);
    assert_eq!(SchemaId::from_sort_code(id.sort_code()), id);
    assert!(SchemaId::new(1, 15).sort_code() < SchemaId::new(2, 0).sort_code());
    assert_eq!(id.to_string(), "11259375:9");
}

// ============================================================================
// Registry
// ============================================================================

#[test]
fn registry_resolves_schemas() {
    let mut model = Model::new(21, "Registry").expect("model");
    let site = model.add_schema(site_schema()).expect("site");

    let mut registry = SchemaRegistry::new();
    registry.register(model).expect("register");

    let id = site.id().expect("id");
    assert!(std::sync::Arc::ptr_eq(registry.schema(id).expect("schema"), &site));
    assert!(matches!(
        registry.schema(SchemaId::new(21, 4)),
        Err(SchemaError::UnknownSchema { .. })
    ));
    assert!(matches!(registry.model(99), Err(SchemaError::UnknownModel { id: 99 })));

    let duplicate = Model::new(21, "Again").expect("model");
    assert!(matches!(registry.register(duplicate), Err(SchemaError::DuplicateModel { .. })));
    assert_eq!(registry.schemata().count(), 1);
}

#[test]
fn legacy_aliases_resolve() {
    let mut model = Model::new(22, "Legacy").expect("model");
    let site = model.add_schema(site_schema()).expect("site");

    let mut registry = SchemaRegistry::new();
    registry.register(model).expect("register");
    registry
        .add_legacy_alias(1_234, 2, site.id().expect("id"))
        .expect("alias");

    assert_eq!(registry.legacy_schema(1_234, 2).expect("legacy").name(), "Site");
    assert!(registry.legacy_schema(1_234, 3).is_err());
    assert!(
        registry
            .add_legacy_alias(1, 1, SchemaId::new(23, 0))
            .is_err()
    );
}

#[test]
fn schema_errors_map_to_classes() {
    let err: crate::error::Error = SchemaError::UnknownModel { id: 1 }.into();
    assert!(err.is_not_found());

    let err: crate::error::Error = SchemaError::DuplicateColumn { name: "A".into() }.into();
    assert!(err.is_validation());
}

#[test]
fn foreign_key_columns_mirror_primary_key() {
    let mut model = Model::new(30, "Refs").expect("model");
    let site = model.add_schema(site_schema()).expect("site");

    let column = RecordColumn::foreign_key(&site).expect("fk");
    assert_eq!(column.role(), RecordRole::ForeignKey(SchemaId::new(30, 0)));
    assert_eq!(column.columns().len(), 1);

    let unsealed = Schema::new("Loose").expect("schema");
    assert!(RecordColumn::foreign_key(&unsealed).is_err());

    let kind = StringColumn::new(4, Charset::Utf8).expect("kind");
    assert_eq!(kind.max_length(), 4);
}
