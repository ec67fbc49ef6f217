use super::*;
use crate::{
    model::{
        Column, ColumnKind, IntegerColumn, ListColumn, Model, RecordColumn, Schema, SchemaRegistry,
        VirtualColumn,
    },
    record::Value,
};
use std::sync::Arc;
use tempfile::TempDir;

struct Fixture {
    registry: Arc<SchemaRegistry>,
    site: Arc<Schema>,
    other: Arc<Schema>,
}

fn fixture() -> Fixture {
    let mut site = Schema::new("Site").expect("schema");
    site.add_column(Column::string("Name", false, 32).expect("name"))
        .expect("add");
    site.add_column(
        Column::new(
            "Kind",
            ColumnKind::Integer(IntegerColumn::ranged(0, 3).expect("range")),
            false,
        )
        .expect("kind"),
    )
    .expect("add");
    site.add_virtual_column("Kind", VirtualColumn::labels("KindLabel", [(2, "tree")]))
        .expect("virtual");
    site.add_column(
        Column::new(
            "Where",
            ColumnKind::Record(RecordColumn::location(false, false, false).expect("location")),
            true,
        )
        .expect("where"),
    )
    .expect("add");
    site.add_column(Column::string("Notes", true, 64).expect("notes"))
        .expect("add");
    let tag = Column::string("Tag", false, 8).expect("tag");
    site.add_column(
        Column::new("Tags", ColumnKind::List(ListColumn::new(tag, 0, 4).expect("list")), false)
            .expect("tags"),
    )
    .expect("add");

    let mut other = Schema::new("Other").expect("schema");
    other
        .add_column(Column::integer("N", false).expect("n"))
        .expect("add");

    let mut model = Model::new(8, "Survey").expect("model");
    let site = model.add_schema(site).expect("site");
    let other = model.add_schema(other).expect("other");

    let mut registry = SchemaRegistry::new();
    registry.register(model).expect("register");
    registry
        .add_legacy_alias(99, 0, site.id().expect("id"))
        .expect("alias");

    Fixture {
        registry: Arc::new(registry),
        site,
        other,
    }
}

fn site_record(schema: &Arc<Schema>, name: &str, key: i64) -> Record {
    let mut record = Record::new(schema.clone()).expect("record");
    record.set("Name", name).expect("name");
    record.set("Kind", 2).expect("kind");

    let mut location = match schema.column("Where").map(Column::kind) {
        Some(ColumnKind::Record(column)) => column.new_value(),
        _ => panic!("location column expected"),
    };
    location.set(RecordColumn::LATITUDE, 51.5).expect("lat");
    location.set(RecordColumn::LONGITUDE, -0.25).expect("lon");
    record.set("Where", location).expect("where");
    record
        .set("Tags", vec![Value::from("ash"), Value::from("elm")])
        .expect("tags");
    record.set("AutoKey", key).expect("key");

    record
}

// ============================================================================
// Traversal
// ============================================================================

#[test]
fn traverser_enters_composites_by_default() {
    let fx = fixture();
    let names = SchemaTraverser::new()
        .leaves(fx.site.columns())
        .iter()
        .map(ColumnPointer::qualified_name)
        .collect::<Vec<_>>();

    assert_eq!(
        names,
        ["Name", "Kind", "Where.Latitude", "Where.Longitude", "Notes", "Tags", "AutoKey"]
    );
}

#[test]
fn self_traversal_and_virtual_columns() {
    let fx = fixture();
    let pointers = SchemaTraverser::new()
        .with_virtual_columns(true)
        .with_location_self_traversal(true)
        .leaves(fx.site.columns());
    let names = pointers
        .iter()
        .map(ColumnPointer::qualified_name)
        .collect::<Vec<_>>();

    assert_eq!(names, ["Name", "Kind", "KindLabel", "Where", "Notes", "Tags", "AutoKey"]);
    assert!(pointers[2].is_virtual());
    assert_eq!(pointers[2].column().name(), "Kind");
}

#[test]
fn pointers_read_nested_values() {
    let fx = fixture();
    let record = site_record(&fx.site, "Oak", 1);
    let pointers = SchemaTraverser::new()
        .with_virtual_columns(true)
        .leaves(fx.site.columns());

    let latitude = pointers
        .iter()
        .find(|p| p.qualified_name() == "Where.Latitude")
        .expect("latitude");
    assert_eq!(latitude.depth(), 2);
    assert_eq!(latitude.value(record.value_set()), Some(&Value::Float(51.5)));

    let label = pointers
        .iter()
        .find(|p| p.is_virtual())
        .expect("label");
    assert_eq!(label.text(record.value_set()).as_deref(), Some("tree"));

    let notes = pointers
        .iter()
        .find(|p| p.qualified_name() == "Notes")
        .expect("notes");
    assert_eq!(notes.text(record.value_set()), None);
}

#[derive(Default)]
struct Counter(usize);

impl ColumnVisitor for Counter {
    fn visit(&mut self, _pointer: ColumnPointer) {
        self.0 += 1;
    }
}

#[test]
fn custom_visitors_see_every_leaf() {
    let fx = fixture();
    let mut counter = Counter::default();
    SchemaTraverser::new()
        .with_foreign_key_self_traversal(true)
        .traverse(fx.site.columns(), &mut counter);

    assert_eq!(counter.0, 7);
}

// ============================================================================
// CSV
// ============================================================================

#[test]
fn csv_quotes_strings_and_keeps_labels_bare() {
    let fx = fixture();
    let dir = TempDir::new().expect("temp dir");
    let exporter = CsvExporter::new(dir.path()).expect("exporter");

    let records = vec![
        site_record(&fx.site, "Oak, old", 3),
        site_record(&fx.site, "Say \"hi\"", 4),
    ];
    let (text, count) = exporter.render(&records);

    assert_eq!(count, 2);
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "Name,Kind,KindLabel,Where,Notes,Tags,AutoKey");
    assert_eq!(lines[1], "\"Oak, old\",2,tree,51.5;-0.25,,\"ash,elm\",3");
    assert_eq!(lines[2], "\"Say \"\"hi\"\"\",2,tree,51.5;-0.25,,\"ash,elm\",4");
}

#[test]
fn csv_skips_records_of_other_schemas() {
    let fx = fixture();
    let dir = TempDir::new().expect("temp dir");
    let exporter = CsvExporter::new(dir.path())
        .expect("exporter")
        .with_separator(';');

    let mut stranger = Record::new(fx.other.clone()).expect("record");
    stranger.set("N", 1i64).expect("n");
    let (text, count) = exporter.render(&[site_record(&fx.site, "Oak", 1), stranger]);

    assert_eq!(count, 1);
    assert_eq!(text.lines().count(), 2);
    assert!(text.starts_with("Name;Kind;"));
    // the location text contains the separator now
    assert!(text.contains("\"51.5;-0.25\""));
}

#[test]
fn csv_export_writes_a_dump_file() {
    let fx = fixture();
    let dir = TempDir::new().expect("temp dir");
    let exporter = CsvExporter::new(dir.path().join("exports")).expect("exporter");

    let result = exporter
        .export(&[site_record(&fx.site, "Oak", 1)], "sites")
        .expect("export");
    assert_eq!(result.count, 1);

    let name = result
        .path
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(name.starts_with("RecordDump_sites_"));
    assert!(name.ends_with(".csv"));

    let written = std::fs::read_to_string(&result.path).expect("read");
    assert!(written.starts_with("Name,Kind,KindLabel"));
}

#[test]
fn empty_csv_export_has_no_header() {
    let dir = TempDir::new().expect("temp dir");
    let exporter = CsvExporter::new(dir.path()).expect("exporter");

    assert_eq!(exporter.render(&[]), (String::new(), 0));
}

// ============================================================================
// XML
// ============================================================================

#[test]
fn xml_round_trips_in_every_composite_mode() {
    let fx = fixture();
    let dir = TempDir::new().expect("temp dir");
    let importer = XmlImporter::new(fx.registry.clone());
    let records = vec![
        site_record(&fx.site, "<Oak & 'Ash'>", 1),
        site_record(&fx.site, "Elm", 2),
    ];

    for mode in [CompositeMode::Flat, CompositeMode::Nested, CompositeMode::String] {
        let exporter = XmlExporter::new(dir.path()).expect("exporter").with_mode(mode);
        let (xml, count) = exporter.render(&records).expect("render");
        assert_eq!(count, 2);

        let imported = importer.import_str(&xml).expect("import");
        assert!(imported.warnings.is_empty(), "{mode:?}: {:?}", imported.warnings);
        assert_eq!(imported.records, records, "{mode:?}");
    }
}

#[test]
fn xml_layout_follows_the_mode() {
    let fx = fixture();
    let dir = TempDir::new().expect("temp dir");
    let records = [site_record(&fx.site, "Oak", 1)];

    let flat = XmlExporter::new(dir.path())
        .expect("exporter")
        .render(&records)
        .expect("flat")
        .0;
    assert!(flat.contains("<Record modelID=\"8\" modelSchemaNumber=\"0\" schemaName=\"Site\">"));
    assert!(flat.contains("<Where.Latitude>51.5</Where.Latitude>"));
    assert!(flat.contains("<KindLabel>tree</KindLabel>"));

    let nested = XmlExporter::new(dir.path())
        .expect("exporter")
        .with_mode(CompositeMode::Nested)
        .with_virtual_columns(false)
        .render(&records)
        .expect("nested")
        .0;
    assert!(nested.contains("<Where>\n"));
    assert!(nested.contains("<Latitude>51.5</Latitude>"));
    assert!(!nested.contains("KindLabel"));

    let string = XmlExporter::new(dir.path())
        .expect("exporter")
        .with_mode(CompositeMode::String)
        .render(&records)
        .expect("string")
        .0;
    assert!(string.contains("<Where>51.5;-0.25</Where>"));
}

#[test]
fn xml_export_and_import_through_files() {
    let fx = fixture();
    let dir = TempDir::new().expect("temp dir");
    let records = vec![site_record(&fx.site, "Oak", 1)];

    let result = XmlExporter::new(dir.path())
        .expect("exporter")
        .export(&records, "backup")
        .expect("export");
    assert!(result.path.extension().is_some_and(|e| e == "xml"));

    let imported = XmlImporter::new(fx.registry.clone())
        .import_file(&result.path)
        .expect("import");
    assert_eq!(imported.records, records);
}

#[test]
fn legacy_attributes_resolve_through_aliases() {
    let fx = fixture();
    let xml = r#"<?xml version="1.0"?>
<!-- exported by an older release -->
<RecordsExport>
    <Record schema-id="99">
        <Name><![CDATA[Old <oak>]]></Name>
        <Kind>1</Kind>
        <Tags>a</Tags>
        <AutoKey>7</AutoKey>
    </Record>
    <Record schema-id="99" schema-version="4">
        <Name>Gone</Name>
    </Record>
</RecordsExport>"#;

    let imported = XmlImporter::new(fx.registry.clone())
        .import_str(xml)
        .expect("import");

    assert_eq!(imported.records.len(), 1);
    let record = &imported.records[0];
    assert_eq!(record.get("Name"), Some(&Value::from("Old <oak>")));
    assert_eq!(record.auto_key(), Some(7));
    assert_eq!(imported.warnings.len(), 1);
    assert!(imported.warnings[0].contains("version 4"));
}

#[test]
fn import_warns_about_bad_content() {
    let fx = fixture();
    let xml = "<RecordsExport>\
        <Record modelID=\"8\" modelSchemaNumber=\"0\">\
            <Name>Oak</Name><Kind>nine</Kind><Colour>red</Colour><KindLabel>x</KindLabel>\
        </Record>\
        <Record modelID=\"9\" modelSchemaNumber=\"0\"/>\
        <Comment>hi</Comment>\
    </RecordsExport>";

    let imported = XmlImporter::new(fx.registry.clone())
        .import_str(xml)
        .expect("import");

    assert_eq!(imported.records.len(), 1);
    assert!(!imported.records[0].is_value_set("Kind"));
    let warnings = imported.warnings.join("\n");
    assert!(warnings.contains("'nine'"));
    assert!(warnings.contains("Colour"));
    assert!(!warnings.contains("KindLabel"));
    assert!(warnings.contains("schema 9:0 is unknown"));
    assert!(warnings.contains("<Comment>"));
}

#[test]
fn malformed_documents_are_rejected() {
    let fx = fixture();
    let importer = XmlImporter::new(fx.registry.clone());

    let nested = "<RecordsExport><Record modelID=\"8\" modelSchemaNumber=\"0\"><Record/></Record></RecordsExport>";
    let err = importer.import_str(nested).expect_err("nested");
    assert!(err.is_unsupported());
    assert!(err.message.contains("cannot be nested"));

    let unclosed = "<RecordsExport>\n<Record modelID=\"8\" modelSchemaNumber=\"0\">";
    let err = importer.import_str(unclosed).expect_err("unclosed");
    assert!(err.message.contains("line 2"));

    assert!(importer.import_str("<Records></Records>").is_err());
    assert!(importer.import_str("<RecordsExport><A></B></RecordsExport>").is_err());
    assert!(importer.import_str("<RecordsExport>&bogus;</RecordsExport>").is_err());

    let missing = "<RecordsExport><Record modelID=\"8\"/></RecordsExport>";
    let err = importer.import_str(missing).expect_err("missing attribute");
    assert!(err.message.contains("modelSchemaNumber"));
}

// ============================================================================
// Lines
// ============================================================================

fn walks() -> (Arc<SchemaRegistry>, Arc<Schema>) {
    let mut route = Schema::new("Route").expect("schema");
    route
        .add_column(Column::string("Name", false, 32).expect("name"))
        .expect("add");
    route
        .add_column(Column::line("Track", true, false, false).expect("track"))
        .expect("add");

    let mut model = Model::new(11, "Walks").expect("model");
    let route = model.add_schema(route).expect("route");
    let mut registry = SchemaRegistry::new();
    registry.register(model).expect("register");

    (Arc::new(registry), route)
}

fn route_record(schema: &Arc<Schema>, name: &str, key: i64, points: &[(f64, f64)]) -> Record {
    let point = match schema.column("Track").map(Column::kind) {
        Some(ColumnKind::List(list)) => list.point_column().expect("line").clone(),
        _ => panic!("line column expected"),
    };

    let mut record = Record::new(schema.clone()).expect("record");
    record.set("Name", name).expect("name");
    let track = points
        .iter()
        .map(|&(latitude, longitude)| {
            let mut value = point.new_value();
            value.set(RecordColumn::LATITUDE, latitude).expect("lat");
            value.set(RecordColumn::LONGITUDE, longitude).expect("lon");
            Value::Record(value)
        })
        .collect::<Vec<_>>();
    if !track.is_empty() {
        record.set("Track", track).expect("track");
    }
    record.set("AutoKey", key).expect("key");

    record
}

#[test]
fn lines_are_single_leaves() {
    let (_, route) = walks();
    let names = SchemaTraverser::new()
        .leaves(route.columns())
        .iter()
        .map(ColumnPointer::qualified_name)
        .collect::<Vec<_>>();

    assert_eq!(names, ["Name", "Track", "AutoKey"]);
}

#[test]
fn csv_writes_lines_as_point_lists() {
    let (_, route) = walks();
    let dir = TempDir::new().expect("temp dir");
    let records = [
        route_record(&route, "Ridge", 1, &[(51.5, -0.125), (51.25, -0.5)]),
        route_record(&route, "Short", 2, &[]),
    ];

    let (text, count) = CsvExporter::new(dir.path()).expect("exporter").render(&records);
    assert_eq!(count, 2);
    let lines = text.lines().collect::<Vec<_>>();
    assert_eq!(lines[0], "Name,Track,AutoKey");
    assert_eq!(lines[1], "\"Ridge\",\"51.5;-0.125,51.25;-0.5\",1");
    assert_eq!(lines[2], "\"Short\",,2");
}

#[test]
fn xml_round_trips_lines() {
    let (registry, route) = walks();
    let dir = TempDir::new().expect("temp dir");
    let importer = XmlImporter::new(registry);
    let records = vec![
        route_record(&route, "Ridge", 1, &[(51.5, -0.125), (51.25, -0.5), (51.0, -0.75)]),
        route_record(&route, "Short", 2, &[]),
    ];

    for mode in [CompositeMode::Flat, CompositeMode::Nested, CompositeMode::String] {
        let exporter = XmlExporter::new(dir.path()).expect("exporter").with_mode(mode);
        let (xml, _) = exporter.render(&records).expect("render");
        assert!(xml.contains("<Track>51.5;-0.125,51.25;-0.5,51.0;-0.75</Track>"), "{mode:?}");

        let imported = importer.import_str(&xml).expect("import");
        assert!(imported.warnings.is_empty(), "{mode:?}: {:?}", imported.warnings);
        assert_eq!(imported.records, records, "{mode:?}");
    }
}

#[test]
fn deep_nesting_is_refused() {
    let fx = fixture();
    let importer = XmlImporter::new(fx.registry.clone());
    let depth = 100_000;
    let xml = format!("<RecordsExport>{}{}</RecordsExport>", "<a>".repeat(depth), "</a>".repeat(depth));

    let err = importer.import_str(&xml).expect_err("too deep");
    assert!(err.is_unsupported());
    assert!(err.message.contains("deeper than 64"), "{}", err.message);

    let within = format!(
        "<RecordsExport>{}{}</RecordsExport>",
        "<a>".repeat(xml::MAX_ELEMENT_DEPTH - 1),
        "</a>".repeat(xml::MAX_ELEMENT_DEPTH - 1)
    );
    let imported = importer.import_str(&within).expect("at the limit");
    assert!(imported.records.is_empty());
}

#[test]
fn error_lines_count_every_construct() {
    let fx = fixture();
    let xml = "<RecordsExport>\n\
        <!-- two\nlines -->\n\
        <Record modelID=\"8\"\n modelSchemaNumber=\"0\">\n\
        <Name><![CDATA[a\nb]]></Name>\n\
        </Oops>";

    let err = XmlImporter::new(fx.registry.clone())
        .import_str(xml)
        .expect_err("mismatched");
    assert!(err.message.contains("line 8"), "{}", err.message);
}

#[test]
fn export_errors_map_to_classes() {
    let err: Error = ExportError::Malformed {
        line: 3,
        message: "bad".into(),
    }
    .into();
    assert!(err.is_unsupported());
    assert_eq!(err.origin, ErrorOrigin::Export);
    assert_eq!(err.message, "malformed XML at line 3: bad");
}
