//! A collector stores sightings, ships them to a relay over binary SMS and
//! the relay persists, acknowledges and exports what it received.

use fieldkit_core::{
    config::Config,
    db::{FileBackend, MemoryBackend, RecordStore, RecordsQuery, Source, StoreOutcome},
    error::Error,
    export::{Exporter, XmlExporter, XmlImporter},
    model::{
        Column, ColumnKind, IntegerColumn, Model, RecordColumn, Schema, SchemaRegistry, TimeColumn,
    },
    record::{Record, Value},
    transmission::{
        Correspondent, Message, MessageSender, Payload, RecordsPayload, Transmission,
        TransmissionStore, TransportKind, register_transmission_model,
    },
};
use std::sync::Arc;
use tempfile::TempDir;
use time::{Duration, macros::datetime};

const SPECIES: [&str; 4] = [
    "Vanellus vanellus",
    "Alauda arvensis",
    "Emberiza citrinella",
    "Perdix perdix",
];

#[derive(Default)]
struct Outbox {
    sent: Vec<Message>,
}

impl MessageSender for Outbox {
    fn send(&mut self, _: &Correspondent, message: &Message) -> Result<(), Error> {
        self.sent.push(message.clone());
        Ok(())
    }
}

/// Registry holding the sightings model and the transmission model.
fn registry() -> (SchemaRegistry, Arc<Schema>, Arc<Schema>) {
    let mut schema = Schema::new("Sighting").expect("schema");
    schema
        .add_column(Column::string("Species", false, 24).expect("species"))
        .expect("add");
    schema
        .add_column(
            Column::new(
                "Count",
                ColumnKind::Integer(IntegerColumn::ranged(0, 255).expect("range")),
                false,
            )
            .expect("count"),
        )
        .expect("add");
    schema
        .add_column(Column::new("SeenAt", ColumnKind::Time(TimeColumn::LOSSLESS), false).expect("seen"))
        .expect("add");
    schema
        .add_column(
            Column::new(
                "Where",
                ColumnKind::Record(RecordColumn::location(false, false, false).expect("location")),
                true,
            )
            .expect("where"),
        )
        .expect("add");

    let mut model = Model::new(77, "Transects").expect("model");
    let sightings = model.add_schema(schema).expect("seal");

    let mut registry = SchemaRegistry::new();
    registry.register(model).expect("register");
    let transmissions = register_transmission_model(&mut registry).expect("transmission model");

    (registry, sightings, transmissions)
}

fn sighting(schema: &Arc<Schema>, i: i64) -> Record {
    let mut record = Record::new(schema.clone()).expect("record");
    record
        .set("Species", SPECIES[usize::try_from(i).expect("index") % SPECIES.len()])
        .expect("species");
    record.set("Count", i % 7 + 1).expect("count");
    record
        .set("SeenAt", datetime!(2024-05-04 06:00:00.125 +01:00) + Duration::minutes(i))
        .expect("seen");
    if i % 2 == 0 {
        let mut location = match schema.columns().column("Where").map(Column::kind) {
            Some(ColumnKind::Record(column)) => column.new_value(),
            _ => panic!("location column expected"),
        };
        location.set(RecordColumn::LATITUDE, 52.25).expect("lat");
        location.set(RecordColumn::LONGITUDE, -1.5).expect("lon");
        record.set("Where", location).expect("where");
    }

    record
}

fn relay_config(dir: &TempDir) -> Config {
    Config::from_toml_str(&format!(
        "[store]\nfolder = \"{}\"\nbase_name = \"relay\"\n\n[transmission]\nsms_max_parts = 4\n",
        dir.path().display()
    ))
    .expect("config")
}

#[test]
fn sightings_travel_from_collector_to_relay() {
    let collector_phone = Correspondent::new("Collector 3", "+447700900003");
    let relay_phone = Correspondent::new("Relay", "+447700900100");

    // collector
    let (_, sightings, collector_transmissions) = registry();
    let collector_db = Arc::new(RecordStore::new(MemoryBackend::new()));
    let mut collected = (0..120).map(|i| sighting(&sightings, i)).collect::<Vec<_>>();
    let outcomes = collector_db.store_all(&mut collected).expect("collect");
    assert!(outcomes.iter().all(|o| *o == StoreOutcome::Inserted));

    let dir = TempDir::new().expect("temp dir");
    let config = relay_config(&dir);
    let outgoing_store = TransmissionStore::new(
        collector_db.clone(),
        collector_transmissions,
        config.transmission.clone(),
    )
    .expect("transmission store");

    let mut outgoing = Transmission::outgoing(
        outgoing_store.config().default_transport(),
        relay_phone,
        RecordsPayload::new(true),
    )
    .expect("outgoing");
    outgoing_store.store(&mut outgoing).expect("store outgoing");
    assert_eq!(outgoing.local_id(), Some(0));

    let added = outgoing.fill_records(&collected).expect("fill");
    assert!(added > 0 && added < collected.len());

    let mut outbox = Outbox::default();
    outgoing.send(&mut outbox).expect("send");
    outgoing_store.store(&mut outgoing).expect("store sent");
    assert!(outbox.sent.len() > 1 && outbox.sent.len() <= 4);

    // relay
    let (relay_registry, _, relay_transmissions) = registry();
    let relay_registry = Arc::new(relay_registry);
    let relay_db = Arc::new(config.store.open(relay_registry.clone()).expect("relay store"));
    let incoming_store =
        TransmissionStore::new(relay_db.clone(), relay_transmissions, config.transmission.clone())
            .expect("transmission store");

    let mut last = None;
    for message in outbox.sent.iter().rev() {
        let wire = Message::from_bytes(&message.to_bytes().expect("bytes")).expect("parse");
        last = Some(
            incoming_store
                .receive_message(collector_phone.clone(), TransportKind::BinarySms, wire)
                .expect("receive part"),
        );
    }
    let mut incoming = last.expect("at least one part");
    assert!(incoming.is_complete());
    assert_eq!(incoming_store.retrieve_transmissions(true).expect("received").len(), 1);

    let Payload::Records(payload) = incoming.receive(&relay_registry).expect("payload").clone() else {
        panic!("records payload expected");
    };
    assert_eq!(payload.records(), &collected[..added]);

    let mut delivered = payload.into_records();
    let outcomes = relay_db.store_all(&mut delivered).expect("persist");
    assert!(outcomes.iter().all(|o| *o == StoreOutcome::Inserted));
    let outcomes = relay_db.store_all(&mut delivered).expect("redelivery");
    assert!(outcomes.iter().all(|o| *o == StoreOutcome::Unchanged));

    // acknowledgement closes the loop on the collector
    let ack = incoming.ack_payload().expect("ack");
    assert!(outgoing.is_acknowledged_by(&ack));
    outgoing.acknowledge().expect("acknowledge");
    outgoing_store.store(&mut outgoing).expect("store acknowledged");
    let restored = outgoing_store.retrieve(0).expect("retrieve").expect("present");
    assert!(restored.acknowledged_at().is_some());

    // relay restart keeps the sightings
    let sighting_query = RecordsQuery::new(Source::schema(sightings.id().expect("id")));
    relay_db.close().expect("close");
    drop(incoming_store);
    let reopened = config.store.open(relay_registry.clone()).expect("reopen");
    let persisted = reopened.retrieve_records(&sighting_query).expect("persisted");
    assert_eq!(persisted, collected[..added].to_vec());

    let backup = reopened
        .backup(config.store.backup_folder(), config.store.label_backups)
        .expect("backup");
    assert!(backup.exists());

    // export and re-import
    let export = XmlExporter::new(dir.path().join("exports"))
        .expect("exporter")
        .export(&persisted, "relay")
        .expect("export");
    assert_eq!(export.count, added);
    let imported = XmlImporter::new(relay_registry)
        .import_file(&export.path)
        .expect("import");
    assert!(imported.warnings.is_empty());
    assert_eq!(imported.records, persisted);
}

#[test]
fn transmission_ids_continue_after_restart() {
    let dir = TempDir::new().expect("temp dir");
    let config = relay_config(&dir);
    let peer = Correspondent::new("Peer", "+447700900200");

    let open = || {
        let (registry, _, transmissions) = registry();
        let db = Arc::new(config.store.open(Arc::new(registry)).expect("store"));
        TransmissionStore::new(db, transmissions, config.transmission.clone()).expect("transmissions")
    };
    let new_transmission = |store: &TransmissionStore<FileBackend>| {
        let mut transmission = Transmission::outgoing(
            store.config().transport(TransportKind::Http),
            peer.clone(),
            RecordsPayload::new(false),
        )
        .expect("outgoing");
        store.store(&mut transmission).expect("store");
        transmission.local_id().expect("id")
    };

    let store = open();
    assert_eq!(new_transmission(&store), 0);
    assert_eq!(new_transmission(&store), 1);
    assert!(store.delete(1).expect("delete"));
    store.records().close().expect("close");
    drop(store);

    let store = open();
    assert_eq!(new_transmission(&store), 2);
    assert_eq!(store.retrieve_transmissions(false).expect("sent").len(), 2);
    assert_eq!(
        store.retrieve(0).expect("retrieve").map(|t| t.correspondent().address().to_string()),
        Some(peer.address().to_string())
    );
    assert!(
        store
            .records()
            .retrieve_all_records()
            .expect("rows")
            .iter()
            .all(|r| r.get("Received") == Some(&Value::Boolean(false)))
    );
}
