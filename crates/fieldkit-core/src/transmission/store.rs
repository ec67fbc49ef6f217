use crate::{
    config::TransmissionConfig,
    db::{Constraint, Order, RecordBackend, RecordStore, RecordsQuery, SingleRecordQuery, Source},
    error::{Error, ErrorOrigin},
    model::{
        AUTO_KEY_COLUMN_NAME, BytesColumn, Column, ColumnKind, ColumnSet, IntegerColumn,
        ListColumn, Model, RESERVED_MODEL_ID, RecordColumn, Schema, SchemaError, SchemaId,
        SchemaRegistry, StringColumn, TimeColumn,
    },
    record::{Record, Value, ValueSet},
    transmission::{
        Correspondent, LengthField, MAX_TRANSMISSION_ID, MAX_TRANSMISSION_PARTS, Message,
        MessageBody, PayloadType, Transmission, TransmissionError, TransportKind,
    },
};
use fieldkit_io::Charset;
use std::{collections::BTreeMap, sync::Arc};

///
/// CONSTANTS
///

pub const TRANSMISSION_MODEL_NAME: &str = "TransmissionManagement";
pub const TRANSMISSION_SCHEMA_NAME: &str = "Transmission";

const TRANSPORT: &str = "Transport";
const RECEIVED: &str = "Received";
const REMOTE_ID: &str = "RemoteID";
const CORRESPONDENT_NAME: &str = "CorrespondentName";
const CORRESPONDENT_ADDRESS: &str = "CorrespondentAddress";
const PAYLOAD_TYPE: &str = "PayloadType";
const PAYLOAD_HASH: &str = "PayloadHash";
const SENT_AT: &str = "SentAt";
const RECEIVED_AT: &str = "ReceivedAt";
const ACKNOWLEDGED_AT: &str = "AcknowledgedAt";
const PARTS: &str = "Parts";
const PART_DATA: &str = "Data";
const PART_TEXT: &str = "Text";

const MAX_PART_DATA_BYTES: usize = 1 << 24;
const MAX_PART_TEXT_BYTES: usize = 1024;

/// Reserved model holding the transmission schema.
pub fn transmission_model() -> Result<Model, SchemaError> {
    let mut model = Model::new(RESERVED_MODEL_ID, TRANSMISSION_MODEL_NAME)?;
    model.add_schema(transmission_schema()?)?;

    Ok(model)
}

/// Register the reserved model unless already present; returns the
/// transmission schema.
pub fn register_transmission_model(registry: &mut SchemaRegistry) -> Result<Arc<Schema>, SchemaError> {
    let id = SchemaId::new(RESERVED_MODEL_ID, 0);
    if let Ok(schema) = registry.schema(id) {
        return Ok(schema.clone());
    }

    let model = registry.register(transmission_model()?)?;
    model
        .schema(0)
        .cloned()
        .ok_or(SchemaError::UnknownSchema { id })
}

///
/// TransmissionStore
///
/// Persists transmissions and their parts as records of the reserved
/// transmission-management model. The record's auto-increment key doubles
/// as the local transmission ID.
///

pub struct TransmissionStore<B: RecordBackend> {
    records: Arc<RecordStore<B>>,
    schema: Arc<Schema>,
    config: TransmissionConfig,
}

impl<B: RecordBackend> TransmissionStore<B> {
    pub fn new(
        records: Arc<RecordStore<B>>,
        schema: Arc<Schema>,
        config: TransmissionConfig,
    ) -> Result<Self, Error> {
        if schema.id() != Some(SchemaId::new(RESERVED_MODEL_ID, 0))
            || schema.name() != TRANSMISSION_SCHEMA_NAME
        {
            return Err(Error::invalid_state(
                ErrorOrigin::Transmission,
                format!("schema '{}' is not the transmission schema", schema.name()),
            ));
        }

        Ok(Self {
            records,
            schema,
            config,
        })
    }

    #[must_use]
    pub const fn records(&self) -> &Arc<RecordStore<B>> {
        &self.records
    }

    #[must_use]
    pub const fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    #[must_use]
    pub const fn config(&self) -> &TransmissionConfig {
        &self.config
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Store `transmission`, assigning its local ID on first store. Nothing
    /// is persisted when the ID would not fit the header field.
    pub fn store(&self, transmission: &mut Transmission) -> Result<(), Error> {
        let mut record = self.to_record(transmission)?;
        if record.auto_key().is_none() {
            let schema = self.schema.id().ok_or_else(|| {
                Error::invalid_state(ErrorOrigin::Transmission, "transmission schema is not sealed")
            })?;
            local_id(self.records.with_backend(|backend| backend.table().counters().peek(schema)))?;
        }
        self.records.store(&mut record)?;

        let key = record.auto_key().ok_or_else(|| {
            Error::invalid_state(ErrorOrigin::Transmission, "stored transmission has no key")
        })?;
        // another writer may have taken the peeked key in between
        let id = match local_id(key) {
            Ok(id) => id,
            Err(err) => {
                self.records.delete(&record)?;
                return Err(err.into());
            }
        };
        transmission.set_local_id(id)?;

        tracing::debug!(local_id = id, received = transmission.is_received(), "stored transmission");

        Ok(())
    }

    /// File an incoming message with the transmission it belongs to, starting
    /// a new one for the first part, and store the result.
    pub fn receive_message(
        &self,
        correspondent: Correspondent,
        kind: TransportKind,
        message: Message,
    ) -> Result<Transmission, Error> {
        let header = *message.header();
        let existing = self.retrieve_by_remote(&correspondent, header.transmission_id(), header.payload_hash())?;

        let mut transmission = match existing {
            Some(mut transmission) => {
                transmission.receive_part(message)?;
                transmission
            }
            None => Transmission::from_first_part(self.config.transport(kind), correspondent, message)?,
        };
        self.store(&mut transmission)?;

        Ok(transmission)
    }

    pub fn delete(&self, local_id: u32) -> Result<bool, Error> {
        match self.retrieve_record(local_id)? {
            Some(record) => self.records.delete(&record),
            None => Ok(false),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn retrieve(&self, local_id: u32) -> Result<Option<Transmission>, Error> {
        self.retrieve_record(local_id)?
            .map(|record| self.from_record(&record))
            .transpose()
    }

    /// Receiving-side transmission from `correspondent` with the given
    /// sender ID and payload hash.
    pub fn retrieve_by_remote(
        &self,
        correspondent: &Correspondent,
        remote_id: u32,
        payload_hash: u16,
    ) -> Result<Option<Transmission>, Error> {
        let query = Self::query().with_constraint(Constraint::all(vec![
            Constraint::eq(RECEIVED, true),
            Constraint::eq(REMOTE_ID, i64::from(remote_id)),
            Constraint::eq(PAYLOAD_HASH, i64::from(payload_hash)),
            Constraint::eq(CORRESPONDENT_ADDRESS, correspondent.address()),
        ]));

        self.records
            .retrieve_record(&SingleRecordQuery::First(query))?
            .map(|record| self.from_record(&record))
            .transpose()
    }

    /// All sent (`received == false`) or received transmissions, oldest first.
    pub fn retrieve_transmissions(&self, received: bool) -> Result<Vec<Transmission>, Error> {
        let query = Self::query()
            .with_constraint(Constraint::eq(RECEIVED, received))
            .with_order(Order::by(AUTO_KEY_COLUMN_NAME, true));

        self.records
            .retrieve_records(&query)?
            .iter()
            .map(|record| self.from_record(record))
            .collect()
    }

    fn query() -> RecordsQuery {
        let id = SchemaId::new(RESERVED_MODEL_ID, 0);

        RecordsQuery::new(Source::schema(id))
    }

    fn retrieve_record(&self, local_id: u32) -> Result<Option<Record>, Error> {
        let query = Self::query()
            .with_constraint(Constraint::eq(AUTO_KEY_COLUMN_NAME, i64::from(local_id)));

        self.records.retrieve_record(&SingleRecordQuery::First(query))
    }

    // ========================================================================
    // Mapping
    // ========================================================================

    fn to_record(&self, transmission: &Transmission) -> Result<Record, Error> {
        let mut record = Record::new(self.schema.clone())?;
        if let Some(id) = transmission.local_id() {
            record.set(AUTO_KEY_COLUMN_NAME, i64::from(id))?;
        }

        record.set(TRANSPORT, transmission.transport().kind().code())?;
        record.set(RECEIVED, transmission.is_received())?;
        set_optional(&mut record, REMOTE_ID, transmission.remote_id().map(i64::from))?;
        record.set(CORRESPONDENT_NAME, transmission.correspondent().name())?;
        record.set(CORRESPONDENT_ADDRESS, transmission.correspondent().address())?;
        set_optional(
            &mut record,
            PAYLOAD_TYPE,
            transmission.payload_type().map(|t| i64::from(t.tag())),
        )?;
        set_optional(&mut record, PAYLOAD_HASH, transmission.payload_hash().map(i64::from))?;
        set_optional(&mut record, SENT_AT, transmission.sent_at())?;
        set_optional(&mut record, RECEIVED_AT, transmission.received_at())?;
        set_optional(&mut record, ACKNOWLEDGED_AT, transmission.acknowledged_at())?;

        let part_columns = part_columns(&self.schema)?;
        let parts = transmission
            .parts()
            .map(|message| {
                let mut part = ValueSet::new(part_columns.clone());
                match message.body() {
                    MessageBody::Bits(_) => part.set(PART_DATA, message.to_bytes()?)?,
                    MessageBody::Text(_) => part.set(PART_TEXT, message.to_text()?)?,
                }
                Ok(Value::Record(part))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        record.set(PARTS, Value::List(parts))?;

        Ok(record)
    }

    fn from_record(&self, record: &Record) -> Result<Transmission, Error> {
        let integer = |name: &str| record.get(name).and_then(Value::as_integer);
        let time = |name: &str| record.get(name).and_then(Value::as_time);

        let kind = integer(TRANSPORT)
            .and_then(TransportKind::from_code)
            .ok_or_else(|| corrupt(record, TRANSPORT))?;
        let transport = self.config.transport(kind);
        let length_field = LengthField::for_body(transport.max_body_bits())?;

        let mut parts = BTreeMap::new();
        for value in record.get(PARTS).and_then(Value::as_list).unwrap_or_default() {
            let part = value.as_record().ok_or_else(|| corrupt(record, PARTS))?;
            let message = if let Some(bytes) = part.get(PART_DATA).and_then(Value::as_bytes) {
                Message::from_bytes(bytes)?
            } else if let Some(text) = part.get(PART_TEXT).and_then(Value::as_str) {
                Message::from_text(text)?
            } else {
                return Err(corrupt(record, PARTS));
            };
            parts.insert(message.part_number(), message);
        }
        let total_parts = parts.values().next().map(|m| m.header().total_parts());
        let received = record.get(RECEIVED).and_then(Value::as_bool).unwrap_or(false);

        let local_id = record
            .auto_key()
            .and_then(|key| u32::try_from(key).ok())
            .filter(|id| *id <= MAX_TRANSMISSION_ID);
        let payload_type = integer(PAYLOAD_TYPE)
            .map(|tag| PayloadType::from_tag(tag as u8))
            .transpose()?;

        Ok(Transmission {
            transport,
            received,
            local_id,
            remote_id: integer(REMOTE_ID).map(|id| id as u32),
            correspondent: Correspondent::new(
                record.get(CORRESPONDENT_NAME).and_then(Value::as_str).unwrap_or_default(),
                record.get(CORRESPONDENT_ADDRESS).and_then(Value::as_str).unwrap_or_default(),
            ),
            payload: None,
            payload_type,
            payload_hash: integer(PAYLOAD_HASH).map(|hash| hash as u16),
            length_field,
            sent_at: time(SENT_AT),
            received_at: time(RECEIVED_AT),
            acknowledged_at: time(ACKNOWLEDGED_AT),
            wrapped: !received && !parts.is_empty(),
            parts,
            total_parts,
            verification_failed: false,
        })
    }
}

/// Local ID for a row key, if it fits the transmission ID field.
fn local_id(key: i64) -> Result<u32, TransmissionError> {
    u32::try_from(key)
        .ok()
        .filter(|id| *id <= MAX_TRANSMISSION_ID)
        .ok_or(TransmissionError::IdOutOfRange { id: key })
}

fn set_optional(record: &mut Record, name: &str, value: Option<impl Into<Value>>) -> Result<(), Error> {
    match value {
        Some(value) => record.set(name, value),
        None => record.clear(name),
    }
}

fn corrupt(record: &Record, column: &str) -> Error {
    Error::invalid_state(
        ErrorOrigin::Transmission,
        format!(
            "stored transmission {:?} has an invalid '{column}' value",
            record.auto_key()
        ),
    )
}

fn part_columns(schema: &Schema) -> Result<Arc<ColumnSet>, Error> {
    match schema.column(PARTS).map(Column::kind) {
        Some(ColumnKind::List(list)) => match list.element().kind() {
            ColumnKind::Record(part) => Ok(part.columns().clone()),
            _ => Err(SchemaError::UnknownColumn { name: PARTS.into() }.into()),
        },
        _ => Err(SchemaError::UnknownColumn { name: PARTS.into() }.into()),
    }
}

fn column(name: &str, kind: Result<ColumnKind, String>, optional: bool) -> Result<Column, SchemaError> {
    let kind = kind.map_err(|reason| SchemaError::InvalidColumn {
        name: name.to_string(),
        reason,
    })?;

    Column::new(name, kind, optional)
}

fn transmission_schema() -> Result<Schema, SchemaError> {
    let time = || -> Result<ColumnKind, String> { Ok(ColumnKind::Time(TimeColumn::LOSSLESS)) };
    let id = || IntegerColumn::sized(24, false).map(ColumnKind::Integer);

    let mut part = ColumnSet::new("Part");
    part.add_column(column(PART_DATA, BytesColumn::new(MAX_PART_DATA_BYTES).map(ColumnKind::Bytes), true)?)?;
    part.add_column(column(
        PART_TEXT,
        StringColumn::new(MAX_PART_TEXT_BYTES, Charset::Utf8).map(ColumnKind::String),
        true,
    )?)?;
    let part = Column::new("Part", ColumnKind::Record(RecordColumn::new(part)), false)?;

    let mut schema = Schema::new(TRANSMISSION_SCHEMA_NAME)?;
    schema.add_column(column(TRANSPORT, IntegerColumn::ranged(0, 2).map(ColumnKind::Integer), false)?)?;
    schema.add_column(Column::boolean(RECEIVED, false)?)?;
    schema.add_column(column(REMOTE_ID, id(), true)?)?;
    schema.add_column(Column::string(CORRESPONDENT_NAME, false, 256)?)?;
    schema.add_column(Column::string(CORRESPONDENT_ADDRESS, false, 256)?)?;
    schema.add_column(column(PAYLOAD_TYPE, IntegerColumn::ranged(0, 31).map(ColumnKind::Integer), true)?)?;
    schema.add_column(column(PAYLOAD_HASH, IntegerColumn::sized(16, false).map(ColumnKind::Integer), true)?)?;
    schema.add_column(column(SENT_AT, time(), true)?)?;
    schema.add_column(column(RECEIVED_AT, time(), true)?)?;
    schema.add_column(column(ACKNOWLEDGED_AT, time(), true)?)?;
    schema.add_column(column(
        PARTS,
        ListColumn::new(part, 0, usize::from(MAX_TRANSMISSION_PARTS)).map(ColumnKind::List),
        false,
    )?)?;

    Ok(schema)
}
