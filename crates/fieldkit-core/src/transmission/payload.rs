use crate::{
    error::Error,
    model::{MAX_SCHEMAS, MODEL_ID_SIZE, Model, SchemaError, SchemaId, SchemaRegistry},
    record::Record,
    transmission::{
        MAX_TRANSMISSION_PARTS, PAYLOAD_HASH_SIZE, TRANSMISSION_ID_SIZE, TransmissionError,
        compression::{COMPRESSION_FIELD_SIZE, Compression},
    },
};
use derive_more::Display;
use fieldkit_io::{BitArray, BitReader, BitWriter, IntegerRange};
use std::collections::BTreeMap;

///
/// CONSTANTS
///

/// Records of one schema in a single payload.
pub const MAX_RECORDS_PER_SCHEMA: usize = 1 << 16;

const SCHEMA_NUMBER_SIZE: u32 = 4;

/// Byte count ahead of a compressed records body.
const COMPRESSED_LENGTH_SIZE: u32 = 24;

///
/// PayloadType
///
/// 5-bit tag written ahead of every payload.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PayloadType {
    #[display("ack")]
    Ack,
    #[display("records")]
    Records,
    #[display("resend_request")]
    ResendRequest,
}

impl PayloadType {
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Ack => 0,
            Self::Records => 1,
            Self::ResendRequest => 2,
        }
    }

    pub const fn from_tag(tag: u8) -> Result<Self, TransmissionError> {
        match tag {
            0 => Ok(Self::Ack),
            1 => Ok(Self::Records),
            2 => Ok(Self::ResendRequest),
            _ => Err(TransmissionError::UnknownPayloadType { tag }),
        }
    }
}

///
/// Payload
///

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Ack(AckPayload),
    Records(RecordsPayload),
    ResendRequest(ResendRequestPayload),
}

impl Payload {
    #[must_use]
    pub const fn payload_type(&self) -> PayloadType {
        match self {
            Self::Ack(_) => PayloadType::Ack,
            Self::Records(_) => PayloadType::Records,
            Self::ResendRequest(_) => PayloadType::ResendRequest,
        }
    }

    pub fn serialize(&self) -> Result<BitArray, Error> {
        let mut writer = BitWriter::new();
        match self {
            Self::Ack(ack) => ack.write(&mut writer)?,
            Self::Records(records) => records.write(&mut writer)?,
            Self::ResendRequest(request) => request.write(&mut writer)?,
        }

        Ok(writer.finish())
    }

    /// Rebuild a payload of the given type from its serialized bits.
    pub fn deserialize(
        payload_type: PayloadType,
        bits: &BitArray,
        registry: &SchemaRegistry,
    ) -> Result<Self, Error> {
        let mut reader = BitReader::new(bits);

        Ok(match payload_type {
            PayloadType::Ack => Self::Ack(AckPayload::read(&mut reader)?),
            PayloadType::Records => Self::Records(RecordsPayload::read(&mut reader, registry)?),
            PayloadType::ResendRequest => {
                Self::ResendRequest(ResendRequestPayload::read(&mut reader)?)
            }
        })
    }
}

impl From<AckPayload> for Payload {
    fn from(payload: AckPayload) -> Self {
        Self::Ack(payload)
    }
}

impl From<RecordsPayload> for Payload {
    fn from(payload: RecordsPayload) -> Self {
        Self::Records(payload)
    }
}

impl From<ResendRequestPayload> for Payload {
    fn from(payload: ResendRequestPayload) -> Self {
        Self::ResendRequest(payload)
    }
}

// ============================================================================
// Ack / ResendRequest
// ============================================================================

///
/// AckPayload
///
/// Confirms receipt of the transmission the peer sent as `subject_id`.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AckPayload {
    pub subject_id: u32,
    pub subject_hash: u16,
}

impl AckPayload {
    #[must_use]
    pub const fn new(subject_id: u32, subject_hash: u16) -> Self {
        Self {
            subject_id,
            subject_hash,
        }
    }

    fn write(&self, writer: &mut BitWriter) -> Result<(), Error> {
        write_subject(writer, self.subject_id, self.subject_hash)
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self, Error> {
        let (subject_id, subject_hash) = read_subject(reader)?;

        Ok(Self::new(subject_id, subject_hash))
    }
}

///
/// ResendRequestPayload
///
/// Asks the peer to resend parts of one of its transmissions. An empty
/// part list means the whole transmission.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResendRequestPayload {
    pub subject_id: u32,
    pub subject_hash: u16,
    pub missing_parts: Vec<u8>,
}

impl ResendRequestPayload {
    #[must_use]
    pub const fn new(subject_id: u32, subject_hash: u16, missing_parts: Vec<u8>) -> Self {
        Self {
            subject_id,
            subject_hash,
            missing_parts,
        }
    }

    fn count_field() -> Result<IntegerRange, Error> {
        Ok(IntegerRange::new(0, i64::from(MAX_TRANSMISSION_PARTS))?)
    }

    fn write(&self, writer: &mut BitWriter) -> Result<(), Error> {
        write_subject(writer, self.subject_id, self.subject_hash)?;

        let count = self.missing_parts.len();
        if count > usize::from(MAX_TRANSMISSION_PARTS) {
            return Err(TransmissionError::PayloadLimit {
                what: "missing parts",
                actual: count,
                max: usize::from(MAX_TRANSMISSION_PARTS),
            }
            .into());
        }
        Self::count_field()?.write(writer, count as i64)?;
        for &part in &self.missing_parts {
            if part == 0 || part > MAX_TRANSMISSION_PARTS {
                return Err(TransmissionError::InvalidPart {
                    reason: format!("cannot request part {part}"),
                }
                .into());
            }
            writer.write_unsigned(u64::from(part - 1), 4)?;
        }

        Ok(())
    }

    fn read(reader: &mut BitReader<'_>) -> Result<Self, Error> {
        let (subject_id, subject_hash) = read_subject(reader)?;
        let count = Self::count_field()?.read(reader)?;
        let missing_parts = (0..count)
            .map(|_| Ok(reader.read_unsigned(4)? as u8 + 1))
            .collect::<Result<Vec<_>, Error>>()?;

        Ok(Self::new(subject_id, subject_hash, missing_parts))
    }
}

fn write_subject(writer: &mut BitWriter, id: u32, hash: u16) -> Result<(), Error> {
    writer.write_unsigned(u64::from(id), TRANSMISSION_ID_SIZE)?;
    writer.write_unsigned(u64::from(hash), PAYLOAD_HASH_SIZE)?;

    Ok(())
}

fn read_subject(reader: &mut BitReader<'_>) -> Result<(u32, u16), Error> {
    let id = reader.read_unsigned(TRANSMISSION_ID_SIZE)? as u32;
    let hash = reader.read_unsigned(PAYLOAD_HASH_SIZE)? as u16;

    Ok((id, hash))
}

// ============================================================================
// Records
// ============================================================================

///
/// RecordsPayload
///
/// Records of a single model, grouped by schema on the wire:
/// `[model-id:56][lossless:1][compression:2]` followed by the groups, either
/// as they are or as `[byte-count:24][compressed bytes]`. The groups are
/// `[groups:1..16]` then per group `[schema-number:4][count:1..65536]
/// [records...]`. The writer picks whichever encoding is smallest.
///

#[derive(Clone, Debug)]
pub struct RecordsPayload {
    lossless: bool,
    compress: bool,
    model_id: Option<u64>,
    records: Vec<Record>,
}

impl RecordsPayload {
    #[must_use]
    pub const fn new(lossless: bool) -> Self {
        Self {
            lossless,
            compress: true,
            model_id: None,
            records: Vec::new(),
        }
    }

    /// Always send the groups uncompressed.
    #[must_use]
    pub const fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    #[must_use]
    pub const fn is_lossless(&self) -> bool {
        self.lossless
    }

    #[must_use]
    pub const fn allows_compression(&self) -> bool {
        self.compress
    }

    /// Encoding the next serialization will use.
    pub fn compression(&self) -> Result<Compression, Error> {
        let groups = self.group_bits()?;

        Ok(self.encode(&groups)?.0)
    }

    #[must_use]
    pub const fn model_id(&self) -> Option<u64> {
        self.model_id
    }

    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record. All records must belong to one model.
    pub fn add_record(&mut self, record: Record) -> Result<(), Error> {
        let id = record.schema().id().ok_or_else(|| SchemaError::NotSealed {
            schema: record.schema().name().to_string(),
        })?;
        if let Some(expected) = self.model_id
            && expected != id.model_id()
        {
            return Err(TransmissionError::MixedModels {
                expected,
                found: id.model_id(),
            }
            .into());
        }

        let same_schema = self
            .records
            .iter()
            .filter(|r| r.schema().id() == Some(id))
            .count();
        if same_schema >= MAX_RECORDS_PER_SCHEMA {
            return Err(TransmissionError::PayloadLimit {
                what: "records of one schema",
                actual: same_schema + 1,
                max: MAX_RECORDS_PER_SCHEMA,
            }
            .into());
        }

        record.validate_complete()?;
        self.model_id = Some(id.model_id());
        self.records.push(record);

        Ok(())
    }

    /// Remove the most recently added record.
    pub fn pop_record(&mut self) -> Option<Record> {
        let record = self.records.pop();
        if self.records.is_empty() {
            self.model_id = None;
        }

        record
    }

    fn groups(&self) -> BTreeMap<u8, Vec<&Record>> {
        let mut groups: BTreeMap<u8, Vec<&Record>> = BTreeMap::new();
        for record in &self.records {
            if let Some(id) = record.schema().id() {
                groups.entry(id.number()).or_default().push(record);
            }
        }

        groups
    }

    fn group_field() -> Result<IntegerRange, Error> {
        Ok(IntegerRange::new(1, MAX_SCHEMAS as i64)?)
    }

    fn count_field() -> Result<IntegerRange, Error> {
        Ok(IntegerRange::new(1, MAX_RECORDS_PER_SCHEMA as i64)?)
    }

    fn group_bits(&self) -> Result<BitArray, Error> {
        if self.model_id.is_none() {
            return Err(TransmissionError::EmptyPayload.into());
        }

        let mut writer = BitWriter::new();
        let groups = self.groups();
        Self::group_field()?.write(&mut writer, groups.len() as i64)?;
        for (number, records) in groups {
            writer.write_unsigned(u64::from(number), SCHEMA_NUMBER_SIZE)?;
            Self::count_field()?.write(&mut writer, records.len() as i64)?;
            for record in records {
                record.write_to(&mut writer, self.lossless)?;
            }
        }

        Ok(writer.finish())
    }

    /// Smallest encoding of `groups`; ties keep the groups uncompressed.
    fn encode(&self, groups: &BitArray) -> Result<(Compression, Option<Vec<u8>>), Error> {
        let mut best = (Compression::None, None);
        if !self.compress {
            return Ok(best);
        }

        let raw = groups.to_bytes();
        let mut best_bits = groups.len();
        for mode in [Compression::Deflate, Compression::Gzip] {
            let packed = mode.compress(&raw)?;
            if packed.len() >= 1 << COMPRESSED_LENGTH_SIZE {
                continue;
            }
            let bits = COMPRESSED_LENGTH_SIZE as usize + packed.len() * 8;
            if bits < best_bits {
                best_bits = bits;
                best = (mode, Some(packed));
            }
        }

        Ok(best)
    }

    fn write(&self, writer: &mut BitWriter) -> Result<(), Error> {
        let Some(model_id) = self.model_id else {
            return Err(TransmissionError::EmptyPayload.into());
        };

        let groups = self.group_bits()?;
        let (mode, packed) = self.encode(&groups)?;

        writer.write_unsigned(model_id, MODEL_ID_SIZE)?;
        writer.write_bit(self.lossless);
        writer.write_unsigned(u64::from(mode.tag()), COMPRESSION_FIELD_SIZE)?;
        match packed {
            Some(bytes) => {
                writer.write_unsigned(bytes.len() as u64, COMPRESSED_LENGTH_SIZE)?;
                writer.write_bytes(&bytes);
            }
            None => writer.write_bits(&groups),
        }

        Ok(())
    }

    fn read(reader: &mut BitReader<'_>, registry: &SchemaRegistry) -> Result<Self, Error> {
        let model_id = reader.read_unsigned(MODEL_ID_SIZE)?;
        let model = registry.model(model_id)?;
        let lossless = reader.read_bit()?;
        let mode = Compression::from_tag(reader.read_unsigned(COMPRESSION_FIELD_SIZE)? as u8)?;

        let mut payload = Self::new(lossless);
        if mode == Compression::None {
            payload.read_groups(reader, model)?;
        } else {
            let count = reader.read_unsigned(COMPRESSED_LENGTH_SIZE)? as usize;
            let packed = reader.read_bytes(count)?;
            let bits = BitArray::from_bytes(&mode.decompress(&packed)?);
            payload.read_groups(&mut BitReader::new(&bits), model)?;
        }
        payload.model_id = Some(model_id);

        Ok(payload)
    }

    fn read_groups(&mut self, reader: &mut BitReader<'_>, model: &Model) -> Result<(), Error> {
        let groups = Self::group_field()?.read(reader)?;
        for _ in 0..groups {
            let number = reader.read_unsigned(SCHEMA_NUMBER_SIZE)? as u8;
            let schema = model.schema(number).ok_or(SchemaError::UnknownSchema {
                id: SchemaId::new(model.id(), number),
            })?;
            let count = Self::count_field()?.read(reader)?;
            for _ in 0..count {
                let record = Record::read_from(schema.clone(), reader, self.lossless)?;
                self.records.push(record);
            }
        }

        Ok(())
    }
}

// compression is a wire choice, not part of the content
impl PartialEq for RecordsPayload {
    fn eq(&self, other: &Self) -> bool {
        self.lossless == other.lossless
            && self.model_id == other.model_id
            && self.records == other.records
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Column, Model, Schema};
    use std::sync::Arc;

    fn registry() -> (SchemaRegistry, Arc<Schema>, Arc<Schema>) {
        let mut model = Model::new(42, "Survey").expect("model");
        let mut site = Schema::new("Site").expect("schema");
        site.add_column(Column::string("Name", false, 64).expect("column"))
            .expect("add");
        let site = model.add_schema(site).expect("site");

        let mut visit = Schema::new("Visit").expect("schema");
        visit
            .add_column(Column::integer("Count", false).expect("column"))
            .expect("add");
        let visit = model.add_schema(visit).expect("visit");

        let mut registry = SchemaRegistry::new();
        registry.register(model).expect("register");

        (registry, site, visit)
    }

    #[test]
    fn unknown_tag_is_typed() {
        assert_eq!(
            PayloadType::from_tag(9),
            Err(TransmissionError::UnknownPayloadType { tag: 9 })
        );
        assert_eq!(PayloadType::from_tag(2), Ok(PayloadType::ResendRequest));
    }

    #[test]
    fn records_are_grouped_by_schema() {
        let (registry, site, visit) = registry();
        let mut payload = RecordsPayload::new(false);
        for (name, count) in [("north", 3), ("south", 5)] {
            let mut s = Record::new(site.clone()).expect("record");
            s.set("Name", name).expect("set");
            s.set("AutoKey", count).expect("set");
            let mut v = Record::new(visit.clone()).expect("record");
            v.set("Count", count).expect("set");
            v.set("AutoKey", count).expect("set");
            payload.add_record(v).expect("add");
            payload.add_record(s).expect("add");
        }

        let bits = Payload::from(payload.clone()).serialize().expect("serialize");
        let Payload::Records(parsed) =
            Payload::deserialize(PayloadType::Records, &bits, &registry).expect("deserialize")
        else {
            panic!("records payload expected");
        };

        assert_eq!(parsed.model_id(), Some(42));
        let names: Vec<&str> = parsed.records().iter().map(|r| r.schema().name()).collect();
        assert_eq!(names, ["Site", "Site", "Visit", "Visit"]);
        assert_eq!(parsed.records()[1].get("Name").and_then(|v| v.as_str()), Some("south"));
    }

    fn repeated_sites(site: &Arc<Schema>, count: i64) -> RecordsPayload {
        let mut payload = RecordsPayload::new(false);
        for key in 0..count {
            let mut record = Record::new(site.clone()).expect("record");
            record.set("Name", "Lower meadow by the river").expect("set");
            record.set("AutoKey", key).expect("set");
            payload.add_record(record).expect("add");
        }

        payload
    }

    #[test]
    fn repetitive_records_travel_compressed() {
        let (registry, site, _) = registry();
        let payload = repeated_sites(&site, 40);
        assert_ne!(payload.compression().expect("mode"), Compression::None);

        let bits = Payload::from(payload.clone()).serialize().expect("serialize");
        let plain = Payload::from(payload.clone().without_compression())
            .serialize()
            .expect("serialize");
        assert!(bits.len() < plain.len() / 2, "{} vs {}", bits.len(), plain.len());

        let parsed = Payload::deserialize(PayloadType::Records, &bits, &registry).expect("deserialize");
        assert_eq!(parsed, Payload::Records(payload));
    }

    #[test]
    fn small_payloads_stay_uncompressed() {
        let (registry, site, _) = registry();
        let payload = repeated_sites(&site, 1);
        assert_eq!(payload.compression().expect("mode"), Compression::None);

        let bits = Payload::from(payload.clone()).serialize().expect("serialize");
        let plain = Payload::from(payload.clone().without_compression())
            .serialize()
            .expect("serialize");
        assert_eq!(bits, plain);

        let Payload::Records(parsed) =
            Payload::deserialize(PayloadType::Records, &bits, &registry).expect("deserialize")
        else {
            panic!("records payload expected");
        };
        assert_eq!(parsed, payload);
    }

    #[test]
    fn unknown_compression_tag_is_rejected() {
        let (registry, site, _) = registry();
        let bits = Payload::from(repeated_sites(&site, 1)).serialize().expect("serialize");

        let mut writer = BitWriter::new();
        let mut reader = BitReader::new(&bits);
        let head = reader.read_unsigned(MODEL_ID_SIZE + 1).expect("head");
        writer.write_unsigned(head, MODEL_ID_SIZE + 1).expect("head");
        reader.read_unsigned(COMPRESSION_FIELD_SIZE).expect("tag");
        writer.write_unsigned(3, COMPRESSION_FIELD_SIZE).expect("tag");
        let tampered = writer.finish();

        let err = Payload::deserialize(PayloadType::Records, &tampered, &registry).expect_err("tag 3");
        assert!(err.message.contains("unknown payload compression 3"), "{}", err.message);
    }

    #[test]
    fn models_cannot_be_mixed() {
        let (_, site, _) = registry();
        let mut other = Model::new(7, "Other").expect("model");
        let mut schema = Schema::new("Thing").expect("schema");
        schema
            .add_column(Column::boolean("Flag", false).expect("column"))
            .expect("add");
        let thing = other.add_schema(schema).expect("thing");

        let mut payload = RecordsPayload::new(true);
        let mut s = Record::new(site).expect("record");
        s.set("Name", "x").expect("set");
        s.set("AutoKey", 0).expect("set");
        payload.add_record(s).expect("add");

        let mut t = Record::new(thing).expect("record");
        t.set("Flag", true).expect("set");
        t.set("AutoKey", 0).expect("set");
        let err = payload.add_record(t).expect_err("mixed");
        assert!(err.is_validation());
    }

    #[test]
    fn empty_records_payload_does_not_serialize() {
        let err = Payload::from(RecordsPayload::new(false))
            .serialize()
            .expect_err("empty");
        assert!(err.message.contains("empty"));
    }

    #[test]
    fn resend_request_lists_parts() {
        let request = ResendRequestPayload::new(0xFF_FFFF, 0xABCD, vec![1, 7, 16]);
        let bits = Payload::from(request.clone()).serialize().expect("serialize");
        assert_eq!(bits.len(), 24 + 16 + 5 + 3 * 4);

        let parsed = Payload::deserialize(PayloadType::ResendRequest, &bits, &SchemaRegistry::new())
            .expect("deserialize");
        assert_eq!(parsed, Payload::ResendRequest(request));
    }
}
