use crate::{
    error::{Error, ErrorOrigin},
    model::SchemaRegistry,
    record::{Record, value::truncate_to_millis},
    transmission::{
        AckPayload, DEFAULT_FORMAT, FORMAT_VERSION_SIZE, HIGHEST_SUPPORTED_FORMAT, LengthField,
        MAX_TRANSMISSION_ID, MIN_BODY_LENGTH_BITS, Message, PAYLOAD_TYPE_SIZE, Payload,
        PayloadType, ResendRequestPayload, TransmissionError, Transport, V2_FORMAT,
    },
};
use fieldkit_io::{BitArray, BitReader, BitWriter, IntegerRange, crc16_bits};
use std::{collections::BTreeMap, fmt};
use time::OffsetDateTime;

///
/// SendingState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendingState {
    Unprepared,
    Wrapped,
    Sent,
    Acknowledged,
}

///
/// ReceivingState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReceivingState {
    PartsIncomplete,
    Complete,
    PayloadReady,
    VerificationFailed,
}

///
/// TransmissionState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TransmissionState {
    Sending(SendingState),
    Receiving(ReceivingState),
}

///
/// Correspondent
///
/// The other end of a transmission: a display name and a transport address
/// (phone number or URL).
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Correspondent {
    name: String,
    address: String,
}

impl Correspondent {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Correspondent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.address)
    }
}

///
/// MessageSender
///
/// Hands a single message part to the underlying transport.
///

pub trait MessageSender {
    fn send(&mut self, correspondent: &Correspondent, message: &Message) -> Result<(), Error>;
}

///
/// Transmission
///
/// A payload on its way to or from a correspondent, framed as
/// `[format-version:2][payload-type:5][payload-length][payload-bits]` and
/// split into transport-sized [`Message`] parts.
///

#[derive(Clone, Debug)]
pub struct Transmission {
    pub(super) transport: Transport,
    pub(super) received: bool,
    pub(super) local_id: Option<u32>,
    pub(super) remote_id: Option<u32>,
    pub(super) correspondent: Correspondent,
    pub(super) payload: Option<Payload>,
    pub(super) payload_type: Option<PayloadType>,
    pub(super) payload_hash: Option<u16>,
    pub(super) length_field: LengthField,
    pub(super) sent_at: Option<OffsetDateTime>,
    pub(super) received_at: Option<OffsetDateTime>,
    pub(super) acknowledged_at: Option<OffsetDateTime>,
    pub(super) parts: BTreeMap<u8, Message>,
    pub(super) total_parts: Option<u8>,
    pub(super) wrapped: bool,
    pub(super) verification_failed: bool,
}

impl Transmission {
    fn blank(transport: Transport, correspondent: Correspondent, received: bool) -> Result<Self, Error> {
        let length_field = LengthField::for_body(transport.max_body_bits())?;

        Ok(Self {
            transport,
            received,
            local_id: None,
            remote_id: None,
            correspondent,
            payload: None,
            payload_type: None,
            payload_hash: None,
            length_field,
            sent_at: None,
            received_at: None,
            acknowledged_at: None,
            parts: BTreeMap::new(),
            total_parts: None,
            wrapped: false,
            verification_failed: false,
        })
    }

    /// Sending-side transmission carrying `payload`.
    pub fn outgoing(
        transport: Transport,
        correspondent: Correspondent,
        payload: impl Into<Payload>,
    ) -> Result<Self, Error> {
        let payload = payload.into();
        let mut transmission = Self::blank(transport, correspondent, false)?;
        transmission.payload_type = Some(payload.payload_type());
        transmission.payload = Some(payload);

        Ok(transmission)
    }

    /// Receiving-side transmission whose sender ID and payload hash are
    /// known from the first part to arrive.
    pub fn incoming(
        transport: Transport,
        correspondent: Correspondent,
        remote_id: u32,
        payload_hash: u16,
    ) -> Result<Self, Error> {
        let mut transmission = Self::blank(transport, correspondent, true)?;
        transmission.set_remote_id(remote_id)?;
        transmission.payload_hash = Some(payload_hash);

        Ok(transmission)
    }

    /// Receiving-side transmission started by `message`.
    pub fn from_first_part(
        transport: Transport,
        correspondent: Correspondent,
        message: Message,
    ) -> Result<Self, Error> {
        let header = *message.header();
        let mut transmission = Self::incoming(
            transport,
            correspondent,
            header.transmission_id(),
            header.payload_hash(),
        )?;
        transmission.receive_part(message)?;

        Ok(transmission)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[must_use]
    pub const fn transport(&self) -> &Transport {
        &self.transport
    }

    #[must_use]
    pub const fn is_received(&self) -> bool {
        self.received
    }

    /// ID on this side, assigned by the transmission store.
    #[must_use]
    pub const fn local_id(&self) -> Option<u32> {
        self.local_id
    }

    /// ID on the correspondent's side.
    #[must_use]
    pub const fn remote_id(&self) -> Option<u32> {
        self.remote_id
    }

    #[must_use]
    pub const fn correspondent(&self) -> &Correspondent {
        &self.correspondent
    }

    #[must_use]
    pub const fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    #[must_use]
    pub const fn payload_type(&self) -> Option<PayloadType> {
        self.payload_type
    }

    #[must_use]
    pub const fn payload_hash(&self) -> Option<u16> {
        self.payload_hash
    }

    #[must_use]
    pub const fn length_field(&self) -> &LengthField {
        &self.length_field
    }

    /// Largest serialized payload this transmission can carry.
    #[must_use]
    pub const fn max_payload_bits(&self) -> usize {
        self.length_field.max_payload_bits()
    }

    #[must_use]
    pub const fn sent_at(&self) -> Option<OffsetDateTime> {
        self.sent_at
    }

    #[must_use]
    pub const fn received_at(&self) -> Option<OffsetDateTime> {
        self.received_at
    }

    #[must_use]
    pub const fn acknowledged_at(&self) -> Option<OffsetDateTime> {
        self.acknowledged_at
    }

    /// Parts in part-number order.
    pub fn parts(&self) -> impl Iterator<Item = &Message> {
        self.parts.values()
    }

    #[must_use]
    pub const fn total_parts(&self) -> Option<u8> {
        self.total_parts
    }

    #[must_use]
    pub fn state(&self) -> TransmissionState {
        if self.received {
            let state = if self.payload.is_some() {
                ReceivingState::PayloadReady
            } else if self.verification_failed {
                ReceivingState::VerificationFailed
            } else if self.is_complete() {
                ReceivingState::Complete
            } else {
                ReceivingState::PartsIncomplete
            };

            TransmissionState::Receiving(state)
        } else {
            let state = if self.acknowledged_at.is_some() {
                SendingState::Acknowledged
            } else if self.sent_at.is_some() {
                SendingState::Sent
            } else if self.wrapped {
                SendingState::Wrapped
            } else {
                SendingState::Unprepared
            };

            TransmissionState::Sending(state)
        }
    }

    // ------------------------------------------------------------------
    // Identifiers
    // ------------------------------------------------------------------

    pub fn set_local_id(&mut self, id: u32) -> Result<(), TransmissionError> {
        Self::set_id(&mut self.local_id, "local", id)
    }

    pub fn set_remote_id(&mut self, id: u32) -> Result<(), TransmissionError> {
        Self::set_id(&mut self.remote_id, "remote", id)
    }

    fn set_id(slot: &mut Option<u32>, which: &'static str, id: u32) -> Result<(), TransmissionError> {
        if id > MAX_TRANSMISSION_ID {
            return Err(TransmissionError::IdOutOfRange { id: i64::from(id) });
        }
        match *slot {
            Some(existing) if existing != id => Err(TransmissionError::IdConflict {
                which,
                existing,
                new: id,
            }),
            _ => {
                *slot = Some(id);
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Sending side
    // ------------------------------------------------------------------

    fn require_side(&self, operation: &'static str, received: bool) -> Result<(), TransmissionError> {
        if self.received == received {
            Ok(())
        } else {
            Err(TransmissionError::WrongSide {
                operation,
                side: if received { "receiving" } else { "sending" },
            })
        }
    }

    fn format_field() -> Result<IntegerRange, Error> {
        Ok(IntegerRange::for_size(V2_FORMAT, FORMAT_VERSION_SIZE)?)
    }

    /// Serialize the payload into a body and, unless this is a simulation
    /// on a transport whose wrapping cannot grow, wrap it into parts.
    /// Only a real preparation keeps the parts.
    pub fn prepare(&mut self, simulation: bool) -> Result<(), Error> {
        self.require_side("prepare", false)?;
        if self.wrapped {
            return Ok(());
        }
        let payload = self.payload.as_ref().ok_or(TransmissionError::MissingPayload)?;

        let payload_bits = payload.serialize()?;
        let max = self.length_field.max_payload_bits();
        if payload_bits.len() > max {
            return Err(TransmissionError::PayloadTooLarge {
                actual: payload_bits.len(),
                max,
            }
            .into());
        }
        let hash = crc16_bits(&payload_bits);
        let payload_type = payload.payload_type();

        let mut writer = BitWriter::new();
        Self::format_field()?.write(&mut writer, DEFAULT_FORMAT)?;
        writer.write_unsigned(u64::from(payload_type.tag()), PAYLOAD_TYPE_SIZE)?;
        self.length_field.write(&mut writer, payload_bits.len())?;
        writer.write_bits(&payload_bits);
        let body = writer.finish();

        self.payload_hash = Some(hash);
        self.payload_type = Some(payload_type);

        if !simulation || self.transport.can_wrap_increase_size() {
            let id = match (simulation, self.local_id) {
                (_, Some(id)) => id,
                (true, None) => 0,
                (false, None) => return Err(TransmissionError::MissingLocalId.into()),
            };
            let messages = self.transport.wrap(id, hash, &body)?;

            if !simulation {
                self.total_parts = Some(messages.len() as u8);
                self.parts = messages.into_iter().map(|m| (m.part_number(), m)).collect();
                self.wrapped = true;
            }
        }

        tracing::debug!(
            local_id = ?self.local_id,
            payload = %payload_type,
            payload_bits = payload_bits.len(),
            body_bits = body.len(),
            simulation,
            "prepared transmission"
        );

        Ok(())
    }

    /// Discard the result of an earlier preparation. Has no effect once sent.
    pub fn clear_preparation(&mut self) {
        if self.received || self.sent_at.is_some() {
            return;
        }
        self.parts.clear();
        self.total_parts = None;
        self.wrapped = false;
        self.payload_hash = None;
    }

    /// Check that the payload fits this transmission by simulating a
    /// preparation. Leaves the transmission unprepared.
    pub fn check_capacity(&mut self) -> Result<(), Error> {
        self.require_side("check_capacity", false)?;
        if self.sent_at.is_some() {
            return Err(TransmissionError::AlreadySent.into());
        }

        self.clear_preparation();
        let result = self.prepare(true);
        self.clear_preparation();

        result
    }

    /// Add as many of `candidates` to the records payload as fit, in order.
    /// Returns how many were added.
    pub fn fill_records(&mut self, candidates: &[Record]) -> Result<usize, Error> {
        self.require_side("fill_records", false)?;
        if self.sent_at.is_some() || self.wrapped {
            return Err(TransmissionError::AlreadySent.into());
        }

        let mut added = 0;
        for record in candidates {
            let Some(Payload::Records(records)) = self.payload.as_mut() else {
                return Err(Error::invalid_state(
                    ErrorOrigin::Transmission,
                    "only records payloads can be filled",
                ));
            };
            records.add_record(record.clone())?;

            if let Err(err) = self.check_capacity() {
                if let Some(Payload::Records(records)) = self.payload.as_mut() {
                    records.pop_record();
                }
                if err.is_capacity_exceeded() {
                    break;
                }
                return Err(err);
            }
            added += 1;
        }

        tracing::debug!(added, candidates = candidates.len(), "filled records payload");

        Ok(added)
    }

    /// Prepare if needed and hand every part to `sender`.
    pub fn send(&mut self, sender: &mut impl MessageSender) -> Result<(), Error> {
        self.require_side("send", false)?;
        if self.sent_at.is_some() {
            return Err(TransmissionError::AlreadySent.into());
        }

        self.prepare(false)?;
        for message in self.parts.values() {
            sender.send(&self.correspondent, message)?;
        }
        self.sent_at = Some(now());

        tracing::debug!(
            local_id = ?self.local_id,
            parts = self.parts.len(),
            to = %self.correspondent,
            "sent transmission"
        );

        Ok(())
    }

    /// Send every part again.
    pub fn resend(&mut self, sender: &mut impl MessageSender) -> Result<(), Error> {
        self.resend_parts(sender, &[])
    }

    /// Send the given parts again; an empty list resends all of them.
    pub fn resend_parts(&mut self, sender: &mut impl MessageSender, parts: &[u8]) -> Result<(), Error> {
        self.require_side("resend", false)?;
        if self.sent_at.is_none() {
            return Err(TransmissionError::NotSent.into());
        }

        let messages = if parts.is_empty() {
            self.parts.values().collect::<Vec<_>>()
        } else {
            parts
                .iter()
                .map(|number| {
                    self.parts.get(number).ok_or_else(|| TransmissionError::InvalidPart {
                        reason: format!("transmission has no part {number}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };
        for message in messages {
            sender.send(&self.correspondent, message)?;
        }
        self.sent_at = Some(now());

        Ok(())
    }

    /// Whether `ack` acknowledges this transmission.
    #[must_use]
    pub fn is_acknowledged_by(&self, ack: &AckPayload) -> bool {
        !self.received
            && self.local_id == Some(ack.subject_id)
            && self.payload_hash == Some(ack.subject_hash)
    }

    pub fn acknowledge(&mut self) -> Result<(), Error> {
        self.require_side("acknowledge", false)?;
        if self.sent_at.is_none() {
            return Err(TransmissionError::NotSent.into());
        }
        if self.acknowledged_at.is_none() {
            self.acknowledged_at = Some(now());
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Receiving side
    // ------------------------------------------------------------------

    /// Accept one part. Parts may arrive in any order; an identical
    /// duplicate is ignored, a differing one is rejected.
    pub fn receive_part(&mut self, message: Message) -> Result<(), Error> {
        self.require_side("receive_part", true)?;
        let header = *message.header();

        if self.remote_id != Some(header.transmission_id())
            || self.payload_hash != Some(header.payload_hash())
            || self.total_parts.is_some_and(|t| t != header.total_parts())
        {
            return Err(TransmissionError::InvalidPart {
                reason: format!("{header} belongs to a different transmission"),
            }
            .into());
        }

        let number = header.part_number();
        if let Some(existing) = self.parts.get(&number) {
            if *existing == message {
                tracing::debug!(part = %header, "ignoring duplicate part");
                return Ok(());
            }
            return Err(TransmissionError::ConflictingPart { part: number }.into());
        }

        self.total_parts = Some(header.total_parts());
        self.parts.insert(number, message);
        if self.is_complete() && self.received_at.is_none() {
            self.received_at = Some(now());
        }

        Ok(())
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.total_parts
            .is_some_and(|total| self.parts.len() == usize::from(total))
    }

    /// Part numbers still outstanding.
    #[must_use]
    pub fn missing_parts(&self) -> Vec<u8> {
        let Some(total) = self.total_parts else {
            return Vec::new();
        };

        (1..=total).filter(|n| !self.parts.contains_key(n)).collect()
    }

    /// Acknowledgement to send back once the payload has been received.
    #[must_use]
    pub fn ack_payload(&self) -> Option<AckPayload> {
        if !self.received || self.payload.is_none() {
            return None;
        }

        Some(AckPayload::new(self.remote_id?, self.payload_hash?))
    }

    /// Request for the parts still missing.
    #[must_use]
    pub fn resend_request(&self) -> Option<ResendRequestPayload> {
        if !self.received {
            return None;
        }

        Some(ResendRequestPayload::new(
            self.remote_id?,
            self.payload_hash?,
            self.missing_parts(),
        ))
    }

    /// Join the parts, verify the payload hash and deserialize the payload.
    /// A hash mismatch marks the transmission as failed and the payload is
    /// never deserialized.
    pub fn receive(&mut self, registry: &SchemaRegistry) -> Result<&Payload, Error> {
        self.require_side("receive", true)?;
        if self.payload.is_none() {
            let payload = self.decode(registry)?;
            self.payload = Some(payload);
        }

        self.payload
            .as_ref()
            .ok_or_else(|| TransmissionError::MissingPayload.into())
    }

    fn decode(&mut self, registry: &SchemaRegistry) -> Result<Payload, Error> {
        if !self.is_complete() {
            return Err(TransmissionError::Incomplete {
                reason: format!(
                    "{} of {} parts received",
                    self.parts.len(),
                    self.total_parts.map_or_else(|| "?".to_string(), |t| t.to_string())
                ),
            }
            .into());
        }

        let body = self.transport.unwrap(self.parts.values())?;
        if body.len() < MIN_BODY_LENGTH_BITS - 1 {
            return Err(TransmissionError::Incomplete {
                reason: format!("body of {} bits is shorter than its header", body.len()),
            }
            .into());
        }

        let mut reader = BitReader::new(&body);
        let version = Self::format_field()?.read(&mut reader)?;
        if version > HIGHEST_SUPPORTED_FORMAT {
            return Err(TransmissionError::UnsupportedFormat { version }.into());
        }
        let payload_type = PayloadType::from_tag(reader.read_unsigned(PAYLOAD_TYPE_SIZE)? as u8)?;
        self.payload_type = Some(payload_type);

        let length = self.length_field.read(&mut reader)?;
        let available = reader.bits_available();
        let payload_bits: BitArray = reader.read_bits(length).map_err(|_| TransmissionError::Incomplete {
            reason: format!("payload needs {length} bits, {available} available"),
        })?;

        let expected = self.payload_hash.ok_or(TransmissionError::MissingPayload)?;
        let actual = crc16_bits(&payload_bits);
        if actual != expected {
            self.verification_failed = true;
            tracing::warn!(
                remote_id = ?self.remote_id,
                expected,
                actual,
                "transmission failed verification"
            );
            return Err(TransmissionError::HashMismatch { expected, actual }.into());
        }

        let payload = Payload::deserialize(payload_type, &payload_bits, registry)?;
        tracing::debug!(
            remote_id = ?self.remote_id,
            payload = %payload_type,
            payload_bits = length,
            "received transmission"
        );

        Ok(payload)
    }
}

/// Current time at the millisecond precision timestamps are stored with.
fn now() -> OffsetDateTime {
    truncate_to_millis(OffsetDateTime::now_utc())
}
