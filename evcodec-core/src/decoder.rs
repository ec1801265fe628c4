//! Stateful packet decoder.
//!
//! A [`Decoder`] owns everything that survives between calls: the active
//! codec and its stream state, the resumable cursor, the event buffers and
//! the cumulative counters.

use ndarray::ArrayView1;
use tracing::{debug, warn};

use crate::accumulator::EventAccumulator;
use crate::codec::{Codec, CodecTable, Geometry};
use crate::cursor::StreamCursor;
use crate::error::DecodeError;
use crate::types::{CdEvent, EncodedPacket, EventCounts, PacketView, TriggerEvent};

/// `next_time` reported by `decode_until` when no time has been seen yet.
pub const NO_EVENT_TIME: i64 = i64::MIN;

/// Outcome of a time-bounded decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntilResult {
    /// True if decoding stopped because the next event reached the limit.
    pub reached_limit: bool,
    /// Time of the pending event if the limit was reached, otherwise the
    /// running time when the buffer ran out (or [`NO_EVENT_TIME`]).
    pub next_time: i64,
}

impl From<UntilResult> for (bool, i64) {
    fn from(result: UntilResult) -> Self {
        (result.reached_limit, result.next_time)
    }
}

struct ActiveCodec {
    encoding: String,
    codec: Box<dyn Codec>,
}

/// Regular (non-deduplicating) event packet decoder.
///
/// Not meant for concurrent use; callers serialize access to one instance.
pub struct Decoder {
    codecs: CodecTable,
    active: Option<ActiveCodec>,
    cursor: StreamCursor,
    events: EventAccumulator,
    start_time: Option<i64>,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("encoding", &self.active.as_ref().map(|a| a.encoding.as_str()))
            .field("cursor", &self.cursor)
            .field("start_time", &self.start_time)
            .field("counts", &self.events.counts())
            .finish()
    }
}

impl Decoder {
    /// Creates a decoder that understands the default encodings.
    pub fn new() -> Self {
        Self::with_codecs(CodecTable::default())
    }

    /// Creates a decoder with a custom codec table.
    pub fn with_codecs(codecs: CodecTable) -> Self {
        Self {
            codecs,
            active: None,
            cursor: StreamCursor::default(),
            events: EventAccumulator::new(),
            start_time: None,
        }
    }

    pub fn codecs(&self) -> &CodecTable {
        &self.codecs
    }

    /// Decodes a whole packet.
    pub fn decode<P: EncodedPacket + ?Sized>(&mut self, packet: &P) -> Result<(), DecodeError> {
        self.run(packet, None).map(|_| ())
    }

    /// Same as [`Decoder::decode`] with the header fields passed individually.
    pub fn decode_bytes(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
        time_base: i64,
        events: &[u8],
    ) -> Result<(), DecodeError> {
        self.decode(&PacketView::new(encoding, width, height, time_base, events))
    }

    /// Same as [`Decoder::decode_bytes`] for a byte array view, which need not
    /// be contiguous.
    pub fn decode_array(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
        time_base: i64,
        events: ArrayView1<'_, u8>,
    ) -> Result<(), DecodeError> {
        match events.as_slice() {
            Some(bytes) => self.decode_bytes(encoding, width, height, time_base, bytes),
            None => {
                let bytes = events.to_vec();
                self.decode_bytes(encoding, width, height, time_base, &bytes)
            }
        }
    }

    /// Decodes `packet` up to, but excluding, the first event at or after
    /// `until_time`.
    ///
    /// Call repeatedly with the same packet and a growing limit; the pending
    /// event is picked up by the next call. Once `reached_limit` is false the
    /// packet is exhausted.
    pub fn decode_until<P: EncodedPacket + ?Sized>(
        &mut self,
        packet: &P,
        until_time: i64,
    ) -> Result<UntilResult, DecodeError> {
        match self.run(packet, Some(until_time))? {
            Some(next_time) => Ok(UntilResult {
                reached_limit: true,
                next_time,
            }),
            None => Ok(UntilResult {
                reached_limit: false,
                next_time: self
                    .active
                    .as_ref()
                    .and_then(|a| a.codec.running_time())
                    .unwrap_or(NO_EVENT_TIME),
            }),
        }
    }

    /// Time of the first event a decode of `packet` would produce right now.
    ///
    /// Works on copies of the codec and cursor; the decoder is not modified.
    /// Returns `Ok(None)` if the packet holds no events.
    pub fn find_first_sensor_time<P: EncodedPacket + ?Sized>(
        &self,
        packet: &P,
    ) -> Result<Option<i64>, DecodeError> {
        let (mut codec, mut cursor) = match &self.active {
            Some(active) if active.encoding == packet.encoding() => {
                (active.codec.box_clone(), self.cursor.clone())
            }
            _ => (
                self.codecs.resolve(packet.encoding())?,
                StreamCursor::default(),
            ),
        };
        let geometry = Geometry::new(packet.width(), packet.height());
        if cursor.in_progress() {
            codec.set_geometry(geometry);
        } else {
            codec.begin_packet(geometry, packet.time_base());
        }
        let mut scratch = EventAccumulator::new();
        cursor.advance(codec.as_mut(), packet.events(), Some(i64::MIN), &mut scratch)
    }

    /// Drains the CD events decoded since the last drain.
    pub fn get_cd_events(&mut self) -> Vec<CdEvent> {
        self.events.take_cd_events()
    }

    /// Drains the trigger events decoded since the last drain.
    pub fn get_ext_trig_events(&mut self) -> Vec<TriggerEvent> {
        self.events.take_trigger_events()
    }

    /// Drains CD events as one vector per decode call.
    pub fn get_cd_event_packets(&mut self) -> Vec<Vec<CdEvent>> {
        self.events.take_cd_packets()
    }

    /// Drains trigger events as one vector per decode call.
    pub fn get_ext_trig_event_packets(&mut self) -> Vec<Vec<TriggerEvent>> {
        self.events.take_trigger_packets()
    }

    pub fn get_num_cd_on(&self) -> u64 {
        self.events.counts().cd_on
    }

    pub fn get_num_cd_off(&self) -> u64 {
        self.events.counts().cd_off
    }

    pub fn get_num_trigger_rising(&self) -> u64 {
        self.events.counts().trigger_rising
    }

    pub fn get_num_trigger_falling(&self) -> u64 {
        self.events.counts().trigger_falling
    }

    /// All cumulative counters at once.
    pub fn counts(&self) -> EventCounts {
        self.events.counts()
    }

    /// Time base of the packet currently being decoded, or of the last one
    /// started. `None` before the first decode.
    pub fn get_start_time(&self) -> Option<i64> {
        self.start_time
    }

    fn run<P: EncodedPacket + ?Sized>(
        &mut self,
        packet: &P,
        limit: Option<i64>,
    ) -> Result<Option<i64>, DecodeError> {
        self.activate(packet.encoding())?;
        let Self {
            active,
            cursor,
            events,
            start_time,
            ..
        } = self;
        let Some(active) = active.as_mut() else {
            return Err(DecodeError::UnsupportedEncoding(packet.encoding().to_string()));
        };

        // A resumed buffer keeps its time base but takes the bounds of the
        // header it arrived with.
        let geometry = Geometry::new(packet.width(), packet.height());
        if cursor.in_progress() {
            active.codec.set_geometry(geometry);
        } else {
            active.codec.begin_packet(geometry, packet.time_base());
            *start_time = Some(packet.time_base());
        }
        let result = cursor.advance(active.codec.as_mut(), packet.events(), limit, events);
        events.close_packet();
        result
    }

    /// Makes the codec for `encoding` the active one.
    ///
    /// On an unknown encoding the decoder is left untouched.
    fn activate(&mut self, encoding: &str) -> Result<(), DecodeError> {
        if matches!(&self.active, Some(active) if active.encoding == encoding) {
            return Ok(());
        }
        let codec = self.codecs.resolve(encoding)?;
        if self.cursor.carry_len() > 0 || self.cursor.in_progress() {
            warn!(
                carry = self.cursor.carry_len(),
                "encoding changed mid-stream, dropping partial data"
            );
        }
        debug!(encoding, "switching codec");
        self.cursor.reset();
        self.active = Some(ActiveCodec {
            encoding: encoding.to_string(),
            codec,
        });
        Ok(())
    }
}

/// Operations shared by [`Decoder`] and [`crate::UniqueDecoder`].
pub trait EventDecoder {
    fn decode<P: EncodedPacket + ?Sized>(&mut self, packet: &P) -> Result<(), DecodeError>;
    fn decode_until<P: EncodedPacket + ?Sized>(
        &mut self,
        packet: &P,
        until_time: i64,
    ) -> Result<UntilResult, DecodeError>;
    fn find_first_sensor_time<P: EncodedPacket + ?Sized>(
        &self,
        packet: &P,
    ) -> Result<Option<i64>, DecodeError>;
    fn get_cd_events(&mut self) -> Vec<CdEvent>;
    fn get_ext_trig_events(&mut self) -> Vec<TriggerEvent>;
    fn get_cd_event_packets(&mut self) -> Vec<Vec<CdEvent>>;
    fn get_ext_trig_event_packets(&mut self) -> Vec<Vec<TriggerEvent>>;
    fn counts(&self) -> EventCounts;
    fn get_start_time(&self) -> Option<i64>;
}

impl EventDecoder for Decoder {
    fn decode<P: EncodedPacket + ?Sized>(&mut self, packet: &P) -> Result<(), DecodeError> {
        Decoder::decode(self, packet)
    }

    fn decode_until<P: EncodedPacket + ?Sized>(
        &mut self,
        packet: &P,
        until_time: i64,
    ) -> Result<UntilResult, DecodeError> {
        Decoder::decode_until(self, packet, until_time)
    }

    fn find_first_sensor_time<P: EncodedPacket + ?Sized>(
        &self,
        packet: &P,
    ) -> Result<Option<i64>, DecodeError> {
        Decoder::find_first_sensor_time(self, packet)
    }

    fn get_cd_events(&mut self) -> Vec<CdEvent> {
        Decoder::get_cd_events(self)
    }

    fn get_ext_trig_events(&mut self) -> Vec<TriggerEvent> {
        Decoder::get_ext_trig_events(self)
    }

    fn get_cd_event_packets(&mut self) -> Vec<Vec<CdEvent>> {
        Decoder::get_cd_event_packets(self)
    }

    fn get_ext_trig_event_packets(&mut self) -> Vec<Vec<TriggerEvent>> {
        Decoder::get_ext_trig_event_packets(self)
    }

    fn counts(&self) -> EventCounts {
        Decoder::counts(self)
    }

    fn get_start_time(&self) -> Option<i64> {
        Decoder::get_start_time(self)
    }
}
