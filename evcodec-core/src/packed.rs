//! Packed 64-bit encodings: `mono` (CD events) and `trigger`.
//!
//! Every unit is one self-contained event, so these codecs carry no stream
//! state beyond the time base of the current packet.
//!
//! ```text
//! mono:    [63] polarity | [62:48] y | [47:32] x  | [31:0] time offset
//! trigger: [63] edge     | [62:40] -  | [39:32] id | [31:0] time offset
//! ```

use byteorder::{ByteOrder, LittleEndian};

use crate::accumulator::EventAccumulator;
use crate::codec::{absolute_time, Codec, Geometry};
use crate::error::Fault;

#[inline]
fn offset(unit: u64) -> u64 {
    unit & 0xFFFF_FFFF
}

#[inline]
fn top_bit(unit: u64) -> u8 {
    (unit >> 63) as u8
}

/// Packs a CD event into a `mono` unit.
pub fn encode_mono(x: u16, y: u16, polarity: u8, offset: u32) -> u64 {
    ((polarity.min(1) as u64) << 63)
        | (((y & 0x7FFF) as u64) << 48)
        | ((x as u64) << 32)
        | offset as u64
}

/// Packs a trigger edge into a `trigger` unit (`rising` sets the edge bit).
pub fn encode_trigger(rising: bool, id: u8, offset: u32) -> u64 {
    ((rising as u64) << 63) | ((id as u64) << 32) | offset as u64
}

#[derive(Debug, Clone, Default)]
pub struct MonoCodec {
    geometry: Geometry,
    time_base: i64,
    last_time: Option<i64>,
}

impl MonoCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Codec> {
        Box::new(Self::new())
    }
}

impl Codec for MonoCodec {
    fn unit_size(&self) -> usize {
        8
    }

    fn begin_packet(&mut self, geometry: Geometry, time_base: i64) {
        self.geometry = geometry;
        self.time_base = time_base;
    }

    fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    fn event_time(&self, unit: &[u8]) -> Option<i64> {
        absolute_time(self.time_base, offset(LittleEndian::read_u64(unit))).ok()
    }

    fn decode_unit(&mut self, unit: &[u8], out: &mut EventAccumulator) -> Result<(), Fault> {
        let unit = LittleEndian::read_u64(unit);
        let x = ((unit >> 32) & 0xFFFF) as u16;
        let y = ((unit >> 48) & 0x7FFF) as u16;
        self.geometry.check(x, y)?;
        let t = absolute_time(self.time_base, offset(unit))?;
        out.push_cd(x, y, top_bit(unit), t);
        self.last_time = Some(t);
        Ok(())
    }

    fn running_time(&self) -> Option<i64> {
        self.last_time
    }

    fn box_clone(&self) -> Box<dyn Codec> {
        Box::new(self.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct TriggerCodec {
    time_base: i64,
    last_time: Option<i64>,
}

impl TriggerCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Codec> {
        Box::new(Self::new())
    }
}

impl Codec for TriggerCodec {
    fn unit_size(&self) -> usize {
        8
    }

    fn begin_packet(&mut self, _geometry: Geometry, time_base: i64) {
        self.time_base = time_base;
    }

    fn set_geometry(&mut self, _geometry: Geometry) {}

    fn event_time(&self, unit: &[u8]) -> Option<i64> {
        absolute_time(self.time_base, offset(LittleEndian::read_u64(unit))).ok()
    }

    fn decode_unit(&mut self, unit: &[u8], out: &mut EventAccumulator) -> Result<(), Fault> {
        let unit = LittleEndian::read_u64(unit);
        let id = ((unit >> 32) & 0xFF) as u8;
        let t = absolute_time(self.time_base, offset(unit))?;
        out.push_trigger(1 - top_bit(unit), id, t);
        self.last_time = Some(t);
        Ok(())
    }

    fn running_time(&self) -> Option<i64> {
        self.last_time
    }

    fn box_clone(&self) -> Box<dyn Codec> {
        Box::new(self.clone())
    }
}
