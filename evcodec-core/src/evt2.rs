//! Prophesee EVT 2.0 codec.
//!
//! 32-bit little-endian words, type in bits 31..28. Each CD and trigger word
//! carries the 6 low bits of its timestamp; `TIME_HIGH` carries bits 33..6.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::accumulator::EventAccumulator;
use crate::codec::{absolute_time, Codec, Geometry};
use crate::error::Fault;

const CD_OFF: u32 = 0x0;
const CD_ON: u32 = 0x1;
const TIME_HIGH: u32 = 0x8;
const EXT_TRIGGER: u32 = 0xA;

#[inline]
fn word_type(word: u32) -> u32 {
    word >> 28
}

/// [27:22] timestamp low bits of CD and trigger words
#[inline]
fn time_low(word: u32) -> u64 {
    ((word >> 22) & 0x3F) as u64
}

/// CD: [21:11] x | [10:0] y
#[inline]
fn cd_xy(word: u32) -> (u16, u16) {
    (((word >> 11) & 0x7FF) as u16, (word & 0x7FF) as u16)
}

/// EXT_TRIGGER: [12:8] id | [0] value (1 = rising)
#[inline]
fn ext_trigger(word: u32) -> (u8, u8) {
    (((word >> 8) & 0x1F) as u8, (word & 0x1) as u8)
}

/// Stateful EVT 2.0 word parser.
#[derive(Debug, Clone, Default)]
pub struct Evt2Codec {
    time_high: Option<u64>,
    geometry: Geometry,
    time_base: i64,
}

impl Evt2Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Codec> {
        Box::new(Self::new())
    }

    #[inline]
    fn absolute_time(&self, time_high: u64, word: u32) -> Result<i64, Fault> {
        absolute_time(self.time_base, time_high | time_low(word))
    }
}

impl Codec for Evt2Codec {
    fn unit_size(&self) -> usize {
        4
    }

    fn begin_packet(&mut self, geometry: Geometry, time_base: i64) {
        self.geometry = geometry;
        self.time_base = time_base;
    }

    fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    fn event_time(&self, unit: &[u8]) -> Option<i64> {
        let time_high = self.time_high?;
        let word = LittleEndian::read_u32(unit);
        match word_type(word) {
            CD_OFF | CD_ON | EXT_TRIGGER => self.absolute_time(time_high, word).ok(),
            _ => None,
        }
    }

    fn decode_unit(&mut self, unit: &[u8], out: &mut EventAccumulator) -> Result<(), Fault> {
        let word = LittleEndian::read_u32(unit);
        let kind = word_type(word);
        if kind == TIME_HIGH {
            if self.time_high.is_none() {
                debug!("evt2 time base established");
            }
            self.time_high = Some(((word & 0x0FFF_FFFF) as u64) << 6);
            return Ok(());
        }
        let Some(time_high) = self.time_high else {
            return Ok(());
        };

        match kind {
            CD_OFF | CD_ON => {
                let (x, y) = cd_xy(word);
                self.geometry.check(x, y)?;
                out.push_cd(x, y, kind as u8, self.absolute_time(time_high, word)?);
            }
            EXT_TRIGGER => {
                let (id, value) = ext_trigger(word);
                out.push_trigger(1 - value, id, self.absolute_time(time_high, word)?);
            }
            _ => {}
        }
        Ok(())
    }

    fn running_time(&self) -> Option<i64> {
        absolute_time(self.time_base, self.time_high?).ok()
    }

    fn box_clone(&self) -> Box<dyn Codec> {
        Box::new(self.clone())
    }
}
