#![allow(clippy::unusual_byte_groupings)]
//! Prophesee EVT 3.0 codec.
//!
//! EVT 3.0 is a stream of little-endian 16-bit words with a 4-bit type field
//! in the MSB. Address and time words update decoder state; `ADDR_X`, the
//! vector words and `EXT_TRIGGER` emit events at the current time.

use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;

use crate::accumulator::EventAccumulator;
use crate::codec::{absolute_time, Codec, Geometry};
use crate::error::Fault;

/// EVT 3.0 raw event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RawEventType {
    /// Y coordinate and system type (0x0)
    AddrY = 0x0,
    /// Single valid event with X coordinate and polarity (0x2)
    AddrX = 0x2,
    /// Base X coordinate for subsequent vector events (0x3)
    VectBaseX = 0x3,
    /// Vector event with 12 validity bits (0x4)
    Vect12 = 0x4,
    /// Vector event with 8 validity bits (0x5)
    Vect8 = 0x5,
    /// Lower 12 bits of timestamp (0x6)
    TimeLow = 0x6,
    /// Continued event with 4 bits of data (0x7)
    Continued4 = 0x7,
    /// Upper 12 bits of timestamp (0x8)
    TimeHigh = 0x8,
    /// External trigger event (0xA)
    ExtTrigger = 0xA,
    /// Extension event type (0xE)
    Others = 0xE,
    /// Continued event with 12 bits of data (0xF)
    Continued12 = 0xF,
}

impl RawEventType {
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::AddrY),
            0x2 => Some(Self::AddrX),
            0x3 => Some(Self::VectBaseX),
            0x4 => Some(Self::Vect12),
            0x5 => Some(Self::Vect8),
            0x6 => Some(Self::TimeLow),
            0x7 => Some(Self::Continued4),
            0x8 => Some(Self::TimeHigh),
            0xA => Some(Self::ExtTrigger),
            0xE => Some(Self::Others),
            0xF => Some(Self::Continued12),
            _ => None,
        }
    }

    #[inline]
    pub fn of_word(word: u16) -> Option<Self> {
        Self::from_u8((word >> 12) as u8)
    }
}

// Field accessors. All layouts: [15:12] type | [11:0] payload.

/// `ADDR_Y`: [10:0] y
#[inline]
fn addr_y(word: u16) -> u16 {
    word & 0x07FF
}

/// `ADDR_X` and `VECT_BASE_X`: [11] polarity | [10:0] x
#[inline]
fn addr_x(word: u16) -> (u16, u8) {
    (word & 0x07FF, ((word >> 11) & 0x1) as u8)
}

/// `VECT_12`: [11:0] validity mask
#[inline]
fn vect_12_valid(word: u16) -> u32 {
    (word & 0x0FFF) as u32
}

/// `VECT_8`: [7:0] validity mask
#[inline]
fn vect_8_valid(word: u16) -> u32 {
    (word & 0x00FF) as u32
}

/// `TIME_LOW` / `TIME_HIGH`: [11:0] time
#[inline]
fn time_bits(word: u16) -> u64 {
    (word & 0x0FFF) as u64
}

/// `EXT_TRIGGER`: [11:8] id | [0] value (1 = rising)
#[inline]
fn ext_trigger(word: u16) -> (u8, u8) {
    (((word >> 8) & 0x0F) as u8, (word & 0x01) as u8)
}

const MAX_TIMESTAMP_BASE: u64 = ((1u64 << 12) - 1) << 12; // 16773120us
const TIME_LOOP: u64 = MAX_TIMESTAMP_BASE + (1 << 12); // 16777216us
const LOOP_THRESHOLD: u64 = 10 << 12;

/// Stateful EVT 3.0 word parser.
#[derive(Debug, Clone, Default)]
pub struct Evt3Codec {
    // Timestamp state, in sensor ticks since the start of the stream
    time_high: u64,
    current_time: u64,
    n_time_high_loops: u64,
    first_time_high_seen: bool,

    // Address/polarity state
    current_y: u16,
    current_base_x: u16,
    current_polarity: u8,

    geometry: Geometry,
    time_base: i64,
}

impl Evt3Codec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed() -> Box<dyn Codec> {
        Box::new(Self::new())
    }

    #[inline]
    fn absolute_time(&self) -> Result<i64, Fault> {
        absolute_time(self.time_base, self.current_time)
    }

    /// Handles TIME_HIGH with wrap-around detection.
    fn process_time_high(&mut self, word: u16) {
        let mut new_time_high = (time_bits(word) << 12) + self.n_time_high_loops * TIME_LOOP;

        if self.time_high > new_time_high
            && (self.time_high - new_time_high) >= (MAX_TIMESTAMP_BASE - LOOP_THRESHOLD)
        {
            new_time_high += TIME_LOOP;
            self.n_time_high_loops += 1;
        }

        self.time_high = new_time_high;
        self.current_time = new_time_high;
    }

    /// Emits one CD event per set bit of `valid`, starting at the base x.
    #[inline]
    fn process_vector(
        &mut self,
        mut valid: u32,
        count: u16,
        out: &mut EventAccumulator,
    ) -> Result<(), Fault> {
        let base_x = self.current_base_x;
        // Advance first so a fault does not leave the base behind.
        self.current_base_x = base_x.wrapping_add(count);
        let t = self.absolute_time()?;

        let mut x = base_x;
        while valid != 0 {
            if valid & 0x1 != 0 {
                self.geometry.check(x, self.current_y)?;
                out.push_cd(x, self.current_y, self.current_polarity, t);
            }
            valid >>= 1;
            x = x.wrapping_add(1);
        }
        Ok(())
    }
}

impl Codec for Evt3Codec {
    fn unit_size(&self) -> usize {
        2
    }

    fn begin_packet(&mut self, geometry: Geometry, time_base: i64) {
        self.geometry = geometry;
        self.time_base = time_base;
    }

    fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    fn event_time(&self, unit: &[u8]) -> Option<i64> {
        if !self.first_time_high_seen {
            return None;
        }
        let word = LittleEndian::read_u16(unit);
        let emits = match RawEventType::of_word(word)? {
            RawEventType::AddrX | RawEventType::ExtTrigger => true,
            RawEventType::Vect12 => vect_12_valid(word) != 0,
            RawEventType::Vect8 => vect_8_valid(word) != 0,
            _ => false,
        };
        if emits {
            self.absolute_time().ok()
        } else {
            None
        }
    }

    fn decode_unit(&mut self, unit: &[u8], out: &mut EventAccumulator) -> Result<(), Fault> {
        let word = LittleEndian::read_u16(unit);
        let Some(event_type) = RawEventType::of_word(word) else {
            // Reserved type
            return Ok(());
        };

        // Nothing is meaningful until the first TIME_HIGH anchors the clock.
        if !self.first_time_high_seen {
            if event_type == RawEventType::TimeHigh {
                self.time_high = time_bits(word) << 12;
                self.current_time = self.time_high;
                self.first_time_high_seen = true;
                debug!(time_high = self.time_high, "evt3 time base established");
            }
            return Ok(());
        }

        match event_type {
            RawEventType::AddrX => {
                let (x, polarity) = addr_x(word);
                self.geometry.check(x, self.current_y)?;
                out.push_cd(x, self.current_y, polarity, self.absolute_time()?);
            }
            RawEventType::Vect12 => self.process_vector(vect_12_valid(word), 12, out)?,
            RawEventType::Vect8 => self.process_vector(vect_8_valid(word), 8, out)?,
            RawEventType::AddrY => {
                self.current_y = addr_y(word);
            }
            RawEventType::VectBaseX => {
                let (x, polarity) = addr_x(word);
                self.current_base_x = x;
                self.current_polarity = polarity;
            }
            RawEventType::TimeHigh => self.process_time_high(word),
            RawEventType::TimeLow => {
                self.current_time = self.time_high + time_bits(word);
            }
            RawEventType::ExtTrigger => {
                let (id, value) = ext_trigger(word);
                out.push_trigger(1 - value, id, self.absolute_time()?);
            }
            RawEventType::Continued4 | RawEventType::Others | RawEventType::Continued12 => {}
        }
        Ok(())
    }

    fn running_time(&self) -> Option<i64> {
        if !self.first_time_high_seen {
            return None;
        }
        self.absolute_time().ok()
    }

    fn box_clone(&self) -> Box<dyn Codec> {
        Box::new(self.clone())
    }
}
