//! Payload builders shared by the integration tests.
#![allow(dead_code)]

use evcodec_core::packed::{encode_mono, encode_trigger};
use evcodec_core::{CdEvent, EventPacket, TriggerEvent};

pub const WIDTH: u16 = 640;
pub const HEIGHT: u16 = 480;

/// Builds an EVT 3.0 word stream.
#[derive(Default)]
pub struct Evt3Builder {
    words: Vec<u16>,
}

impl Evt3Builder {
    /// Starts a stream with TIME_HIGH = 0.
    pub fn new() -> Self {
        Self {
            words: vec![0x8000],
        }
    }

    pub fn time_high(mut self, value: u16) -> Self {
        self.words.push(0x8000 | (value & 0x0FFF));
        self
    }

    pub fn time_low(mut self, value: u16) -> Self {
        self.words.push(0x6000 | (value & 0x0FFF));
        self
    }

    pub fn y(mut self, y: u16) -> Self {
        self.words.push(y & 0x07FF);
        self
    }

    pub fn x(mut self, x: u16, polarity: u8) -> Self {
        self.words
            .push(0x2000 | ((polarity as u16 & 1) << 11) | (x & 0x07FF));
        self
    }

    pub fn base_x(mut self, x: u16, polarity: u8) -> Self {
        self.words
            .push(0x3000 | ((polarity as u16 & 1) << 11) | (x & 0x07FF));
        self
    }

    pub fn vect_12(mut self, valid: u16) -> Self {
        self.words.push(0x4000 | (valid & 0x0FFF));
        self
    }

    /// EXT_TRIGGER word; on the wire value 1 is a rising edge.
    pub fn trigger(mut self, id: u8, value: u8) -> Self {
        self.words
            .push(0xA000 | ((id as u16 & 0x0F) << 8) | (value as u16 & 1));
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

pub fn mono_bytes(events: &[(u16, u16, u8, u32)]) -> Vec<u8> {
    events
        .iter()
        .flat_map(|&(x, y, p, dt)| encode_mono(x, y, p, dt).to_le_bytes())
        .collect()
}

pub fn mono_packet(time_base: i64, events: &[(u16, u16, u8, u32)]) -> EventPacket {
    EventPacket::new("mono", WIDTH, HEIGHT, time_base, mono_bytes(events))
}

pub fn trigger_packet(time_base: i64, edges: &[(bool, u8, u32)]) -> EventPacket {
    let bytes = edges
        .iter()
        .flat_map(|&(rising, id, dt)| encode_trigger(rising, id, dt).to_le_bytes())
        .collect();
    EventPacket::new("trigger", WIDTH, HEIGHT, time_base, bytes)
}

/// A mixed EVT 3.0 packet: CD rows, a vector burst and triggers.
pub fn evt3_packet(time_base: i64) -> EventPacket {
    let stream = Evt3Builder::new()
        .time_low(10)
        .y(5)
        .x(100, 1)
        .x(101, 0)
        .trigger(1, 1)
        .time_low(20)
        .y(6)
        .base_x(200, 1)
        .vect_12(0b1010_0000_0101)
        .time_low(35)
        .trigger(1, 0)
        .y(7)
        .x(100, 0)
        .time_high(1)
        .time_low(0)
        .y(5)
        .x(100, 1);
    EventPacket::new("evt3", WIDTH, HEIGHT, time_base, stream.bytes())
}

pub fn time_sum(cd: &[CdEvent], triggers: &[TriggerEvent]) -> i64 {
    cd.iter().map(|e| e.t).sum::<i64>() + triggers.iter().map(|e| e.t).sum::<i64>()
}
