//! Buffers that hold decoded events until the caller drains them.
//!
//! Events land in two flat vectors. Every decode call closes a packet range so
//! that packet-aware callers can get one array per call back out.

use crate::types::{CdEvent, EventCounts, TriggerEvent};

/// Growable store for decoded CD and trigger events.
///
/// Counters are cumulative over the lifetime of the accumulator; draining
/// events never resets them.
#[derive(Debug, Default)]
pub struct EventAccumulator {
    cd_events: Vec<CdEvent>,
    trigger_events: Vec<TriggerEvent>,
    // End index of every closed packet range, strictly increasing
    cd_bounds: Vec<usize>,
    trigger_bounds: Vec<usize>,
    counts: EventCounts,
    max_size_cd: usize,
    max_size_trigger: usize,
}

impl EventAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a CD event. Any nonzero polarity counts as ON.
    #[inline]
    pub fn push_cd(&mut self, x: u16, y: u16, polarity: u8, t: i64) {
        let polarity = polarity.min(1);
        self.cd_events.push(CdEvent::new(x, y, polarity, t));
        if polarity == 0 {
            self.counts.cd_off += 1;
        } else {
            self.counts.cd_on += 1;
        }
    }

    /// Appends a trigger event with normalized polarity (0 = rising).
    #[inline]
    pub fn push_trigger(&mut self, polarity: u8, id: u8, t: i64) {
        let polarity = polarity.min(1);
        self.trigger_events.push(TriggerEvent::new(polarity, id, t));
        if polarity == 0 {
            self.counts.trigger_rising += 1;
        } else {
            self.counts.trigger_falling += 1;
        }
    }

    /// Marks the end of the events produced by one decode call.
    ///
    /// Ranges without events are not recorded.
    pub fn close_packet(&mut self) {
        close_range(&mut self.cd_bounds, self.cd_events.len());
        close_range(&mut self.trigger_bounds, self.trigger_events.len());
        self.max_size_cd = self.max_size_cd.max(self.cd_events.len());
        self.max_size_trigger = self.max_size_trigger.max(self.trigger_events.len());
    }

    /// Cumulative counters.
    pub fn counts(&self) -> EventCounts {
        self.counts
    }

    /// Number of CD events waiting to be drained.
    pub fn pending_cd(&self) -> usize {
        self.cd_events.len()
    }

    /// Number of trigger events waiting to be drained.
    pub fn pending_triggers(&self) -> usize {
        self.trigger_events.len()
    }

    /// Drains all CD events accumulated since the last drain.
    pub fn take_cd_events(&mut self) -> Vec<CdEvent> {
        self.cd_bounds.clear();
        let capacity = self.max_size_cd;
        std::mem::replace(&mut self.cd_events, Vec::with_capacity(capacity))
    }

    /// Drains all trigger events accumulated since the last drain.
    pub fn take_trigger_events(&mut self) -> Vec<TriggerEvent> {
        self.trigger_bounds.clear();
        let capacity = self.max_size_trigger;
        std::mem::replace(&mut self.trigger_events, Vec::with_capacity(capacity))
    }

    /// Drains CD events as one vector per recorded packet range.
    pub fn take_cd_packets(&mut self) -> Vec<Vec<CdEvent>> {
        let mut bounds = std::mem::take(&mut self.cd_bounds);
        let events = self.take_cd_events();
        let packets = split_at_bounds(events, &bounds);
        bounds.clear();
        self.cd_bounds = bounds;
        packets
    }

    /// Drains trigger events as one vector per recorded packet range.
    pub fn take_trigger_packets(&mut self) -> Vec<Vec<TriggerEvent>> {
        let mut bounds = std::mem::take(&mut self.trigger_bounds);
        let events = self.take_trigger_events();
        let packets = split_at_bounds(events, &bounds);
        bounds.clear();
        self.trigger_bounds = bounds;
        packets
    }
}

fn close_range(bounds: &mut Vec<usize>, len: usize) {
    if bounds.last().copied().unwrap_or(0) < len {
        bounds.push(len);
    }
}

/// Splits `events` at the packet end indices in `bounds`.
///
/// Events past the last bound (not yet closed) form a final packet.
fn split_at_bounds<T>(mut events: Vec<T>, bounds: &[usize]) -> Vec<Vec<T>> {
    let mut packets = Vec::with_capacity(bounds.len() + 1);
    let mut end = events.len();
    let starts = bounds.iter().rev().copied().chain(std::iter::once(0));
    for start in starts {
        if start >= end {
            continue;
        }
        let packet = if start == 0 {
            std::mem::take(&mut events)
        } else {
            events.split_off(start)
        };
        packets.push(packet);
        end = start;
    }
    packets.reverse();
    packets
}
