//! Decoder variant that guarantees unique pixel addresses per output packet.
//!
//! Each decode call yields one packet of CD events. Before a packet is handed
//! out, a bitmap of the sensor marks which pixels it already contains, and
//! repeated addresses are resolved according to the [`DedupPolicy`].

use ndarray::ArrayView1;
use tracing::debug;

use crate::decoder::{Decoder, EventDecoder, UntilResult};
use crate::error::DecodeError;
use crate::types::{CdEvent, EncodedPacket, EventCounts, PacketView, TriggerEvent};

/// How repeated pixel addresses within one packet are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupPolicy {
    /// Keep only the most recent event per pixel, preserving order.
    #[default]
    KeepLatest,
    /// Keep every event, starting a new output packet at each repeat.
    SplitPackets,
}

/// One bit per sensor pixel.
#[derive(Debug, Default)]
struct PixelMask {
    bits: Vec<u64>,
    width: usize,
    height: usize,
}

impl PixelMask {
    /// Sizes the mask for the given sensor, clearing it if the size changes.
    fn fit(&mut self, width: u16, height: u16) -> Result<(), DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidGeometry { width, height });
        }
        let (width, height) = (width as usize, height as usize);
        if width != self.width || height != self.height {
            debug!(width, height, "resizing pixel mask");
            self.width = width;
            self.height = height;
            self.bits = vec![0; (width * height + 63) / 64];
        }
        Ok(())
    }

    /// Word and bit of `(x, y)`, or `None` outside the mask.
    #[inline]
    fn index(&self, x: u16, y: u16) -> Option<(usize, u64)> {
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = y * self.width + x;
        Some((offset / 64, 1u64 << (offset % 64)))
    }

    /// Marks `(x, y)`; false if it was already marked. Pixels outside the
    /// mask are never tracked and always count as fresh.
    #[inline]
    fn insert(&mut self, x: u16, y: u16) -> bool {
        let Some((word, bit)) = self.index(x, y) else {
            return true;
        };
        let fresh = self.bits[word] & bit == 0;
        self.bits[word] |= bit;
        fresh
    }

    #[inline]
    fn remove(&mut self, x: u16, y: u16) {
        if let Some((word, bit)) = self.index(x, y) {
            self.bits[word] &= !bit;
        }
    }

    fn remove_all(&mut self, events: &[CdEvent]) {
        for event in events {
            self.remove(event.x, event.y);
        }
    }
}

/// Drops all but the latest event per pixel, in place. Returns the number
/// of events dropped.
fn keep_latest(events: &mut Vec<CdEvent>, mask: &mut PixelMask) -> usize {
    // Walk backwards so the first sighting of a pixel is its latest event,
    // compacting survivors towards the end.
    let mut write = events.len();
    for read in (0..events.len()).rev() {
        let event = events[read];
        if mask.insert(event.x, event.y) {
            write -= 1;
            events[write] = event;
        }
    }
    mask.remove_all(&events[write..]);
    events.drain(..write);
    write
}

/// Cuts `events` into runs without repeated pixels.
fn split_unique(events: Vec<CdEvent>, mask: &mut PixelMask) -> Vec<Vec<CdEvent>> {
    let mut packets = Vec::new();
    let mut start = 0;
    for (i, event) in events.iter().enumerate() {
        if !mask.insert(event.x, event.y) {
            mask.remove_all(&events[start..i]);
            packets.push(events[start..i].to_vec());
            start = i;
            mask.insert(event.x, event.y);
        }
    }
    mask.remove_all(&events[start..]);
    if start == 0 {
        if !events.is_empty() {
            packets.push(events);
        }
    } else {
        packets.push(events[start..].to_vec());
    }
    packets
}

/// Event decoder whose CD packets never repeat a pixel address.
///
/// Uniqueness holds within each output packet, not across packets. Trigger
/// events pass through untouched. The cumulative counters count every decoded
/// event, including those later suppressed.
#[derive(Debug, Default)]
pub struct UniqueDecoder {
    decoder: Decoder,
    policy: DedupPolicy,
    mask: PixelMask,
    cd_packets: Vec<Vec<CdEvent>>,
    num_suppressed: u64,
}

impl UniqueDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DedupPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Wraps an existing decoder, e.g. one with a custom codec table.
    pub fn from_decoder(decoder: Decoder, policy: DedupPolicy) -> Self {
        Self {
            decoder,
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> DedupPolicy {
        self.policy
    }

    pub fn decode<P: EncodedPacket + ?Sized>(&mut self, packet: &P) -> Result<(), DecodeError> {
        self.mask.fit(packet.width(), packet.height())?;
        let result = self.decoder.decode(packet);
        self.absorb();
        result
    }

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

    pub fn decode_array(
        &mut self,
        encoding: &str,
        width: u16,
        height: u16,
        time_base: i64,
        events: ArrayView1<'_, u8>,
    ) -> Result<(), DecodeError> {
        self.mask.fit(width, height)?;
        let result = self
            .decoder
            .decode_array(encoding, width, height, time_base, events);
        self.absorb();
        result
    }

    /// Time-bounded decode; every call's output is deduplicated on its own.
    pub fn decode_until<P: EncodedPacket + ?Sized>(
        &mut self,
        packet: &P,
        until_time: i64,
    ) -> Result<UntilResult, DecodeError> {
        self.mask.fit(packet.width(), packet.height())?;
        let result = self.decoder.decode_until(packet, until_time);
        self.absorb();
        result
    }

    pub fn find_first_sensor_time<P: EncodedPacket + ?Sized>(
        &self,
        packet: &P,
    ) -> Result<Option<i64>, DecodeError> {
        self.decoder.find_first_sensor_time(packet)
    }

    /// Drains the deduplicated CD packets, flattened into one vector.
    pub fn get_cd_events(&mut self) -> Vec<CdEvent> {
        std::mem::take(&mut self.cd_packets).concat()
    }

    pub fn get_ext_trig_events(&mut self) -> Vec<TriggerEvent> {
        self.decoder.get_ext_trig_events()
    }

    /// Drains the deduplicated CD packets.
    pub fn get_cd_event_packets(&mut self) -> Vec<Vec<CdEvent>> {
        std::mem::take(&mut self.cd_packets)
    }

    pub fn get_ext_trig_event_packets(&mut self) -> Vec<Vec<TriggerEvent>> {
        self.decoder.get_ext_trig_event_packets()
    }

    pub fn get_num_cd_on(&self) -> u64 {
        self.decoder.get_num_cd_on()
    }

    pub fn get_num_cd_off(&self) -> u64 {
        self.decoder.get_num_cd_off()
    }

    pub fn get_num_trigger_rising(&self) -> u64 {
        self.decoder.get_num_trigger_rising()
    }

    pub fn get_num_trigger_falling(&self) -> u64 {
        self.decoder.get_num_trigger_falling()
    }

    /// Number of CD events dropped by [`DedupPolicy::KeepLatest`].
    pub fn get_num_cd_suppressed(&self) -> u64 {
        self.num_suppressed
    }

    pub fn counts(&self) -> EventCounts {
        self.decoder.counts()
    }

    /// See [`Decoder::get_start_time`].
    pub fn get_start_time(&self) -> Option<i64> {
        self.decoder.get_start_time()
    }

    /// Moves freshly decoded packets out of the inner decoder, deduplicated.
    fn absorb(&mut self) {
        for mut packet in self.decoder.get_cd_event_packets() {
            match self.policy {
                DedupPolicy::KeepLatest => {
                    self.num_suppressed += keep_latest(&mut packet, &mut self.mask) as u64;
                    self.cd_packets.push(packet);
                }
                DedupPolicy::SplitPackets => {
                    self.cd_packets
                        .extend(split_unique(packet, &mut self.mask));
                }
            }
        }
    }
}

impl EventDecoder for UniqueDecoder {
    fn decode<P: EncodedPacket + ?Sized>(&mut self, packet: &P) -> Result<(), DecodeError> {
        UniqueDecoder::decode(self, packet)
    }

    fn decode_until<P: EncodedPacket + ?Sized>(
        &mut self,
        packet: &P,
        until_time: i64,
    ) -> Result<UntilResult, DecodeError> {
        UniqueDecoder::decode_until(self, packet, until_time)
    }

    fn find_first_sensor_time<P: EncodedPacket + ?Sized>(
        &self,
        packet: &P,
    ) -> Result<Option<i64>, DecodeError> {
        UniqueDecoder::find_first_sensor_time(self, packet)
    }

    fn get_cd_events(&mut self) -> Vec<CdEvent> {
        UniqueDecoder::get_cd_events(self)
    }

    fn get_ext_trig_events(&mut self) -> Vec<TriggerEvent> {
        UniqueDecoder::get_ext_trig_events(self)
    }

    fn get_cd_event_packets(&mut self) -> Vec<Vec<CdEvent>> {
        UniqueDecoder::get_cd_event_packets(self)
    }

    fn get_ext_trig_event_packets(&mut self) -> Vec<Vec<TriggerEvent>> {
        UniqueDecoder::get_ext_trig_event_packets(self)
    }

    fn counts(&self) -> EventCounts {
        UniqueDecoder::counts(self)
    }

    fn get_start_time(&self) -> Option<i64> {
        UniqueDecoder::get_start_time(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask(width: u16, height: u16) -> PixelMask {
        let mut mask = PixelMask::default();
        mask.fit(width, height).unwrap();
        mask
    }

    fn ev(x: u16, y: u16, t: i64) -> CdEvent {
        CdEvent::new(x, y, 1, t)
    }

    #[test]
    fn test_pixel_mask() {
        let mut mask = mask(10, 10);
        assert!(mask.insert(9, 9));
        assert!(!mask.insert(9, 9));
        mask.remove(9, 9);
        assert!(mask.insert(9, 9));
        assert!(mask.bits.len() * 64 >= 100);
    }

    #[test]
    fn test_pixel_mask_ignores_outside_pixels() {
        let mut mask = mask(8, 8);
        assert!(mask.insert(600, 400));
        assert!(mask.insert(600, 400));
        assert!(mask.insert(9, 0));
        mask.remove(600, 400);
        assert!(mask.bits.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_zero_geometry_rejected() {
        let mut mask = PixelMask::default();
        assert_eq!(
            mask.fit(0, 480),
            Err(DecodeError::InvalidGeometry {
                width: 0,
                height: 480
            })
        );
    }

    #[test]
    fn test_keep_latest() {
        let mut mask = mask(8, 8);
        let mut events = vec![ev(1, 1, 0), ev(2, 2, 1), ev(1, 1, 2), ev(3, 3, 3), ev(2, 2, 4)];
        let dropped = keep_latest(&mut events, &mut mask);

        assert_eq!(dropped, 2);
        assert_eq!(events, vec![ev(1, 1, 2), ev(3, 3, 3), ev(2, 2, 4)]);
        assert!(mask.bits.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_split_unique() {
        let mut mask = mask(8, 8);
        let events = vec![ev(1, 1, 0), ev(2, 2, 1), ev(1, 1, 2), ev(1, 1, 3)];
        let packets = split_unique(events, &mut mask);

        assert_eq!(
            packets,
            vec![vec![ev(1, 1, 0), ev(2, 2, 1)], vec![ev(1, 1, 2)], vec![ev(1, 1, 3)]]
        );
        assert!(mask.bits.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_split_unique_without_repeats_keeps_vector() {
        let mut mask = mask(8, 8);
        let packets = split_unique(vec![ev(0, 0, 0), ev(7, 7, 1)], &mut mask);
        assert_eq!(packets.len(), 1);
        assert!(split_unique(Vec::new(), &mut mask).is_empty());
    }
}
