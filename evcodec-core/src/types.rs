//! Event and packet types shared by all codecs.
//!
//! Decoded events carry absolute sensor time: the packet's time base plus the
//! offset recovered from the encoded payload.

/// A decoded Change Detection (CD) event.
///
/// CD events represent brightness changes detected at a single pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct CdEvent {
    /// X coordinate of the pixel, always below the packet width
    pub x: u16,
    /// Y coordinate of the pixel, always below the packet height
    pub y: u16,
    /// Event polarity: 0 = OFF (decrease), 1 = ON (increase in brightness)
    pub polarity: u8,
    /// Absolute sensor time
    pub t: i64,
}

impl CdEvent {
    /// Creates a new CD event.
    #[inline]
    pub fn new(x: u16, y: u16, polarity: u8, t: i64) -> Self {
        Self { x, y, polarity, t }
    }
}

/// An external trigger event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct TriggerEvent {
    /// Edge polarity: 0 = rising edge, 1 = falling edge
    pub polarity: u8,
    /// Trigger channel ID
    pub id: u8,
    /// Absolute sensor time
    pub t: i64,
}

impl TriggerEvent {
    /// Creates a new trigger event.
    #[inline]
    pub fn new(polarity: u8, id: u8, t: i64) -> Self {
        Self { polarity, id, t }
    }
}

/// Header fields of an encoded event packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Encoding identifier, e.g. `"evt3"`
    pub encoding: String,
    /// Sensor width in pixels
    pub width: u16,
    /// Sensor height in pixels
    pub height: u16,
    /// Offset added to every decoded timestamp
    pub time_base: i64,
}

/// An owned packet: header plus encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacket {
    pub header: PacketHeader,
    pub events: Vec<u8>,
}

impl EventPacket {
    pub fn new(
        encoding: impl Into<String>,
        width: u16,
        height: u16,
        time_base: i64,
        events: Vec<u8>,
    ) -> Self {
        Self {
            header: PacketHeader {
                encoding: encoding.into(),
                width,
                height,
                time_base,
            },
            events,
        }
    }
}

/// Anything that looks like an event packet message.
///
/// Implement this for an outer message envelope to hand it to the decoders
/// without copying the payload.
pub trait EncodedPacket {
    fn encoding(&self) -> &str;
    fn width(&self) -> u16;
    fn height(&self) -> u16;
    fn time_base(&self) -> i64;
    fn events(&self) -> &[u8];
}

impl EncodedPacket for EventPacket {
    fn encoding(&self) -> &str {
        &self.header.encoding
    }

    fn width(&self) -> u16 {
        self.header.width
    }

    fn height(&self) -> u16 {
        self.header.height
    }

    fn time_base(&self) -> i64 {
        self.header.time_base
    }

    fn events(&self) -> &[u8] {
        &self.events
    }
}

/// A borrowed packet assembled from loose header fields.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    pub encoding: &'a str,
    pub width: u16,
    pub height: u16,
    pub time_base: i64,
    pub events: &'a [u8],
}

impl<'a> PacketView<'a> {
    pub fn new(encoding: &'a str, width: u16, height: u16, time_base: i64, events: &'a [u8]) -> Self {
        Self {
            encoding,
            width,
            height,
            time_base,
            events,
        }
    }
}

impl EncodedPacket for PacketView<'_> {
    fn encoding(&self) -> &str {
        self.encoding
    }

    fn width(&self) -> u16 {
        self.width
    }

    fn height(&self) -> u16 {
        self.height
    }

    fn time_base(&self) -> i64 {
        self.time_base
    }

    fn events(&self) -> &[u8] {
        self.events
    }
}

/// Snapshot of the cumulative event counters of a decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventCounts {
    pub cd_on: u64,
    pub cd_off: u64,
    pub trigger_rising: u64,
    pub trigger_falling: u64,
}

impl EventCounts {
    /// Total number of CD events.
    pub fn cd_total(&self) -> u64 {
        self.cd_on + self.cd_off
    }

    /// Total number of trigger events.
    pub fn trigger_total(&self) -> u64 {
        self.trigger_rising + self.trigger_falling
    }
}
