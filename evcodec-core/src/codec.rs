//! Codec table: maps encoding identifiers to bit-layout parsers.
//!
//! Every encoding is a [`Codec`] implementation. The decoder only talks to the
//! trait, so adding an encoding means registering one more factory here.

use std::collections::HashMap;
use std::fmt;

use crate::accumulator::EventAccumulator;
use crate::error::{DecodeError, Fault};
use crate::{evt2, evt3, packed};

/// Sensor geometry of the packet being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Geometry {
    pub width: u16,
    pub height: u16,
}

impl Geometry {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Checks that `(x, y)` lies inside the sensor.
    #[inline]
    pub fn check(&self, x: u16, y: u16) -> Result<(), Fault> {
        if x >= self.width {
            return Err(Fault::XOutOfRange {
                x,
                width: self.width,
            });
        }
        if y >= self.height {
            return Err(Fault::YOutOfRange {
                y,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// `time_base + offset`, failing if the sum leaves the `i64` range.
#[inline]
pub fn absolute_time(time_base: i64, offset: u64) -> Result<i64, Fault> {
    i64::try_from(offset)
        .ok()
        .and_then(|offset| time_base.checked_add(offset))
        .ok_or(Fault::TimeOverflow { time_base, offset })
}

/// Parser for one wire encoding.
///
/// A codec consumes fixed-size units and keeps whatever state the encoding
/// carries between units (time high bits, current row, ...). That state lives
/// across packets; only the time base and geometry change per packet.
pub trait Codec: Send {
    /// Size in bytes of one encoded unit.
    fn unit_size(&self) -> usize;

    /// Called before the first unit of every new packet.
    fn begin_packet(&mut self, geometry: Geometry, time_base: i64);

    /// Updates the bounds used for coordinate checks. Called on every decode
    /// call, including those resuming a partially decoded buffer.
    fn set_geometry(&mut self, geometry: Geometry);

    /// Absolute time of the events `unit` would emit, `None` if it emits none.
    ///
    /// Must not change state; the stream cursor uses it to stop before a unit.
    fn event_time(&self, unit: &[u8]) -> Option<i64>;

    /// Decodes one unit, pushing any events it carries into `out`.
    fn decode_unit(&mut self, unit: &[u8], out: &mut EventAccumulator) -> Result<(), Fault>;

    /// Running absolute time, once the stream has established one.
    fn running_time(&self) -> Option<i64>;

    fn box_clone(&self) -> Box<dyn Codec>;
}

/// Constructor for a fresh codec instance.
pub type CodecFactory = fn() -> Box<dyn Codec>;

/// Lookup table from encoding identifier to codec factory.
#[derive(Clone)]
pub struct CodecTable {
    factories: HashMap<String, CodecFactory>,
}

impl CodecTable {
    /// Creates a table with no encodings registered.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registers `factory` under `encoding`, returning the one it replaces.
    pub fn register(&mut self, encoding: &str, factory: CodecFactory) -> Option<CodecFactory> {
        self.factories.insert(encoding.to_string(), factory)
    }

    /// Instantiates the codec registered for `encoding`.
    pub fn resolve(&self, encoding: &str) -> Result<Box<dyn Codec>, DecodeError> {
        self.factories
            .get(encoding)
            .map(|factory| factory())
            .ok_or_else(|| DecodeError::UnsupportedEncoding(encoding.to_string()))
    }

    pub fn contains(&self, encoding: &str) -> bool {
        self.factories.contains_key(encoding)
    }

    /// Registered encoding identifiers, sorted.
    pub fn encodings(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for CodecTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.register("evt3", evt3::Evt3Codec::boxed);
        table.register("evt2", evt2::Evt2Codec::boxed);
        table.register("mono", packed::MonoCodec::boxed);
        table.register("trigger", packed::TriggerCodec::boxed);
        table
    }
}

impl fmt::Debug for CodecTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecTable")
            .field("encodings", &self.encodings())
            .finish()
    }
}
