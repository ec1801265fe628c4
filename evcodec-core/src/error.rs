//! Error types for packet decoding.

use thiserror::Error;

/// A field inside one encoded unit that does not fit the packet.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    #[error("x coordinate {x} outside sensor width {width}")]
    XOutOfRange { x: u16, width: u16 },

    #[error("y coordinate {y} outside sensor height {height}")]
    YOutOfRange { y: u16, height: u16 },

    #[error("time offset {offset} overflows time base {time_base}")]
    TimeOverflow { time_base: i64, offset: u64 },
}

/// Errors that can occur while decoding event packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The unit starting at `offset` (relative to the buffer handed to the
    /// failing call) could not be decoded.
    #[error("Corrupt stream at byte {offset}: {fault}")]
    CorruptStream { offset: usize, fault: Fault },

    #[error("Bad sensor resolution {width}x{height}")]
    InvalidGeometry { width: u16, height: u16 },
}
