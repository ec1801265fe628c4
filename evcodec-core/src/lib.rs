//! Streaming decoder for event camera packets.
//!
//! Event cameras deliver their output as packets: an encoding identifier, the
//! sensor geometry, a time base and a payload of encoded events. This crate
//! turns such packets into [`CdEvent`] and [`TriggerEvent`] arrays.
//!
//! # Example
//!
//! ```no_run
//! use evcodec_core::Decoder;
//!
//! # fn payload() -> Vec<u8> { Vec::new() }
//! let mut decoder = Decoder::new();
//! decoder.decode_bytes("evt3", 1280, 720, 0, &payload()).unwrap();
//!
//! let events = decoder.get_cd_events();
//! println!("Decoded {} CD events", events.len());
//! println!("ON: {} OFF: {}", decoder.get_num_cd_on(), decoder.get_num_cd_off());
//! ```
//!
//! # Features
//!
//! - EVT 3.0, EVT 2.0, `mono` and `trigger` encodings, extensible through
//!   [`CodecTable`]
//! - Units split across packet boundaries are carried over transparently
//! - Time-bounded decoding ([`Decoder::decode_until`]) for frame batching
//! - [`UniqueDecoder`] for packets without repeated pixel addresses
//! - CSV writers and a raw recording header reader for tooling

pub mod accumulator;
pub mod codec;
mod cursor;
pub mod decoder;
pub mod error;
pub mod evt2;
pub mod evt3;
pub mod output;
pub mod packed;
pub mod recording;
pub mod types;
pub mod unique;

// Re-export commonly used types
pub use accumulator::EventAccumulator;
pub use codec::{Codec, CodecFactory, CodecTable, Geometry};
pub use decoder::{Decoder, EventDecoder, UntilResult, NO_EVENT_TIME};
pub use error::{DecodeError, Fault};
pub use output::OutputError;
pub use recording::{RecordingError, RecordingHeader};
pub use types::{CdEvent, EncodedPacket, EventCounts, EventPacket, PacketHeader, PacketView, TriggerEvent};
pub use unique::{DedupPolicy, UniqueDecoder};
