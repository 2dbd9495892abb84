//! PVD comm-stream protocol
//!
//! A stream is one [`framing::StreamHeader`] followed by event groups. Each
//! group is a fixed header plus `data_size` bytes holding `num_events`
//! tagged events; a group with no events ends the stream.

pub mod error;
pub mod framing;
pub mod resync;
pub mod wire;

pub use error::{ProtocolError, Result};
pub use framing::{
    EventGroup, FramerState, GroupBuilder, GroupEvents, RawGroup, StreamHeader, StreamReader,
    MAX_GROUP_PAYLOAD,
};
pub use resync::{Committed, ResyncBuffer};
pub use wire::{Color, PvdString, Vec3, Wire, MAX_ARRAY_LEN, MAX_FIELD_LEN};

/// Magic id every stream header must carry
pub const STREAM_ID: u32 = 0x00C0_FFEE;

/// Protocol version this build reads and writes
pub const STREAM_VERSION: u32 = 1;
