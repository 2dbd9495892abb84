//! Error types for the PVD comm-stream protocol.
//!
//! Every variant except `Io` means the byte cursor can no longer be trusted
//! to sit on an event boundary; callers treat them as fatal for the stream.

use thiserror::Error;

/// Protocol-level errors raised while framing, decoding or resyncing a stream.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Stream header carries a different magic id
    #[error("stream ID invalid; got {actual:#x}, expected {expected:#x}")]
    StreamIdMismatch {
        /// Id compiled into this build
        expected: u32,
        /// Id found in the stream
        actual: u32,
    },

    /// Stream header carries a different protocol version
    #[error("stream version invalid; got {actual}, expected {expected}")]
    StreamVersionMismatch {
        /// Version compiled into this build
        expected: u32,
        /// Version found in the stream
        actual: u32,
    },

    /// Producer declared big-endian scalars
    #[error("stream was produced big-endian; only little-endian producers are supported")]
    BigEndianStream,

    /// Event type tag outside the closed event set
    #[error("unknown or invalid event type tag: {0}")]
    UnknownEventTag(u8),

    /// A field or header needs more bytes than are left
    #[error("truncated data: needed {needed} bytes, only {available} available")]
    Truncated {
        /// Bytes the decoder asked for
        needed: usize,
        /// Bytes that were actually left
        available: usize,
    },

    /// A count prefix exceeds the decoder's allocation bound
    #[error("count-prefixed field too large: {len} exceeds maximum {max}")]
    FieldTooLarge {
        /// Declared count
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// An event group declares a payload above the allowed maximum
    #[error("event group payload too large: {size} bytes exceeds maximum {max}")]
    GroupTooLarge {
        /// Declared payload size
        size: u32,
        /// Allowed maximum
        max: u32,
    },

    /// A non-sentinel group with no payload bytes to hold its events
    #[error("event group declares {events} events but carries no payload")]
    EmptyGroupPayload {
        /// Declared event count
        events: u32,
    },

    /// A single group does not fit into the capture buffer
    #[error("event group of {needed} bytes does not fit into the {capacity} byte receive buffer")]
    GroupExceedsBuffer {
        /// Header plus payload size of the group
        needed: usize,
        /// Receive buffer capacity
        capacity: usize,
    },

    /// Underlying reader or writer failed
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
