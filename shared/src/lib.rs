//! Shared protocol library for the OpenPVD tools
//!
//! Decodes and re-encodes the PVD comm-stream: the stream string table, the
//! typed event codec, group framing and chunk resync used by the capture
//! and filter tools.

pub mod protocol;
pub mod strings;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use protocol::{ProtocolError, STREAM_ID, STREAM_VERSION};
pub use strings::{NamespacedName, ResolvedName, StringHandle, StringTable};
pub use types::events::{Event, EventKind, InstanceId};
