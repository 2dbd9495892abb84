//! Stream and event-group framing.
//!
//! ```text
//! StreamHeader (25 bytes, once)
//!   stream_id u32 | stream_version u32 | ts_numerator u64 | ts_denominator u64 | big_endian u8
//! EventGroup (24 bytes, repeated)
//!   data_size u32 | num_events u32 | stream_id u64 | timestamp u64
//!   followed by `data_size` bytes holding `num_events` tagged events
//! ```
//!
//! A group with `num_events == 0` is the end-of-stream sentinel.

use std::io::{ErrorKind, Read};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use super::error::{ProtocolError, Result};
use super::wire::Wire;
use super::{STREAM_ID, STREAM_VERSION};
use crate::types::events::Event;

/// Largest payload a single event group may declare (256 MiB)
pub const MAX_GROUP_PAYLOAD: u32 = 256 * 1024 * 1024;

/// One-time stream compatibility marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHeader {
    pub stream_id: u32,
    pub stream_version: u32,
    pub timestamp_numerator: u64,
    pub timestamp_denominator: u64,
    pub big_endian: bool,
}

impl StreamHeader {
    pub const SIZE: usize = 25;

    /// Header for a stream produced by this build
    pub fn new(timestamp_numerator: u64, timestamp_denominator: u64) -> Self {
        Self {
            stream_id: STREAM_ID,
            stream_version: STREAM_VERSION,
            timestamp_numerator,
            timestamp_denominator,
            big_endian: false,
        }
    }

    /// Reject streams this decoder cannot stay aligned with
    pub fn validate(&self) -> Result<()> {
        if self.stream_id != STREAM_ID {
            return Err(ProtocolError::StreamIdMismatch {
                expected: STREAM_ID,
                actual: self.stream_id,
            });
        }
        if self.stream_version != STREAM_VERSION {
            return Err(ProtocolError::StreamVersionMismatch {
                expected: STREAM_VERSION,
                actual: self.stream_version,
            });
        }
        if self.big_endian {
            return Err(ProtocolError::BigEndianStream);
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut dst);
        dst.freeze()
    }
}

impl Default for StreamHeader {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Wire for StreamHeader {
    fn decode(src: &mut Bytes) -> Result<Self> {
        Ok(Self {
            stream_id: u32::decode(src)?,
            stream_version: u32::decode(src)?,
            timestamp_numerator: u64::decode(src)?,
            timestamp_denominator: u64::decode(src)?,
            big_endian: bool::decode(src)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.stream_id.encode(dst);
        self.stream_version.encode(dst);
        self.timestamp_numerator.encode(dst);
        self.timestamp_denominator.encode(dst);
        self.big_endian.encode(dst);
    }
}

/// Header of one batch of events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventGroup {
    /// Encoded size of all events in the group, tags included
    pub data_size: u32,
    pub num_events: u32,
    pub stream_id: u64,
    pub timestamp: u64,
}

impl EventGroup {
    pub const SIZE: usize = 24;

    /// The terminating group
    pub fn sentinel() -> Self {
        Self::default()
    }

    pub fn is_sentinel(&self) -> bool {
        self.num_events == 0
    }

    /// Parse a header from the first [`EventGroup::SIZE`] bytes of `buf`
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let available = buf.len();
        if available < Self::SIZE {
            return Err(ProtocolError::Truncated {
                needed: Self::SIZE,
                available,
            });
        }
        Self::decode(&mut Bytes::copy_from_slice(&buf[..Self::SIZE]))
    }

    /// Payload length this header commits the reader to.
    ///
    /// Sentinels report zero; anything else must carry a bounded, non-empty payload.
    pub fn payload_len(&self) -> Result<usize> {
        if self.is_sentinel() {
            return Ok(0);
        }
        if self.data_size > MAX_GROUP_PAYLOAD {
            return Err(ProtocolError::GroupTooLarge {
                size: self.data_size,
                max: MAX_GROUP_PAYLOAD,
            });
        }
        if self.data_size == 0 {
            return Err(ProtocolError::EmptyGroupPayload {
                events: self.num_events,
            });
        }
        Ok(self.data_size as usize)
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(Self::SIZE);
        self.encode(&mut dst);
        dst.freeze()
    }
}

impl Wire for EventGroup {
    fn decode(src: &mut Bytes) -> Result<Self> {
        Ok(Self {
            data_size: u32::decode(src)?,
            num_events: u32::decode(src)?,
            stream_id: u64::decode(src)?,
            timestamp: u64::decode(src)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.data_size.encode(dst);
        self.num_events.encode(dst);
        self.stream_id.encode(dst);
        self.timestamp.encode(dst);
    }
}

/// Position of a reader within the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    AwaitingHeader,
    StreamingGroups,
    Terminated,
}

/// A framed group whose events have not been decoded yet
#[derive(Debug, Clone)]
pub struct RawGroup {
    pub header: EventGroup,
    pub payload: Bytes,
}

impl RawGroup {
    /// Decode the group's events in order. Every decoded event borrows from
    /// the one payload buffer, which is freed once the last of them is dropped.
    pub fn events(&self) -> GroupEvents {
        GroupEvents {
            payload: self.payload.clone(),
            remaining: self.header.num_events,
            failed: false,
        }
    }
}

/// Iterator over the events of one [`RawGroup`]
#[derive(Debug)]
pub struct GroupEvents {
    payload: Bytes,
    remaining: u32,
    failed: bool,
}

impl Iterator for GroupEvents {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if self.remaining == 0 {
            if !self.payload.is_empty() {
                warn!(
                    "skipping {} trailing bytes after the last event of a group",
                    self.payload.len()
                );
                self.payload.clear();
            }
            return None;
        }

        self.remaining -= 1;
        match Event::decode(&mut self.payload) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Pull-based framer over a blocking byte source
pub struct StreamReader<R> {
    reader: R,
    state: FramerState,
    header: Option<StreamHeader>,
    groups_read: u64,
}

impl<R: Read> StreamReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: FramerState::AwaitingHeader,
            header: None,
            groups_read: 0,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn groups_read(&self) -> u64 {
        self.groups_read
    }

    /// Read and validate the stream header. Later calls return the same
    /// header without touching the source.
    pub fn read_header(&mut self) -> Result<StreamHeader> {
        if let Some(header) = self.header {
            return Ok(header);
        }

        let mut raw = [0u8; StreamHeader::SIZE];
        let filled = self.fill(&mut raw)?;
        if filled < raw.len() {
            return Err(ProtocolError::Truncated {
                needed: raw.len(),
                available: filled,
            });
        }

        let header = StreamHeader::decode(&mut Bytes::copy_from_slice(&raw))?;
        header.validate()?;
        debug!(
            "stream header ok, timestamps {}/{}",
            header.timestamp_numerator, header.timestamp_denominator
        );

        self.header = Some(header);
        self.state = FramerState::StreamingGroups;
        Ok(header)
    }

    /// Next complete group, or `None` once the stream has ended.
    ///
    /// Nothing past the sentinel is ever read.
    pub fn next_group(&mut self) -> Result<Option<RawGroup>> {
        match self.state {
            FramerState::Terminated => return Ok(None),
            FramerState::AwaitingHeader => {
                self.read_header()?;
            }
            FramerState::StreamingGroups => {}
        }

        let mut raw = [0u8; EventGroup::SIZE];
        let filled = self.fill(&mut raw)?;
        if filled == 0 {
            warn!(
                "stream ended after {} groups without a terminating group",
                self.groups_read
            );
            self.state = FramerState::Terminated;
            return Ok(None);
        }
        let header = EventGroup::parse(&raw[..filled])?;

        if header.is_sentinel() {
            self.state = FramerState::Terminated;
            return Ok(None);
        }

        let len = header.payload_len()?;
        // grow with the data instead of trusting the declared size up front
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() < len {
            return Err(ProtocolError::Truncated {
                needed: len,
                available: payload.len(),
            });
        }

        self.groups_read += 1;
        Ok(Some(RawGroup {
            header,
            payload: Bytes::from(payload),
        }))
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read until `buf` is full or the source is exhausted
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }
}

/// Re-frames a subset of one group's events under that group's stream id
/// and timestamp.
#[derive(Debug)]
pub struct GroupBuilder {
    stream_id: u64,
    timestamp: u64,
    payload: BytesMut,
    count: u32,
}

impl GroupBuilder {
    pub fn new(template: &EventGroup) -> Self {
        Self {
            stream_id: template.stream_id,
            timestamp: template.timestamp,
            payload: BytesMut::with_capacity(template.data_size.min(64 * 1024) as usize),
            count: 0,
        }
    }

    pub fn push(&mut self, event: &Event) {
        event.encode(&mut self.payload);
        self.count += 1;
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Header plus payload, or `None` when no event was pushed. An empty
    /// group would read as a sentinel, so it is never emitted.
    pub fn finish(self) -> Option<Bytes> {
        if self.count == 0 {
            return None;
        }

        let header = EventGroup {
            data_size: self.payload.len() as u32,
            num_events: self.count,
            stream_id: self.stream_id,
            timestamp: self.timestamp,
        };

        let mut out = BytesMut::with_capacity(EventGroup::SIZE + self.payload.len());
        header.encode(&mut out);
        out.put(self.payload);
        Some(out.freeze())
    }
}
