//! Group boundary recovery for chunked byte sources.
//!
//! Bytes arrive in arbitrary chunks. [`ResyncBuffer::feed`] commits the
//! longest prefix made of whole groups (plus the stream header and the
//! sentinel when they are complete) and keeps the rest until more bytes
//! arrive. A group whose payload is not fully buffered is re-parsed from its
//! header on the next feed, so no partial group is ever committed.

use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::error::{ProtocolError, Result};
use super::framing::{EventGroup, FramerState, StreamHeader};
use super::wire::Wire;
use crate::types::events::EventKind;

/// Bytes released by one [`ResyncBuffer::feed`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Committed {
    /// Whole header/groups, ready to be written verbatim
    pub bytes: Bytes,
    /// Non-sentinel groups contained in `bytes`
    pub groups: u32,
    /// The sentinel was part of `bytes`
    pub terminated: bool,
}

#[derive(Debug)]
pub struct ResyncBuffer {
    pending: BytesMut,
    capacity: usize,
    state: FramerState,
    header: Option<StreamHeader>,
    groups: u64,
    largest_group: u32,
    ignored_bytes: u64,
}

impl ResyncBuffer {
    /// `capacity` bounds a single header plus group; bigger groups fail
    /// with `GroupExceedsBuffer` instead of buffering without limit.
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: BytesMut::with_capacity(capacity),
            capacity,
            state: FramerState::AwaitingHeader,
            header: None,
            groups: 0,
            largest_group: 0,
            ignored_bytes: 0,
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<Committed> {
        if self.state == FramerState::Terminated {
            self.ignored_bytes += chunk.len() as u64;
            return Ok(Committed::default());
        }

        self.pending.extend_from_slice(chunk);

        let mut cursor = 0;
        let mut groups = 0;

        if self.state == FramerState::AwaitingHeader {
            if self.pending.len() < StreamHeader::SIZE {
                return Ok(Committed::default());
            }
            let header =
                StreamHeader::decode(&mut Bytes::copy_from_slice(&self.pending[..StreamHeader::SIZE]))?;
            header.validate()?;
            debug!("stream header accepted");

            self.header = Some(header);
            self.state = FramerState::StreamingGroups;
            cursor = StreamHeader::SIZE;
        }

        while self.state == FramerState::StreamingGroups {
            let group_start = cursor;
            if self.pending.len() - cursor < EventGroup::SIZE {
                break;
            }

            let header = EventGroup::parse(&self.pending[cursor..])?;
            cursor += EventGroup::SIZE;

            if header.is_sentinel() {
                self.state = FramerState::Terminated;
                break;
            }

            let len = header.payload_len()?;
            if self.pending.len() - cursor < len {
                let needed = EventGroup::SIZE + len;
                if needed > self.capacity {
                    return Err(ProtocolError::GroupExceedsBuffer {
                        needed,
                        capacity: self.capacity,
                    });
                }
                // undo the header read; it is parsed again once the payload is in
                cursor = group_start;
                break;
            }

            // payload_len guarantees at least one byte
            EventKind::try_from(self.pending[cursor])?;

            cursor += len;
            groups += 1;
            self.groups += 1;
            self.largest_group = self.largest_group.max(header.data_size);
        }

        let bytes = self.pending.split_to(cursor).freeze();
        let terminated = self.state == FramerState::Terminated;
        if terminated && !self.pending.is_empty() {
            self.ignored_bytes += self.pending.len() as u64;
            self.pending.clear();
        }

        Ok(Committed {
            bytes,
            groups,
            terminated,
        })
    }

    /// Bytes held back waiting for the rest of their group
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Free space before the capacity bound is hit
    pub fn room(&self) -> usize {
        self.capacity.saturating_sub(self.pending.len())
    }

    /// Drop the incomplete tail, returning how many bytes were lost
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    pub fn header(&self) -> Option<&StreamHeader> {
        self.header.as_ref()
    }

    pub fn groups(&self) -> u64 {
        self.groups
    }

    pub fn largest_group(&self) -> u32 {
        self.largest_group
    }

    /// Bytes that arrived after the sentinel
    pub fn ignored_bytes(&self) -> u64 {
        self.ignored_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::framing::GroupBuilder;
    use crate::strings::{NamespacedName, StringHandle};
    use crate::types::events::{CreateInstance, Event, SetPropertyValue, StringHandleEvent};
    use proptest::prelude::*;

    const CAPACITY: usize = 64 * 1024;

    fn group(events: &[Event]) -> Bytes {
        let mut builder = GroupBuilder::new(&EventGroup::default());
        for event in events {
            builder.push(event);
        }
        builder.finish().unwrap()
    }

    /// Header, `count` groups of varying size, sentinel
    fn sample_stream(count: u32) -> Vec<u8> {
        let mut out = StreamHeader::default().to_bytes().to_vec();
        for i in 0..count {
            let event = match i % 3 {
                0 => Event::StringHandleEvent(StringHandleEvent {
                    string: format!("name-{}", i).as_str().into(),
                    handle: StringHandle(i + 1),
                }),
                1 => Event::CreateInstance(CreateInstance {
                    class: NamespacedName::new(1, 2),
                    instance_id: u64::from(i),
                }),
                _ => Event::SetPropertyValue(SetPropertyValue {
                    instance_id: u64::from(i),
                    num_items: i,
                    data: Bytes::from(vec![i as u8; i as usize * 7]),
                    ..SetPropertyValue::default()
                }),
            };
            out.extend_from_slice(&group(&[event]));
        }
        out.extend_from_slice(&EventGroup::sentinel().to_bytes());
        out
    }

    fn feed_in_chunks(data: &[u8], cuts: &[usize]) -> (Vec<u8>, u64, bool) {
        let mut resync = ResyncBuffer::new(CAPACITY);
        let mut out = Vec::new();
        let mut terminated = false;
        let mut start = 0;

        let mut bounds: Vec<usize> = cuts.iter().map(|c| c % (data.len() + 1)).collect();
        bounds.sort_unstable();
        bounds.push(data.len());

        for end in bounds {
            let committed = resync.feed(&data[start..end]).unwrap();
            out.extend_from_slice(&committed.bytes);
            terminated |= committed.terminated;
            start = end;
        }
        (out, resync.groups(), terminated)
    }

    #[test]
    fn test_single_chunk_commits_everything() {
        let data = sample_stream(5);
        let mut resync = ResyncBuffer::new(CAPACITY);
        let committed = resync.feed(&data).unwrap();

        assert_eq!(&committed.bytes[..], &data[..]);
        assert_eq!(committed.groups, 5);
        assert!(committed.terminated);
        assert_eq!(resync.pending(), 0);
    }

    #[test]
    fn test_short_header_waits() {
        let data = sample_stream(1);
        let mut resync = ResyncBuffer::new(CAPACITY);

        let committed = resync.feed(&data[..10]).unwrap();
        assert!(committed.bytes.is_empty());
        assert_eq!(resync.state(), FramerState::AwaitingHeader);
        assert_eq!(resync.pending(), 10);
    }

    #[test]
    fn test_incomplete_group_rewinds_to_its_header() {
        let data = sample_stream(2);
        let first_group_end = StreamHeader::SIZE + group_len(&data, StreamHeader::SIZE);

        let mut resync = ResyncBuffer::new(CAPACITY);
        // stream header, first group and part of the second group's payload
        let cut = first_group_end + EventGroup::SIZE + 3;
        let committed = resync.feed(&data[..cut]).unwrap();

        assert_eq!(committed.bytes.len(), first_group_end);
        assert_eq!(committed.groups, 1);
        assert_eq!(resync.pending(), EventGroup::SIZE + 3);

        let committed = resync.feed(&data[cut..]).unwrap();
        assert_eq!(committed.groups, 1);
        assert!(committed.terminated);
        assert_eq!(committed.bytes.len(), data.len() - first_group_end);
    }

    fn group_len(data: &[u8], at: usize) -> usize {
        let header = EventGroup::parse(&data[at..]).unwrap();
        EventGroup::SIZE + header.data_size as usize
    }

    #[test]
    fn test_bytes_after_sentinel_are_ignored() {
        let mut data = sample_stream(1);
        let len = data.len();
        data.extend_from_slice(b"extra");

        let mut resync = ResyncBuffer::new(CAPACITY);
        let committed = resync.feed(&data).unwrap();
        assert_eq!(committed.bytes.len(), len);
        assert_eq!(resync.ignored_bytes(), 5);

        let committed = resync.feed(b"more").unwrap();
        assert!(committed.bytes.is_empty());
        assert_eq!(resync.ignored_bytes(), 9);
    }

    #[test]
    fn test_bad_stream_id_is_fatal() {
        let mut data = sample_stream(1);
        data[0] = 0;
        let mut resync = ResyncBuffer::new(CAPACITY);
        assert!(matches!(
            resync.feed(&data),
            Err(ProtocolError::StreamIdMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_first_tag_is_fatal() {
        let mut data = sample_stream(1);
        data[StreamHeader::SIZE + EventGroup::SIZE] = 99;
        let mut resync = ResyncBuffer::new(CAPACITY);
        assert!(matches!(
            resync.feed(&data),
            Err(ProtocolError::UnknownEventTag(99))
        ));
    }

    #[test]
    fn test_group_larger_than_buffer() {
        let big = group(&[Event::SetPropertyValue(SetPropertyValue {
            data: Bytes::from(vec![0u8; 2048]),
            ..SetPropertyValue::default()
        })]);
        let mut data = StreamHeader::default().to_bytes().to_vec();
        data.extend_from_slice(&big[..512]);

        let mut resync = ResyncBuffer::new(1024);
        assert!(matches!(
            resync.feed(&data),
            Err(ProtocolError::GroupExceedsBuffer {
                capacity: 1024,
                ..
            })
        ));
    }

    #[test]
    fn test_discard_pending() {
        let data = sample_stream(3);
        let mut resync = ResyncBuffer::new(CAPACITY);
        resync.feed(&data[..data.len() - 30]).unwrap();

        let pending = resync.pending();
        assert!(pending > 0);
        assert_eq!(resync.discard_pending(), pending);
        assert_eq!(resync.pending(), 0);
    }

    #[test]
    fn test_largest_group_is_tracked() {
        let data = sample_stream(6);
        let mut resync = ResyncBuffer::new(CAPACITY);
        resync.feed(&data).unwrap();

        // group 5 carries the biggest data block
        assert!(resync.largest_group() as usize > 5 * 7);
        assert_eq!(resync.groups(), 6);
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_committed_bytes(
            count in 0u32..12,
            cuts in proptest::collection::vec(any::<usize>(), 0..24),
        ) {
            let data = sample_stream(count);
            let (whole, whole_groups, _) = feed_in_chunks(&data, &[]);
            let (chunked, chunked_groups, terminated) = feed_in_chunks(&data, &cuts);

            prop_assert_eq!(&whole, &data);
            prop_assert_eq!(&chunked, &data);
            prop_assert_eq!(whole_groups, u64::from(count));
            prop_assert_eq!(chunked_groups, u64::from(count));
            prop_assert!(terminated);
        }
    }
}
