//! Wire primitives for the PVD comm-stream.
//!
//! All scalars are little-endian: the format has no byte-order negotiation
//! and this decoder only pairs with little-endian producers (a stream header
//! announcing big-endian data is rejected, see `framing`). Variable-length
//! fields carry a `u32` count prefix followed by raw bytes or by records
//! encoded with the same rules.
//!
//! Each record type declares its field layout once with [`wire_record!`];
//! `decode` and `encode` are both generated from that one list, so the two
//! directions cannot drift apart.

use std::borrow::Cow;
use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::error::{ProtocolError, Result};
use crate::strings::{NamespacedName, StringHandle};

/// Largest string or byte block a count prefix may announce (64 MiB)
pub const MAX_FIELD_LEN: usize = 64 * 1024 * 1024;

/// Largest record array a count prefix may announce
pub const MAX_ARRAY_LEN: usize = 1 << 20;

/// A value with a fixed little-endian wire layout
pub trait Wire: Sized {
    /// Decode one value from the front of `src`, advancing it
    fn decode(src: &mut Bytes) -> Result<Self>;

    /// Append the encoded value to `dst`
    fn encode(&self, dst: &mut BytesMut);
}

/// Fail with `Truncated` unless `src` holds at least `needed` bytes
pub fn ensure_remaining(src: &impl Buf, needed: usize) -> Result<()> {
    let available = src.remaining();
    if available < needed {
        return Err(ProtocolError::Truncated { needed, available });
    }
    Ok(())
}

/// Read a `u32` count prefix and check it against `max`
pub fn read_count(src: &mut Bytes, max: usize) -> Result<usize> {
    let len = u32::decode(src)? as usize;
    if len > max {
        return Err(ProtocolError::FieldTooLarge { len, max });
    }
    Ok(len)
}

fn put_count(dst: &mut BytesMut, len: usize) {
    debug_assert!(len <= u32::MAX as usize);
    dst.put_u32_le(len as u32);
}

macro_rules! wire_scalar {
    ($ty:ty, $get:ident, $put:ident) => {
        impl Wire for $ty {
            fn decode(src: &mut Bytes) -> Result<Self> {
                ensure_remaining(src, std::mem::size_of::<$ty>())?;
                Ok(src.$get())
            }

            fn encode(&self, dst: &mut BytesMut) {
                dst.$put(*self);
            }
        }
    };
}

wire_scalar!(u8, get_u8, put_u8);
wire_scalar!(u16, get_u16_le, put_u16_le);
wire_scalar!(u32, get_u32_le, put_u32_le);
wire_scalar!(u64, get_u64_le, put_u64_le);
wire_scalar!(f32, get_f32_le, put_f32_le);

/// Any non-zero byte decodes as `true`, which always encodes back as `1`.
/// Producers only ever write `0` or `1`.
impl Wire for bool {
    fn decode(src: &mut Bytes) -> Result<Self> {
        Ok(u8::decode(src)? != 0)
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(*self));
    }
}

impl Wire for StringHandle {
    fn decode(src: &mut Bytes) -> Result<Self> {
        Ok(StringHandle(u32::decode(src)?))
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.0.encode(dst);
    }
}

impl Wire for NamespacedName {
    fn decode(src: &mut Bytes) -> Result<Self> {
        Ok(NamespacedName {
            namespace: StringHandle::decode(src)?,
            name: StringHandle::decode(src)?,
        })
    }

    fn encode(&self, dst: &mut BytesMut) {
        self.namespace.encode(dst);
        self.name.encode(dst);
    }
}

/// Count-prefixed raw data block. Decoding slices the source buffer, no copy.
impl Wire for Bytes {
    fn decode(src: &mut Bytes) -> Result<Self> {
        let len = read_count(src, MAX_FIELD_LEN)?;
        ensure_remaining(src, len)?;
        Ok(src.split_to(len))
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_count(dst, self.len());
        dst.put_slice(self);
    }
}

/// Count-prefixed array of records
impl<T: Wire> Wire for Vec<T> {
    fn decode(src: &mut Bytes) -> Result<Self> {
        let count = read_count(src, MAX_ARRAY_LEN)?;
        // every record is at least one byte, so the remaining length bounds the allocation
        let mut items = Vec::with_capacity(count.min(src.remaining()));
        for _ in 0..count {
            items.push(T::decode(src)?);
        }
        Ok(items)
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_count(dst, self.len());
        for item in self {
            item.encode(dst);
        }
    }
}

/// Length-prefixed character data.
///
/// The prefix is authoritative and producers usually include a trailing NUL,
/// but one is not guaranteed. The raw bytes are kept verbatim so re-encoding
/// reproduces the input exactly; text accessors trim trailing NULs.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct PvdString(Bytes);

impl PvdString {
    /// Wrap raw wire bytes as-is
    pub fn from_raw(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Text content without trailing NULs, lossily decoded as UTF-8
    pub fn to_str_lossy(&self) -> Cow<'_, str> {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        String::from_utf8_lossy(&self.0[..end])
    }

    pub fn is_empty(&self) -> bool {
        self.to_str_lossy().is_empty()
    }
}

/// Builds a string the way producers send one: text plus a NUL terminator
impl From<&str> for PvdString {
    fn from(s: &str) -> Self {
        let mut raw = BytesMut::with_capacity(s.len() + 1);
        raw.put_slice(s.as_bytes());
        raw.put_u8(0);
        Self(raw.freeze())
    }
}

impl PartialEq<str> for PvdString {
    fn eq(&self, other: &str) -> bool {
        self.to_str_lossy() == other
    }
}

impl PartialEq<&str> for PvdString {
    fn eq(&self, other: &&str) -> bool {
        self.to_str_lossy() == *other
    }
}

impl fmt::Display for PvdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str_lossy())
    }
}

impl fmt::Debug for PvdString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.to_str_lossy())
    }
}

impl Wire for PvdString {
    fn decode(src: &mut Bytes) -> Result<Self> {
        let len = read_count(src, MAX_FIELD_LEN)?;
        ensure_remaining(src, len)?;
        Ok(Self(src.split_to(len)))
    }

    fn encode(&self, dst: &mut BytesMut) {
        put_count(dst, self.0.len());
        dst.put_slice(&self.0);
    }
}

/// Declare a wire record: a struct whose fields are encoded back to back in
/// declaration order.
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::protocol::wire::Wire for $name {
            #[allow(unused_variables)]
            fn decode(src: &mut ::bytes::Bytes) -> $crate::protocol::error::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::protocol::wire::Wire>::decode(src)?, )*
                })
            }

            #[allow(unused_variables)]
            fn encode(&self, dst: &mut ::bytes::BytesMut) {
                $( $crate::protocol::wire::Wire::encode(&self.$field, dst); )*
            }
        }
    };
}

pub(crate) use wire_record;

wire_record! {
    /// RGBA colour, one byte per channel
    pub struct Color {
        pub r: u8,
        pub g: u8,
        pub b: u8,
        pub a: u8,
    }
}

wire_record! {
    pub struct Vec3 {
        pub x: f32,
        pub y: f32,
        pub z: f32,
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ {}, {}, {} }}", self.x, self.y, self.z)
    }
}
