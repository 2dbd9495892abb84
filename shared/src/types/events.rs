//! PVD comm-stream event definitions
//!
//! The event set is closed: every event starts with a one-byte [`EventKind`]
//! tag followed by the fields of that kind, laid out as declared below.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::protocol::error::{ProtocolError, Result};
use crate::protocol::wire::{wire_record, Color, PvdString, Vec3, Wire};
use crate::strings::{NamespacedName, StringHandle};

/// Opaque 64-bit id of an object in the traced scene
pub type InstanceId = u64;

/// One-byte event type tag. Tag 0 is reserved as "unknown".
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    StringHandleEvent = 1,
    CreateClass,
    DeriveClass,
    CreateProperty,
    CreatePropertyMessage,
    CreateInstance,
    SetPropertyValue,
    BeginSetPropertyValue,
    AppendPropertyValueData,
    EndSetPropertyValue,
    SetPropertyMessage,
    BeginPropertyMessageGroup,
    SendPropertyMessageFromGroup,
    EndPropertyMessageGroup,
    DestroyInstance,
    PushBackObjectRef,
    RemoveObjectRef,
    BeginSection,
    EndSection,
    SetPickable,
    SetColor,
    SetIsTopLevel,
    SetCamera,
    AddProfileZone,
    AddProfileZoneEvent,
    StreamEndEvent,
    ErrorMessage,
    OriginShift,
}

impl EventKind {
    /// Every kind, in tag order
    pub const ALL: [EventKind; 28] = [
        EventKind::StringHandleEvent,
        EventKind::CreateClass,
        EventKind::DeriveClass,
        EventKind::CreateProperty,
        EventKind::CreatePropertyMessage,
        EventKind::CreateInstance,
        EventKind::SetPropertyValue,
        EventKind::BeginSetPropertyValue,
        EventKind::AppendPropertyValueData,
        EventKind::EndSetPropertyValue,
        EventKind::SetPropertyMessage,
        EventKind::BeginPropertyMessageGroup,
        EventKind::SendPropertyMessageFromGroup,
        EventKind::EndPropertyMessageGroup,
        EventKind::DestroyInstance,
        EventKind::PushBackObjectRef,
        EventKind::RemoveObjectRef,
        EventKind::BeginSection,
        EventKind::EndSection,
        EventKind::SetPickable,
        EventKind::SetColor,
        EventKind::SetIsTopLevel,
        EventKind::SetCamera,
        EventKind::AddProfileZone,
        EventKind::AddProfileZoneEvent,
        EventKind::StreamEndEvent,
        EventKind::ErrorMessage,
        EventKind::OriginShift,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::StringHandleEvent => "StringHandleEvent",
            EventKind::CreateClass => "CreateClass",
            EventKind::DeriveClass => "DeriveClass",
            EventKind::CreateProperty => "CreateProperty",
            EventKind::CreatePropertyMessage => "CreatePropertyMessage",
            EventKind::CreateInstance => "CreateInstance",
            EventKind::SetPropertyValue => "SetPropertyValue",
            EventKind::BeginSetPropertyValue => "BeginSetPropertyValue",
            EventKind::AppendPropertyValueData => "AppendPropertyValueData",
            EventKind::EndSetPropertyValue => "EndSetPropertyValue",
            EventKind::SetPropertyMessage => "SetPropertyMessage",
            EventKind::BeginPropertyMessageGroup => "BeginPropertyMessageGroup",
            EventKind::SendPropertyMessageFromGroup => "SendPropertyMessageFromGroup",
            EventKind::EndPropertyMessageGroup => "EndPropertyMessageGroup",
            EventKind::DestroyInstance => "DestroyInstance",
            EventKind::PushBackObjectRef => "PushBackObjectRef",
            EventKind::RemoveObjectRef => "RemoveObjectRef",
            EventKind::BeginSection => "BeginSection",
            EventKind::EndSection => "EndSection",
            EventKind::SetPickable => "SetPickable",
            EventKind::SetColor => "SetColor",
            EventKind::SetIsTopLevel => "SetIsTopLevel",
            EventKind::SetCamera => "SetCamera",
            EventKind::AddProfileZone => "AddProfileZone",
            EventKind::AddProfileZoneEvent => "AddProfileZoneEvent",
            EventKind::StreamEndEvent => "StreamEndEvent",
            EventKind::ErrorMessage => "ErrorMessage",
            EventKind::OriginShift => "OriginShift",
        }
    }
}

impl TryFrom<u8> for EventKind {
    type Error = ProtocolError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            1..=28 => Ok(EventKind::ALL[usize::from(tag) - 1]),
            _ => Err(ProtocolError::UnknownEventTag(tag)),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Sub-records
// ---------------------------------------------------------------------------

wire_record! {
    /// Named value of an enumeration-style property
    pub struct NameHandleValue {
        pub name: StringHandle,
        pub value: u32,
    }
}

wire_record! {
    /// One field of a property message layout
    pub struct PropMessageArg {
        pub property_name: StringHandle,
        pub datatype: NamespacedName,
        pub message_offset: u32,
        pub byte_size: u32,
    }
}

// ---------------------------------------------------------------------------
// Identifier registration and class metadata
// ---------------------------------------------------------------------------

wire_record! {
    pub struct StringHandleEvent {
        pub string: PvdString,
        pub handle: StringHandle,
    }
}

wire_record! {
    pub struct CreateClass {
        pub name: NamespacedName,
    }
}

wire_record! {
    pub struct DeriveClass {
        pub parent: NamespacedName,
        pub child: NamespacedName,
    }
}

wire_record! {
    pub struct CreateProperty {
        pub class: NamespacedName,
        pub name: StringHandle,
        /// Null handle when the property has no semantic
        pub semantic: StringHandle,
        pub datatype: NamespacedName,
        /// Upstream property type enum, kept as the raw byte
        pub property_type: u8,
        pub values: Vec<NameHandleValue>,
    }
}

wire_record! {
    pub struct CreatePropertyMessage {
        pub class: NamespacedName,
        pub message_name: NamespacedName,
        pub entries: Vec<PropMessageArg>,
        pub message_byte_size: u32,
    }
}

// ---------------------------------------------------------------------------
// Instance lifecycle
// ---------------------------------------------------------------------------

wire_record! {
    pub struct CreateInstance {
        pub class: NamespacedName,
        pub instance_id: InstanceId,
    }
}

wire_record! {
    pub struct DestroyInstance {
        pub instance_id: InstanceId,
    }
}

// ---------------------------------------------------------------------------
// Property values
// ---------------------------------------------------------------------------

wire_record! {
    pub struct SetPropertyValue {
        pub instance_id: InstanceId,
        pub property_name: StringHandle,
        pub incoming_type: NamespacedName,
        pub num_items: u32,
        pub data: Bytes,
    }
}

wire_record! {
    /// Opens a streamed property value; `Append`/`End` do not repeat the instance
    pub struct BeginSetPropertyValue {
        pub instance_id: InstanceId,
        pub property_name: StringHandle,
        pub incoming_type: NamespacedName,
    }
}

wire_record! {
    pub struct AppendPropertyValueData {
        pub data: Bytes,
        pub num_items: u32,
    }
}

wire_record! {
    pub struct EndSetPropertyValue {}
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

wire_record! {
    pub struct SetPropertyMessage {
        pub instance_id: InstanceId,
        pub message_name: NamespacedName,
        pub data: Bytes,
    }
}

wire_record! {
    pub struct BeginPropertyMessageGroup {
        pub message_name: NamespacedName,
    }
}

wire_record! {
    pub struct SendPropertyMessageFromGroup {
        pub instance_id: InstanceId,
        pub data: Bytes,
    }
}

wire_record! {
    pub struct EndPropertyMessageGroup {}
}

// ---------------------------------------------------------------------------
// Object graph edges
// ---------------------------------------------------------------------------

wire_record! {
    pub struct PushBackObjectRef {
        pub instance_id: InstanceId,
        pub property: StringHandle,
        pub object_ref: InstanceId,
    }
}

wire_record! {
    pub struct RemoveObjectRef {
        pub instance_id: InstanceId,
        pub property: StringHandle,
        pub object_ref: InstanceId,
    }
}

// ---------------------------------------------------------------------------
// Scene, display and meta
// ---------------------------------------------------------------------------

wire_record! {
    pub struct BeginSection {
        pub section_id: u64,
        pub name: StringHandle,
        pub timestamp: u64,
    }
}

wire_record! {
    pub struct EndSection {
        pub section_id: u64,
        pub name: StringHandle,
        pub timestamp: u64,
    }
}

wire_record! {
    pub struct SetPickable {
        pub instance_id: InstanceId,
        pub pickable: bool,
    }
}

wire_record! {
    pub struct SetColor {
        pub instance_id: InstanceId,
        pub color: Color,
    }
}

wire_record! {
    pub struct SetIsTopLevel {
        pub instance_id: InstanceId,
        pub is_top_level: bool,
    }
}

wire_record! {
    pub struct SetCamera {
        pub name: PvdString,
        pub position: Vec3,
        pub up: Vec3,
        pub target: Vec3,
    }
}

wire_record! {
    pub struct AddProfileZone {
        pub instance_id: InstanceId,
        pub name: PvdString,
    }
}

wire_record! {
    pub struct AddProfileZoneEvent {
        pub instance_id: InstanceId,
        pub name: PvdString,
        pub event_id: u16,
        pub compile_time_enabled: bool,
    }
}

wire_record! {
    pub struct StreamEndEvent {
        pub name: PvdString,
    }
}

wire_record! {
    pub struct ErrorMessage {
        pub code: u32,
        pub message: PvdString,
        pub file: PvdString,
        pub line: u32,
    }
}

wire_record! {
    pub struct OriginShift {
        pub scene_id: u64,
        pub shift: Vec3,
    }
}

// ---------------------------------------------------------------------------
// Event sum type
// ---------------------------------------------------------------------------

/// One decoded comm-stream event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StringHandleEvent(StringHandleEvent),
    CreateClass(CreateClass),
    DeriveClass(DeriveClass),
    CreateProperty(CreateProperty),
    CreatePropertyMessage(CreatePropertyMessage),
    CreateInstance(CreateInstance),
    SetPropertyValue(SetPropertyValue),
    BeginSetPropertyValue(BeginSetPropertyValue),
    AppendPropertyValueData(AppendPropertyValueData),
    EndSetPropertyValue(EndSetPropertyValue),
    SetPropertyMessage(SetPropertyMessage),
    BeginPropertyMessageGroup(BeginPropertyMessageGroup),
    SendPropertyMessageFromGroup(SendPropertyMessageFromGroup),
    EndPropertyMessageGroup(EndPropertyMessageGroup),
    DestroyInstance(DestroyInstance),
    PushBackObjectRef(PushBackObjectRef),
    RemoveObjectRef(RemoveObjectRef),
    BeginSection(BeginSection),
    EndSection(EndSection),
    SetPickable(SetPickable),
    SetColor(SetColor),
    SetIsTopLevel(SetIsTopLevel),
    SetCamera(SetCamera),
    AddProfileZone(AddProfileZone),
    AddProfileZoneEvent(AddProfileZoneEvent),
    StreamEndEvent(StreamEndEvent),
    ErrorMessage(ErrorMessage),
    OriginShift(OriginShift),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::StringHandleEvent(_) => EventKind::StringHandleEvent,
            Event::CreateClass(_) => EventKind::CreateClass,
            Event::DeriveClass(_) => EventKind::DeriveClass,
            Event::CreateProperty(_) => EventKind::CreateProperty,
            Event::CreatePropertyMessage(_) => EventKind::CreatePropertyMessage,
            Event::CreateInstance(_) => EventKind::CreateInstance,
            Event::SetPropertyValue(_) => EventKind::SetPropertyValue,
            Event::BeginSetPropertyValue(_) => EventKind::BeginSetPropertyValue,
            Event::AppendPropertyValueData(_) => EventKind::AppendPropertyValueData,
            Event::EndSetPropertyValue(_) => EventKind::EndSetPropertyValue,
            Event::SetPropertyMessage(_) => EventKind::SetPropertyMessage,
            Event::BeginPropertyMessageGroup(_) => EventKind::BeginPropertyMessageGroup,
            Event::SendPropertyMessageFromGroup(_) => EventKind::SendPropertyMessageFromGroup,
            Event::EndPropertyMessageGroup(_) => EventKind::EndPropertyMessageGroup,
            Event::DestroyInstance(_) => EventKind::DestroyInstance,
            Event::PushBackObjectRef(_) => EventKind::PushBackObjectRef,
            Event::RemoveObjectRef(_) => EventKind::RemoveObjectRef,
            Event::BeginSection(_) => EventKind::BeginSection,
            Event::EndSection(_) => EventKind::EndSection,
            Event::SetPickable(_) => EventKind::SetPickable,
            Event::SetColor(_) => EventKind::SetColor,
            Event::SetIsTopLevel(_) => EventKind::SetIsTopLevel,
            Event::SetCamera(_) => EventKind::SetCamera,
            Event::AddProfileZone(_) => EventKind::AddProfileZone,
            Event::AddProfileZoneEvent(_) => EventKind::AddProfileZoneEvent,
            Event::StreamEndEvent(_) => EventKind::StreamEndEvent,
            Event::ErrorMessage(_) => EventKind::ErrorMessage,
            Event::OriginShift(_) => EventKind::OriginShift,
        }
    }

    /// Decode the body of an event whose tag has already been read
    pub fn decode_body(kind: EventKind, src: &mut Bytes) -> Result<Self> {
        Ok(match kind {
            EventKind::StringHandleEvent => Event::StringHandleEvent(Wire::decode(src)?),
            EventKind::CreateClass => Event::CreateClass(Wire::decode(src)?),
            EventKind::DeriveClass => Event::DeriveClass(Wire::decode(src)?),
            EventKind::CreateProperty => Event::CreateProperty(Wire::decode(src)?),
            EventKind::CreatePropertyMessage => Event::CreatePropertyMessage(Wire::decode(src)?),
            EventKind::CreateInstance => Event::CreateInstance(Wire::decode(src)?),
            EventKind::SetPropertyValue => Event::SetPropertyValue(Wire::decode(src)?),
            EventKind::BeginSetPropertyValue => Event::BeginSetPropertyValue(Wire::decode(src)?),
            EventKind::AppendPropertyValueData => {
                Event::AppendPropertyValueData(Wire::decode(src)?)
            }
            EventKind::EndSetPropertyValue => Event::EndSetPropertyValue(Wire::decode(src)?),
            EventKind::SetPropertyMessage => Event::SetPropertyMessage(Wire::decode(src)?),
            EventKind::BeginPropertyMessageGroup => {
                Event::BeginPropertyMessageGroup(Wire::decode(src)?)
            }
            EventKind::SendPropertyMessageFromGroup => {
                Event::SendPropertyMessageFromGroup(Wire::decode(src)?)
            }
            EventKind::EndPropertyMessageGroup => {
                Event::EndPropertyMessageGroup(Wire::decode(src)?)
            }
            EventKind::DestroyInstance => Event::DestroyInstance(Wire::decode(src)?),
            EventKind::PushBackObjectRef => Event::PushBackObjectRef(Wire::decode(src)?),
            EventKind::RemoveObjectRef => Event::RemoveObjectRef(Wire::decode(src)?),
            EventKind::BeginSection => Event::BeginSection(Wire::decode(src)?),
            EventKind::EndSection => Event::EndSection(Wire::decode(src)?),
            EventKind::SetPickable => Event::SetPickable(Wire::decode(src)?),
            EventKind::SetColor => Event::SetColor(Wire::decode(src)?),
            EventKind::SetIsTopLevel => Event::SetIsTopLevel(Wire::decode(src)?),
            EventKind::SetCamera => Event::SetCamera(Wire::decode(src)?),
            EventKind::AddProfileZone => Event::AddProfileZone(Wire::decode(src)?),
            EventKind::AddProfileZoneEvent => Event::AddProfileZoneEvent(Wire::decode(src)?),
            EventKind::StreamEndEvent => Event::StreamEndEvent(Wire::decode(src)?),
            EventKind::ErrorMessage => Event::ErrorMessage(Wire::decode(src)?),
            EventKind::OriginShift => Event::OriginShift(Wire::decode(src)?),
        })
    }

    fn encode_body(&self, dst: &mut BytesMut) {
        match self {
            Event::StringHandleEvent(e) => e.encode(dst),
            Event::CreateClass(e) => e.encode(dst),
            Event::DeriveClass(e) => e.encode(dst),
            Event::CreateProperty(e) => e.encode(dst),
            Event::CreatePropertyMessage(e) => e.encode(dst),
            Event::CreateInstance(e) => e.encode(dst),
            Event::SetPropertyValue(e) => e.encode(dst),
            Event::BeginSetPropertyValue(e) => e.encode(dst),
            Event::AppendPropertyValueData(e) => e.encode(dst),
            Event::EndSetPropertyValue(e) => e.encode(dst),
            Event::SetPropertyMessage(e) => e.encode(dst),
            Event::BeginPropertyMessageGroup(e) => e.encode(dst),
            Event::SendPropertyMessageFromGroup(e) => e.encode(dst),
            Event::EndPropertyMessageGroup(e) => e.encode(dst),
            Event::DestroyInstance(e) => e.encode(dst),
            Event::PushBackObjectRef(e) => e.encode(dst),
            Event::RemoveObjectRef(e) => e.encode(dst),
            Event::BeginSection(e) => e.encode(dst),
            Event::EndSection(e) => e.encode(dst),
            Event::SetPickable(e) => e.encode(dst),
            Event::SetColor(e) => e.encode(dst),
            Event::SetIsTopLevel(e) => e.encode(dst),
            Event::SetCamera(e) => e.encode(dst),
            Event::AddProfileZone(e) => e.encode(dst),
            Event::AddProfileZoneEvent(e) => e.encode(dst),
            Event::StreamEndEvent(e) => e.encode(dst),
            Event::ErrorMessage(e) => e.encode(dst),
            Event::OriginShift(e) => e.encode(dst),
        }
    }

    /// Encode to a standalone buffer (tag + body)
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::new();
        self.encode(&mut dst);
        dst.freeze()
    }
}

/// Tag byte followed by the kind's fields
impl Wire for Event {
    fn decode(src: &mut Bytes) -> Result<Self> {
        let kind = EventKind::try_from(u8::decode(src)?)?;
        Event::decode_body(kind, src)
    }

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.kind().tag());
        self.encode_body(dst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_follow_declaration_order() {
        for (index, kind) in EventKind::ALL.iter().enumerate() {
            assert_eq!(kind.tag() as usize, index + 1);
            assert_eq!(EventKind::try_from(kind.tag()).unwrap(), *kind);
        }
        assert_eq!(EventKind::StringHandleEvent.tag(), 1);
        assert_eq!(EventKind::OriginShift.tag(), 28);
    }

    #[test]
    fn test_unknown_tags_are_rejected() {
        for tag in [0u8, 29, 200, 255] {
            assert!(matches!(
                EventKind::try_from(tag),
                Err(ProtocolError::UnknownEventTag(t)) if t == tag
            ));
        }
    }

    #[test]
    fn test_create_instance_layout() {
        let event = Event::CreateInstance(CreateInstance {
            class: NamespacedName::new(3, 4),
            instance_id: 0x1122_3344_5566_7788,
        });
        let bytes = event.to_bytes();

        // tag, namespace handle, name handle, instance id
        assert_eq!(bytes.len(), 1 + 4 + 4 + 8);
        assert_eq!(bytes[0], EventKind::CreateInstance.tag());
        assert_eq!(&bytes[1..5], &3u32.to_le_bytes());
        assert_eq!(&bytes[5..9], &4u32.to_le_bytes());
        assert_eq!(&bytes[9..17], &0x1122_3344_5566_7788u64.to_le_bytes());
    }

    #[test]
    fn test_set_property_value_layout() {
        let event = Event::SetPropertyValue(SetPropertyValue {
            instance_id: 1,
            property_name: StringHandle(5),
            incoming_type: NamespacedName::new(6, 7),
            num_items: 1,
            data: Bytes::from_static(&[9, 0, 0, 0]),
        });
        let bytes = event.to_bytes();

        assert_eq!(bytes.len(), 1 + 8 + 4 + 8 + 4 + 4 + 4);
        // count prefix of the data block sits right before the data
        assert_eq!(&bytes[25..29], &4u32.to_le_bytes());
        assert_eq!(&bytes[29..], &[9, 0, 0, 0]);
    }

    #[test]
    fn test_empty_bodies() {
        let bytes = Event::EndSetPropertyValue(EndSetPropertyValue {}).to_bytes();
        assert_eq!(&bytes[..], &[EventKind::EndSetPropertyValue.tag()]);

        let mut src = bytes.clone();
        assert_eq!(
            Event::decode(&mut src).unwrap(),
            Event::EndSetPropertyValue(EndSetPropertyValue {})
        );
    }

    #[test]
    fn test_truncated_body() {
        let bytes = Event::DestroyInstance(DestroyInstance { instance_id: 42 }).to_bytes();
        let mut src = bytes.slice(..5);
        assert!(matches!(
            Event::decode(&mut src),
            Err(ProtocolError::Truncated { .. })
        ));
    }

    #[test]
    fn test_nested_records_round_trip() {
        let event = Event::CreatePropertyMessage(CreatePropertyMessage {
            class: NamespacedName::new(1, 2),
            message_name: NamespacedName::new(1, 3),
            entries: vec![
                PropMessageArg {
                    property_name: StringHandle(4),
                    datatype: NamespacedName::new(1, 5),
                    message_offset: 0,
                    byte_size: 4,
                },
                PropMessageArg {
                    property_name: StringHandle(6),
                    datatype: NamespacedName::new(1, 5),
                    message_offset: 4,
                    byte_size: 4,
                },
            ],
            message_byte_size: 8,
        });
        let mut src = event.to_bytes();
        assert_eq!(Event::decode(&mut src).unwrap(), event);
        assert!(src.is_empty());
    }
}
