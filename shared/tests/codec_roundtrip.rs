//! Property tests for the event codec.
//!
//! Every event kind must decode back to the value it was encoded from,
//! including zero-length strings, data blocks and arrays.

use bytes::{Bytes, BytesMut};
use openpvd_shared::protocol::{Color, PvdString, Vec3, Wire};
use openpvd_shared::types::events::*;
use openpvd_shared::{NamespacedName, StringHandle};
use proptest::prelude::*;
use proptest::strategy::{BoxedStrategy, Union};

fn handle() -> impl Strategy<Value = StringHandle> {
    any::<u32>().prop_map(StringHandle)
}

fn nn() -> impl Strategy<Value = NamespacedName> {
    (any::<u32>(), any::<u32>()).prop_map(|(ns, name)| NamespacedName::new(ns, name))
}

fn text() -> impl Strategy<Value = PvdString> {
    proptest::collection::vec(any::<u8>(), 0..32).prop_map(PvdString::from_raw)
}

fn data() -> impl Strategy<Value = Bytes> {
    proptest::collection::vec(any::<u8>(), 0..64).prop_map(Bytes::from)
}

fn vec3() -> impl Strategy<Value = Vec3> {
    (-1.0e6f32..1.0e6, -1.0e6f32..1.0e6, -1.0e6f32..1.0e6).prop_map(|(x, y, z)| Vec3 { x, y, z })
}

fn color() -> impl Strategy<Value = Color> {
    any::<[u8; 4]>().prop_map(|[r, g, b, a]| Color { r, g, b, a })
}

fn section() -> impl Strategy<Value = (u64, StringHandle, u64)> {
    (any::<u64>(), handle(), any::<u64>())
}

fn object_ref() -> impl Strategy<Value = (u64, StringHandle, u64)> {
    (any::<u64>(), handle(), any::<u64>())
}

fn any_event() -> impl Strategy<Value = Event> {
    let kinds: Vec<BoxedStrategy<Event>> = vec![
        (text(), handle())
            .prop_map(|(string, handle)| {
                Event::StringHandleEvent(StringHandleEvent { string, handle })
            })
            .boxed(),
        nn().prop_map(|name| Event::CreateClass(CreateClass { name })).boxed(),
        (nn(), nn())
            .prop_map(|(parent, child)| Event::DeriveClass(DeriveClass { parent, child }))
            .boxed(),
        (
            nn(),
            handle(),
            handle(),
            nn(),
            any::<u8>(),
            proptest::collection::vec(
                (handle(), any::<u32>()).prop_map(|(name, value)| NameHandleValue { name, value }),
                0..4,
            ),
        )
            .prop_map(|(class, name, semantic, datatype, property_type, values)| {
                Event::CreateProperty(CreateProperty {
                    class,
                    name,
                    semantic,
                    datatype,
                    property_type,
                    values,
                })
            })
            .boxed(),
        (
            nn(),
            nn(),
            proptest::collection::vec(
                (handle(), nn(), any::<u32>(), any::<u32>()).prop_map(
                    |(property_name, datatype, message_offset, byte_size)| PropMessageArg {
                        property_name,
                        datatype,
                        message_offset,
                        byte_size,
                    },
                ),
                0..4,
            ),
            any::<u32>(),
        )
            .prop_map(|(class, message_name, entries, message_byte_size)| {
                Event::CreatePropertyMessage(CreatePropertyMessage {
                    class,
                    message_name,
                    entries,
                    message_byte_size,
                })
            })
            .boxed(),
        (nn(), any::<u64>())
            .prop_map(|(class, instance_id)| {
                Event::CreateInstance(CreateInstance { class, instance_id })
            })
            .boxed(),
        (any::<u64>(), handle(), nn(), any::<u32>(), data())
            .prop_map(
                |(instance_id, property_name, incoming_type, num_items, data)| {
                    Event::SetPropertyValue(SetPropertyValue {
                        instance_id,
                        property_name,
                        incoming_type,
                        num_items,
                        data,
                    })
                },
            )
            .boxed(),
        (any::<u64>(), handle(), nn())
            .prop_map(|(instance_id, property_name, incoming_type)| {
                Event::BeginSetPropertyValue(BeginSetPropertyValue {
                    instance_id,
                    property_name,
                    incoming_type,
                })
            })
            .boxed(),
        (data(), any::<u32>())
            .prop_map(|(data, num_items)| {
                Event::AppendPropertyValueData(AppendPropertyValueData { data, num_items })
            })
            .boxed(),
        Just(Event::EndSetPropertyValue(EndSetPropertyValue {})).boxed(),
        (any::<u64>(), nn(), data())
            .prop_map(|(instance_id, message_name, data)| {
                Event::SetPropertyMessage(SetPropertyMessage {
                    instance_id,
                    message_name,
                    data,
                })
            })
            .boxed(),
        nn().prop_map(|message_name| {
            Event::BeginPropertyMessageGroup(BeginPropertyMessageGroup { message_name })
        })
        .boxed(),
        (any::<u64>(), data())
            .prop_map(|(instance_id, data)| {
                Event::SendPropertyMessageFromGroup(SendPropertyMessageFromGroup {
                    instance_id,
                    data,
                })
            })
            .boxed(),
        Just(Event::EndPropertyMessageGroup(EndPropertyMessageGroup {})).boxed(),
        any::<u64>()
            .prop_map(|instance_id| Event::DestroyInstance(DestroyInstance { instance_id }))
            .boxed(),
        object_ref()
            .prop_map(|(instance_id, property, object_ref)| {
                Event::PushBackObjectRef(PushBackObjectRef {
                    instance_id,
                    property,
                    object_ref,
                })
            })
            .boxed(),
        object_ref()
            .prop_map(|(instance_id, property, object_ref)| {
                Event::RemoveObjectRef(RemoveObjectRef {
                    instance_id,
                    property,
                    object_ref,
                })
            })
            .boxed(),
        section()
            .prop_map(|(section_id, name, timestamp)| {
                Event::BeginSection(BeginSection {
                    section_id,
                    name,
                    timestamp,
                })
            })
            .boxed(),
        section()
            .prop_map(|(section_id, name, timestamp)| {
                Event::EndSection(EndSection {
                    section_id,
                    name,
                    timestamp,
                })
            })
            .boxed(),
        (any::<u64>(), any::<bool>())
            .prop_map(|(instance_id, pickable)| {
                Event::SetPickable(SetPickable {
                    instance_id,
                    pickable,
                })
            })
            .boxed(),
        (any::<u64>(), color())
            .prop_map(|(instance_id, color)| Event::SetColor(SetColor { instance_id, color }))
            .boxed(),
        (any::<u64>(), any::<bool>())
            .prop_map(|(instance_id, is_top_level)| {
                Event::SetIsTopLevel(SetIsTopLevel {
                    instance_id,
                    is_top_level,
                })
            })
            .boxed(),
        (text(), vec3(), vec3(), vec3())
            .prop_map(|(name, position, up, target)| {
                Event::SetCamera(SetCamera {
                    name,
                    position,
                    up,
                    target,
                })
            })
            .boxed(),
        (any::<u64>(), text())
            .prop_map(|(instance_id, name)| {
                Event::AddProfileZone(AddProfileZone { instance_id, name })
            })
            .boxed(),
        (any::<u64>(), text(), any::<u16>(), any::<bool>())
            .prop_map(|(instance_id, name, event_id, compile_time_enabled)| {
                Event::AddProfileZoneEvent(AddProfileZoneEvent {
                    instance_id,
                    name,
                    event_id,
                    compile_time_enabled,
                })
            })
            .boxed(),
        text()
            .prop_map(|name| Event::StreamEndEvent(StreamEndEvent { name }))
            .boxed(),
        (any::<u32>(), text(), text(), any::<u32>())
            .prop_map(|(code, message, file, line)| {
                Event::ErrorMessage(ErrorMessage {
                    code,
                    message,
                    file,
                    line,
                })
            })
            .boxed(),
        (any::<u64>(), vec3())
            .prop_map(|(scene_id, shift)| Event::OriginShift(OriginShift { scene_id, shift }))
            .boxed(),
    ];
    assert_eq!(kinds.len(), EventKind::ALL.len());
    Union::new(kinds)
}

/// The all-default value of each kind: zero ids, empty strings and arrays
fn empty_event(kind: EventKind) -> Event {
    match kind {
        EventKind::StringHandleEvent => Event::StringHandleEvent(Default::default()),
        EventKind::CreateClass => Event::CreateClass(Default::default()),
        EventKind::DeriveClass => Event::DeriveClass(Default::default()),
        EventKind::CreateProperty => Event::CreateProperty(Default::default()),
        EventKind::CreatePropertyMessage => Event::CreatePropertyMessage(Default::default()),
        EventKind::CreateInstance => Event::CreateInstance(Default::default()),
        EventKind::SetPropertyValue => Event::SetPropertyValue(Default::default()),
        EventKind::BeginSetPropertyValue => Event::BeginSetPropertyValue(Default::default()),
        EventKind::AppendPropertyValueData => Event::AppendPropertyValueData(Default::default()),
        EventKind::EndSetPropertyValue => Event::EndSetPropertyValue(Default::default()),
        EventKind::SetPropertyMessage => Event::SetPropertyMessage(Default::default()),
        EventKind::BeginPropertyMessageGroup => {
            Event::BeginPropertyMessageGroup(Default::default())
        }
        EventKind::SendPropertyMessageFromGroup => {
            Event::SendPropertyMessageFromGroup(Default::default())
        }
        EventKind::EndPropertyMessageGroup => Event::EndPropertyMessageGroup(Default::default()),
        EventKind::DestroyInstance => Event::DestroyInstance(Default::default()),
        EventKind::PushBackObjectRef => Event::PushBackObjectRef(Default::default()),
        EventKind::RemoveObjectRef => Event::RemoveObjectRef(Default::default()),
        EventKind::BeginSection => Event::BeginSection(Default::default()),
        EventKind::EndSection => Event::EndSection(Default::default()),
        EventKind::SetPickable => Event::SetPickable(Default::default()),
        EventKind::SetColor => Event::SetColor(Default::default()),
        EventKind::SetIsTopLevel => Event::SetIsTopLevel(Default::default()),
        EventKind::SetCamera => Event::SetCamera(Default::default()),
        EventKind::AddProfileZone => Event::AddProfileZone(Default::default()),
        EventKind::AddProfileZoneEvent => Event::AddProfileZoneEvent(Default::default()),
        EventKind::StreamEndEvent => Event::StreamEndEvent(Default::default()),
        EventKind::ErrorMessage => Event::ErrorMessage(Default::default()),
        EventKind::OriginShift => Event::OriginShift(Default::default()),
    }
}

#[test]
fn empty_values_round_trip_for_every_kind() {
    for kind in EventKind::ALL {
        let event = empty_event(kind);
        assert_eq!(event.kind(), kind);

        let mut src = event.to_bytes();
        assert_eq!(src[0], kind.tag());
        let decoded = Event::decode(&mut src).unwrap();
        assert_eq!(decoded, event, "{} did not round-trip", kind);
        assert!(src.is_empty(), "{} left {} bytes", kind, src.len());
    }
}

#[test]
fn events_decode_back_to_back() {
    let events: Vec<Event> = EventKind::ALL.iter().map(|k| empty_event(*k)).collect();
    let mut buf = BytesMut::new();
    for event in &events {
        event.encode(&mut buf);
    }

    let mut src = buf.freeze();
    for expected in &events {
        assert_eq!(&Event::decode(&mut src).unwrap(), expected);
    }
    assert!(src.is_empty());
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(event in any_event()) {
        let mut src = event.to_bytes();
        let decoded = Event::decode(&mut src).unwrap();
        prop_assert_eq!(&decoded, &event);
        prop_assert!(src.is_empty());
    }

    #[test]
    fn prop_truncation_never_panics(event in any_event(), cut in any::<usize>()) {
        let bytes = event.to_bytes();
        let cut = cut % bytes.len();
        let mut src = bytes.slice(..cut);
        prop_assert!(Event::decode(&mut src).is_err());
    }
}
