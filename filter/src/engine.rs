//! Instance lifecycle tracking and per-event filter decisions
//!
//! [`FilterEngine::evaluate`] sees every decoded event in stream order and
//! answers keep or drop. Instances created past their class ceiling are
//! remembered in [`FilterState`] so that everything referring to them later
//! (property values, messages, object references, their destruction) is
//! dropped as well.

use std::collections::{BTreeMap, HashMap, HashSet};

use openpvd_shared::protocol::EventGroup;
use openpvd_shared::strings::{StringHandle, StringTable};
use openpvd_shared::types::events::*;
use openpvd_shared::utils::bytes_to_hex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::summary::FilterSummary;
use crate::transcript::Transcript;

/// Class bucket for bytes whose owner is not a live instance
/// Angle brackets keep it apart from any traced class name.
pub const UNKNOWN_CLASS: &str = "<unknown>";

/// Section name that marks a simulation frame
pub const FRAME_SECTION: &str = "frame";

/// Data blocks up to this size are dumped as hex in the transcript
const HEX_DUMP_LIMIT: usize = 16;

/// Configured ceilings plus the ids currently being filtered out
#[derive(Debug, Clone, Default)]
pub struct FilterState {
    limits: HashMap<String, u64>,
    filtered: HashSet<InstanceId>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(mut self, class: impl Into<String>, limit: u64) -> Self {
        self.set_limit(class, limit);
        self
    }

    /// Cap the number of simultaneously live instances of `class`
    pub fn set_limit(&mut self, class: impl Into<String>, limit: u64) {
        self.limits.insert(class.into(), limit);
    }

    pub fn limit_for(&self, class: &str) -> Option<u64> {
        self.limits.get(class).copied()
    }

    pub fn is_filtered(&self, id: InstanceId) -> bool {
        self.filtered.contains(&id)
    }

    pub fn filtered_count(&self) -> usize {
        self.filtered.len()
    }

    fn insert_filtered(&mut self, id: InstanceId) {
        self.filtered.insert(id);
    }

    fn remove_filtered(&mut self, id: InstanceId) -> bool {
        self.filtered.remove(&id)
    }
}

/// Per-class counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStats {
    /// Instances currently alive
    pub live: u64,
    /// Instances ever registered
    pub created: u64,
    /// Creations dropped by the ceiling
    pub filtered: u64,
    /// Property payload bytes of kept events
    pub bytes: u64,
}

/// Open Begin/Append/End property sequence. Append and End do not carry
/// the instance id, so they inherit this verdict.
#[derive(Debug, Clone, Copy)]
struct PropertyCursor {
    instance_id: InstanceId,
    keep: bool,
}

#[derive(Default)]
pub struct FilterEngine {
    strings: StringTable,
    live: HashMap<InstanceId, String>,
    classes: BTreeMap<String, ClassStats>,
    frames: u64,
    cursor: Option<PropertyCursor>,
    events: u64,
    kept: u64,
    transcript: Option<Transcript>,
}

fn class_of(live: &HashMap<InstanceId, String>, id: InstanceId) -> &str {
    live.get(&id).map(String::as_str).unwrap_or(UNKNOWN_CLASS)
}

fn add_bytes(classes: &mut BTreeMap<String, ClassStats>, class: &str, bytes: usize) {
    // only allocate the key for a class seen for the first time
    if let Some(stats) = classes.get_mut(class) {
        stats.bytes += bytes as u64;
        return;
    }
    classes.entry(class.to_string()).or_default().bytes += bytes as u64;
}

impl FilterEngine {
    pub fn new() -> Self {
        Self {
            strings: StringTable::new(),
            ..Self::default()
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn class_stats(&self, class: &str) -> Option<&ClassStats> {
        self.classes.get(class)
    }

    /// Live instances of `class`
    pub fn live_count(&self, class: &str) -> u64 {
        self.classes.get(class).map_or(0, |stats| stats.live)
    }

    /// Class of a live instance
    pub fn class_of(&self, id: InstanceId) -> Option<&str> {
        self.live.get(&id).map(String::as_str)
    }

    /// Decide whether `event` survives into the output, updating lifecycle
    /// and statistics as a side effect
    pub fn evaluate(&mut self, state: &mut FilterState, group: &EventGroup, event: &Event) -> bool {
        self.events += 1;
        if let Some(t) = self.transcript.as_mut() {
            t.begin_event(event.kind().name());
        }

        let keep = match event {
            Event::StringHandleEvent(e) => self.on_string_handle(e),
            Event::CreateClass(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("name", self.strings.resolve(&e.name));
                }
                true
            }
            Event::DeriveClass(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("parent", self.strings.resolve(&e.parent));
                    t.field("child", self.strings.resolve(&e.child));
                }
                true
            }
            Event::CreateProperty(e) => self.on_create_property(e),
            Event::CreatePropertyMessage(e) => self.on_create_property_message(e),
            Event::CreateInstance(e) => self.on_create_instance(state, e),
            Event::DestroyInstance(e) => self.on_destroy_instance(state, e),
            Event::SetPropertyValue(e) => self.on_set_property_value(state, e),
            Event::BeginSetPropertyValue(e) => self.on_begin_set_property_value(state, e),
            Event::AppendPropertyValueData(e) => self.on_append_property_value_data(e),
            Event::EndSetPropertyValue(_) => self.on_end_set_property_value(),
            Event::SetPropertyMessage(e) => self.on_set_property_message(state, e),
            Event::BeginPropertyMessageGroup(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("message", self.strings.resolve(&e.message_name));
                }
                true
            }
            Event::SendPropertyMessageFromGroup(e) => self.on_send_from_group(state, e),
            Event::EndPropertyMessageGroup(_) => true,
            Event::PushBackObjectRef(e) => {
                self.on_object_ref(state, e.instance_id, e.property, e.object_ref)
            }
            Event::RemoveObjectRef(e) => {
                self.on_object_ref(state, e.instance_id, e.property, e.object_ref)
            }
            Event::BeginSection(e) => self.on_begin_section(group, e),
            Event::EndSection(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("section_id", e.section_id);
                    t.field("name", self.strings.lookup(e.name));
                    t.field("timestamp", e.timestamp);
                    t.rule("/\\", '-');
                }
                true
            }
            Event::SetPickable(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("instance_id", format_args!("{:#x}", e.instance_id));
                    t.field("pickable", e.pickable);
                }
                true
            }
            Event::SetColor(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    let c = &e.color;
                    t.field("instance_id", format_args!("{:#x}", e.instance_id));
                    t.field(
                        "color",
                        format_args!("rgba({}, {}, {}, {})", c.r, c.g, c.b, c.a),
                    );
                }
                true
            }
            Event::SetIsTopLevel(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("instance_id", format_args!("{:#x}", e.instance_id));
                    t.field("is_top_level", e.is_top_level);
                }
                true
            }
            Event::SetCamera(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("name", &e.name);
                    t.field("position", &e.position);
                    t.field("up", &e.up);
                    t.field("target", &e.target);
                }
                true
            }
            // profile zones are not tied to scene instances, so they always pass
            Event::AddProfileZone(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("instance_id", format_args!("{:#x}", e.instance_id));
                    t.field("name", &e.name);
                }
                true
            }
            Event::AddProfileZoneEvent(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("instance_id", format_args!("{:#x}", e.instance_id));
                    t.field("name", &e.name);
                    t.field("event_id", e.event_id);
                    t.field("compile_time", e.compile_time_enabled);
                }
                true
            }
            Event::StreamEndEvent(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("name", &e.name);
                }
                true
            }
            Event::ErrorMessage(e) => {
                warn!("client reported error {}: {} ({}:{})", e.code, e.message, e.file, e.line);
                if let Some(t) = self.transcript.as_mut() {
                    t.field("code", e.code);
                    t.field("message", &e.message);
                    t.field("location", format_args!("{}:{}", e.file, e.line));
                }
                true
            }
            Event::OriginShift(e) => {
                if let Some(t) = self.transcript.as_mut() {
                    t.field("scene_id", format_args!("{:#x}", e.scene_id));
                    t.field("shift", &e.shift);
                }
                true
            }
        };

        if keep {
            self.kept += 1;
        }
        keep
    }

    fn on_string_handle(&mut self, e: &StringHandleEvent) -> bool {
        let value = e.string.to_str_lossy();
        if let Some(t) = self.transcript.as_mut() {
            t.field("handle", format_args!("{} <= \"{}\"", e.handle, value));
        }
        self.strings.insert(e.handle, value.into_owned());
        true
    }

    fn on_create_property(&mut self, e: &CreateProperty) -> bool {
        if let Some(t) = self.transcript.as_mut() {
            let strings = &self.strings;
            t.field("class", strings.resolve(&e.class));
            t.field("name", strings.lookup(e.name));
            if e.semantic.is_null() {
                t.field("semantic", "n/a");
            } else {
                t.field("semantic", strings.lookup(e.semantic));
            }
            t.field("datatype", strings.resolve(&e.datatype));
            for value in &e.values {
                t.line(format_args!(
                    " {} = {}",
                    strings.lookup(value.name),
                    value.value
                ));
            }
        }
        true
    }

    fn on_create_property_message(&mut self, e: &CreatePropertyMessage) -> bool {
        if let Some(t) = self.transcript.as_mut() {
            let strings = &self.strings;
            t.field("class", strings.resolve(&e.class));
            t.field("message", strings.resolve(&e.message_name));
            t.field("byte_size", e.message_byte_size);
            for (index, entry) in e.entries.iter().enumerate() {
                t.line(format_args!(
                    " {:>2} -> {} {}",
                    index,
                    strings.resolve(&entry.datatype),
                    strings.lookup(entry.property_name)
                ));
                t.line(format_args!(
                    "       {} bytes, {} offset",
                    entry.byte_size, entry.message_offset
                ));
            }
        }
        true
    }

    fn on_create_instance(&mut self, state: &mut FilterState, e: &CreateInstance) -> bool {
        let id = e.instance_id;
        // ceilings are keyed by the bare class name, whatever its namespace
        let class = self.strings.lookup(e.class.name).to_string();

        let keep = if state.is_filtered(id) {
            warn!("instance {:#x} created again while filtered out; dropping it", id);
            false
        } else if let Some(previous) = self.live.get(&id).cloned() {
            // re-registration keeps the existing slot, moved to the new class
            warn!("instance {:#x} created twice without being destroyed", id);
            if let Some(stats) = self.classes.get_mut(&previous) {
                stats.live = stats.live.saturating_sub(1);
            }
            self.classes.entry(class.clone()).or_default().live += 1;
            self.live.insert(id, class);
            true
        } else {
            let stats = self.classes.entry(class.clone()).or_default();
            match state.limit_for(&class) {
                Some(limit) if stats.live >= limit => {
                    debug!("{} ceiling of {} reached, filtering {:#x}", class, limit, id);
                    stats.filtered += 1;
                    state.insert_filtered(id);
                    false
                }
                _ => {
                    stats.live += 1;
                    stats.created += 1;
                    self.live.insert(id, class);
                    true
                }
            }
        };

        if let Some(t) = self.transcript.as_mut() {
            if !keep {
                t.filtered();
            }
            t.field("class", self.strings.resolve(&e.class));
            t.field("instance_id", format_args!("{:#x}", id));
        }
        keep
    }

    fn on_destroy_instance(&mut self, state: &mut FilterState, e: &DestroyInstance) -> bool {
        let id = e.instance_id;

        if state.remove_filtered(id) {
            if let Some(t) = self.transcript.as_mut() {
                t.filtered();
                t.field("instance_id", format_args!("{:#x}", id));
            }
            return false;
        }

        let class = self.live.remove(&id);
        match &class {
            Some(class) => {
                if let Some(stats) = self.classes.get_mut(class) {
                    stats.live = stats.live.saturating_sub(1);
                }
            }
            None => debug!("destroying unknown instance {:#x}", id),
        }

        if let Some(t) = self.transcript.as_mut() {
            t.field(
                "instance_id",
                format_args!("{:#x} ({})", id, class.as_deref().unwrap_or(UNKNOWN_CLASS)),
            );
        }
        true
    }

    fn on_set_property_value(&mut self, state: &FilterState, e: &SetPropertyValue) -> bool {
        let id = e.instance_id;
        let filtered = state.is_filtered(id);

        if !filtered {
            add_bytes(&mut self.classes, class_of(&self.live, id), e.data.len());
        }

        if let Some(t) = self.transcript.as_mut() {
            if filtered {
                t.filtered();
            }
            t.field(
                "instance_id",
                format_args!("{:#x} ({})", id, class_of(&self.live, id)),
            );
            t.field("property", self.strings.lookup(e.property_name));

            let incoming = self.strings.resolve(&e.incoming_type);
            // single u32 values are printed inline
            if incoming.name == "PvdU32" && e.num_items == 1 && e.data.len() >= 4 {
                let value = u32::from_le_bytes([e.data[0], e.data[1], e.data[2], e.data[3]]);
                t.line(format_args!("{:16}= {}", "", value));
            } else {
                t.field("incoming_type", incoming);
                t.field("num_items", e.num_items);
                t.field("data_size", e.data.len());
            }
        }
        !filtered
    }

    fn on_begin_set_property_value(
        &mut self,
        state: &FilterState,
        e: &BeginSetPropertyValue,
    ) -> bool {
        let keep = !state.is_filtered(e.instance_id);
        let opened = PropertyCursor {
            instance_id: e.instance_id,
            keep,
        };
        if let Some(open) = self.cursor.replace(opened) {
            warn!(
                "property value for {:#x} was never ended; replacing it with one for {:#x}",
                open.instance_id, e.instance_id
            );
        }

        if let Some(t) = self.transcript.as_mut() {
            if !keep {
                t.filtered();
            }
            t.field(
                "instance_id",
                format_args!("{:#x} ({})", e.instance_id, class_of(&self.live, e.instance_id)),
            );
            t.field("property", self.strings.lookup(e.property_name));
            t.field("incoming_type", self.strings.resolve(&e.incoming_type));
        }
        keep
    }

    fn on_append_property_value_data(&mut self, e: &AppendPropertyValueData) -> bool {
        let Some(cursor) = self.cursor else {
            warn!("AppendPropertyValueData without an open property value; keeping it");
            if let Some(t) = self.transcript.as_mut() {
                t.field("data_size", e.data.len());
            }
            return true;
        };

        if cursor.keep {
            add_bytes(
                &mut self.classes,
                class_of(&self.live, cursor.instance_id),
                e.data.len(),
            );
        }

        if let Some(t) = self.transcript.as_mut() {
            if !cursor.keep {
                t.filtered();
            }
            t.field(
                "instance_id",
                format_args!(
                    "{:#x} ({})",
                    cursor.instance_id,
                    class_of(&self.live, cursor.instance_id)
                ),
            );
            t.field("data_size", e.data.len());
        }
        cursor.keep
    }

    fn on_end_set_property_value(&mut self) -> bool {
        match self.cursor.take() {
            Some(cursor) => {
                if !cursor.keep {
                    if let Some(t) = self.transcript.as_mut() {
                        t.filtered();
                    }
                }
                cursor.keep
            }
            None => {
                warn!("EndSetPropertyValue without an open property value; keeping it");
                true
            }
        }
    }

    fn on_set_property_message(&mut self, state: &FilterState, e: &SetPropertyMessage) -> bool {
        let filtered = state.is_filtered(e.instance_id);

        if let Some(t) = self.transcript.as_mut() {
            if filtered {
                t.filtered();
            }
            t.field(
                "instance_id",
                format_args!("{:#x} ({})", e.instance_id, class_of(&self.live, e.instance_id)),
            );
            t.field("message", self.strings.resolve(&e.message_name));
            t.field("data_size", e.data.len());
            if e.data.len() <= HEX_DUMP_LIMIT {
                t.field("data", bytes_to_hex(&e.data));
            }
        }
        !filtered
    }

    fn on_send_from_group(
        &mut self,
        state: &FilterState,
        e: &SendPropertyMessageFromGroup,
    ) -> bool {
        let filtered = state.is_filtered(e.instance_id);

        if let Some(t) = self.transcript.as_mut() {
            if filtered {
                t.filtered();
            }
            t.field("instance_id", format_args!("{:#x}", e.instance_id));
            t.field("data_size", e.data.len());
        }
        !filtered
    }

    /// Edges follow the referenced object: an edge to a filtered instance
    /// would dangle in the output
    fn on_object_ref(
        &mut self,
        state: &FilterState,
        instance_id: InstanceId,
        property: StringHandle,
        object_ref: InstanceId,
    ) -> bool {
        let filtered = state.is_filtered(object_ref);

        if let Some(t) = self.transcript.as_mut() {
            if filtered {
                t.filtered();
            }
            t.field(
                "instance_id",
                format_args!("{:#x} ({})", instance_id, class_of(&self.live, instance_id)),
            );
            t.field("property", self.strings.lookup(property));
            t.field(
                "object_ref",
                format_args!("{:#x} ({})", object_ref, class_of(&self.live, object_ref)),
            );
        }
        !filtered
    }

    fn on_begin_section(&mut self, group: &EventGroup, e: &BeginSection) -> bool {
        let name = self.strings.lookup(e.name);
        let is_frame = name == FRAME_SECTION;
        if is_frame {
            self.frames += 1;
        }

        if let Some(t) = self.transcript.as_mut() {
            t.field("section_id", e.section_id);
            t.field("name", name);
            t.field("timestamp", e.timestamp);
            t.rule("\\/", '-');
            if is_frame {
                t.rule(&format!("{} @ {}", self.frames, group.timestamp), ' ');
            }
        }
        true
    }

    /// Close the transcript and report what the run saw
    pub fn finish(mut self) -> FilterSummary {
        if let Some(cursor) = self.cursor {
            warn!(
                "stream ended inside a property value for {:#x}",
                cursor.instance_id
            );
        }
        if let Some(transcript) = self.transcript.take() {
            if let Err(e) = transcript.finish() {
                warn!("Transcript is incomplete: {}", e);
            }
        }

        let summary = FilterSummary {
            frames: self.frames,
            events: self.events,
            kept: self.kept,
            dropped: self.events - self.kept,
            live_instances: self.live.len() as u64,
            classes: self.classes,
        };
        summary.log();
        summary
    }
}
