//! Build `TRACE_EVENT_INFO` and `EVENT_MAP_INFO` buffers
//!
//! This is useful to decode records whose schema is known beforehand without asking the system
//! (e.g. records captured on another machine, see [`OfflineTdh`](crate::tdh::OfflineTdh)), and to
//! describe synthetic events.
use zerocopy::AsBytes;

use crate::guid::Guid;
use crate::native::tdh_types::{
    DecodingSource, EventMapEntryRaw, EventMapInfoHeader, EventPropertyInfoRaw, MapFlags,
    PropertyFlags, TdhInType, TdhOutType, TemplateFlags, TraceEventInfoHeader,
    EVENT_MAP_ENTRY_SIZE, EVENT_MAP_INFO_HEADER_SIZE, EVENT_PROPERTY_INFO_SIZE,
    TRACE_EVENT_INFO_HEADER_SIZE,
};
use crate::record::EventDescriptor;
use crate::schema::{PropertyCount, PropertyLength};
use crate::traits::EncodeUtf16;
use crate::utils::AlignedBuffer;

/// Strings stored after the fixed part of a TDH buffer
struct StringTable {
    base: usize,
    bytes: Vec<u8>,
}

impl StringTable {
    fn new(base: usize) -> Self {
        StringTable {
            base,
            bytes: Vec::new(),
        }
    }

    /// Offset of the stored string, 0 for an empty one
    fn push(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        let offset = self.base + self.bytes.len();
        self.bytes.extend(s.into_utf16_bytes());
        offset as u32
    }

    fn push_opt(&mut self, s: &Option<String>) -> u32 {
        s.as_deref().map(|s| self.push(s)).unwrap_or(0)
    }
}

/// Description of one property of a [`SchemaBuilder`]
#[derive(Debug, Clone)]
pub struct PropertyBuilder {
    name: String,
    flags: PropertyFlags,
    in_type: u16,
    out_type: u16,
    map_name: Option<String>,
    count: PropertyCount,
    length: PropertyLength,
    members: Vec<PropertyBuilder>,
}

impl PropertyBuilder {
    pub fn scalar(name: &str, in_type: TdhInType, out_type: TdhOutType) -> Self {
        Self::raw_scalar(name, in_type as u16, out_type as u16)
    }

    /// A scalar property with arbitrary type codes
    pub fn raw_scalar(name: &str, in_type: u16, out_type: u16) -> Self {
        PropertyBuilder {
            name: name.to_string(),
            flags: PropertyFlags::empty(),
            in_type,
            out_type,
            map_name: None,
            count: PropertyCount::Count(1),
            length: PropertyLength::Length(0),
            members: Vec::new(),
        }
    }

    pub fn structure(name: &str, members: Vec<PropertyBuilder>) -> Self {
        PropertyBuilder {
            flags: PropertyFlags::PROPERTY_STRUCT,
            members,
            ..Self::raw_scalar(name, 0, 0)
        }
    }

    /// Static length in bytes
    pub fn length(mut self, length: u16) -> Self {
        self.flags.remove(PropertyFlags::PROPERTY_PARAM_LENGTH);
        self.length = PropertyLength::Length(length);
        self
    }

    /// Length held by the property at `index`
    pub fn length_from(mut self, index: u16) -> Self {
        self.flags.insert(PropertyFlags::PROPERTY_PARAM_LENGTH);
        self.length = PropertyLength::Index(index);
        self
    }

    /// Fixed-size array of `count` elements
    pub fn count(mut self, count: u16) -> Self {
        self.flags.remove(PropertyFlags::PROPERTY_PARAM_COUNT);
        self.flags.insert(PropertyFlags::PROPERTY_PARAM_FIXED_COUNT);
        self.count = PropertyCount::Count(count);
        self
    }

    /// Array whose element count is held by the property at `index`
    pub fn count_from(mut self, index: u16) -> Self {
        self.flags.remove(PropertyFlags::PROPERTY_PARAM_FIXED_COUNT);
        self.flags.insert(PropertyFlags::PROPERTY_PARAM_COUNT);
        self.count = PropertyCount::Index(index);
        self
    }

    /// Attach the value map named `map_name`
    pub fn map(mut self, map_name: &str) -> Self {
        self.map_name = Some(map_name.to_string());
        self
    }

    /// Set additional raw flags
    pub fn flags(mut self, flags: PropertyFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    fn to_raw(
        &self,
        strings: &mut StringTable,
        start: u16,
        member_count: u16,
    ) -> EventPropertyInfoRaw {
        let (type_a, type_b, type_c) = if self.flags.contains(PropertyFlags::PROPERTY_STRUCT) {
            (start, member_count, 0)
        } else {
            (self.in_type, self.out_type, strings.push_opt(&self.map_name))
        };
        let count = match self.count {
            PropertyCount::Count(c) | PropertyCount::Index(c) => c,
        };
        let length = match self.length {
            PropertyLength::Length(l) | PropertyLength::Index(l) => l,
        };

        EventPropertyInfoRaw {
            flags: self.flags.bits(),
            name_offset: strings.push(&self.name),
            type_a,
            type_b,
            type_c,
            count,
            length,
            reserved: 0,
        }
    }
}

/// Builds a `TRACE_EVENT_INFO` buffer
///
/// Top-level properties come first, in the order they are added. Struct members are laid out
/// after them, as the system does.
///
/// # Example
/// ```
/// use etw_consumer::guid::Guid;
/// use etw_consumer::native::tdh_types::{TdhInType, TdhOutType};
/// use etw_consumer::schema::Schema;
/// use etw_consumer::schema::builder::{PropertyBuilder, SchemaBuilder};
///
/// let provider = Guid::parse("22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716").unwrap();
/// let buffer = SchemaBuilder::new(provider)
///     .event_id(1)
///     .property(PropertyBuilder::scalar("ProcessID", TdhInType::InTypeUInt32, TdhOutType::OutTypePid).length(4))
///     .build();
/// let schema = Schema::from_buffer(buffer).unwrap();
/// assert_eq!(schema.property_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    provider: Guid,
    event_guid: Guid,
    descriptor: EventDescriptor,
    decoding_source: DecodingSource,
    template_flags: TemplateFlags,
    provider_name: Option<String>,
    level_name: Option<String>,
    channel_name: Option<String>,
    keywords_name: Option<String>,
    task_name: Option<String>,
    opcode_name: Option<String>,
    event_message: Option<String>,
    properties: Vec<PropertyBuilder>,
}

impl SchemaBuilder {
    pub fn new(provider: Guid) -> Self {
        SchemaBuilder {
            provider,
            event_guid: Guid::zeroed(),
            descriptor: EventDescriptor::default(),
            decoding_source: DecodingSource::DecodingSourceXMLFile,
            template_flags: TemplateFlags::TEMPLATE_EVENT_DATA,
            provider_name: None,
            level_name: None,
            channel_name: None,
            keywords_name: None,
            task_name: None,
            opcode_name: None,
            event_message: None,
            properties: Vec::new(),
        }
    }

    pub fn event_guid(mut self, guid: Guid) -> Self {
        self.event_guid = guid;
        self
    }

    pub fn descriptor(mut self, descriptor: EventDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn event_id(mut self, id: u16) -> Self {
        self.descriptor.id = id;
        self
    }

    pub fn version(mut self, version: u8) -> Self {
        self.descriptor.version = version;
        self
    }

    pub fn opcode(mut self, opcode: u8) -> Self {
        self.descriptor.opcode = opcode;
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.descriptor.level = level;
        self
    }

    pub fn task(mut self, task: u16) -> Self {
        self.descriptor.task = task;
        self
    }

    pub fn keyword(mut self, keyword: u64) -> Self {
        self.descriptor.keyword = keyword;
        self
    }

    pub fn decoding_source(mut self, source: DecodingSource) -> Self {
        self.decoding_source = source;
        self
    }

    /// Properties are `UserData` rather than `EventData`
    pub fn user_data(mut self) -> Self {
        self.template_flags = TemplateFlags::TEMPLATE_USER_DATA;
        self
    }

    pub fn provider_name(mut self, name: &str) -> Self {
        self.provider_name = Some(name.to_string());
        self
    }

    pub fn level_name(mut self, name: &str) -> Self {
        self.level_name = Some(name.to_string());
        self
    }

    pub fn channel_name(mut self, name: &str) -> Self {
        self.channel_name = Some(name.to_string());
        self
    }

    pub fn keywords_name(mut self, name: &str) -> Self {
        self.keywords_name = Some(name.to_string());
        self
    }

    pub fn task_name(mut self, name: &str) -> Self {
        self.task_name = Some(name.to_string());
        self
    }

    pub fn opcode_name(mut self, name: &str) -> Self {
        self.opcode_name = Some(name.to_string());
        self
    }

    pub fn event_message(mut self, message: &str) -> Self {
        self.event_message = Some(message.to_string());
        self
    }

    /// Add a top-level property
    pub fn property(mut self, property: PropertyBuilder) -> Self {
        self.properties.push(property);
        self
    }

    pub fn build(self) -> AlignedBuffer {
        let top_level_count = self.properties.len();

        // (property, struct start, member count), top-level first then members
        let mut flat: Vec<(PropertyBuilder, u16, u16)> =
            self.properties.into_iter().map(|p| (p, 0, 0)).collect();
        let mut i = 0;
        while i < flat.len() {
            let members = std::mem::take(&mut flat[i].0.members);
            if flat[i].0.flags.contains(PropertyFlags::PROPERTY_STRUCT) {
                flat[i].1 = flat.len() as u16;
                flat[i].2 = members.len() as u16;
            }
            flat.extend(members.into_iter().map(|p| (p, 0, 0)));
            i += 1;
        }

        let strings_base = TRACE_EVENT_INFO_HEADER_SIZE + flat.len() * EVENT_PROPERTY_INFO_SIZE;
        let mut strings = StringTable::new(strings_base);

        let header = TraceEventInfoHeader {
            provider_guid: self.provider,
            event_guid: self.event_guid,
            event_descriptor: self.descriptor,
            decoding_source: self.decoding_source as i32,
            provider_name_offset: strings.push_opt(&self.provider_name),
            level_name_offset: strings.push_opt(&self.level_name),
            channel_name_offset: strings.push_opt(&self.channel_name),
            keywords_name_offset: strings.push_opt(&self.keywords_name),
            task_name_offset: strings.push_opt(&self.task_name),
            opcode_name_offset: strings.push_opt(&self.opcode_name),
            event_message_offset: strings.push_opt(&self.event_message),
            property_count: flat.len() as u32,
            top_level_property_count: top_level_count as u32,
            flags: self.template_flags.bits(),
            ..Default::default()
        };

        let mut bytes = header.as_bytes().to_vec();
        for (property, start, member_count) in &flat {
            let raw = property.to_raw(&mut strings, *start, *member_count);
            bytes.extend_from_slice(raw.as_bytes());
        }
        bytes.extend_from_slice(&strings.bytes);

        AlignedBuffer::from_bytes(&bytes)
    }
}

/// Builds an `EVENT_MAP_INFO` buffer
#[derive(Debug, Clone)]
pub struct MapBuilder {
    name: String,
    flags: MapFlags,
    entries: Vec<(u32, String)>,
}

impl MapBuilder {
    pub fn new(name: &str, flags: MapFlags) -> Self {
        MapBuilder {
            name: name.to_string(),
            flags,
            entries: Vec::new(),
        }
    }

    /// Map `value` (a mask or a bit position for bitmaps) to `name`
    pub fn entry(mut self, value: u32, name: &str) -> Self {
        self.entries.push((value, name.to_string()));
        self
    }

    pub fn build(self) -> AlignedBuffer {
        let strings_base = EVENT_MAP_INFO_HEADER_SIZE + self.entries.len() * EVENT_MAP_ENTRY_SIZE;
        let mut strings = StringTable::new(strings_base);

        let header = EventMapInfoHeader {
            name_offset: strings.push(&self.name),
            flag: self.flags.bits(),
            entry_count: self.entries.len() as u32,
            value_type: 0,
        };

        let mut bytes = header.as_bytes().to_vec();
        for (value, name) in &self.entries {
            let entry = EventMapEntryRaw {
                output_offset: strings.push(name),
                value: *value,
            };
            bytes.extend_from_slice(entry.as_bytes());
        }
        bytes.extend_from_slice(&strings.bytes);

        AlignedBuffer::from_bytes(&bytes)
    }
}
