//! ETW Event Schema and its property descriptors
//!
//! A [`Schema`] is a read-only, bounds-checked view over a [TRACE_EVENT_INFO] buffer returned by the
//! schema-resolution API. It gives access to the property descriptors of an event by index and to
//! the strings the descriptor refers to by offset.
//!
//! [TRACE_EVENT_INFO]: https://docs.microsoft.com/en-us/windows/win32/api/tdh/ns-tdh-trace_event_info
use std::ops::Range;

use zerocopy::FromBytes;

use crate::guid::Guid;
use crate::native::tdh_types::{
    DecodingSource, EventPropertyInfoRaw, PropertyFlags, TdhInType, TdhOutType, TemplateFlags,
    TraceEventInfoHeader, EVENT_PROPERTY_INFO_SIZE, TRACE_EVENT_INFO_HEADER_SIZE,
};
use crate::record::EventDescriptor;
use crate::tdh::TdhError;
use crate::utils::{self, AlignedBuffer};

pub mod builder;
pub mod map_info;
pub mod mof;

/// Schema module errors
#[derive(Debug)]
pub enum SchemaError {
    /// The buffer is too small for what its header declares
    Truncated { needed: usize, len: usize },
    /// A property index is not below `PropertyCount`
    IndexOutOfRange { index: u32, count: u32 },
    /// A string offset points past the end of the buffer
    OutOfBounds { offset: usize, len: usize },
    /// No null terminator before the end of the buffer
    UnterminatedString { offset: usize },
    /// Represents an error from the schema-resolution API
    Tdh(TdhError),
}

impl From<TdhError> for SchemaError {
    fn from(err: TdhError) -> Self {
        SchemaError::Tdh(err)
    }
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { needed, len } => {
                write!(f, "schema buffer truncated ({} bytes needed, {} available)", needed, len)
            }
            Self::IndexOutOfRange { index, count } => {
                write!(f, "property index {} out of range (property count {})", index, count)
            }
            Self::OutOfBounds { offset, len } => {
                write!(f, "offset {} out of the schema buffer ({} bytes)", offset, len)
            }
            Self::UnterminatedString { offset } => {
                write!(f, "unterminated string at offset {}", offset)
            }
            Self::Tdh(e) => write!(f, "tdh error: {}", e),
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Tdh(e) => Some(e),
            _ => None,
        }
    }
}

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Where the count of an array property comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyCount {
    Count(u16),
    /// Index of the property that holds the count
    Index(u16),
}

/// Where the length of a property comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyLength {
    Length(u16),
    /// Index of the property that holds the length
    Index(u16),
}

/// The shape of a property, i.e. how the type union of its descriptor must be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Scalar {
        in_type: u16,
        out_type: u16,
        map_name_offset: u32,
    },
    Struct {
        start_index: u16,
        member_count: u16,
    },
    CustomSchema {
        in_type: u16,
        out_type: u16,
        custom_schema_offset: u32,
    },
}

/// A decoded `EVENT_PROPERTY_INFO`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Index of this descriptor in the schema
    pub index: u32,
    pub flags: PropertyFlags,
    pub name_offset: u32,
    pub kind: PropertyKind,
    pub count: PropertyCount,
    pub length: PropertyLength,
}

impl PropertyDescriptor {
    pub(crate) fn from_raw(index: u32, raw: &EventPropertyInfoRaw) -> Self {
        let flags = PropertyFlags::from_bits_truncate(raw.flags);

        let kind = if flags.contains(PropertyFlags::PROPERTY_STRUCT) {
            PropertyKind::Struct {
                start_index: raw.type_a,
                member_count: raw.type_b,
            }
        } else if flags.contains(PropertyFlags::PROPERTY_HAS_CUSTOM_SCHEMA) {
            PropertyKind::CustomSchema {
                in_type: raw.type_a,
                out_type: raw.type_b,
                custom_schema_offset: raw.type_c,
            }
        } else {
            PropertyKind::Scalar {
                in_type: raw.type_a,
                out_type: raw.type_b,
                map_name_offset: raw.type_c,
            }
        };

        let count = if flags.contains(PropertyFlags::PROPERTY_PARAM_COUNT) {
            PropertyCount::Index(raw.count)
        } else {
            PropertyCount::Count(raw.count)
        };

        let length = if flags.contains(PropertyFlags::PROPERTY_PARAM_LENGTH) {
            PropertyLength::Index(raw.length)
        } else {
            PropertyLength::Length(raw.length)
        };

        PropertyDescriptor {
            index,
            flags,
            name_offset: raw.name_offset,
            kind,
            count,
            length,
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, PropertyKind::Struct { .. })
    }

    /// Whether the property is declared as an array
    ///
    /// That is the case when its count is parameterized, flagged as fixed, or a literal above 1.
    pub fn is_array(&self) -> bool {
        self.flags.intersects(
            PropertyFlags::PROPERTY_PARAM_COUNT | PropertyFlags::PROPERTY_PARAM_FIXED_COUNT,
        ) || matches!(self.count, PropertyCount::Count(c) if c > 1)
    }

    /// Raw TDH in-type, 0 for structs
    pub fn raw_in_type(&self) -> u16 {
        match self.kind {
            PropertyKind::Scalar { in_type, .. } | PropertyKind::CustomSchema { in_type, .. } => {
                in_type
            }
            PropertyKind::Struct { .. } => 0,
        }
    }

    /// Raw TDH out-type, 0 for structs
    pub fn raw_out_type(&self) -> u16 {
        match self.kind {
            PropertyKind::Scalar { out_type, .. } | PropertyKind::CustomSchema { out_type, .. } => {
                out_type
            }
            PropertyKind::Struct { .. } => 0,
        }
    }

    pub fn in_type(&self) -> TdhInType {
        TdhInType::from_raw(self.raw_in_type())
    }

    pub fn out_type(&self) -> TdhOutType {
        TdhOutType::from_raw(self.raw_out_type())
    }

    /// Offset of the name of the value map attached to this property, if any
    pub fn map_name_offset(&self) -> Option<u32> {
        match self.kind {
            PropertyKind::Scalar {
                map_name_offset, ..
            } if map_name_offset != 0 => Some(map_name_offset),
            _ => None,
        }
    }

    /// Indices of the members of a struct property
    pub fn struct_members(&self) -> Option<Range<u32>> {
        match self.kind {
            PropertyKind::Struct {
                start_index,
                member_count,
            } => Some(start_index as u32..start_index as u32 + member_count as u32),
            _ => None,
        }
    }
}

/// A read-only view over a `TRACE_EVENT_INFO` buffer
///
/// It is usually obtained from a [`SchemaLocator`](crate::schema_locator::SchemaLocator).
pub struct Schema {
    buffer: AlignedBuffer,
    header: TraceEventInfoHeader,
}

impl Schema {
    /// Wrap a `TRACE_EVENT_INFO` buffer, checking the header and the descriptor array fit in it
    pub fn from_buffer(buffer: AlignedBuffer) -> SchemaResult<Self> {
        let len = buffer.len();
        let header = TraceEventInfoHeader::read_from_prefix(buffer.as_bytes()).ok_or(
            SchemaError::Truncated {
                needed: TRACE_EVENT_INFO_HEADER_SIZE,
                len,
            },
        )?;

        let needed = (header.property_count as usize)
            .checked_mul(EVENT_PROPERTY_INFO_SIZE)
            .and_then(|n| n.checked_add(TRACE_EVENT_INFO_HEADER_SIZE))
            .unwrap_or(usize::MAX);
        if needed > len {
            return Err(SchemaError::Truncated { needed, len });
        }

        Ok(Schema { buffer, header })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    pub fn provider_guid(&self) -> Guid {
        self.header.provider_guid
    }

    pub fn event_guid(&self) -> Guid {
        self.header.event_guid
    }

    pub fn descriptor(&self) -> EventDescriptor {
        self.header.event_descriptor
    }

    pub fn decoding_source(&self) -> DecodingSource {
        DecodingSource::from_raw(self.header.decoding_source)
    }

    pub fn template_flags(&self) -> TemplateFlags {
        TemplateFlags::from_bits_truncate(self.header.flags)
    }

    /// Whether properties belong to `UserData` rather than `EventData`
    pub fn is_user_data(&self) -> bool {
        self.template_flags()
            .contains(TemplateFlags::TEMPLATE_USER_DATA)
    }

    pub fn property_count(&self) -> u32 {
        self.header.property_count
    }

    pub fn top_level_property_count(&self) -> u32 {
        self.header.top_level_property_count
    }

    /// The descriptor at `index`, which must be below [`Schema::property_count`]
    pub fn property(&self, index: u32) -> SchemaResult<PropertyDescriptor> {
        let count = self.property_count();
        if index >= count {
            return Err(SchemaError::IndexOutOfRange { index, count });
        }

        let offset = TRACE_EVENT_INFO_HEADER_SIZE + index as usize * EVENT_PROPERTY_INFO_SIZE;
        let raw = self
            .as_bytes()
            .get(offset..)
            .and_then(EventPropertyInfoRaw::read_from_prefix)
            .ok_or(SchemaError::Truncated {
                needed: offset + EVENT_PROPERTY_INFO_SIZE,
                len: self.buffer.len(),
            })?;

        Ok(PropertyDescriptor::from_raw(index, &raw))
    }

    /// The null-terminated UTF-16 string at `offset`, as is. Offset 0 means "no string".
    pub fn string_at(&self, offset: u32) -> SchemaResult<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        let offset = offset as usize;
        let bytes = self.as_bytes().get(offset..).ok_or(SchemaError::OutOfBounds {
            offset,
            len: self.buffer.len(),
        })?;

        utils::read_utf16z(bytes)
            .map(|(s, _)| s)
            .ok_or(SchemaError::UnterminatedString { offset })
    }

    /// Same as [`Schema::string_at`], with surrounding whitespace trimmed
    pub fn clean_string_at(&self, offset: u32) -> SchemaResult<String> {
        self.string_at(offset).map(|s| s.trim().to_string())
    }

    pub fn property_name(&self, property: &PropertyDescriptor) -> SchemaResult<String> {
        self.string_at(property.name_offset)
    }

    pub fn provider_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.provider_name_offset)
    }

    pub fn level_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.level_name_offset)
    }

    pub fn channel_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.channel_name_offset)
    }

    pub fn keywords_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.keywords_name_offset)
    }

    pub fn task_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.task_name_offset)
    }

    pub fn opcode_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.opcode_name_offset)
    }

    pub fn event_message(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.event_message_offset)
    }

    pub fn provider_message(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.provider_message_offset)
    }

    pub fn activity_id_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.activity_id_name_offset)
    }

    pub fn related_activity_id_name(&self) -> SchemaResult<String> {
        self.clean_string_at(self.header.related_activity_id_name_offset)
    }

    pub fn is_xml(&self) -> bool {
        self.decoding_source() == DecodingSource::DecodingSourceXMLFile
    }

    /// Classic (MOF) events
    pub fn is_mof(&self) -> bool {
        self.decoding_source() == DecodingSource::DecodingSourceWbem
    }

    /// TraceLogging events describe their own layout, so their schema must not be shared
    pub fn is_tracelogging(&self) -> bool {
        self.decoding_source() == DecodingSource::DecodingSourceTlg
    }

    /// The ID identifying this kind of event
    ///
    /// Classic events of a known class get `class base ID + opcode`, everything else gets the
    /// descriptor ID.
    pub fn event_id(&self) -> u16 {
        let descriptor = self.descriptor();
        if self.is_mof() {
            if let Some(class) = mof::class_of(&self.event_guid()) {
                return class.base_id.wrapping_add(descriptor.opcode as u16);
            }
        }
        descriptor.id
    }

    /// `"<Class>/<Opcode name>"` for classic events, `None` otherwise
    pub fn event_type(&self) -> SchemaResult<Option<String>> {
        if !self.is_mof() {
            return Ok(None);
        }
        let class = mof::class_of(&self.event_guid())
            .map(|c| c.name)
            .unwrap_or("UnknownClass");
        Ok(Some(format!("{}/{}", class, self.opcode_name()?)))
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("provider", &self.provider_guid())
            .field("descriptor", &self.descriptor())
            .field("decoding_source", &self.decoding_source())
            .field("property_count", &self.property_count())
            .finish()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Schema {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::builder::{PropertyBuilder, SchemaBuilder};

    fn provider() -> Guid {
        Guid::parse("22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716").unwrap()
    }

    fn sample() -> Schema {
        let buffer = SchemaBuilder::new(provider())
            .event_id(5)
            .provider_name("  Sample-Provider ")
            .level_name("Information")
            .property(PropertyBuilder::scalar(
                "Name",
                TdhInType::InTypeUnicodeString,
                TdhOutType::OutTypeString,
            ))
            .property(PropertyBuilder::structure(
                "Info",
                vec![
                    PropertyBuilder::scalar("A", TdhInType::InTypeUInt32, TdhOutType::OutTypeUInt32)
                        .length(4),
                    PropertyBuilder::scalar("B", TdhInType::InTypeUInt16, TdhOutType::OutTypeUInt16)
                        .length(2),
                ],
            ))
            .build();
        Schema::from_buffer(buffer).unwrap()
    }

    #[test]
    fn test_descriptors() {
        let schema = sample();
        assert_eq!(schema.property_count(), 4);
        assert_eq!(schema.top_level_property_count(), 2);

        let name = schema.property(0).unwrap();
        assert_eq!(schema.property_name(&name).unwrap(), "Name");
        assert_eq!(name.in_type(), TdhInType::InTypeUnicodeString);
        assert!(!name.is_array());

        let info = schema.property(1).unwrap();
        assert!(info.is_struct());
        assert_eq!(info.struct_members(), Some(2..4));
        assert_eq!(info.in_type(), TdhInType::InTypeNull);

        let a = schema.property(2).unwrap();
        assert_eq!(schema.property_name(&a).unwrap(), "A");
        assert_eq!(a.length, PropertyLength::Length(4));
    }

    #[test]
    fn test_index_out_of_range() {
        let schema = sample();
        assert!(matches!(
            schema.property(4),
            Err(SchemaError::IndexOutOfRange { index: 4, count: 4 })
        ));
        assert!(matches!(
            schema.property(u32::MAX),
            Err(SchemaError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn test_strings() {
        let schema = sample();
        assert_eq!(schema.provider_name().unwrap(), "Sample-Provider");
        assert_eq!(schema.level_name().unwrap(), "Information");
        assert_eq!(schema.channel_name().unwrap(), "");
        assert!(matches!(
            schema.string_at(1_000_000),
            Err(SchemaError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_truncated_buffer() {
        let mut buffer = SchemaBuilder::new(provider())
            .property(PropertyBuilder::scalar(
                "X",
                TdhInType::InTypeUInt8,
                TdhOutType::OutTypeUInt8,
            ))
            .build();
        buffer.resize(TRACE_EVENT_INFO_HEADER_SIZE + 10);
        assert!(matches!(
            Schema::from_buffer(buffer),
            Err(SchemaError::Truncated { .. })
        ));
        assert!(matches!(
            Schema::from_buffer(AlignedBuffer::with_len(8)),
            Err(SchemaError::Truncated { .. })
        ));
    }

    #[test]
    fn test_unterminated_string() {
        let mut buffer = SchemaBuilder::new(provider()).build();
        let len = buffer.len() as u32;
        buffer.resize(len as usize + 4);
        let end = buffer.len();
        buffer.as_bytes_mut()[end - 4..].copy_from_slice(&[b'a', 0, b'b', 0]);
        let schema = Schema::from_buffer(buffer).unwrap();
        assert!(matches!(
            schema.string_at(len),
            Err(SchemaError::UnterminatedString { .. })
        ));
    }

    #[test]
    fn test_event_ids() {
        let manifest = sample();
        assert!(manifest.is_xml());
        assert_eq!(manifest.event_id(), 5);
        assert_eq!(manifest.event_type().unwrap(), None);

        let process_class = Guid::parse("3d6fa8d0-fe05-11d0-9dda-00c04fd7ba7c").unwrap();
        let mof = SchemaBuilder::new(process_class)
            .event_guid(process_class)
            .decoding_source(DecodingSource::DecodingSourceWbem)
            .opcode(1)
            .opcode_name("Start")
            .build();
        let mof = Schema::from_buffer(mof).unwrap();
        assert!(mof.is_mof());
        assert_eq!(mof.event_id(), 4081);
        assert_eq!(mof.event_type().unwrap().as_deref(), Some("Process/Start"));

        let unknown = SchemaBuilder::new(provider())
            .event_guid(provider())
            .decoding_source(DecodingSource::DecodingSourceWbem)
            .opcode(12)
            .opcode_name("Whatever")
            .build();
        let unknown = Schema::from_buffer(unknown).unwrap();
        assert_eq!(unknown.event_id(), 0);
        assert_eq!(
            unknown.event_type().unwrap().as_deref(),
            Some("UnknownClass/Whatever")
        );
    }
}
