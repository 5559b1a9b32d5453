//! Basic TDH types
//!
//! The `tdh_types` module describes the binary layout of the structures returned by the TDH
//! schema API ([TRACE_EVENT_INFO], [EVENT_PROPERTY_INFO], [EVENT_MAP_INFO]) and redefines the
//! In and Out TDH types following the rust naming convention.
//!
//! The layouts are plain `#[repr(C)]` structs that are only ever read out of byte slices with
//! bounds-checked copies, so this module is available on every platform.
//!
//! [TRACE_EVENT_INFO]: https://learn.microsoft.com/en-us/windows/win32/api/tdh/ns-tdh-trace_event_info
//! [EVENT_PROPERTY_INFO]: https://learn.microsoft.com/en-us/windows/win32/api/tdh/ns-tdh-event_property_info
//! [EVENT_MAP_INFO]: https://learn.microsoft.com/en-us/windows/win32/api/tdh/ns-tdh-event_map_info
use num_traits::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::guid::Guid;
use crate::record::EventDescriptor;

/// Fixed-size header of a `TRACE_EVENT_INFO`
///
/// It is followed by `property_count` [`EventPropertyInfoRaw`] entries, then by the strings the
/// various `*_offset` fields point to.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
pub struct TraceEventInfoHeader {
    pub provider_guid: Guid,
    pub event_guid: Guid,
    pub event_descriptor: EventDescriptor,
    pub decoding_source: i32,
    pub provider_name_offset: u32,
    pub level_name_offset: u32,
    pub channel_name_offset: u32,
    pub keywords_name_offset: u32,
    pub task_name_offset: u32,
    pub opcode_name_offset: u32,
    pub event_message_offset: u32,
    pub provider_message_offset: u32,
    pub binary_xml_offset: u32,
    pub binary_xml_size: u32,
    pub activity_id_name_offset: u32,
    pub related_activity_id_name_offset: u32,
    pub property_count: u32,
    pub top_level_property_count: u32,
    pub flags: u32,
}

pub const TRACE_EVENT_INFO_HEADER_SIZE: usize = std::mem::size_of::<TraceEventInfoHeader>();

/// One `EVENT_PROPERTY_INFO`, with its unions left undecoded
///
/// * `type_a`, `type_b`, `type_c` hold either `(InType, OutType, MapNameOffset)`,
///   `(StructStartIndex, NumOfStructMembers, padding)` or `(InType, OutType, CustomSchemaOffset)`
///   depending on `flags`
/// * `count` and `length` hold either a literal or the index of the property holding the value
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
pub struct EventPropertyInfoRaw {
    pub flags: u32,
    pub name_offset: u32,
    pub type_a: u16,
    pub type_b: u16,
    pub type_c: u32,
    pub count: u16,
    pub length: u16,
    pub reserved: u32,
}

pub const EVENT_PROPERTY_INFO_SIZE: usize = std::mem::size_of::<EventPropertyInfoRaw>();

/// Fixed-size header of an `EVENT_MAP_INFO`, followed by `entry_count` [`EventMapEntryRaw`]
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
pub struct EventMapInfoHeader {
    pub name_offset: u32,
    pub flag: u32,
    pub entry_count: u32,
    pub value_type: u32,
}

pub const EVENT_MAP_INFO_HEADER_SIZE: usize = std::mem::size_of::<EventMapInfoHeader>();

/// One `EVENT_MAP_ENTRY`. `value` is the `Value` / `InputOffset` union
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
pub struct EventMapEntryRaw {
    pub output_offset: u32,
    pub value: u32,
}

pub const EVENT_MAP_ENTRY_SIZE: usize = std::mem::size_of::<EventMapEntryRaw>();

/// Represent a TDH_IN_TYPE
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq, Default)]
pub enum TdhInType {
    // Deprecated values are not defined
    #[default]
    InTypeNull,
    InTypeUnicodeString,
    InTypeAnsiString,
    InTypeInt8,    // Field size is 1 byte
    InTypeUInt8,   // Field size is 1 byte
    InTypeInt16,   // Field size is 2 bytes
    InTypeUInt16,  // Field size is 2 bytes
    InTypeInt32,   // Field size is 4 bytes
    InTypeUInt32,  // Field size is 4 bytes
    InTypeInt64,   // Field size is 8 bytes
    InTypeUInt64,  // Field size is 8 bytes
    InTypeFloat,   // Field size is 4 bytes
    InTypeDouble,  // Field size is 8 bytes
    InTypeBoolean, // Field size is 4 bytes
    InTypeBinary,  // Depends on the OutType
    InTypeGuid,
    InTypePointer,
    InTypeFileTime,   // Field size is 8 bytes
    InTypeSystemTime, // Field size is 16 bytes
    InTypeSid,        // Field size determined by the first few bytes of the field
    InTypeHexInt32,
    InTypeHexInt64,
    InTypeCountedString = 300,
    InTypeCountedAnsiString,
    InTypeReversedCountedString,
    InTypeReversedCountedAnsiString,
    InTypeNonNullTerminatedString,
    InTypeNonNullTerminatedAnsiString,
    InTypeUnicodeChar,
    InTypeAnsiChar,
    InTypeSizeT,
    InTypeHexDump,
    InTypeWbemSid,
}

impl TdhInType {
    /// Unknown codes map to `InTypeNull`
    pub fn from_raw(value: u16) -> Self {
        FromPrimitive::from_u16(value).unwrap_or(TdhInType::InTypeNull)
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            TdhInType::InTypeInt8
                | TdhInType::InTypeUInt8
                | TdhInType::InTypeInt16
                | TdhInType::InTypeUInt16
                | TdhInType::InTypeInt32
                | TdhInType::InTypeUInt32
                | TdhInType::InTypeInt64
                | TdhInType::InTypeUInt64
                | TdhInType::InTypeHexInt32
                | TdhInType::InTypeHexInt64
        )
    }

    /// Strings whose size is carried by a 16-bit prefix or by the end of the payload
    pub fn is_counted_string(&self) -> bool {
        matches!(
            self,
            TdhInType::InTypeCountedString
                | TdhInType::InTypeCountedAnsiString
                | TdhInType::InTypeReversedCountedString
                | TdhInType::InTypeReversedCountedAnsiString
                | TdhInType::InTypeNonNullTerminatedString
                | TdhInType::InTypeNonNullTerminatedAnsiString
        )
    }
}

/// Represent a TDH_OUT_TYPE
#[repr(u16)]
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq, Default)]
pub enum TdhOutType {
    #[default]
    OutTypeNull,
    OutTypeString,
    OutTypeDateTime,
    OutTypeInt8,    // Field size is 1 byte
    OutTypeUInt8,   // Field size is 1 byte
    OutTypeInt16,   // Field size is 2 bytes
    OutTypeUInt16,  // Field size is 2 bytes
    OutTypeInt32,   // Field size is 4 bytes
    OutTypeUInt32,  // Field size is 4 bytes
    OutTypeInt64,   // Field size is 8 bytes
    OutTypeUInt64,  // Field size is 8 bytes
    OutTypeFloat,   // Field size is 4 bytes
    OutTypeDouble,  // Field size is 8 bytes
    OutTypeBoolean, // Field size is 4 bytes
    OutTypeGuid,
    OutTypeHexBinary,
    OutTypeHexInt8,
    OutTypeHexInt16,
    OutTypeHexInt32,
    OutTypeHexInt64,
    OutTypePid,
    OutTypeTid,
    OutTypePort,
    OutTypeIpv4,
    OutTypeIpv6,
    OutTypeSocketAddress,
    OutTypeCimDateTime,
    OutTypeEtwTime,
    OutTypeXml,
    OutTypeErrorCode,
    OutTypeWin32Error,
    OutTypeNtStatus,
    OutTypeHResult,
    OutTypeCultureInsensitiveDateTime,
    OutTypeJson,
    OutTypeUtf8,
    OutTypePkcs7,
    OutTypeCodePointer,
    OutTypeDatetimeUtc,
}

impl TdhOutType {
    /// Unknown codes map to `OutTypeNull`
    pub fn from_raw(value: u16) -> Self {
        FromPrimitive::from_u16(value).unwrap_or(TdhOutType::OutTypeNull)
    }
}

/// Represent a DECODING_SOURCE
#[repr(i32)]
#[derive(Debug, Clone, Copy, FromPrimitive, ToPrimitive, PartialEq, Eq, Default)]
pub enum DecodingSource {
    /// Instrumentation manifest
    #[default]
    DecodingSourceXMLFile,
    /// Classic (MOF) event
    DecodingSourceWbem,
    /// WPP trace message
    DecodingSourceWPP,
    /// TraceLogging self-describing event
    DecodingSourceTlg,
    DecodingSourceMax,
}

impl DecodingSource {
    pub fn from_raw(value: i32) -> Self {
        FromPrimitive::from_i32(value).unwrap_or(DecodingSource::DecodingSourceMax)
    }
}

bitflags! {
    /// Represents the Property flags
    ///
    /// See: [Property Flags enum](https://docs.microsoft.com/en-us/windows/win32/api/tdh/ne-tdh-property_flags)
    #[derive(Default)]
    pub struct PropertyFlags: u32 {
        const PROPERTY_STRUCT = 0x1;
        const PROPERTY_PARAM_LENGTH = 0x2;
        const PROPERTY_PARAM_COUNT = 0x4;
        const PROPERTY_WBEMXML_FRAGMENT = 0x8;
        const PROPERTY_PARAM_FIXED_LENGTH = 0x10;
        const PROPERTY_PARAM_FIXED_COUNT = 0x20;
        const PROPERTY_HAS_TAGS = 0x40;
        const PROPERTY_HAS_CUSTOM_SCHEMA = 0x80;
    }
}

bitflags! {
    /// `TEMPLATE_FLAGS`: tells whether the event payload is `EventData` or `UserData`
    #[derive(Default)]
    pub struct TemplateFlags: u32 {
        const TEMPLATE_EVENT_DATA = 0x1;
        const TEMPLATE_USER_DATA = 0x2;
        const TEMPLATE_CONTROL_GUID = 0x4;
    }
}

bitflags! {
    /// `MAP_FLAGS`
    ///
    /// See: [MAP_FLAGS enum](https://learn.microsoft.com/en-us/windows/win32/api/tdh/ne-tdh-map_flags)
    #[derive(Default)]
    pub struct MapFlags: u32 {
        const EVENTMAP_INFO_FLAG_MANIFEST_VALUEMAP = 0x1;
        const EVENTMAP_INFO_FLAG_MANIFEST_BITMAP = 0x2;
        const EVENTMAP_INFO_FLAG_MANIFEST_PATTERNMAP = 0x4;
        const EVENTMAP_INFO_FLAG_WBEM_VALUEMAP = 0x8;
        const EVENTMAP_INFO_FLAG_WBEM_BITMAP = 0x10;
        const EVENTMAP_INFO_FLAG_WBEM_FLAG = 0x20;
        const EVENTMAP_INFO_FLAG_WBEM_NO_MAP = 0x40;
    }
}

impl MapFlags {
    pub fn is_manifest(&self) -> bool {
        self.intersects(
            MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_VALUEMAP
                | MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_BITMAP
                | MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_PATTERNMAP,
        )
    }

    pub fn is_bitmap(&self) -> bool {
        self.intersects(
            MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_BITMAP | MapFlags::EVENTMAP_INFO_FLAG_WBEM_BITMAP,
        )
    }
}
