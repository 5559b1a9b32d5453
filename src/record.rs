//! Platform-independent view of a trace record
//!
//! An [`EventRecord`] is what the record pump hands to the decoding pipeline: a fixed header, an
//! opaque payload ("user data") and the extended data items attached to the record.
//! On Windows it is built from an [EVENT_RECORD](https://docs.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_record)
//! (and keeps a reference to it, so that the TDH API can be queried), elsewhere it can be built
//! from captured or synthetic data.
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::guid::Guid;

/// `{6A399AE0-4BC6-4DE9-870B-3657F8947E7E}`: provider of the events that report real-time buffers being lost
pub const RT_LOST_EVENT_GUID: Guid = Guid::from_values(
    0x6a399ae0,
    0x4bc6,
    0x4de9,
    [0x87, 0x0b, 0x36, 0x57, 0xf8, 0x94, 0x7e, 0x7e],
);

pub const EVENT_HEADER_FLAG_32_BIT_HEADER: u16 = 0x0020;
pub const EVENT_HEADER_FLAG_64_BIT_HEADER: u16 = 0x0040;

/// `EVENT_HEADER_EXT_TYPE_RELATED_ACTIVITYID`
pub const EXT_TYPE_RELATED_ACTIVITYID: u16 = 0x0001;

/// An [EVENT_DESCRIPTOR](https://docs.microsoft.com/en-us/windows/win32/api/evntprov/ns-evntprov-event_descriptor)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, AsBytes, FromBytes, FromZeroes)]
pub struct EventDescriptor {
    pub id: u16,
    pub version: u8,
    pub channel: u8,
    pub level: u8,
    pub opcode: u8,
    pub task: u16,
    pub keyword: u64,
}

/// The fields of an `EVENT_HEADER` the decoding pipeline cares about
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventHeader {
    pub provider_id: Guid,
    pub activity_id: Guid,
    pub descriptor: EventDescriptor,
    pub flags: u16,
    pub process_id: u32,
    pub thread_id: u32,
    /// FILETIME-style timestamp (100ns intervals since 1601-01-01 UTC)
    pub timestamp: i64,
}

impl EventHeader {
    /// Size of the pointers of the process that emitted the event
    pub fn pointer_size(&self) -> usize {
        if self.flags & EVENT_HEADER_FLAG_32_BIT_HEADER != 0 {
            4
        } else {
            8
        }
    }
}

/// Extended data items the pipeline knows how to interpret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedDataItem {
    RelatedActivityId(Guid),
    /// Any other extended data type, identified by its `ExtType`
    Other(u16),
}

impl ExtendedDataItem {
    /// Interpret a raw item from its `ExtType` and data bytes
    pub fn from_raw(ext_type: u16, data: &[u8]) -> Self {
        match ext_type {
            EXT_TYPE_RELATED_ACTIVITYID => match Guid::from_le_slice(data) {
                Some(guid) => ExtendedDataItem::RelatedActivityId(guid),
                None => ExtendedDataItem::Other(ext_type),
            },
            other => ExtendedDataItem::Other(other),
        }
    }
}

/// One trace record
#[derive(Clone)]
pub struct EventRecord<'a> {
    header: EventHeader,
    user_data: &'a [u8],
    extended_data: Vec<ExtendedDataItem>,
    #[cfg(windows)]
    native: Option<&'a windows::Win32::System::Diagnostics::Etw::EVENT_RECORD>,
}

impl<'a> EventRecord<'a> {
    /// Build a record from its header and payload (e.g. when replaying captured records)
    pub fn new(header: EventHeader, user_data: &'a [u8]) -> Self {
        EventRecord {
            header,
            user_data,
            extended_data: Vec::new(),
            #[cfg(windows)]
            native: None,
        }
    }

    pub fn with_extended_data(mut self, items: Vec<ExtendedDataItem>) -> Self {
        self.extended_data = items;
        self
    }

    #[cfg(windows)]
    pub(crate) fn with_native(
        mut self,
        native: &'a windows::Win32::System::Diagnostics::Etw::EVENT_RECORD,
    ) -> Self {
        self.native = Some(native);
        self
    }

    /// The native record this was built from, if any
    #[cfg(windows)]
    pub fn native(&self) -> Option<&'a windows::Win32::System::Diagnostics::Etw::EVENT_RECORD> {
        self.native
    }

    pub fn header(&self) -> &EventHeader {
        &self.header
    }

    pub fn provider_id(&self) -> Guid {
        self.header.provider_id
    }

    pub fn event_id(&self) -> u16 {
        self.header.descriptor.id
    }

    pub fn opcode(&self) -> u8 {
        self.header.descriptor.opcode
    }

    pub fn version(&self) -> u8 {
        self.header.descriptor.version
    }

    pub fn level(&self) -> u8 {
        self.header.descriptor.level
    }

    pub fn event_flags(&self) -> u16 {
        self.header.flags
    }

    pub fn process_id(&self) -> u32 {
        self.header.process_id
    }

    pub fn thread_id(&self) -> u32 {
        self.header.thread_id
    }

    pub fn activity_id(&self) -> Guid {
        self.header.activity_id
    }

    pub fn timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn pointer_size(&self) -> usize {
        self.header.pointer_size()
    }

    /// The opaque payload of the record
    pub fn user_buffer(&self) -> &'a [u8] {
        self.user_data
    }

    pub fn extended_data(&self) -> &[ExtendedDataItem] {
        &self.extended_data
    }

    /// The related activity ID, if the record carries one
    pub fn related_activity_id(&self) -> Option<Guid> {
        self.extended_data.iter().find_map(|item| match item {
            ExtendedDataItem::RelatedActivityId(guid) => Some(*guid),
            ExtendedDataItem::Other(_) => None,
        })
    }

    /// Whether this record reports lost real-time buffers
    pub fn is_lost_event(&self) -> bool {
        self.header.provider_id == RT_LOST_EVENT_GUID
    }
}

impl std::fmt::Debug for EventRecord<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecord")
            .field("header", &self.header)
            .field("user_data_len", &self.user_data.len())
            .field("extended_data", &self.extended_data)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lost_event_guid() {
        assert_eq!(
            RT_LOST_EVENT_GUID.to_string(),
            "{6A399AE0-4BC6-4DE9-870B-3657F8947E7E}"
        );

        let header = EventHeader {
            provider_id: RT_LOST_EVENT_GUID,
            ..Default::default()
        };
        assert!(EventRecord::new(header, &[]).is_lost_event());
        assert!(!EventRecord::new(EventHeader::default(), &[]).is_lost_event());
    }

    #[test]
    fn test_pointer_size() {
        let mut header = EventHeader::default();
        assert_eq!(header.pointer_size(), 8);
        header.flags = EVENT_HEADER_FLAG_32_BIT_HEADER;
        assert_eq!(header.pointer_size(), 4);
    }

    #[test]
    fn test_related_activity() {
        let related = Guid::parse("12345678-1234-5678-0102-030405060708").unwrap();
        let record = EventRecord::new(EventHeader::default(), &[]).with_extended_data(vec![
            ExtendedDataItem::Other(5),
            ExtendedDataItem::from_raw(EXT_TYPE_RELATED_ACTIVITYID, related.as_bytes()),
        ]);
        assert_eq!(record.related_activity_id(), Some(related));
        assert_eq!(
            ExtendedDataItem::from_raw(EXT_TYPE_RELATED_ACTIVITYID, &[1, 2]),
            ExtendedDataItem::Other(EXT_TYPE_RELATED_ACTIVITYID)
        );
    }
}
