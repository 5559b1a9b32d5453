//! Conversions from the native ETW consumer types
//!
//! [EVENT_RECORD](https://docs.microsoft.com/en-us/windows/win32/api/evntcons/ns-evntcons-event_record)s
//! handed by `ProcessTrace` are turned into [`EventRecord`]s borrowing their payload.
use windows::core::PWSTR;
use windows::Win32::System::Diagnostics::Etw;
use windows::Win32::System::SystemInformation::{ComputerNameDnsHostname, GetComputerNameExW};

use crate::guid::Guid;
use crate::record::{EventDescriptor, EventHeader, EventRecord, ExtendedDataItem};

/// Initial size of the computer name buffer, in UTF-16 units
const COMPUTER_NAME_UNITS: u32 = 256;

fn header_from_native(native: &Etw::EVENT_HEADER) -> EventHeader {
    let descriptor = &native.EventDescriptor;
    EventHeader {
        provider_id: Guid::from(native.ProviderId),
        activity_id: Guid::from(native.ActivityId),
        descriptor: EventDescriptor {
            id: descriptor.Id,
            version: descriptor.Version,
            channel: descriptor.Channel,
            level: descriptor.Level,
            opcode: descriptor.Opcode,
            task: descriptor.Task,
            keyword: descriptor.Keyword,
        },
        flags: native.Flags,
        process_id: native.ProcessId,
        thread_id: native.ThreadId,
        timestamp: native.TimeStamp,
    }
}

/// # Safety
///
/// `native` must be a record handed by `ProcessTrace`, whose pointers are valid for `'a`
unsafe fn user_buffer<'a>(native: &'a Etw::EVENT_RECORD) -> &'a [u8] {
    if native.UserData.is_null() || native.UserDataLength == 0 {
        return &[];
    }
    std::slice::from_raw_parts(native.UserData as *const u8, native.UserDataLength.into())
}

/// # Safety
///
/// Same as [`user_buffer`]
unsafe fn extended_data(native: &Etw::EVENT_RECORD) -> Vec<ExtendedDataItem> {
    if native.ExtendedData.is_null() || native.ExtendedDataCount == 0 {
        return Vec::new();
    }

    let items = std::slice::from_raw_parts(
        native.ExtendedData as *const Etw::EVENT_HEADER_EXTENDED_DATA_ITEM,
        native.ExtendedDataCount as usize,
    );
    items
        .iter()
        .map(|item| {
            let data_ptr = item.DataPtr as *const u8;
            let data = if data_ptr.is_null() {
                &[][..]
            } else {
                std::slice::from_raw_parts(data_ptr, item.DataSize as usize)
            };
            ExtendedDataItem::from_raw(item.ExtType, data)
        })
        .collect()
}

/// Build an [`EventRecord`] from a native record
///
/// # Safety
///
/// `native` must be a record handed by `ProcessTrace` (or otherwise have its `UserData` and
/// `ExtendedData` pointers valid for their advertised lengths) and must outlive `'a`.
pub(crate) unsafe fn record_from_native<'a>(native: &'a Etw::EVENT_RECORD) -> EventRecord<'a> {
    EventRecord::new(header_from_native(&native.EventHeader), user_buffer(native))
        .with_extended_data(extended_data(native))
        .with_native(native)
}

/// DNS host name of the local machine
pub fn computer_name() -> Option<String> {
    let mut size = COMPUTER_NAME_UNITS;
    for _ in 0..2 {
        let mut buffer = vec![0u16; size as usize];
        let result = unsafe {
            // Safety: `size` is the number of units `buffer` holds
            GetComputerNameExW(ComputerNameDnsHostname, PWSTR(buffer.as_mut_ptr()), &mut size)
        };
        match result {
            Ok(()) => {
                let len = (size as usize).min(buffer.len());
                return Some(String::from_utf16_lossy(&buffer[..len]));
            }
            // on ERROR_MORE_DATA, `size` now holds the required size
            Err(err) => log::debug!("GetComputerNameExW failed: {}", err),
        }
    }
    None
}
