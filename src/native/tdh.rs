//! Native API - Event Tracing tdh header
//!
//! The `tdh` module is an abstraction layer for the Windows tdh library. This module act as a
//! internal API that holds all `unsafe` calls to functions exported by the `tdh` Windows library.
//!
//! [`SystemTdh`] serves the [`Tdh`] trait from it, for records received from a real-time session.
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{ERROR_INSUFFICIENT_BUFFER, ERROR_NOT_FOUND};
use windows::Win32::System::Diagnostics::Etw;

use crate::guid::Guid;
use crate::record::EventRecord;
use crate::tdh::{query_with_retry, FormatRequest, Tdh, TdhError, TdhResult};
use crate::traits::*;
use crate::utils::{self, AlignedBuffer};

/// `ERROR_EVT_INVALID_EVENT_DATA`
const ERROR_EVT_INVALID_EVENT_DATA: u32 = 15005;

/// Size of the `PROVIDER_ENUMERATION_INFO` header
const PROVIDER_ENUMERATION_HEADER_SIZE: usize = 8;
/// Size of a `TRACE_PROVIDER_INFO`
const TRACE_PROVIDER_INFO_SIZE: usize = 24;

fn check(status: u32, required: u32) -> TdhResult<()> {
    match status {
        0 => Ok(()),
        s if s == ERROR_INSUFFICIENT_BUFFER.0 => Err(TdhError::InsufficientBuffer { required }),
        s if s == ERROR_NOT_FOUND.0 => Err(TdhError::NotFound),
        ERROR_EVT_INVALID_EVENT_DATA => Err(TdhError::InvalidEventData),
        s => Err(TdhError::Os(std::io::Error::from_raw_os_error(s as i32))),
    }
}

fn native<'a>(record: &EventRecord<'a>) -> TdhResult<&'a Etw::EVENT_RECORD> {
    record
        .native()
        .ok_or(TdhError::NotSupported("record not received from a trace session"))
}

fn property_descriptor(name: &[u16]) -> Etw::PROPERTY_DATA_DESCRIPTOR {
    Etw::PROPERTY_DATA_DESCRIPTOR {
        PropertyName: name.as_ptr() as u64,
        ArrayIndex: u32::MAX,
        ..Default::default()
    }
}

/// The TDH API of the system
///
/// Only records received through [`SystemTraceSource`](crate::native::SystemTraceSource) can be
/// decoded with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTdh;

impl Tdh for SystemTdh {
    fn event_information(&self, record: &EventRecord, buffer: &mut AlignedBuffer) -> TdhResult<()> {
        let event = native(record)?;
        let mut size = buffer.len() as u32;
        let output = if buffer.is_empty() {
            None
        } else {
            Some(buffer.as_bytes_mut().as_mut_ptr() as *mut Etw::TRACE_EVENT_INFO)
        };

        let status = unsafe {
            // Safety: `output` is either null or points to `size` writable bytes
            Etw::TdhGetEventInformation(event, None, output, &mut size)
        };
        check(status, size)
    }

    fn event_map_information(
        &self,
        record: &EventRecord,
        map_name: &str,
        buffer: &mut AlignedBuffer,
    ) -> TdhResult<()> {
        let event = native(record)?;
        let name = map_name.into_utf16();
        let mut size = buffer.len() as u32;
        let output = if buffer.is_empty() {
            None
        } else {
            Some(buffer.as_bytes_mut().as_mut_ptr() as *mut Etw::EVENT_MAP_INFO)
        };

        let status = unsafe {
            // Safety: `name` is null terminated, `output` points to `size` writable bytes
            Etw::TdhGetEventMapInformation(
                event,
                PCWSTR::from_raw(name.as_ptr()),
                output,
                &mut size,
            )
        };
        check(status, size)
    }

    fn property_size(&self, record: &EventRecord, name: &str) -> TdhResult<u32> {
        let event = native(record)?;
        let name = name.into_utf16();
        let desc = property_descriptor(&name);
        let mut size = 0;

        let status = unsafe {
            // Safety: the descriptor points to a null terminated name that outlives the call
            Etw::TdhGetPropertySize(event, None, &[desc], &mut size)
        };
        check(status, 0)?;
        Ok(size)
    }

    fn property(&self, record: &EventRecord, name: &str, buffer: &mut [u8]) -> TdhResult<()> {
        let event = native(record)?;
        let name = name.into_utf16();
        let desc = property_descriptor(&name);

        let status = unsafe {
            // Safety: the descriptor points to a null terminated name that outlives the call
            Etw::TdhGetProperty(event, None, &[desc], buffer)
        };
        check(status, 0)
    }

    fn format_property(&self, request: &FormatRequest, buffer: &mut [u16]) -> TdhResult<u16> {
        let mut size = (buffer.len() * 2) as u32;
        let mut consumed = 0u16;
        let map = request
            .map
            .map(|map| map.as_bytes().as_ptr() as *const Etw::EVENT_MAP_INFO);

        let status = unsafe {
            // Safety:
            //  * the schema and map buffers are 8-byte aligned copies of what TDH returned
            //  * `size` is the size in bytes of `buffer`
            Etw::TdhFormatProperty(
                request.schema.as_bytes().as_ptr() as *const Etw::TRACE_EVENT_INFO,
                map,
                request.pointer_size as u32,
                request.in_type,
                request.out_type,
                request.length,
                request.user_data,
                &mut size,
                PWSTR(buffer.as_mut_ptr()),
                &mut consumed,
            )
        };
        check(status, size)?;
        Ok(consumed)
    }
}

/// GUID and name of every provider registered on the system
pub fn enumerate_providers() -> TdhResult<Vec<(Guid, String)>> {
    let mut buffer = AlignedBuffer::new();
    query_with_retry(&mut buffer, |buffer| {
        let mut size = buffer.len() as u32;
        let output = if buffer.is_empty() {
            None
        } else {
            Some(buffer.as_bytes_mut().as_mut_ptr() as *mut Etw::PROVIDER_ENUMERATION_INFO)
        };
        let status = unsafe {
            // Safety: `output` is either null or points to `size` writable bytes
            Etw::TdhEnumerateProviders(output, &mut size)
        };
        check(status, size)
    })?;

    let bytes = buffer.as_bytes();
    let count = utils::read_uint_le(bytes.get(..4).ok_or(TdhError::InvalidEventData)?)
        .ok_or(TdhError::InvalidEventData)? as usize;

    let mut providers = Vec::with_capacity(count);
    for i in 0..count {
        let start = PROVIDER_ENUMERATION_HEADER_SIZE + i * TRACE_PROVIDER_INFO_SIZE;
        let entry = bytes
            .get(start..start + TRACE_PROVIDER_INFO_SIZE)
            .ok_or(TdhError::InvalidEventData)?;
        let guid = Guid::from_le_slice(entry).ok_or(TdhError::InvalidEventData)?;
        let name_offset =
            utils::read_uint_le(&entry[20..24]).ok_or(TdhError::InvalidEventData)? as usize;
        let name = bytes
            .get(name_offset..)
            .and_then(utils::read_utf16z)
            .map(|(name, _)| name)
            .unwrap_or_default();
        providers.push((guid, name));
    }
    Ok(providers)
}
