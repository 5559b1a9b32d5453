//! ETW Types Parser
//!
//! This module renders raw property bytes as text, following the in-type / out-type conventions of
//! `TdhFormatProperty`. It backs [`OfflineTdh`](crate::tdh::OfflineTdh), and can be used directly
//! to render a value without going through the OS.
//!
//! All lengths are in bytes.
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::guid::Guid;
use crate::native::tdh_types::{TdhInType, TdhOutType};
use crate::native::time::{self, FileTime, SystemTime};
use crate::schema::map_info::MapInfo;
use crate::tdh::{FormatRequest, TdhError, TdhResult};
use crate::traits::EncodeUtf16;
use crate::utils;

type ParserResult<T> = TdhResult<T>;

/// A rendered value and the number of payload bytes it spans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    pub consumed: usize,
}

impl Rendered {
    fn new(text: String, consumed: usize) -> Self {
        Rendered { text, consumed }
    }
}

fn take(data: &[u8], len: usize) -> ParserResult<&[u8]> {
    data.get(..len).ok_or(TdhError::InvalidEventData)
}

fn take_array<const N: usize>(data: &[u8]) -> ParserResult<[u8; N]> {
    take(data, N)?
        .try_into()
        .map_err(|_| TdhError::InvalidEventData)
}

fn hex_bytes(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(2 + bytes.len() * 2);
    s.push_str("0x");
    for b in bytes {
        s.push_str(&format!("{:02X}", b));
    }
    s
}

fn is_hex(out_type: TdhOutType) -> bool {
    matches!(
        out_type,
        TdhOutType::OutTypeHexInt8
            | TdhOutType::OutTypeHexInt16
            | TdhOutType::OutTypeHexInt32
            | TdhOutType::OutTypeHexInt64
            | TdhOutType::OutTypeErrorCode
            | TdhOutType::OutTypeWin32Error
            | TdhOutType::OutTypeNtStatus
            | TdhOutType::OutTypeHResult
            | TdhOutType::OutTypeCodePointer
    )
}

/// Size of the integer in-types, `None` for anything else
fn integer_size(in_type: TdhInType) -> Option<usize> {
    match in_type {
        TdhInType::InTypeInt8 | TdhInType::InTypeUInt8 => Some(1),
        TdhInType::InTypeInt16 | TdhInType::InTypeUInt16 => Some(2),
        TdhInType::InTypeInt32 | TdhInType::InTypeUInt32 | TdhInType::InTypeHexInt32 => Some(4),
        TdhInType::InTypeInt64 | TdhInType::InTypeUInt64 | TdhInType::InTypeHexInt64 => Some(8),
        _ => None,
    }
}

fn render_integer(in_type: TdhInType, out_type: TdhOutType, raw: &[u8]) -> ParserResult<String> {
    let unsigned = utils::read_uint_le(raw).ok_or(TdhError::InvalidEventData)?;

    let hex_in = matches!(in_type, TdhInType::InTypeHexInt32 | TdhInType::InTypeHexInt64);
    if hex_in || is_hex(out_type) {
        return Ok(format!("0x{:X}", unsigned));
    }

    let text = match out_type {
        TdhOutType::OutTypeBoolean => (unsigned != 0).to_string(),
        TdhOutType::OutTypePort if raw.len() == 2 => {
            u16::from_be_bytes([raw[0], raw[1]]).to_string()
        }
        TdhOutType::OutTypeIpv4 if raw.len() == 4 => {
            Ipv4Addr::new(raw[0], raw[1], raw[2], raw[3]).to_string()
        }
        TdhOutType::OutTypeString if raw.len() == 1 => char::from(raw[0]).to_string(),
        _ => match in_type {
            TdhInType::InTypeInt8 => (unsigned as u8 as i8).to_string(),
            TdhInType::InTypeInt16 => (unsigned as u16 as i16).to_string(),
            TdhInType::InTypeInt32 => (unsigned as u32 as i32).to_string(),
            TdhInType::InTypeInt64 => (unsigned as i64).to_string(),
            _ => unsigned.to_string(),
        },
    };
    Ok(text)
}

fn render_utf16(data: &[u8], length: usize) -> Rendered {
    if length > 0 {
        let raw = &data[..length.min(data.len())];
        return Rendered::new(utils::read_utf16_lossy(raw), raw.len());
    }
    match utils::read_utf16z(data) {
        Some((text, consumed)) => Rendered::new(text, consumed),
        // unterminated: the string spans the rest of the payload
        None => Rendered::new(utils::read_utf16_lossy(data), data.len() & !1),
    }
}

fn ansi(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn render_ansi(data: &[u8], length: usize) -> Rendered {
    if length > 0 {
        let raw = &data[..length.min(data.len())];
        return Rendered::new(ansi(raw), raw.len());
    }
    match utils::ansiz_size(data) {
        Some(size) => Rendered::new(ansi(&data[..size]), size),
        None => Rendered::new(ansi(data), data.len()),
    }
}

/// Size in bytes of the SID at the start of `data`
pub fn sid_size(data: &[u8]) -> Option<usize> {
    let sub_authority_count = *data.get(1)? as usize;
    let size = 8 + 4 * sub_authority_count;
    (data.len() >= size).then_some(size)
}

/// `S-1-5-21-...` rendering of a binary SID
fn render_sid(data: &[u8]) -> ParserResult<Rendered> {
    let size = sid_size(data).ok_or(TdhError::InvalidEventData)?;
    let revision = data[0];
    let authority = data[2..8]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | *b as u64);

    let mut text = if authority >> 32 == 0 {
        format!("S-{}-{}", revision, authority)
    } else {
        format!("S-{}-0x{:012X}", revision, authority)
    };
    for sub in data[8..size].chunks_exact(4) {
        text.push_str(&format!("-{}", u32::from_le_bytes([sub[0], sub[1], sub[2], sub[3]])));
    }
    Ok(Rendered::new(text, size))
}

fn render_counted(data: &[u8], wide: bool, reversed: bool) -> ParserResult<Rendered> {
    let prefix: [u8; 2] = take_array(data)?;
    let len = if reversed {
        u16::from_be_bytes(prefix)
    } else {
        u16::from_le_bytes(prefix)
    } as usize;
    let raw = take(&data[2..], len)?;
    let text = if wide {
        utils::read_utf16_lossy(raw)
    } else {
        ansi(raw)
    };
    Ok(Rendered::new(text, 2 + len))
}

/// Render the value at the start of `data`
///
/// `length` is the property length (0 when it must be determined from the data) and
/// `pointer_size` the pointer size of the process that emitted the event.
pub fn render(
    in_type: u16,
    out_type: u16,
    length: usize,
    data: &[u8],
    pointer_size: usize,
) -> ParserResult<Rendered> {
    let raw_in_type = in_type;
    let in_type = TdhInType::from_raw(in_type);
    let out_type = TdhOutType::from_raw(out_type);

    if let Some(size) = integer_size(in_type) {
        let raw = take(data, size)?;
        return Ok(Rendered::new(render_integer(in_type, out_type, raw)?, size));
    }

    let rendered = match in_type {
        TdhInType::InTypeUnicodeString => render_utf16(data, length),
        TdhInType::InTypeAnsiString => render_ansi(data, length),
        TdhInType::InTypeFloat => {
            let raw = take_array::<4>(data)?;
            Rendered::new(f32::from_le_bytes(raw).to_string(), 4)
        }
        TdhInType::InTypeDouble => {
            let raw = take_array::<8>(data)?;
            Rendered::new(f64::from_le_bytes(raw).to_string(), 8)
        }
        TdhInType::InTypeBoolean => {
            let raw = take_array::<4>(data)?;
            Rendered::new((u32::from_le_bytes(raw) != 0).to_string(), 4)
        }
        TdhInType::InTypeBinary => {
            if out_type == TdhOutType::OutTypeIpv6 {
                let raw = take_array::<16>(data)?;
                Rendered::new(Ipv6Addr::from(raw).to_string(), 16)
            } else if length == 0 {
                return Err(TdhError::InvalidEventData);
            } else {
                Rendered::new(hex_bytes(take(data, length)?), length)
            }
        }
        TdhInType::InTypeGuid => {
            let guid = Guid::from_le_slice(take(data, 16)?).ok_or(TdhError::InvalidEventData)?;
            Rendered::new(guid.to_string(), 16)
        }
        TdhInType::InTypePointer | TdhInType::InTypeSizeT => {
            let raw = take(data, pointer_size)?;
            let value = utils::read_uint_le(raw).ok_or(TdhError::InvalidEventData)?;
            Rendered::new(format!("0x{:X}", value), pointer_size)
        }
        TdhInType::InTypeFileTime => {
            let raw = take_array::<8>(data)?;
            let text = FileTime::from_slice(&raw)
                .as_date_time()
                .and_then(time::format_rfc3339)
                .ok_or(TdhError::InvalidEventData)?;
            Rendered::new(text, 8)
        }
        TdhInType::InTypeSystemTime => {
            let raw = take_array::<16>(data)?;
            let text = SystemTime::from_slice(&raw)
                .as_date_time()
                .and_then(time::format_rfc3339)
                .ok_or(TdhError::InvalidEventData)?;
            Rendered::new(text, 16)
        }
        TdhInType::InTypeSid => render_sid(data)?,
        TdhInType::InTypeWbemSid => {
            // TOKEN_USER header: a pointer and an attributes field, padded to pointer size
            let header = 2 * pointer_size;
            let sid = render_sid(data.get(header..).ok_or(TdhError::InvalidEventData)?)?;
            Rendered::new(sid.text, header + sid.consumed)
        }
        TdhInType::InTypeCountedString => render_counted(data, true, false)?,
        TdhInType::InTypeCountedAnsiString => render_counted(data, false, false)?,
        TdhInType::InTypeReversedCountedString => render_counted(data, true, true)?,
        TdhInType::InTypeReversedCountedAnsiString => render_counted(data, false, true)?,
        TdhInType::InTypeNonNullTerminatedString => {
            let raw = if length > 0 { take(data, length)? } else { data };
            let raw = &raw[..raw.len() & !1];
            let units = utils::utf16_units(raw);
            Rendered::new(widestring::decode_utf16_lossy(units).collect(), raw.len())
        }
        TdhInType::InTypeNonNullTerminatedAnsiString => {
            let raw = if length > 0 { take(data, length)? } else { data };
            Rendered::new(String::from_utf8_lossy(raw).into_owned(), raw.len())
        }
        TdhInType::InTypeUnicodeChar => {
            let raw = take_array::<2>(data)?;
            let text = widestring::decode_utf16_lossy([u16::from_le_bytes(raw)]).collect();
            Rendered::new(text, 2)
        }
        TdhInType::InTypeAnsiChar => {
            let raw = take_array::<1>(data)?;
            Rendered::new(char::from(raw[0]).to_string(), 1)
        }
        TdhInType::InTypeHexDump => {
            let size = u32::from_le_bytes(take_array::<4>(data)?) as usize;
            let raw = take(&data[4..], size)?;
            Rendered::new(hex_bytes(raw), 4 + size)
        }
        _ => {
            log::trace!("no rendering for in-type {}", raw_in_type);
            return Err(TdhError::NotSupported("in-type"));
        }
    };
    Ok(rendered)
}

/// Translate an integer through a value map or a bit map
fn render_mapped(map: &MapInfo, in_type: u16, data: &[u8]) -> ParserResult<Rendered> {
    let in_type = TdhInType::from_raw(in_type);
    let size = integer_size(in_type).ok_or(TdhError::InvalidEventData)?;
    let value = utils::read_uint_le(take(data, size)?).ok_or(TdhError::InvalidEventData)? as u32;

    let text = if map.flags().is_bitmap() {
        let names = map
            .bit_names(value)
            .map_err(|_| TdhError::InvalidEventData)?;
        if names.is_empty() {
            return Err(TdhError::InvalidEventData);
        }
        names.join(",")
    } else {
        map.lookup(value)
            .map_err(|_| TdhError::InvalidEventData)?
            .ok_or(TdhError::InvalidEventData)?
    };
    Ok(Rendered::new(text, size))
}

/// Pure-Rust implementation of the "format property" primitive
///
/// Writes the rendered value as a null-terminated UTF-16 string into `buffer` and returns the
/// number of payload bytes the value spans. A value the map cannot translate is reported as
/// [`TdhError::InvalidEventData`].
pub fn format_property(request: &FormatRequest, buffer: &mut [u16]) -> ParserResult<u16> {
    let rendered = match request.map {
        Some(map) => render_mapped(map, request.in_type, request.user_data)?,
        None => render(
            request.in_type,
            request.out_type,
            request.length as usize,
            request.user_data,
            request.pointer_size,
        )?,
    };

    let units = rendered.text.as_str().into_utf16();
    if units.len() > buffer.len() {
        return Err(TdhError::InsufficientBuffer {
            required: (units.len() * 2) as u32,
        });
    }
    buffer[..units.len()].copy_from_slice(&units);

    u16::try_from(rendered.consumed).map_err(|_| TdhError::InvalidEventData)
}
