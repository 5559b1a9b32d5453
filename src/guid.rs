//! 128-bit identifiers used by providers, events and activities
use std::fmt;
use std::str::FromStr;

use zerocopy::{AsBytes, FromBytes, FromZeroes};

/// GUID module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidError {
    /// The text is not a `8-4-4-4-12` hex GUID, with or without braces
    BadFormat(String),
}

impl std::fmt::Display for GuidError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadFormat(s) => write!(f, "invalid GUID string {:?}", s),
        }
    }
}

impl std::error::Error for GuidError {}

pub type GuidResult<T> = Result<T, GuidError>;

/// The [`GUID`](https://docs.microsoft.com/en-us/windows/win32/api/guiddef/ns-guiddef-guid) layout
///
/// Equality is byte-wise. The all-zero value is the "null" GUID, used as a sentinel
/// (e.g. when an event carries no related activity).
#[repr(C)]
#[derive(
    Default, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, AsBytes, FromBytes, FromZeroes,
)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn from_values(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Guid {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub const fn zeroed() -> Self {
        Self::from_values(0, 0, 0, [0; 8])
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zeroed()
    }

    /// Parse `XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX`, optionally surrounded by braces, in any case
    pub fn parse(s: &str) -> GuidResult<Self> {
        let bad = || GuidError::BadFormat(s.to_string());

        let inner = match (s.strip_prefix('{'), s.ends_with('}')) {
            (Some(rest), true) => &rest[..rest.len() - 1],
            (None, false) => s,
            _ => return Err(bad()),
        };

        let bytes = inner.as_bytes();
        if bytes.len() != 36 {
            return Err(bad());
        }
        for (i, b) in bytes.iter().enumerate() {
            let valid = match i {
                8 | 13 | 18 | 23 => *b == b'-',
                _ => b.is_ascii_hexdigit(),
            };
            if !valid {
                return Err(bad());
            }
        }

        let data1 = u32::from_str_radix(&inner[0..8], 16).map_err(|_| bad())?;
        let data2 = u16::from_str_radix(&inner[9..13], 16).map_err(|_| bad())?;
        let data3 = u16::from_str_radix(&inner[14..18], 16).map_err(|_| bad())?;
        let mut data4 = [0u8; 8];
        let tail = [&inner[19..23], &inner[24..36]].concat();
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[2 * i..2 * i + 2], 16).map_err(|_| bad())?;
        }

        Ok(Guid::from_values(data1, data2, data3, data4))
    }

    /// Read a GUID stored in its in-memory (little-endian fields) layout
    pub fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let mut guid = Guid::read_from_prefix(bytes)?;
        guid.data1 = u32::from_le(guid.data1);
        guid.data2 = u16::from_le(guid.data2);
        guid.data3 = u16::from_le(guid.data3);
        Some(guid)
    }
}

impl FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Guid::parse(s)
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            fmt,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, fmt)
    }
}

#[cfg(windows)]
impl From<windows::core::GUID> for Guid {
    fn from(value: windows::core::GUID) -> Self {
        Guid::from_values(value.data1, value.data2, value.data3, value.data4)
    }
}

#[cfg(windows)]
impl From<Guid> for windows::core::GUID {
    fn from(value: Guid) -> Self {
        windows::core::GUID::from_values(value.data1, value.data2, value.data3, value.data4)
    }
}
