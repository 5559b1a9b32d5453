//! Implements wrappers for various Windows time structures.
//!
//! These are decoded from raw little-endian bytes, so they are available on every platform.
use ::time::format_description::well_known::Rfc3339;
use ::time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Wrapper for [FILETIME](https://learn.microsoft.com/en-us/windows/win32/api/minwinbase/ns-minwinbase-filetime)
///
/// The inner value counts 100ns intervals since 1601-01-01 UTC.
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct FileTime(i64);

const SECONDS_BETWEEN_1601_AND_1970: i64 = 11_644_473_600;
const NS_IN_SECOND: i64 = 1_000_000_000;
const MS_IN_SECOND: i64 = 1_000;

impl FileTime {
    pub fn from_quad(quad: i64) -> Self {
        FileTime(quad)
    }

    pub fn from_slice(slice: &[u8; 8]) -> Self {
        FileTime(i64::from_le_bytes(*slice))
    }

    pub fn as_quad(&self) -> i64 {
        self.0
    }

    /// Converts to a unix timestamp with millisecond granularity.
    pub fn as_unix_timestamp(&self) -> i64 {
        self.0 / 10_000 - (SECONDS_BETWEEN_1601_AND_1970 * MS_IN_SECOND)
    }

    /// Converts to a unix timestamp with nanosecond granularity.
    pub fn as_unix_timestamp_nanos(&self) -> i128 {
        self.0 as i128 * 100 - (SECONDS_BETWEEN_1601_AND_1970 as i128 * NS_IN_SECOND as i128)
    }

    /// Converts to OffsetDateTime, `None` when out of the representable range
    pub fn as_date_time(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp_nanos(self.as_unix_timestamp_nanos()).ok()
    }
}

/// Wrapper for [SYSTEMTIME](https://learn.microsoft.com/en-us/windows/win32/api/minwinbase/ns-minwinbase-systemtime)
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct SystemTime {
    pub year: u16,
    pub month: u16,
    pub day_of_week: u16,
    pub day: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
    pub milliseconds: u16,
}

impl SystemTime {
    pub fn from_slice(slice: &[u8; 16]) -> Self {
        let field = |i: usize| u16::from_le_bytes([slice[2 * i], slice[2 * i + 1]]);
        SystemTime {
            year: field(0),
            month: field(1),
            day_of_week: field(2),
            day: field(3),
            hour: field(4),
            minute: field(5),
            second: field(6),
            milliseconds: field(7),
        }
    }

    /// Converts to OffsetDateTime (SYSTEMTIME values are UTC), `None` for invalid dates
    pub fn as_date_time(&self) -> Option<OffsetDateTime> {
        let month = Month::try_from(u8::try_from(self.month).ok()?).ok()?;
        let date = Date::from_calendar_date(self.year as i32, month, u8::try_from(self.day).ok()?)
            .ok()?;
        let time = Time::from_hms_milli(
            u8::try_from(self.hour).ok()?,
            u8::try_from(self.minute).ok()?,
            u8::try_from(self.second).ok()?,
            self.milliseconds,
        )
        .ok()?;
        Some(PrimitiveDateTime::new(date, time).assume_utc())
    }
}

/// RFC 3339 rendering, `None` for dates the format cannot represent
pub fn format_rfc3339(date_time: OffsetDateTime) -> Option<String> {
    date_time.format(&Rfc3339).ok()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_filetime() {
        // 2020-01-01T00:00:00Z
        let ft = FileTime::from_quad(132_223_104_000_000_000);
        assert_eq!(ft.as_unix_timestamp(), 1_577_836_800_000);
        let dt = ft.as_date_time().unwrap();
        assert_eq!(format_rfc3339(dt).unwrap(), "2020-01-01T00:00:00Z");

        let same = FileTime::from_slice(&132_223_104_000_000_000i64.to_le_bytes());
        assert_eq!(same, ft);
    }

    #[test]
    fn test_systemtime() {
        let mut raw = [0u8; 16];
        for (i, v) in [2021u16, 3, 2, 9, 13, 45, 30, 250].iter().enumerate() {
            raw[2 * i..2 * i + 2].copy_from_slice(&v.to_le_bytes());
        }
        let st = SystemTime::from_slice(&raw);
        assert_eq!(st.second, 30);
        let dt = st.as_date_time().unwrap();
        assert_eq!(format_rfc3339(dt).unwrap(), "2021-03-09T13:45:30.25Z");

        let invalid = SystemTime {
            month: 13,
            ..st
        };
        assert!(invalid.as_date_time().is_none());
    }
}
