//! Schema-resolution boundary
//!
//! Decoding a record requires four services from the trace decoding helper (TDH) API: resolving
//! the schema of the record, resolving a value map by name, querying the runtime size and value of
//! a property, and formatting a property value into text.
//!
//! They are abstracted behind the [`Tdh`] trait so that the decoding pipeline can run against the
//! system implementation ([`SystemTdh`](crate::native::SystemTdh), Windows only) or against
//! schemas known beforehand ([`OfflineTdh`]).
//!
//! Every variable-size query follows the same two-phase convention: a call with a buffer too small
//! fails with [`TdhError::InsufficientBuffer`] carrying the required size, and the caller grows
//! its buffer and retries (see [`query_with_retry`]).
use crate::record::EventRecord;
use crate::schema::map_info::MapInfo;
use crate::schema::Schema;
use crate::utils::AlignedBuffer;

pub mod offline;
pub use offline::OfflineTdh;

/// Maximum number of attempts of a grow-and-retry query
pub const MAX_RETRIES: usize = 8;

/// Tdh module errors
#[derive(Debug)]
pub enum TdhError {
    /// The output buffer is too small. `required` is in bytes, 0 when unknown
    InsufficientBuffer { required: u32 },
    /// The payload does not match what the type (or the value map) expects
    InvalidEventData,
    /// No schema, map or property matches the request
    NotFound,
    /// The request cannot be served by this implementation
    NotSupported(&'static str),
    /// The buffer kept being too small after [`MAX_RETRIES`] attempts
    RetriesExhausted,
    /// Represents an error from the OS
    Os(std::io::Error),
}

impl From<std::io::Error> for TdhError {
    fn from(err: std::io::Error) -> Self {
        TdhError::Os(err)
    }
}

impl std::fmt::Display for TdhError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientBuffer { required } => {
                write!(f, "insufficient buffer ({} bytes required)", required)
            }
            Self::InvalidEventData => write!(f, "invalid event data"),
            Self::NotFound => write!(f, "not found"),
            Self::NotSupported(what) => write!(f, "not supported: {}", what),
            Self::RetriesExhausted => {
                write!(f, "buffer still too small after {} attempts", MAX_RETRIES)
            }
            Self::Os(e) => write!(f, "os error: {}", e),
        }
    }
}

impl std::error::Error for TdhError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Os(e) => Some(e),
            _ => None,
        }
    }
}

pub type TdhResult<T> = Result<T, TdhError>;

/// Arguments of a "format property" call
///
/// `user_data` starts at the property to format and extends to the end of the payload.
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest<'a> {
    pub schema: &'a Schema,
    pub map: Option<&'a MapInfo>,
    pub pointer_size: usize,
    pub in_type: u16,
    pub out_type: u16,
    /// Length of the property, 0 when it must be determined from the data
    pub length: u16,
    pub user_data: &'a [u8],
}

/// The services the decoding pipeline needs from the schema-resolution API
pub trait Tdh: Send + Sync {
    /// Write the `TRACE_EVENT_INFO` of `record` into `buffer`
    ///
    /// Fails with [`TdhError::InsufficientBuffer`] when `buffer` is too small.
    fn event_information(&self, record: &EventRecord, buffer: &mut AlignedBuffer) -> TdhResult<()>;

    /// Write the `EVENT_MAP_INFO` named `map_name` into `buffer`
    fn event_map_information(
        &self,
        record: &EventRecord,
        map_name: &str,
        buffer: &mut AlignedBuffer,
    ) -> TdhResult<()>;

    /// Size in bytes of the runtime value of the top-level property `name`
    fn property_size(&self, record: &EventRecord, name: &str) -> TdhResult<u32>;

    /// Copy the runtime value of the top-level property `name` into `buffer`
    fn property(&self, record: &EventRecord, name: &str, buffer: &mut [u8]) -> TdhResult<()>;

    /// Format one property value as a null-terminated UTF-16 string into `buffer`
    ///
    /// Returns the number of bytes of `request.user_data` the value spans.
    fn format_property(&self, request: &FormatRequest, buffer: &mut [u16]) -> TdhResult<u16>;
}

/// Run a two-phase query, growing `buffer` each time it is reported too small
///
/// The query is assumed to be free of side effects, so that it can be repeated.
pub fn query_with_retry<F>(buffer: &mut AlignedBuffer, mut query: F) -> TdhResult<()>
where
    F: FnMut(&mut AlignedBuffer) -> TdhResult<()>,
{
    for _ in 0..MAX_RETRIES {
        match query(buffer) {
            Err(TdhError::InsufficientBuffer { required }) => {
                let required = required as usize;
                let grown = if required > buffer.len() {
                    required
                } else {
                    (buffer.len() * 2).max(64)
                };
                buffer.resize(grown);
            }
            other => return other,
        }
    }
    Err(TdhError::RetriesExhausted)
}

/// Resolve the schema of `record`
pub fn event_schema(tdh: &dyn Tdh, record: &EventRecord) -> crate::schema::SchemaResult<Schema> {
    let mut buffer = AlignedBuffer::new();
    query_with_retry(&mut buffer, |b| tdh.event_information(record, b))?;
    Schema::from_buffer(buffer)
}

/// Resolve the value map named `map_name`
pub fn event_map_info(
    tdh: &dyn Tdh,
    record: &EventRecord,
    map_name: &str,
) -> crate::schema::SchemaResult<MapInfo> {
    let mut buffer = AlignedBuffer::new();
    query_with_retry(&mut buffer, |b| tdh.event_map_information(record, map_name, b))?;
    MapInfo::from_buffer(buffer)
}

/// Size-then-fetch query of the runtime value of a property
pub fn property_value(tdh: &dyn Tdh, record: &EventRecord, name: &str) -> TdhResult<Vec<u8>> {
    let mut size = tdh.property_size(record, name)? as usize;
    for _ in 0..MAX_RETRIES {
        let mut buffer = vec![0u8; size];
        match tdh.property(record, name, &mut buffer) {
            Ok(()) => return Ok(buffer),
            Err(TdhError::InsufficientBuffer { required }) => {
                size = (required as usize).max(size * 2).max(1);
            }
            Err(e) => return Err(e),
        }
    }
    Err(TdhError::RetriesExhausted)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_query_with_retry_grows() {
        let mut buffer = AlignedBuffer::new();
        let mut calls = 0;
        query_with_retry(&mut buffer, |b| {
            calls += 1;
            if b.len() < 100 {
                Err(TdhError::InsufficientBuffer { required: 100 })
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert_eq!(calls, 2);
        assert_eq!(buffer.len(), 100);
    }

    #[test]
    fn test_query_with_retry_unknown_size() {
        let mut buffer = AlignedBuffer::new();
        query_with_retry(&mut buffer, |b| {
            if b.len() < 200 {
                Err(TdhError::InsufficientBuffer { required: 0 })
            } else {
                Ok(())
            }
        })
        .unwrap();
        assert!(buffer.len() >= 200);
    }

    #[test]
    fn test_query_with_retry_is_bounded() {
        let mut buffer = AlignedBuffer::new();
        let mut calls = 0;
        let res = query_with_retry(&mut buffer, |_| {
            calls += 1;
            Err(TdhError::InsufficientBuffer { required: 0 })
        });
        assert!(matches!(res, Err(TdhError::RetriesExhausted)));
        assert_eq!(calls, MAX_RETRIES);
    }

    #[test]
    fn test_query_with_retry_surfaces_errors() {
        let mut buffer = AlignedBuffer::new();
        let res = query_with_retry(&mut buffer, |_| Err(TdhError::NotFound));
        assert!(matches!(res, Err(TdhError::NotFound)));
    }
}
