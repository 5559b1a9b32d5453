//! A schema-resolution backend that does not need the OS
//!
//! [`OfflineTdh`] serves schemas and value maps registered beforehand (typically built with
//! [`SchemaBuilder`](crate::schema::builder::SchemaBuilder) and
//! [`MapBuilder`](crate::schema::builder::MapBuilder), or captured on another machine), and renders
//! values with [`parser`](crate::parser).
use std::collections::HashMap;

use crate::guid::Guid;
use crate::native::tdh_types::TdhInType;
use crate::parser;
use crate::record::EventRecord;
use crate::schema::map_info::MapInfo;
use crate::schema::{PropertyCount, PropertyDescriptor, PropertyLength, Schema, SchemaResult};
use crate::tdh::{FormatRequest, Tdh, TdhError, TdhResult};
use crate::utils::{self, AlignedBuffer};

/// Classic events are told apart by their opcode, other events by their ID and version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OfflineKey {
    provider: Guid,
    id: u16,
    version: u8,
    opcode: Option<u8>,
}

/// Serves registered schemas and maps
///
/// # Example
/// ```
/// use etw_consumer::guid::Guid;
/// use etw_consumer::schema::builder::SchemaBuilder;
/// use etw_consumer::tdh::OfflineTdh;
///
/// let provider = Guid::parse("22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716").unwrap();
/// let mut tdh = OfflineTdh::new();
/// tdh.register_schema(SchemaBuilder::new(provider).event_id(1).build()).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct OfflineTdh {
    schemas: HashMap<OfflineKey, Schema>,
    maps: HashMap<String, MapInfo>,
}

impl OfflineTdh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `TRACE_EVENT_INFO` buffer. It replaces any schema registered for the same event.
    pub fn register_schema(&mut self, buffer: AlignedBuffer) -> SchemaResult<()> {
        let schema = Schema::from_buffer(buffer)?;
        let descriptor = schema.descriptor();
        let key = OfflineKey {
            provider: schema.provider_guid(),
            id: descriptor.id,
            version: descriptor.version,
            opcode: schema.is_mof().then_some(descriptor.opcode),
        };
        self.schemas.insert(key, schema);
        Ok(())
    }

    /// Register an `EVENT_MAP_INFO` buffer under `name`
    pub fn register_map(&mut self, name: &str, buffer: AlignedBuffer) -> SchemaResult<()> {
        self.maps.insert(name.to_string(), MapInfo::from_buffer(buffer)?);
        Ok(())
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    fn schema(&self, record: &EventRecord) -> TdhResult<&Schema> {
        let key = OfflineKey {
            provider: record.provider_id(),
            id: record.event_id(),
            version: record.version(),
            opcode: Some(record.opcode()),
        };
        self.schemas
            .get(&key)
            .or_else(|| self.schemas.get(&OfflineKey { opcode: None, ..key }))
            .ok_or(TdhError::NotFound)
    }

    /// Locate the runtime bytes of the top-level property `name`
    ///
    /// Properties are walked in order, members of structs included, resolving lengths and counts
    /// against the values of the integer properties already walked.
    fn locate<'a>(&self, record: &EventRecord<'a>, name: &str) -> TdhResult<&'a [u8]> {
        let schema = self.schema(record)?;
        let payload = record.user_buffer();
        let mut walk = PayloadWalk {
            record,
            payload,
            values: HashMap::new(),
            offset: 0,
        };

        for i in 0..schema.top_level_property_count() {
            let desc = schema.property(i).map_err(invalid_data)?;
            let start = walk.offset;
            for _ in 0..walk.count(&desc)? {
                match desc.struct_members() {
                    Some(members) => {
                        for j in members {
                            let member = schema.property(j).map_err(invalid_data)?;
                            if member.is_struct() {
                                return Err(TdhError::NotSupported("struct nested in a struct"));
                            }
                            walk.element(j, &member)?;
                        }
                    }
                    None => walk.element(i, &desc)?,
                }
            }

            if schema.property_name(&desc).map_err(invalid_data)? == name {
                return payload.get(start..walk.offset).ok_or(TdhError::InvalidEventData);
            }
        }
        Err(TdhError::NotFound)
    }
}

fn invalid_data<E>(_: E) -> TdhError {
    TdhError::InvalidEventData
}

/// Cursor over the payload of one record
struct PayloadWalk<'r, 'a> {
    record: &'r EventRecord<'a>,
    payload: &'a [u8],
    /// Values of the scalar integer properties walked so far, by property index
    values: HashMap<u32, u64>,
    offset: usize,
}

impl PayloadWalk<'_, '_> {
    fn value(&self, index: u16) -> TdhResult<usize> {
        let value = self
            .values
            .get(&(index as u32))
            .ok_or(TdhError::InvalidEventData)?;
        usize::try_from(*value).map_err(invalid_data)
    }

    fn count(&self, desc: &PropertyDescriptor) -> TdhResult<usize> {
        match desc.count {
            _ if !desc.is_array() => Ok(1),
            PropertyCount::Count(c) => Ok(c as usize),
            PropertyCount::Index(j) => self.value(j),
        }
    }

    /// Step over one element of the scalar property at `index`
    fn element(&mut self, index: u32, desc: &PropertyDescriptor) -> TdhResult<()> {
        let pointer_size = self.record.pointer_size();
        let length = match desc.length {
            PropertyLength::Length(l) => l as usize,
            PropertyLength::Index(j) => self.value(j)?,
        };

        let rest = self.payload.get(self.offset..).ok_or(TdhError::InvalidEventData)?;
        let size = match desc.in_type() {
            TdhInType::InTypePointer | TdhInType::InTypeSizeT => pointer_size,
            _ if length > 0 => length,
            _ => {
                let (in_type, out_type) = (desc.raw_in_type(), desc.raw_out_type());
                parser::render(in_type, out_type, 0, rest, pointer_size)?.consumed
            }
        };
        let bytes = rest.get(..size).ok_or(TdhError::InvalidEventData)?;
        self.offset += size;

        if !desc.is_array() && desc.in_type().is_integer() {
            if let Some(value) = utils::read_uint_le(bytes) {
                self.values.insert(index, value);
            }
        }
        Ok(())
    }
}

fn copy_into(bytes: &[u8], buffer: &mut AlignedBuffer) -> TdhResult<()> {
    if buffer.len() < bytes.len() {
        return Err(TdhError::InsufficientBuffer {
            required: bytes.len() as u32,
        });
    }
    buffer.resize(bytes.len());
    buffer.as_bytes_mut().copy_from_slice(bytes);
    Ok(())
}

impl Tdh for OfflineTdh {
    fn event_information(&self, record: &EventRecord, buffer: &mut AlignedBuffer) -> TdhResult<()> {
        copy_into(self.schema(record)?.as_bytes(), buffer)
    }

    fn event_map_information(
        &self,
        _record: &EventRecord,
        map_name: &str,
        buffer: &mut AlignedBuffer,
    ) -> TdhResult<()> {
        let map = self.maps.get(map_name).ok_or(TdhError::NotFound)?;
        copy_into(map.as_bytes(), buffer)
    }

    fn property_size(&self, record: &EventRecord, name: &str) -> TdhResult<u32> {
        Ok(self.locate(record, name)?.len() as u32)
    }

    fn property(&self, record: &EventRecord, name: &str, buffer: &mut [u8]) -> TdhResult<()> {
        let bytes = self.locate(record, name)?;
        if buffer.len() < bytes.len() {
            return Err(TdhError::InsufficientBuffer {
                required: bytes.len() as u32,
            });
        }
        buffer[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn format_property(&self, request: &FormatRequest, buffer: &mut [u16]) -> TdhResult<u16> {
        parser::format_property(request, buffer)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::native::tdh_types::{DecodingSource, MapFlags, TdhOutType};
    use crate::record::{EventDescriptor, EventHeader};
    use crate::schema::builder::{MapBuilder, PropertyBuilder, SchemaBuilder};
    use crate::tdh;

    fn provider() -> Guid {
        Guid::parse("22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716").unwrap()
    }

    fn header(id: u16, opcode: u8) -> EventHeader {
        EventHeader {
            provider_id: provider(),
            descriptor: EventDescriptor {
                id,
                opcode,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn tdh() -> OfflineTdh {
        let mut tdh = OfflineTdh::new();
        tdh.register_schema(
            SchemaBuilder::new(provider())
                .event_id(1)
                .property(PropertyBuilder::scalar(
                    "Name",
                    TdhInType::InTypeUnicodeString,
                    TdhOutType::OutTypeString,
                ))
                .property(
                    PropertyBuilder::scalar(
                        "Size",
                        TdhInType::InTypeUInt16,
                        TdhOutType::OutTypeUInt16,
                    )
                    .length(2),
                )
                .property(
                    PropertyBuilder::scalar(
                        "Blob",
                        TdhInType::InTypeBinary,
                        TdhOutType::OutTypeHexBinary,
                    )
                    .length_from(1),
                )
                .build(),
        )
        .unwrap();
        tdh
    }

    #[test]
    fn test_schema_lookup() {
        let tdh = tdh();
        let record = EventRecord::new(header(1, 0), &[]);
        let schema = tdh::event_schema(&tdh, &record).unwrap();
        assert_eq!(schema.property_count(), 3);

        let unknown = EventRecord::new(header(2, 0), &[]);
        assert!(matches!(
            tdh::event_schema(&tdh, &unknown),
            Err(crate::schema::SchemaError::Tdh(TdhError::NotFound))
        ));
    }

    #[test]
    fn test_mof_schemas_are_keyed_on_opcode() {
        let mut tdh = OfflineTdh::new();
        for opcode in [1, 2] {
            tdh.register_schema(
                SchemaBuilder::new(provider())
                    .decoding_source(DecodingSource::DecodingSourceWbem)
                    .opcode(opcode)
                    .build(),
            )
            .unwrap();
        }
        assert_eq!(tdh.schema_count(), 2);
        let schema = tdh::event_schema(&tdh, &EventRecord::new(header(0, 2), &[])).unwrap();
        assert_eq!(schema.descriptor().opcode, 2);
    }

    #[test]
    fn test_property_queries() {
        let tdh = tdh();
        let payload = [b'a', 0, 0, 0, 3, 0, 0xaa, 0xbb, 0xcc];
        let record = EventRecord::new(header(1, 0), &payload);

        assert_eq!(tdh.property_size(&record, "Size").unwrap(), 2);
        assert_eq!(tdh::property_value(&tdh, &record, "Size").unwrap(), vec![3, 0]);
        assert_eq!(tdh.property_size(&record, "Blob").unwrap(), 3);
        assert!(matches!(
            tdh.property_size(&record, "Missing"),
            Err(TdhError::NotFound)
        ));

        let mut small = [0u8; 1];
        assert!(matches!(
            tdh.property(&record, "Size", &mut small),
            Err(TdhError::InsufficientBuffer { required: 2 })
        ));
    }

    #[test]
    fn test_properties_after_a_struct() {
        let mut tdh = OfflineTdh::new();
        tdh.register_schema(
            SchemaBuilder::new(provider())
                .event_id(4)
                .property(PropertyBuilder::structure(
                    "Header",
                    vec![
                        PropertyBuilder::scalar(
                            "Tag",
                            TdhInType::InTypeUInt8,
                            TdhOutType::OutTypeUInt8,
                        )
                        .length(1),
                        PropertyBuilder::scalar(
                            "Path",
                            TdhInType::InTypeUnicodeString,
                            TdhOutType::OutTypeString,
                        ),
                    ],
                ))
                .property(
                    PropertyBuilder::scalar(
                        "Count",
                        TdhInType::InTypeUInt32,
                        TdhOutType::OutTypeUInt32,
                    )
                    .length(4),
                )
                .build(),
        )
        .unwrap();
        let payload = [7, b'x', 0, 0, 0, 9, 0, 0, 0];
        let record = EventRecord::new(header(4, 0), &payload);

        assert_eq!(tdh.property_size(&record, "Header").unwrap(), 5);
        assert_eq!(tdh::property_value(&tdh, &record, "Count").unwrap(), vec![9, 0, 0, 0]);
    }

    #[test]
    fn test_maps() {
        let mut tdh = tdh();
        tdh.register_map(
            "Map",
            MapBuilder::new("Map", MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_VALUEMAP)
                .entry(1, "One")
                .build(),
        )
        .unwrap();
        let record = EventRecord::new(header(1, 0), &[]);
        let map = tdh::event_map_info(&tdh, &record, "Map").unwrap();
        assert_eq!(map.lookup(1).unwrap().as_deref(), Some("One"));
        assert!(tdh::event_map_info(&tdh, &record, "Other").is_err());
    }
}
