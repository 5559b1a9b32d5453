//! Length and count resolution of properties
//!
//! The length (in bytes) and the element count of a property are either static fields of its
//! descriptor, or the runtime value of another property of the same record. The latter are
//! queried from the schema-resolution API with a size-then-fetch query.
use crate::helper::{DecodeError, DecodeResult};
use crate::native::tdh_types::{TdhInType, TdhOutType};
use crate::parser;
use crate::record::EventRecord;
use crate::schema::{PropertyCount, PropertyDescriptor, PropertyLength, Schema};
use crate::tdh::{self, Tdh, TdhError};
use crate::utils;

/// `sizeof(IN6_ADDR)`
const IPV6_SIZE: u32 = 16;

pub struct LengthResolver<'a, 'r> {
    schema: &'a Schema,
    record: &'a EventRecord<'r>,
    tdh: &'a dyn Tdh,
}

impl<'a, 'r> LengthResolver<'a, 'r> {
    pub fn new(schema: &'a Schema, record: &'a EventRecord<'r>, tdh: &'a dyn Tdh) -> Self {
        LengthResolver {
            schema,
            record,
            tdh,
        }
    }

    /// Runtime value of the integer property at `index`
    pub fn runtime_value(&self, index: u16) -> DecodeResult<u64> {
        let desc = self.schema.property(index as u32)?;
        let name = self.schema.property_name(&desc)?;
        let bytes = tdh::property_value(self.tdh, self.record, &name)?;

        // little endian, whatever the size
        Ok(bytes
            .iter()
            .take(8)
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    /// Length in bytes of one element of the property, 0 meaning "determined from the data"
    pub fn property_length(&self, desc: &PropertyDescriptor) -> DecodeResult<u32> {
        match desc.length {
            PropertyLength::Index(j) => {
                let value = self.runtime_value(j)?;
                u32::try_from(value).map_err(|_| DecodeError::LengthOverflow { index: j, value })
            }
            PropertyLength::Length(l) if l > 0 => Ok(l as u32),
            PropertyLength::Length(_) => self.zero_length(desc),
        }
    }

    fn zero_length(&self, desc: &PropertyDescriptor) -> DecodeResult<u32> {
        if desc.is_struct() {
            return Ok(0);
        }

        let in_type = desc.in_type();
        match in_type {
            TdhInType::InTypeBinary if desc.out_type() == TdhOutType::OutTypeIpv6 => Ok(IPV6_SIZE),
            TdhInType::InTypeUnicodeString
            | TdhInType::InTypeAnsiString
            | TdhInType::InTypeSid
            | TdhInType::InTypeWbemSid => Ok(0),
            TdhInType::InTypePointer | TdhInType::InTypeSizeT => {
                Ok(self.record.pointer_size() as u32)
            }
            _ if in_type.is_counted_string() => Ok(0),
            _ => Err(DecodeError::UnexpectedZeroLength {
                in_type: desc.raw_in_type(),
                out_type: desc.raw_out_type(),
            }),
        }
    }

    /// Number of elements of the property: 1 unless it is an array
    pub fn array_count(&self, desc: &PropertyDescriptor) -> DecodeResult<u16> {
        if !desc.is_array() {
            return Ok(1);
        }
        match desc.count {
            PropertyCount::Count(c) => Ok(c),
            PropertyCount::Index(j) => {
                let count = self.runtime_value(j)?;
                Ok(u16::try_from(count).unwrap_or(u16::MAX))
            }
        }
    }

    /// Number of payload bytes one element of the property spans
    ///
    /// `length` comes from [`LengthResolver::property_length`] and `remaining` is the payload
    /// from the element start to the end.
    pub fn runtime_size(
        &self,
        desc: &PropertyDescriptor,
        length: u32,
        remaining: &[u8],
    ) -> DecodeResult<usize> {
        if length > 0 {
            return Ok(length as usize);
        }

        let pointer_size = self.record.pointer_size();
        let invalid = || DecodeError::Tdh(TdhError::InvalidEventData);
        let size = match desc.in_type() {
            TdhInType::InTypeUnicodeString => {
                utils::utf16z_size(remaining).unwrap_or(remaining.len())
            }
            TdhInType::InTypeAnsiString => utils::ansiz_size(remaining).unwrap_or(remaining.len()),
            TdhInType::InTypeSid => parser::sid_size(remaining).ok_or_else(invalid)?,
            TdhInType::InTypeWbemSid => {
                let header = 2 * pointer_size;
                let sid = remaining
                    .get(header..)
                    .and_then(parser::sid_size)
                    .ok_or_else(invalid)?;
                header + sid
            }
            TdhInType::InTypeCountedString
            | TdhInType::InTypeCountedAnsiString
            | TdhInType::InTypeReversedCountedString
            | TdhInType::InTypeReversedCountedAnsiString => {
                let prefix: [u8; 2] = remaining
                    .get(..2)
                    .and_then(|p| p.try_into().ok())
                    .ok_or_else(invalid)?;
                let len = match desc.in_type() {
                    TdhInType::InTypeReversedCountedString
                    | TdhInType::InTypeReversedCountedAnsiString => u16::from_be_bytes(prefix),
                    _ => u16::from_le_bytes(prefix),
                };
                2 + len as usize
            }
            TdhInType::InTypeNonNullTerminatedString
            | TdhInType::InTypeNonNullTerminatedAnsiString => remaining.len(),
            _ => {
                let name = self.schema.property_name(desc)?;
                self.tdh.property_size(self.record, &name)? as usize
            }
        };
        Ok(size)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::guid::Guid;
    use crate::native::tdh_types::PropertyFlags;
    use crate::record::{EventDescriptor, EventHeader, EVENT_HEADER_FLAG_32_BIT_HEADER};
    use crate::schema::builder::{PropertyBuilder, SchemaBuilder};
    use crate::tdh::OfflineTdh;

    fn provider() -> Guid {
        Guid::parse("22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716").unwrap()
    }

    fn header() -> EventHeader {
        EventHeader {
            provider_id: provider(),
            descriptor: EventDescriptor {
                id: 7,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn setup(properties: Vec<PropertyBuilder>) -> (OfflineTdh, Schema) {
        let mut builder = SchemaBuilder::new(provider()).event_id(7);
        for p in properties {
            builder = builder.property(p);
        }
        let buffer = builder.build();
        let mut tdh = OfflineTdh::new();
        tdh.register_schema(buffer.clone()).unwrap();
        (tdh, Schema::from_buffer(buffer).unwrap())
    }

    fn scalar(name: &str, in_type: TdhInType, out_type: TdhOutType) -> PropertyBuilder {
        PropertyBuilder::scalar(name, in_type, out_type)
    }

    #[test]
    fn test_length_table() {
        let (tdh, schema) = setup(vec![
            scalar("Static", TdhInType::InTypeUInt32, TdhOutType::OutTypeUInt32).length(4),
            scalar("Ip", TdhInType::InTypeBinary, TdhOutType::OutTypeIpv6),
            scalar("Wide", TdhInType::InTypeUnicodeString, TdhOutType::OutTypeString),
            scalar("Ansi", TdhInType::InTypeAnsiString, TdhOutType::OutTypeString),
            scalar("Sid", TdhInType::InTypeSid, TdhOutType::OutTypeString),
            scalar("WbemSid", TdhInType::InTypeWbemSid, TdhOutType::OutTypeString),
            PropertyBuilder::structure("Struct", vec![]),
            scalar("Ptr", TdhInType::InTypePointer, TdhOutType::OutTypeHexInt64),
            scalar("Counted", TdhInType::InTypeCountedString, TdhOutType::OutTypeString),
            scalar("Int", TdhInType::InTypeUInt32, TdhOutType::OutTypeUInt32),
            scalar("Bin", TdhInType::InTypeBinary, TdhOutType::OutTypeHexBinary),
        ]);
        let record = EventRecord::new(header(), &[]);
        let resolver = LengthResolver::new(&schema, &record, &tdh);
        let length = |i| resolver.property_length(&schema.property(i).unwrap());

        assert_eq!(length(0).unwrap(), 4);
        assert_eq!(length(1).unwrap(), 16);
        for i in 2..=6 {
            assert_eq!(length(i).unwrap(), 0);
        }
        assert_eq!(length(7).unwrap(), 8);
        assert_eq!(length(8).unwrap(), 0);
        assert!(matches!(
            length(9),
            Err(DecodeError::UnexpectedZeroLength { in_type: 8, out_type: 8 })
        ));
        assert!(matches!(
            length(10),
            Err(DecodeError::UnexpectedZeroLength { in_type: 14, .. })
        ));

        let mut h = header();
        h.flags = EVENT_HEADER_FLAG_32_BIT_HEADER;
        let record32 = EventRecord::new(h, &[]);
        let resolver32 = LengthResolver::new(&schema, &record32, &tdh);
        assert_eq!(resolver32.property_length(&schema.property(7).unwrap()).unwrap(), 4);
    }

    #[test]
    fn test_parameterized_length_and_count() {
        let (tdh, schema) = setup(vec![
            scalar("Len", TdhInType::InTypeUInt16, TdhOutType::OutTypeUInt16).length(2),
            scalar("Count", TdhInType::InTypeUInt8, TdhOutType::OutTypeUInt8).length(1),
            scalar("Data", TdhInType::InTypeBinary, TdhOutType::OutTypeHexBinary).length_from(0),
            scalar("Items", TdhInType::InTypeUInt16, TdhOutType::OutTypeUInt16)
                .length(2)
                .count_from(1),
        ]);
        let payload = [3, 0, 2, 1, 2, 3, 10, 0, 11, 0];
        let record = EventRecord::new(header(), &payload);
        let resolver = LengthResolver::new(&schema, &record, &tdh);

        let data = schema.property(2).unwrap();
        assert_eq!(resolver.property_length(&data).unwrap(), 3);
        assert_eq!(resolver.array_count(&data).unwrap(), 1);

        let items = schema.property(3).unwrap();
        assert!(items.is_array());
        assert_eq!(resolver.array_count(&items).unwrap(), 2);
        assert_eq!(resolver.runtime_value(1).unwrap(), 2);
    }

    #[test]
    fn test_length_overflow() {
        let (tdh, schema) = setup(vec![
            scalar("Len", TdhInType::InTypeUInt64, TdhOutType::OutTypeUInt64).length(8),
            scalar("Data", TdhInType::InTypeBinary, TdhOutType::OutTypeHexBinary).length_from(0),
        ]);
        let payload = (u32::MAX as u64 + 1).to_le_bytes();
        let record = EventRecord::new(header(), &payload);
        let resolver = LengthResolver::new(&schema, &record, &tdh);

        assert!(matches!(
            resolver.property_length(&schema.property(1).unwrap()),
            Err(DecodeError::LengthOverflow { index: 0, value }) if value == 1 << 32
        ));
    }

    #[test]
    fn test_array_count_rule() {
        let (tdh, schema) = setup(vec![
            scalar("Plain", TdhInType::InTypeUInt8, TdhOutType::OutTypeUInt8)
                .length(1)
                .flags(PropertyFlags::empty()),
            scalar("Empty", TdhInType::InTypeUInt8, TdhOutType::OutTypeUInt8)
                .length(1)
                .count(0),
            scalar("Fixed", TdhInType::InTypeUInt8, TdhOutType::OutTypeUInt8)
                .length(1)
                .count(3),
        ]);
        let record = EventRecord::new(header(), &[]);
        let resolver = LengthResolver::new(&schema, &record, &tdh);
        let count = |i| resolver.array_count(&schema.property(i).unwrap()).unwrap();
        assert_eq!(count(0), 1);
        assert_eq!(count(1), 0);
        assert_eq!(count(2), 3);
    }

    #[test]
    fn test_runtime_sizes() {
        let (tdh, schema) = setup(vec![
            scalar("Wide", TdhInType::InTypeUnicodeString, TdhOutType::OutTypeString),
            scalar("Counted", TdhInType::InTypeReversedCountedString, TdhOutType::OutTypeString),
            scalar("Sid", TdhInType::InTypeSid, TdhOutType::OutTypeString),
        ]);
        let record = EventRecord::new(header(), &[]);
        let resolver = LengthResolver::new(&schema, &record, &tdh);
        let size = |i, remaining: &[u8]| {
            resolver.runtime_size(&schema.property(i).unwrap(), 0, remaining)
        };

        assert_eq!(size(0, &[b'a', 0, 0, 0, 9, 9]).unwrap(), 4);
        assert_eq!(size(0, &[b'a', 0, b'b', 0]).unwrap(), 4);
        assert_eq!(size(1, &[0, 4, 1, 2, 3, 4]).unwrap(), 6);
        assert_eq!(size(2, &[1, 2, 0, 0, 0, 0, 0, 5, 21, 0, 0, 0, 1, 0, 0, 0]).unwrap(), 16);
        assert!(size(2, &[1, 2, 0]).is_err());
        assert_eq!(
            resolver.runtime_size(&schema.property(0).unwrap(), 6, &[]).unwrap(),
            6
        );
    }
}
