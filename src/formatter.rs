//! Property value formatting
//!
//! A [`ValueFormatter`] turns the raw bytes of a [`Property`] into text through the "format
//! property" primitive of the schema-resolution API, translating the value through the value map
//! the property declares, if any.
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::helper::{DecodeError, DecodeResult};
use crate::property::Property;
use crate::record::EventRecord;
use crate::schema::map_info::MapInfo;
use crate::schema::{PropertyDescriptor, Schema};
use crate::tdh::{self, FormatRequest, Tdh, TdhError, MAX_RETRIES};

/// Initial size of the output buffer, in UTF-16 units
const INITIAL_BUFFER_UNITS: usize = 64;

/// Value maps already fetched for one record, keyed on their name
#[derive(Default)]
pub struct MapCache(RefCell<HashMap<String, Rc<MapInfo>>>);

pub struct ValueFormatter<'a, 'r> {
    schema: &'a Schema,
    record: &'a EventRecord<'r>,
    tdh: &'a dyn Tdh,
    maps: &'a MapCache,
}

impl<'a, 'r> ValueFormatter<'a, 'r> {
    pub fn new(
        schema: &'a Schema,
        record: &'a EventRecord<'r>,
        tdh: &'a dyn Tdh,
        maps: &'a MapCache,
    ) -> Self {
        ValueFormatter {
            schema,
            record,
            tdh,
            maps,
        }
    }

    /// The value map of a property, with the trailing spaces of manifest maps stripped
    pub fn map_info(&self, desc: &PropertyDescriptor) -> DecodeResult<Option<Rc<MapInfo>>> {
        let offset = match desc.map_name_offset() {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let name = self.schema.string_at(offset)?;
        if let Some(map) = self.maps.0.borrow().get(&name) {
            return Ok(Some(Rc::clone(map)));
        }

        let mut map = tdh::event_map_info(self.tdh, self.record, &name)?;
        map.strip_trailing_spaces();
        let map = Rc::new(map);
        self.maps.0.borrow_mut().insert(name, Rc::clone(&map));
        Ok(Some(map))
    }

    /// Format the value of `property`
    ///
    /// The output buffer grows as long as it is reported too small. When the value map cannot
    /// translate the value, formatting is retried once without the map.
    pub fn format(&self, property: &Property) -> DecodeResult<String> {
        let desc = &property.descriptor;
        let map = self.map_info(desc)?;
        let payload = self.record.user_buffer();
        let user_data = payload
            .get(property.offset..)
            .ok_or(DecodeError::CursorOverrun {
                offset: property.offset,
                size: property.size,
                len: payload.len(),
            })?;

        let format_error = |source| DecodeError::Format {
            name: property.name.clone(),
            source,
        };

        let mut use_map = map.is_some();
        let mut buffer = vec![0u16; INITIAL_BUFFER_UNITS];
        for _ in 0..MAX_RETRIES {
            let request = FormatRequest {
                schema: self.schema,
                map: if use_map { map.as_deref() } else { None },
                pointer_size: self.record.pointer_size(),
                in_type: desc.raw_in_type(),
                out_type: desc.raw_out_type(),
                length: u16::try_from(property.length).unwrap_or(u16::MAX),
                user_data,
            };

            match self.tdh.format_property(&request, &mut buffer) {
                Ok(_consumed) => {
                    let end = buffer.iter().position(|u| *u == 0).unwrap_or(buffer.len());
                    let units = buffer[..end].iter().copied();
                    return Ok(widestring::decode_utf16_lossy(units).collect());
                }
                Err(TdhError::InsufficientBuffer { required }) => {
                    let required = (required as usize + 1) / 2;
                    let grown = required.max(buffer.len() * 2);
                    buffer.resize(grown, 0);
                }
                Err(TdhError::InvalidEventData) if use_map => {
                    log::trace!("map not applicable to property {}", property.name);
                    use_map = false;
                }
                Err(e) => return Err(format_error(e)),
            }
        }
        Err(format_error(TdhError::RetriesExhausted))
    }
}
