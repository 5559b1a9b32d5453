//! Value maps attached to properties
//!
//! An [EVENT_MAP_INFO](https://learn.microsoft.com/en-us/windows/win32/api/tdh/ns-tdh-event_map_info)
//! translates integer values (or bits) to human-readable names.
use zerocopy::FromBytes;

use crate::native::tdh_types::{
    EventMapEntryRaw, EventMapInfoHeader, MapFlags, EVENT_MAP_ENTRY_SIZE,
    EVENT_MAP_INFO_HEADER_SIZE,
};
use crate::schema::{SchemaError, SchemaResult};
use crate::utils::{self, AlignedBuffer};

/// One entry of a value map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub value: u32,
    pub name: String,
}

/// A bounds-checked view over an `EVENT_MAP_INFO` buffer
#[derive(Clone)]
pub struct MapInfo {
    buffer: AlignedBuffer,
    header: EventMapInfoHeader,
}

impl MapInfo {
    pub fn from_buffer(buffer: AlignedBuffer) -> SchemaResult<Self> {
        let len = buffer.len();
        let header = EventMapInfoHeader::read_from_prefix(buffer.as_bytes()).ok_or(
            SchemaError::Truncated {
                needed: EVENT_MAP_INFO_HEADER_SIZE,
                len,
            },
        )?;

        let needed =
            EVENT_MAP_INFO_HEADER_SIZE + header.entry_count as usize * EVENT_MAP_ENTRY_SIZE;
        if needed > len {
            return Err(SchemaError::Truncated { needed, len });
        }

        Ok(MapInfo { buffer, header })
    }

    pub fn flags(&self) -> MapFlags {
        MapFlags::from_bits_truncate(self.header.flag)
    }

    pub fn name(&self) -> SchemaResult<String> {
        self.string_at(self.header.name_offset)
    }

    pub fn entry_count(&self) -> u32 {
        self.header.entry_count
    }

    fn raw_entry(&self, index: u32) -> EventMapEntryRaw {
        let offset = EVENT_MAP_INFO_HEADER_SIZE + index as usize * EVENT_MAP_ENTRY_SIZE;
        // `from_buffer` made sure every entry fits
        self.buffer
            .as_bytes()
            .get(offset..)
            .and_then(EventMapEntryRaw::read_from_prefix)
            .unwrap_or_default()
    }

    fn string_at(&self, offset: u32) -> SchemaResult<String> {
        if offset == 0 {
            return Ok(String::new());
        }
        let offset = offset as usize;
        let bytes = self
            .buffer
            .as_bytes()
            .get(offset..)
            .ok_or(SchemaError::OutOfBounds {
                offset,
                len: self.buffer.len(),
            })?;
        utils::read_utf16z(bytes)
            .map(|(s, _)| s)
            .ok_or(SchemaError::UnterminatedString { offset })
    }

    pub fn entries(&self) -> SchemaResult<Vec<MapEntry>> {
        (0..self.entry_count())
            .map(|i| {
                let raw = self.raw_entry(i);
                Ok(MapEntry {
                    value: raw.value,
                    name: self.string_at(raw.output_offset)?,
                })
            })
            .collect()
    }

    /// Name of `value` in a value map
    pub fn lookup(&self, value: u32) -> SchemaResult<Option<String>> {
        for i in 0..self.entry_count() {
            let raw = self.raw_entry(i);
            if raw.value == value {
                return self.string_at(raw.output_offset).map(Some);
            }
        }
        Ok(None)
    }

    /// Names of the bits of `value` described by a bit map, in map order
    ///
    /// WBEM bitmaps store bit positions, manifest bitmaps store masks.
    pub fn bit_names(&self, value: u32) -> SchemaResult<Vec<String>> {
        let positions = self
            .flags()
            .contains(MapFlags::EVENTMAP_INFO_FLAG_WBEM_BITMAP);
        let mut names = Vec::new();
        for i in 0..self.entry_count() {
            let raw = self.raw_entry(i);
            let mask = if positions {
                1u32.checked_shl(raw.value).unwrap_or(0)
            } else {
                raw.value
            };
            if mask != 0 && value & mask == mask {
                names.push(self.string_at(raw.output_offset)?);
            }
        }
        Ok(names)
    }

    /// Manifest maps come with a trailing space at the end of every entry name. Replace it with a
    /// null in place.
    pub fn strip_trailing_spaces(&mut self) {
        if !self.flags().is_manifest() {
            return;
        }

        for i in 0..self.entry_count() {
            let offset = self.raw_entry(i).output_offset as usize;
            if offset == 0 {
                continue;
            }
            let bytes = self.buffer.as_bytes_mut();
            let size = match bytes.get(offset..).and_then(utils::utf16z_size) {
                Some(size) => size,
                None => continue,
            };
            // last character before the terminator
            if size >= 4 {
                let last = offset + size - 4;
                if bytes[last..last + 2] == [b' ', 0] {
                    bytes[last] = 0;
                }
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }
}

impl std::fmt::Debug for MapInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapInfo")
            .field("flags", &self.flags())
            .field("entry_count", &self.header.entry_count)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::builder::MapBuilder;

    #[test]
    fn test_value_map() {
        let map = MapBuilder::new("StateMap", MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_VALUEMAP)
            .entry(1, "Running ")
            .entry(2, "Stopped ")
            .build();
        let mut map = MapInfo::from_buffer(map).unwrap();
        assert_eq!(map.name().unwrap(), "StateMap");
        assert_eq!(map.lookup(1).unwrap().as_deref(), Some("Running "));

        map.strip_trailing_spaces();
        assert_eq!(map.lookup(1).unwrap().as_deref(), Some("Running"));
        assert_eq!(map.lookup(2).unwrap().as_deref(), Some("Stopped"));
        assert_eq!(map.lookup(3).unwrap(), None);
        assert_eq!(map.entries().unwrap().len(), 2);
    }

    #[test]
    fn test_bitmaps() {
        let manifest = MapBuilder::new("Access", MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_BITMAP)
            .entry(0x1, "Read")
            .entry(0x2, "Write")
            .entry(0x4, "Execute")
            .build();
        let manifest = MapInfo::from_buffer(manifest).unwrap();
        assert_eq!(manifest.bit_names(0x5).unwrap(), vec!["Read", "Execute"]);

        let wbem = MapBuilder::new("Access", MapFlags::EVENTMAP_INFO_FLAG_WBEM_BITMAP)
            .entry(0, "Read")
            .entry(1, "Write")
            .build();
        let wbem = MapInfo::from_buffer(wbem).unwrap();
        assert_eq!(wbem.bit_names(0x2).unwrap(), vec!["Write"]);
    }

    #[test]
    fn test_wbem_map_keeps_spaces() {
        let map = MapBuilder::new("M", MapFlags::EVENTMAP_INFO_FLAG_WBEM_VALUEMAP)
            .entry(1, "One ")
            .build();
        let mut map = MapInfo::from_buffer(map).unwrap();
        map.strip_trailing_spaces();
        assert_eq!(map.lookup(1).unwrap().as_deref(), Some("One "));
    }

    #[test]
    fn test_truncated() {
        let mut map = MapBuilder::new("M", MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_VALUEMAP)
            .entry(1, "One")
            .build();
        map.resize(20);
        assert!(matches!(
            MapInfo::from_buffer(map),
            Err(SchemaError::Truncated { .. })
        ));
    }
}
