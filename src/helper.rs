//! Per-record decoding
//!
//! An [`EventRecordHelper`] owns everything needed to decode one record: its schema, the
//! properties found while walking the payload, and the cursor of the walk. It goes through the
//! following states, each transition being a method call:
//!
//! `Created` --[`initialize`]--> `Initialized` --[`prepare_properties`]--> `PropertiesPrepared`
//! --[`build_event`]--> `Built`
//!
//! Preparing properties only locates them in the payload. Their values are formatted lazily, when
//! accessed or when the event is built, so that a record skipped after preparation never pays for
//! formatting.
//!
//! [`initialize`]: EventRecordHelper::initialize
//! [`prepare_properties`]: EventRecordHelper::prepare_properties
//! [`build_event`]: EventRecordHelper::build_event
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::event::{Correlation, Event, Execution, NamedValue, ProviderInfo, System, Value};
use crate::filter::FilterSubject;
use crate::formatter::{MapCache, ValueFormatter};
use crate::guid::Guid;
use crate::length::LengthResolver;
use crate::native::time::FileTime;
use crate::property::Property;
use crate::record::{EventRecord, ExtendedDataItem};
use crate::schema::{
    PropertyCount, PropertyDescriptor, PropertyKind, PropertyLength, Schema, SchemaError,
};
use crate::tdh::{Tdh, TdhError};
use crate::utils;

static HOSTNAME: Lazy<String> = Lazy::new(crate::native::computer_name);

/// Name of the entry holding struct values in the event data
pub const STRUCTURES_KEY: &str = "Structures";

/// Decoding errors. They only ever concern the record being decoded.
#[derive(Debug)]
pub enum DecodeError {
    Schema(SchemaError),
    Tdh(TdhError),
    /// A property has a static length of 0 and a type whose size cannot be inferred
    UnexpectedZeroLength { in_type: u16, out_type: u16 },
    /// The length of a property, read from the property at `index`, does not fit in 32 bits
    LengthOverflow { index: u16, value: u64 },
    /// A property extends past the end of the payload
    CursorOverrun { offset: usize, size: usize, len: usize },
    /// The properties do not span the whole payload
    UnconsumedPayload { cursor: usize, len: usize },
    UnknownProperty(String),
    /// A property value is not an integer
    PropertyParse { name: String, value: String },
    /// The helper is not in the state the operation requires
    InvalidState { expected: HelperState, actual: HelperState },
    /// Formatting the value of a property failed
    Format { name: String, source: TdhError },
    /// The record has been flagged to be skipped
    Skipped,
    Unsupported(&'static str),
}

impl From<SchemaError> for DecodeError {
    fn from(err: SchemaError) -> Self {
        DecodeError::Schema(err)
    }
}

impl From<TdhError> for DecodeError {
    fn from(err: TdhError) -> Self {
        DecodeError::Tdh(err)
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(e) => write!(f, "schema error: {}", e),
            Self::Tdh(e) => write!(f, "tdh error: {}", e),
            Self::UnexpectedZeroLength { in_type, out_type } => write!(
                f,
                "unexpected length of 0 for intype {} and outtype {}",
                in_type, out_type
            ),
            Self::LengthOverflow { index, value } => {
                write!(f, "length {} read from property {} overflows", value, index)
            }
            Self::CursorOverrun { offset, size, len } => write!(
                f,
                "property of {} bytes at offset {} overruns the payload ({} bytes)",
                size, offset, len
            ),
            Self::UnconsumedPayload { cursor, len } => write!(
                f,
                "properties end at offset {} but the payload is {} bytes long",
                cursor, len
            ),
            Self::UnknownProperty(name) => write!(f, "unknown property {}", name),
            Self::PropertyParse { name, value } => {
                write!(f, "property {} is not an integer: {:?}", name, value)
            }
            Self::InvalidState { expected, actual } => {
                write!(f, "invalid state {:?}, expected {:?}", actual, expected)
            }
            Self::Format { name, source } => {
                write!(f, "failed to format property {}: {}", name, source)
            }
            Self::Skipped => write!(f, "record is skipped"),
            Self::Unsupported(what) => write!(f, "unsupported: {}", what),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Schema(e) => Some(e),
            Self::Tdh(e) | Self::Format { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

pub type DecodeResult<T> = Result<T, DecodeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    Created,
    Initialized,
    PropertiesPrepared,
    Built,
}

/// Descriptor of the properties set by [`EventRecordHelper::set_property`] that the schema does
/// not know about
fn synthetic_descriptor() -> PropertyDescriptor {
    PropertyDescriptor {
        index: u32::MAX,
        flags: Default::default(),
        name_offset: 0,
        kind: PropertyKind::Scalar {
            in_type: 0,
            out_type: 0,
            map_name_offset: 0,
        },
        count: PropertyCount::Count(1),
        length: PropertyLength::Length(0),
    }
}

/// Decoding context of one record
pub struct EventRecordHelper<'a, 'r> {
    record: &'a EventRecord<'r>,
    schema: Arc<Schema>,
    tdh: &'a dyn Tdh,
    state: HelperState,
    skip: bool,
    skippable: bool,
    computer_name: Option<String>,
    properties: HashMap<String, Property>,
    array_properties: HashMap<String, Vec<Property>>,
    structures: Vec<HashMap<String, Property>>,
    maps: MapCache,
    cursor: usize,
}

impl<'a, 'r> EventRecordHelper<'a, 'r> {
    pub fn new(record: &'a EventRecord<'r>, schema: Arc<Schema>, tdh: &'a dyn Tdh) -> Self {
        EventRecordHelper {
            record,
            schema,
            tdh,
            state: HelperState::Created,
            skip: false,
            skippable: false,
            computer_name: None,
            properties: HashMap::new(),
            array_properties: HashMap::new(),
            structures: Vec::new(),
            maps: MapCache::default(),
            cursor: 0,
        }
    }

    fn expect_state(&self, expected: HelperState) -> DecodeResult<()> {
        if self.state != expected {
            return Err(DecodeError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    pub fn state(&self) -> HelperState {
        self.state
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn record(&self) -> &EventRecord<'r> {
        self.record
    }

    /// Stop any further work on this record
    pub fn skip(&mut self) {
        self.skip = true;
    }

    pub fn is_skipped(&self) -> bool {
        self.skip
    }

    /// Mark the resulting event as droppable when the output queue is full
    pub fn set_skippable(&mut self) {
        self.skippable = true;
    }

    pub fn is_skippable(&self) -> bool {
        self.skippable
    }

    /// Name reported in the `Computer` field of the event, defaults to the local machine name
    pub fn set_computer_name(&mut self, name: &str) {
        self.computer_name = Some(name.to_string());
    }

    pub fn provider_guid(&self) -> Guid {
        self.record.provider_id()
    }

    pub fn event_id(&self) -> u16 {
        self.schema.event_id()
    }

    pub fn channel(&self) -> DecodeResult<String> {
        Ok(self.schema.channel_name()?)
    }

    /// Reset the property maps and move the cursor to the start of the payload
    pub fn initialize(&mut self) -> DecodeResult<()> {
        self.expect_state(HelperState::Created)?;
        self.properties = HashMap::new();
        self.array_properties = HashMap::new();
        self.structures = Vec::new();
        self.cursor = 0;
        self.state = HelperState::Initialized;
        Ok(())
    }

    /// Locate one property element at the cursor and move the cursor past it
    fn prepare_property(
        &mut self,
        resolver: &LengthResolver,
        desc: PropertyDescriptor,
    ) -> DecodeResult<Property> {
        let payload = self.record.user_buffer();
        let name = self.schema.property_name(&desc)?;
        let length = resolver.property_length(&desc)?;
        let remaining = payload.get(self.cursor..).unwrap_or_default();
        let size = resolver.runtime_size(&desc, length, remaining)?;

        let end = self
            .cursor
            .checked_add(size)
            .filter(|end| *end <= payload.len())
            .ok_or(DecodeError::CursorOverrun {
                offset: self.cursor,
                size,
                len: payload.len(),
            })?;

        let property = Property::new(desc, name, self.cursor, length, size);
        self.cursor = end;
        Ok(property)
    }

    /// Walk the top-level properties of the schema, locating every value in the payload
    ///
    /// The properties must span the payload exactly.
    pub fn prepare_properties(&mut self) -> DecodeResult<()> {
        self.expect_state(HelperState::Initialized)?;
        if self.skip {
            return Err(DecodeError::Skipped);
        }

        let schema = Arc::clone(&self.schema);
        let resolver = LengthResolver::new(&schema, self.record, self.tdh);

        for i in 0..schema.top_level_property_count() {
            let desc = schema.property(i)?;
            let is_array = desc.is_array();
            let count = resolver.array_count(&desc)?;

            let name = schema.property_name(&desc)?;
            if is_array && !desc.is_struct() {
                self.array_properties.entry(name.clone()).or_default();
            }

            for _ in 0..count {
                if let Some(members) = desc.struct_members() {
                    let mut structure = HashMap::new();
                    for j in members {
                        let member = schema.property(j)?;
                        if member.is_struct() {
                            return Err(DecodeError::Unsupported("struct nested in a struct"));
                        }
                        let property = self.prepare_property(&resolver, member)?;
                        structure.insert(property.name.clone(), property);
                    }
                    self.structures.push(structure);
                } else {
                    let property = self.prepare_property(&resolver, desc)?;
                    if is_array {
                        self.array_properties
                            .entry(name.clone())
                            .or_default()
                            .push(property);
                    } else {
                        self.properties.insert(name.clone(), property);
                    }
                }
            }
        }

        let len = self.record.user_buffer().len();
        if self.cursor != len {
            return Err(DecodeError::UnconsumedPayload {
                cursor: self.cursor,
                len,
            });
        }

        self.state = HelperState::PropertiesPrepared;
        Ok(())
    }

    fn value_of<'p>(
        &self,
        formatter: &ValueFormatter,
        property: &'p Property,
    ) -> DecodeResult<&'p str> {
        if self.skip {
            return Err(DecodeError::Skipped);
        }
        property.value_or_try_format(|p| formatter.format(p))
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn array_property(&self, name: &str) -> Option<&[Property]> {
        self.array_properties.get(name).map(Vec::as_slice)
    }

    pub fn structures(&self) -> &[HashMap<String, Property>] {
        &self.structures
    }

    /// Formatted value of a (non-array, top-level) property
    pub fn property_string(&self, name: &str) -> DecodeResult<String> {
        let property = self
            .properties
            .get(name)
            .ok_or_else(|| DecodeError::UnknownProperty(name.to_string()))?;
        let formatter = ValueFormatter::new(&self.schema, self.record, self.tdh, &self.maps);
        self.value_of(&formatter, property).map(str::to_string)
    }

    /// Value of a property as a signed integer. `0x`, `0o`, `0b` and leading `0` prefixes are honoured.
    pub fn property_int(&self, name: &str) -> DecodeResult<i64> {
        let value = self.property_string(name)?;
        utils::parse_int_prefixed(&value).ok_or(DecodeError::PropertyParse {
            name: name.to_string(),
            value,
        })
    }

    /// Unsigned counterpart of [`EventRecordHelper::property_int`]
    pub fn property_uint(&self, name: &str) -> DecodeResult<u64> {
        let value = self.property_string(name)?;
        utils::parse_uint_prefixed(&value).ok_or(DecodeError::PropertyParse {
            name: name.to_string(),
            value,
        })
    }

    /// Override the value of a property, or add a property to the event
    pub fn set_property(&mut self, name: &str, value: &str) {
        match self.properties.get_mut(name) {
            Some(property) => property.set_value(value.to_string()),
            None => {
                let property = Property::with_value(
                    synthetic_descriptor(),
                    name.to_string(),
                    value.to_string(),
                );
                self.properties.insert(name.to_string(), property);
            }
        }
    }

    fn system(&self) -> DecodeResult<System> {
        let schema = &self.schema;
        let descriptor = schema.descriptor();
        let time_created = FileTime::from_quad(self.record.timestamp())
            .as_date_time()
            .unwrap_or(::time::OffsetDateTime::UNIX_EPOCH);

        Ok(System {
            channel: schema.channel_name()?,
            computer: self
                .computer_name
                .clone()
                .unwrap_or_else(|| HOSTNAME.clone()),
            event_id: schema.event_id(),
            event_type: schema.event_type()?,
            event_guid: schema.is_mof().then(|| schema.event_guid()),
            correlation: Correlation {
                activity_id: self.record.activity_id(),
                related_activity_id: self.record.related_activity_id().unwrap_or_default(),
            },
            execution: Execution {
                process_id: self.record.process_id(),
                thread_id: self.record.thread_id(),
            },
            keywords: NamedValue::new(descriptor.keyword, schema.keywords_name()?),
            level: NamedValue::new(descriptor.level, schema.level_name()?),
            opcode: NamedValue::new(descriptor.opcode, schema.opcode_name()?),
            task: NamedValue::new(descriptor.task, schema.task_name()?),
            provider: ProviderInfo {
                guid: self.record.provider_id(),
                name: schema.provider_name()?,
            },
            time_created,
        })
    }

    /// Format every property and materialize the event
    pub fn build_event(&mut self) -> DecodeResult<Event> {
        self.expect_state(HelperState::PropertiesPrepared)?;
        if self.skip {
            return Err(DecodeError::Skipped);
        }

        let formatter = ValueFormatter::new(&self.schema, self.record, self.tdh, &self.maps);
        let mut data = BTreeMap::new();

        for (name, property) in &self.properties {
            let value = self.value_of(&formatter, property)?;
            data.insert(name.clone(), Value::String(value.to_string()));
        }

        for (name, elements) in &self.array_properties {
            let values = elements
                .iter()
                .map(|p| self.value_of(&formatter, p).map(str::to_string))
                .collect::<DecodeResult<Vec<_>>>()?;
            data.insert(name.clone(), Value::Array(values));
        }

        if !self.structures.is_empty() {
            let structures = self
                .structures
                .iter()
                .map(|s| {
                    s.iter()
                        .map(|(name, p)| {
                            let value = self.value_of(&formatter, p)?;
                            Ok((name.clone(), value.to_string()))
                        })
                        .collect::<DecodeResult<BTreeMap<_, _>>>()
                })
                .collect::<DecodeResult<Vec<_>>>()?;
            data.insert(STRUCTURES_KEY.to_string(), Value::Structures(structures));
        }

        let extended_data = self
            .record
            .extended_data()
            .iter()
            .map(|item| match item {
                ExtendedDataItem::RelatedActivityId(guid) => guid.to_string(),
                ExtendedDataItem::Other(_) => String::from("not parsed"),
            })
            .collect();

        let mut event = Event::new(self.system()?);
        if self.schema.is_user_data() {
            event.user_data = data;
        } else {
            event.event_data = data;
        }
        event.extended_data = extended_data;
        event.skippable = self.skippable;

        self.state = HelperState::Built;
        Ok(event)
    }
}

impl FilterSubject for EventRecordHelper<'_, '_> {
    fn provider_guid(&self) -> Guid {
        self.record.provider_id()
    }

    fn channel(&self) -> String {
        self.schema.channel_name().unwrap_or_default()
    }

    fn event_id(&self) -> u16 {
        self.schema.event_id()
    }
}

impl std::fmt::Debug for EventRecordHelper<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRecordHelper")
            .field("state", &self.state)
            .field("skip", &self.skip)
            .field("skippable", &self.skippable)
            .field("cursor", &self.cursor)
            .field("schema", &self.schema)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::native::tdh_types::{MapFlags, TdhInType, TdhOutType};
    use crate::record::{EventDescriptor, EventHeader, EXT_TYPE_RELATED_ACTIVITYID};
    use crate::schema::builder::{MapBuilder, PropertyBuilder, SchemaBuilder};
    use crate::tdh::{FormatRequest, OfflineTdh, TdhResult};

    fn provider() -> Guid {
        Guid::parse("22fb2cd6-0e7b-422b-a0c7-2fad1fd0e716").unwrap()
    }

    fn header() -> EventHeader {
        EventHeader {
            provider_id: provider(),
            descriptor: EventDescriptor {
                id: 3,
                ..Default::default()
            },
            process_id: 4,
            thread_id: 8,
            ..Default::default()
        }
    }

    fn setup() -> (OfflineTdh, Arc<Schema>) {
        let buffer = SchemaBuilder::new(provider())
            .event_id(3)
            .provider_name("Sample")
            .property(
                PropertyBuilder::scalar("Pid", TdhInType::InTypeUInt32, TdhOutType::OutTypeHexInt32)
                    .length(4),
            )
            .property(
                PropertyBuilder::scalar("Ports", TdhInType::InTypeUInt16, TdhOutType::OutTypeUInt16)
                    .length(2)
                    .count(2),
            )
            .property(PropertyBuilder::scalar(
                "Path",
                TdhInType::InTypeUnicodeString,
                TdhOutType::OutTypeString,
            ))
            .build();
        let mut tdh = OfflineTdh::new();
        tdh.register_schema(buffer.clone()).unwrap();
        (tdh, Arc::new(Schema::from_buffer(buffer).unwrap()))
    }

    fn payload() -> Vec<u8> {
        let mut payload = 0x10u32.to_le_bytes().to_vec();
        payload.extend_from_slice(&80u16.to_le_bytes());
        payload.extend_from_slice(&443u16.to_le_bytes());
        payload.extend_from_slice(&[b'C', 0, b':', 0, 0, 0]);
        payload
    }

    #[test]
    fn test_state_machine() {
        let (tdh, schema) = setup();
        let payload = payload();
        let record = EventRecord::new(header(), &payload);
        let mut helper = EventRecordHelper::new(&record, schema, &tdh);

        assert!(matches!(
            helper.prepare_properties(),
            Err(DecodeError::InvalidState {
                expected: HelperState::Initialized,
                actual: HelperState::Created
            })
        ));
        helper.initialize().unwrap();
        assert!(helper.build_event().is_err());
        helper.prepare_properties().unwrap();
        assert_eq!(helper.state(), HelperState::PropertiesPrepared);

        assert_eq!(helper.property_string("Pid").unwrap(), "0x10");
        assert_eq!(helper.property_uint("Pid").unwrap(), 16);
        assert!(matches!(
            helper.property_int("Path"),
            Err(DecodeError::PropertyParse { .. })
        ));
        assert!(matches!(
            helper.property_string("Nope"),
            Err(DecodeError::UnknownProperty(_))
        ));
        assert_eq!(helper.array_property("Ports").map(|a| a.len()), Some(2));

        let event = helper.build_event().unwrap();
        assert_eq!(helper.state(), HelperState::Built);
        assert_eq!(event.property_str("Path"), Some("C:"));
        assert_eq!(
            event.property("Ports"),
            Some(&Value::Array(vec!["80".into(), "443".into()]))
        );
        assert_eq!(event.system.execution.process_id, 4);
        assert_eq!(event.system.provider.name, "Sample");
        assert!(event.user_data.is_empty());
    }

    struct MapCounter {
        inner: OfflineTdh,
        fetches: std::sync::atomic::AtomicUsize,
    }

    impl Tdh for MapCounter {
        fn event_information(
            &self,
            record: &EventRecord,
            buffer: &mut crate::utils::AlignedBuffer,
        ) -> TdhResult<()> {
            self.inner.event_information(record, buffer)
        }

        fn event_map_information(
            &self,
            record: &EventRecord,
            map_name: &str,
            buffer: &mut crate::utils::AlignedBuffer,
        ) -> TdhResult<()> {
            self.fetches.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.event_map_information(record, map_name, buffer)
        }

        fn property_size(&self, record: &EventRecord, name: &str) -> TdhResult<u32> {
            self.inner.property_size(record, name)
        }

        fn property(&self, record: &EventRecord, name: &str, buffer: &mut [u8]) -> TdhResult<()> {
            self.inner.property(record, name, buffer)
        }

        fn format_property(&self, request: &FormatRequest, buffer: &mut [u16]) -> TdhResult<u16> {
            self.inner.format_property(request, buffer)
        }
    }

    #[test]
    fn test_maps_are_fetched_once_per_record() {
        let state = |name| {
            PropertyBuilder::scalar(name, TdhInType::InTypeUInt32, TdhOutType::OutTypeUInt32)
                .length(4)
                .map("StateMap")
        };
        let buffer = SchemaBuilder::new(provider())
            .event_id(3)
            .property(state("Before"))
            .property(state("After"))
            .property(state("Final"))
            .build();
        let mut inner = OfflineTdh::new();
        inner.register_schema(buffer.clone()).unwrap();
        inner
            .register_map(
                "StateMap",
                MapBuilder::new("StateMap", MapFlags::EVENTMAP_INFO_FLAG_MANIFEST_VALUEMAP)
                    .entry(1, "Stopped")
                    .entry(2, "Running")
                    .build(),
            )
            .unwrap();
        let tdh = MapCounter {
            inner,
            fetches: Default::default(),
        };
        let schema = Arc::new(Schema::from_buffer(buffer).unwrap());

        let payload: Vec<u8> = [1u32, 2, 2].iter().flat_map(|v| v.to_le_bytes()).collect();
        let record = EventRecord::new(header(), &payload);
        let mut helper = EventRecordHelper::new(&record, schema, &tdh);
        helper.initialize().unwrap();
        helper.prepare_properties().unwrap();

        assert_eq!(helper.property_string("Before").unwrap(), "Stopped");
        assert_eq!(helper.property_string("After").unwrap(), "Running");
        let event = helper.build_event().unwrap();
        assert_eq!(event.property_str("Final"), Some("Running"));
        assert_eq!(tdh.fetches.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cursor_checks() {
        let (tdh, schema) = setup();

        let mut short = payload();
        short.truncate(6);
        let record = EventRecord::new(header(), &short);
        let mut helper = EventRecordHelper::new(&record, Arc::clone(&schema), &tdh);
        helper.initialize().unwrap();
        assert!(matches!(
            helper.prepare_properties(),
            Err(DecodeError::CursorOverrun { offset: 6, .. })
        ));

        let mut long = payload();
        long.extend_from_slice(&[1, 2]);
        let record = EventRecord::new(header(), &long);
        let mut helper = EventRecordHelper::new(&record, schema, &tdh);
        helper.initialize().unwrap();
        assert!(matches!(
            helper.prepare_properties(),
            Err(DecodeError::UnconsumedPayload { cursor: 14, len: 16 })
        ));
    }

    #[test]
    fn test_skip() {
        let (tdh, schema) = setup();
        let payload = payload();
        let record = EventRecord::new(header(), &payload);
        let mut helper = EventRecordHelper::new(&record, schema, &tdh);
        helper.initialize().unwrap();
        helper.prepare_properties().unwrap();
        helper.skip();
        assert!(matches!(helper.property_string("Pid"), Err(DecodeError::Skipped)));
        assert!(matches!(helper.build_event(), Err(DecodeError::Skipped)));
        assert!(!helper.property("Pid").unwrap().is_formatted());
    }

    #[test]
    fn test_set_property_and_extended_data() {
        let (tdh, schema) = setup();
        let payload = payload();
        let related = Guid::parse("12345678-1234-5678-0102-030405060708").unwrap();
        let record = EventRecord::new(header(), &payload).with_extended_data(vec![
            ExtendedDataItem::from_raw(
                EXT_TYPE_RELATED_ACTIVITYID,
                zerocopy::AsBytes::as_bytes(&related),
            ),
        ]);
        let mut helper = EventRecordHelper::new(&record, schema, &tdh);
        helper.set_computer_name("HOST");
        helper.initialize().unwrap();
        helper.prepare_properties().unwrap();
        helper.set_property("Pid", "overridden");
        helper.set_property("Extra", "1");
        helper.set_skippable();

        let event = helper.build_event().unwrap();
        assert_eq!(event.property_str("Pid"), Some("overridden"));
        assert_eq!(event.property_str("Extra"), Some("1"));
        assert_eq!(event.extended_data, vec![related.to_string()]);
        assert_eq!(event.system.correlation.related_activity_id, related);
        assert_eq!(event.system.computer, "HOST");
        assert!(event.skippable);
    }
}
