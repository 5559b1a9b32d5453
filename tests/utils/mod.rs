#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use etw_consumer::guid::Guid;
use etw_consumer::native::tdh_types::{TdhInType, TdhOutType};
use etw_consumer::record::{EventDescriptor, EventHeader, EventRecord};
use etw_consumer::schema::builder::{PropertyBuilder, SchemaBuilder};
use etw_consumer::tdh::{FormatRequest, OfflineTdh, Tdh, TdhResult};
use etw_consumer::trace::replay::OwnedRecord;
use etw_consumer::utils::AlignedBuffer;

pub const PROVIDER_NAME: &str = "Sample-Provider";
pub const CHANNEL: &str = "Sample-Provider/Operational";
pub const SAMPLE_EVENT_ID: u16 = 7;
pub const COUNTER_EVENT_ID: u16 = 8;

/// How long to wait for events that are expected to come
pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

pub fn provider_guid() -> Guid {
    Guid::parse("{9E814AAD-3204-11D2-9A82-006008A86939}").unwrap()
}

pub fn header(event_id: u16) -> EventHeader {
    EventHeader {
        provider_id: provider_guid(),
        descriptor: EventDescriptor {
            id: event_id,
            level: 4,
            ..Default::default()
        },
        process_id: 1234,
        thread_id: 5678,
        // 2020-01-01T00:00:00Z
        timestamp: 132_223_104_000_000_000,
        ..Default::default()
    }
}

/// "Name" (null-terminated UTF-16) then the struct "Info" { Pid: u32, Port: u16 }
pub fn sample_schema() -> AlignedBuffer {
    SchemaBuilder::new(provider_guid())
        .event_id(SAMPLE_EVENT_ID)
        .level(4)
        .provider_name(PROVIDER_NAME)
        .channel_name(CHANNEL)
        .level_name("Information")
        .property(PropertyBuilder::scalar(
            "Name",
            TdhInType::InTypeUnicodeString,
            TdhOutType::OutTypeString,
        ))
        .property(PropertyBuilder::structure(
            "Info",
            vec![
                PropertyBuilder::scalar("Pid", TdhInType::InTypeUInt32, TdhOutType::OutTypeUInt32)
                    .length(4),
                PropertyBuilder::scalar("Port", TdhInType::InTypeUInt16, TdhOutType::OutTypeUInt16)
                    .length(2),
            ],
        ))
        .build()
}

pub fn sample_payload(name: &str, pid: u32, port: u16) -> Vec<u8> {
    let mut payload: Vec<u8> = name
        .encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect();
    payload.extend_from_slice(&pid.to_le_bytes());
    payload.extend_from_slice(&port.to_le_bytes());
    payload
}

pub fn sample_record(name: &str, pid: u32, port: u16) -> OwnedRecord {
    OwnedRecord::new(header(SAMPLE_EVENT_ID), sample_payload(name, pid, port))
}

/// A single u32 "Counter", on the same provider and channel
pub fn counter_schema() -> AlignedBuffer {
    SchemaBuilder::new(provider_guid())
        .event_id(COUNTER_EVENT_ID)
        .provider_name(PROVIDER_NAME)
        .channel_name(CHANNEL)
        .property(
            PropertyBuilder::scalar("Counter", TdhInType::InTypeUInt32, TdhOutType::OutTypeUInt32)
                .length(4),
        )
        .build()
}

pub fn counter_record(counter: u32) -> OwnedRecord {
    OwnedRecord::new(header(COUNTER_EVENT_ID), counter.to_le_bytes().to_vec())
}

pub fn offline_tdh() -> OfflineTdh {
    let mut tdh = OfflineTdh::new();
    tdh.register_schema(sample_schema()).unwrap();
    tdh.register_schema(counter_schema()).unwrap();
    tdh
}

/// Counts the calls to the value formatter
#[derive(Debug, Default)]
pub struct CountingTdh {
    inner: OfflineTdh,
    format_calls: Arc<AtomicUsize>,
}

impl CountingTdh {
    pub fn new(inner: OfflineTdh) -> Self {
        CountingTdh {
            inner,
            format_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared counter, that stays readable once the backend is handed to a consumer
    pub fn format_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.format_calls)
    }
}

impl Tdh for CountingTdh {
    fn event_information(&self, record: &EventRecord, buffer: &mut AlignedBuffer) -> TdhResult<()> {
        self.inner.event_information(record, buffer)
    }

    fn event_map_information(
        &self,
        record: &EventRecord,
        map_name: &str,
        buffer: &mut AlignedBuffer,
    ) -> TdhResult<()> {
        self.inner.event_map_information(record, map_name, buffer)
    }

    fn property_size(&self, record: &EventRecord, name: &str) -> TdhResult<u32> {
        self.inner.property_size(record, name)
    }

    fn property(&self, record: &EventRecord, name: &str, buffer: &mut [u8]) -> TdhResult<()> {
        self.inner.property(record, name, buffer)
    }

    fn format_property(&self, request: &FormatRequest, buffer: &mut [u16]) -> TdhResult<u16> {
        self.format_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.format_property(request, buffer)
    }
}
