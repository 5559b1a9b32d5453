use etw_consumer::helper::DecodeError;
use etw_consumer::trace::replay::{OwnedRecord, ReplaySource};
use etw_consumer::{Consumer, ConsumerError};

mod utils;
use utils::*;

fn decode_after(bad: OwnedRecord) -> (String, Option<std::sync::Arc<ConsumerError>>) {
    let source = ReplaySource::new().trace("session", vec![bad, counter_record(11)]);
    let mut consumer = Consumer::builder(source, offline_tdh())
        .trace_name("session")
        .build();
    let events = consumer.events().unwrap();
    consumer.start().unwrap();

    let event = events.recv_timeout(RECV_TIMEOUT).unwrap();
    consumer.stop().unwrap();
    assert!(events.try_recv().is_err());

    (event.property_str("Counter").unwrap().to_string(), consumer.err())
}

#[test]
fn overrun_drops_the_record() {
    let mut payload = sample_payload("truncated", 1, 2);
    payload.truncate(payload.len() - 1);

    let (counter, err) = decode_after(OwnedRecord::new(header(SAMPLE_EVENT_ID), payload));
    assert_eq!(counter, "11");
    assert!(matches!(
        err.as_deref(),
        Some(ConsumerError::Decode(DecodeError::CursorOverrun { .. }))
    ));
}

#[test]
fn unconsumed_payload_drops_the_record() {
    let mut payload = sample_payload("padded", 1, 2);
    payload.extend_from_slice(&[0xaa, 0xbb]);
    let len = payload.len();

    let (counter, err) = decode_after(OwnedRecord::new(header(SAMPLE_EVENT_ID), payload));
    assert_eq!(counter, "11");
    assert!(matches!(
        err.as_deref(),
        Some(ConsumerError::Decode(DecodeError::UnconsumedPayload { cursor, len: l }))
            if *cursor == len - 2 && *l == len
    ));
}

#[test]
fn unterminated_string_drops_the_record() {
    // no null terminator: the string spans the whole payload, leaving nothing for the struct
    let payload: Vec<u8> = "abc".encode_utf16().flat_map(u16::to_le_bytes).collect();

    let (counter, err) = decode_after(OwnedRecord::new(header(SAMPLE_EVENT_ID), payload));
    assert_eq!(counter, "11");
    assert!(matches!(err.as_deref(), Some(ConsumerError::Decode(_))));
}

#[test]
fn exact_payload_decodes() {
    let source = ReplaySource::new().trace("session", vec![sample_record("exact", 1, 2)]);
    let mut consumer = Consumer::builder(source, offline_tdh())
        .trace_name("session")
        .build();
    let events = consumer.events().unwrap();
    consumer.start().unwrap();

    let event = events.recv_timeout(RECV_TIMEOUT).unwrap();
    consumer.stop().unwrap();

    assert_eq!(event.property_str("Name"), Some("exact"));
    assert!(consumer.err().is_none());
}
