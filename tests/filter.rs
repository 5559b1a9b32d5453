use etw_consumer::filter::FilterKey;
use etw_consumer::provider::{Provider, StaticCatalog};
use etw_consumer::trace::replay::ReplaySource;
use etw_consumer::Consumer;

mod utils;
use utils::*;

fn records() -> Vec<etw_consumer::trace::replay::OwnedRecord> {
    vec![
        sample_record("filtered.exe", 1, 2),
        counter_record(1),
        sample_record("filtered.exe", 3, 4),
        counter_record(2),
    ]
}

fn received_ids(mut consumer: Consumer, expected: usize) -> Vec<u16> {
    let events = consumer.events().unwrap();
    consumer.start().unwrap();

    let ids = (0..expected)
        .map(|_| events.recv_timeout(RECV_TIMEOUT).unwrap().system.event_id)
        .collect();
    consumer.stop().unwrap();
    assert!(events.try_recv().is_err());
    assert!(consumer.err().is_none());
    ids
}

#[test]
fn provider_filter() {
    let provider = Provider::by_guid(provider_guid()).add_filter([COUNTER_EVENT_ID]);
    let source = ReplaySource::new().trace("session", records());
    let consumer = Consumer::builder(source, offline_tdh())
        .session("session", &[provider])
        .build();

    assert_eq!(received_ids(consumer, 2), [COUNTER_EVENT_ID, COUNTER_EVENT_ID]);
}

#[test]
fn provider_without_filter_lets_everything_through() {
    let provider = Provider::by_guid(provider_guid());
    let source = ReplaySource::new().trace("session", records());
    let consumer = Consumer::builder(source, offline_tdh())
        .session("session", &[provider])
        .build();

    assert_eq!(received_ids(consumer, 4).len(), 4);
}

#[test]
fn channel_filter() {
    let source = ReplaySource::new().trace("session", records());
    let consumer = Consumer::builder(source, offline_tdh())
        .trace_name("session")
        .build();
    consumer
        .filter()
        .update(FilterKey::Channel(CHANNEL.to_string()), [SAMPLE_EVENT_ID]);

    assert_eq!(received_ids(consumer, 2), [SAMPLE_EVENT_ID, SAMPLE_EVENT_ID]);
}

#[test]
fn updates_are_unions() {
    let source = ReplaySource::new().trace("session", records());
    let consumer = Consumer::builder(source, offline_tdh())
        .trace_name("session")
        .build();
    let key = FilterKey::Provider(provider_guid());
    consumer.filter().update(key.clone(), [SAMPLE_EVENT_ID]);
    consumer.filter().update(key, [COUNTER_EVENT_ID]);

    assert_eq!(received_ids(consumer, 4).len(), 4);
}

#[test]
fn filter_from_parsed_provider() {
    let catalog = StaticCatalog::from_entries([(provider_guid(), PROVIDER_NAME)]);
    let provider = Provider::parse("sample-provider:4:8", &catalog).unwrap();
    assert_eq!(provider.guid, provider_guid());

    let source = ReplaySource::new().trace("session", records());
    let consumer = Consumer::builder(source, offline_tdh())
        .session("session", &[provider])
        .build();

    assert_eq!(received_ids(consumer, 2), [COUNTER_EVENT_ID, COUNTER_EVENT_ID]);
}
