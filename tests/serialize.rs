#![cfg(feature = "serde")]

use etw_consumer::trace::replay::ReplaySource;
use etw_consumer::Consumer;
use serde_json::json;

mod utils;
use utils::*;

fn decode_one(record: etw_consumer::trace::replay::OwnedRecord) -> etw_consumer::Event {
    let source = ReplaySource::new().trace("session", vec![record]);
    let mut consumer = Consumer::builder(source, offline_tdh())
        .trace_name("session")
        .options(etw_consumer::ConsumerOptions {
            computer_name: Some(String::from("WORKSTATION")),
            ..Default::default()
        })
        .build();
    let events = consumer.events().unwrap();
    consumer.start().unwrap();

    let event = events.recv_timeout(RECV_TIMEOUT).unwrap();
    consumer.stop().unwrap();
    event
}

#[test]
fn json_shape() {
    let event = decode_one(sample_record("svchost.exe", 4242, 443));
    let value = serde_json::to_value(&event).unwrap();

    assert_eq!(
        value["EventData"],
        json!({
            "Name": "svchost.exe",
            "Structures": [{ "Pid": "4242", "Port": "443" }],
        })
    );
    assert!(value.get("UserData").is_none());
    assert!(value.get("ExtendedData").is_none());

    let system = &value["System"];
    assert_eq!(system["Channel"], CHANNEL);
    assert_eq!(system["Computer"], "WORKSTATION");
    assert_eq!(system["EventID"], SAMPLE_EVENT_ID);
    assert!(system.get("EventType").is_none());
    assert!(system.get("EventGuid").is_none());
    assert_eq!(
        system["Correlation"],
        json!({
            "ActivityID": "{00000000-0000-0000-0000-000000000000}",
            "RelatedActivityID": "{00000000-0000-0000-0000-000000000000}",
        })
    );
    assert_eq!(system["Execution"], json!({ "ProcessID": 1234, "ThreadID": 5678 }));
    assert_eq!(system["Level"], json!({ "Value": 4, "Name": "Information" }));
    assert_eq!(
        system["Provider"],
        json!({ "Guid": provider_guid().to_string(), "Name": PROVIDER_NAME })
    );
    assert!(system["TimeCreated"]["SystemTime"]
        .as_str()
        .unwrap()
        .starts_with("2020-01-01T00:00:00"));
}

#[test]
fn json_lines() {
    let event = decode_one(counter_record(17));
    let line = serde_json::to_string(&event).unwrap();

    assert!(!line.contains('\n'));
    assert!(line.starts_with(r#"{"EventData":{"Counter":"17"},"System":{"#));
}
