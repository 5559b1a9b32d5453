//! Print the events of a running session as JSON lines
//!
//! Usage: `consume <session> [provider...]`, providers being given as
//! `NameOrGUID[:Level[:IDs[:Any[:All]]]]`. Set `RUST_LOG=debug` to see the records that fail to decode.

#[cfg(windows)]
fn main() {
    use std::time::Duration;

    use etw_consumer::native::{SystemTdh, SystemTraceSource};
    use etw_consumer::provider::{LazyCatalog, Provider};
    use etw_consumer::Consumer;

    env_logger::init();

    let mut args = std::env::args().skip(1);
    let session = args.next().unwrap_or_else(|| String::from("EventLog-System"));

    let catalog = LazyCatalog::system();
    let providers: Vec<Provider> = args
        .map(|arg| Provider::parse(&arg, &catalog).unwrap())
        .collect();

    let mut consumer = Consumer::builder(SystemTraceSource, SystemTdh)
        .session(&session, &providers)
        .build();
    let events = consumer.events().unwrap();
    consumer.start().unwrap();

    let deadline = std::time::Instant::now() + Duration::from_secs(20);
    while std::time::Instant::now() < deadline {
        if let Ok(event) = events.recv_timeout(Duration::from_millis(200)) {
            println!("{}", serde_json::to_string(&event).unwrap());
        }
    }

    consumer.stop().unwrap();
    println!(
        "{} records, {} skipped, {} lost",
        consumer.records_handled(),
        consumer.skipped(),
        consumer.lost_events()
    );
    if let Some(err) = consumer.err() {
        println!("last error: {}", err);
    }
}

#[cfg(not(windows))]
fn main() {
    println!("This demo consumes ETW sessions, it only runs on Windows");
}
