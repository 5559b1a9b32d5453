//! # Real-time ETW consumer
//! This crate consumes Event Tracing for Windows (ETW) real-time sessions and decodes their
//! records into structured [`Event`]s.
//!
//! # What's ETW
//! Event Tracing for Windows (ETW) is an efficient kernel-level tracing facility that lets you log
//! kernel or application-defined events to a log file. You can consume the events in real time or
//! from a log file and use them to debug an application or to determine where performance issues
//! are occurring in the application. [Source]
//!
//! ETW is made out of three components:
//! * Controllers
//! * Providers
//! * Consumers
//!
//! This crate is a consumer: sessions are started and providers enabled by some controller (e.g.
//! `logman` or `wpr`), then a [`Consumer`] attaches to them by name.
//!
//! # Decoding
//! For every record, the consumer:
//! * resolves the event schema through a [`Tdh`](tdh::Tdh) backend, with a per-worker cache (see [`schema_locator`])
//! * applies the [`EventFilter`] and the user hooks
//! * walks the payload to locate every property, resolving their lengths and array counts
//! * formats every property value, with value maps applied
//! * fills an [`Event`], with its `System` header, properties and extended data
//!
//! Events are sent to a bounded queue, or handed to a user hook.
//!
//! # Getting started
//!
//! ```no_run
//! # #[cfg(windows)]
//! # fn main() {
//! use etw_consumer::native::{SystemTdh, SystemTraceSource};
//! use etw_consumer::provider::{LazyCatalog, Provider};
//! use etw_consumer::Consumer;
//!
//! // Providers can be named by GUID or by name, with a level and an event id filter
//! let catalog = LazyCatalog::system();
//! let provider = Provider::parse("Microsoft-Windows-Kernel-Process:0x04:1,2", &catalog).unwrap();
//!
//! let mut consumer = Consumer::builder(SystemTraceSource, SystemTdh)
//!     .session("MySession", &[provider])
//!     .build();
//! let events = consumer.events().unwrap();
//! consumer.start().unwrap();
//!
//! for event in events.iter().take(100) {
//!     println!("{} {:?}", event.system.event_id, event.property_str("ImageName"));
//! }
//!
//! consumer.stop().unwrap();
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```
//!
//! Records can also be replayed from memory with [`ReplaySource`](trace::replay::ReplaySource)
//! and decoded with schemas registered in an [`OfflineTdh`](tdh::OfflineTdh), on any platform.
//!
//! [Source]: https://docs.microsoft.com/en-us/windows/win32/etw/about-event-tracing
//!
//! # Log messages
//! This crate may occasionally write log messages using the [`log`](https://docs.rs/log/latest/log/) crate.<br/>
//! In case you want them to be printed to the console, your binary should use one of the various logger implementations. [`env_logger`](https://docs.rs/env_logger/latest/env_logger/) is one of them.<br/>
//! You can have a look at how to use it in the `demos/` folder.

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate num_derive;
extern crate num_traits;

pub mod consumer;
pub mod event;
pub mod filter;
pub mod formatter;
pub mod guid;
pub mod helper;
pub mod length;
pub mod native;
pub mod parser;
pub mod property;
pub mod provider;
pub mod record;
pub mod schema;
pub mod schema_locator;
pub mod ser;
pub mod tdh;
pub mod trace;
mod traits;
pub mod utils;

// Convenience re-exports.
pub use crate::consumer::{Consumer, ConsumerBuilder, ConsumerError, ConsumerOptions, Flow};
pub use crate::event::{Event, Value};
pub use crate::filter::EventFilter;
pub use crate::guid::Guid;
pub use crate::helper::{DecodeError, EventRecordHelper};
pub use crate::provider::Provider;
pub use crate::record::EventRecord;
pub use crate::schema::Schema;
pub use crate::schema_locator::SchemaLocator;
