//! Abstraction layer for Native functions and types
//!
//! This module interacts with the Windows native functions and should abstract all `unsafe` calls.
//! The layout and time helpers (`tdh_types`, `time`) only decode bytes and are available on every
//! platform; everything that calls into Windows is only compiled there.
pub mod tdh_types;
pub mod time;

#[cfg(windows)]
pub mod etw_types;
#[cfg(windows)]
pub mod evntrace;
#[cfg(windows)]
pub mod tdh;

#[cfg(windows)]
pub use evntrace::{EvntraceNativeError, SystemTraceSource};
#[cfg(windows)]
pub use tdh::SystemTdh;

/// Name of the local machine, as reported in the `Computer` field of events
pub fn computer_name() -> String {
    #[cfg(windows)]
    if let Some(name) = etw_types::computer_name() {
        return name;
    }

    ["COMPUTERNAME", "HOSTNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| String::from("localhost"))
}
