//! Integrates with [serde](https://serde.rs/) enabling [`Event`](crate::event::Event) to be serialized to various formats.
//!
//! Requires the `serde` feature be enabled.
//!
//! Events serialize to the following shape, `EventData`, `UserData` and `ExtendedData` being
//! omitted when empty, `EventType` and `EventGuid` being only present for classic events:
//!
//! ```text
//! {
//!   "EventData": { "<property>": "<value>" | ["<value>", ...] | [{ "<member>": "<value>" }] },
//!   "System": {
//!     "Channel": "", "Computer": "", "EventID": 0, "EventType": "", "EventGuid": "",
//!     "Correlation": { "ActivityID": "", "RelatedActivityID": "" },
//!     "Execution": { "ProcessID": 0, "ThreadID": 0 },
//!     "Keywords": { "Value": 0, "Name": "" },
//!     "Level": { "Value": 0, "Name": "" },
//!     "Opcode": { "Value": 0, "Name": "" },
//!     "Task": { "Value": 0, "Name": "" },
//!     "Provider": { "Guid": "", "Name": "" },
//!     "TimeCreated": { "SystemTime": "<RFC 3339>" }
//!   },
//!   "ExtendedData": [""]
//! }
//! ```
//!
//! GUIDs are serialized in their braced form by human-readable serializers, as their four fields
//! otherwise.
#![cfg(feature = "serde")]

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use crate::event::{Correlation, Event, Execution, NamedValue, ProviderInfo, System, Value};
use crate::guid::Guid;
use crate::native::time;

struct GuidExt<'a>(&'a Guid);

impl Serialize for GuidExt<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            return serializer.serialize_str(&self.0.to_string());
        }

        (self.0.data1, self.0.data2, self.0.data3, self.0.data4).serialize(serializer)
    }
}

impl Serialize for Guid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        GuidExt(self).serialize(serializer)
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::String(s) => serializer.serialize_str(s),
            Value::Array(values) => values.serialize(serializer),
            Value::Structures(structures) => structures.serialize(serializer),
        }
    }
}

impl<T: Serialize> Serialize for NamedValue<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("NamedValue", 2)?;
        state.serialize_field("Value", &self.value)?;
        state.serialize_field("Name", &self.name)?;
        state.end()
    }
}

impl Serialize for Correlation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Correlation", 2)?;
        state.serialize_field("ActivityID", &GuidExt(&self.activity_id))?;
        state.serialize_field("RelatedActivityID", &GuidExt(&self.related_activity_id))?;
        state.end()
    }
}

impl Serialize for Execution {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Execution", 2)?;
        state.serialize_field("ProcessID", &self.process_id)?;
        state.serialize_field("ThreadID", &self.thread_id)?;
        state.end()
    }
}

impl Serialize for ProviderInfo {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Provider", 2)?;
        state.serialize_field("Guid", &GuidExt(&self.guid))?;
        state.serialize_field("Name", &self.name)?;
        state.end()
    }
}

struct TimeCreatedSer<'a>(&'a ::time::OffsetDateTime);

impl Serialize for TimeCreatedSer<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_map(Some(1))?;
        match time::format_rfc3339(*self.0) {
            Some(rfc3339) => state.serialize_entry("SystemTime", &rfc3339)?,
            None => state.serialize_entry("SystemTime", &self.0.unix_timestamp())?,
        }
        state.end()
    }
}

impl Serialize for System {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("System", 13)?;
        state.serialize_field("Channel", &self.channel)?;
        state.serialize_field("Computer", &self.computer)?;
        state.serialize_field("EventID", &self.event_id)?;
        match self.event_type.as_deref() {
            Some(event_type) if !event_type.is_empty() => {
                state.serialize_field("EventType", event_type)?
            }
            _ => state.skip_field("EventType")?,
        }
        match &self.event_guid {
            Some(guid) => state.serialize_field("EventGuid", &GuidExt(guid))?,
            None => state.skip_field("EventGuid")?,
        }
        state.serialize_field("Correlation", &self.correlation)?;
        state.serialize_field("Execution", &self.execution)?;
        state.serialize_field("Keywords", &self.keywords)?;
        state.serialize_field("Level", &self.level)?;
        state.serialize_field("Opcode", &self.opcode)?;
        state.serialize_field("Task", &self.task)?;
        state.serialize_field("Provider", &self.provider)?;
        state.serialize_field("TimeCreated", &TimeCreatedSer(&self.time_created))?;
        state.end()
    }
}

impl Serialize for Event {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut state = serializer.serialize_struct("Event", 4)?;

        if self.event_data.is_empty() {
            state.skip_field("EventData")?;
        } else {
            state.serialize_field("EventData", &self.event_data)?;
        }

        if self.user_data.is_empty() {
            state.skip_field("UserData")?;
        } else {
            state.serialize_field("UserData", &self.user_data)?;
        }

        state.serialize_field("System", &self.system)?;

        if self.extended_data.is_empty() {
            state.skip_field("ExtendedData")?;
        } else {
            state.serialize_field("ExtendedData", &self.extended_data)?;
        }

        state.end()
    }
}
