//! Decoded events
//!
//! An [`Event`] owns copies of everything extracted from a record, so it outlives the record and
//! can be sent to other threads.
use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::filter::FilterSubject;
use crate::guid::Guid;

/// A property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    /// Elements of an array property
    Array(Vec<String>),
    /// Struct values, one map of member name to value per struct
    Structures(Vec<BTreeMap<String, String>>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

/// A numeric field and its human-readable name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedValue<T> {
    pub value: T,
    pub name: String,
}

impl<T> NamedValue<T> {
    pub fn new(value: T, name: String) -> Self {
        NamedValue { value, name }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Correlation {
    pub activity_id: Guid,
    /// The null GUID when the record has no related activity
    pub related_activity_id: Guid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    pub process_id: u32,
    pub thread_id: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderInfo {
    pub guid: Guid,
    pub name: String,
}

/// Metadata of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
    pub channel: String,
    pub computer: String,
    pub event_id: u16,
    /// `<Class>/<Opcode>`, classic events only
    pub event_type: Option<String>,
    /// Class GUID, classic events only
    pub event_guid: Option<Guid>,
    pub correlation: Correlation,
    pub execution: Execution,
    pub keywords: NamedValue<u64>,
    pub level: NamedValue<u8>,
    pub opcode: NamedValue<u8>,
    pub task: NamedValue<u16>,
    pub provider: ProviderInfo,
    pub time_created: OffsetDateTime,
}

impl Default for System {
    fn default() -> Self {
        System {
            channel: String::new(),
            computer: String::new(),
            event_id: 0,
            event_type: None,
            event_guid: None,
            correlation: Correlation::default(),
            execution: Execution::default(),
            keywords: NamedValue::default(),
            level: NamedValue::default(),
            opcode: NamedValue::default(),
            task: NamedValue::default(),
            provider: ProviderInfo::default(),
            time_created: OffsetDateTime::UNIX_EPOCH,
        }
    }
}

/// A decoded event
///
/// Properties are either in `event_data` or in `user_data`, depending on the schema of the event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub system: System,
    pub event_data: BTreeMap<String, Value>,
    pub user_data: BTreeMap<String, Value>,
    pub extended_data: Vec<String>,
    /// The event may be dropped when the output queue is full
    pub skippable: bool,
}

impl Event {
    pub fn new(system: System) -> Self {
        Event {
            system,
            ..Default::default()
        }
    }

    /// A property of the event, looked up in whichever of `EventData` and `UserData` is in use
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.event_data
            .get(name)
            .or_else(|| self.user_data.get(name))
    }

    pub fn property_str(&self, name: &str) -> Option<&str> {
        self.property(name).and_then(Value::as_str)
    }
}

impl FilterSubject for Event {
    fn provider_guid(&self) -> Guid {
        self.system.provider.guid
    }

    fn channel(&self) -> String {
        self.system.channel.clone()
    }

    fn event_id(&self) -> u16 {
        self.system.event_id
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_property_lookup() {
        let mut event = Event::default();
        event
            .user_data
            .insert("Name".into(), Value::String("value".into()));
        event
            .user_data
            .insert("List".into(), Value::Array(vec!["a".into()]));
        assert_eq!(event.property_str("Name"), Some("value"));
        assert_eq!(event.property_str("List"), None);
        assert!(event.property("List").is_some());
        assert!(event.property("Missing").is_none());
    }
}
