//! Event filtering
//!
//! An [`EventFilter`] restricts the events a consumer decodes to a set of event IDs, per provider
//! or per channel. A source the filter knows nothing about is let through, as is a source
//! configured with an empty set of IDs.
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::guid::Guid;
use crate::provider::Provider;

/// What a filter needs to know about an event to decide on it
pub trait FilterSubject {
    fn provider_guid(&self) -> Guid;
    fn channel(&self) -> String;
    fn event_id(&self) -> u16;
}

/// Source of events a set of IDs applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Provider(Guid),
    Channel(String),
}

/// Sets of event IDs, keyed on provider or channel
///
/// Lookups only take a read lock, so that decode workers can match events concurrently.
#[derive(Debug, Default)]
pub struct EventFilter {
    ids: RwLock<HashMap<FilterKey, HashSet<u16>>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Default::default()
    }

    /// Whether events `event_id` of `key` should be decoded
    pub fn matches(&self, key: &FilterKey, event_id: u16) -> bool {
        let ids = match self.ids.read() {
            Ok(ids) => ids,
            Err(poisoned) => poisoned.into_inner(),
        };

        match ids.get(key) {
            Some(set) if !set.is_empty() => set.contains(&event_id),
            _ => true,
        }
    }

    /// Both the provider and the channel of `subject` must match
    pub fn matches_subject<S: FilterSubject + ?Sized>(&self, subject: &S) -> bool {
        let event_id = subject.event_id();
        self.matches(&FilterKey::Provider(subject.provider_guid()), event_id)
            && self.matches(&FilterKey::Channel(subject.channel()), event_id)
    }

    /// Add `event_ids` to the IDs allowed for `key`
    ///
    /// Updates never remove IDs. An update with no IDs registers the key, letting all its events through.
    pub fn update<I>(&self, key: FilterKey, event_ids: I)
    where
        I: IntoIterator<Item = u16>,
    {
        let mut ids = match self.ids.write() {
            Ok(ids) => ids,
            Err(poisoned) => poisoned.into_inner(),
        };
        ids.entry(key).or_default().extend(event_ids);
    }

    pub fn update_from_provider(&self, provider: &Provider) {
        self.update(
            FilterKey::Provider(provider.guid),
            provider.filter.iter().copied(),
        );
    }

    /// Number of sources the filter knows about
    pub fn len(&self) -> usize {
        self.ids.read().map(|ids| ids.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
