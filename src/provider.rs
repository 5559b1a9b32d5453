//! ETW Providers abstraction.
//!
//! A [`Provider`] describes an [ETW Provider](https://docs.microsoft.com/en-us/windows/win32/etw/about-event-tracing#providers)
//! a session subscribes to. Consumers only use it to seed their [`EventFilter`](crate::filter::EventFilter).
//!
//! Providers are usually given as text, in the following form:
//!
//! ```text
//! NameOrGUID[:EnableLevel[:EventID,EventID,...[:MatchAnyKeyword[:MatchAllKeyword]]]]
//! ```
//!
//! e.g. `Microsoft-Windows-Kernel-File:0xff:12,13:0x80`. Empty components keep their default value,
//! numbers may be prefixed with `0x`, `0o`, `0b` or `0` (octal).
use std::collections::HashMap;

use once_cell::sync::OnceCell;

use crate::guid::Guid;
use crate::utils;

/// Provider module errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The name or GUID is not known to the catalog
    UnknownProvider(String),
    InvalidEnableLevel(String),
    InvalidEventId(String),
    InvalidKeyword(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownProvider(s) => write!(f, "unknown provider {}", s),
            Self::InvalidEnableLevel(s) => write!(f, "failed to parse EnableLevel {:?}", s),
            Self::InvalidEventId(s) => write!(f, "failed to parse EventID {:?}", s),
            Self::InvalidKeyword(s) => write!(f, "failed to parse keyword {:?}", s),
        }
    }
}

impl std::error::Error for ProviderError {}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Describes an ETW Provider to use, along with its options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub guid: Guid,
    pub name: String,
    pub enable_level: u8,
    pub match_any_keyword: u64,
    pub match_all_keyword: u64,
    /// Event IDs to decode, all of them when empty
    pub filter: Vec<u16>,
}

impl Provider {
    /// A provider with every level enabled and no keyword or event restriction
    pub fn by_guid<G: Into<Guid>>(guid: G) -> Self {
        Provider {
            guid: guid.into(),
            name: String::new(),
            enable_level: 0xff,
            match_any_keyword: 0,
            match_all_keyword: 0,
            filter: Vec::new(),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn level(mut self, level: u8) -> Self {
        self.enable_level = level;
        self
    }

    pub fn any(mut self, any: u64) -> Self {
        self.match_any_keyword = any;
        self
    }

    pub fn all(mut self, all: u64) -> Self {
        self.match_all_keyword = all;
        self
    }

    /// Only decode these events of the provider
    pub fn add_filter<I: IntoIterator<Item = u16>>(mut self, event_ids: I) -> Self {
        self.filter.extend(event_ids);
        self
    }

    /// Parse a provider in the `NameOrGUID[:Level[:IDs[:Any[:All]]]]` form
    ///
    /// The name or GUID is resolved through `catalog`. Components past the fifth are ignored.
    pub fn parse(s: &str, catalog: &dyn ProviderCatalog) -> ProviderResult<Self> {
        let mut components = s.split(':');

        let name_or_guid = components.next().unwrap_or_default();
        let mut provider = catalog
            .resolve(name_or_guid)
            .ok_or_else(|| ProviderError::UnknownProvider(name_or_guid.to_string()))?;

        for (i, chunk) in components.enumerate().take(4) {
            if chunk.is_empty() {
                continue;
            }
            match i {
                0 => {
                    provider.enable_level = utils::parse_uint_prefixed(chunk)
                        .and_then(|level| u8::try_from(level).ok())
                        .ok_or_else(|| ProviderError::InvalidEnableLevel(chunk.to_string()))?;
                }
                1 => {
                    for id in chunk.split(',') {
                        let id = utils::parse_uint_prefixed(id)
                            .and_then(|id| u16::try_from(id).ok())
                            .ok_or_else(|| ProviderError::InvalidEventId(id.to_string()))?;
                        provider.filter.push(id);
                    }
                }
                2 => {
                    provider.match_any_keyword = utils::parse_uint_prefixed(chunk)
                        .ok_or_else(|| ProviderError::InvalidKeyword(chunk.to_string()))?;
                }
                _ => {
                    provider.match_all_keyword = utils::parse_uint_prefixed(chunk)
                        .ok_or_else(|| ProviderError::InvalidKeyword(chunk.to_string()))?;
                }
            }
        }

        Ok(provider)
    }
}

/// Looks providers up by name or GUID
pub trait ProviderCatalog {
    /// The provider named `name_or_guid`, or whose GUID it is, with default options
    fn resolve(&self, name_or_guid: &str) -> Option<Provider>;
}

/// A catalog of known providers
///
/// Names are matched case-insensitively, GUIDs in any of their accepted text forms.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    by_key: HashMap<String, Provider>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Guid, S)>,
        S: AsRef<str>,
    {
        let mut catalog = Self::new();
        for (guid, name) in entries {
            catalog.insert(guid, name.as_ref());
        }
        catalog
    }

    pub fn insert(&mut self, guid: Guid, name: &str) {
        let provider = Provider::by_guid(guid).named(name);
        if !name.is_empty() {
            self.by_key.insert(name.to_lowercase(), provider.clone());
        }
        self.by_key.insert(guid.to_string(), provider);
    }

    /// Number of lookup keys (names and GUIDs)
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

impl ProviderCatalog for StaticCatalog {
    fn resolve(&self, name_or_guid: &str) -> Option<Provider> {
        let key = match Guid::parse(name_or_guid) {
            Ok(guid) => guid.to_string(),
            Err(_) => name_or_guid.to_lowercase(),
        };
        self.by_key.get(&key).cloned()
    }
}

type CatalogLoader = Box<dyn Fn() -> StaticCatalog + Send + Sync>;

/// A catalog populated by its loader on the first lookup, and never reloaded
pub struct LazyCatalog {
    loader: CatalogLoader,
    catalog: OnceCell<StaticCatalog>,
}

impl LazyCatalog {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn() -> StaticCatalog + Send + Sync + 'static,
    {
        LazyCatalog {
            loader: Box::new(loader),
            catalog: OnceCell::new(),
        }
    }

    /// The providers registered on this machine
    #[cfg(windows)]
    pub fn system() -> Self {
        Self::new(|| match crate::native::tdh::enumerate_providers() {
            Ok(providers) => StaticCatalog::from_entries(providers),
            Err(err) => {
                log::warn!("failed to enumerate the system providers: {:?}", err);
                StaticCatalog::new()
            }
        })
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.get().is_some()
    }
}

impl ProviderCatalog for LazyCatalog {
    fn resolve(&self, name_or_guid: &str) -> Option<Provider> {
        self.catalog
            .get_or_init(|| (self.loader)())
            .resolve(name_or_guid)
    }
}

impl std::fmt::Debug for LazyCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyCatalog")
            .field("catalog", &self.catalog)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const KERNEL_FILE: &str = "edd08927-9cc4-4e65-b970-c2560fb5c289";

    fn catalog() -> StaticCatalog {
        StaticCatalog::from_entries([(
            Guid::parse(KERNEL_FILE).unwrap(),
            "Microsoft-Windows-Kernel-File",
        )])
    }

    #[test]
    fn test_resolve() {
        let catalog = catalog();
        assert_eq!(catalog.len(), 2);

        let by_name = catalog.resolve("microsoft-windows-kernel-FILE").unwrap();
        let by_guid = catalog.resolve(&format!("{{{}}}", KERNEL_FILE.to_uppercase())).unwrap();
        assert_eq!(by_name, by_guid);
        assert_eq!(by_name.name, "Microsoft-Windows-Kernel-File");
        assert_eq!(by_name.enable_level, 0xff);
        assert!(catalog.resolve("Microsoft-Windows-Kernel-Nope").is_none());
    }

    #[test]
    fn test_parse_full() {
        let provider =
            Provider::parse("Microsoft-Windows-Kernel-File:0x04:12,0xe,016:0x80:0b11", &catalog())
                .unwrap();
        assert_eq!(provider.guid, Guid::parse(KERNEL_FILE).unwrap());
        assert_eq!(provider.enable_level, 4);
        assert_eq!(provider.filter, vec![12, 14, 14]);
        assert_eq!(provider.match_any_keyword, 0x80);
        assert_eq!(provider.match_all_keyword, 3);
    }

    #[test]
    fn test_parse_defaults() {
        let provider = Provider::parse(&format!("{}::13", KERNEL_FILE), &catalog()).unwrap();
        assert_eq!(provider.enable_level, 0xff);
        assert_eq!(provider.filter, vec![13]);
        assert_eq!(provider.match_any_keyword, 0);

        let provider =
            Provider::parse("Microsoft-Windows-Kernel-File:1::::garbage", &catalog()).unwrap();
        assert_eq!(provider.enable_level, 1);
        assert!(provider.filter.is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let catalog = catalog();
        assert_eq!(
            Provider::parse("Unknown:1", &catalog),
            Err(ProviderError::UnknownProvider("Unknown".into()))
        );
        assert!(matches!(
            Provider::parse("Microsoft-Windows-Kernel-File:256", &catalog),
            Err(ProviderError::InvalidEnableLevel(_))
        ));
        assert!(matches!(
            Provider::parse("Microsoft-Windows-Kernel-File::1,x", &catalog),
            Err(ProviderError::InvalidEventId(_))
        ));
        assert!(matches!(
            Provider::parse("Microsoft-Windows-Kernel-File::1,65536", &catalog),
            Err(ProviderError::InvalidEventId(_))
        ));
        assert!(matches!(
            Provider::parse("Microsoft-Windows-Kernel-File:::0xzz", &catalog),
            Err(ProviderError::InvalidKeyword(_))
        ));
    }

    #[test]
    fn test_lazy_catalog_loads_once() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let lazy = LazyCatalog::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            catalog()
        });

        assert!(!lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert!(lazy.resolve(KERNEL_FILE).is_some());
        assert!(lazy.resolve("nope").is_none());
        assert!(Provider::parse("Microsoft-Windows-Kernel-File", &lazy).is_ok());
        assert!(lazy.is_loaded());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
