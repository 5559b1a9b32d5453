//! ETW Event Property information
//!
//! The `property` module exposes the [`Property`] an event contains once its payload has been
//! walked: where its bytes are in the payload, and its formatted value, computed on first access.
use once_cell::unsync::OnceCell;

use crate::schema::PropertyDescriptor;

/// One property value of a record
#[derive(Debug, Clone)]
pub struct Property {
    pub descriptor: PropertyDescriptor,
    pub name: String,
    /// Offset of the value in the record payload
    pub offset: usize,
    /// Length resolved from the schema, 0 when it is determined from the data
    pub length: u32,
    /// Number of payload bytes the value spans
    pub size: usize,
    value: OnceCell<String>,
}

impl Property {
    pub fn new(
        descriptor: PropertyDescriptor,
        name: String,
        offset: usize,
        length: u32,
        size: usize,
    ) -> Self {
        Property {
            descriptor,
            name,
            offset,
            length,
            size,
            value: OnceCell::new(),
        }
    }

    /// A property whose value is known beforehand, and never formatted
    pub fn with_value(descriptor: PropertyDescriptor, name: String, value: String) -> Self {
        let property = Property::new(descriptor, name, 0, 0, 0);
        // a fresh cell cannot be already set
        let _ = property.value.set(value);
        property
    }

    /// The cached value, if it has been formatted already
    pub fn value(&self) -> Option<&str> {
        self.value.get().map(String::as_str)
    }

    /// The value, formatting it with `format` on first access
    pub fn value_or_try_format<F, E>(&self, format: F) -> Result<&str, E>
    where
        F: FnOnce(&Property) -> Result<String, E>,
    {
        self.value
            .get_or_try_init(|| format(self))
            .map(String::as_str)
    }

    /// Replace the value
    pub fn set_value(&mut self, value: String) {
        self.value = OnceCell::from(value);
    }

    pub fn is_formatted(&self) -> bool {
        self.value.get().is_some()
    }

    /// The raw bytes of the value
    pub fn bytes<'a>(&self, payload: &'a [u8]) -> Option<&'a [u8]> {
        payload.get(self.offset..self.offset + self.size)
    }
}
