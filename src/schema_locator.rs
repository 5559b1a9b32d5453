//! Per-worker schema cache

use std::collections::HashMap;
use std::sync::Arc;

use crate::guid::Guid;
use crate::record::EventRecord;
use crate::schema::{Schema, SchemaResult};
use crate::tdh::{self, Tdh};

/// Records with equal keys are decoded with the same [`Schema`]
///
/// Manifest events are identified by provider, ID and version. Classic events all have ID 0 and are
/// told apart by their opcode.
#[derive(Debug, Eq, PartialEq, Hash)]
struct SchemaKey {
    provider: Guid,
    id: u16,
    version: u8,
    opcode: u8,
    level: u8,
}

impl SchemaKey {
    fn of(record: &EventRecord) -> Self {
        let descriptor = record.header().descriptor;
        SchemaKey {
            provider: record.provider_id(),
            id: descriptor.id,
            version: descriptor.version,
            opcode: descriptor.opcode,
            level: descriptor.level,
        }
    }
}

/// Schemas already resolved by a decode worker, keyed on provider, event ID, version, opcode
/// and level
///
/// Each worker owns its locator, so no locking is involved.
/// Schemas of TraceLogging events are never cached: their layout travels with each event.
pub struct SchemaLocator {
    schemas: HashMap<SchemaKey, Arc<Schema>>,
    enabled: bool,
}

impl Default for SchemaLocator {
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for SchemaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaLocator")
            .field("len", &self.schemas.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl SchemaLocator {
    /// `enabled: false` resolves every schema from scratch
    pub fn new(enabled: bool) -> Self {
        SchemaLocator {
            schemas: HashMap::new(),
            enabled,
        }
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// The schema of `record`, resolved through `tdh` on a cache miss
    pub fn event_schema(
        &mut self,
        record: &EventRecord,
        tdh: &dyn Tdh,
    ) -> SchemaResult<Arc<Schema>> {
        let key = SchemaKey::of(record);
        if let Some(cached) = self.schemas.get(&key) {
            return Ok(Arc::clone(cached));
        }

        log::trace!("schema cache miss for {:?}", key);
        let schema = Arc::new(tdh::event_schema(tdh, record)?);
        if self.enabled && !schema.is_tracelogging() {
            self.schemas.insert(key, Arc::clone(&schema));
        }
        Ok(schema)
    }
}
