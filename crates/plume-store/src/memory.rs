//! In-memory store used when caching is disabled.

use uuid::Uuid;

use crate::{
    CacheKey, DiagramRecord, DiagramStore, RecordAccess, RecordMap, StoreError, ThemeMode,
};

/// [`DiagramStore`] that lives for a single build.
///
/// Keys are random, so identical schemes are never deduplicated and every
/// [`add`](DiagramStore::add) creates a new entry. Dark records get a `-dark`
/// suffix. [`persist`](DiagramStore::persist) does nothing.
#[derive(Debug, Default)]
pub struct EphemeralStore {
    records: RecordMap,
}

impl EphemeralStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl DiagramStore for EphemeralStore {
    fn hash(&self, record: &DiagramRecord) -> CacheKey {
        let id = Uuid::new_v4();
        match record.mode() {
            ThemeMode::Light => id.to_string(),
            ThemeMode::Dark => format!("{id}-dark"),
        }
    }

    fn add(&mut self, record: DiagramRecord) -> CacheKey {
        let key = self.hash(&record);
        self.records.insert_or_keep(&key, record);
        key
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

impl RecordAccess for EphemeralStore {
    fn records(&self) -> &RecordMap {
        &self.records
    }

    fn records_mut(&mut self) -> &mut RecordMap {
        &mut self.records
    }
}
