//! Diagram cache stores for Plume.
//!
//! Rendering a diagram can take seconds, so rendered SVG is kept in a store
//! keyed by diagram content. Two implementations of [`DiagramStore`] exist:
//!
//! - [`EphemeralStore`]: in-memory only, random keys (caching disabled)
//! - [`DurableStore`]: file-backed, content-hash keys, prunes stale entries
//!
//! Use [`open_store`] to pick one from a [`CacheConfig`].
//!
//! # Example
//!
//! ```
//! use plume_store::{DiagramRecord, DiagramStore, EphemeralStore, ThemeMode};
//!
//! let mut store = EphemeralStore::new();
//! let key = store.add(DiagramRecord::new("@startuml\nA -> B\n@enduml", ThemeMode::Light));
//! assert_eq!(store.pending().len(), 1);
//!
//! store.update(&key, Ok("<svg/>".to_owned())).unwrap();
//! assert!(store.pending().is_empty());
//! ```

mod file;
mod memory;
mod record;

use std::collections::{BTreeMap, HashSet};

use plume_config::{CacheBackend, CacheConfig, ConfigError};

pub use file::DurableStore;
pub use memory::EphemeralStore;
pub use record::{
    CacheKey, DiagramCount, DiagramRecord, RenderFailure, RenderResult, RenderState, ThemeMode,
};

/// Store error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A key was used that was never added to the store.
    #[error("unknown diagram key: {0}")]
    UnknownKey(CacheKey),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization of the storage file failed.
    #[error("failed to encode storage file: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    /// Cache configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Records of a store plus the set of keys that must not be persisted.
///
/// Shared bookkeeping for every [`DiagramStore`] implementation. Opaque
/// outside this crate.
#[derive(Debug, Default)]
pub struct RecordMap {
    records: BTreeMap<CacheKey, DiagramRecord>,
    stale: HashSet<CacheKey>,
}

impl RecordMap {
    fn from_loaded(records: BTreeMap<CacheKey, DiagramRecord>) -> Self {
        let stale = records.keys().cloned().collect();
        Self { records, stale }
    }

    /// Insert `record` under `key` unless the key is already present.
    ///
    /// The key is no longer stale afterwards.
    fn insert_or_keep(&mut self, key: &str, record: DiagramRecord) {
        self.stale.remove(key);
        if !self.records.contains_key(key) {
            self.records.insert(key.to_owned(), record);
        }
    }

    fn resolve(&mut self, key: &str, result: RenderResult) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_owned()))?;
        if result.is_err() {
            self.stale.insert(key.to_owned());
        } else {
            self.stale.remove(key);
        }
        record.resolve(result);
        Ok(())
    }

    fn reset(&mut self, key: &str) -> Result<(), StoreError> {
        let record = self
            .records
            .get_mut(key)
            .ok_or_else(|| StoreError::UnknownKey(key.to_owned()))?;
        record.reset();
        Ok(())
    }

    /// Whether `key` will be dropped on persist.
    pub(crate) fn is_stale(&self, key: &str) -> bool {
        self.stale.contains(key)
    }

    /// Records that survive a persist, in key order.
    fn persistent(&self) -> impl Iterator<Item = (&CacheKey, &DiagramRecord)> {
        self.records
            .iter()
            .filter(|(key, record)| !self.is_stale(key) && record.failure().is_none())
    }
}

mod sealed {
    use super::RecordMap;

    /// Bookkeeping behind the provided [`DiagramStore`](super::DiagramStore)
    /// methods. Only stores of this crate implement it.
    pub trait RecordAccess {
        fn records(&self) -> &RecordMap;

        fn records_mut(&mut self) -> &mut RecordMap;
    }
}

use sealed::RecordAccess;

/// Key/value store of diagram records.
///
/// Stores are owned by a single build and mutated sequentially; they are not
/// synchronized. The trait is sealed: [`EphemeralStore`] and [`DurableStore`]
/// are its only implementations.
pub trait DiagramStore: Send + RecordAccess {
    /// Derive the key for `record`.
    fn hash(&self, record: &DiagramRecord) -> CacheKey;

    /// Register a record and return its key.
    fn add(&mut self, record: DiagramRecord) -> CacheKey;

    /// Flush the store to its durable medium.
    fn persist(&mut self) -> Result<(), StoreError>;

    /// Store the render outcome for `key`.
    ///
    /// A failed outcome also marks the key stale so it is retried next build;
    /// a successful one clears that mark.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownKey` if `key` was never added.
    fn update(&mut self, key: &str, result: RenderResult) -> Result<(), StoreError> {
        self.records_mut().resolve(key, result)
    }

    /// Store render outcomes for several keys, stopping at the first unknown key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownKey` if any key was never added.
    fn update_all(&mut self, results: Vec<(CacheKey, RenderResult)>) -> Result<(), StoreError> {
        for (key, result) in results {
            self.update(&key, result)?;
        }
        Ok(())
    }

    /// Reset `key` to pending so it is rendered again.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownKey` if `key` was never added.
    fn invalidate(&mut self, key: &str) -> Result<(), StoreError> {
        self.records_mut().reset(key)
    }

    /// Schemes of all records that still await rendering, by key.
    fn pending(&self) -> BTreeMap<CacheKey, String> {
        self.records()
            .records
            .iter()
            .filter(|(_, record)| record.is_pending())
            .map(|(key, record)| (key.clone(), record.scheme().to_owned()))
            .collect()
    }

    /// Look up a record.
    fn get(&self, key: &str) -> Option<&DiagramRecord> {
        self.records().records.get(key)
    }

    /// Iterate over all records in key order.
    fn iter(&self) -> Box<dyn Iterator<Item = (&CacheKey, &DiagramRecord)> + '_> {
        Box::new(self.records().records.iter())
    }

    /// Number of records.
    fn len(&self) -> usize {
        self.records().records.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count records per theme mode.
    ///
    /// Counts pending records only, or every record when `total` is set.
    fn count(&self, total: bool) -> DiagramCount {
        self.records()
            .records
            .values()
            .filter(|record| total || record.is_pending())
            .fold(DiagramCount::default(), |mut count, record| {
                match record.mode() {
                    ThemeMode::Light => count.light += 1,
                    ThemeMode::Dark => count.dark += 1,
                }
                count
            })
    }
}

/// Open the store selected by `config`.
///
/// # Errors
///
/// Returns an error if the cache directory cannot be resolved or created.
pub fn open_store(config: &CacheConfig) -> Result<Box<dyn DiagramStore>, StoreError> {
    match config.backend {
        CacheBackend::Disabled => Ok(Box::new(EphemeralStore::new())),
        CacheBackend::Local => {
            let dir = config.local.resolved_dir()?;
            let store = DurableStore::open(&dir, &config.local.filename)?;
            Ok(Box::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn failure(status: u16) -> RenderFailure {
        RenderFailure::Status {
            status,
            message: "error".to_owned(),
        }
    }

    #[test]
    fn test_open_store_disabled() {
        let mut store = open_store(&CacheConfig::disabled()).unwrap();
        let record = DiagramRecord::new("scheme", ThemeMode::Light);
        let first = store.add(record.clone());
        let second = store.add(record);
        assert_ne!(first, second);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_open_store_local() {
        let tmp = TempDir::new().unwrap();
        let config = CacheConfig::local(tmp.path().join("cache").display().to_string());

        let mut store = open_store(&config).unwrap();
        let record = DiagramRecord::new("scheme", ThemeMode::Light);
        let first = store.add(record.clone());
        let second = store.add(record);
        assert_eq!(first, second);
        assert_eq!(store.len(), 1);

        store.update(&first, Ok("<svg/>".to_owned())).unwrap();
        store.persist().unwrap();
        assert!(tmp.path().join("cache/storage.mpack").exists());
    }

    #[test]
    fn test_pending_tracks_updates() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));
        let b = store.add(DiagramRecord::new("b", ThemeMode::Dark));

        let pending = store.pending();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[&a], "a");
        assert_eq!(pending[&b], "b");

        store.update(&a, Ok("<svg/>".to_owned())).unwrap();
        let pending = store.pending();
        assert_eq!(pending.keys().collect::<Vec<_>>(), vec![&b]);

        store.update(&b, Err(failure(500))).unwrap();
        assert!(store.pending().is_empty());
    }

    #[test]
    fn test_update_unknown_key_fails() {
        let mut store = EphemeralStore::new();
        let err = store
            .update("missing", Ok("<svg/>".to_owned()))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownKey(ref key) if key == "missing"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_all_stops_at_unknown_key() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));

        let result = store.update_all(vec![
            (a.clone(), Ok("<svg/>".to_owned())),
            ("missing".to_owned(), Ok("<svg/>".to_owned())),
        ]);
        assert!(result.is_err());
        assert_eq!(store.get(&a).unwrap().svg(), Some("<svg/>"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_failed_update_marks_stale() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));
        assert!(!store.records().is_stale(&a));

        store.update(&a, Err(failure(502))).unwrap();
        assert!(store.records().is_stale(&a));
        assert_eq!(
            store.get(&a).unwrap().failure().unwrap().status_code(),
            Some(502)
        );
    }

    #[test]
    fn test_successful_retry_clears_stale() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));
        store.update(&a, Err(failure(503))).unwrap();
        assert!(store.records().is_stale(&a));

        store.invalidate(&a).unwrap();
        store.update(&a, Ok("<svg/>".to_owned())).unwrap();
        assert!(!store.records().is_stale(&a));
    }

    #[test]
    fn test_invalidate_makes_record_pending() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));
        store.update(&a, Ok("<svg/>".to_owned())).unwrap();
        assert!(store.pending().is_empty());

        store.invalidate(&a).unwrap();
        assert_eq!(store.pending().len(), 1);
        assert!(store.invalidate("missing").is_err());
    }

    #[test]
    fn test_count_pending_and_total() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));
        store.add(DiagramRecord::new("a", ThemeMode::Dark));
        store.add(DiagramRecord::new("b", ThemeMode::Light));

        assert_eq!(store.count(false), DiagramCount { light: 2, dark: 1 });

        store.update(&a, Ok("<svg/>".to_owned())).unwrap();
        assert_eq!(store.count(false), DiagramCount { light: 1, dark: 1 });
        assert_eq!(store.count(true), DiagramCount { light: 2, dark: 1 });
        assert_eq!(store.count(true).total(), 3);
    }

    #[test]
    fn test_iter_and_get() {
        let mut store = EphemeralStore::new();
        let a = store.add(DiagramRecord::new("a", ThemeMode::Light));

        let items: Vec<_> = store.iter().collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, &a);
        assert_eq!(store.get(&a).unwrap().scheme(), "a");
        assert!(store.get("missing").is_none());
    }
}
