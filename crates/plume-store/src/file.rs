//! File-backed store.
//!
//! [`DurableStore`] keeps all records of a project in a single `MessagePack`
//! file, a map from cache key to a flat record:
//!
//! ```text
//! { "<sha256 hex>": { "scheme": "...", "mode": "light", "rendered": "<svg ...>" | nil } }
//! ```
//!
//! Every key loaded from disk starts out stale. Adding a record clears its
//! key, so at [`persist`](DiagramStore::persist) the remaining stale keys are
//! exactly the diagrams that disappeared from the documentation since the
//! previous build. They are not written back.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    CacheKey, DiagramRecord, DiagramStore, RecordAccess, RecordMap, RenderState, StoreError,
    ThemeMode,
};

/// Record layout on disk.
#[derive(Deserialize)]
struct StoredRecord {
    scheme: String,
    mode: ThemeMode,
    rendered: Option<String>,
}

/// Borrowed record layout used when writing.
#[derive(Serialize)]
struct StoredRecordRef<'a> {
    scheme: &'a str,
    mode: ThemeMode,
    rendered: Option<&'a str>,
}

impl From<StoredRecord> for DiagramRecord {
    fn from(stored: StoredRecord) -> Self {
        match stored.rendered {
            Some(svg) => Self::rendered(stored.scheme, stored.mode, svg),
            None => Self::new(stored.scheme, stored.mode),
        }
    }
}

impl<'a> From<&'a DiagramRecord> for StoredRecordRef<'a> {
    fn from(record: &'a DiagramRecord) -> Self {
        let rendered = match record.state() {
            RenderState::Resolved(Ok(svg)) => Some(svg.as_str()),
            RenderState::Pending | RenderState::Resolved(Err(_)) => None,
        };
        Self {
            scheme: record.scheme(),
            mode: record.mode(),
            rendered,
        }
    }
}

/// [`DiagramStore`] persisted to a file between builds.
///
/// Keys are the SHA-256 of the scheme, so identical diagrams share a record
/// within a build and across builds.
#[derive(Debug)]
pub struct DurableStore {
    path: PathBuf,
    records: RecordMap,
}

impl DurableStore {
    /// Open the store at `dir/filename`, creating `dir` if needed.
    ///
    /// A missing or empty file yields an empty store. A file that cannot be
    /// decoded is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created or the
    /// file cannot be read.
    pub fn open(dir: &Path, filename: &str) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(filename);
        let records = read_records(&path)?;
        tracing::debug!(
            path = %path.display(),
            count = records.len(),
            "Loaded diagram storage"
        );

        Ok(Self {
            path,
            records: RecordMap::from_loaded(records),
        })
    }

    /// Path of the storage file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_records(path: &Path) -> Result<BTreeMap<CacheKey, DiagramRecord>, StoreError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(BTreeMap::new());
    }

    match rmp_serde::from_slice::<BTreeMap<CacheKey, StoredRecord>>(&bytes) {
        Ok(stored) => Ok(stored
            .into_iter()
            .map(|(key, record)| (key, record.into()))
            .collect()),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to decode diagram storage, starting empty"
            );
            Ok(BTreeMap::new())
        }
    }
}

impl DiagramStore for DurableStore {
    fn hash(&self, record: &DiagramRecord) -> CacheKey {
        let mut hasher = Sha256::new();
        hasher.update(record.scheme().as_bytes());
        let result = hasher.finalize();
        hex::encode(result)
    }

    fn add(&mut self, record: DiagramRecord) -> CacheKey {
        let key = self.hash(&record);
        self.records.insert_or_keep(&key, record);
        key
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let to_save: BTreeMap<&CacheKey, StoredRecordRef<'_>> = self
            .records
            .persistent()
            .map(|(key, record)| (key, record.into()))
            .collect();

        let bytes = rmp_serde::to_vec_named(&to_save)?;
        fs::write(&self.path, bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            count = to_save.len(),
            dropped = self.records.records.len() - to_save.len(),
            "Persisted diagram storage"
        );
        Ok(())
    }
}

impl RecordAccess for DurableStore {
    fn records(&self) -> &RecordMap {
        &self.records
    }

    fn records_mut(&mut self) -> &mut RecordMap {
        &mut self.records
    }
}
