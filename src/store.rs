//! The dataset store boundary: an abstract keyed record store with
//! per-key upsert semantics.
//!
//! The merge engine only ever talks to [`DatasetStore`]. Lookups are always
//! scoped by owner, so colliding identity keys across tenants can never
//! match. Two implementations ship with the crate: [`MemoryStore`] for tests
//! and embedding, and [`JsonStore`], a file-backed store that loads on open
//! and persists on [`flush`](JsonStore::flush), which gives the CLI a
//! working end-to-end path without a database.

use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use log::debug;

use crate::{error::ImportError, record::VisitorRecord};

/// Keyed record store consumed by the commit engine. Each call is assumed
/// individually atomic; failures surface as
/// [`ImportError::StoreUnavailable`].
pub trait DatasetStore {
    fn find_by_identity(
        &self,
        owner_id: &str,
        identity_key: &str,
    ) -> Result<Option<VisitorRecord>, ImportError>;

    fn insert(&mut self, identity_key: &str, record: VisitorRecord) -> Result<(), ImportError>;

    fn update(&mut self, identity_key: &str, record: VisitorRecord) -> Result<(), ImportError>;
}

/// In-memory store keyed by `(ownerId, identityKey)`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<(String, String), VisitorRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &VisitorRecord> {
        self.records.values()
    }

    pub fn get(&self, owner_id: &str, identity_key: &str) -> Option<&VisitorRecord> {
        self.records
            .get(&(owner_id.to_string(), identity_key.to_string()))
    }
}

impl DatasetStore for MemoryStore {
    fn find_by_identity(
        &self,
        owner_id: &str,
        identity_key: &str,
    ) -> Result<Option<VisitorRecord>, ImportError> {
        Ok(self.get(owner_id, identity_key).cloned())
    }

    fn insert(&mut self, identity_key: &str, record: VisitorRecord) -> Result<(), ImportError> {
        self.records
            .insert((record.owner_id.clone(), identity_key.to_string()), record);
        Ok(())
    }

    fn update(&mut self, identity_key: &str, record: VisitorRecord) -> Result<(), ImportError> {
        self.insert(identity_key, record)
    }
}

/// JSON-file-backed store. The whole dataset is loaded at open and written
/// back on flush; suitable for the CLI's dataset sizes, swappable behind
/// [`DatasetStore`] for anything bigger.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    records: BTreeMap<(String, String), VisitorRecord>,
    dirty: bool,
}

/// Serialized shape: identity keys live beside the records they index so a
/// reload does not have to re-derive them.
#[derive(serde::Serialize, serde::Deserialize)]
struct StoredEntry {
    #[serde(rename = "identityKey")]
    identity_key: String,
    #[serde(flatten)]
    record: VisitorRecord,
}

impl JsonStore {
    /// Opens the store at `path`, creating an empty one when the file does
    /// not exist yet.
    pub fn open(path: &Path) -> Result<Self, ImportError> {
        if !path.exists() {
            debug!("Dataset file {path:?} not found; starting empty");
            return Ok(Self {
                path: path.to_path_buf(),
                records: BTreeMap::new(),
                dirty: false,
            });
        }
        let file = File::open(path)
            .map_err(|err| ImportError::store(format!("opening {path:?}: {err}")))?;
        let entries: Vec<StoredEntry> = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| ImportError::store(format!("parsing {path:?}: {err}")))?;
        let records = entries
            .into_iter()
            .map(|entry| {
                (
                    (entry.record.owner_id.clone(), entry.identity_key),
                    entry.record,
                )
            })
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            records,
            dirty: false,
        })
    }

    /// Writes the dataset back to disk if anything changed since open.
    pub fn flush(&mut self) -> Result<(), ImportError> {
        if !self.dirty {
            return Ok(());
        }
        let entries: Vec<StoredEntry> = self
            .records
            .iter()
            .map(|((_, identity_key), record)| StoredEntry {
                identity_key: identity_key.clone(),
                record: record.clone(),
            })
            .collect();
        let file = File::create(&self.path)
            .map_err(|err| ImportError::store(format!("creating {:?}: {err}", self.path)))?;
        serde_json::to_writer_pretty(file, &entries)
            .map_err(|err| ImportError::store(format!("writing {:?}: {err}", self.path)))?;
        self.dirty = false;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl DatasetStore for JsonStore {
    fn find_by_identity(
        &self,
        owner_id: &str,
        identity_key: &str,
    ) -> Result<Option<VisitorRecord>, ImportError> {
        Ok(self
            .records
            .get(&(owner_id.to_string(), identity_key.to_string()))
            .cloned())
    }

    fn insert(&mut self, identity_key: &str, record: VisitorRecord) -> Result<(), ImportError> {
        self.records
            .insert((record.owner_id.clone(), identity_key.to_string()), record);
        self.dirty = true;
        Ok(())
    }

    fn update(&mut self, identity_key: &str, record: VisitorRecord) -> Result<(), ImportError> {
        self.insert(identity_key, record)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn record(owner: &str, name: &str) -> VisitorRecord {
        let mut fields = BTreeMap::new();
        fields.insert("fullName".to_string(), name.to_string());
        VisitorRecord::new(owner, fields, BTreeMap::new())
    }

    #[test]
    fn memory_store_scopes_lookups_by_owner() {
        let mut store = MemoryStore::new();
        store
            .insert("name:jane doe", record("tenant-a", "Jane Doe"))
            .expect("insert");
        assert!(
            store
                .find_by_identity("tenant-a", "name:jane doe")
                .expect("lookup")
                .is_some()
        );
        assert!(
            store
                .find_by_identity("tenant-b", "name:jane doe")
                .expect("lookup")
                .is_none()
        );
    }

    #[test]
    fn json_store_round_trips_through_flush() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("dataset.json");

        let mut store = JsonStore::open(&path).expect("open empty");
        store
            .insert("email:jane@x.com", record("tenant-a", "Jane Doe"))
            .expect("insert");
        store.flush().expect("flush");

        let reloaded = JsonStore::open(&path).expect("reopen");
        assert_eq!(reloaded.len(), 1);
        let found = reloaded
            .find_by_identity("tenant-a", "email:jane@x.com")
            .expect("lookup")
            .expect("record persisted");
        assert_eq!(found.field("fullName"), "Jane Doe");
    }
}
