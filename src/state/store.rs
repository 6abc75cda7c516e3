use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use thiserror::Error;

use super::ResourceStateRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt state for '{resource_id}': {message}")]
    Corrupt { resource_id: String, message: String },

    #[error("illegal resource id: {0:?}")]
    IllegalId(String),

    #[error("could not determine a state directory. Set TFSYNC_STATE_DIR or use --state-dir flag")]
    NoStateDir,
}

/// Keyed storage of state records, one per managed resource.
///
/// Callers serialize access per resource; implementations only need to be
/// safe to share.
pub trait StateStore: Send + Sync {
    fn load(&self, resource_id: &str) -> Result<Option<ResourceStateRecord>, StoreError>;

    fn save(&self, record: &ResourceStateRecord) -> Result<(), StoreError>;

    /// Returns whether a record was removed.
    fn remove(&self, resource_id: &str) -> Result<bool, StoreError>;

    /// Resource ids with a stored record, sorted.
    fn list(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    records: Mutex<BTreeMap<String, ResourceStateRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<String, ResourceStateRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, resource_id: &str) -> Result<Option<ResourceStateRecord>, StoreError> {
        Ok(self.records().get(resource_id).cloned())
    }

    fn save(&self, record: &ResourceStateRecord) -> Result<(), StoreError> {
        self.records()
            .insert(record.resource_id.clone(), record.clone());
        Ok(())
    }

    fn remove(&self, resource_id: &str) -> Result<bool, StoreError> {
        Ok(self.records().remove(resource_id).is_some())
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records().keys().cloned().collect())
    }
}

/// One JSON document per resource under a directory.
///
/// File names are the percent-encoded resource id, so ids containing path
/// separators stay inside the directory.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `$XDG_STATE_HOME/tfsync`, falling back to the local data directory.
    pub fn default_dir() -> Result<PathBuf, StoreError> {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .map(|dir| dir.join("tfsync"))
            .ok_or(StoreError::NoStateDir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, resource_id: &str) -> Result<PathBuf, StoreError> {
        if resource_id.is_empty() {
            return Err(StoreError::IllegalId(resource_id.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", urlencoding::encode(resource_id))))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl StateStore for FileStateStore {
    fn load(&self, resource_id: &str) -> Result<Option<ResourceStateRecord>, StoreError> {
        let path = self.file_path(resource_id)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(resource_id, "no state record");
                return Ok(None);
            }
            Err(e) => return Err(io_error(&path)(e)),
        };

        let value: Value = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
            resource_id: resource_id.to_string(),
            message: e.to_string(),
        })?;
        let record = ResourceStateRecord::from_persisted(resource_id, value)?;
        tracing::debug!(resource_id, path = %path.display(), "loaded state record");
        Ok(record)
    }

    fn save(&self, record: &ResourceStateRecord) -> Result<(), StoreError> {
        let path = self.file_path(&record.resource_id)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;

        let document = record
            .to_persisted()
            .and_then(|value| serde_json::to_string_pretty(&value))
            .map_err(|e| StoreError::Corrupt {
                resource_id: record.resource_id.clone(),
                message: e.to_string(),
            })?;

        // Write then rename, so a crash never leaves a half-written record.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, document).map_err(io_error(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_error(&path))?;

        tracing::debug!(
            resource_id = %record.resource_id,
            path = %path.display(),
            "saved state record"
        );
        Ok(())
    }

    fn remove(&self, resource_id: &str) -> Result<bool, StoreError> {
        let path = self.file_path(resource_id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(resource_id, "removed state record");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&path)(e)),
        }
    }

    fn list(&self) -> Result<Vec<String>, StoreError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&self.dir)(e)),
        };

        let mut ids = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_error(&self.dir))?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(".json"))
            else {
                continue;
            };
            match urlencoding::decode(stem) {
                Ok(id) => ids.push(id.into_owned()),
                Err(e) => {
                    tracing::warn!(
                        file = %path.display(),
                        error = %e,
                        "skipping undecodable state file"
                    )
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Attributes;
    use serde_json::json;

    fn record(id: &str) -> ResourceStateRecord {
        let observed = json!({ "id": id, "size": 1 }).as_object().cloned().unwrap();
        ResourceStateRecord::new(id, "local_file", observed, 0, "hash")
    }

    fn exercise(store: &dyn StateStore) {
        assert!(store.load("a").unwrap().is_none());
        let a = record("a");
        store.save(&record("b")).unwrap();
        store.save(&a).unwrap();
        assert_eq!(store.load("a").unwrap(), Some(a));
        assert_eq!(store.list().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.remove("a").unwrap());
        assert!(!store.remove("a").unwrap());
        assert_eq!(store.list().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_memory_store_lifecycle() {
        exercise(&MemoryStateStore::new());
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FileStateStore::new(dir.path().join("state")));
    }

    #[test]
    fn test_file_store_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        let saved = record("r1");
        store.save(&saved).unwrap();
        assert_eq!(store.load("r1").unwrap(), Some(saved));
    }

    #[test]
    fn test_file_store_keeps_ids_with_separators_inside_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        store.save(&record("../outside/x")).unwrap();

        let files: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(store.list().unwrap(), vec!["../outside/x".to_string()]);
        assert!(store.load("../outside/x").unwrap().is_some());
    }

    #[test]
    fn test_file_store_rejects_empty_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(matches!(store.load(""), Err(StoreError::IllegalId(_))));
    }

    #[test]
    fn test_file_store_upgrades_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("legacy.json"), r#"{ "id": "x" }"#).unwrap();
        let store = FileStateStore::new(dir.path());

        let loaded = store.load("legacy").unwrap().unwrap();
        assert_eq!(loaded.config_hash, "");
        let mut expected = Attributes::new();
        expected.insert("id".to_string(), json!("x"));
        assert_eq!(loaded.observed.as_known(), Some(&expected));
    }

    #[test]
    fn test_file_store_reports_corrupt_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        let store = FileStateStore::new(dir.path());
        assert!(matches!(store.load("bad"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_list_on_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::new(dir.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
    }
}
