//! Versioned record storage for work days.
//!
//! A save carries the record's version. Anything at or below the stored
//! version is acknowledged without writing, so a retried save can never apply
//! the same local transition twice.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::config::project_dirs;

pub const STATE_FILE: &str = "state.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not determine data directory")]
    NoDataDir,
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Something the repository can key and order by version.
pub trait Record: Clone + Serialize + DeserializeOwned {
    fn record_id(&self) -> String;
    fn version(&self) -> u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Written,
    /// The stored copy is already at this version or newer.
    AlreadyCurrent,
}

pub trait Repository<T: Record>: Send {
    fn get(&self, id: &str) -> Result<Option<T>>;
    fn save(&mut self, record: &T) -> Result<SaveOutcome>;
    /// All records ordered by id.
    fn list(&self) -> Result<Vec<T>>;
}

fn is_stale<T: Record>(stored: Option<&T>, incoming: &T) -> bool {
    stored.is_some_and(|current| current.version() >= incoming.version())
}

#[derive(Debug, Default)]
pub struct MemoryRepository<T> {
    records: HashMap<String, T>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<T: Record + Send> Repository<T> for MemoryRepository<T> {
    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.get(id).cloned())
    }

    fn save(&mut self, record: &T) -> Result<SaveOutcome> {
        let id = record.record_id();
        if is_stale(self.records.get(&id), record) {
            return Ok(SaveOutcome::AlreadyCurrent);
        }
        self.records.insert(id, record.clone());
        Ok(SaveOutcome::Written)
    }

    fn list(&self) -> Result<Vec<T>> {
        let mut records: Vec<T> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.record_id());
        Ok(records)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(bound = "T: Record")]
struct StoreFile<T> {
    version: u32,
    #[serde(default)]
    records: BTreeMap<String, T>,
}

/// Whole store in one JSON file, rewritten atomically on every write.
pub struct JsonFileRepository<T> {
    path: PathBuf,
    records: BTreeMap<String, T>,
}

impl<T: Record> JsonFileRepository<T> {
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PersistenceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let records = if path.exists() {
            let json = fs::read_to_string(&path).map_err(|source| PersistenceError::Io {
                path: path.clone(),
                source,
            })?;
            let file: StoreFile<T> = serde_json::from_str(&json)?;
            file.records
        } else {
            BTreeMap::new()
        };
        debug!(path = ?path, records = records.len(), "opened record store");
        Ok(Self { path, records })
    }

    /// Opens `state.json` in the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dirs = project_dirs().ok_or(PersistenceError::NoDataDir)?;
        Self::open(dirs.data_dir().join(STATE_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self) -> Result<()> {
        let file = StoreFile {
            version: FORMAT_VERSION,
            records: self.records.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| PersistenceError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

impl<T: Record + Send> Repository<T> for JsonFileRepository<T> {
    fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.records.get(id).cloned())
    }

    fn save(&mut self, record: &T) -> Result<SaveOutcome> {
        let id = record.record_id();
        if is_stale(self.records.get(&id), record) {
            return Ok(SaveOutcome::AlreadyCurrent);
        }
        let previous = self.records.insert(id.clone(), record.clone());
        if let Err(err) = self.write_file() {
            // Keep memory in step with disk so the save can be retried.
            match previous {
                Some(previous) => self.records.insert(id, previous),
                None => self.records.remove(&id),
            };
            return Err(err);
        }
        debug!(id = %id, version = record.version(), "record written");
        Ok(SaveOutcome::Written)
    }

    fn list(&self) -> Result<Vec<T>> {
        Ok(self.records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        version: u64,
        body: String,
    }

    impl Record for Note {
        fn record_id(&self) -> String {
            self.id.clone()
        }

        fn version(&self) -> u64 {
            self.version
        }
    }

    fn note(id: &str, version: u64, body: &str) -> Note {
        Note {
            id: id.to_string(),
            version,
            body: body.to_string(),
        }
    }

    fn exercise<R: Repository<Note>>(repo: &mut R) {
        assert_eq!(repo.get("a").unwrap(), None);
        assert_eq!(repo.save(&note("a", 1, "first")).unwrap(), SaveOutcome::Written);
        // A retried save of the same version is acknowledged but not applied.
        assert_eq!(
            repo.save(&note("a", 1, "first")).unwrap(),
            SaveOutcome::AlreadyCurrent
        );
        assert_eq!(repo.save(&note("a", 3, "third")).unwrap(), SaveOutcome::Written);
        assert_eq!(
            repo.save(&note("a", 2, "late")).unwrap(),
            SaveOutcome::AlreadyCurrent
        );
        assert_eq!(repo.get("a").unwrap(), Some(note("a", 3, "third")));

        repo.save(&note("0", 1, "zero")).unwrap();
        let ids: Vec<String> = repo.list().unwrap().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["0".to_string(), "a".to_string()]);
    }

    #[test]
    fn memory_repository_versions() {
        exercise(&mut MemoryRepository::new());
    }

    #[test]
    fn json_repository_versions() {
        let dir = tempfile::tempdir().unwrap();
        let mut repo = JsonFileRepository::open(dir.path().join(STATE_FILE)).unwrap();
        exercise(&mut repo);
    }

    #[test]
    fn json_repository_reopens_written_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(STATE_FILE);
        {
            let mut repo = JsonFileRepository::open(path.clone()).unwrap();
            repo.save(&note("2024-03-04", 7, "monday")).unwrap();
        }
        let repo = JsonFileRepository::<Note>::open(path.clone()).unwrap();
        assert_eq!(
            repo.get("2024-03-04").unwrap(),
            Some(note("2024-03-04", 7, "monday"))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn json_repository_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STATE_FILE);
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            JsonFileRepository::<Note>::open(path),
            Err(PersistenceError::Serialization(_))
        ));
    }
}
