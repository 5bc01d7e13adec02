//! Key-value storage backends for the price cache
//!
//! A `Store` is the persistence port: it hands back a JSON mapping for the
//! requested keys and merges a mapping into storage in a single step. The
//! file-backed store survives restarts; the memory store is used when no cache
//! directory is available and in tests.

use directories::ProjectDirs;
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Name of the JSON document holding every stored key
const STORAGE_FILE: &str = "storage.json";

/// A set of stored values keyed by name
pub type Mapping = Map<String, Value>;

/// Errors raised by a storage backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The stored document could not be encoded or decoded
    #[error("storage document is invalid: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The backend cannot be used at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistent key-value store addressed by fixed string keys
///
/// `set` must be atomic: a concurrent `get` observes either none or all of the
/// values from one `set` call.
pub trait Store: Send + Sync {
    /// Returns the stored values for `keys`; missing keys are simply absent.
    fn get(&self, keys: &[&str]) -> Result<Mapping, StorageError>;

    /// Merges `values` into the store.
    fn set(&self, values: Mapping) -> Result<(), StorageError>;
}

/// Store backed by a single JSON document on disk
///
/// The document lives in an XDG-compliant cache directory
/// (`~/.cache/pricebadge/` on Linux). Writes go to a temporary sibling file
/// that is renamed over the document, so readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Directory where the document is stored
    dir: PathBuf,
    /// Serializes read-merge-write cycles within this process
    write_lock: Arc<Mutex<()>>,
}

impl FileStore {
    /// Creates a store in the XDG cache directory.
    ///
    /// Returns `None` if the cache directory cannot be determined (e.g., no home directory).
    pub fn new() -> Option<Self> {
        let project_dirs = ProjectDirs::from("", "", "pricebadge")?;
        Some(Self::with_dir(project_dirs.cache_dir().to_path_buf()))
    }

    /// Creates a store rooted at a custom directory
    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Directory holding the storage document
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn document_path(&self) -> PathBuf {
        self.dir.join(STORAGE_FILE)
    }

    fn load(&self) -> Result<Mapping, StorageError> {
        match fs::read_to_string(self.document_path()) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Mapping::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Store for FileStore {
    fn get(&self, keys: &[&str]) -> Result<Mapping, StorageError> {
        let mut document = self.load()?;
        Ok(keys
            .iter()
            .filter_map(|key| document.remove(*key).map(|value| (key.to_string(), value)))
            .collect())
    }

    fn set(&self, values: Mapping) -> Result<(), StorageError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StorageError::Unavailable("file store lock poisoned".to_string()))?;

        fs::create_dir_all(&self.dir)?;

        // An unreadable document is replaced rather than blocking every future write
        let mut document = self.load().unwrap_or_default();
        document.extend(values);

        let json = serde_json::to_string_pretty(&document)?;
        let tmp_path = self.dir.join(format!("{}.tmp", STORAGE_FILE));
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, self.document_path())?;
        Ok(())
    }
}

/// In-process store; contents are lost when the process exits
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<Mutex<Mapping>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, keys: &[&str]) -> Result<Mapping, StorageError> {
        let values = self
            .values
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    fn set(&self, new_values: Mapping) -> Result<(), StorageError> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| StorageError::Unavailable("memory store lock poisoned".to_string()))?;
        values.extend(new_values);
        Ok(())
    }
}
