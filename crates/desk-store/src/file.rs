//! File-backed store.
//!
//! The whole store is one JSON object (`{"key": "value", ...}`) on disk.
//! Each write goes to its own temporary file in the same directory which is
//! then renamed over the store file, so a reader never sees a
//! partially-written store.
//!
//! Every read-modify-write (`set`, `remove`, `update`) holds an exclusive OS
//! advisory lock on a sibling `<name>.lock` file. The lock is taken per
//! operation through a fresh descriptor, so it serializes handles in one
//! process and separate processes alike: [`PersistentStore::update`] is
//! atomic for every `FileStore` opened on the same path.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fd_lock::RwLock;
use tempfile::NamedTempFile;

use crate::{PersistentStore, StoreError};

/// Store persisted as a single JSON object file.
pub struct FileStore {
    path: PathBuf,
    dir: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// The parent directory is created if needed; the store file itself is
    /// only created on the first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let lock_path = sibling(&path, ".lock");
        tracing::debug!(path = %path.display(), "[store] opened file store");
        Ok(Self {
            path,
            dir,
            lock_path,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` while holding the exclusive lock on the sibling lock file.
    fn exclusive<T>(&self, op: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        let mut lock = RwLock::new(file);
        let _held = lock.write()?;
        op()
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(BTreeMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Corrupt(format!("{}: {}", self.path.display(), e))
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_data()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

impl PersistentStore for FileStore {
    // Reads need no lock: the store file is only ever replaced by rename.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.exclusive(|| {
            let mut entries = self.read_all()?;
            entries.insert(key.to_string(), value.to_string());
            self.write_all(&entries)
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.exclusive(|| {
            let mut entries = self.read_all()?;
            if entries.remove(key).is_some() {
                self.write_all(&entries)?;
            }
            Ok(())
        })
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.read_all()?.into_keys().collect())
    }

    fn update(
        &self,
        key: &str,
        f: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<bool, StoreError> {
        self.exclusive(|| {
            let mut entries = self.read_all()?;
            match f(entries.get(key).map(String::as_str)) {
                Some(value) => {
                    entries.insert(key.to_string(), value);
                    self.write_all(&entries)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }
}
