//! Byte-store adapters.
//!
//! Implement [`StoragePort`] (and through it [`ConfigPort`]) for the
//! engine.
//!
//! - [`MemoryStore`]: HashMap backend for tests and ephemeral runs.
//! - [`FileStore`]: a JSON document on disk. Every write rewrites the
//!   document to a temporary file and renames it over the original, so
//!   each call is atomic.
//!
//! [`ConfigPort`]: crate::app::ports::ConfigPort

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

fn composite_key(namespace: &str, key: &str) -> String {
    format!("{}::{}", namespace, key)
}

fn copy_out(data: &[u8], buf: &mut [u8]) -> usize {
    let len = data.len().min(buf.len());
    buf[..len].copy_from_slice(&data[..len]);
    len
}

// ── In-memory backend ──────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    store: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        info!("Store: memory backend");
        Self::default()
    }

    /// Number of stored keys across all namespaces.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl StoragePort for MemoryStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.get(&composite_key(namespace, key)) {
            Some(data) => Ok(copy_out(data, buf)),
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store.insert(composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&composite_key(namespace, key));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&composite_key(namespace, key))
    }
}

// ── File backend ───────────────────────────────────────────────

/// JSON-file byte store. The whole map is cached in memory and flushed on
/// every mutation.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, Vec<u8>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file is an empty store. An unreadable or corrupt file is
    /// reported so the caller can decide whether to start empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                warn!("Store: {} is corrupt: {}", path.display(), e);
                StorageError::IoError
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Store: cannot read {}: {}", path.display(), e);
                return Err(StorageError::IoError);
            }
        };
        info!(
            "Store: file backend {} ({} keys)",
            path.display(),
            entries.len()
        );
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), StorageError> {
        let json = serde_json::to_vec_pretty(&self.entries).map_err(|_| StorageError::IoError)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &json)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| {
                warn!("Store: write {} failed: {}", self.path.display(), e);
                match e.kind() {
                    io::ErrorKind::StorageFull => StorageError::Full,
                    _ => StorageError::IoError,
                }
            })
    }
}

impl StoragePort for FileStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.entries.get(&composite_key(namespace, key)) {
            Some(data) => Ok(copy_out(data, buf)),
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let composite = composite_key(namespace, key);
        let previous = self.entries.insert(composite.clone(), data.to_vec());
        if let Err(e) = self.flush() {
            // Keep the cache consistent with what is on disk.
            match previous {
                Some(old) => self.entries.insert(composite, old),
                None => self.entries.remove(&composite),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        if self.entries.remove(&composite_key(namespace, key)).is_some() {
            self.flush()?;
        }
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.entries.contains_key(&composite_key(namespace, key))
    }
}
