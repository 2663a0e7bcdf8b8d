//! Mock byte stores for integration tests.
//!
//! Record every write so tests can assert on persistence traffic, and
//! inject failures without touching the filesystem.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use oscdev::app::ports::{StorageError, StoragePort};

// ── Recording store ───────────────────────────────────────────

/// In-memory store that keeps a log of `(namespace, key, bytes)` writes.
/// Clones share the same contents.
#[derive(Clone, Default)]
pub struct RecordingStore {
    entries: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
    pub writes: Arc<Mutex<Vec<(String, String, Vec<u8>)>>>,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .unwrap()
            .get(&(namespace.to_owned(), key.to_owned()))
            .cloned()
    }

    pub fn put(&self, namespace: &str, key: &str, data: &[u8]) {
        self.entries
            .lock()
            .unwrap()
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
    }

    pub fn write_count(&self, namespace: &str) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(ns, _, _)| ns == namespace)
            .count()
    }
}

impl StoragePort for RecordingStore {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self.get(namespace, key).ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.put(namespace, key, data);
        self.writes
            .lock()
            .unwrap()
            .push((namespace.to_owned(), key.to_owned(), data.to_vec()));
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.entries
            .lock()
            .unwrap()
            .remove(&(namespace.to_owned(), key.to_owned()));
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.get(namespace, key).is_some()
    }
}

// ── Failing store ─────────────────────────────────────────────

/// Every operation fails with `IoError`.
pub struct BrokenStore;

impl StoragePort for BrokenStore {
    fn read(&self, _namespace: &str, _key: &str, _buf: &mut [u8]) -> Result<usize, StorageError> {
        Err(StorageError::IoError)
    }

    fn write(&mut self, _namespace: &str, _key: &str, _data: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::IoError)
    }

    fn delete(&mut self, _namespace: &str, _key: &str) -> Result<(), StorageError> {
        Err(StorageError::IoError)
    }

    fn exists(&self, _namespace: &str, _key: &str) -> bool {
        false
    }
}
