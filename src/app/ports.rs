//! Port traits — the boundary between protocol logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Dispatcher / Autosender
//! ```
//!
//! Driven adapters (byte stores) implement these traits. The engine
//! consumes them through `dyn` handles, so the protocol core never touches
//! a filesystem or flash page directly.
//!
//! Peripheral drivers are not ports: they are plain handler and getter
//! closures registered in the address tree.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::ProtocolConfig;

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: engine ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists protocol configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid ranges are rejected with [`ConfigError::ValidationFailed`],
/// not silently clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// Returns [`ProtocolConfig::default()`] if no stored config exists.
    fn load_config(&self) -> Result<ProtocolConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save_config(&mut self, config: &ProtocolConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: engine ↔ flash / file)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for subscription masks and config.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic: no partial writes on power loss
///   or process exit.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Store handle shared between the inbound path and the autosender.
/// Every access is one short critical section.
pub type SharedStore = Arc<Mutex<dyn StoragePort + Send>>;

/// Wrap a store for sharing.
pub fn share_store<S: StoragePort + Send + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Lock the shared store. A panic elsewhere while holding the lock does
/// not invalidate the store, whose writes are atomic per call.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, dyn StoragePort + Send + 'static> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<ConfigError> for crate::Error {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Corrupted => Self::Config("stored config corrupted"),
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::IoError => Self::Store(StorageError::IoError),
        }
    }
}
