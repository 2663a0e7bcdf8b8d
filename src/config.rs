//! Protocol configuration parameters
//!
//! All tunable parameters for the engine. Values can be overridden from a
//! JSON file at startup and are persisted through the byte store when the
//! autosend interval is changed over the wire.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};

/// Store location of the persisted config blob.
pub const CONFIG_NAMESPACE: &str = "oscdev";
pub const CONFIG_KEY: &str = "config";

/// Upper bound on a stored config blob.
const MAX_CONFIG_BLOB: usize = 64;

/// Autosend interval bounds, in milliseconds (inclusive).
pub const AUTOSEND_INTERVAL_MIN_MS: u32 = 1;
pub const AUTOSEND_INTERVAL_MAX_MS: u32 = 5000;

/// Core protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    // --- Autosend ---
    /// Period of the autosend scheduler (1-5000 ms)
    pub autosend_interval_ms: u32,
    /// How long a getter may wait on its peripheral before the tick skips it
    pub getter_timeout_ms: u32,

    // --- Codec limits ---
    /// Maximum bundle nesting depth accepted by the decoder
    pub max_bundle_depth: u8,
    /// Largest bundle element the decoder accepts (bytes)
    pub max_element_len: u32,
    /// Receive buffer size / stream frame limit (bytes)
    pub max_packet_len: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            // Autosend
            autosend_interval_ms: 10,
            getter_timeout_ms: 5,

            // Codec limits
            max_bundle_depth: 32,
            max_element_len: 16 * 1024,
            max_packet_len: 2048,
        }
    }
}

impl ProtocolConfig {
    /// Range-check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(AUTOSEND_INTERVAL_MIN_MS..=AUTOSEND_INTERVAL_MAX_MS)
            .contains(&self.autosend_interval_ms)
        {
            return Err(ConfigError::ValidationFailed(
                "autosend_interval_ms must be 1–5000",
            ));
        }
        if self.getter_timeout_ms == 0 || self.getter_timeout_ms > AUTOSEND_INTERVAL_MAX_MS {
            return Err(ConfigError::ValidationFailed(
                "getter_timeout_ms must be 1–5000",
            ));
        }
        if !(1..=64).contains(&self.max_bundle_depth) {
            return Err(ConfigError::ValidationFailed(
                "max_bundle_depth must be 1–64",
            ));
        }
        if !(16..=1024 * 1024).contains(&self.max_element_len) {
            return Err(ConfigError::ValidationFailed(
                "max_element_len must be 16–1048576",
            ));
        }
        if !(64..=64 * 1024).contains(&self.max_packet_len) {
            return Err(ConfigError::ValidationFailed(
                "max_packet_len must be 64–65536",
            ));
        }
        Ok(())
    }

    /// Parse a JSON config document; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(text).map_err(|_| ConfigError::Corrupted)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay settings changed at runtime and persisted in `store`.
    ///
    /// Only the autosend interval is writable over the wire, so only it is
    /// taken from the store; the codec limits stay as configured. A
    /// corrupt stored blob is ignored.
    #[must_use]
    pub fn with_persisted<S: StoragePort + ?Sized>(mut self, store: &S) -> Self {
        if !store.exists(CONFIG_NAMESPACE, CONFIG_KEY) {
            return self;
        }
        match store.load_config() {
            Ok(stored) => {
                info!(
                    "Store: persisted autosend interval {} ms",
                    stored.autosend_interval_ms
                );
                self.autosend_interval_ms = stored.autosend_interval_ms;
            }
            Err(e) => warn!("Store: ignoring persisted config: {}", e),
        }
        self
    }
}

// Every byte store can hold the config blob.
impl<S: StoragePort + ?Sized> ConfigPort for S {
    fn load_config(&self) -> Result<ProtocolConfig, ConfigError> {
        let mut buf = [0u8; MAX_CONFIG_BLOB];
        match self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf) {
            Ok(len) => {
                let cfg: ProtocolConfig =
                    postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
                cfg.validate()?;
                info!("Store: loaded config ({} bytes)", len);
                Ok(cfg)
            }
            Err(StorageError::NotFound) => {
                info!("Store: no stored config, using defaults");
                Ok(ProtocolConfig::default())
            }
            Err(e) => {
                warn!("Store: config read failed: {}", e);
                Err(ConfigError::IoError)
            }
        }
    }

    fn save_config(&mut self, config: &ProtocolConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.write(CONFIG_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|_| ConfigError::IoError)?;
        info!("Store: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}
