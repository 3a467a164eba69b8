//! Engine configuration.
//!
//! Configuration is an explicit value handed to [`ContentEngine::new`]
//! (and from there to every open file), never process-wide state.
//!
//! [`ContentEngine::new`]: crate::engine::ContentEngine::new

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::CipherBackend;

/// Default number of blocks a write must span before blocks are encrypted
/// in parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 32;

/// Errors raised while loading a configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON or has unknown fields
    #[error("Invalid configuration document: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds an unusable value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Configuration options for the content engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// AES-GCM implementation used for block encryption.
    ///
    /// Both backends share one on-disk format. Default: `rust_crypto`.
    pub cipher: CipherBackend,

    /// Reserve backing storage for a write's ciphertext range before
    /// storing any block, so a full disk fails the write up front instead
    /// of midway through it. Default: true.
    pub preallocate: bool,

    /// Writes spanning at least this many blocks encrypt them on the rayon
    /// thread pool. Default: 32.
    pub parallel_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cipher: CipherBackend::default(),
            preallocate: true,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    ///
    /// Missing fields take their defaults; unknown fields are rejected.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parallel_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "parallel_threshold",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Sets the cipher backend.
    #[must_use]
    pub fn cipher(mut self, cipher: CipherBackend) -> Self {
        self.cipher = cipher;
        self
    }

    /// Enables or disables storage reservation before writes.
    #[must_use]
    pub fn preallocate(mut self, enabled: bool) -> Self {
        self.preallocate = enabled;
        self
    }

    /// Sets the block count at which writes encrypt in parallel.
    #[must_use]
    pub fn parallel_threshold(mut self, blocks: usize) -> Self {
        self.parallel_threshold = blocks;
        self
    }
}
