// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Engine configuration and its storage port.
//!
//! [`EngineConfig`] is plain serde data. Every field has a default, so a
//! partial (or empty) JSON object yields a usable configuration. Stored
//! configurations are reached through the [`ConfigStore`] port; the
//! [`ConfigService`] layers JSON encoding on top.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How strict replay chooses between a satisfied expectation that matches
/// and a later unsatisfied one that also matches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrictAdvancePolicy {
    /// Keep consuming the current expectation until it reaches its maximum.
    #[default]
    StayOnCurrent,
    /// Advance to a later matching expectation that is still below its
    /// minimum, when only satisfied expectations lie in between.
    PreferUnsatisfied,
}

/// Strictness of expectations recorded without an explicit choice.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Ordered, exactly-as-recorded expectations.
    #[default]
    Strict,
    /// Unordered expectations matched by predicate.
    NonStrict,
}

/// Tunables of an [`Execution`](crate::Execution).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Strict replay advancement policy.
    pub strict_advance: StrictAdvancePolicy,
    /// Whether unstubbed reference-returning methods yield cascaded mocks.
    pub cascading: bool,
    /// Strictness of [`Execution::record`](crate::Execution::record) blocks.
    pub default_strictness: Strictness,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_advance: StrictAdvancePolicy::StayOnCurrent,
            cascading: true,
            default_strictness: Strictness::Strict,
        }
    }
}

impl EngineConfig {
    /// Decodes a configuration from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the configuration as pretty JSON.
    pub fn to_json(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Sets the strict advancement policy.
    #[must_use]
    pub fn with_strict_advance(mut self, policy: StrictAdvancePolicy) -> Self {
        self.strict_advance = policy;
        self
    }

    /// Enables or disables cascading.
    #[must_use]
    pub fn with_cascading(mut self, cascading: bool) -> Self {
        self.cascading = cascading;
        self
    }

    /// Sets the default strictness.
    #[must_use]
    pub fn with_default_strictness(mut self, strictness: Strictness) -> Self {
        self.default_strictness = strictness;
        self
    }
}

/// Storage port for raw configuration blobs, keyed by logical name.
pub trait ConfigStore {
    /// Loads a raw blob. Returns [`ConfigError::NotFound`] when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persists a raw blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Key not present in the store.
    #[error("not found")]
    NotFound,
    /// I/O failure in the backing store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encoding or decoding failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all for store-specific failures.
    #[error("other: {0}")]
    Other(String),
}

/// Loads and saves [`EngineConfig`] through a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
    key: String,
}

impl<S> ConfigService<S> {
    /// Key used when none is given.
    pub const DEFAULT_KEY: &'static str = "echo-mock";

    /// Creates a service storing under [`Self::DEFAULT_KEY`].
    pub fn new(store: S) -> Self {
        Self::with_key(store, Self::DEFAULT_KEY)
    }

    /// Creates a service storing under `key`.
    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// The key this service reads and writes.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consumes the service and returns the store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Loads the stored configuration, falling back to defaults when the
    /// key is missing or empty.
    pub fn load(&self) -> Result<EngineConfig, ConfigError> {
        match self.store.load_raw(&self.key) {
            Ok(bytes) if bytes.is_empty() => Ok(EngineConfig::default()),
            Ok(bytes) => EngineConfig::from_json(&bytes),
            Err(ConfigError::NotFound) => Ok(EngineConfig::default()),
            Err(e) => Err(e),
        }
    }

    /// Persists `config`.
    pub fn save(&self, config: &EngineConfig) -> Result<(), ConfigError> {
        let data = config.to_json()?;
        self.store.save_raw(&self.key, &data)
    }
}
