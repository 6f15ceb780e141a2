//! Configuration types

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a synchronized cache.
///
/// Can be built in code with the `with_*` setters, parsed from TOML, and
/// overridden from `SUPERSTORE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Apply pending change notifications before every cache operation.
    pub drain_on_access: bool,
    /// Run memory-only when the store rejects the startup probe for quota.
    pub memory_fallback: bool,
    /// Key written and removed once at construction to probe the store.
    pub probe_key: String,
    /// Buffered notifications per subscriber before it lags.
    pub feed_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drain_on_access: true,
            memory_fallback: false,
            probe_key: "__superstore_probe__".to_string(),
            feed_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drain_on_access(mut self, enabled: bool) -> Self {
        self.drain_on_access = enabled;
        self
    }

    pub fn with_memory_fallback(mut self, enabled: bool) -> Self {
        self.memory_fallback = enabled;
        self
    }

    pub fn with_probe_key(mut self, key: impl Into<String>) -> Self {
        self.probe_key = key.into();
        self
    }

    pub fn with_feed_capacity(mut self, capacity: usize) -> Self {
        self.feed_capacity = capacity;
        self
    }

    /// Parse a config from TOML. Missing fields take their defaults.
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SUPERSTORE_*` environment overrides on top of this config.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SUPERSTORE_DRAIN_ON_ACCESS") {
            self.drain_on_access = parse_flag("drain_on_access", &raw)?;
        }
        if let Some(raw) = lookup("SUPERSTORE_MEMORY_FALLBACK") {
            self.memory_fallback = parse_flag("memory_fallback", &raw)?;
        }
        if let Some(raw) = lookup("SUPERSTORE_PROBE_KEY") {
            self.probe_key = raw;
        }
        if let Some(raw) = lookup("SUPERSTORE_FEED_CAPACITY") {
            self.feed_capacity = raw.parse().map_err(|_| ConfigError::InvalidValue {
                field: "feed_capacity".to_string(),
                value: raw.clone(),
                reason: "must be an unsigned integer".to_string(),
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check invariants the cache relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_key.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "probe_key".to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.feed_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "feed_capacity".to_string(),
                value: "0".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_flag(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
