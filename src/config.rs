//! Engine tuning knobs.
//!
//! Loaded from TOML, then overridden from `FLOWSIG_*` environment variables:
//!
//! ```toml
//! prefetch = 64
//! buffer_capacity = 256
//! overflow = "drop_oldest"
//! timeout_ms = 5000
//! ```

use crate::error::ConfigError;
use crate::streaming::channel::{OverflowStrategy, DEFAULT_BUFFER_CAPACITY, DEFAULT_PREFETCH};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Configuration shared by processors, emitters and the stream bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    /// Items requested upstream per batch
    pub prefetch: usize,

    /// Capacity of per-subscriber buffers
    pub buffer_capacity: usize,

    /// What a full buffer does with the next item
    pub overflow: OverflowStrategy,

    /// Default timeout for timeout processors, if any
    pub timeout_ms: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_PREFETCH,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            overflow: OverflowStrategy::default(),
            timeout_ms: None,
        }
    }
}

impl FlowConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: FlowConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let mut config: FlowConfig = toml::from_str(&text)?;
        config.apply_env()?;
        config.validate()?;
        tracing::debug!("Loaded flow config from {}: {:?}", path.display(), config);
        Ok(config)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("FLOWSIG_PREFETCH") {
            self.prefetch = parse_num("FLOWSIG_PREFETCH", &v)?;
        }
        if let Some(v) = env_var("FLOWSIG_BUFFER_CAPACITY") {
            self.buffer_capacity = parse_num("FLOWSIG_BUFFER_CAPACITY", &v)?;
        }
        if let Some(v) = env_var("FLOWSIG_OVERFLOW") {
            self.overflow = OverflowStrategy::from_name(&v).ok_or_else(|| {
                ConfigError::Invalid(format!("FLOWSIG_OVERFLOW: unknown strategy '{}'", v))
            })?;
        }
        if let Some(v) = env_var("FLOWSIG_TIMEOUT_MS") {
            self.timeout_ms = Some(parse_num("FLOWSIG_TIMEOUT_MS", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.prefetch == 0 {
            return Err(ConfigError::Invalid("prefetch must be > 0".to_string()));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be > 0".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Replenish threshold for `prefetch`: request more after this many items.
    pub fn replenish_limit(&self) -> usize {
        replenish_limit(self.prefetch)
    }
}

pub(crate) fn replenish_limit(prefetch: usize) -> usize {
    (prefetch - (prefetch >> 2)).max(1)
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_num<N: std::str::FromStr>(key: &str, value: &str) -> Result<N, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{}: not a number: '{}'", key, value)))
}
