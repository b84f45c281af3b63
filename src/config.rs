//! Engine configuration
//!
//! Limits for event definitions and sizing for log channels. Every key is
//! optional; missing keys take the defaults below.
//!
//! # Example TOML
//! ```toml
//! max_fields = 16
//! string_capacity_ceiling = 128
//!
//! [channel]
//! capacity = 8192
//! overflow = "discard"
//! max_nesting = 4
//! ```

use crate::types::STR_VAR_LEN_MAX;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Default limit on fields per event
pub const SYNTH_FIELDS_MAX: usize = 32;

/// What a full channel does with a new record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Evict the oldest committed record (flight-recorder mode)
    #[default]
    Overwrite,
    /// Drop the new record and count it
    Discard,
}

/// Log channel sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Maximum number of committed records held
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// Maximum simultaneously open writes per thread on one channel
    pub max_nesting: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            overflow: OverflowPolicy::Overwrite,
            max_nesting: 4,
        }
    }
}

impl ChannelConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_max_nesting(mut self, max_nesting: u32) -> Self {
        self.max_nesting = max_nesting;
        self
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum fields per event
    pub max_fields: usize,
    /// Largest accepted `char[N]` capacity (never above 256)
    pub string_capacity_ceiling: usize,
    pub channel: ChannelConfig,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            max_fields: SYNTH_FIELDS_MAX,
            string_capacity_ceiling: STR_VAR_LEN_MAX,
            channel: ChannelConfig::default(),
        }
    }
}

impl TraceConfig {
    /// Load and validate a configuration file
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read config file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_fields == 0 {
            bail!("max_fields must be > 0");
        }
        if self.string_capacity_ceiling == 0 || self.string_capacity_ceiling > STR_VAR_LEN_MAX {
            bail!(
                "string_capacity_ceiling must be in 1..={}, got {}",
                STR_VAR_LEN_MAX,
                self.string_capacity_ceiling
            );
        }
        if self.channel.capacity == 0 {
            bail!("channel.capacity must be > 0");
        }
        if self.channel.max_nesting == 0 || self.channel.max_nesting > u8::MAX as u32 {
            bail!("channel.max_nesting must be in 1..=255");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = TraceConfig::default();
        assert_eq!(config.max_fields, 32);
        assert_eq!(config.string_capacity_ceiling, 256);
        assert_eq!(config.channel.overflow, OverflowPolicy::Overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = TraceConfig::from_toml_str("max_fields = 8\n[channel]\noverflow = \"discard\"\n")
            .unwrap();
        assert_eq!(config.max_fields, 8);
        assert_eq!(config.channel.overflow, OverflowPolicy::Discard);
        assert_eq!(config.channel.capacity, 4096);
    }

    #[test]
    fn test_from_toml_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "string_capacity_ceiling = 64\n\n[channel]\ncapacity = 16")?;
        file.flush()?;

        let config = TraceConfig::from_toml(file.path())?;
        assert_eq!(config.string_capacity_ceiling, 64);
        assert_eq!(config.channel.capacity, 16);
        Ok(())
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(TraceConfig::from_toml_str("max_fields = 0").is_err());
        assert!(TraceConfig::from_toml_str("string_capacity_ceiling = 1024").is_err());
        assert!(TraceConfig::from_toml_str("[channel]\ncapacity = 0").is_err());
        assert!(TraceConfig::from_toml_str("[channel]\noverflow = \"block\"").is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = TraceConfig::from_toml("/nonexistent/synthtrace.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
