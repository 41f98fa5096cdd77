//! Lake configuration
//!
//! Loaded from a JSON file where every key is optional; missing keys keep
//! their defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default age (days) after which the background sweeper archives entries
pub const DEFAULT_ARCHIVE_AFTER_DAYS: u32 = 30;

/// Default sweeper period (1 hour)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default bound of the ingest dedup registry
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

/// Data lake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LakeConfig {
    /// Lake root; `raw/`, `processed/`, `archive/` and `metadata/` live below it
    pub data_dir: PathBuf,
    /// Age threshold for the background sweeper
    pub archive_after_days: u32,
    /// Background sweeper period in seconds
    pub sweep_interval_secs: u64,
    /// Maximum number of source paths remembered by the dedup registry
    pub dedup_capacity: usize,
}

impl Default for LakeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            archive_after_days: DEFAULT_ARCHIVE_AFTER_DAYS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl LakeConfig {
    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Sweeper period as a [`Duration`]
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Check values that serde cannot reject on its own
    ///
    /// # Errors
    /// Returns [`Error::Config`] on a zero sweep interval or dedup capacity
    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == 0 {
            return Err(Error::Config("sweep_interval_secs must be positive".to_string()));
        }
        if self.dedup_capacity == 0 {
            return Err(Error::Config("dedup_capacity must be positive".to_string()));
        }
        Ok(())
    }
}
