//! Sync configuration
//!
//! Loaded from `~/.liftplan/config.toml`. Every key is optional:
//! ```toml
//! base_delay_ms = 5000
//! editing_backoff_factor = 2
//! editing_grace_ms = 1500
//! backup_enabled = true
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::sync::{
    BASE_SAVE_DELAY, EDITING_BACKOFF_FACTOR, EDITING_GRACE, MAX_BACKOFF_FACTOR, MAX_SAVE_DELAY,
};
use crate::paths;

/// Runtime knobs for the save scheduler and backups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Debounce delay for background saves
    pub base_delay_ms: u64,
    /// Delay multiplier while rows are being edited
    pub editing_backoff_factor: u32,
    /// Grace period after an editing session ends
    pub editing_grace_ms: u64,
    /// Mirror edits into the local crash-recovery store
    pub backup_enabled: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: BASE_SAVE_DELAY.as_millis() as u64,
            editing_backoff_factor: EDITING_BACKOFF_FACTOR,
            editing_grace_ms: EDITING_GRACE.as_millis() as u64,
            backup_enabled: true,
        }
    }
}

impl SyncConfig {
    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self> {
        Self::load_from_path(&paths::config_path())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: SyncConfig = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config.normalized())
    }

    /// Clamp values into the range the scheduler can handle
    ///
    /// Zero delays would make the worker spin; huge ones overflow `Instant`.
    pub fn normalized(self) -> Self {
        let max_ms = MAX_SAVE_DELAY.as_millis() as u64;
        Self {
            base_delay_ms: self.base_delay_ms.clamp(1, max_ms),
            editing_backoff_factor: self.editing_backoff_factor.clamp(1, MAX_BACKOFF_FACTOR),
            editing_grace_ms: self.editing_grace_ms.min(max_ms),
            ..self
        }
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn editing_grace(&self) -> Duration {
        Duration::from_millis(self.editing_grace_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = SyncConfig::load_from_path(&temp.path().join("none.toml")).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.base_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_partial_file_overrides_and_normalizes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "base_delay_ms = 0\nbackup_enabled = false\n").unwrap();

        let config = SyncConfig::load_from_path(&path).unwrap();
        assert_eq!(config.base_delay_ms, 1);
        assert!(!config.backup_enabled);
        assert_eq!(config.editing_backoff_factor, 2);
    }

    #[test]
    fn test_oversized_values_are_capped() {
        let config = SyncConfig {
            base_delay_ms: u64::MAX,
            editing_backoff_factor: u32::MAX,
            editing_grace_ms: u64::MAX,
            backup_enabled: true,
        }
        .normalized();
        assert_eq!(config.base_delay(), MAX_SAVE_DELAY);
        assert_eq!(config.editing_backoff_factor, MAX_BACKOFF_FACTOR);
        assert_eq!(config.editing_grace(), MAX_SAVE_DELAY);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "base_delay_ms = \"soon\"").unwrap();
        assert!(SyncConfig::load_from_path(&path).is_err());
    }
}
