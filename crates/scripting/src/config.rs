//! Scheduler configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::warn;

/// Tunables for a [`Wait`](crate::Wait) scheduler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Upper bound on the elapsed seconds accepted from a single tick.
    /// Larger deltas (a stalled host, a debugger pause) are clamped to this.
    pub max_tick_seconds: Option<f64>,
    /// Number of recent callback faults retained for inspection.
    pub fault_history: usize,
    /// Log a warning when the number of pending tasks grows past this.
    pub pending_warn_threshold: usize,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            max_tick_seconds: None,
            fault_history: 32,
            pending_warn_threshold: 4096,
        }
    }
}

impl WaitConfig {
    /// Load configuration from `path`, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    WaitConfig::default()
                }
            },
            Err(err) => {
                warn!("Failed to read {}: {err}. Using defaults", path.display());
                WaitConfig::default()
            }
        }
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let cfg: WaitConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check values that deserialize fine but make no sense.
    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_tick_seconds {
            if !max.is_finite() || max <= 0.0 {
                anyhow::bail!("max_tick_seconds must be a positive number (got {max})");
            }
        }
        Ok(())
    }

    /// Save configuration to `path`.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let cfg = WaitConfig::from_toml_str("fault_history = 4").unwrap();
        assert_eq!(cfg.fault_history, 4);
        assert_eq!(cfg.max_tick_seconds, None);
        assert_eq!(cfg.pending_warn_threshold, 4096);
    }

    #[test]
    fn rejects_non_positive_clamp() {
        let err = WaitConfig::from_toml_str("max_tick_seconds = 0.0").unwrap_err();
        assert!(err.to_string().contains("max_tick_seconds"));
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("tabletop_wait_config_missing.toml");
        let _ = fs::remove_file(&path);
        assert_eq!(WaitConfig::load_from_path(&path), WaitConfig::default());
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("tabletop_wait_cfg_{}", std::process::id()));
        let path = dir.join("wait.toml");
        let cfg = WaitConfig {
            max_tick_seconds: Some(0.25),
            fault_history: 8,
            pending_warn_threshold: 16,
        };
        cfg.save_to_path(&path).unwrap();
        assert_eq!(WaitConfig::load_from_path(&path), cfg);
        let _ = fs::remove_dir_all(&dir);
    }
}
