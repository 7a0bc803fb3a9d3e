use serde::{Deserialize, Serialize};
use std::{fs, path::Path, path::PathBuf};
use tabletop_core::DEFAULT_TICKS_PER_SECOND;
use tabletop_scripting::WaitConfig;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config/tabletop.toml";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Host simulation rate used by the fixed-step clock.
    pub ticks_per_second: u32,
    /// Hard stop for runs whose script leaves repeating tasks behind.
    pub max_ticks: u64,
    /// JSONL file receiving one record per scheduler event.
    pub event_log: Option<PathBuf>,
    /// Scheduler tunables (`[wait]` table).
    pub wait: WaitConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            ticks_per_second: DEFAULT_TICKS_PER_SECOND,
            // One hour of simulated time at the default rate.
            max_ticks: 72_000,
            event_log: None,
            wait: WaitConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Load configuration from an explicit path, falling back to defaults on errors.
    pub fn load_from_path(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<DriverConfig>(&contents) {
                Ok(cfg) => cfg,
                Err(err) => {
                    warn!("Failed to parse {}: {err}. Using defaults", path.display());
                    DriverConfig::default()
                }
            },
            Err(err) => {
                if path != Path::new(DEFAULT_CONFIG_PATH)
                    || err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!("Failed to read {}: {err}. Using defaults", path.display());
                }
                DriverConfig::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_wait_table() {
        let cfg: DriverConfig = toml::from_str(
            r#"
            ticks_per_second = 60
            event_log = "target/events.jsonl"

            [wait]
            max_tick_seconds = 0.1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.ticks_per_second, 60);
        assert_eq!(cfg.max_ticks, 72_000);
        assert_eq!(cfg.event_log, Some(PathBuf::from("target/events.jsonl")));
        assert_eq!(cfg.wait.max_tick_seconds, Some(0.1));
        assert_eq!(cfg.wait.fault_history, 32);
    }

    #[test]
    fn malformed_file_uses_defaults() {
        let path = std::env::temp_dir().join(format!("tabletop-bad-{}.toml", std::process::id()));
        fs::write(&path, "ticks_per_second = \"fast\"").unwrap();
        assert_eq!(DriverConfig::load_from_path(&path), DriverConfig::default());
        let _ = fs::remove_file(&path);
    }
}
