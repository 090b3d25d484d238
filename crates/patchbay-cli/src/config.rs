//! `patchbay.toml` loading

use anyhow::{Context, Result};
use patchbay_bridge::BridgeSettings;
use patchbay_router::RouterConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name looked up in the working directory, then the user config directory
pub const CONFIG_FILE: &str = "patchbay.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub router: RouterConfig,
    pub bridge: BridgeSettings,
    pub logging: LoggingConfig,
    pub monitor: MonitorConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, `--log-level` and `RUST_LOG` take precedence
    pub level: Option<String>,
    pub json: bool,
}

/// Ports opened by `patchbay monitor`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub midi_inputs: Vec<String>,
    pub ableton_inputs: Vec<String>,
    /// OSC listen endpoints, `port` or `host:port`
    pub osc_listen: Vec<String>,
    pub metronome_bpm: Option<f64>,
    pub watch_ports: bool,
}

impl Config {
    /// Load the given file, or the first default location that exists
    ///
    /// Without an explicit path and without a file in any default location,
    /// the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match default_locations().into_iter().find(|p| p.is_file()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config =
            toml::from_str(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        config
            .router
            .validate()
            .with_context(|| format!("Invalid [router] section in {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }
}

fn default_locations() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("patchbay").join(CONFIG_FILE));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.router.pool_size, 100);
        assert_eq!(config.bridge.query_timeout_ms, 2000);
    }

    #[test]
    fn test_sections() {
        let config: Config = toml::from_str(
            r#"
            [router]
            pool_size = 8

            [bridge]
            midi_client_name = "studio"

            [logging]
            level = "patchbay_router=debug"
            json = true

            [monitor]
            midi_inputs = ["Ctrl"]
            osc_listen = ["9000", "127.0.0.1:9001"]
            metronome_bpm = 120.0
            "#,
        )
        .unwrap();

        assert_eq!(config.router.pool_size, 8);
        assert_eq!(config.router.history_size, 200);
        assert_eq!(config.bridge.midi_client_name, "studio");
        assert_eq!(config.bridge.watcher_interval_ms, 1000);
        assert_eq!(
            config.logging.level.as_deref(),
            Some("patchbay_router=debug")
        );
        assert!(config.logging.json);
        assert_eq!(config.monitor.midi_inputs, vec!["Ctrl"]);
        assert_eq!(config.monitor.osc_listen.len(), 2);
        assert_eq!(config.monitor.metronome_bpm, Some(120.0));
        assert!(!config.monitor.watch_ports);
    }

    #[test]
    fn test_invalid_router_section_is_rejected() {
        let path = std::env::temp_dir().join(format!("patchbay-{}.toml", std::process::id()));
        std::fs::write(&path, "[router]\npool_size = 0\n").unwrap();
        let result = Config::from_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/patchbay.toml")));
        assert!(result.is_err());
    }
}
