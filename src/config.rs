//! Persistent scope configuration
//!
//! Loaded from a JSON file next to the binary (or the path given on the
//! command line). Network bootstrap keys such as `ssid` or `host` may be
//! present in the same file; they belong to the network layer and are
//! ignored here.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file used when none is given
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Environment variable overriding the config path
pub const CONFIG_ENV_VAR: &str = "LASERSCOPE_CONFIG";

fn default_name() -> String {
    "laserscope".to_string()
}

fn default_buffer_size() -> usize {
    laserscope_core::DEFAULT_BUFFER_SIZE
}

fn default_port() -> u16 {
    80
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_observer_queue() -> usize {
    4
}

/// Persistent application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Laser display name reported by `/status`
    #[serde(default = "default_name")]
    pub name: String,
    /// Startup resolution in ms (0 = built-in default)
    #[serde(default)]
    pub default_resolution: f64,
    /// Startup packet duration in ms (0 = built-in default)
    #[serde(default)]
    pub default_duration: f64,
    /// Maximum samples per packet
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// HTTP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Packets queued per observer before it starts missing packets
    #[serde(default = "default_observer_queue")]
    pub observer_queue: usize,
    /// Period of the simulated trigger line in ms (absent = no trigger)
    #[serde(default)]
    pub simulated_trigger_period_ms: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            default_resolution: 0.0,
            default_duration: 0.0,
            buffer_size: default_buffer_size(),
            port: default_port(),
            bind_addr: default_bind_addr(),
            observer_queue: default_observer_queue(),
            simulated_trigger_period_ms: None,
        }
    }
}

/// Zero, NaN or infinite config values fall back to the default
fn or_default(value: f64, default: f64) -> f64 {
    if value.is_finite() && value != 0.0 {
        value
    } else {
        default
    }
}

impl AppConfig {
    /// Config path from the environment, or the default
    pub fn path() -> PathBuf {
        std::env::var_os(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load config from disk, falling back to defaults on any error
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded config from disk");
                    config
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Invalid configuration file, using defaults"
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Unable to access configuration file, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Startup resolution in ms with the zero-means-default rule applied
    pub fn resolution_ms(&self) -> f64 {
        or_default(self.default_resolution, laserscope_core::DEFAULT_RESOLUTION_MS)
    }

    /// Startup duration in ms with the zero-means-default rule applied
    pub fn duration_ms(&self) -> f64 {
        or_default(self.default_duration, laserscope_core::DEFAULT_DURATION_MS)
    }
}
