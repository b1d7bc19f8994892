// src/settings.rs
//
// Crate settings with per-field serde defaults, loadable from a TOML file.
// The probe budget and interval were tuned empirically per deployment, so
// they are configuration rather than constants.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The pull address value meaning "no stream is provisioned for this device".
pub const PULL_URL_SENTINEL: &str = "stream not open";

fn default_hub_base_url() -> String {
    "http://localhost:5000/api".to_string()
}

fn default_probe_interval_ms() -> u64 {
    6_000
}

fn default_probe_max_attempts() -> u32 {
    8
}

fn default_probe_head_timeout_ms() -> u64 {
    3_000
}

fn default_manifest_timeout_ms() -> u64 {
    5_000
}

fn default_settle_delay_ms() -> u64 {
    1_000
}

fn default_sweep_interval_ms() -> u64 {
    15_000
}

fn default_chart_capacity() -> usize {
    50
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppSettings {
    /// Base URL of the dashboard API fronting the external device hub
    #[serde(default = "default_hub_base_url")]
    pub hub_base_url: String,

    /// Interval between availability probes for a freshly acquired stream
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,

    /// Probe attempts before the monitor gives up and tears the stream down
    #[serde(default = "default_probe_max_attempts")]
    pub probe_max_attempts: u32,

    /// Timeout for the existence-check stage of a probe
    #[serde(default = "default_probe_head_timeout_ms")]
    pub probe_head_timeout_ms: u64,

    /// Timeout for the manifest-content stage of a probe
    #[serde(default = "default_manifest_timeout_ms")]
    pub manifest_timeout_ms: u64,

    /// Pause between tearing down an old stream and re-acquiring a new one
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Interval of the coarse background availability sweep
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,

    /// Capacity of the telemetry chart buffer (oldest sample evicted)
    #[serde(default = "default_chart_capacity")]
    pub chart_capacity: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            hub_base_url: default_hub_base_url(),
            probe_interval_ms: default_probe_interval_ms(),
            probe_max_attempts: default_probe_max_attempts(),
            probe_head_timeout_ms: default_probe_head_timeout_ms(),
            manifest_timeout_ms: default_manifest_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            chart_capacity: default_chart_capacity(),
        }
    }
}

/// Default settings file location: `~/.config/gridwatch/settings.toml`
/// (platform equivalent via `dirs`).
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("gridwatch").join("settings.toml"))
}

/// Load settings from the given TOML file.
/// A missing file yields the defaults; a malformed file is an error.
pub fn load_settings(path: &std::path::Path) -> Result<AppSettings, String> {
    if !path.exists() {
        return Ok(AppSettings::default());
    }

    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings file {}: {}", path.display(), e))?;

    toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse settings file {}: {}", path.display(), e))
}

/// Persist settings to the given TOML file, creating parent directories.
pub fn save_settings(path: &std::path::Path, settings: &AppSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }

    let raw = toml::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialise settings: {}", e))?;

    std::fs::write(path, raw)
        .map_err(|e| format!("Failed to write settings file {}: {}", path.display(), e))
}
