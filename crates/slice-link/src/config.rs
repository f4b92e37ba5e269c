//! Configuration document
//!
//! A single JSON file with nested sections. Unknown keys are ignored,
//! missing keys assume defaults, and the environment variables `MODE`,
//! `FLEX_HOST`, and `RIG_NAME` override their JSON counterparts.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Which radio integration runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperatingProfile {
    /// One decoder instance against an operator-managed rig
    Standard,
    /// Full SDR backend integration with per-slice instances
    #[default]
    Flex,
}

/// Decoder-app launch settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsjtxConfig {
    /// Path to the decoder-app executable
    #[serde(default = "default_wsjtx_path")]
    pub path: PathBuf,
}

fn default_wsjtx_path() -> PathBuf {
    PathBuf::from("wsjtx")
}

impl Default for WsjtxConfig {
    fn default() -> Self {
        Self { path: default_wsjtx_path() }
    }
}

/// Operator identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StationConfig {
    /// Station callsign
    #[serde(default)]
    pub callsign: String,
    /// Maidenhead grid locator
    #[serde(default)]
    pub grid: String,
}

/// STANDARD-profile settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StandardConfig {
    /// Rig name passed to the single decoder instance
    #[serde(default = "default_rig_name")]
    pub rig_name: String,
}

fn default_rig_name() -> String {
    "SliceLink".to_string()
}

impl Default for StandardConfig {
    fn default() -> Self {
        Self { rig_name: default_rig_name() }
    }
}

/// FLEX-profile settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlexConfig {
    /// Radio host; empty means discover by broadcast
    #[serde(default)]
    pub host: String,
    /// First CAT listener port; slice N binds `cat_base_port + N`
    #[serde(default = "default_cat_base_port")]
    pub cat_base_port: u16,
    /// Frequencies (Hz) to seed slices with after the initial list
    #[serde(default)]
    pub default_bands: Vec<u64>,
}

fn default_cat_base_port() -> u16 {
    7809
}

impl Default for FlexConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            cat_base_port: default_cat_base_port(),
            default_bands: Vec::new(),
        }
    }
}

/// Dashboard consumer settings; the core only carries them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardConfig {
    /// Seconds a heard station stays on the dashboard
    #[serde(default = "default_station_lifetime")]
    pub station_lifetime_s: u64,
    /// SNR below which a station renders as weak
    #[serde(default = "default_snr_weak")]
    pub snr_weak_threshold: i32,
    /// SNR above which a station renders as strong
    #[serde(default = "default_snr_strong")]
    pub snr_strong_threshold: i32,
    /// ADIF log the dashboard reads for worked-before marks
    #[serde(default)]
    pub adif_log_path: Option<PathBuf>,
}

fn default_station_lifetime() -> u64 {
    300
}
fn default_snr_weak() -> i32 {
    -18
}
fn default_snr_strong() -> i32 {
    -5
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            station_lifetime_s: default_station_lifetime(),
            snr_weak_threshold: default_snr_weak(),
            snr_strong_threshold: default_snr_strong(),
            adif_log_path: None,
        }
    }
}

/// Web/dashboard server settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebConfig {
    /// HTTP port for the dashboard
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_port() -> u16 {
    8090
}

impl Default for WebConfig {
    fn default() -> Self {
        Self { port: default_web_port() }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    /// Operating profile
    #[serde(default)]
    pub mode: OperatingProfile,
    /// Decoder-app settings
    #[serde(default)]
    pub wsjtx: WsjtxConfig,
    /// Operator identity
    #[serde(default)]
    pub station: StationConfig,
    /// STANDARD-profile settings
    #[serde(default)]
    pub standard: StandardConfig,
    /// FLEX-profile settings
    #[serde(default)]
    pub flex: FlexConfig,
    /// Dashboard settings
    #[serde(default)]
    pub dashboard: DashboardConfig,
    /// Web server settings
    #[serde(default)]
    pub web: WebConfig,
}

impl Config {
    /// Load from a JSON file, falling back to defaults when the file is
    /// missing, then apply environment overrides
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str::<Config>(&text) {
                Ok(config) => config,
                Err(e) => {
                    warn!("config file {} unreadable ({}), using defaults", path.display(), e);
                    Config::default()
                }
            },
            Err(_) => {
                info!("no config file at {}, using defaults", path.display());
                Config::default()
            }
        };
        config.apply_env();
        config
    }

    /// Apply `MODE`, `FLEX_HOST`, and `RIG_NAME` overrides
    pub fn apply_env(&mut self) {
        if let Ok(mode) = std::env::var("MODE") {
            match mode.to_ascii_uppercase().as_str() {
                "STANDARD" => self.mode = OperatingProfile::Standard,
                "FLEX" => self.mode = OperatingProfile::Flex,
                other => warn!("ignoring unknown MODE override {:?}", other),
            }
        }
        if let Ok(host) = std::env::var("FLEX_HOST") {
            if !host.is_empty() {
                self.flex.host = host;
            }
        }
        if let Ok(rig) = std::env::var("RIG_NAME") {
            if !rig.is_empty() {
                self.standard.rig_name = rig;
            }
        }
    }
}
