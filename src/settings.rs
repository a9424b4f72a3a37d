//! Persisted application settings.
//!
//! Settings survive across sessions as a JSON file in the OS config
//! directory (`~/.config/rust-vna/settings.json` on Linux). Loading is
//! forgiving: a missing or corrupt file falls back to defaults rather than
//! failing startup.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{
    SweepConfig, DEFAULT_AVERAGING_COUNT, DEFAULT_SCPI_PORT, DEFAULT_SWEEP_POINTS,
};
use crate::error::VnaError;
use crate::measurement::SParam;

/// Directory name under the OS config root.
pub const APP_NAME: &str = "rust-vna";

const SETTINGS_FILE: &str = "settings.json";

/// Most recently used hosts kept in the history.
pub const MAX_HOST_HISTORY: usize = 10;

/// Most recently used resource labels kept in the history.
pub const MAX_RESOURCE_HISTORY: usize = 10;

/// Resource labels offered before the user has any history.
pub const DEFAULT_RESOURCES: [&str; 6] = ["inst0", "inst1", "inst2", "inst3", "hislip0", "gpib0,16"];

/// Settings that persist across sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Last connected host.
    pub last_host: String,
    /// Last used VISA-style resource label.
    pub last_resource: String,
    /// TCP port of the instrument's raw SCPI socket.
    pub scpi_port: u16,
    /// Recently used hosts, most recent first.
    pub host_history: Vec<String>,
    /// Recently used resource labels, most recent first.
    pub resource_history: Vec<String>,
    /// Sweep start frequency in MHz.
    pub start_freq_mhz: f64,
    /// Sweep stop frequency in MHz.
    pub stop_freq_mhz: f64,
    /// Sweep point count.
    pub sweep_points: u32,
    /// Averaging factor.
    pub averaging_count: u32,
    /// Program the instrument's frequency range on measure.
    pub set_freq_range: bool,
    /// Program the instrument's sweep point count on measure.
    pub set_sweep_points: bool,
    /// Enable trace averaging on measure.
    pub enable_averaging: bool,
    /// Program the averaging factor on measure.
    pub set_averaging_count: bool,
    /// S-parameters to measure and export.
    pub sparams: Vec<SParam>,
    /// Directory exported files are written to.
    pub output_folder: String,
    /// Prefix for generated export filenames.
    pub filename_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            last_host: String::new(),
            last_resource: "inst0".to_string(),
            scpi_port: DEFAULT_SCPI_PORT,
            host_history: Vec::new(),
            resource_history: DEFAULT_RESOURCES.iter().map(|s| s.to_string()).collect(),
            start_freq_mhz: 1.0,
            stop_freq_mhz: 1100.0,
            sweep_points: DEFAULT_SWEEP_POINTS,
            averaging_count: DEFAULT_AVERAGING_COUNT,
            set_freq_range: false,
            set_sweep_points: true,
            enable_averaging: false,
            set_averaging_count: false,
            sparams: SParam::ALL.to_vec(),
            output_folder: "measurement".to_string(),
            filename_prefix: "measurement".to_string(),
        }
    }
}

impl Settings {
    /// Build the worker's sweep config from these settings.
    pub fn to_sweep_config(&self) -> SweepConfig {
        SweepConfig {
            host: self.last_host.clone(),
            resource: self.last_resource.clone(),
            scpi_port: self.scpi_port,
            start_freq_hz: self.start_freq_mhz * 1e6,
            stop_freq_hz: self.stop_freq_mhz * 1e6,
            sweep_points: self.sweep_points,
            averaging_count: self.averaging_count,
            sparams: self.sparams.clone(),
            output_folder: PathBuf::from(&self.output_folder),
            filename_prefix: self.filename_prefix.clone(),
            set_freq_range: self.set_freq_range,
            set_sweep_points: self.set_sweep_points,
            enable_averaging: self.enable_averaging,
            set_averaging_count: self.set_averaging_count,
        }
    }

    /// Record `host` as most recently used.
    pub fn remember_host(&mut self, host: &str) {
        push_history(&mut self.host_history, host, MAX_HOST_HISTORY);
        self.last_host = host.to_string();
    }

    /// Record `resource` as most recently used.
    pub fn remember_resource(&mut self, resource: &str) {
        push_history(&mut self.resource_history, resource, MAX_RESOURCE_HISTORY);
        self.last_resource = resource.to_string();
    }
}

fn push_history(history: &mut Vec<String>, value: &str, cap: usize) {
    history.retain(|v| v != value);
    history.insert(0, value.to_string());
    history.truncate(cap);
}

/// Loads and saves [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Store under the OS config directory.
    pub fn new() -> Result<Self, VnaError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| VnaError::Config("No config directory available".into()))?;
        Ok(Self {
            path: dir.join(APP_NAME).join(SETTINGS_FILE),
        })
    }

    /// Store at an explicit path (used by tests).
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load settings; missing or corrupt files yield defaults.
    pub fn load(&self) -> Settings {
        match fs::read_to_string(&self.path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Settings::default(),
        }
    }

    /// Persist settings, creating the config directory if needed.
    pub fn save(&self, settings: &Settings) -> Result<(), VnaError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                VnaError::Config(format!("Cannot create {}: {err}", parent.display()))
            })?;
        }
        let contents = serde_json::to_string_pretty(settings)
            .map_err(|err| VnaError::Config(format!("Cannot serialize settings: {err}")))?;
        fs::write(&self.path, contents)
            .map_err(|err| VnaError::Config(format!("Cannot write {}: {err}", self.path.display())))
    }
}
