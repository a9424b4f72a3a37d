//! Sweep and connection configuration.
//!
//! [`SweepConfig`] is the value object handed to the measurement worker. It
//! is validated for range and ordering before any connection attempt, and it
//! is cloned into the worker task, never shared mutably, once a
//! measurement is in flight.

use std::ops::RangeInclusive;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::VnaError;
use crate::measurement::SParam;

/// Raw-socket SCPI port most TCP instruments listen on.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

/// Default start frequency (1 MHz).
pub const DEFAULT_START_FREQ_HZ: f64 = 1e6;

/// Default stop frequency (1100 MHz).
pub const DEFAULT_STOP_FREQ_HZ: f64 = 1100e6;

/// Default sweep point count.
pub const DEFAULT_SWEEP_POINTS: u32 = 601;

/// Default averaging factor.
pub const DEFAULT_AVERAGING_COUNT: u32 = 16;

/// Sweep point counts advertised by the E5071 family.
pub const SWEEP_POINTS_RANGE: RangeInclusive<u32> = 2..=1601;

/// Connection target and sweep parameters for one measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Instrument IP address or hostname.
    pub host: String,
    /// VISA-style resource label (e.g. `inst0`), kept for display and logs.
    pub resource: String,
    /// TCP port of the instrument's raw SCPI socket.
    pub scpi_port: u16,
    /// Sweep start frequency in Hz. Must be positive and below `stop_freq_hz`.
    pub start_freq_hz: f64,
    /// Sweep stop frequency in Hz.
    pub stop_freq_hz: f64,
    /// Number of sweep points, within [`SWEEP_POINTS_RANGE`].
    pub sweep_points: u32,
    /// Averaging factor, at least 1.
    pub averaging_count: u32,
    /// Selected S-parameters in the order the user requested them.
    pub sparams: Vec<SParam>,
    /// Directory exported files are written to.
    pub output_folder: PathBuf,
    /// Prefix for generated export filenames.
    pub filename_prefix: String,
    /// Program the instrument's frequency range from this config.
    pub set_freq_range: bool,
    /// Program the instrument's sweep point count from this config.
    pub set_sweep_points: bool,
    /// Enable trace averaging on the instrument.
    pub enable_averaging: bool,
    /// Program the averaging factor from this config.
    pub set_averaging_count: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            resource: "inst0".to_string(),
            scpi_port: DEFAULT_SCPI_PORT,
            start_freq_hz: DEFAULT_START_FREQ_HZ,
            stop_freq_hz: DEFAULT_STOP_FREQ_HZ,
            sweep_points: DEFAULT_SWEEP_POINTS,
            averaging_count: DEFAULT_AVERAGING_COUNT,
            sparams: SParam::ALL.to_vec(),
            output_folder: PathBuf::from("measurement"),
            filename_prefix: "measurement".to_string(),
            set_freq_range: false,
            set_sweep_points: true,
            enable_averaging: false,
            set_averaging_count: false,
        }
    }
}

impl SweepConfig {
    /// Validate range and ordering constraints.
    ///
    /// Called by the worker before any connection attempt so invalid input
    /// never reaches the socket.
    pub fn validate(&self) -> Result<(), VnaError> {
        if self.host.trim().is_empty() {
            return Err(VnaError::Config(
                "Host must be configured before connecting".into(),
            ));
        }
        if self.start_freq_hz.is_nan() || self.stop_freq_hz.is_nan() {
            return Err(VnaError::Config("Frequency limits must be numbers".into()));
        }
        if self.start_freq_hz <= 0.0 {
            return Err(VnaError::Config(format!(
                "Start frequency {} Hz must be positive",
                self.start_freq_hz
            )));
        }
        if self.start_freq_hz >= self.stop_freq_hz {
            return Err(VnaError::Config(format!(
                "Start frequency {} Hz must be below stop frequency {} Hz",
                self.start_freq_hz, self.stop_freq_hz
            )));
        }
        if !SWEEP_POINTS_RANGE.contains(&self.sweep_points) {
            return Err(VnaError::Config(format!(
                "Sweep points {} outside instrument range {}-{}",
                self.sweep_points,
                SWEEP_POINTS_RANGE.start(),
                SWEEP_POINTS_RANGE.end()
            )));
        }
        if self.averaging_count == 0 {
            return Err(VnaError::Config("Averaging count must be at least 1".into()));
        }
        if self.sparams.is_empty() {
            return Err(VnaError::Config(
                "At least one S-parameter must be selected".into(),
            ));
        }
        for (idx, param) in self.sparams.iter().enumerate() {
            if self.sparams[..idx].contains(param) {
                return Err(VnaError::Config(format!("{param} is selected twice")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> SweepConfig {
        SweepConfig {
            host: "192.168.1.50".into(),
            ..SweepConfig::default()
        }
    }

    #[test]
    fn default_with_host_is_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(
            SweepConfig::default().validate(),
            Err(VnaError::Config(_))
        ));
    }

    #[test]
    fn inverted_frequency_range_is_rejected() {
        let config = SweepConfig {
            start_freq_hz: 2e9,
            stop_freq_hz: 1e9,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn equal_start_and_stop_are_rejected() {
        let config = SweepConfig {
            start_freq_hz: 1e9,
            stop_freq_hz: 1e9,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn nan_frequency_is_rejected() {
        let config = SweepConfig {
            start_freq_hz: f64::NAN,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn point_counts_outside_instrument_range_are_rejected() {
        for points in [0, 1, 1602, 5000] {
            let config = SweepConfig {
                sweep_points: points,
                ..valid_config()
            };
            assert!(config.validate().is_err(), "points={points} should fail");
        }
        for points in [2, 201, 1601] {
            let config = SweepConfig {
                sweep_points: points,
                ..valid_config()
            };
            assert!(config.validate().is_ok(), "points={points} should pass");
        }
    }

    #[test]
    fn zero_averaging_is_rejected() {
        let config = SweepConfig {
            averaging_count: 0,
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_sparam_selection_is_rejected() {
        let config = SweepConfig {
            sparams: vec![],
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_sparam_selection_is_rejected() {
        let config = SweepConfig {
            sparams: vec![SParam::S11, SParam::S21, SParam::S11],
            ..valid_config()
        };
        assert!(config.validate().is_err());
    }
}
