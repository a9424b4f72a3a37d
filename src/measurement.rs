//! Sweep measurement data types.
//!
//! A completed sweep is represented by [`SweepResult`]: one ascending
//! frequency axis plus, per selected S-parameter, a same-length [`Trace`] of
//! dB magnitudes and phase angles in degrees. The shape invariant (every
//! sequence has exactly one sample per frequency point) is enforced at
//! construction so downstream consumers never have to re-check it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::VnaError;

/// Epsilon added before taking `log10` so a perfect null does not produce
/// `-inf` in the magnitude trace.
pub const LOG_EPSILON: f64 = 1e-15;

/// A two-port scattering parameter.
///
/// The derived `Ord` follows the declaration order, which is the canonical
/// Touchstone column order (S11, S21, S12, S22): iterating a
/// `BTreeMap<SParam, _>` therefore yields parameters in export order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SParam {
    /// Port 1 reflection.
    S11,
    /// Forward transmission.
    S21,
    /// Reverse transmission.
    S12,
    /// Port 2 reflection.
    S22,
}

impl SParam {
    /// All parameters in canonical port order.
    pub const ALL: [SParam; 4] = [SParam::S11, SParam::S21, SParam::S12, SParam::S22];

    /// The conventional name, e.g. `"S21"`.
    pub fn label(self) -> &'static str {
        match self {
            SParam::S11 => "S11",
            SParam::S21 => "S21",
            SParam::S12 => "S12",
            SParam::S22 => "S22",
        }
    }
}

impl fmt::Display for SParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SParam {
    type Err = VnaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "S11" => Ok(SParam::S11),
            "S21" => Ok(SParam::S21),
            "S12" => Ok(SParam::S12),
            "S22" => Ok(SParam::S22),
            other => Err(VnaError::Config(format!("Unknown S-parameter '{other}'"))),
        }
    }
}

/// One S-parameter's measured data across the sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    /// Magnitude in dB, one sample per frequency point.
    pub magnitude_db: Vec<f64>,
    /// Phase in degrees, one sample per frequency point.
    pub phase_deg: Vec<f64>,
}

impl Trace {
    /// Convert complex samples (as read from the instrument) to dB magnitude
    /// and phase in degrees.
    pub fn from_complex(points: &[Complex64]) -> Self {
        let magnitude_db = points
            .iter()
            .map(|z| 20.0 * (z.norm() + LOG_EPSILON).log10())
            .collect();
        let phase_deg = points.iter().map(|z| z.arg().to_degrees()).collect();
        Self {
            magnitude_db,
            phase_deg,
        }
    }

    /// Number of samples in the trace.
    pub fn len(&self) -> usize {
        self.magnitude_db.len()
    }

    /// Whether the trace holds no samples.
    pub fn is_empty(&self) -> bool {
        self.magnitude_db.is_empty()
    }
}

/// The immutable outcome of one successful sweep.
#[derive(Debug, Clone)]
pub struct SweepResult {
    /// Identification string of the instrument that produced the data.
    pub idn: String,
    /// Ascending frequency axis in Hz.
    pub frequencies_hz: Vec<f64>,
    /// Measured traces, keyed in canonical port order.
    pub traces: BTreeMap<SParam, Trace>,
}

impl SweepResult {
    /// Assemble a result, enforcing the shape invariant: every trace must
    /// carry exactly one magnitude and one phase sample per frequency point.
    pub fn new(
        idn: String,
        frequencies_hz: Vec<f64>,
        traces: BTreeMap<SParam, Trace>,
    ) -> Result<Self, VnaError> {
        let points = frequencies_hz.len();
        for (param, trace) in &traces {
            if trace.magnitude_db.len() != points || trace.phase_deg.len() != points {
                return Err(VnaError::Protocol(format!(
                    "{param} returned {} samples for {points} frequency points",
                    trace.magnitude_db.len()
                )));
            }
        }
        Ok(Self {
            idn,
            frequencies_hz,
            traces,
        })
    }

    /// Number of frequency points in the sweep.
    pub fn points(&self) -> usize {
        self.frequencies_hz.len()
    }
}

/// Sweep parameters read back from the instrument.
///
/// Fields the instrument did not answer (or answered unparsably) are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentSettings {
    /// Configured start frequency in Hz.
    pub start_freq_hz: Option<f64>,
    /// Configured stop frequency in Hz.
    pub stop_freq_hz: Option<f64>,
    /// Configured sweep point count.
    pub sweep_points: Option<u32>,
    /// Whether trace averaging is enabled.
    pub averaging_enabled: Option<bool>,
    /// Configured averaging factor.
    pub averaging_count: Option<u32>,
}

/// Trigger configuration captured before a sweep and restored after all data
/// has been read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerState {
    /// Trigger source mnemonic (INT, MAN, EXT, BUS).
    pub source: String,
    /// Whether continuous initiation was active.
    pub continuous: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparam_order_is_canonical() {
        let mut params = vec![SParam::S22, SParam::S12, SParam::S11, SParam::S21];
        params.sort();
        assert_eq!(params, SParam::ALL.to_vec());
    }

    #[test]
    fn sparam_parses_case_insensitively() {
        assert_eq!("s21".parse::<SParam>().unwrap(), SParam::S21);
        assert_eq!(" S11 ".parse::<SParam>().unwrap(), SParam::S11);
        assert!("S13".parse::<SParam>().is_err());
    }

    #[test]
    fn trace_conversion_matches_known_values() {
        let points = [Complex64::new(1.0, 0.0), Complex64::new(0.0, 1.0)];
        let trace = Trace::from_complex(&points);

        assert!(trace.magnitude_db[0].abs() < 1e-9);
        assert!(trace.phase_deg[0].abs() < 1e-9);
        assert!(trace.magnitude_db[1].abs() < 1e-9);
        assert!((trace.phase_deg[1] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn trace_conversion_survives_a_null() {
        let trace = Trace::from_complex(&[Complex64::new(0.0, 0.0)]);
        assert!(trace.magnitude_db[0].is_finite());
    }

    #[test]
    fn result_rejects_mismatched_trace_length() {
        let mut traces = BTreeMap::new();
        traces.insert(
            SParam::S11,
            Trace {
                magnitude_db: vec![0.0; 3],
                phase_deg: vec![0.0; 3],
            },
        );
        let err = SweepResult::new("idn".into(), vec![1.0, 2.0], traces).unwrap_err();
        assert!(matches!(err, VnaError::Protocol(_)));
    }

    #[test]
    fn result_accepts_matching_shapes() {
        let mut traces = BTreeMap::new();
        traces.insert(
            SParam::S21,
            Trace {
                magnitude_db: vec![-3.0, -3.1],
                phase_deg: vec![10.0, 11.0],
            },
        );
        let result = SweepResult::new("idn".into(), vec![1.0, 2.0], traces).unwrap();
        assert_eq!(result.points(), 2);
    }
}
