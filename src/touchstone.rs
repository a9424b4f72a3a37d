//! Touchstone (.s2p) export and import.
//!
//! The exporter writes the industry-standard text format downstream RF
//! tools expect: one `#` option line declaring frequency unit, parameter
//! type `S`, format `DB` (dB magnitude + angle in degrees) and reference
//! impedance, then one row per frequency point with the exported parameters
//! in canonical port order (S11, S21, S12, S22).
//!
//! Two guarantees the rest of the system relies on:
//!
//! - **Atomic-or-nothing**: shape validation happens before any bytes are
//!   written, and the file is written to a temporary path and renamed into
//!   place: a failed export never leaves a half-written `.s2p` behind.
//! - **Deterministic output**: identical inputs produce byte-identical
//!   files. Nothing time- or environment-dependent goes into the contents;
//!   timestamps belong in the filename, which the caller controls.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::VnaError;
use crate::measurement::{SParam, Trace};

/// Default reference impedance in ohms.
pub const DEFAULT_REFERENCE_IMPEDANCE: f64 = 50.0;

/// Frequency unit declared in the option line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FreqUnit {
    /// Hertz.
    Hz,
    /// Kilohertz.
    KHz,
    /// Megahertz (the conventional choice for `.s2p` files).
    #[default]
    MHz,
    /// Gigahertz.
    GHz,
}

impl FreqUnit {
    /// Hz per one unit.
    pub fn scale(self) -> f64 {
        match self {
            FreqUnit::Hz => 1.0,
            FreqUnit::KHz => 1e3,
            FreqUnit::MHz => 1e6,
            FreqUnit::GHz => 1e9,
        }
    }

    /// The option-line spelling.
    pub fn label(self) -> &'static str {
        match self {
            FreqUnit::Hz => "Hz",
            FreqUnit::KHz => "kHz",
            FreqUnit::MHz => "MHz",
            FreqUnit::GHz => "GHz",
        }
    }
}

impl fmt::Display for FreqUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FreqUnit {
    type Err = VnaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hz" => Ok(FreqUnit::Hz),
            "khz" => Ok(FreqUnit::KHz),
            "mhz" => Ok(FreqUnit::MHz),
            "ghz" => Ok(FreqUnit::GHz),
            other => Err(VnaError::Export(format!("Unknown frequency unit '{other}'"))),
        }
    }
}

/// Serializes sweep data into Touchstone `.s2p` files.
#[derive(Debug, Clone, Copy)]
pub struct TouchstoneExporter {
    freq_unit: FreqUnit,
    reference_impedance_ohms: f64,
}

impl Default for TouchstoneExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TouchstoneExporter {
    /// Exporter with the conventional defaults: MHz, 50 Ω.
    pub fn new() -> Self {
        Self {
            freq_unit: FreqUnit::default(),
            reference_impedance_ohms: DEFAULT_REFERENCE_IMPEDANCE,
        }
    }

    /// Use a different frequency unit in the option line and data rows.
    pub fn with_freq_unit(mut self, unit: FreqUnit) -> Self {
        self.freq_unit = unit;
        self
    }

    /// Use a different reference impedance.
    pub fn with_reference_impedance(mut self, ohms: f64) -> Self {
        self.reference_impedance_ohms = ohms;
        self
    }

    /// Write `frequencies_hz` and `traces` to `destination` (path without
    /// extension; `.s2p` is appended). Returns the written path.
    ///
    /// Validation failures and I/O errors surface as [`VnaError::Export`];
    /// on failure no file is left at the destination.
    pub fn export(
        &self,
        frequencies_hz: &[f64],
        traces: &BTreeMap<SParam, Trace>,
        destination: &Path,
    ) -> Result<PathBuf, VnaError> {
        validate(frequencies_hz, traces)?;

        let final_path = destination.with_extension("s2p");
        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    VnaError::Export(format!("Cannot create {}: {err}", parent.display()))
                })?;
            }
        }

        let tmp_path = destination.with_extension("s2p.tmp");
        let contents = self.render(frequencies_hz, traces);
        fs::write(&tmp_path, contents).map_err(|err| {
            VnaError::Export(format!("Cannot write {}: {err}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &final_path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            VnaError::Export(format!("Cannot finalize {}: {err}", final_path.display()))
        })?;

        Ok(final_path)
    }

    fn render(&self, frequencies_hz: &[f64], traces: &BTreeMap<SParam, Trace>) -> String {
        use std::fmt::Write as _;

        let params: Vec<&str> = traces.keys().map(|p| p.label()).collect();
        let mut out = String::new();

        let _ = writeln!(out, "! 2-port S-parameter sweep");
        let _ = writeln!(
            out,
            "! Frequency Range: {:.3} - {:.3} MHz",
            frequencies_hz[0] / 1e6,
            frequencies_hz[frequencies_hz.len() - 1] / 1e6
        );
        let _ = writeln!(out, "! Points: {}", frequencies_hz.len());
        let _ = writeln!(out, "! Parameters: {}", params.join(" "));
        let _ = writeln!(out, "!");
        let _ = writeln!(
            out,
            "# {} S DB R {}",
            self.freq_unit, self.reference_impedance_ohms
        );

        for (i, freq_hz) in frequencies_hz.iter().enumerate() {
            let mut fields = vec![format!("{:.6}", freq_hz / self.freq_unit.scale())];
            for trace in traces.values() {
                fields.push(format!("{:.6}", trace.magnitude_db[i]));
                fields.push(format!("{:.6}", trace.phase_deg[i]));
            }
            let _ = writeln!(out, "{}", fields.join("  "));
        }

        out
    }
}

fn validate(frequencies_hz: &[f64], traces: &BTreeMap<SParam, Trace>) -> Result<(), VnaError> {
    if frequencies_hz.is_empty() {
        return Err(VnaError::Export("No frequency points to export".into()));
    }
    if traces.is_empty() {
        return Err(VnaError::Export(
            "No S-parameters selected for export".into(),
        ));
    }
    let points = frequencies_hz.len();
    for (param, trace) in traces {
        if trace.magnitude_db.len() != points || trace.phase_deg.len() != points {
            return Err(VnaError::Export(format!(
                "{param} data length mismatch with frequency axis"
            )));
        }
    }
    Ok(())
}

/// Parse a Touchstone `.s2p` file back into a frequency axis and traces.
///
/// The option line's frequency unit is honored; unknown units fall back to
/// MHz. Comment and malformed rows are skipped. Only parameters that carry
/// data appear in the returned map, keyed in canonical port order.
pub fn import(path: &Path) -> Result<(Vec<f64>, BTreeMap<SParam, Trace>), VnaError> {
    let contents = fs::read_to_string(path)
        .map_err(|err| VnaError::Export(format!("Cannot read {}: {err}", path.display())))?;

    let mut freq_unit = FreqUnit::default();
    let mut frequencies = Vec::new();
    let mut columns: [(Vec<f64>, Vec<f64>); 4] = Default::default();

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            if let Some(unit) = rest.split_whitespace().next() {
                freq_unit = unit.parse().unwrap_or_default();
            }
            continue;
        }

        let mut values = Vec::new();
        let mut well_formed = true;
        for field in line.split_whitespace() {
            match field.parse::<f64>() {
                Ok(value) => values.push(value),
                Err(_) => {
                    well_formed = false;
                    break;
                }
            }
        }
        // A data row needs the frequency plus at least one mag/angle pair.
        if !well_formed || values.len() < 3 {
            continue;
        }

        frequencies.push(values[0] * freq_unit.scale());
        for (idx, column) in columns.iter_mut().enumerate() {
            let mag_idx = 1 + idx * 2;
            if let (Some(&mag), Some(&angle)) = (values.get(mag_idx), values.get(mag_idx + 1)) {
                column.0.push(mag);
                column.1.push(angle);
            }
        }
    }

    if frequencies.is_empty() {
        return Err(VnaError::Export(format!(
            "No valid data rows in {}",
            path.display()
        )));
    }

    let mut traces = BTreeMap::new();
    for (idx, param) in SParam::ALL.iter().enumerate() {
        let (magnitude_db, phase_deg) = std::mem::take(&mut columns[idx]);
        if !magnitude_db.is_empty() {
            traces.insert(
                *param,
                Trace {
                    magnitude_db,
                    phase_deg,
                },
            );
        }
    }

    Ok((frequencies, traces))
}
