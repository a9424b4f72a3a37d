//! SCPI command text shared by the built-in drivers.
//!
//! Centralizing the command strings keeps them out of the driver logic and
//! makes it obvious what a new instrument family needs to override.

use crate::measurement::SParam;

// Standard IEEE 488.2 commands
pub const CMD_IDN: &str = "*IDN?";
pub const CMD_OPC: &str = "*OPC?";

// Data format
pub const CMD_SET_FORMAT_ASCII: &str = "FORM:DATA ASCII";

// Sweep control
pub const CMD_ABORT: &str = "ABOR";
pub const CMD_INIT: &str = "INIT1";
pub const CMD_INIT_CONTINUOUS_OFF: &str = "INIT1:CONT OFF";
pub const CMD_GET_INIT_CONTINUOUS: &str = "INIT1:CONT?";
pub const CMD_SET_SWEEP_LINEAR: &str = "SENS1:SWE:TYPE LIN";
pub const CMD_SET_TRIGGER_BUS: &str = "TRIG:SOUR BUS";
pub const CMD_GET_TRIGGER_SOURCE: &str = "TRIG:SOUR?";

// Frequency
pub const CMD_GET_FREQ_START: &str = "SENS1:FREQ:STAR?";
pub const CMD_GET_FREQ_STOP: &str = "SENS1:FREQ:STOP?";
pub const CMD_GET_FREQ_DATA: &str = "SENS1:FREQ:DATA?";

// Sweep points and averaging
pub const CMD_GET_SWEEP_POINTS: &str = "SENS1:SWE:POIN?";
pub const CMD_GET_AVERAGING_STATE: &str = "SENS1:AVER:STAT?";
pub const CMD_GET_AVERAGING_COUNT: &str = "SENS1:AVER:COUN?";

// Data retrieval (complex real/imag pairs)
pub const CMD_GET_SDATA: &str = "CALC1:DATA:SDAT?";

/// Set the sweep start frequency.
pub fn set_freq_start(freq_hz: f64) -> String {
    format!("SENS1:FREQ:STAR {freq_hz}")
}

/// Set the sweep stop frequency.
pub fn set_freq_stop(freq_hz: f64) -> String {
    format!("SENS1:FREQ:STOP {freq_hz}")
}

/// Set the number of sweep points.
pub fn set_sweep_points(points: u32) -> String {
    format!("SENS1:SWE:POIN {points}")
}

/// Switch trace averaging on or off.
pub fn set_averaging_state(enabled: bool) -> String {
    let state = if enabled { "ON" } else { "OFF" };
    format!("SENS1:AVER:STAT {state}")
}

/// Set the averaging factor.
pub fn set_averaging_count(count: u32) -> String {
    format!("SENS1:AVER:COUN {count}")
}

/// Set the number of measurement parameters.
pub fn set_param_count(count: usize) -> String {
    format!("CALC1:PAR:COUN {count}")
}

/// Define the parameter measured in a 1-based slot.
pub fn define_param(slot: usize, param: SParam) -> String {
    format!("CALC1:PAR{slot}:DEF {param}")
}

/// Select a 1-based parameter slot as active.
pub fn select_param(slot: usize) -> String {
    format!("CALC1:PAR{slot}:SEL")
}

/// Set the trigger source (INT, MAN, EXT, BUS).
pub fn set_trigger_source(source: &str) -> String {
    format!("TRIG:SOUR {source}")
}

/// Switch continuous initiation on or off.
pub fn set_init_continuous(continuous: bool) -> String {
    let state = if continuous { "ON" } else { "OFF" };
    format!("INIT1:CONT {state}")
}
