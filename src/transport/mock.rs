//! Scripted SCPI instrument for tests and offline development.
//!
//! [`MockTransport`] emulates an E5071-family analyzer well enough to drive
//! the full measurement sequence without hardware: it tracks the state the
//! driver programs into it (frequency range, sweep points, parameter slots,
//! trigger mode) and synthesizes deterministic sweep data from that state.
//! Failures can be armed per command to exercise the error paths.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{truncated, ScpiTransport, TransportConnector, WireDirection, WireTap};
use crate::config::SweepConfig;
use crate::error::VnaError;

/// Failure the mock can be armed to inject on a matching command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// The command never gets a reply.
    Timeout,
    /// The connection drops mid-exchange.
    ConnectionReset,
}

/// In-memory instrument emulation implementing [`ScpiTransport`].
pub struct MockTransport {
    idn: String,
    start_freq_hz: f64,
    stop_freq_hz: f64,
    sweep_points: u32,
    averaging_enabled: bool,
    averaging_count: u32,
    trigger_source: String,
    continuous: bool,
    param_slots: Vec<String>,
    active_slot: usize,
    /// `*OPC?` answers "0" this many times after arming before reporting
    /// completion.
    busy_polls: u32,
    remaining_busy_polls: u32,
    armed: bool,
    fail_on: Option<FailureScript>,
    closed: bool,
    log: Arc<Mutex<Vec<String>>>,
    tap: Option<WireTap>,
}

struct FailureScript {
    needle: String,
    failure: MockFailure,
    /// 1-based match count the failure fires on.
    nth: u32,
    seen: u32,
}

impl MockTransport {
    /// Create a mock answering `*IDN?` with `idn`.
    pub fn new(idn: &str) -> Self {
        Self {
            idn: idn.to_string(),
            start_freq_hz: 1e6,
            stop_freq_hz: 1100e6,
            sweep_points: 601,
            averaging_enabled: false,
            averaging_count: 16,
            trigger_source: "INT".to_string(),
            continuous: true,
            param_slots: vec!["S11".to_string()],
            active_slot: 0,
            busy_polls: 2,
            remaining_busy_polls: 0,
            armed: false,
            fail_on: None,
            closed: false,
            log: Arc::new(Mutex::new(Vec::new())),
            tap: None,
        }
    }

    /// A mock identifying as an Agilent E5071B.
    pub fn e5071b() -> Self {
        Self::new("AGILENT,E5071B,MY12345,A.09.25")
    }

    /// Number of "still sweeping" replies before `*OPC?` reports completion.
    /// Pass `u32::MAX` for a sweep that never finishes.
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Arm `failure` for the first command containing `needle`.
    pub fn fail_on(self, needle: &str, failure: MockFailure) -> Self {
        self.fail_on_nth(needle, 1, failure)
    }

    /// Arm `failure` for the `nth` (1-based) command containing `needle`.
    pub fn fail_on_nth(mut self, needle: &str, nth: u32, failure: MockFailure) -> Self {
        self.fail_on = Some(FailureScript {
            needle: needle.to_string(),
            failure,
            nth,
            seen: 0,
        });
        self
    }

    /// Handle to the list of commands the mock has received.
    pub fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.log)
    }

    pub(crate) fn set_tap(&mut self, tap: Option<WireTap>) {
        self.tap = tap;
    }

    fn tap(&self, direction: WireDirection, text: &str) {
        if let Some(tap) = &self.tap {
            tap(direction, truncated(text));
        }
    }

    fn record(&mut self, command: &str) -> Result<(), VnaError> {
        if self.closed {
            return Err(VnaError::Connection("Transport is closed".into()));
        }
        if let Ok(mut log) = self.log.lock() {
            log.push(command.to_string());
        }
        self.tap(WireDirection::Tx, command);

        if let Some(script) = &mut self.fail_on {
            if command.contains(&script.needle) {
                script.seen += 1;
                if script.seen == script.nth {
                    let failure = script.failure;
                    self.fail_on = None;
                    return Err(match failure {
                        MockFailure::Timeout => {
                            VnaError::Timeout(std::time::Duration::from_millis(100))
                        }
                        MockFailure::ConnectionReset => {
                            VnaError::Connection("Connection reset by peer".into())
                        }
                    });
                }
            }
        }
        Ok(())
    }

    fn frequencies(&self) -> Vec<f64> {
        let n = self.sweep_points.max(2) as usize;
        let step = (self.stop_freq_hz - self.start_freq_hz) / (n - 1) as f64;
        (0..n)
            .map(|i| self.start_freq_hz + step * i as f64)
            .collect()
    }

    /// Deterministic complex sweep data, shaped by the active slot so every
    /// parameter reads back distinct values.
    fn sdata(&self) -> String {
        let scale = 0.5 / (self.active_slot + 1) as f64;
        let n = self.sweep_points.max(2) as usize;
        let mut fields = Vec::with_capacity(n * 2);
        for i in 0..n {
            let angle = i as f64 / n as f64 * std::f64::consts::TAU;
            fields.push(format!("{:.9e}", scale * angle.cos()));
            fields.push(format!("{:.9e}", scale * angle.sin()));
        }
        fields.join(",")
    }

    fn on_off(value: bool) -> &'static str {
        if value {
            "1"
        } else {
            "0"
        }
    }

    fn answer(&mut self, command: &str) -> Result<String, VnaError> {
        let reply = match command {
            "*IDN?" => self.idn.clone(),
            "*OPC?" => {
                if self.armed && self.remaining_busy_polls > 0 {
                    self.remaining_busy_polls = self.remaining_busy_polls.saturating_sub(1);
                    "0".to_string()
                } else {
                    "1".to_string()
                }
            }
            "SENS1:FREQ:STAR?" => format!("{}", self.start_freq_hz),
            "SENS1:FREQ:STOP?" => format!("{}", self.stop_freq_hz),
            "SENS1:SWE:POIN?" => format!("{}", self.sweep_points),
            "SENS1:AVER:STAT?" => Self::on_off(self.averaging_enabled).to_string(),
            "SENS1:AVER:COUN?" => format!("{}", self.averaging_count),
            "TRIG:SOUR?" => self.trigger_source.clone(),
            "INIT1:CONT?" => Self::on_off(self.continuous).to_string(),
            "SENS1:FREQ:DATA?" => self
                .frequencies()
                .iter()
                .map(|f| format!("{f}"))
                .collect::<Vec<_>>()
                .join(","),
            "CALC1:DATA:SDAT?" => self.sdata(),
            other => {
                return Err(VnaError::Protocol(format!(
                    "Unrecognized query '{other}'"
                )))
            }
        };
        self.tap(WireDirection::Rx, &reply);
        Ok(reply)
    }

    fn apply(&mut self, command: &str) {
        if let Some(value) = command.strip_prefix("SENS1:FREQ:STAR ") {
            if let Ok(freq) = value.trim().parse() {
                self.start_freq_hz = freq;
            }
        } else if let Some(value) = command.strip_prefix("SENS1:FREQ:STOP ") {
            if let Ok(freq) = value.trim().parse() {
                self.stop_freq_hz = freq;
            }
        } else if let Some(value) = command.strip_prefix("SENS1:SWE:POIN ") {
            if let Ok(points) = value.trim().parse() {
                self.sweep_points = points;
            }
        } else if let Some(value) = command.strip_prefix("SENS1:AVER:STAT ") {
            self.averaging_enabled = matches!(value.trim(), "ON" | "1");
        } else if let Some(value) = command.strip_prefix("SENS1:AVER:COUN ") {
            if let Ok(count) = value.trim().parse() {
                self.averaging_count = count;
            }
        } else if let Some(value) = command.strip_prefix("CALC1:PAR:COUN ") {
            if let Ok(count) = value.trim().parse::<usize>() {
                self.param_slots.resize(count.max(1), String::new());
            }
        } else if let Some(rest) = command.strip_prefix("CALC1:PAR") {
            // CALC1:PAR<n>:DEF <param>  |  CALC1:PAR<n>:SEL
            if let Some((slot, action)) = rest.split_once(':') {
                if let Ok(slot) = slot.parse::<usize>() {
                    let idx = slot.saturating_sub(1);
                    if let Some(param) = action.strip_prefix("DEF ") {
                        if idx < self.param_slots.len() {
                            self.param_slots[idx] = param.trim().to_string();
                        }
                    } else if action == "SEL" && idx < self.param_slots.len() {
                        self.active_slot = idx;
                    }
                }
            }
        } else if let Some(value) = command.strip_prefix("TRIG:SOUR ") {
            self.trigger_source = value.trim().to_string();
        } else if let Some(value) = command.strip_prefix("INIT1:CONT ") {
            self.continuous = matches!(value.trim(), "ON" | "1");
        } else if command == "ABOR" {
            self.armed = false;
        } else if command == "INIT1" {
            self.armed = true;
            self.remaining_busy_polls = self.busy_polls;
        }
        // FORM:DATA, SENS1:SWE:TYPE and anything else are accepted silently.
    }
}

#[async_trait]
impl ScpiTransport for MockTransport {
    async fn send(&mut self, command: &str) -> Result<(), VnaError> {
        self.record(command)?;
        self.apply(command);
        Ok(())
    }

    async fn query(&mut self, command: &str) -> Result<String, VnaError> {
        self.record(command)?;
        self.answer(command)
    }

    async fn close(&mut self) -> Result<(), VnaError> {
        self.closed = true;
        Ok(())
    }
}

/// Connector handing out one prepared [`MockTransport`].
///
/// A second `connect` call, or any call on a [`MockConnector::refusing`]
/// connector, fails with a connection error.
pub struct MockConnector {
    transport: Mutex<Option<MockTransport>>,
}

impl MockConnector {
    /// Connector that yields `transport` on the first connect.
    pub fn new(transport: MockTransport) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
        }
    }

    /// Connector that refuses every connect, emulating an unreachable host.
    pub fn refusing() -> Self {
        Self {
            transport: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TransportConnector for MockConnector {
    async fn connect(
        &self,
        _config: &SweepConfig,
        tap: Option<WireTap>,
    ) -> Result<Box<dyn ScpiTransport>, VnaError> {
        let mut slot = self
            .transport
            .lock()
            .map_err(|_| VnaError::Connection("Mock connector poisoned".into()))?;
        let mut transport = slot
            .take()
            .ok_or_else(|| VnaError::Connection("Connection refused".into()))?;
        transport.set_tap(tap);
        Ok(Box::new(transport))
    }
}
