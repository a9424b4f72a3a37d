//! HP/Agilent/Keysight E5071-family VNA driver.
//!
//! Protocol overview:
//! - ASCII SCPI over the instrument's TCP socket, newline terminated.
//! - Sweep data is transferred as comma-separated ASCII (`FORM:DATA ASCII`);
//!   `CALC1:DATA:SDAT?` returns interleaved real/imag pairs.
//! - A single sweep is run by aborting, switching continuous initiation off,
//!   selecting the BUS trigger source, and issuing `INIT1`; completion is
//!   polled with `*OPC?` (a reply of `1` or `+1` means done).
//! - Several settings only take effect after a short settle delay; the
//!   delays below match the instrument's observed behavior.

use std::time::Duration;

use async_trait::async_trait;
use num_complex::Complex64;
use tokio::time::sleep;

use super::scpi;
use super::{DriverDescriptor, VnaDriver};
use crate::config::SweepConfig;
use crate::error::VnaError;
use crate::measurement::{InstrumentSettings, SParam, Trace, TriggerState};
use crate::transport::ScpiTransport;

/// Registered driver name.
pub const DRIVER_NAME: &str = "HP E5071B";

// Instrument settle delays.
const SETTLE_SHORT: Duration = Duration::from_millis(100);
const SETTLE_PARAM: Duration = Duration::from_millis(200);
const SETTLE_PARAM_COUNT: Duration = Duration::from_millis(300);
const SETTLE_CONFIG: Duration = Duration::from_millis(500);

/// Registry descriptor for the E5071 family.
pub fn descriptor() -> DriverDescriptor {
    DriverDescriptor {
        name: DRIVER_NAME,
        idn_matcher: matches_idn,
        build,
    }
}

/// Matches HP, Agilent, and Keysight E5071-series identification strings.
pub fn matches_idn(idn: &str) -> bool {
    idn.to_ascii_lowercase().contains("e5071")
}

fn build(transport: Box<dyn ScpiTransport>, config: SweepConfig) -> Box<dyn VnaDriver> {
    Box::new(E5071b::new(transport, config))
}

/// Driver instance bound to one open transport.
pub struct E5071b {
    transport: Box<dyn ScpiTransport>,
    config: SweepConfig,
    idn: String,
}

impl E5071b {
    /// Bind the driver to an open transport.
    pub fn new(transport: Box<dyn ScpiTransport>, config: SweepConfig) -> Self {
        Self {
            transport,
            config,
            idn: String::new(),
        }
    }

    /// 1-based instrument slot `param` was assigned during
    /// `setup_s_parameters` (slots follow the user's selection order).
    fn param_slot(&self, param: SParam) -> Result<usize, VnaError> {
        self.config
            .sparams
            .iter()
            .position(|&p| p == param)
            .map(|idx| idx + 1)
            .ok_or_else(|| {
                VnaError::Protocol(format!("{param} was not configured for this sweep"))
            })
    }

    async fn query_ascii_values(&mut self, command: &str) -> Result<Vec<f64>, VnaError> {
        let reply = self.transport.query(command).await?;
        parse_ascii_values(&reply)
    }

    /// Query where a missing or unparsable answer degrades to `None`.
    /// Connection loss still propagates.
    async fn try_query(&mut self, command: &str) -> Result<Option<String>, VnaError> {
        match self.transport.query(command).await {
            Ok(reply) => Ok(Some(reply)),
            Err(err @ VnaError::Connection(_)) => Err(err),
            Err(_) => Ok(None),
        }
    }
}

/// Parse a comma-separated ASCII value block.
fn parse_ascii_values(reply: &str) -> Result<Vec<f64>, VnaError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        return Err(VnaError::Protocol("Empty ASCII data block".into()));
    }
    trimmed
        .split(',')
        .map(|field| {
            field
                .trim()
                .parse::<f64>()
                .map_err(|_| VnaError::Protocol(format!("Invalid ASCII data field '{field}'")))
        })
        .collect()
}

#[async_trait]
impl VnaDriver for E5071b {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn idn(&self) -> &str {
        &self.idn
    }

    async fn connect(&mut self) -> Result<(), VnaError> {
        let idn = self.transport.query(scpi::CMD_IDN).await?;
        self.idn = idn.trim().to_string();
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), VnaError> {
        self.transport.close().await
    }

    async fn configure_frequency(&mut self) -> Result<(), VnaError> {
        if self.config.set_freq_range {
            self.transport
                .send(&scpi::set_freq_start(self.config.start_freq_hz))
                .await?;
            self.transport
                .send(&scpi::set_freq_stop(self.config.stop_freq_hz))
                .await?;
            sleep(SETTLE_CONFIG).await;
        }
        Ok(())
    }

    async fn configure_measurements(&mut self) -> Result<(), VnaError> {
        self.transport.send(scpi::CMD_SET_FORMAT_ASCII).await?;
        self.transport.send(scpi::CMD_SET_SWEEP_LINEAR).await?;

        if self.config.set_sweep_points {
            self.transport
                .send(&scpi::set_sweep_points(self.config.sweep_points))
                .await?;
        }

        self.transport
            .send(&scpi::set_averaging_state(self.config.enable_averaging))
            .await?;
        if self.config.set_averaging_count {
            self.transport
                .send(&scpi::set_averaging_count(self.config.averaging_count))
                .await?;
        }

        sleep(SETTLE_CONFIG).await;
        Ok(())
    }

    async fn setup_s_parameters(&mut self) -> Result<(), VnaError> {
        let sparams = self.config.sparams.clone();

        self.transport
            .send(&scpi::set_param_count(sparams.len()))
            .await?;
        sleep(SETTLE_PARAM_COUNT).await;

        for (idx, param) in sparams.iter().enumerate() {
            let slot = idx + 1;
            self.transport
                .send(&scpi::define_param(slot, *param))
                .await?;
            sleep(SETTLE_PARAM).await;
            self.transport.send(&scpi::select_param(slot)).await?;
            sleep(SETTLE_SHORT).await;
        }

        // Leave the first slot active.
        self.transport.send(&scpi::select_param(1)).await?;
        sleep(SETTLE_SHORT).await;
        Ok(())
    }

    async fn save_trigger_state(&mut self) -> Result<TriggerState, VnaError> {
        let source = self
            .transport
            .query(scpi::CMD_GET_TRIGGER_SOURCE)
            .await?
            .trim()
            .to_string();
        let continuous_reply = self.transport.query(scpi::CMD_GET_INIT_CONTINUOUS).await?;
        let continuous = matches!(continuous_reply.trim(), "1" | "ON");
        Ok(TriggerState { source, continuous })
    }

    async fn restore_trigger_state(&mut self, state: TriggerState) -> Result<(), VnaError> {
        self.transport
            .send(&scpi::set_trigger_source(&state.source))
            .await?;
        sleep(SETTLE_SHORT).await;
        self.transport
            .send(&scpi::set_init_continuous(state.continuous))
            .await?;
        sleep(SETTLE_SHORT).await;
        Ok(())
    }

    async fn trigger_sweep(&mut self) -> Result<(), VnaError> {
        self.transport.send(scpi::CMD_ABORT).await?;
        sleep(SETTLE_PARAM).await;

        self.transport.send(scpi::CMD_INIT_CONTINUOUS_OFF).await?;
        sleep(SETTLE_SHORT).await;
        self.transport.send(scpi::CMD_SET_TRIGGER_BUS).await?;
        sleep(SETTLE_SHORT).await;

        self.transport.send(scpi::CMD_INIT).await?;
        sleep(SETTLE_SHORT).await;
        Ok(())
    }

    async fn sweep_finished(&mut self) -> Result<bool, VnaError> {
        let reply = self.transport.query(scpi::CMD_OPC).await?;
        Ok(matches!(reply.trim(), "1" | "+1"))
    }

    async fn read_frequency_axis(&mut self) -> Result<Vec<f64>, VnaError> {
        self.query_ascii_values(scpi::CMD_GET_FREQ_DATA).await
    }

    fn selected_sparams(&self) -> &[SParam] {
        &self.config.sparams
    }

    async fn read_sparam(&mut self, param: SParam) -> Result<Trace, VnaError> {
        let slot = self.param_slot(param)?;
        self.transport.send(&scpi::select_param(slot)).await?;
        sleep(SETTLE_SHORT).await;

        let mut values = self.query_ascii_values(scpi::CMD_GET_SDATA).await?;
        if values.len() % 2 != 0 {
            values.pop();
        }

        let points: Vec<Complex64> = values
            .chunks_exact(2)
            .map(|pair| Complex64::new(pair[0], pair[1]))
            .collect();
        Ok(Trace::from_complex(&points))
    }

    async fn read_settings(&mut self) -> Result<InstrumentSettings, VnaError> {
        let start_freq_hz = self
            .try_query(scpi::CMD_GET_FREQ_START)
            .await?
            .and_then(|reply| reply.trim().parse().ok());
        let stop_freq_hz = self
            .try_query(scpi::CMD_GET_FREQ_STOP)
            .await?
            .and_then(|reply| reply.trim().parse().ok());
        let sweep_points = self
            .try_query(scpi::CMD_GET_SWEEP_POINTS)
            .await?
            .and_then(|reply| reply.trim().parse().ok());
        let averaging_enabled = self
            .try_query(scpi::CMD_GET_AVERAGING_STATE)
            .await?
            .map(|reply| matches!(reply.trim(), "1" | "ON"));
        let averaging_count = self
            .try_query(scpi::CMD_GET_AVERAGING_COUNT)
            .await?
            .and_then(|reply| reply.trim().parse().ok());

        Ok(InstrumentSettings {
            start_freq_hz,
            stop_freq_hz,
            sweep_points,
            averaging_enabled,
            averaging_count,
        })
    }
}
