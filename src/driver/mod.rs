//! Instrument driver contract and built-in drivers.
//!
//! A driver owns an open transport for the lifetime of one measurement
//! session and translates the capability operations (configure, arm, poll,
//! read) into instrument-specific SCPI. The worker never sees command
//! text; it only drives this trait.
//!
//! Drivers are published through a [`DriverDescriptor`]: a stateless record
//! pairing a name with an identification predicate and a constructor. The
//! [`registry`] evaluates the predicates against the `*IDN?` reply to pick
//! the driver for whatever instrument is attached.

pub mod e5071b;
pub mod registry;
pub mod scpi;

use async_trait::async_trait;

use crate::config::SweepConfig;
use crate::error::VnaError;
use crate::measurement::{InstrumentSettings, SParam, Trace, TriggerState};
use crate::transport::ScpiTransport;

pub use registry::{default_registry, DriverRegistry};

/// Constructor binding an open transport and a measurement config to a
/// stateful driver instance.
pub type DriverBuilder = fn(Box<dyn ScpiTransport>, SweepConfig) -> Box<dyn VnaDriver>;

/// Predicate evaluated against the raw `*IDN?` reply.
pub type IdnMatcher = fn(&str) -> bool;

/// Stateless record describing one available driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverDescriptor {
    /// Human-readable driver name, unique within a registry.
    pub name: &'static str,
    /// Returns true when this driver supports the identified instrument.
    pub idn_matcher: IdnMatcher,
    /// Builds the driver instance over an open transport.
    pub build: DriverBuilder,
}

/// Capability contract every instrument driver implements.
///
/// All operations take `&mut self`: the driver exclusively owns its
/// transport, and the worker exclusively owns the driver while a
/// measurement is active.
#[async_trait]
pub trait VnaDriver: Send {
    /// Driver name, matching the registered descriptor.
    fn name(&self) -> &'static str;

    /// Identification string captured during [`connect`](Self::connect).
    fn idn(&self) -> &str;

    /// Verify the session and capture the identification string.
    async fn connect(&mut self) -> Result<(), VnaError>;

    /// Release the transport. Best-effort; safe to call on a dead link.
    async fn disconnect(&mut self) -> Result<(), VnaError>;

    /// Program the sweep frequency range, when the config asks for it.
    async fn configure_frequency(&mut self) -> Result<(), VnaError>;

    /// Program data format, sweep type, point count, and averaging.
    async fn configure_measurements(&mut self) -> Result<(), VnaError>;

    /// Define the selected S-parameters on the instrument, in user order.
    ///
    /// Must run after [`configure_frequency`](Self::configure_frequency) -
    /// some instruments reset sweep state on parameter changes.
    async fn setup_s_parameters(&mut self) -> Result<(), VnaError>;

    /// Capture the trigger configuration so it can be restored after all
    /// data has been read.
    async fn save_trigger_state(&mut self) -> Result<TriggerState, VnaError>;

    /// Restore a previously captured trigger configuration.
    async fn restore_trigger_state(&mut self, state: TriggerState) -> Result<(), VnaError>;

    /// Abort any running sweep, switch to single-sweep mode, and fire one
    /// sweep. Returns once the sweep is armed; completion is observed via
    /// [`sweep_finished`](Self::sweep_finished).
    async fn trigger_sweep(&mut self) -> Result<(), VnaError>;

    /// Poll whether the armed sweep has completed.
    async fn sweep_finished(&mut self) -> Result<bool, VnaError>;

    /// Read the frequency axis in Hz.
    async fn read_frequency_axis(&mut self) -> Result<Vec<f64>, VnaError>;

    /// Read one configured S-parameter's trace.
    async fn read_sparam(&mut self, param: SParam) -> Result<Trace, VnaError>;

    /// S-parameters this driver was configured to measure, in user order.
    fn selected_sparams(&self) -> &[SParam];

    /// Read every selected S-parameter, in selection order. Aborts on the
    /// first failing read; no partial set is returned.
    async fn read_all_sparams(&mut self) -> Result<Vec<(SParam, Trace)>, VnaError> {
        let params = self.selected_sparams().to_vec();
        let mut traces = Vec::with_capacity(params.len());
        for param in params {
            let trace = self.read_sparam(param).await?;
            traces.push((param, trace));
        }
        Ok(traces)
    }

    /// Read the instrument's current sweep parameters.
    async fn read_settings(&mut self) -> Result<InstrumentSettings, VnaError>;
}
