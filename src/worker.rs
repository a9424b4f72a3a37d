//! Measurement worker.
//!
//! Runs the full measurement sequence on a background tokio task so the
//! interactive side never blocks on instrument I/O:
//!
//! ```text
//! Idle → Connecting → Detecting → Configuring → Sweeping → Reading → Complete
//!              │           │            │            │          │
//!              └───────────┴─── Failed / Cancelled ──┴──────────┘
//! ```
//!
//! # Message Flow
//!
//! ```text
//! Interactive side                     Worker task
//! ----------------                     -----------
//! start_measurement(config) ───spawn──▶ state machine
//!                                        │ Phase / Progress / Wire events
//! handle.recv()  ◀──── bounded mpsc ─────┤
//! handle.cancel() ──── AtomicBool ──────▶ checked at every state and at
//!                                         every sweep poll tick
//!                                        │ Completed / Failed / Cancelled
//! ```
//!
//! Progress and wire events are delivered best-effort (`try_send`): a
//! lagging consumer loses intermediate ticks but can never wedge the state
//! machine. Terminal events are awaited so the result is not dropped.
//!
//! The worker enforces single-instrument exclusivity: at most one
//! measurement is in flight per [`MeasurementWorker`], and a second request
//! fails fast with [`VnaError::Busy`] instead of queueing.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::SweepConfig;
use crate::driver::{scpi, DriverRegistry, VnaDriver};
use crate::error::VnaError;
use crate::measurement::{InstrumentSettings, SweepResult};
use crate::transport::{ScpiTransport, TransportConnector, WireDirection, WireTap};

/// Interval between sweep-completion polls.
pub const SWEEP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Total poll budget before an armed sweep is declared hung.
pub const SWEEP_TIMEOUT: Duration = Duration::from_secs(60);

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// States of the measurement sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementPhase {
    /// No measurement running.
    Idle,
    /// Opening the transport.
    Connecting,
    /// Querying `*IDN?` and selecting a driver.
    Detecting,
    /// Applying frequency, averaging, and S-parameter setup.
    Configuring,
    /// Sweep armed and running; the primary cancellation point.
    Sweeping,
    /// Retrieving the frequency axis and the selected traces.
    Reading,
    /// Result assembled and the instrument released.
    Complete,
    /// Terminal failure; the error is carried by [`WorkerEvent::Failed`].
    Failed,
    /// Cancellation honored; no partial result was produced.
    Cancelled,
}

impl MeasurementPhase {
    /// Human-readable phase label for progress display.
    pub fn label(self) -> &'static str {
        match self {
            MeasurementPhase::Idle => "Idle",
            MeasurementPhase::Connecting => "Connecting",
            MeasurementPhase::Detecting => "Detecting instrument",
            MeasurementPhase::Configuring => "Configuring",
            MeasurementPhase::Sweeping => "Sweeping",
            MeasurementPhase::Reading => "Reading data",
            MeasurementPhase::Complete => "Complete",
            MeasurementPhase::Failed => "Failed",
            MeasurementPhase::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for MeasurementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Events delivered to the interactive side while a measurement runs.
#[derive(Debug)]
pub enum WorkerEvent {
    /// State-machine transition.
    Phase {
        /// The state just entered.
        phase: MeasurementPhase,
        /// Rough overall progress, 0-100.
        percent: f32,
    },
    /// Sub-step progress, including sweep poll ticks.
    Progress {
        /// Human-readable description of the step.
        message: String,
        /// Rough overall progress, 0-100.
        percent: f32,
    },
    /// Raw SCPI traffic observed by the transport wire tap.
    Wire {
        /// Whether the text was sent or received.
        direction: WireDirection,
        /// The (truncated) command or reply text.
        text: String,
    },
    /// Terminal: the sweep finished and the instrument was released.
    Completed(Box<SweepResult>),
    /// Terminal: the run aborted with the carried error.
    Failed(VnaError),
    /// Terminal: cancellation was honored; no partial result exists.
    Cancelled,
}

/// Cooperative cancellation flag.
///
/// Single writer (the interactive side), single reader (the worker task);
/// an atomic is all the synchronization this needs.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// A fresh, unraised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; honored at the worker's next suspension point.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn checkpoint(&self) -> Result<(), VnaError> {
        if self.is_cancelled() {
            Err(VnaError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Caller's handle to one running measurement.
#[derive(Debug)]
pub struct MeasurementHandle {
    events: mpsc::Receiver<WorkerEvent>,
    cancel: CancelFlag,
    task: JoinHandle<()>,
}

impl MeasurementHandle {
    /// Next worker event. `None` once the worker task has finished and all
    /// queued events were drained.
    pub async fn recv(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }

    /// Raise the cancellation flag.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Clone of the cancellation flag, e.g. for a Ctrl-C handler.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Wait for the worker task itself to finish. Queued events stay
    /// readable until the handle is dropped.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

/// Releases the single-flight slot on every exit path, panics included.
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Single-flight measurement orchestrator.
pub struct MeasurementWorker {
    registry: Arc<DriverRegistry>,
    connector: Arc<dyn TransportConnector>,
    in_flight: Arc<AtomicBool>,
}

impl MeasurementWorker {
    /// Create a worker over the given registry and transport connector.
    pub fn new(registry: Arc<DriverRegistry>, connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            registry,
            connector,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a session is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate `config` and start a measurement on a background task.
    ///
    /// # Errors
    /// - [`VnaError::Config`] before any connection attempt when the config
    ///   fails validation.
    /// - [`VnaError::Busy`] when a session is already active; the request is
    ///   rejected, never queued.
    pub fn start_measurement(&self, config: SweepConfig) -> Result<MeasurementHandle, VnaError> {
        config.validate()?;
        let guard = InFlightGuard::acquire(&self.in_flight).ok_or(VnaError::Busy)?;

        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancelFlag::new();
        let ctx = WorkerCtx {
            registry: Arc::clone(&self.registry),
            connector: Arc::clone(&self.connector),
            events,
            cancel: cancel.clone(),
        };

        let task = tokio::spawn(async move {
            let _guard = guard;
            run_measurement(ctx, config).await;
        });

        Ok(MeasurementHandle {
            events: receiver,
            cancel,
            task,
        })
    }

    /// Read the instrument's current sweep parameters: connect → detect →
    /// query → disconnect. Shares the single-flight gate with measurements.
    pub async fn read_settings(
        &self,
        config: &SweepConfig,
    ) -> Result<InstrumentSettings, VnaError> {
        config.validate()?;
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(VnaError::Busy)?;

        let mut transport = self.connector.connect(config, None).await?;
        let idn = match transport.query(scpi::CMD_IDN).await {
            Ok(reply) => reply.trim().to_string(),
            Err(err) => {
                let _ = transport.close().await;
                return Err(err);
            }
        };
        let Some(descriptor) = self.registry.detect(&idn) else {
            let _ = transport.close().await;
            return Err(VnaError::UnsupportedInstrument(idn));
        };

        let mut driver = (descriptor.build)(transport, config.clone());
        let outcome = async {
            driver.connect().await?;
            driver.read_settings().await
        }
        .await;
        if let Err(err) = driver.disconnect().await {
            warn!("disconnect after settings read failed: {err}");
        }
        outcome
    }
}

struct WorkerCtx {
    registry: Arc<DriverRegistry>,
    connector: Arc<dyn TransportConnector>,
    events: mpsc::Sender<WorkerEvent>,
    cancel: CancelFlag,
}

impl WorkerCtx {
    fn emit(&self, event: WorkerEvent) {
        let _ = self.events.try_send(event);
    }

    async fn emit_terminal(&self, event: WorkerEvent) {
        if self.events.send(event).await.is_err() {
            warn!("measurement outcome dropped: event receiver is gone");
        }
    }

    fn phase(&self, phase: MeasurementPhase, percent: f32) {
        self.emit(WorkerEvent::Phase { phase, percent });
    }

    fn progress(&self, message: impl Into<String>, percent: f32) {
        self.emit(WorkerEvent::Progress {
            message: message.into(),
            percent,
        });
    }

    fn wire_tap(&self) -> WireTap {
        let events = self.events.clone();
        Arc::new(move |direction, text: &str| {
            let _ = events.try_send(WorkerEvent::Wire {
                direction,
                text: text.to_string(),
            });
        })
    }
}

async fn run_measurement(ctx: WorkerCtx, config: SweepConfig) {
    match measure(&ctx, &config).await {
        Ok(result) => {
            ctx.phase(MeasurementPhase::Complete, 100.0);
            ctx.emit_terminal(WorkerEvent::Completed(Box::new(result)))
                .await;
        }
        Err(VnaError::Cancelled) => {
            ctx.emit_terminal(WorkerEvent::Cancelled).await;
        }
        Err(err) => {
            ctx.emit_terminal(WorkerEvent::Failed(err)).await;
        }
    }
}

async fn measure(ctx: &WorkerCtx, config: &SweepConfig) -> Result<SweepResult, VnaError> {
    ctx.cancel.checkpoint()?;
    ctx.phase(MeasurementPhase::Connecting, 5.0);
    let mut transport = ctx.connector.connect(config, Some(ctx.wire_tap())).await?;

    if ctx.cancel.is_cancelled() {
        let _ = transport.close().await;
        return Err(VnaError::Cancelled);
    }
    ctx.phase(MeasurementPhase::Detecting, 10.0);
    let idn = match transport.query(scpi::CMD_IDN).await {
        Ok(reply) => reply.trim().to_string(),
        Err(err) => {
            let _ = transport.close().await;
            return Err(err);
        }
    };
    let Some(descriptor) = ctx.registry.detect(&idn) else {
        let _ = transport.close().await;
        return Err(VnaError::UnsupportedInstrument(idn));
    };
    info!(driver = descriptor.name, idn = %idn, "detected instrument");

    let mut driver = (descriptor.build)(transport, config.clone());
    let outcome = drive(ctx, config, driver.as_mut()).await;

    // Best-effort release on every path. The data (or the error) is already
    // determined; a failed disconnect is logged, never surfaced.
    if let Err(err) = driver.disconnect().await {
        warn!("best-effort disconnect failed: {err}");
    }
    outcome
}

async fn drive(
    ctx: &WorkerCtx,
    config: &SweepConfig,
    driver: &mut dyn VnaDriver,
) -> Result<SweepResult, VnaError> {
    driver.connect().await?;

    ctx.cancel.checkpoint()?;
    ctx.phase(MeasurementPhase::Configuring, 15.0);
    ctx.progress("Configuring frequency...", 15.0);
    driver.configure_frequency().await?;
    ctx.progress("Configuring measurement settings...", 18.0);
    driver.configure_measurements().await?;
    ctx.progress("Setting up S-parameters...", 22.0);
    driver.setup_s_parameters().await?;

    ctx.cancel.checkpoint()?;
    ctx.phase(MeasurementPhase::Sweeping, 30.0);
    let trigger_state = driver.save_trigger_state().await?;
    driver.trigger_sweep().await?;
    wait_for_sweep(ctx, driver).await?;

    ctx.cancel.checkpoint()?;
    ctx.phase(MeasurementPhase::Reading, 50.0);
    ctx.progress("Reading frequency data...", 52.0);
    let frequencies = driver.read_frequency_axis().await?;

    let mut traces = BTreeMap::new();
    let total = config.sparams.len();
    for (idx, &param) in config.sparams.iter().enumerate() {
        ctx.cancel.checkpoint()?;
        let percent = 55.0 + 35.0 * idx as f32 / total as f32;
        ctx.progress(format!("Reading {param}..."), percent);
        let trace = driver
            .read_sparam(param)
            .await
            .map_err(|err| err.with_context(&format!("Reading {param}")))?;
        traces.insert(param, trace);
    }

    driver.restore_trigger_state(trigger_state).await?;

    SweepResult::new(driver.idn().to_string(), frequencies, traces)
}

/// Poll for sweep completion with a bounded budget.
///
/// A poll that times out counts against the budget and is retried: the
/// timeout is the taxonomy's one retryable error. Any other transport error
/// aborts the run. Cancellation is checked before every poll.
async fn wait_for_sweep(ctx: &WorkerCtx, driver: &mut dyn VnaDriver) -> Result<(), VnaError> {
    let max_polls =
        (SWEEP_TIMEOUT.as_millis() / SWEEP_POLL_INTERVAL.as_millis()).max(1) as u32;

    for poll in 0..max_polls {
        ctx.cancel.checkpoint()?;
        match driver.sweep_finished().await {
            Ok(true) => return Ok(()),
            Ok(false) | Err(VnaError::Timeout(_)) => {}
            Err(err) => return Err(err),
        }
        if poll % 10 == 0 {
            ctx.progress("Waiting for sweep completion...", 35.0);
        }
        sleep(SWEEP_POLL_INTERVAL).await;
    }

    Err(VnaError::Timeout(SWEEP_TIMEOUT))
}
