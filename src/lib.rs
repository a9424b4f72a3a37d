//! # rust_vna Core Library
//!
//! This crate is the instrument-control core for driving a SCPI vector
//! network analyzer (VNA) over TCP/IP: it connects to the instrument,
//! auto-detects a driver from the `*IDN?` reply, runs a frequency sweep on a
//! background task, and serializes the measured S-parameters as a Touchstone
//! `.s2p` file. Frontends (terminal UI, plotting, the bundled CLI) consume
//! only the configuration, progress-event, and result types exposed here.
//!
//! ## Crate Structure
//!
//! - **`config`**: the `SweepConfig` value object describing the connection
//!   target and sweep parameters, with fail-fast validation.
//! - **`driver`**: the `VnaDriver` capability contract, the SCPI command
//!   builders, the built-in E5071-family driver, and the `DriverRegistry`
//!   that maps identification strings to drivers.
//! - **`error`**: the `VnaError` enum carrying the stable error taxonomy
//!   every fatal outcome is reported with.
//! - **`filter`**: percentile-based outlier clipping applied to magnitudes
//!   before display (never before export).
//! - **`measurement`**: sweep data types (`SParam`, `Trace`, `SweepResult`).
//! - **`settings`**: JSON-persisted application settings with host history.
//! - **`touchstone`**: Touchstone `.s2p` export and import.
//! - **`transport`**: the line-framed SCPI request/reply transport over TCP,
//!   plus the scripted mock instrument used by tests.
//! - **`worker`**: the single-flight measurement orchestrator running the
//!   connect → detect → configure → sweep → read state machine on a
//!   background tokio task.

pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod measurement;
pub mod settings;
pub mod touchstone;
pub mod transport;
pub mod worker;
