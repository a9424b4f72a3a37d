//! SCPI transport layer.
//!
//! A transport is a byte/text pipe with line framing and bounded waits,
//! nothing more. It appends the instrument's terminator to every outbound
//! command, reads replies up to the terminator, and classifies failures as
//! either a retryable [`VnaError::Timeout`] or a fatal
//! [`VnaError::Connection`]. Payload interpretation belongs to the drivers.
//!
//! Every byte sent and received can be observed through a [`WireTap`]
//! callback so frontends can show a live SCPI log; the transport itself
//! holds no log state.
//!
//! The [`TransportConnector`] seam lets the measurement worker open
//! transports without naming a concrete type: [`TcpConnector`] dials the
//! instrument's raw SCPI socket, while [`MockConnector`] hands out the
//! scripted instrument used in tests.

pub mod mock;
pub mod tcp;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::SweepConfig;
use crate::error::VnaError;

pub use mock::{MockConnector, MockFailure, MockTransport};
pub use tcp::{TcpConnector, TcpTransport};

/// Direction of a logged SCPI exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireDirection {
    /// Sent to the instrument.
    Tx,
    /// Received from the instrument.
    Rx,
}

/// Longest text echoed to the wire tap before truncation.
pub const WIRE_LOG_TRUNCATE: usize = 200;

/// Callback observing every command and reply as it crosses the wire.
///
/// Invoked from the worker task; implementations must be cheap and must not
/// block.
pub type WireTap = Arc<dyn Fn(WireDirection, &str) + Send + Sync>;

/// Bounded waits applied to every transport operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTimeouts {
    /// Budget for establishing the connection.
    pub connect: Duration,
    /// Budget for reading one reply.
    pub read: Duration,
    /// Budget for writing one command.
    pub write: Duration,
}

impl Default for TransportTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(5),
            write: Duration::from_secs(5),
        }
    }
}

/// Line-framed SCPI request/reply exchange.
#[async_trait]
pub trait ScpiTransport: Send {
    /// Send a command without expecting a reply.
    async fn send(&mut self, command: &str) -> Result<(), VnaError>;

    /// Send a command and read one terminator-delimited reply.
    async fn query(&mut self, command: &str) -> Result<String, VnaError>;

    /// Close the connection.
    async fn close(&mut self) -> Result<(), VnaError>;
}

/// Opens transports for the measurement worker.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Open a transport to the instrument described by `config`.
    async fn connect(
        &self,
        config: &SweepConfig,
        tap: Option<WireTap>,
    ) -> Result<Box<dyn ScpiTransport>, VnaError>;
}

/// Truncate wire-tap text to [`WIRE_LOG_TRUNCATE`] characters.
pub(crate) fn truncated(text: &str) -> &str {
    match text.char_indices().nth(WIRE_LOG_TRUNCATE) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
