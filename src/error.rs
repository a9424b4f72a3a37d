//! Custom error types for the measurement engine.
//!
//! This module defines the primary error type, `VnaError`, used across the
//! crate. Using the `thiserror` crate, it provides one centralized taxonomy
//! so every fatal outcome reaches the caller as a stable, matchable kind
//! rather than a bare message:
//!
//! - **`Connection`**: socket-level failure (unreachable host, reset, closed
//!   connection). Fatal to the session.
//! - **`Timeout`**: the instrument did not answer within the configured
//!   window. Retryable at the call site; the transport itself never retries.
//! - **`Protocol`**: a malformed or unexpected response, usually a
//!   driver/instrument mismatch. Fatal to the session.
//! - **`UnsupportedInstrument`**: no registered driver matched the `*IDN?`
//!   reply. User-actionable (add or fix a driver).
//! - **`Busy`**: a measurement is already in flight. Fatal only to the new
//!   request; the running session is unaffected.
//! - **`Export`**: filesystem or data-shape failure while writing a
//!   Touchstone file. Does not invalidate the in-memory sweep result.
//! - **`Cancelled`**: the user cancelled the measurement. Not a failure.
//! - **`Config`**: validation rejected the configuration before any
//!   connection attempt.
//! - **`DuplicateDriver`**: a driver name was registered twice.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type VnaResult<T> = std::result::Result<T, VnaError>;

/// Error taxonomy for transport, driver, worker, and export operations.
#[derive(Debug, Error)]
pub enum VnaError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Instrument did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("No driver matches instrument identification '{0}'")]
    UnsupportedInstrument(String),

    #[error("A measurement is already in progress")]
    Busy,

    #[error("Export failed: {0}")]
    Export(String),

    #[error("Measurement cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Driver '{0}' is already registered")]
    DuplicateDriver(String),
}

impl VnaError {
    /// Whether the operation may be retried at the call site.
    ///
    /// Only timeouts are retryable; everything else either ends the session
    /// or requires user action first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VnaError::Timeout(_))
    }

    /// Prefix the message of a message-carrying variant with `context`.
    ///
    /// The variant (and therefore the classification) is preserved; kinds
    /// without a message payload pass through unchanged.
    pub fn with_context(self, context: &str) -> Self {
        match self {
            VnaError::Connection(msg) => VnaError::Connection(format!("{context}: {msg}")),
            VnaError::Protocol(msg) => VnaError::Protocol(format!("{context}: {msg}")),
            VnaError::Export(msg) => VnaError::Export(format!("{context}: {msg}")),
            VnaError::Config(msg) => VnaError::Config(format!("{context}: {msg}")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(VnaError::Timeout(Duration::from_secs(5)).is_retryable());
        assert!(!VnaError::Connection("reset".into()).is_retryable());
        assert!(!VnaError::Busy.is_retryable());
        assert!(!VnaError::Cancelled.is_retryable());
    }

    #[test]
    fn context_preserves_the_variant() {
        let err = VnaError::Connection("reset by peer".into()).with_context("Reading S21");
        match err {
            VnaError::Connection(msg) => assert_eq!(msg, "Reading S21: reset by peer"),
            other => panic!("unexpected variant: {:?}", other),
        }

        let timeout = VnaError::Timeout(Duration::from_secs(1)).with_context("Reading S21");
        assert!(matches!(timeout, VnaError::Timeout(_)));
    }

    #[test]
    fn unsupported_instrument_names_the_idn() {
        let err = VnaError::UnsupportedInstrument("ACME,WIDGET,1,1.0".into());
        assert!(err.to_string().contains("ACME,WIDGET"));
    }
}
