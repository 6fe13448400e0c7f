//! Error taxonomy of the peripheral.
//!
//! Everything in [`PeripheralError`] except `Teardown` is fatal during
//! `start()`. Teardown failures are only ever logged.

use crate::domain::models::RegistrationStep;
use std::time::Duration;
use thiserror::Error;

/// A named error reply from the Bluetooth daemon.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[{name}] {message}")]
pub struct DaemonError {
    pub name: String,
    pub message: String,
}

impl DaemonError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PeripheralError {
    #[error("cannot acquire bus connection: {0}")]
    Connection(String),

    #[error("cannot export {path}: {reason}")]
    Export { path: String, reason: String },

    #[error("{step} did not complete within {timeout:?}")]
    RegistrationTimeout {
        step: RegistrationStep,
        timeout: Duration,
    },

    #[error("{step}: {source}")]
    RegistrationRejected {
        step: RegistrationStep,
        #[source]
        source: DaemonError,
    },

    #[error("dispatch loop must be running before registration")]
    DispatchNotRunning,

    #[error("adapter: {0}")]
    Adapter(String),

    #[error("cannot start sampler: {0}")]
    Sampler(#[from] std::io::Error),

    #[error("teardown: {0}")]
    Teardown(String),
}

impl PeripheralError {
    pub fn export(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Export {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Soft failure reading the sensor; the sampler skips the cycle.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    #[error("unparsable sensor reading {0:?}")]
    Parse(String),
}
