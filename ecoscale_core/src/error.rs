use thiserror::Error;

/// Categorized failure of a single transducer read.
///
/// `Transient` failures are absorbed inside a burst by substituting the previous
/// sample. `Unavailable` failures switch the engine to synthetic data for the rest of
/// the process lifetime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("transient sensor error: {0}")]
    Transient(String),
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
}

impl SensorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SensorError::Transient(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("weight requested before tare completed")]
    NotCalibrated,
}

/// Link failures. All are non-fatal: the connection is simply left down.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("no serial port matching the device signature was found")]
    NoPort,
    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },
    #[error("not connected")]
    NotConnected,
    #[error("write failed: {0}")]
    Write(String),
}

/// Why a classification request was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("analysis already in progress")]
    Busy,
    #[error("no camera frame available")]
    NoFrame,
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
