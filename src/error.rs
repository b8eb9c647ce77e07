/// Error types for bus, sensor, file and configuration failures
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single sensor or multiplexer transaction
///
/// These are caught at the read call site by the sampling loop and only
/// degrade one role for one tick.
#[derive(Debug, Error)]
pub enum SensorError {
    /// Bus transaction failed or timed out
    #[error("I2C transaction with 0x{address:02x} failed: {message}")]
    HardwareIo { address: u16, message: String },

    /// Sensor answered but has no new data yet
    #[error("{sensor} has no new data")]
    Unavailable { sensor: &'static str },

    /// Sensor answered with a frame that failed validation
    #[error("invalid data from {sensor}: {message}")]
    InvalidData {
        sensor: &'static str,
        message: String,
    },
}

impl SensorError {
    pub fn hardware(address: u16, err: impl std::fmt::Display) -> Self {
        SensorError::HardwareIo {
            address,
            message: err.to_string(),
        }
    }

    pub fn invalid(sensor: &'static str, message: impl Into<String>) -> Self {
        SensorError::InvalidData {
            sensor,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Sensor(#[from] SensorError),

    #[error("file I/O error on {}: {source}", path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error on {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::FileIo {
            path: path.into(),
            source,
        }
    }

    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Error::Csv {
            path: path.into(),
            source,
        }
    }
}
