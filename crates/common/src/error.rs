//! Error types shared by the agent crates

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Device directory error: {0}")]
    Directory(String),

    #[error("Snapshot {path}: {reason}")]
    Snapshot { path: String, reason: String },

    /// Opening or configuring a serial port failed
    #[error("Serial port {port}: {reason}")]
    Serial { port: String, reason: String },

    #[error("Endpoint {0} is not available")]
    Unavailable(String),

    #[error("Write to {0} failed")]
    WriteFailed(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn serial(port: &str, reason: impl std::fmt::Display) -> Self {
        Error::Serial {
            port: port.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn snapshot(path: &std::path::Path, reason: impl std::fmt::Display) -> Self {
        Error::Snapshot {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
