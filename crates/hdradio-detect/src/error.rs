//! Error types for device detection

use thiserror::Error;

/// Errors that can occur during detection
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// No port matched the requested identifier
    #[error("no device with identifier {0}")]
    NotFound(String),

    /// The bridge did not answer the identification request in time
    #[error("timeout waiting for bridge id on {0}")]
    Timeout(String),

    /// The bridge answered with something that is not an id
    #[error("unexpected bridge id response: {0:?}")]
    BadResponse(String),

    /// I/O error during the handshake
    #[error("I/O error on {port}: {reason}")]
    IoError { port: String, reason: String },

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
