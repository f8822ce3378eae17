//! Error types for the driver

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::TransportError;

/// Errors surfaced to the application through `onDeviceError`
///
/// Each kind leaves the driver in a defined state: transport kinds close the
/// session, `PowerTimeout` leaves it open and powered off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceErrorKind {
    DataRead,
    DataWrite,
    RtsSet,
    RtsClear,
    DtrSet,
    DtrClear,
    Connection,
    PowerTimeout,
}

impl std::fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::DataRead => "data read error",
            Self::DataWrite => "data write error",
            Self::RtsSet => "failed to raise RTS",
            Self::RtsClear => "failed to clear RTS",
            Self::DtrSet => "failed to raise DTR",
            Self::DtrClear => "failed to clear DTR",
            Self::Connection => "connection lost",
            Self::PowerTimeout => "tuner did not confirm power on",
        };
        f.write_str(s)
    }
}

/// Errors returned by driver calls
#[derive(Debug, Error)]
pub enum DriverError {
    /// No open session
    #[error("not connected")]
    NotConnected,

    /// Opening the transport failed
    #[error("open failed: {0}")]
    OpenFailed(#[source] TransportError),

    /// Transport failure during a session
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The request could not be encoded
    #[error("encode error: {0}")]
    Encode(#[from] hdradio_protocol::EncodeError),

    /// The tuner never confirmed power on
    #[error("power on timed out")]
    PowerTimeout,

    /// Settings could not be read or written
    #[error("settings error: {0}")]
    Settings(String),
}

impl DriverError {
    /// Device error to report for this failure, if it is reported at all
    pub fn device_error(&self) -> Option<DeviceErrorKind> {
        match self {
            Self::Transport(e) => Some(e.kind()),
            Self::PowerTimeout => Some(DeviceErrorKind::PowerTimeout),
            _ => None,
        }
    }
}
