//! Transport trait for tuner communication
//!
//! The [`Transport`] trait abstracts over the physical link to the tuner: the
//! MJS cable drives RTS/DTR directly, a microcontroller bridge emulates them
//! in-band, and the simulator answers in memory. The driver owns exactly one
//! transport per [`HdRadio`](crate::HdRadio) and shares it between the
//! receiver and the command scheduler.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::DeviceErrorKind;

/// Errors raised by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,

    #[error("no device found: {0}")]
    NoDevice(String),

    #[error("failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("read failed: {0}")]
    Read(#[source] std::io::Error),

    #[error("write failed: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to set {line} {state}: {reason}")]
    Line {
        line: ControlLine,
        state: bool,
        reason: String,
    },

    #[error("device disconnected")]
    Disconnected,

    #[error("detection failed: {0}")]
    Detect(#[from] hdradio_detect::DetectError),
}

impl TransportError {
    pub fn line(line: ControlLine, state: bool, reason: impl ToString) -> Self {
        Self::Line {
            line,
            state,
            reason: reason.to_string(),
        }
    }

    /// The device error reported when this ends a session
    pub fn kind(&self) -> DeviceErrorKind {
        match self {
            Self::Read(_) => DeviceErrorKind::DataRead,
            Self::Write(_) => DeviceErrorKind::DataWrite,
            Self::Line { line, state, .. } => line.error_kind(*state),
            _ => DeviceErrorKind::Connection,
        }
    }
}

/// Modem control lines wired to the tuner
///
/// RTS is the hardware mute, DTR is the power line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    Rts,
    Dtr,
}

impl ControlLine {
    pub fn error_kind(self, state: bool) -> DeviceErrorKind {
        match (self, state) {
            (Self::Rts, true) => DeviceErrorKind::RtsSet,
            (Self::Rts, false) => DeviceErrorKind::RtsClear,
            (Self::Dtr, true) => DeviceErrorKind::DtrSet,
            (Self::Dtr, false) => DeviceErrorKind::DtrClear,
        }
    }
}

impl std::fmt::Display for ControlLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rts => f.write_str("RTS"),
            Self::Dtr => f.write_str("DTR"),
        }
    }
}

/// Byte-level link to a tuner
///
/// `read` must not wait for data: it returns whatever is pending (possibly
/// nothing) so the receiver can release the transport between polls.
#[async_trait]
pub trait Transport: Send {
    /// Open the first matching device
    async fn open(&mut self) -> Result<(), TransportError>;

    /// Open the device with the given identifier
    async fn open_by_id(&mut self, id: &str) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Take up to `max` pending bytes without waiting
    async fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError>;

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    async fn set_line(&mut self, line: ControlLine, state: bool) -> Result<(), TransportError>;

    /// Identifiers of every device this transport could open
    fn list_devices(&self) -> Result<Vec<String>, TransportError>;

    /// Identifier of the open device
    fn identifier(&self) -> Option<String>;

    /// Mute the tuner
    async fn raise_rts(&mut self) -> Result<(), TransportError> {
        self.set_line(ControlLine::Rts, true).await
    }

    async fn clear_rts(&mut self) -> Result<(), TransportError> {
        self.set_line(ControlLine::Rts, false).await
    }

    /// Switch the tuner on
    async fn raise_dtr(&mut self) -> Result<(), TransportError> {
        self.set_line(ControlLine::Dtr, true).await
    }

    async fn clear_dtr(&mut self) -> Result<(), TransportError> {
        self.set_line(ControlLine::Dtr, false).await
    }
}
