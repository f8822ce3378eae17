//! Error types for the simulator

use hdradio_protocol::{EncodeError, Operation, RadioCommand, TuneInfo};
use thiserror::Error;

/// Reasons the virtual tuner refuses a request
#[derive(Debug, Error)]
pub enum SimError {
    #[error("tuner is powered off, ignoring {0}")]
    NotPowered(RadioCommand),

    #[error("{operation} {command} is not supported")]
    Unsupported {
        command: RadioCommand,
        operation: Operation,
    },

    #[error("no station found seeking from {0}")]
    NoStation(TuneInfo),

    #[error("subchannel {0} is not available")]
    NoSubchannel(i32),

    #[error("failed to encode reply: {0}")]
    Encode(#[from] EncodeError),
}
