//! Error types for HD Radio frame parsing and encoding

use thiserror::Error;

use crate::command::{Operation, PayloadKind, RadioCommand};

/// Errors that can occur while parsing protocol data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Payload is shorter than its fixed-width fields require
    #[error("incomplete data: need {needed} more bytes")]
    Incomplete { needed: usize },

    /// Invalid frame structure
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Command code not present in the command table
    #[error("unknown command: 0x{0:04X}")]
    UnknownCommand(u16),

    /// Operation code other than SET, GET or REPLY
    #[error("unknown operation: 0x{0:04X}")]
    UnknownOperation(u16),

    /// Boolean field holding something other than 0 or 1
    #[error("invalid boolean value: {0}")]
    InvalidBoolean(i32),

    /// Band code other than AM or FM
    #[error("invalid band code: {0}")]
    InvalidBand(i32),

    /// Band name other than AM or FM
    #[error("unknown band name: {0:?}")]
    UnknownBandName(String),

    /// Tune or seek direction other than UP or DOWN
    #[error("invalid direction code: {0}")]
    InvalidDirection(i32),

    /// Checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

/// Errors that can occur while encoding a request
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Payload variant does not match what the command carries
    #[error("{command} expects a {expected} payload")]
    PayloadMismatch {
        command: RadioCommand,
        expected: PayloadKind,
    },

    /// Operation the command does not support
    #[error("{operation} is not supported for {command}")]
    OperationNotAllowed {
        command: RadioCommand,
        operation: Operation,
    },

    /// Integer outside of the command's accepted range
    #[error("{command} value {value} out of range {min}..={max}")]
    OutOfRange {
        command: RadioCommand,
        value: i32,
        min: i32,
        max: i32,
    },

    /// Encoded payload does not fit the single length byte
    #[error("payload of {0} bytes exceeds frame capacity")]
    PayloadTooLong(usize),
}
