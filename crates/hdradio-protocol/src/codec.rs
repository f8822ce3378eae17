//! Packet framing
//!
//! # Frame Format
//! ```text
//! A4 [len] [cmd lo] [cmd hi] [op lo] [op hi] [body...] [checksum]
//! ```
//!
//! - `A4`: Header, never escaped
//! - `len`: Length of the unescaped payload (command + operation + body), mod 256
//! - `cmd`/`op`: 16-bit little-endian command and operation codes
//! - `body`: Typed payload, see [`crate::payload`]
//! - `checksum`: `(0xA4 + len + sum(payload)) mod 256`
//!
//! Every byte after the header (length and checksum included) is escaped:
//! `1B` is sent as `1B 1B` and `A4` is sent as `1B 48`. The header byte
//! therefore only ever appears at the start of a frame.

use crate::command::{Operation, RadioCommand};
use crate::error::{EncodeError, ParseError};
use crate::payload::{decode_body, encode_body, Payload};

/// Frame header byte
pub const HEADER: u8 = 0xA4;
/// Escape introducer
pub const ESCAPE: u8 = 0x1B;
/// Escaped stand-in for a header byte inside a frame
pub const ESCAPED_HEADER: u8 = 0x48;
/// Largest payload the single length byte can describe
pub const MAX_PAYLOAD_LEN: usize = 255;
/// Command code plus operation code
pub const PREFIX_LEN: usize = 4;

/// One logical message: a command, an operation and its typed payload
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    pub command: RadioCommand,
    pub operation: Operation,
    pub payload: Payload,
}

impl Message {
    pub fn new(command: RadioCommand, operation: Operation, payload: Payload) -> Self {
        Self {
            command,
            operation,
            payload,
        }
    }

    /// GET request for `command`
    pub fn get(command: RadioCommand) -> Self {
        Self::new(command, Operation::Get, Payload::None)
    }

    /// SET request for `command`
    pub fn set(command: RadioCommand, payload: Payload) -> Self {
        Self::new(command, Operation::Set, payload)
    }

    /// REPLY from the tuner for `command`
    pub fn reply(command: RadioCommand, payload: Payload) -> Self {
        Self::new(command, Operation::Reply, payload)
    }

    /// Encode to a complete escaped frame
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        encode(self.command, self.operation, &self.payload)
    }
}

/// Encode a message to a complete escaped, checksummed frame
pub fn encode(
    command: RadioCommand,
    operation: Operation,
    payload: &Payload,
) -> Result<Vec<u8>, EncodeError> {
    let raw = encode_payload(command, operation, payload)?;
    Ok(frame(&raw))
}

/// Build the unescaped payload: command code, operation code, body
pub fn encode_payload(
    command: RadioCommand,
    operation: Operation,
    payload: &Payload,
) -> Result<Vec<u8>, EncodeError> {
    let body = encode_body(command, operation, payload)?;
    let len = PREFIX_LEN + body.len();
    if len > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLong(len));
    }

    let mut raw = Vec::with_capacity(len);
    raw.extend_from_slice(&command.code().to_le_bytes());
    raw.extend_from_slice(&operation.code().to_le_bytes());
    raw.extend_from_slice(&body);
    Ok(raw)
}

/// Wrap an unescaped payload in header, length and checksum, escaping as needed
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let length = (payload.len() % 256) as u8;
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.push(HEADER);
    escape_into(&mut out, length);
    for &byte in payload {
        escape_into(&mut out, byte);
    }
    escape_into(&mut out, checksum(length, payload));
    out
}

/// `(0xA4 + length + sum(payload)) mod 256`
pub fn checksum(length: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(HEADER.wrapping_add(length), |acc, &b| acc.wrapping_add(b))
}

fn escape_into(out: &mut Vec<u8>, byte: u8) {
    match byte {
        ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPE]),
        HEADER => out.extend_from_slice(&[ESCAPE, ESCAPED_HEADER]),
        other => out.push(other),
    }
}

/// Decode a typed body for `command`
pub fn decode(
    command: RadioCommand,
    operation: Operation,
    body: &[u8],
) -> Result<Payload, ParseError> {
    decode_body(command, operation, body)
}

/// Decode an unescaped payload (command code, operation code, body)
pub fn decode_payload(payload: &[u8]) -> Result<Message, ParseError> {
    if payload.len() < PREFIX_LEN {
        return Err(ParseError::InvalidFrame(format!(
            "payload of {} bytes is shorter than its command prefix",
            payload.len()
        )));
    }
    let command = RadioCommand::try_from(u16::from_le_bytes([payload[0], payload[1]]))?;
    let operation = Operation::try_from(u16::from_le_bytes([payload[2], payload[3]]))?;
    let payload = decode(command, operation, &payload[PREFIX_LEN..])?;
    Ok(Message {
        command,
        operation,
        payload,
    })
}
