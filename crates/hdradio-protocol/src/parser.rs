//! Incremental frame parser
//!
//! The tuner delivers bytes in arbitrary chunks, so the parser keeps its
//! position inside the current frame between calls. Input is buffered by
//! [`StreamParser::push_bytes`] and consumed lazily: each call to
//! [`StreamParser::next_message`] runs the state machine only until the next
//! valid frame is complete.
//!
//! Bad frames never surface as errors. A checksum mismatch, an undecodable
//! payload or a header arriving mid-frame drops the frame in progress and
//! the parser resynchronizes on the next `0xA4`.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::codec::{checksum, decode_payload, Message, ESCAPE, ESCAPED_HEADER, HEADER};
use crate::display::hex_dump;
use crate::error::ParseError;

/// Position of the parser within a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for a header byte; anything else is discarded
    Idle,
    /// Header seen, next byte is the length
    AwaitingLength,
    /// Collecting payload bytes
    AwaitingPayload { remaining: usize },
    /// Payload complete, next byte is the checksum
    AwaitingChecksum,
}

/// Counters for frames seen by a parser
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParserStats {
    /// Frames that passed the checksum and decoded
    pub decoded: u64,
    /// Frames dropped for a checksum mismatch
    pub checksum_errors: u64,
    /// Frames dropped for any other reason (restart, empty, undecodable)
    pub dropped: u64,
}

/// Streaming HD Radio frame parser
#[derive(Debug)]
pub struct StreamParser {
    input: VecDeque<u8>,
    state: ParserState,
    escape_pending: bool,
    length: u8,
    payload: Vec<u8>,
    raw: Vec<u8>,
    stats: ParserStats,
}

impl StreamParser {
    /// Create a new parser in the idle state
    pub fn new() -> Self {
        Self {
            input: VecDeque::with_capacity(256),
            state: ParserState::Idle,
            escape_pending: false,
            length: 0,
            payload: Vec::with_capacity(256),
            raw: Vec::with_capacity(264),
            stats: ParserStats::default(),
        }
    }

    /// Current state machine position
    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn stats(&self) -> ParserStats {
        self.stats
    }

    /// Number of buffered bytes not yet run through the state machine
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Buffer `data` and return an iterator over the messages it completes
    ///
    /// The iterator is lazy; bytes not consumed before it is dropped stay
    /// buffered for the next call.
    pub fn feed(&mut self, data: &[u8]) -> Messages<'_> {
        self.input.extend(data);
        Messages { parser: self }
    }

    /// Push raw bytes into the parser's buffer
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.input.extend(data);
    }

    /// Run the state machine until a message is complete or input runs out
    pub fn next_message(&mut self) -> Option<Message> {
        self.next_message_with_bytes().map(|(msg, _)| msg)
    }

    /// Like [`next_message`](Self::next_message), also returning the frame's raw bytes
    pub fn next_message_with_bytes(&mut self) -> Option<(Message, Vec<u8>)> {
        while let Some(byte) = self.input.pop_front() {
            let Some(payload) = self.step(byte) else {
                continue;
            };
            let raw = std::mem::take(&mut self.raw);
            match decode_payload(&payload) {
                Ok(msg) => {
                    self.stats.decoded += 1;
                    trace!("Decoded {} {}: {:?}", msg.command, msg.operation, msg.payload);
                    return Some((msg, raw));
                }
                Err(e) => {
                    self.stats.dropped += 1;
                    debug!("Dropping frame [{}]: {}", hex_dump(&raw), e);
                }
            }
        }
        None
    }

    fn reset_frame(&mut self) {
        self.escape_pending = false;
        self.length = 0;
        self.payload.clear();
        self.raw.clear();
    }

    /// Feed one wire byte; returns the unescaped payload when a frame validates
    fn step(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == HEADER {
            if self.state != ParserState::Idle {
                self.stats.dropped += 1;
                debug!(
                    "Header received mid-frame, discarding {} buffered bytes",
                    self.raw.len()
                );
            }
            self.reset_frame();
            self.raw.push(byte);
            self.state = ParserState::AwaitingLength;
            return None;
        }

        if self.state == ParserState::Idle {
            trace!("Discarding byte 0x{:02X} received outside a frame", byte);
            return None;
        }

        self.raw.push(byte);
        if byte == ESCAPE && !self.escape_pending {
            self.escape_pending = true;
            return None;
        }
        let byte = if std::mem::take(&mut self.escape_pending) && byte == ESCAPED_HEADER {
            HEADER
        } else {
            byte
        };

        match self.state {
            ParserState::Idle => None,
            ParserState::AwaitingLength => {
                if byte == 0 {
                    self.stats.dropped += 1;
                    debug!("Zero-length frame, discarding");
                    self.state = ParserState::Idle;
                    return None;
                }
                self.length = byte;
                self.state = ParserState::AwaitingPayload {
                    remaining: byte as usize,
                };
                None
            }
            ParserState::AwaitingPayload { remaining } => {
                self.payload.push(byte);
                self.state = if remaining > 1 {
                    ParserState::AwaitingPayload {
                        remaining: remaining - 1,
                    }
                } else {
                    ParserState::AwaitingChecksum
                };
                None
            }
            ParserState::AwaitingChecksum => {
                self.state = ParserState::Idle;
                let expected = checksum(self.length, &self.payload);
                if expected == byte {
                    Some(std::mem::take(&mut self.payload))
                } else {
                    self.stats.checksum_errors += 1;
                    let err = ParseError::ChecksumMismatch {
                        expected,
                        actual: byte,
                    };
                    debug!("Dropping frame [{}]: {}", hex_dump(&self.raw), err);
                    None
                }
            }
        }
    }
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Messages completed by the bytes handed to [`StreamParser::feed`]
pub struct Messages<'a> {
    parser: &'a mut StreamParser,
}

impl Iterator for Messages<'_> {
    type Item = Message;

    fn next(&mut self) -> Option<Message> {
        self.parser.next_message()
    }
}
