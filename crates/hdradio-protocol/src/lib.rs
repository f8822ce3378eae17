//! HD Radio Protocol Library
//!
//! This crate provides framing, encoding and incremental parsing for the
//! serial protocol spoken by HD Radio tuner modules (the DMHD-1000 family
//! found behind MJS-style USB cables and microcontroller bridges).
//!
//! # Architecture
//!
//! - [`command`]: the static command table (wire codes, payload kinds,
//!   permitted operations)
//! - [`payload`]: typed message bodies and their byte layouts
//! - [`codec`]: escaping, checksums and whole-frame encoding
//! - [`parser`]: a streaming parser that tolerates arbitrary chunking
//! - [`display`]: hex dumps and frame annotation for traffic logs
//!
//! Messages flow in both directions with the same framing: the host sends
//! GET and SET requests, the tuner answers with REPLY messages (and also
//! volunteers REPLYs whenever its state changes).
//!
//! # Example
//!
//! ```rust
//! use hdradio_protocol::{Message, Payload, RadioCommand, StreamParser};
//!
//! // Build the frame the tuner would send when its volume changes
//! let frame = Message::reply(RadioCommand::Volume, Payload::Integer(45))
//!     .encode()
//!     .unwrap();
//!
//! let mut parser = StreamParser::new();
//! for msg in parser.feed(&frame) {
//!     assert_eq!(msg.command, RadioCommand::Volume);
//!     assert_eq!(msg.payload, Payload::Integer(45));
//! }
//! ```

pub mod codec;
pub mod command;
pub mod display;
pub mod error;
pub mod parser;
pub mod payload;
pub mod types;

pub use codec::{decode, decode_payload, encode, encode_payload, Message};
pub use command::{Operation, PayloadKind, RadioCommand, SETTING_MAX, SETTING_MIN};
pub use error::{EncodeError, ParseError};
pub use parser::{ParserState, ParserStats, StreamParser};
pub use payload::Payload;
pub use types::{Band, Direction, SeekRequest, SongInfo, TuneInfo};
