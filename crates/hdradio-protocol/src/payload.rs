//! Typed command bodies
//!
//! A [`Payload`] is the part of a message after the command and operation
//! codes. Which variants are legal depends on both the command's declared
//! [`PayloadKind`] and the operation:
//!
//! | operation | body |
//! |-----------|------|
//! | GET       | empty ([`Payload::None`]) |
//! | SET       | boolean, ranged integer, direct tune, tune step or seek |
//! | REPLY     | the command's declared kind |
//!
//! All multi-byte fields are 32-bit little-endian.

use tracing::warn;

use crate::command::{Operation, PayloadKind, RadioCommand};
use crate::error::{EncodeError, ParseError};
use crate::types::{Band, Direction, SeekRequest, SongInfo, TuneInfo};

/// Seek-mode word selecting every receivable station
const SEEK_MODE_ALL: i32 = 0;
/// Seek-mode word selecting HD stations only
const SEEK_MODE_HD_ONLY: i32 = 1;

/// Body of a message
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Payload {
    /// No body (GET requests)
    None,
    Integer(i32),
    Boolean(bool),
    Text(String),
    /// Station report, or a direct-tune request
    Tune(TuneInfo),
    /// Tune one step up or down
    TuneStep(Direction),
    Seek(SeekRequest),
    Song(SongInfo),
}

impl Payload {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Payload::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Payload::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Encode the body for `command`/`operation`, validating the payload
pub fn encode_body(
    command: RadioCommand,
    operation: Operation,
    payload: &Payload,
) -> Result<Vec<u8>, EncodeError> {
    if !command.allows(operation) {
        return Err(EncodeError::OperationNotAllowed { command, operation });
    }

    let mismatch = || EncodeError::PayloadMismatch {
        command,
        expected: command.kind(),
    };

    let mut body = Vec::with_capacity(16);
    match operation {
        Operation::Get => {
            if *payload != Payload::None {
                return Err(mismatch());
            }
        }
        Operation::Set => match (command, payload) {
            (RadioCommand::Power | RadioCommand::Mute, Payload::Boolean(on)) => {
                put_i32(&mut body, i32::from(*on));
            }
            (RadioCommand::Tune, Payload::Tune(info)) => {
                put_i32(&mut body, info.band.code());
                put_i32(&mut body, info.frequency);
                put_i32(&mut body, 0);
            }
            (RadioCommand::Tune, Payload::TuneStep(direction)) => {
                put_i32(&mut body, 0);
                put_i32(&mut body, 0);
                put_i32(&mut body, direction.code());
            }
            (RadioCommand::Seek, Payload::Seek(seek)) => {
                put_i32(&mut body, seek.band.code());
                put_i32(&mut body, 0);
                put_i32(&mut body, seek.direction.code());
                put_i32(
                    &mut body,
                    if seek.seek_all {
                        SEEK_MODE_ALL
                    } else {
                        SEEK_MODE_HD_ONLY
                    },
                );
            }
            (_, Payload::Integer(value)) if command.kind() == PayloadKind::Integer => {
                if let Some((min, max)) = command.set_range() {
                    if !(min..=max).contains(value) {
                        return Err(EncodeError::OutOfRange {
                            command,
                            value: *value,
                            min,
                            max,
                        });
                    }
                }
                put_i32(&mut body, *value);
            }
            _ => return Err(mismatch()),
        },
        Operation::Reply => match (command.kind(), payload) {
            (PayloadKind::Integer, Payload::Integer(value)) => put_i32(&mut body, *value),
            (PayloadKind::Boolean, Payload::Boolean(on)) => put_i32(&mut body, i32::from(*on)),
            (PayloadKind::String, Payload::Text(text)) => put_text(&mut body, text),
            (PayloadKind::TuneInfo, Payload::Tune(info)) => {
                put_i32(&mut body, info.band.code());
                put_i32(&mut body, info.frequency);
            }
            (PayloadKind::SongInfo, Payload::Song(song)) => {
                put_i32(&mut body, song.subchannel);
                put_text(&mut body, &song.text);
            }
            _ => return Err(mismatch()),
        },
    }
    Ok(body)
}

/// Decode a body for `command`/`operation`
///
/// A string length that disagrees with the bytes actually present is clamped
/// to the remaining bytes rather than rejected.
pub fn decode_body(
    command: RadioCommand,
    operation: Operation,
    body: &[u8],
) -> Result<Payload, ParseError> {
    let mut reader = BodyReader::new(body);
    match operation {
        Operation::Get => Ok(Payload::None),
        Operation::Set => match command {
            RadioCommand::Tune => {
                let band = reader.read_i32()?;
                let frequency = reader.read_i32()?;
                let trailer = reader.read_i32()?;
                if band == 0 && frequency == 0 {
                    Ok(Payload::TuneStep(Direction::try_from(trailer)?))
                } else {
                    Ok(Payload::Tune(TuneInfo::new(
                        Band::try_from(band)?,
                        frequency,
                        0,
                    )))
                }
            }
            RadioCommand::Seek => {
                let band = Band::try_from(reader.read_i32()?)?;
                let _reserved = reader.read_i32()?;
                let direction = Direction::try_from(reader.read_i32()?)?;
                let seek_all = reader.read_i32()? == SEEK_MODE_ALL;
                Ok(Payload::Seek(SeekRequest {
                    direction,
                    band,
                    seek_all,
                }))
            }
            _ => decode_kind(command, &mut reader),
        },
        Operation::Reply => decode_kind(command, &mut reader),
    }
}

fn decode_kind(command: RadioCommand, reader: &mut BodyReader<'_>) -> Result<Payload, ParseError> {
    match command.kind() {
        PayloadKind::Integer => Ok(Payload::Integer(reader.read_i32()?)),
        PayloadKind::Boolean => match reader.read_i32()? {
            0 => Ok(Payload::Boolean(false)),
            1 => Ok(Payload::Boolean(true)),
            other => Err(ParseError::InvalidBoolean(other)),
        },
        PayloadKind::String => Ok(Payload::Text(reader.read_text(command)?)),
        PayloadKind::TuneInfo => {
            let band = Band::try_from(reader.read_i32()?)?;
            let frequency = reader.read_i32()?;
            Ok(Payload::Tune(TuneInfo::new(band, frequency, 0)))
        }
        PayloadKind::SongInfo => {
            let subchannel = reader.read_i32()?;
            let text = reader.read_text(command)?;
            Ok(Payload::Song(SongInfo { subchannel, text }))
        }
    }
}

fn put_i32(body: &mut Vec<u8>, value: i32) {
    body.extend_from_slice(&value.to_le_bytes());
}

fn put_text(body: &mut Vec<u8>, text: &str) {
    put_i32(body, text.len() as i32);
    body.extend_from_slice(text.as_bytes());
}

/// Cursor over a message body
struct BodyReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_i32(&mut self) -> Result<i32, ParseError> {
        let end = self.pos + 4;
        let Some(chunk) = self.bytes.get(self.pos..end) else {
            return Err(ParseError::Incomplete {
                needed: end - self.bytes.len(),
            });
        };
        self.pos = end;
        Ok(i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }

    fn read_text(&mut self, command: RadioCommand) -> Result<String, ParseError> {
        let declared = self.read_i32()?;
        let remaining = self.remaining();
        if usize::try_from(declared).ok() != Some(remaining) {
            warn!(
                "{} string length {} does not match {} remaining bytes, clamping",
                command, declared, remaining
            );
        }
        let text = String::from_utf8_lossy(&self.bytes[self.pos..]).into_owned();
        self.pos = self.bytes.len();
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_get_has_no_body() {
        let body = encode_body(RadioCommand::Volume, Operation::Get, &Payload::None).unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn test_encode_set_bool() {
        let body =
            encode_body(RadioCommand::Power, Operation::Set, &Payload::Boolean(true)).unwrap();
        assert_eq!(body, vec![0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_encode_direct_tune() {
        let tune = TuneInfo::new(Band::Fm, 879, 3);
        let body = encode_body(RadioCommand::Tune, Operation::Set, &Payload::Tune(tune)).unwrap();
        assert_eq!(
            body,
            vec![0x01, 0x00, 0x00, 0x00, 0x6F, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_encode_tune_step() {
        let body = encode_body(
            RadioCommand::Tune,
            Operation::Set,
            &Payload::TuneStep(Direction::Down),
        )
        .unwrap();
        assert_eq!(&body[..8], &[0u8; 8]);
        assert_eq!(&body[8..], &[0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_seek_modes() {
        let seek = SeekRequest {
            direction: Direction::Up,
            band: Band::Am,
            seek_all: false,
        };
        let body = encode_body(RadioCommand::Seek, Operation::Set, &Payload::Seek(seek)).unwrap();
        assert_eq!(
            body,
            vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 1, 0, 0, 0]
        );

        let all = SeekRequest {
            seek_all: true,
            ..seek
        };
        let body = encode_body(RadioCommand::Seek, Operation::Set, &Payload::Seek(all)).unwrap();
        assert_eq!(&body[12..], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_rejects_out_of_range() {
        let err = encode_body(RadioCommand::Volume, Operation::Set, &Payload::Integer(91))
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::OutOfRange {
                command: RadioCommand::Volume,
                value: 91,
                min: 0,
                max: 90
            }
        );
        assert!(encode_body(RadioCommand::Bass, Operation::Set, &Payload::Integer(-1)).is_err());
        assert!(encode_body(RadioCommand::Treble, Operation::Set, &Payload::Integer(90)).is_ok());
    }

    #[test]
    fn test_encode_rejects_wrong_kind() {
        let err = encode_body(RadioCommand::Mute, Operation::Set, &Payload::Integer(1))
            .unwrap_err();
        assert!(matches!(err, EncodeError::PayloadMismatch { .. }));

        let err = encode_body(RadioCommand::Volume, Operation::Get, &Payload::Integer(1))
            .unwrap_err();
        assert!(matches!(err, EncodeError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_encode_rejects_unsupported_set() {
        let err = encode_body(
            RadioCommand::HdCallsign,
            Operation::Set,
            &Payload::Text("WXYZ".into()),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::OperationNotAllowed { .. }));
    }

    #[test]
    fn test_decode_invalid_boolean() {
        let body = 2i32.to_le_bytes();
        assert_eq!(
            decode_body(RadioCommand::HdActive, Operation::Reply, &body),
            Err(ParseError::InvalidBoolean(2))
        );
    }

    #[test]
    fn test_decode_short_integer() {
        assert_eq!(
            decode_body(RadioCommand::Volume, Operation::Reply, &[0x01, 0x00]),
            Err(ParseError::Incomplete { needed: 2 })
        );
    }

    #[test]
    fn test_decode_string_length_clamped() {
        let mut body = 10i32.to_le_bytes().to_vec();
        body.extend_from_slice(b"WXYZ");
        assert_eq!(
            decode_body(RadioCommand::HdCallsign, Operation::Reply, &body),
            Ok(Payload::Text("WXYZ".into()))
        );

        let mut body = 2i32.to_le_bytes().to_vec();
        body.extend_from_slice(b"KQED");
        assert_eq!(
            decode_body(RadioCommand::HdCallsign, Operation::Reply, &body),
            Ok(Payload::Text("KQED".into()))
        );
    }

    #[test]
    fn test_decode_song_info() {
        let mut body = 2i32.to_le_bytes().to_vec();
        body.extend_from_slice(&6i32.to_le_bytes());
        body.extend_from_slice(b"Song A");
        assert_eq!(
            decode_body(RadioCommand::HdTitle, Operation::Reply, &body),
            Ok(Payload::Song(SongInfo::new(2, "Song A")))
        );
    }

    #[test]
    fn test_decode_tune_reply_invalid_band() {
        let mut body = 7i32.to_le_bytes().to_vec();
        body.extend_from_slice(&879i32.to_le_bytes());
        assert_eq!(
            decode_body(RadioCommand::Tune, Operation::Reply, &body),
            Err(ParseError::InvalidBand(7))
        );
    }

    #[test]
    fn test_decode_set_tune_step() {
        let body = encode_body(
            RadioCommand::Tune,
            Operation::Set,
            &Payload::TuneStep(Direction::Up),
        )
        .unwrap();
        assert_eq!(
            decode_body(RadioCommand::Tune, Operation::Set, &body),
            Ok(Payload::TuneStep(Direction::Up))
        );
    }
}
