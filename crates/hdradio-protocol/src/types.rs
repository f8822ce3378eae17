//! Value types carried in command payloads

use std::fmt;

use crate::error::ParseError;

/// Broadcast band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Band {
    Am,
    #[default]
    Fm,
}

impl Band {
    /// 32-bit wire code
    pub const fn code(self) -> i32 {
        match self {
            Band::Am => 0,
            Band::Fm => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Band::Am => "AM",
            Band::Fm => "FM",
        }
    }
}

impl TryFrom<i32> for Band {
    type Error = ParseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Band::Am),
            1 => Ok(Band::Fm),
            other => Err(ParseError::InvalidBand(other)),
        }
    }
}

impl std::str::FromStr for Band {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("AM") {
            Ok(Band::Am)
        } else if s.eq_ignore_ascii_case("FM") {
            Ok(Band::Fm)
        } else {
            Err(ParseError::UnknownBandName(s.to_string()))
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Step direction for tune and seek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// 32-bit wire code (DOWN is all ones)
    pub const fn code(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

impl TryFrom<i32> for Direction {
    type Error = ParseError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Direction::Up),
            -1 => Ok(Direction::Down),
            other => Err(ParseError::InvalidDirection(other)),
        }
    }
}

/// A tuned station
///
/// `frequency` is in device units: tenths of a MHz on FM (879 = 87.9 MHz),
/// kHz on AM. `subchannel` is not part of the direct-tune wire body; the
/// subchannel is selected with a separate command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TuneInfo {
    pub band: Band,
    pub frequency: i32,
    pub subchannel: i32,
}

impl TuneInfo {
    pub const fn new(band: Band, frequency: i32, subchannel: i32) -> Self {
        Self {
            band,
            frequency,
            subchannel,
        }
    }

    /// Same station with a different subchannel
    pub const fn with_subchannel(self, subchannel: i32) -> Self {
        Self { subchannel, ..self }
    }
}

impl Default for TuneInfo {
    fn default() -> Self {
        Self::new(Band::Fm, 879, 0)
    }
}

impl fmt::Display for TuneInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.band {
            Band::Fm => write!(
                f,
                "FM {}.{}",
                self.frequency / 10,
                self.frequency.rem_euclid(10)
            )?,
            Band::Am => write!(f, "AM {}", self.frequency)?,
        }
        if self.subchannel > 0 {
            write!(f, " HD{}", self.subchannel)?;
        }
        Ok(())
    }
}

/// Title or artist text scoped to one HD subchannel
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SongInfo {
    pub subchannel: i32,
    pub text: String,
}

impl SongInfo {
    pub fn new(subchannel: i32, text: impl Into<String>) -> Self {
        Self {
            subchannel,
            text: text.into(),
        }
    }
}

/// Parameters of a seek
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeekRequest {
    pub direction: Direction,
    pub band: Band,
    /// Stop at any receivable station rather than only HD stations
    pub seek_all: bool,
}
