//! Command table for the HD Radio tuner
//!
//! Every command is identified on the wire by a 16-bit little-endian code and
//! carries exactly one kind of payload. The low byte is the item within a
//! group, the high byte is the group (power, tuner, HD, RDS, audio).

use std::fmt;

use crate::error::ParseError;

/// Commands understood by the tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RadioCommand {
    Power,
    Mute,
    SignalStrength,
    Tune,
    Seek,
    HdActive,
    HdStreamLock,
    HdSignalStrength,
    HdSubchannel,
    HdSubchannelCount,
    HdEnableHdTuner,
    HdTitle,
    HdArtist,
    HdCallsign,
    HdStationName,
    HdUniqueId,
    HdApiVersion,
    HdHwVersion,
    RdsEnabled,
    RdsGenre,
    RdsProgramService,
    RdsRadioText,
    Volume,
    Bass,
    Treble,
    Compression,
}

/// Kind of data a command carries in its body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PayloadKind {
    Integer,
    Boolean,
    String,
    TuneInfo,
    SongInfo,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Integer => "integer",
            PayloadKind::Boolean => "boolean",
            PayloadKind::String => "string",
            PayloadKind::TuneInfo => "tune info",
            PayloadKind::SongInfo => "song info",
        };
        f.write_str(name)
    }
}

/// Operation carried next to the command code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operation {
    /// Host asks the tuner to change a value
    Set,
    /// Host asks the tuner to report a value
    Get,
    /// Tuner reports a value
    Reply,
}

impl Operation {
    /// 16-bit wire code
    pub const fn code(self) -> u16 {
        match self {
            Operation::Set => 0x0000,
            Operation::Get => 0x0001,
            Operation::Reply => 0x0002,
        }
    }
}

impl TryFrom<u16> for Operation {
    type Error = ParseError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(Self::Set),
            0x0001 => Ok(Self::Get),
            0x0002 => Ok(Self::Reply),
            other => Err(ParseError::UnknownOperation(other)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Set => "SET",
            Operation::Get => "GET",
            Operation::Reply => "REPLY",
        };
        f.write_str(name)
    }
}

/// Lowest value accepted by the ranged integer setters
pub const SETTING_MIN: i32 = 0;
/// Highest value accepted by the ranged integer setters
pub const SETTING_MAX: i32 = 90;

impl RadioCommand {
    /// Every command, in table order
    pub const ALL: [RadioCommand; 26] = [
        RadioCommand::Power,
        RadioCommand::Mute,
        RadioCommand::SignalStrength,
        RadioCommand::Tune,
        RadioCommand::Seek,
        RadioCommand::HdActive,
        RadioCommand::HdStreamLock,
        RadioCommand::HdSignalStrength,
        RadioCommand::HdSubchannel,
        RadioCommand::HdSubchannelCount,
        RadioCommand::HdEnableHdTuner,
        RadioCommand::HdTitle,
        RadioCommand::HdArtist,
        RadioCommand::HdCallsign,
        RadioCommand::HdStationName,
        RadioCommand::HdUniqueId,
        RadioCommand::HdApiVersion,
        RadioCommand::HdHwVersion,
        RadioCommand::RdsEnabled,
        RadioCommand::RdsGenre,
        RadioCommand::RdsProgramService,
        RadioCommand::RdsRadioText,
        RadioCommand::Volume,
        RadioCommand::Bass,
        RadioCommand::Treble,
        RadioCommand::Compression,
    ];

    /// 16-bit wire code (sent little-endian)
    pub const fn code(self) -> u16 {
        match self {
            RadioCommand::Power => 0x0001,
            RadioCommand::Mute => 0x0002,
            RadioCommand::SignalStrength => 0x0101,
            RadioCommand::Tune => 0x0102,
            RadioCommand::Seek => 0x0103,
            RadioCommand::HdActive => 0x0201,
            RadioCommand::HdStreamLock => 0x0202,
            RadioCommand::HdSignalStrength => 0x0203,
            RadioCommand::HdSubchannel => 0x0204,
            RadioCommand::HdSubchannelCount => 0x0205,
            RadioCommand::HdEnableHdTuner => 0x0206,
            RadioCommand::HdTitle => 0x0207,
            RadioCommand::HdArtist => 0x0208,
            RadioCommand::HdCallsign => 0x0209,
            RadioCommand::HdStationName => 0x0210,
            RadioCommand::HdUniqueId => 0x0211,
            RadioCommand::HdApiVersion => 0x0212,
            RadioCommand::HdHwVersion => 0x0213,
            RadioCommand::RdsEnabled => 0x0301,
            RadioCommand::RdsGenre => 0x0307,
            RadioCommand::RdsProgramService => 0x0308,
            RadioCommand::RdsRadioText => 0x0309,
            RadioCommand::Volume => 0x0403,
            RadioCommand::Bass => 0x0404,
            RadioCommand::Treble => 0x0405,
            RadioCommand::Compression => 0x0406,
        }
    }

    /// Look up a command by its wire code
    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|cmd| cmd.code() == code)
    }

    /// Payload kind declared for this command
    pub const fn kind(self) -> PayloadKind {
        match self {
            RadioCommand::Power
            | RadioCommand::Mute
            | RadioCommand::HdActive
            | RadioCommand::HdStreamLock
            | RadioCommand::RdsEnabled => PayloadKind::Boolean,
            // HdEnableHdTuner and Compression are carried as raw integers;
            // their meaning has not been confirmed on hardware.
            RadioCommand::SignalStrength
            | RadioCommand::HdSignalStrength
            | RadioCommand::HdSubchannel
            | RadioCommand::HdSubchannelCount
            | RadioCommand::HdEnableHdTuner
            | RadioCommand::Volume
            | RadioCommand::Bass
            | RadioCommand::Treble
            | RadioCommand::Compression => PayloadKind::Integer,
            RadioCommand::Tune | RadioCommand::Seek => PayloadKind::TuneInfo,
            RadioCommand::HdTitle | RadioCommand::HdArtist => PayloadKind::SongInfo,
            RadioCommand::HdCallsign
            | RadioCommand::HdStationName
            | RadioCommand::HdUniqueId
            | RadioCommand::HdApiVersion
            | RadioCommand::HdHwVersion
            | RadioCommand::RdsGenre
            | RadioCommand::RdsProgramService
            | RadioCommand::RdsRadioText => PayloadKind::String,
        }
    }

    /// Whether the command can be sent with the given operation
    pub const fn allows(self, operation: Operation) -> bool {
        match operation {
            Operation::Get | Operation::Reply => true,
            Operation::Set => matches!(
                self,
                RadioCommand::Power
                    | RadioCommand::Mute
                    | RadioCommand::Tune
                    | RadioCommand::Seek
                    | RadioCommand::HdSubchannel
                    | RadioCommand::Volume
                    | RadioCommand::Bass
                    | RadioCommand::Treble
            ),
        }
    }

    /// Inclusive range accepted by a SET of this command, if it is ranged
    pub const fn set_range(self) -> Option<(i32, i32)> {
        match self {
            RadioCommand::Volume
            | RadioCommand::Bass
            | RadioCommand::Treble
            | RadioCommand::HdSubchannel => Some((SETTING_MIN, SETTING_MAX)),
            _ => None,
        }
    }

    /// Upper-case protocol name, e.g. `HD_SUBCHANNEL`
    pub fn name(&self) -> &'static str {
        match self {
            RadioCommand::Power => "POWER",
            RadioCommand::Mute => "MUTE",
            RadioCommand::SignalStrength => "SIGNAL_STRENGTH",
            RadioCommand::Tune => "TUNE",
            RadioCommand::Seek => "SEEK",
            RadioCommand::HdActive => "HD_ACTIVE",
            RadioCommand::HdStreamLock => "HD_STREAM_LOCK",
            RadioCommand::HdSignalStrength => "HD_SIGNAL_STRENGTH",
            RadioCommand::HdSubchannel => "HD_SUBCHANNEL",
            RadioCommand::HdSubchannelCount => "HD_SUBCHANNEL_COUNT",
            RadioCommand::HdEnableHdTuner => "HD_ENABLE_HD_TUNER",
            RadioCommand::HdTitle => "HD_TITLE",
            RadioCommand::HdArtist => "HD_ARTIST",
            RadioCommand::HdCallsign => "HD_CALLSIGN",
            RadioCommand::HdStationName => "HD_STATION_NAME",
            RadioCommand::HdUniqueId => "HD_UNIQUE_ID",
            RadioCommand::HdApiVersion => "HD_API_VERSION",
            RadioCommand::HdHwVersion => "HD_HW_VERSION",
            RadioCommand::RdsEnabled => "RDS_ENABLED",
            RadioCommand::RdsGenre => "RDS_GENRE",
            RadioCommand::RdsProgramService => "RDS_PROGRAM_SERVICE",
            RadioCommand::RdsRadioText => "RDS_RADIO_TEXT",
            RadioCommand::Volume => "VOLUME",
            RadioCommand::Bass => "BASS",
            RadioCommand::Treble => "TREBLE",
            RadioCommand::Compression => "COMPRESSION",
        }
    }

    /// Look up a command by its protocol name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|cmd| cmd.name().eq_ignore_ascii_case(name))
    }
}

impl TryFrom<u16> for RadioCommand {
    type Error = ParseError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_code(value).ok_or(ParseError::UnknownCommand(value))
    }
}

impl fmt::Display for RadioCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
