//! Unified event stream for the driver
//!
//! Connection lifecycle, power transitions and every state change reported by
//! the tuner are delivered through a single [`RadioEvent`] stream, in the
//! order they happened.

use hdradio_protocol::{SongInfo, TuneInfo};

use crate::error::DeviceErrorKind;

/// Everything an application can observe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioEvent {
    // -------------------------------------------------------------------------
    // Session lifecycle
    // -------------------------------------------------------------------------
    /// Result of an open request
    Opened(bool),
    /// The session ended (explicit close or fatal transport error)
    Closed,
    DeviceError(DeviceErrorKind),

    // -------------------------------------------------------------------------
    // Power
    // -------------------------------------------------------------------------
    PowerOn,
    PowerOff,

    // -------------------------------------------------------------------------
    // Tuner state
    // -------------------------------------------------------------------------
    Mute(bool),
    SignalStrength(i32),
    Tune(TuneInfo),
    Seek(TuneInfo),
    HdActive(bool),
    HdStreamLock(bool),
    HdSignalStrength(i32),
    HdSubchannel(i32),
    HdSubchannelCount(i32),
    HdTitle(SongInfo),
    HdArtist(SongInfo),
    HdCallsign(String),
    HdStationName(String),
    HdUniqueId(String),
    HdApiVersion(String),
    HdHwVersion(String),
    RdsEnabled(bool),
    RdsGenre(String),
    RdsProgramService(String),
    RdsRadioText(String),
    Volume(i32),
    Bass(i32),
    Treble(i32),
    Compression(i32),
}

impl RadioEvent {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Opened(_) => "opened",
            Self::Closed => "closed",
            Self::DeviceError(_) => "device_error",
            Self::PowerOn => "power_on",
            Self::PowerOff => "power_off",
            Self::Mute(_) => "mute",
            Self::SignalStrength(_) => "signal_strength",
            Self::Tune(_) => "tune",
            Self::Seek(_) => "seek",
            Self::HdActive(_) => "hd_active",
            Self::HdStreamLock(_) => "hd_stream_lock",
            Self::HdSignalStrength(_) => "hd_signal_strength",
            Self::HdSubchannel(_) => "hd_subchannel",
            Self::HdSubchannelCount(_) => "hd_subchannel_count",
            Self::HdTitle(_) => "hd_title",
            Self::HdArtist(_) => "hd_artist",
            Self::HdCallsign(_) => "hd_callsign",
            Self::HdStationName(_) => "hd_station_name",
            Self::HdUniqueId(_) => "hd_unique_id",
            Self::HdApiVersion(_) => "hd_api_version",
            Self::HdHwVersion(_) => "hd_hw_version",
            Self::RdsEnabled(_) => "rds_enabled",
            Self::RdsGenre(_) => "rds_genre",
            Self::RdsProgramService(_) => "rds_program_service",
            Self::RdsRadioText(_) => "rds_radio_text",
            Self::Volume(_) => "volume",
            Self::Bass(_) => "bass",
            Self::Treble(_) => "treble",
            Self::Compression(_) => "compression",
        }
    }
}

impl std::fmt::Display for RadioEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Opened(ok) => write!(f, "opened: {}", ok),
            Self::Closed | Self::PowerOn | Self::PowerOff => f.write_str(self.name()),
            Self::DeviceError(kind) => write!(f, "device error: {}", kind),
            Self::Tune(t) | Self::Seek(t) => write!(f, "{}: {}", self.name(), t),
            Self::HdTitle(s) | Self::HdArtist(s) => {
                write!(f, "{}: [{}] {}", self.name(), s.subchannel, s.text)
            }
            Self::Mute(v)
            | Self::HdActive(v)
            | Self::HdStreamLock(v)
            | Self::RdsEnabled(v) => write!(f, "{}: {}", self.name(), v),
            Self::SignalStrength(v)
            | Self::HdSignalStrength(v)
            | Self::HdSubchannel(v)
            | Self::HdSubchannelCount(v)
            | Self::Volume(v)
            | Self::Bass(v)
            | Self::Treble(v)
            | Self::Compression(v) => write!(f, "{}: {}", self.name(), v),
            Self::HdCallsign(s)
            | Self::HdStationName(s)
            | Self::HdUniqueId(s)
            | Self::HdApiVersion(s)
            | Self::HdHwVersion(s)
            | Self::RdsGenre(s)
            | Self::RdsProgramService(s)
            | Self::RdsRadioText(s) => write!(f, "{}: {}", self.name(), s),
        }
    }
}
