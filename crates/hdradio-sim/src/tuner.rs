//! Virtual tuner
//!
//! Answers host requests the way the hardware does: every SET that changes
//! something is confirmed with a REPLY, every GET is answered with the
//! current value, and tuning to a station announces what the station
//! carries.

use std::collections::VecDeque;

use hdradio_protocol::{
    Band, Direction, Message, Operation, Payload, RadioCommand, SeekRequest, SongInfo, TuneInfo,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SimError;

const FM_MIN: i32 = 879;
const FM_MAX: i32 = 1079;
const FM_STEP: i32 = 2;
const AM_MIN: i32 = 530;
const AM_MAX: i32 = 1710;
const AM_STEP: i32 = 10;

/// One program on an HD station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    pub title: String,
    pub artist: String,
}

impl Program {
    pub fn new(title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
        }
    }
}

/// RDS data carried by an analog FM station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdsInfo {
    pub program_service: String,
    pub genre: String,
    pub radio_text: String,
}

/// A receivable station
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub band: Band,
    pub frequency: i32,
    pub callsign: String,
    pub name: String,
    /// HD programs, subchannel 1 first; empty for analog stations
    pub programs: Vec<Program>,
    pub rds: Option<RdsInfo>,
    pub signal_strength: i32,
}

impl Station {
    pub fn is_hd(&self) -> bool {
        !self.programs.is_empty()
    }

    fn program(&self, subchannel: i32) -> Option<&Program> {
        usize::try_from(subchannel - 1)
            .ok()
            .and_then(|i| self.programs.get(i))
    }
}

/// Configuration for creating a virtual tuner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualTunerConfig {
    /// Device identifier reported by the transport
    pub id: String,
    pub unique_id: String,
    pub api_version: String,
    pub hw_version: String,
    pub stations: Vec<Station>,
    /// Station tuned at power on
    pub initial_tune: TuneInfo,
    /// Report POWER = true when powered; false simulates a dead tuner
    pub confirm_power: bool,
    /// Number of subchannel SETs silently dropped before one is honored
    pub ignore_subchannel_sets: u32,
}

impl Default for VirtualTunerConfig {
    fn default() -> Self {
        Self {
            id: "SIM-0001".to_string(),
            unique_id: "0123456789AB".to_string(),
            api_version: "5.2.1".to_string(),
            hw_version: "HDR-1000 rev C".to_string(),
            stations: default_stations(),
            initial_tune: TuneInfo::new(Band::Fm, 879, 0),
            confirm_power: true,
            ignore_subchannel_sets: 0,
        }
    }
}

fn default_stations() -> Vec<Station> {
    vec![
        Station {
            band: Band::Fm,
            frequency: 955,
            callsign: "WRDS".to_string(),
            name: "Classic Rock 95.5".to_string(),
            programs: Vec::new(),
            rds: Some(RdsInfo {
                program_service: "WRDS-FM".to_string(),
                genre: "Rock".to_string(),
                radio_text: "Now playing: Night Drive".to_string(),
            }),
            signal_strength: 61,
        },
        Station {
            band: Band::Fm,
            frequency: 1011,
            callsign: "KSIM".to_string(),
            name: "Simulated Public Radio".to_string(),
            programs: vec![
                Program::new("Morning Edition", "KSIM News"),
                Program::new("Song A", "Artist A"),
                Program::new("Song B", "Artist B"),
            ],
            rds: None,
            signal_strength: 74,
        },
        Station {
            band: Band::Am,
            frequency: 1010,
            callsign: "WAMX".to_string(),
            name: "News Talk 1010".to_string(),
            programs: vec![Program::new("Traffic on the 1s", "WAMX")],
            rds: None,
            signal_strength: 40,
        },
    ]
}

/// A simulated tuner that queues protocol-encoded replies
#[derive(Debug)]
pub struct VirtualTuner {
    config: VirtualTunerConfig,
    powered: bool,
    mute: bool,
    volume: i32,
    bass: i32,
    treble: i32,
    compression: i32,
    tune: TuneInfo,
    subchannel: i32,
    ignored_subchannel_sets: u32,
    /// Requests received, in order
    requests: Vec<Message>,
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualTuner {
    /// Create a virtual tuner with default stations
    pub fn new() -> Self {
        Self::from_config(VirtualTunerConfig::default())
    }

    pub fn from_config(config: VirtualTunerConfig) -> Self {
        let tune = config.initial_tune;
        Self {
            config,
            powered: false,
            mute: false,
            volume: 45,
            bass: 45,
            treble: 45,
            compression: 0,
            tune: tune.with_subchannel(0),
            subchannel: 0,
            ignored_subchannel_sets: 0,
            requests: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &VirtualTunerConfig {
        &self.config
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Current station, including the selected subchannel
    pub fn tune(&self) -> TuneInfo {
        self.tune.with_subchannel(self.subchannel)
    }

    pub fn volume(&self) -> i32 {
        self.volume
    }

    /// Every request received so far
    pub fn requests(&self) -> &[Message] {
        &self.requests
    }

    /// Requests received for `command` with `operation`
    pub fn count_requests(&self, command: RadioCommand, operation: Operation) -> usize {
        self.requests
            .iter()
            .filter(|m| m.command == command && m.operation == operation)
            .count()
    }

    /// The DTR line went high
    pub fn power_on(&mut self) {
        if self.powered {
            return;
        }
        debug!("Virtual tuner powered on");
        self.powered = true;
        if self.config.confirm_power {
            self.reply(RadioCommand::Power, Payload::Boolean(true));
        }
    }

    /// The DTR line went low
    pub fn power_off(&mut self) {
        if !self.powered {
            return;
        }
        debug!("Virtual tuner powered off");
        self.powered = false;
        self.subchannel = 0;
        if self.config.confirm_power {
            self.reply(RadioCommand::Power, Payload::Boolean(false));
        }
    }

    /// Handle one host request
    pub fn handle_request(&mut self, msg: &Message) -> Result<(), SimError> {
        self.requests.push(msg.clone());

        if !self.powered {
            return Err(SimError::NotPowered(msg.command));
        }

        match msg.operation {
            Operation::Get => {
                let payload = self.current_value(msg.command)?;
                self.queue(msg.command, payload)
            }
            Operation::Set => self.apply_set(msg),
            Operation::Reply => Err(SimError::Unsupported {
                command: msg.command,
                operation: msg.operation,
            }),
        }
    }

    fn apply_set(&mut self, msg: &Message) -> Result<(), SimError> {
        use Payload as P;
        use RadioCommand as C;

        match (msg.command, &msg.payload) {
            (C::Power, P::Boolean(true)) => self.power_on(),
            (C::Power, P::Boolean(false)) => self.power_off(),
            (C::Mute, P::Boolean(on)) => {
                self.mute = *on;
                self.queue(C::Mute, P::Boolean(*on))?;
            }
            (C::Volume, P::Integer(v)) => {
                self.volume = *v;
                self.queue(C::Volume, P::Integer(*v))?;
            }
            (C::Bass, P::Integer(v)) => {
                self.bass = *v;
                self.queue(C::Bass, P::Integer(*v))?;
            }
            (C::Treble, P::Integer(v)) => {
                self.treble = *v;
                self.queue(C::Treble, P::Integer(*v))?;
            }
            (C::Tune, P::Tune(tune)) => self.tune_to(tune.band, tune.frequency)?,
            (C::Tune, P::TuneStep(direction)) => {
                let frequency = step(self.tune.band, self.tune.frequency, *direction);
                self.tune_to(self.tune.band, frequency)?;
            }
            (C::Seek, P::Seek(request)) => self.seek(request)?,
            (C::HdSubchannel, P::Integer(subchannel)) => self.select_subchannel(*subchannel)?,
            (command, _) => {
                return Err(SimError::Unsupported {
                    command,
                    operation: Operation::Set,
                })
            }
        }
        Ok(())
    }

    fn current_value(&self, command: RadioCommand) -> Result<Payload, SimError> {
        use RadioCommand as C;

        let station = self.station();
        let text = |s: Option<&str>| Payload::Text(s.unwrap_or_default().to_string());
        let payload = match command {
            C::Power => Payload::Boolean(self.powered),
            C::Mute => Payload::Boolean(self.mute),
            C::SignalStrength => Payload::Integer(station.map_or(0, |s| s.signal_strength)),
            C::Tune => Payload::Tune(self.tune),
            C::HdActive => Payload::Boolean(station.is_some_and(Station::is_hd)),
            C::HdStreamLock => Payload::Boolean(station.is_some_and(Station::is_hd)),
            C::HdSignalStrength => Payload::Integer(
                station
                    .filter(|s| s.is_hd())
                    .map_or(0, |s| s.signal_strength),
            ),
            C::HdSubchannel => Payload::Integer(self.subchannel),
            C::HdSubchannelCount => Payload::Integer(self.subchannel_count()),
            C::HdEnableHdTuner => Payload::Integer(1),
            C::HdTitle => Payload::Song(SongInfo::new(
                self.subchannel,
                self.program(self.subchannel).map_or("", |p| p.title.as_str()),
            )),
            C::HdArtist => Payload::Song(SongInfo::new(
                self.subchannel,
                self.program(self.subchannel).map_or("", |p| p.artist.as_str()),
            )),
            C::HdCallsign => text(station.map(|s| s.callsign.as_str())),
            C::HdStationName => text(station.map(|s| s.name.as_str())),
            C::HdUniqueId => Payload::Text(self.config.unique_id.clone()),
            C::HdApiVersion => Payload::Text(self.config.api_version.clone()),
            C::HdHwVersion => Payload::Text(self.config.hw_version.clone()),
            C::RdsEnabled => Payload::Boolean(self.rds().is_some()),
            C::RdsGenre => text(self.rds().map(|r| r.genre.as_str())),
            C::RdsProgramService => text(self.rds().map(|r| r.program_service.as_str())),
            C::RdsRadioText => text(self.rds().map(|r| r.radio_text.as_str())),
            C::Volume => Payload::Integer(self.volume),
            C::Bass => Payload::Integer(self.bass),
            C::Treble => Payload::Integer(self.treble),
            C::Compression => Payload::Integer(self.compression),
            C::Seek => {
                return Err(SimError::Unsupported {
                    command,
                    operation: Operation::Get,
                })
            }
        };
        Ok(payload)
    }

    fn station(&self) -> Option<&Station> {
        self.config
            .stations
            .iter()
            .find(|s| s.band == self.tune.band && s.frequency == self.tune.frequency)
    }

    fn program(&self, subchannel: i32) -> Option<&Program> {
        self.station().and_then(|s| s.program(subchannel))
    }

    fn rds(&self) -> Option<&RdsInfo> {
        self.station().and_then(|s| s.rds.as_ref())
    }

    fn subchannel_count(&self) -> i32 {
        self.station()
            .map_or(0, |s| i32::try_from(s.programs.len()).unwrap_or(i32::MAX))
    }

    fn tune_to(&mut self, band: Band, frequency: i32) -> Result<(), SimError> {
        self.tune = TuneInfo::new(band, frequency, 0);
        self.subchannel = 0;
        self.queue(RadioCommand::Tune, Payload::Tune(self.tune))?;
        self.announce_station()
    }

    /// Queue what a freshly tuned station reports
    fn announce_station(&mut self) -> Result<(), SimError> {
        let Some(station) = self.station().cloned() else {
            return self.queue(RadioCommand::SignalStrength, Payload::Integer(0));
        };

        self.queue(
            RadioCommand::SignalStrength,
            Payload::Integer(station.signal_strength),
        )?;

        if station.is_hd() {
            self.queue(RadioCommand::HdActive, Payload::Boolean(true))?;
            self.queue(RadioCommand::HdStreamLock, Payload::Boolean(true))?;
            self.queue(
                RadioCommand::HdSubchannelCount,
                Payload::Integer(self.subchannel_count()),
            )?;
            self.queue(RadioCommand::HdCallsign, Payload::Text(station.callsign))?;
            self.queue(RadioCommand::HdStationName, Payload::Text(station.name))?;
            for (subchannel, program) in (1..).zip(&station.programs) {
                self.queue(
                    RadioCommand::HdTitle,
                    Payload::Song(SongInfo::new(subchannel, program.title.as_str())),
                )?;
                self.queue(
                    RadioCommand::HdArtist,
                    Payload::Song(SongInfo::new(subchannel, program.artist.as_str())),
                )?;
            }
        } else if let Some(rds) = station.rds {
            self.queue(RadioCommand::RdsEnabled, Payload::Boolean(true))?;
            self.queue(RadioCommand::RdsProgramService, Payload::Text(rds.program_service))?;
            self.queue(RadioCommand::RdsGenre, Payload::Text(rds.genre))?;
            self.queue(RadioCommand::RdsRadioText, Payload::Text(rds.radio_text))?;
        }
        Ok(())
    }

    fn seek(&mut self, request: &SeekRequest) -> Result<(), SimError> {
        let from = self.tune;
        let mut candidates: Vec<i32> = self
            .config
            .stations
            .iter()
            .filter(|s| s.band == request.band && (request.seek_all || s.is_hd()))
            .map(|s| s.frequency)
            .collect();
        candidates.sort_unstable();

        let same_band = from.band == request.band;
        let next = match request.direction {
            Direction::Up => candidates
                .iter()
                .find(|&&f| !same_band || f > from.frequency)
                .or_else(|| candidates.first()),
            Direction::Down => candidates
                .iter()
                .rev()
                .find(|&&f| !same_band || f < from.frequency)
                .or_else(|| candidates.last()),
        };
        let Some(&frequency) = next else {
            return Err(SimError::NoStation(from));
        };

        let found = TuneInfo::new(request.band, frequency, 0);
        self.queue(RadioCommand::Seek, Payload::Tune(found))?;
        self.tune_to(found.band, found.frequency)
    }

    fn select_subchannel(&mut self, subchannel: i32) -> Result<(), SimError> {
        if self.ignored_subchannel_sets < self.config.ignore_subchannel_sets {
            self.ignored_subchannel_sets += 1;
            debug!("Dropping subchannel request {}", subchannel);
            return Ok(());
        }
        let Some(program) = self.program(subchannel).cloned() else {
            return Err(SimError::NoSubchannel(subchannel));
        };

        self.subchannel = subchannel;
        self.queue(RadioCommand::HdSubchannel, Payload::Integer(subchannel))?;
        self.queue(
            RadioCommand::HdTitle,
            Payload::Song(SongInfo::new(subchannel, program.title)),
        )?;
        self.queue(
            RadioCommand::HdArtist,
            Payload::Song(SongInfo::new(subchannel, program.artist)),
        )
    }

    /// Change what a subchannel is playing and announce it
    pub fn play(
        &mut self,
        subchannel: i32,
        title: impl Into<String>,
        artist: impl Into<String>,
    ) -> Result<(), SimError> {
        let (band, frequency) = (self.tune.band, self.tune.frequency);
        let station = self
            .config
            .stations
            .iter_mut()
            .find(|s| s.band == band && s.frequency == frequency)
            .ok_or(SimError::NoSubchannel(subchannel))?;
        let index = usize::try_from(subchannel - 1).map_err(|_| SimError::NoSubchannel(subchannel))?;
        let program = station
            .programs
            .get_mut(index)
            .ok_or(SimError::NoSubchannel(subchannel))?;
        program.title = title.into();
        program.artist = artist.into();
        let (title, artist) = (program.title.clone(), program.artist.clone());

        self.queue(RadioCommand::HdTitle, Payload::Song(SongInfo::new(subchannel, title)))?;
        self.queue(RadioCommand::HdArtist, Payload::Song(SongInfo::new(subchannel, artist)))
    }

    /// Queue an arbitrary reply
    pub fn reply(&mut self, command: RadioCommand, payload: Payload) {
        if let Err(e) = self.queue(command, payload) {
            warn!("Virtual tuner could not encode reply: {}", e);
        }
    }

    fn queue(&mut self, command: RadioCommand, payload: Payload) -> Result<(), SimError> {
        let frame = Message::reply(command, payload).encode()?;
        self.pending_output.push_back(frame);
        Ok(())
    }

    /// Take the next pending output frame
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }
}

impl Default for VirtualTuner {
    fn default() -> Self {
        Self::new()
    }
}

fn step(band: Band, frequency: i32, direction: Direction) -> i32 {
    let (min, max, step) = match band {
        Band::Fm => (FM_MIN, FM_MAX, FM_STEP),
        Band::Am => (AM_MIN, AM_MAX, AM_STEP),
    };
    let next = frequency + direction.code() * step;
    if next > max {
        min
    } else if next < min {
        max
    } else {
        next
    }
}
