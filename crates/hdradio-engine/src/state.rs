//! Tuner state tracking
//!
//! [`RadioState`] is the driver's picture of the tuner, built only from the
//! REPLY messages the tuner sends. Multi-field rules (a new tune clears the
//! station metadata, a subchannel switch swaps in that subchannel's cached
//! title and artist) are applied inside a single write lock.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use hdradio_protocol::{Message, Operation, Payload, RadioCommand, SongInfo, TuneInfo};
use tracing::{debug, trace};

use crate::events::RadioEvent;

/// Snapshot of everything the tuner has reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioState {
    pub power: bool,
    pub mute: bool,
    pub signal_strength: i32,
    pub tune: TuneInfo,
    pub hd_active: bool,
    pub hd_stream_lock: bool,
    pub hd_signal_strength: i32,
    pub hd_subchannel: i32,
    pub hd_subchannel_count: i32,
    /// Raw value; the tuner reports an integer here
    pub hd_enable_hd_tuner: i32,
    /// Title on the current subchannel
    pub hd_title: String,
    /// Artist on the current subchannel
    pub hd_artist: String,
    pub hd_callsign: String,
    pub hd_station_name: String,
    pub hd_unique_id: String,
    pub hd_api_version: String,
    pub hd_hw_version: String,
    pub rds_enabled: bool,
    pub rds_genre: String,
    pub rds_program_service: String,
    pub rds_radio_text: String,
    pub volume: i32,
    pub bass: i32,
    pub treble: i32,
    pub compression: i32,
    /// Last title seen per subchannel
    pub titles: HashMap<i32, String>,
    /// Last artist seen per subchannel
    pub artists: HashMap<i32, String>,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            power: false,
            mute: false,
            signal_strength: 0,
            tune: TuneInfo::default(),
            hd_active: false,
            hd_stream_lock: false,
            hd_signal_strength: 0,
            hd_subchannel: 0,
            hd_subchannel_count: 0,
            hd_enable_hd_tuner: 1,
            hd_title: String::new(),
            hd_artist: String::new(),
            hd_callsign: String::new(),
            hd_station_name: String::new(),
            hd_unique_id: String::new(),
            hd_api_version: String::new(),
            hd_hw_version: String::new(),
            rds_enabled: false,
            rds_genre: String::new(),
            rds_program_service: String::new(),
            rds_radio_text: String::new(),
            volume: 0,
            bass: 0,
            treble: 0,
            compression: 0,
            titles: HashMap::new(),
            artists: HashMap::new(),
        }
    }
}

/// Side effects the driver must act on after a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateHook {
    /// The tuner reported POWER = true
    PowerOn,
    /// The API version arrived, which ends initialization
    InitComplete,
}

/// Outcome of applying one message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Applied {
    pub event: Option<RadioEvent>,
    pub hook: Option<StateHook>,
}

impl Applied {
    fn event(event: RadioEvent) -> Self {
        Self {
            event: Some(event),
            hook: None,
        }
    }
}

impl RadioState {
    /// A new station: everything learned about the old one is stale
    fn retune(&mut self, tune: TuneInfo) {
        self.hd_active = false;
        self.hd_stream_lock = false;
        self.hd_subchannel = 0;
        self.hd_subchannel_count = 0;
        self.rds_enabled = false;
        self.rds_genre.clear();
        self.rds_program_service.clear();
        self.rds_radio_text.clear();
        self.hd_callsign.clear();
        self.hd_station_name.clear();
        self.hd_title.clear();
        self.hd_artist.clear();
        self.titles.clear();
        self.artists.clear();
        self.tune = tune;
    }

    fn select_subchannel(&mut self, subchannel: i32) {
        self.hd_title = self.titles.get(&subchannel).cloned().unwrap_or_default();
        self.hd_artist = self.artists.get(&subchannel).cloned().unwrap_or_default();
        self.tune = self.tune.with_subchannel(subchannel);
        self.hd_subchannel = subchannel;
    }

    fn set_title(&mut self, song: &SongInfo) {
        self.titles.insert(song.subchannel, song.text.clone());
        self.hd_title = song.text.clone();
    }

    fn set_artist(&mut self, song: &SongInfo) {
        self.artists.insert(song.subchannel, song.text.clone());
        self.hd_artist = song.text.clone();
    }

    /// Apply one REPLY and describe what it changed
    pub fn apply(&mut self, msg: &Message) -> Applied {
        use Payload as P;
        use RadioCommand as C;

        if msg.operation != Operation::Reply {
            trace!("Ignoring {} {}", msg.operation, msg.command);
            return Applied::default();
        }

        let event = match (msg.command, &msg.payload) {
            (C::Power, P::Boolean(on)) => {
                self.power = *on;
                return Applied {
                    event: None,
                    hook: on.then_some(StateHook::PowerOn),
                };
            }
            (C::HdEnableHdTuner, P::Integer(v)) => {
                self.hd_enable_hd_tuner = *v;
                return Applied::default();
            }
            (C::HdApiVersion, P::Text(s)) => {
                self.hd_api_version = s.clone();
                return Applied {
                    event: Some(RadioEvent::HdApiVersion(s.clone())),
                    hook: Some(StateHook::InitComplete),
                };
            }

            (C::Tune, P::Tune(tune)) => {
                self.retune(*tune);
                RadioEvent::Tune(*tune)
            }
            (C::Seek, P::Tune(tune)) => RadioEvent::Seek(*tune),
            (C::HdSubchannel, P::Integer(v)) => {
                self.select_subchannel(*v);
                RadioEvent::HdSubchannel(*v)
            }
            (C::HdTitle, P::Song(song)) => {
                self.set_title(song);
                RadioEvent::HdTitle(song.clone())
            }
            (C::HdArtist, P::Song(song)) => {
                self.set_artist(song);
                RadioEvent::HdArtist(song.clone())
            }

            (C::Mute, P::Boolean(v)) => {
                self.mute = *v;
                RadioEvent::Mute(*v)
            }
            (C::HdActive, P::Boolean(v)) => {
                self.hd_active = *v;
                RadioEvent::HdActive(*v)
            }
            (C::HdStreamLock, P::Boolean(v)) => {
                self.hd_stream_lock = *v;
                RadioEvent::HdStreamLock(*v)
            }
            (C::RdsEnabled, P::Boolean(v)) => {
                self.rds_enabled = *v;
                RadioEvent::RdsEnabled(*v)
            }

            (C::SignalStrength, P::Integer(v)) => {
                self.signal_strength = *v;
                RadioEvent::SignalStrength(*v)
            }
            (C::HdSignalStrength, P::Integer(v)) => {
                self.hd_signal_strength = *v;
                RadioEvent::HdSignalStrength(*v)
            }
            (C::HdSubchannelCount, P::Integer(v)) => {
                self.hd_subchannel_count = *v;
                RadioEvent::HdSubchannelCount(*v)
            }
            (C::Volume, P::Integer(v)) => {
                self.volume = *v;
                RadioEvent::Volume(*v)
            }
            (C::Bass, P::Integer(v)) => {
                self.bass = *v;
                RadioEvent::Bass(*v)
            }
            (C::Treble, P::Integer(v)) => {
                self.treble = *v;
                RadioEvent::Treble(*v)
            }
            (C::Compression, P::Integer(v)) => {
                self.compression = *v;
                RadioEvent::Compression(*v)
            }

            (C::HdCallsign, P::Text(s)) => {
                self.hd_callsign = s.clone();
                RadioEvent::HdCallsign(s.clone())
            }
            (C::HdStationName, P::Text(s)) => {
                self.hd_station_name = s.clone();
                RadioEvent::HdStationName(s.clone())
            }
            (C::HdUniqueId, P::Text(s)) => {
                self.hd_unique_id = s.clone();
                RadioEvent::HdUniqueId(s.clone())
            }
            (C::HdHwVersion, P::Text(s)) => {
                self.hd_hw_version = s.clone();
                RadioEvent::HdHwVersion(s.clone())
            }
            (C::RdsGenre, P::Text(s)) => {
                self.rds_genre = s.clone();
                RadioEvent::RdsGenre(s.clone())
            }
            (C::RdsProgramService, P::Text(s)) => {
                self.rds_program_service = s.clone();
                RadioEvent::RdsProgramService(s.clone())
            }
            (C::RdsRadioText, P::Text(s)) => {
                self.rds_radio_text = s.clone();
                RadioEvent::RdsRadioText(s.clone())
            }

            (command, payload) => {
                debug!("Unexpected payload for {}: {:?}", command, payload);
                return Applied::default();
            }
        };

        Applied::event(event)
    }
}

/// Shared [`RadioState`] with a single writer (the receiver)
#[derive(Debug, Default)]
pub struct RadioStateStore {
    inner: RwLock<RadioState>,
}

impl RadioStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, msg: &Message) -> Applied {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(msg)
    }

    /// Read one or more fields under the lock
    pub fn read<R>(&self, f: impl FnOnce(&RadioState) -> R) -> R {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn snapshot(&self) -> RadioState {
        self.read(RadioState::clone)
    }

    /// Back to power-on defaults, used when a session ends
    pub fn reset(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = RadioState::default();
    }

    pub fn tune(&self) -> TuneInfo {
        self.read(|s| s.tune)
    }

    pub fn hd_active(&self) -> bool {
        self.read(|s| s.hd_active)
    }

    pub fn hd_subchannel(&self) -> i32 {
        self.read(|s| s.hd_subchannel)
    }

    /// Current value of a 0..=90 setting
    pub fn setting(&self, command: RadioCommand) -> Option<i32> {
        self.read(|s| match command {
            RadioCommand::Volume => Some(s.volume),
            RadioCommand::Bass => Some(s.bass),
            RadioCommand::Treble => Some(s.treble),
            RadioCommand::HdSubchannel => Some(s.hd_subchannel),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdradio_protocol::Band;

    fn reply(command: RadioCommand, payload: Payload) -> Message {
        Message::reply(command, payload)
    }

    fn on_hd_station(store: &RadioStateStore) {
        for msg in [
            reply(RadioCommand::HdActive, Payload::Boolean(true)),
            reply(RadioCommand::HdStreamLock, Payload::Boolean(true)),
            reply(RadioCommand::HdSubchannelCount, Payload::Integer(3)),
            reply(RadioCommand::HdCallsign, Payload::Text("KQED-FM".into())),
            reply(RadioCommand::RdsEnabled, Payload::Boolean(true)),
            reply(RadioCommand::RdsRadioText, Payload::Text("news".into())),
            reply(RadioCommand::HdTitle, Payload::Song(SongInfo::new(2, "Song A"))),
            reply(RadioCommand::HdArtist, Payload::Song(SongInfo::new(2, "Artist A"))),
            reply(RadioCommand::HdSubchannel, Payload::Integer(2)),
        ] {
            store.apply(&msg);
        }
    }

    #[test]
    fn test_defaults() {
        let state = RadioState::default();
        assert_eq!(state.tune, TuneInfo::new(Band::Fm, 879, 0));
        assert_eq!(state.hd_enable_hd_tuner, 1);
        assert!(state.titles.is_empty());
    }

    #[test]
    fn test_tune_reply_clears_station_data() {
        let store = RadioStateStore::new();
        on_hd_station(&store);
        assert!(store.hd_active());
        assert_eq!(store.hd_subchannel(), 2);

        let applied = store.apply(&reply(
            RadioCommand::Tune,
            Payload::Tune(TuneInfo::new(Band::Fm, 1011, 0)),
        ));
        assert_eq!(
            applied.event,
            Some(RadioEvent::Tune(TuneInfo::new(Band::Fm, 1011, 0)))
        );

        let state = store.snapshot();
        assert!(!state.hd_active);
        assert!(!state.hd_stream_lock);
        assert_eq!(state.hd_subchannel, 0);
        assert_eq!(state.hd_subchannel_count, 0);
        assert!(!state.rds_enabled);
        assert_eq!(state.rds_radio_text, "");
        assert_eq!(state.hd_callsign, "");
        assert_eq!(state.hd_title, "");
        assert_eq!(state.hd_artist, "");
        assert!(state.titles.is_empty());
        assert!(state.artists.is_empty());
        assert_eq!(state.tune.frequency, 1011);
    }

    #[test]
    fn test_subchannel_switch_uses_cache() {
        let store = RadioStateStore::new();
        on_hd_station(&store);
        store.apply(&reply(
            RadioCommand::HdTitle,
            Payload::Song(SongInfo::new(1, "Song B")),
        ));
        assert_eq!(store.read(|s| s.hd_title.clone()), "Song B");

        store.apply(&reply(RadioCommand::HdSubchannel, Payload::Integer(2)));
        let state = store.snapshot();
        assert_eq!(state.hd_title, "Song A");
        assert_eq!(state.hd_artist, "Artist A");
        assert_eq!(state.tune.subchannel, 2);

        // never seen on subchannel 3
        store.apply(&reply(RadioCommand::HdSubchannel, Payload::Integer(3)));
        let state = store.snapshot();
        assert_eq!(state.hd_title, "");
        assert_eq!(state.hd_artist, "");
        assert_eq!(state.tune.subchannel, 3);
    }

    #[test]
    fn test_song_updates_cache_and_current() {
        let store = RadioStateStore::new();
        let applied = store.apply(&reply(
            RadioCommand::HdArtist,
            Payload::Song(SongInfo::new(4, "Someone")),
        ));
        assert_eq!(
            applied.event,
            Some(RadioEvent::HdArtist(SongInfo::new(4, "Someone")))
        );
        let state = store.snapshot();
        assert_eq!(state.hd_artist, "Someone");
        assert_eq!(state.artists.get(&4).map(String::as_str), Some("Someone"));
    }

    #[test]
    fn test_hooks() {
        let store = RadioStateStore::new();
        let applied = store.apply(&reply(RadioCommand::Power, Payload::Boolean(true)));
        assert_eq!(applied.hook, Some(StateHook::PowerOn));
        assert_eq!(applied.event, None);
        assert!(store.read(|s| s.power));

        let applied = store.apply(&reply(RadioCommand::Power, Payload::Boolean(false)));
        assert_eq!(applied.hook, None);

        let applied = store.apply(&reply(
            RadioCommand::HdApiVersion,
            Payload::Text("1.2".into()),
        ));
        assert_eq!(applied.hook, Some(StateHook::InitComplete));
        assert_eq!(applied.event, Some(RadioEvent::HdApiVersion("1.2".into())));
    }

    #[test]
    fn test_enable_hd_tuner_is_silent() {
        let store = RadioStateStore::new();
        let applied = store.apply(&reply(RadioCommand::HdEnableHdTuner, Payload::Integer(0)));
        assert_eq!(applied, Applied::default());
        assert_eq!(store.read(|s| s.hd_enable_hd_tuner), 0);
    }

    #[test]
    fn test_compression_emits() {
        let store = RadioStateStore::new();
        let applied = store.apply(&reply(RadioCommand::Compression, Payload::Integer(3)));
        assert_eq!(applied.event, Some(RadioEvent::Compression(3)));
    }

    #[test]
    fn test_seek_reply_does_not_move_tune() {
        let store = RadioStateStore::new();
        let applied = store.apply(&reply(
            RadioCommand::Seek,
            Payload::Tune(TuneInfo::new(Band::Fm, 953, 0)),
        ));
        assert_eq!(
            applied.event,
            Some(RadioEvent::Seek(TuneInfo::new(Band::Fm, 953, 0)))
        );
        assert_eq!(store.tune(), TuneInfo::default());
    }

    #[test]
    fn test_non_reply_ignored() {
        let store = RadioStateStore::new();
        let applied = store.apply(&Message::set(RadioCommand::Volume, Payload::Integer(50)));
        assert_eq!(applied, Applied::default());
        assert_eq!(store.setting(RadioCommand::Volume), Some(0));
    }

    #[test]
    fn test_mismatched_payload_ignored() {
        let store = RadioStateStore::new();
        let applied = store.apply(&reply(RadioCommand::Volume, Payload::Text("x".into())));
        assert_eq!(applied, Applied::default());
    }

    #[test]
    fn test_reset() {
        let store = RadioStateStore::new();
        on_hd_station(&store);
        store.reset();
        assert_eq!(store.snapshot(), RadioState::default());
    }
}
