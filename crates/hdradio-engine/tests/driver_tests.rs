//! Integration tests for the driver
//!
//! These tests run the full driver against a simulated tuner:
//! - Power sequencing, spacing and timeouts
//! - Bounded level adjustments
//! - Station changes and the subchannel lock retry
//! - Fatal transport errors and session teardown
//! - Settings persistence across power cycles

use std::sync::Arc;
use std::time::Duration;

use hdradio_engine::{
    channel_handler, keys, ControlLine, DeviceErrorKind, DriverConfig, HdRadio, MemorySettings,
    PowerStatus, RadioEvent, SettingsStore,
};
use hdradio_protocol::{Band, Operation, RadioCommand, SongInfo, TuneInfo};
use hdradio_sim::{SimHandle, SimTransport, VirtualTuner, VirtualTunerConfig};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout, Instant};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    /// Short delays so the suite runs quickly
    pub fn fast_config() -> DriverConfig {
        DriverConfig {
            command_delay_ms: 1,
            post_tune_delay_ms: 5,
            power_spacing_ms: 10,
            power_timeout_ms: 300,
            power_settle_ms: 5,
            init_timeout_ms: 200,
            subchannel_retry_ms: 50,
            subchannel_max_attempts: 10,
            receive_poll_ms: 2,
            max_read: 256,
            signal_poll_ms: 0,
        }
    }

    pub struct Rig {
        pub radio: HdRadio,
        pub sim: SimHandle,
        pub events: UnboundedReceiver<RadioEvent>,
        pub settings: Arc<MemorySettings>,
    }

    pub fn rig_with(tuner: VirtualTunerConfig, config: DriverConfig) -> Rig {
        let transport = SimTransport::new(VirtualTuner::from_config(tuner));
        let sim = transport.handle();
        let settings = Arc::new(MemorySettings::new());
        let (tx, events) = tokio::sync::mpsc::unbounded_channel();
        let radio = HdRadio::new(
            transport,
            Arc::clone(&settings) as Arc<dyn SettingsStore>,
            channel_handler(tx),
            config,
        );
        Rig {
            radio,
            sim,
            events,
            settings,
        }
    }

    pub fn rig() -> Rig {
        rig_with(VirtualTunerConfig::default(), fast_config())
    }

    /// Skip events until one matches
    pub async fn wait_for(
        events: &mut UnboundedReceiver<RadioEvent>,
        pred: impl Fn(&RadioEvent) -> bool,
    ) -> RadioEvent {
        timeout(WAIT, async {
            loop {
                match events.recv().await {
                    Some(event) if pred(&event) => return event,
                    Some(_) => continue,
                    None => panic!("event stream ended"),
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    pub async fn wait_event(events: &mut UnboundedReceiver<RadioEvent>, expected: RadioEvent) {
        wait_for(events, |e| *e == expected).await;
    }

    /// Collect events until one matches, including the match
    pub async fn collect_until(
        events: &mut UnboundedReceiver<RadioEvent>,
        pred: impl Fn(&RadioEvent) -> bool,
    ) -> Vec<RadioEvent> {
        timeout(WAIT, async {
            let mut seen = Vec::new();
            while let Some(event) = events.recv().await {
                let done = pred(&event);
                seen.push(event);
                if done {
                    return seen;
                }
            }
            panic!("event stream ended");
        })
        .await
        .expect("timed out collecting events")
    }

    pub async fn powered_rig_with(tuner: VirtualTunerConfig, config: DriverConfig) -> Rig {
        let mut rig = rig_with(tuner, config);
        rig.radio.open().await.unwrap();
        rig.radio.power_on().unwrap();
        wait_event(&mut rig.events, RadioEvent::PowerOn).await;
        rig
    }

    pub async fn powered_rig() -> Rig {
        powered_rig_with(VirtualTunerConfig::default(), fast_config()).await
    }

    pub fn count_sets(sim: &SimHandle, command: RadioCommand) -> usize {
        sim.with_tuner(|t| t.count_requests(command, Operation::Set))
    }

    pub fn count_gets(sim: &SimHandle, command: RadioCommand) -> usize {
        sim.with_tuner(|t| t.count_requests(command, Operation::Get))
    }
}

use helpers::*;

// ============================================================================
// Power Tests
// ============================================================================

#[tokio::test]
async fn test_power_on_sequence() {
    let mut rig = rig();
    rig.radio.open().await.unwrap();
    wait_event(&mut rig.events, RadioEvent::Opened(true)).await;
    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOff);

    rig.radio.power_on().unwrap();
    let seen = collect_until(&mut rig.events, |e| *e == RadioEvent::PowerOn).await;

    assert!(seen.contains(&RadioEvent::HdApiVersion("5.2.1".into())));
    assert!(seen.contains(&RadioEvent::HdUniqueId("0123456789AB".into())));
    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOn);
    assert_eq!(rig.radio.hd_hw_version(), "HDR-1000 rev C");
    assert!(rig.radio.power());
    assert_eq!(
        rig.sim.line_log(),
        vec![
            (ControlLine::Rts, true),
            (ControlLine::Rts, true),
            (ControlLine::Dtr, true),
            (ControlLine::Rts, false),
        ]
    );
}

#[tokio::test]
async fn test_rapid_power_on_runs_once() {
    let mut rig = rig();
    rig.radio.open().await.unwrap();

    rig.radio.power_on().unwrap();
    rig.radio.power_on().unwrap();
    wait_event(&mut rig.events, RadioEvent::PowerOn).await;
    sleep(Duration::from_millis(100)).await;

    let dtr_raises = rig
        .sim
        .line_log()
        .into_iter()
        .filter(|&entry| entry == (ControlLine::Dtr, true))
        .count();
    assert_eq!(dtr_raises, 1);
    assert_eq!(count_gets(&rig.sim, RadioCommand::HdApiVersion), 1);
}

#[tokio::test]
async fn test_power_timeout_leaves_session_open() {
    let tuner = VirtualTunerConfig {
        confirm_power: false,
        ..Default::default()
    };
    let mut rig = rig_with(tuner, fast_config());
    rig.radio.open().await.unwrap();

    let start = Instant::now();
    rig.radio.power_on().unwrap();
    wait_event(
        &mut rig.events,
        RadioEvent::DeviceError(DeviceErrorKind::PowerTimeout),
    )
    .await;

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOff);
    assert!(rig.radio.is_open());

    let log = rig.sim.line_log();
    assert_eq!(
        log[log.len() - 2..],
        [(ControlLine::Dtr, false), (ControlLine::Rts, false)]
    );
}

#[tokio::test]
async fn test_power_off_persists_settings() {
    let mut rig = powered_rig().await;

    rig.radio.set_volume(33).unwrap();
    rig.radio.set_bass(50).unwrap();
    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 2)).unwrap();
    wait_event(&mut rig.events, RadioEvent::HdSubchannel(2)).await;

    rig.radio.set_seek_all(false);
    rig.radio.power_off().unwrap();
    wait_event(&mut rig.events, RadioEvent::PowerOff).await;

    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOff);
    assert!(!rig.sim.is_powered());
    assert_eq!(rig.settings.get_int(keys::VOLUME, -1), 33);
    assert_eq!(rig.settings.get_int(keys::BASS, -1), 50);
    assert_eq!(rig.settings.get_int(keys::FREQUENCY, -1), 1011);
    assert_eq!(rig.settings.get_string(keys::BAND, ""), "FM");
    assert_eq!(rig.settings.get_int(keys::SUBCHANNEL, -1), 2);
    assert!(!rig.settings.get_bool(keys::SEEK_ALL, true));

    let log = rig.sim.line_log();
    assert_eq!(
        log[log.len() - 3..],
        [
            (ControlLine::Rts, true),
            (ControlLine::Dtr, false),
            (ControlLine::Rts, false)
        ]
    );
}

#[tokio::test]
async fn test_analog_station_saves_no_subchannel() {
    let mut rig = powered_rig().await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 955, 0)).unwrap();
    wait_event(&mut rig.events, RadioEvent::RdsEnabled(true)).await;
    rig.radio.power_off().unwrap();
    wait_event(&mut rig.events, RadioEvent::PowerOff).await;

    assert_eq!(rig.settings.get_int(keys::FREQUENCY, -1), 955);
    assert_eq!(rig.settings.get_int(keys::SUBCHANNEL, -1), 0);
}

#[tokio::test]
async fn test_power_on_restores_settings() {
    let mut rig = rig();
    rig.settings.put_int(keys::VOLUME, 20);
    rig.settings.put_int(keys::FREQUENCY, 1011);
    rig.settings.put_string(keys::BAND, "FM");
    rig.settings.put_int(keys::SUBCHANNEL, 3);

    rig.radio.open().await.unwrap();
    rig.radio.power_on().unwrap();
    let seen = collect_until(&mut rig.events, |e| *e == RadioEvent::HdSubchannel(3)).await;

    assert!(seen.contains(&RadioEvent::Volume(20)));
    assert!(seen.contains(&RadioEvent::Tune(TuneInfo::new(Band::Fm, 1011, 0))));
    assert_eq!(rig.radio.tune_info(), TuneInfo::new(Band::Fm, 1011, 3));
    assert_eq!(rig.radio.volume(), 20);
}

#[tokio::test]
async fn test_power_transitions_are_spaced() {
    let config = DriverConfig {
        power_spacing_ms: 300,
        ..fast_config()
    };
    let mut rig = powered_rig_with(VirtualTunerConfig::default(), config).await;

    let start = Instant::now();
    rig.radio.power_off().unwrap();
    wait_event(&mut rig.events, RadioEvent::PowerOff).await;
    assert!(start.elapsed() >= Duration::from_millis(250));
}

// ============================================================================
// Level Tests
// ============================================================================

#[tokio::test]
async fn test_volume_bounds_send_nothing() {
    let mut rig = powered_rig().await;

    rig.radio.set_volume(90).unwrap();
    wait_event(&mut rig.events, RadioEvent::Volume(90)).await;
    assert!(!rig.radio.volume_up().unwrap());

    rig.radio.set_volume(0).unwrap();
    wait_event(&mut rig.events, RadioEvent::Volume(0)).await;
    assert!(!rig.radio.volume_down().unwrap());

    assert!(rig.radio.volume_up().unwrap());
    wait_event(&mut rig.events, RadioEvent::Volume(1)).await;

    assert_eq!(count_sets(&rig.sim, RadioCommand::Volume), 3);
}

#[tokio::test]
async fn test_treble_steps() {
    let mut rig = powered_rig().await;

    rig.radio.set_treble(10).unwrap();
    wait_event(&mut rig.events, RadioEvent::Treble(10)).await;
    assert!(rig.radio.treble_down().unwrap());
    wait_event(&mut rig.events, RadioEvent::Treble(9)).await;
    assert!(rig.radio.bass_up().unwrap());

    assert_eq!(rig.radio.treble(), 9);
}

// ============================================================================
// Tuning Tests
// ============================================================================

#[tokio::test]
async fn test_tune_replaces_station_data() {
    let mut rig = powered_rig().await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 955, 0)).unwrap();
    wait_event(&mut rig.events, RadioEvent::RdsRadioText("Now playing: Night Drive".into())).await;
    assert!(rig.radio.rds_enabled());
    assert_eq!(rig.radio.rds_genre(), "Rock");

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 0)).unwrap();
    wait_event(&mut rig.events, RadioEvent::HdStationName("Simulated Public Radio".into())).await;
    assert!(!rig.radio.rds_enabled());
    assert_eq!(rig.radio.rds_program_service(), "");
    assert_eq!(rig.radio.hd_callsign(), "KSIM");
    assert_eq!(rig.radio.hd_subchannel_count(), 3);
}

#[tokio::test]
async fn test_subchannel_switch_uses_cached_metadata() {
    let mut rig = powered_rig().await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 0)).unwrap();
    wait_event(
        &mut rig.events,
        RadioEvent::HdArtist(SongInfo::new(3, "Artist B")),
    )
    .await;
    assert_eq!(rig.radio.hd_title_for(2).as_deref(), Some("Song A"));

    rig.radio.set_hd_subchannel(2).unwrap();
    wait_event(&mut rig.events, RadioEvent::HdSubchannel(2)).await;
    assert_eq!(rig.radio.hd_title(), "Song A");
    assert_eq!(rig.radio.hd_artist(), "Artist A");
    assert_eq!(rig.radio.tune_info().subchannel, 2);
}

#[tokio::test]
async fn test_subchannel_retried_until_locked() {
    let tuner = VirtualTunerConfig {
        ignore_subchannel_sets: 2,
        ..Default::default()
    };
    let mut rig = powered_rig_with(tuner, fast_config()).await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 2)).unwrap();
    wait_event(&mut rig.events, RadioEvent::HdSubchannel(2)).await;
    sleep(Duration::from_millis(200)).await;

    assert_eq!(count_sets(&rig.sim, RadioCommand::HdSubchannel), 3);
    assert_eq!(rig.radio.hd_subchannel(), 2);
}

#[tokio::test]
async fn test_subchannel_retry_gives_up() {
    let tuner = VirtualTunerConfig {
        ignore_subchannel_sets: 100,
        ..Default::default()
    };
    let config = DriverConfig {
        subchannel_max_attempts: 3,
        ..fast_config()
    };
    let rig = powered_rig_with(tuner, config).await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 2)).unwrap();
    sleep(Duration::from_millis(500)).await;

    assert_eq!(count_sets(&rig.sim, RadioCommand::HdSubchannel), 3);
    assert_eq!(rig.radio.hd_subchannel(), 0);
}

#[tokio::test]
async fn test_new_tune_cancels_retry() {
    let tuner = VirtualTunerConfig {
        ignore_subchannel_sets: 100,
        ..Default::default()
    };
    let mut rig = powered_rig_with(tuner, fast_config()).await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 2)).unwrap();
    sleep(Duration::from_millis(120)).await;
    assert!(count_sets(&rig.sim, RadioCommand::HdSubchannel) >= 1);

    rig.radio.tune(TuneInfo::new(Band::Fm, 955, 0)).unwrap();
    wait_event(
        &mut rig.events,
        RadioEvent::Tune(TuneInfo::new(Band::Fm, 955, 0)),
    )
    .await;
    let sent = count_sets(&rig.sim, RadioCommand::HdSubchannel);

    sleep(Duration::from_millis(300)).await;
    assert_eq!(count_sets(&rig.sim, RadioCommand::HdSubchannel), sent);
}

#[tokio::test]
async fn test_subchannel_zero_is_sent_once() {
    let mut rig = powered_rig().await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 2)).unwrap();
    wait_event(&mut rig.events, RadioEvent::HdSubchannel(2)).await;
    let sent = count_sets(&rig.sim, RadioCommand::HdSubchannel);

    // the tuner never reports 0 back, it stays on subchannel 2
    rig.radio.set_hd_subchannel(0).unwrap();
    sleep(Duration::from_millis(300)).await;

    assert_eq!(count_sets(&rig.sim, RadioCommand::HdSubchannel), sent + 1);
    assert_eq!(rig.radio.hd_subchannel(), 2);
}

#[tokio::test]
async fn test_seek_honors_seek_all() {
    let mut rig = powered_rig().await;

    rig.radio.set_seek_all(false);
    rig.radio.seek_up().unwrap();
    wait_event(
        &mut rig.events,
        RadioEvent::Seek(TuneInfo::new(Band::Fm, 1011, 0)),
    )
    .await;
    wait_event(
        &mut rig.events,
        RadioEvent::Tune(TuneInfo::new(Band::Fm, 1011, 0)),
    )
    .await;

    rig.radio.set_seek_all(true);
    rig.radio.seek_down().unwrap();
    wait_event(
        &mut rig.events,
        RadioEvent::Seek(TuneInfo::new(Band::Fm, 955, 0)),
    )
    .await;
}

#[tokio::test]
async fn test_tune_step() {
    let mut rig = powered_rig().await;

    rig.radio.tune_up().unwrap();
    wait_event(
        &mut rig.events,
        RadioEvent::Tune(TuneInfo::new(Band::Fm, 881, 0)),
    )
    .await;
    rig.radio.tune_down().unwrap();
    rig.radio.tune_down().unwrap();
    // stepping below the band edge wraps to the top
    wait_event(
        &mut rig.events,
        RadioEvent::Tune(TuneInfo::new(Band::Fm, 1079, 0)),
    )
    .await;
}

#[tokio::test]
async fn test_post_tune_window_delays_next_command() {
    let config = DriverConfig {
        post_tune_delay_ms: 300,
        ..fast_config()
    };
    let mut rig = powered_rig_with(VirtualTunerConfig::default(), config).await;

    let start = Instant::now();
    rig.radio.tune(TuneInfo::new(Band::Fm, 955, 0)).unwrap();
    rig.radio.mute_on().unwrap();
    wait_event(&mut rig.events, RadioEvent::Mute(true)).await;

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert!(rig.radio.mute());
}

#[tokio::test]
async fn test_request_update() {
    let mut rig = powered_rig().await;

    rig.radio.request_update(RadioCommand::Compression).unwrap();
    wait_event(&mut rig.events, RadioEvent::Compression(0)).await;
    rig.radio.request_update(RadioCommand::HdEnableHdTuner).unwrap();
    rig.radio.request_update(RadioCommand::Bass).unwrap();
    wait_event(&mut rig.events, RadioEvent::Bass(45)).await;

    assert_eq!(rig.radio.hd_enable_hd_tuner(), 1);
}

#[tokio::test]
async fn test_signal_poll_follows_station_type() {
    let config = DriverConfig {
        signal_poll_ms: 40,
        ..fast_config()
    };
    let rig = powered_rig_with(VirtualTunerConfig::default(), config).await;

    rig.radio.tune(TuneInfo::new(Band::Fm, 955, 0)).unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(count_gets(&rig.sim, RadioCommand::SignalStrength) >= 2);

    rig.radio.tune(TuneInfo::new(Band::Fm, 1011, 0)).unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(count_gets(&rig.sim, RadioCommand::HdSignalStrength) >= 2);

    rig.radio.power_off().unwrap();
    sleep(Duration::from_millis(100)).await;
    let polls = count_gets(&rig.sim, RadioCommand::HdSignalStrength);
    sleep(Duration::from_millis(200)).await;
    assert_eq!(count_gets(&rig.sim, RadioCommand::HdSignalStrength), polls);
}

// ============================================================================
// Session Tests
// ============================================================================

#[tokio::test]
async fn test_open_without_device() {
    let mut rig = rig();
    rig.sim.set_present(false);

    assert!(rig.radio.open().await.is_err());
    wait_event(&mut rig.events, RadioEvent::Opened(false)).await;
    assert!(rig.radio.list_devices().await.unwrap().is_empty());

    rig.sim.set_present(true);
    rig.radio.open_by_id("SIM-0001").await.unwrap();
    wait_event(&mut rig.events, RadioEvent::Opened(true)).await;
    assert_eq!(rig.radio.identifier().await.as_deref(), Some("SIM-0001"));
}

#[tokio::test]
async fn test_write_failure_closes_session() {
    let mut rig = powered_rig().await;

    rig.sim.fail_writes(true);
    rig.radio.mute_on().unwrap();
    let seen = collect_until(&mut rig.events, |e| *e == RadioEvent::Closed).await;

    assert!(seen.contains(&RadioEvent::DeviceError(DeviceErrorKind::DataWrite)));
    assert!(!rig.radio.is_open());
    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOff);
    assert!(matches!(
        rig.radio.mute_off(),
        Err(hdradio_engine::DriverError::NotConnected)
    ));
}

#[tokio::test]
async fn test_read_failure_closes_session() {
    let mut rig = powered_rig().await;

    rig.sim.fail_reads(true);
    let seen = collect_until(&mut rig.events, |e| *e == RadioEvent::Closed).await;

    assert_eq!(
        seen.iter()
            .filter(|e| matches!(e, RadioEvent::DeviceError(_)))
            .count(),
        1
    );
    assert!(seen.contains(&RadioEvent::DeviceError(DeviceErrorKind::DataRead)));
    assert!(!rig.sim.is_open());
}

#[tokio::test]
async fn test_line_failure_during_power_on() {
    let mut rig = rig();
    rig.radio.open().await.unwrap();

    rig.sim.fail_lines(true);
    rig.radio.power_on().unwrap();
    let seen = collect_until(&mut rig.events, |e| *e == RadioEvent::Closed).await;

    assert!(seen.contains(&RadioEvent::DeviceError(DeviceErrorKind::RtsSet)));
    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOff);
}

#[tokio::test]
async fn test_close_powers_off_first() {
    let mut rig = powered_rig().await;
    rig.radio.set_volume(12).unwrap();
    wait_event(&mut rig.events, RadioEvent::Volume(12)).await;

    rig.radio.close().await;
    let seen = collect_until(&mut rig.events, |e| *e == RadioEvent::Closed).await;

    let power_off = seen.iter().position(|e| *e == RadioEvent::PowerOff);
    assert!(power_off.is_some());
    assert!(!rig.sim.is_powered());
    assert!(!rig.sim.is_open());
    assert_eq!(rig.settings.get_int(keys::VOLUME, -1), 12);
}

#[tokio::test]
async fn test_reopen_after_close() {
    let mut rig = powered_rig().await;
    rig.radio.close().await;
    wait_event(&mut rig.events, RadioEvent::Closed).await;

    rig.radio.open().await.unwrap();
    rig.radio.power_on().unwrap();
    wait_event(&mut rig.events, RadioEvent::PowerOn).await;
    assert_eq!(rig.radio.power_status(), PowerStatus::PoweredOn);
}
