//! The driver facade
//!
//! [`HdRadio`] owns a transport, a settings store and an event handler. An
//! open session runs two tasks: the receiver, which turns tuner replies into
//! state changes and events, and the command scheduler, which performs every
//! write. Calls on the facade validate their arguments and enqueue work; they
//! never wait on the tuner.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hdradio_engine::{channel_handler, DriverConfig, HdRadio, MemorySettings, MjsTransport};
//! use hdradio_protocol::{Band, TuneInfo};
//!
//! let (tx, mut events) = tokio::sync::mpsc::unbounded_channel();
//! let radio = HdRadio::new(
//!     MjsTransport::new(),
//!     Arc::new(MemorySettings::new()),
//!     channel_handler(tx),
//!     DriverConfig::default(),
//! );
//!
//! radio.open().await?;
//! radio.power_on()?;
//! radio.tune(TuneInfo::new(Band::Fm, 1011, 2))?;
//! while let Some(event) = events.recv().await {
//!     println!("{}", event);
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};

use hdradio_protocol::{
    Direction, Message, Payload, RadioCommand, SeekRequest, TuneInfo, SETTING_MAX, SETTING_MIN,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DriverConfig;
use crate::dispatcher::{EventDispatcher, RadioEventHandler};
use crate::error::{DeviceErrorKind, DriverError};
use crate::events::RadioEvent;
use crate::power::{PowerSequencer, PowerStatus};
use crate::receiver::run_receiver;
use crate::retrier::{self, Epoch};
use crate::scheduler::{CommandScheduler, Job};
use crate::settings::{keys, SettingsStore};
use crate::state::{RadioState, RadioStateStore};
use crate::transport::Transport;

/// Tasks and job queue of an open session
struct Session {
    jobs: mpsc::UnboundedSender<Job>,
    tasks: Vec<JoinHandle<()>>,
}

/// State shared by the facade and the session tasks
pub(crate) struct Shared {
    pub(crate) config: DriverConfig,
    pub(crate) transport: tokio::sync::Mutex<Box<dyn Transport>>,
    pub(crate) state: RadioStateStore,
    pub(crate) events: EventDispatcher,
    pub(crate) settings: Arc<dyn SettingsStore>,
    pub(crate) power: PowerSequencer,
    pub(crate) epoch: Epoch,
    seek_all: AtomicBool,
    /// Set once a fatal error has been reported for the current session
    faulted: AtomicBool,
    session: std::sync::Mutex<Option<Session>>,
    /// Serializes open and close
    lifecycle: tokio::sync::Mutex<()>,
}

impl Shared {
    fn session(&self) -> std::sync::MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn jobs(&self) -> Option<mpsc::UnboundedSender<Job>> {
        self.session().as_ref().map(|s| s.jobs.clone())
    }

    pub(crate) fn enqueue(&self, job: Job) -> Result<(), DriverError> {
        let jobs = self.jobs().ok_or(DriverError::NotConnected)?;
        jobs.send(job).map_err(|_| DriverError::NotConnected)
    }

    fn has_session(&self) -> bool {
        self.session().is_some()
    }

    fn seek_all(&self) -> bool {
        self.seek_all.load(Ordering::SeqCst)
    }

    fn start_session(self: &Arc<Self>) {
        let (tx, rx) = mpsc::unbounded_channel();

        self.state.reset();
        self.power.reset();
        self.faulted.store(false, Ordering::SeqCst);
        self.seek_all
            .store(self.settings.get_bool(keys::SEEK_ALL, true), Ordering::SeqCst);

        let receiver = tokio::spawn(run_receiver(Arc::clone(self)));
        let scheduler = tokio::spawn(CommandScheduler::new(Arc::clone(self)).run(rx));

        *self.session() = Some(Session {
            jobs: tx,
            tasks: vec![receiver, scheduler],
        });
    }

    /// Report a fatal error and close the session
    ///
    /// Only the first failure of a session is reported.
    pub(crate) fn fail(self: &Arc<Self>, kind: DeviceErrorKind) {
        if self.faulted.swap(true, Ordering::SeqCst) {
            return;
        }
        error!("Device error: {}", kind);
        self.events.emit(RadioEvent::DeviceError(kind));

        let shared = Arc::clone(self);
        tokio::spawn(async move {
            shared.teardown().await;
        });
    }

    /// Stop the session tasks and close the transport
    ///
    /// Returns false if there was no session.
    async fn teardown(&self) -> bool {
        let session = self.session().take();
        let Some(session) = session else {
            return false;
        };
        for task in &session.tasks {
            task.abort();
        }
        drop(session);
        self.epoch.advance();

        {
            let mut transport = self.transport.lock().await;
            if transport.is_open() {
                if let Err(e) = transport.close().await {
                    warn!("Error closing transport: {}", e);
                }
            }
        }

        self.power.reset();
        self.state.reset();
        info!("Session closed");
        self.events.emit(RadioEvent::Closed);
        true
    }

    /// Start polling signal strength under `generation`
    pub(crate) fn restart_signal_poll(&self, generation: u64) {
        let Some(interval) = self.config.signal_poll() else {
            return;
        };
        if self.power.status() != PowerStatus::PoweredOn {
            return;
        }
        if let Some(jobs) = self.jobs() {
            retrier::spawn_signal_poller(jobs, self.epoch.clone(), interval, generation);
        }
    }

    /// Save station, tone settings and seek mode
    pub(crate) fn persist(&self) {
        let state = self.state.snapshot();
        let settings = &self.settings;

        settings.put_bool(keys::SEEK_ALL, self.seek_all());
        settings.put_int(keys::FREQUENCY, state.tune.frequency);
        settings.put_string(keys::BAND, state.tune.band.name());
        let subchannel = if state.hd_active {
            state.hd_subchannel
        } else {
            0
        };
        settings.put_int(keys::SUBCHANNEL, subchannel);
        settings.put_int(keys::VOLUME, state.volume);
        settings.put_int(keys::BASS, state.bass);
        settings.put_int(keys::TREBLE, state.treble);

        match settings.flush() {
            Ok(()) => debug!("Saved settings for {}", state.tune.with_subchannel(subchannel)),
            Err(e) => warn!("Failed to save settings: {}", e),
        }
    }
}

/// Host-side driver for one HD Radio tuner
pub struct HdRadio {
    shared: Arc<Shared>,
}

impl HdRadio {
    pub fn new<T, H>(
        transport: T,
        settings: Arc<dyn SettingsStore>,
        handler: H,
        config: DriverConfig,
    ) -> Self
    where
        T: Transport + 'static,
        H: RadioEventHandler,
    {
        let shared = Shared {
            config,
            transport: tokio::sync::Mutex::new(Box::new(transport)),
            state: RadioStateStore::new(),
            events: EventDispatcher::new(handler),
            settings,
            power: PowerSequencer::new(),
            epoch: Epoch::new(),
            seek_all: AtomicBool::new(true),
            faulted: AtomicBool::new(false),
            session: std::sync::Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.shared.config
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Open the first matching device and start the session
    pub async fn open(&self) -> Result<(), DriverError> {
        self.open_with(None).await
    }

    /// Open the device with the given identifier
    pub async fn open_by_id(&self, id: &str) -> Result<(), DriverError> {
        self.open_with(Some(id)).await
    }

    async fn open_with(&self, id: Option<&str>) -> Result<(), DriverError> {
        let _lifecycle = self.shared.lifecycle.lock().await;

        if self.shared.has_session() {
            debug!("Already open");
            self.shared.events.emit(RadioEvent::Opened(true));
            return Ok(());
        }

        let opened = {
            let mut transport = self.shared.transport.lock().await;
            match id {
                Some(id) => transport.open_by_id(id).await,
                None => transport.open().await,
            }
        };
        if let Err(e) = opened {
            warn!("Open failed: {}", e);
            self.shared.events.emit(RadioEvent::Opened(false));
            return Err(DriverError::OpenFailed(e));
        }

        self.shared.start_session();
        info!("Session opened");
        self.shared.events.emit(RadioEvent::Opened(true));
        Ok(())
    }

    /// Power off if needed, let queued requests drain, then close
    pub async fn close(&self) {
        let _lifecycle = self.shared.lifecycle.lock().await;

        let (done_tx, done_rx) = oneshot::channel();
        let job = if self
            .shared
            .power
            .transition(PowerStatus::PoweredOn, PowerStatus::PoweringOff)
        {
            Job::PowerOff {
                done: Some(done_tx),
            }
        } else {
            Job::Barrier(done_tx)
        };
        if self.shared.enqueue(job).is_ok() {
            // an aborted scheduler drops the sender
            let _ = done_rx.await;
        }

        self.shared.teardown().await;
    }

    pub fn is_open(&self) -> bool {
        self.shared.has_session()
    }

    /// Identifiers of devices the transport could open
    pub async fn list_devices(&self) -> Result<Vec<String>, DriverError> {
        let transport = self.shared.transport.lock().await;
        Ok(transport.list_devices()?)
    }

    /// Identifier of the open device
    pub async fn identifier(&self) -> Option<String> {
        self.shared.transport.lock().await.identifier()
    }

    // -------------------------------------------------------------------------
    // Power
    // -------------------------------------------------------------------------

    /// Start the power-on sequence
    ///
    /// Does nothing unless the tuner is powered off.
    pub fn power_on(&self) -> Result<(), DriverError> {
        self.begin_power(PowerStatus::PoweredOff, PowerStatus::PoweringOn, Job::PowerOn)
    }

    /// Start the power-off sequence
    ///
    /// Does nothing unless the tuner is powered on.
    pub fn power_off(&self) -> Result<(), DriverError> {
        self.begin_power(
            PowerStatus::PoweredOn,
            PowerStatus::PoweringOff,
            Job::PowerOff { done: None },
        )
    }

    fn begin_power(&self, from: PowerStatus, to: PowerStatus, job: Job) -> Result<(), DriverError> {
        if !self.is_open() {
            return Err(DriverError::NotConnected);
        }
        if !self.shared.power.transition(from, to) {
            debug!("Ignoring power request while {}", self.power_status());
            return Ok(());
        }
        if let Err(e) = self.shared.enqueue(job) {
            self.shared.power.reset();
            return Err(e);
        }
        Ok(())
    }

    pub fn power_status(&self) -> PowerStatus {
        self.shared.power.status()
    }

    // -------------------------------------------------------------------------
    // Audio
    // -------------------------------------------------------------------------

    pub fn mute_on(&self) -> Result<(), DriverError> {
        self.submit(Message::set(RadioCommand::Mute, Payload::Boolean(true)))
    }

    pub fn mute_off(&self) -> Result<(), DriverError> {
        self.submit(Message::set(RadioCommand::Mute, Payload::Boolean(false)))
    }

    /// Set the volume, 0..=90
    pub fn set_volume(&self, value: i32) -> Result<(), DriverError> {
        self.submit(Message::set(RadioCommand::Volume, Payload::Integer(value)))
    }

    /// Raise the volume one step; false if already at the top
    pub fn volume_up(&self) -> Result<bool, DriverError> {
        self.step(RadioCommand::Volume, 1)
    }

    pub fn volume_down(&self) -> Result<bool, DriverError> {
        self.step(RadioCommand::Volume, -1)
    }

    pub fn set_bass(&self, value: i32) -> Result<(), DriverError> {
        self.submit(Message::set(RadioCommand::Bass, Payload::Integer(value)))
    }

    pub fn bass_up(&self) -> Result<bool, DriverError> {
        self.step(RadioCommand::Bass, 1)
    }

    pub fn bass_down(&self) -> Result<bool, DriverError> {
        self.step(RadioCommand::Bass, -1)
    }

    pub fn set_treble(&self, value: i32) -> Result<(), DriverError> {
        self.submit(Message::set(RadioCommand::Treble, Payload::Integer(value)))
    }

    pub fn treble_up(&self) -> Result<bool, DriverError> {
        self.step(RadioCommand::Treble, 1)
    }

    pub fn treble_down(&self) -> Result<bool, DriverError> {
        self.step(RadioCommand::Treble, -1)
    }

    fn step(&self, command: RadioCommand, delta: i32) -> Result<bool, DriverError> {
        let current = self.shared.state.setting(command).unwrap_or(SETTING_MIN);
        let next = current + delta;
        if !(SETTING_MIN..=SETTING_MAX).contains(&next) {
            debug!("{} already at {}", command, current);
            return Ok(false);
        }
        self.submit(Message::set(command, Payload::Integer(next)))?;
        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Tuning
    // -------------------------------------------------------------------------

    /// Tune to a station, then lock its subchannel if one is given
    pub fn tune(&self, tune: TuneInfo) -> Result<(), DriverError> {
        let msg = Message::set(RadioCommand::Tune, Payload::Tune(tune));
        msg.encode()?;

        let generation = self.shared.epoch.advance();
        self.shared.enqueue(Job::Command(msg))?;
        if tune.subchannel > 0 {
            self.shared.enqueue(Job::Subchannel {
                generation,
                subchannel: tune.subchannel,
                attempt: 1,
            })?;
        }
        self.shared.restart_signal_poll(generation);
        Ok(())
    }

    pub fn tune_up(&self) -> Result<(), DriverError> {
        self.retune(Payload::TuneStep(Direction::Up))
    }

    pub fn tune_down(&self) -> Result<(), DriverError> {
        self.retune(Payload::TuneStep(Direction::Down))
    }

    pub fn seek_up(&self) -> Result<(), DriverError> {
        self.seek(Direction::Up)
    }

    pub fn seek_down(&self) -> Result<(), DriverError> {
        self.seek(Direction::Down)
    }

    fn seek(&self, direction: Direction) -> Result<(), DriverError> {
        let request = SeekRequest {
            direction,
            band: self.shared.state.tune().band,
            seek_all: self.shared.seek_all(),
        };
        let msg = Message::set(RadioCommand::Seek, Payload::Seek(request));
        msg.encode()?;

        let generation = self.shared.epoch.advance();
        self.shared.enqueue(Job::Command(msg))?;
        self.shared.restart_signal_poll(generation);
        Ok(())
    }

    fn retune(&self, payload: Payload) -> Result<(), DriverError> {
        let msg = Message::set(RadioCommand::Tune, payload);
        msg.encode()?;

        let generation = self.shared.epoch.advance();
        self.shared.enqueue(Job::Command(msg))?;
        self.shared.restart_signal_poll(generation);
        Ok(())
    }

    /// Switch HD subchannel, retrying until the tuner reports it
    ///
    /// Subchannel 0 is sent once; only a real subchannel is retried.
    pub fn set_hd_subchannel(&self, subchannel: i32) -> Result<(), DriverError> {
        let msg = Message::set(RadioCommand::HdSubchannel, Payload::Integer(subchannel));
        msg.encode()?;

        let generation = self.shared.epoch.advance();
        if subchannel > 0 {
            self.shared.enqueue(Job::Subchannel {
                generation,
                subchannel,
                attempt: 1,
            })?;
        } else {
            self.shared.enqueue(Job::Command(msg))?;
        }
        self.shared.restart_signal_poll(generation);
        Ok(())
    }

    /// Ask the tuner to report `command`
    pub fn request_update(&self, command: RadioCommand) -> Result<(), DriverError> {
        self.submit(Message::get(command))
    }

    pub fn set_seek_all(&self, seek_all: bool) {
        self.shared.seek_all.store(seek_all, Ordering::SeqCst);
        self.shared.settings.put_bool(keys::SEEK_ALL, seek_all);
    }

    pub fn seek_all(&self) -> bool {
        self.shared.seek_all()
    }

    /// Validate and queue a single request
    fn submit(&self, msg: Message) -> Result<(), DriverError> {
        msg.encode()?;
        self.shared.enqueue(Job::Command(msg))
    }

    // -------------------------------------------------------------------------
    // State accessors
    // -------------------------------------------------------------------------

    /// Copy of the full tuner state
    pub fn state(&self) -> RadioState {
        self.shared.state.snapshot()
    }

    /// Whether the tuner last reported itself powered
    pub fn power(&self) -> bool {
        self.shared.state.read(|s| s.power)
    }

    pub fn mute(&self) -> bool {
        self.shared.state.read(|s| s.mute)
    }

    pub fn signal_strength(&self) -> i32 {
        self.shared.state.read(|s| s.signal_strength)
    }

    pub fn tune_info(&self) -> TuneInfo {
        self.shared.state.tune()
    }

    pub fn hd_active(&self) -> bool {
        self.shared.state.hd_active()
    }

    pub fn hd_stream_lock(&self) -> bool {
        self.shared.state.read(|s| s.hd_stream_lock)
    }

    pub fn hd_signal_strength(&self) -> i32 {
        self.shared.state.read(|s| s.hd_signal_strength)
    }

    pub fn hd_subchannel(&self) -> i32 {
        self.shared.state.hd_subchannel()
    }

    pub fn hd_subchannel_count(&self) -> i32 {
        self.shared.state.read(|s| s.hd_subchannel_count)
    }

    pub fn hd_enable_hd_tuner(&self) -> i32 {
        self.shared.state.read(|s| s.hd_enable_hd_tuner)
    }

    /// Title on the current subchannel
    pub fn hd_title(&self) -> String {
        self.shared.state.read(|s| s.hd_title.clone())
    }

    /// Last title seen on `subchannel`
    pub fn hd_title_for(&self, subchannel: i32) -> Option<String> {
        self.shared.state.read(|s| s.titles.get(&subchannel).cloned())
    }

    pub fn hd_artist(&self) -> String {
        self.shared.state.read(|s| s.hd_artist.clone())
    }

    pub fn hd_artist_for(&self, subchannel: i32) -> Option<String> {
        self.shared.state.read(|s| s.artists.get(&subchannel).cloned())
    }

    pub fn hd_callsign(&self) -> String {
        self.shared.state.read(|s| s.hd_callsign.clone())
    }

    pub fn hd_station_name(&self) -> String {
        self.shared.state.read(|s| s.hd_station_name.clone())
    }

    pub fn hd_unique_id(&self) -> String {
        self.shared.state.read(|s| s.hd_unique_id.clone())
    }

    pub fn hd_api_version(&self) -> String {
        self.shared.state.read(|s| s.hd_api_version.clone())
    }

    pub fn hd_hw_version(&self) -> String {
        self.shared.state.read(|s| s.hd_hw_version.clone())
    }

    pub fn rds_enabled(&self) -> bool {
        self.shared.state.read(|s| s.rds_enabled)
    }

    pub fn rds_genre(&self) -> String {
        self.shared.state.read(|s| s.rds_genre.clone())
    }

    pub fn rds_program_service(&self) -> String {
        self.shared.state.read(|s| s.rds_program_service.clone())
    }

    pub fn rds_radio_text(&self) -> String {
        self.shared.state.read(|s| s.rds_radio_text.clone())
    }

    pub fn volume(&self) -> i32 {
        self.shared.state.read(|s| s.volume)
    }

    pub fn bass(&self) -> i32 {
        self.shared.state.read(|s| s.bass)
    }

    pub fn treble(&self) -> i32 {
        self.shared.state.read(|s| s.treble)
    }

    pub fn compression(&self) -> i32 {
        self.shared.state.read(|s| s.compression)
    }
}

impl Drop for HdRadio {
    fn drop(&mut self) {
        // the session tasks hold the shared state; stop them so it can be freed
        if let Some(session) = self.shared.session().take() {
            debug!("Dropping open session");
            for task in session.tasks {
                task.abort();
            }
        }
    }
}
