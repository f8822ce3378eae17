//! Power sequencing
//!
//! The tuner is switched with the serial control lines:
//!
//! - **On:** raise RTS, raise DTR, wait for the tuner to report POWER = true,
//!   let it settle, drop RTS, restore the saved station and tone settings,
//!   then read the identity strings. The API version reply ends
//!   initialization.
//! - **Off:** raise RTS, drop DTR, drop RTS, then save the current station
//!   and tone settings.
//!
//! Consecutive transitions are spaced at least `power_spacing` apart.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use hdradio_protocol::{Band, Message, Payload, RadioCommand, TuneInfo};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::DriverError;
use crate::events::RadioEvent;
use crate::radio::Shared;
use crate::scheduler::{CommandScheduler, Job};
use crate::settings::keys;
use crate::state::StateHook;
use crate::transport::ControlLine;

/// Where the tuner is in its power cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PowerStatus {
    PoweredOff = 0,
    PoweringOn = 1,
    /// Powered, waiting for the identity replies
    Initializing = 2,
    PoweredOn = 3,
    PoweringOff = 4,
}

impl PowerStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::PoweringOn,
            2 => Self::Initializing,
            3 => Self::PoweredOn,
            4 => Self::PoweringOff,
            _ => Self::PoweredOff,
        }
    }
}

impl std::fmt::Display for PowerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PoweredOff => "off",
            Self::PoweringOn => "powering on",
            Self::Initializing => "initializing",
            Self::PoweredOn => "on",
            Self::PoweringOff => "powering off",
        };
        f.write_str(s)
    }
}

/// Power status plus the signals the sequences wait on
pub(crate) struct PowerSequencer {
    status: AtomicU8,
    /// Held for the whole of a transition
    last_transition: Mutex<Option<Instant>>,
    power_replies: watch::Sender<u64>,
    init_replies: watch::Sender<u64>,
}

impl PowerSequencer {
    pub(crate) fn new() -> Self {
        Self {
            status: AtomicU8::new(PowerStatus::PoweredOff as u8),
            last_transition: Mutex::new(None),
            power_replies: watch::channel(0).0,
            init_replies: watch::channel(0).0,
        }
    }

    pub(crate) fn status(&self) -> PowerStatus {
        PowerStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: PowerStatus) {
        debug!("Power status: {}", status);
        self.status.store(status as u8, Ordering::SeqCst);
    }

    /// Move from `from` to `to` if nobody else got there first
    pub(crate) fn transition(&self, from: PowerStatus, to: PowerStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn reset(&self) {
        self.set_status(PowerStatus::PoweredOff);
    }

    /// Wake a sequence waiting on a reply
    pub(crate) fn notify(&self, hook: StateHook) {
        let signal = match hook {
            StateHook::PowerOn => &self.power_replies,
            StateHook::InitComplete => &self.init_replies,
        };
        signal.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// Take the transition lock, then wait out the spacing since the last one
    async fn begin(&self, spacing: std::time::Duration) -> MutexGuard<'_, Option<Instant>> {
        let last = self.last_transition.lock().await;
        if let Some(at) = *last {
            sleep_until(at + spacing).await;
        }
        last
    }
}

impl CommandScheduler {
    pub(crate) async fn power_on(&mut self) -> Result<(), DriverError> {
        let result = self.power_on_sequence().await;
        if result.is_err() {
            let power = &self.shared.power;
            if matches!(
                power.status(),
                PowerStatus::PoweringOn | PowerStatus::Initializing
            ) {
                power.reset();
            }
        }
        result
    }

    async fn power_on_sequence(&mut self) -> Result<(), DriverError> {
        let shared = Arc::clone(&self.shared);
        let power = &shared.power;
        let config = &shared.config;

        let mut last = power.begin(config.power_spacing()).await;
        if power.status() != PowerStatus::PoweringOn {
            debug!("Power on cancelled");
            return Ok(());
        }
        info!("Powering on");

        let mut confirmed = power.power_replies.subscribe();
        self.set_line(ControlLine::Rts, true).await?;
        self.set_line(ControlLine::Dtr, true).await?;

        let powered = matches!(
            timeout(config.power_timeout(), confirmed.changed()).await,
            Ok(Ok(()))
        );
        if !powered {
            if let Err(e) = self.set_line(ControlLine::Dtr, false).await {
                warn!("Failed to clear DTR after power timeout: {}", e);
            }
            if let Err(e) = self.set_line(ControlLine::Rts, false).await {
                warn!("Failed to clear RTS after power timeout: {}", e);
            }
            power.reset();
            *last = Some(Instant::now());
            return Err(DriverError::PowerTimeout);
        }

        power.set_status(PowerStatus::Initializing);
        sleep(config.power_settle()).await;
        self.set_line(ControlLine::Rts, false).await?;

        self.restore_settings().await?;

        let mut initialized = power.init_replies.subscribe();
        for command in [
            RadioCommand::HdUniqueId,
            RadioCommand::HdHwVersion,
            RadioCommand::HdApiVersion,
        ] {
            self.dispatch(&Message::get(command)).await?;
        }
        if timeout(config.init_timeout(), initialized.changed())
            .await
            .is_err()
        {
            debug!("No API version reply, finishing initialization anyway");
        }

        power.set_status(PowerStatus::PoweredOn);
        *last = Some(Instant::now());
        drop(last);

        info!("Powered on");
        shared.events.emit(RadioEvent::PowerOn);
        shared.restart_signal_poll(shared.epoch.current());
        Ok(())
    }

    /// Replay what the last power off saved
    async fn restore_settings(&mut self) -> Result<(), DriverError> {
        let settings = Arc::clone(&self.shared.settings);

        for (command, key) in [
            (RadioCommand::Volume, keys::VOLUME),
            (RadioCommand::Bass, keys::BASS),
            (RadioCommand::Treble, keys::TREBLE),
        ] {
            let value = settings.get_int(key, -1);
            if value >= 0 {
                self.dispatch(&Message::set(command, Payload::Integer(value)))
                    .await?;
            }
        }

        let frequency = settings.get_int(keys::FREQUENCY, 0);
        if frequency <= 0 {
            return Ok(());
        }
        let band = match settings.get_string(keys::BAND, "FM").parse::<Band>() {
            Ok(band) => band,
            Err(e) => {
                warn!("Ignoring saved band: {}", e);
                return Ok(());
            }
        };
        let tune = TuneInfo::new(band, frequency, settings.get_int(keys::SUBCHANNEL, 0));
        info!("Restoring {}", tune);

        let generation = self.shared.epoch.advance();
        self.dispatch(&Message::set(RadioCommand::Tune, Payload::Tune(tune)))
            .await?;
        if tune.subchannel > 0 {
            self.shared.enqueue(Job::Subchannel {
                generation,
                subchannel: tune.subchannel,
                attempt: 1,
            })?;
        }
        Ok(())
    }

    pub(crate) async fn power_off(&mut self) -> Result<(), DriverError> {
        let result = self.power_off_sequence().await;
        if result.is_err() && self.shared.power.status() == PowerStatus::PoweringOff {
            self.shared.power.reset();
        }
        result
    }

    async fn power_off_sequence(&mut self) -> Result<(), DriverError> {
        let shared = Arc::clone(&self.shared);
        let power = &shared.power;

        let mut last = power.begin(shared.config.power_spacing()).await;
        if power.status() != PowerStatus::PoweringOff {
            debug!("Power off cancelled");
            return Ok(());
        }
        info!("Powering off");

        // stops the subchannel retrier and the signal poller
        shared.epoch.advance();

        self.set_line(ControlLine::Rts, true).await?;
        self.set_line(ControlLine::Dtr, false).await?;
        self.set_line(ControlLine::Rts, false).await?;

        shared.persist();

        power.set_status(PowerStatus::PoweredOff);
        *last = Some(Instant::now());
        drop(last);

        info!("Powered off");
        shared.events.emit(RadioEvent::PowerOff);
        Ok(())
    }
}
