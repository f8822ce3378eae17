//! Command scheduler
//!
//! A single task owns every outbound write. Jobs arrive on an unbounded
//! channel and run strictly in order, so the tuner never sees two frames
//! closer together than the command delay, and nothing is written while the
//! post-tune window is still open.
//!
//! Power sequences run on this task too (see [`crate::power`]), which makes
//! them naturally serialized with the commands around them.

use std::sync::Arc;

use hdradio_protocol::{Message, Operation, Payload, RadioCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{DeviceErrorKind, DriverError};
use crate::events::RadioEvent;
use crate::power::PowerStatus;
use crate::radio::Shared;
use crate::receiver::trace_frame;
use crate::retrier;
use crate::transport::ControlLine;

/// Work items for the scheduler task
#[derive(Debug)]
pub(crate) enum Job {
    /// Encode and write one request
    Command(Message),
    PowerOn,
    PowerOff {
        done: Option<oneshot::Sender<()>>,
    },
    /// Select a subchannel, re-sending until the tuner reports it
    Subchannel {
        generation: u64,
        subchannel: i32,
        attempt: u32,
    },
    /// Ask for the signal strength that fits the current station
    SignalPoll { generation: u64 },
    /// Completes once every earlier job has run
    Barrier(oneshot::Sender<()>),
}

pub(crate) struct CommandScheduler {
    pub(crate) shared: Arc<Shared>,
    /// Nothing is written before this instant
    settle_until: Option<Instant>,
}

impl CommandScheduler {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            settle_until: None,
        }
    }

    pub(crate) async fn run(mut self, mut jobs: mpsc::UnboundedReceiver<Job>) {
        info!("Command scheduler started");

        while let Some(job) = jobs.recv().await {
            match self.handle(job).await {
                Ok(()) => {}
                Err(DriverError::PowerTimeout) => {
                    warn!("Tuner did not confirm power on");
                    self.shared
                        .events
                        .emit(RadioEvent::DeviceError(DeviceErrorKind::PowerTimeout));
                }
                Err(e) => match e.device_error() {
                    Some(kind) => {
                        warn!("Fatal device error: {}", e);
                        self.shared.fail(kind);
                        break;
                    }
                    None => warn!("Dropped request: {}", e),
                },
            }
        }

        debug!("Command scheduler stopped");
    }

    async fn handle(&mut self, job: Job) -> Result<(), DriverError> {
        match job {
            Job::Command(msg) => self.dispatch(&msg).await,
            Job::PowerOn => self.power_on().await,
            Job::PowerOff { done } => {
                let result = self.power_off().await;
                if let Some(done) = done {
                    let _ = done.send(());
                }
                result
            }
            Job::Subchannel {
                generation,
                subchannel,
                attempt,
            } => self.select_subchannel(generation, subchannel, attempt).await,
            Job::SignalPoll { generation } => self.poll_signal(generation).await,
            Job::Barrier(done) => {
                let _ = done.send(());
                Ok(())
            }
        }
    }

    /// Write one request and hold the line for the command delay
    ///
    /// Requests that cannot be encoded are logged and dropped.
    pub(crate) async fn dispatch(&mut self, msg: &Message) -> Result<(), DriverError> {
        let frame = match msg.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Not sending {} {}: {}", msg.operation, msg.command, e);
                return Ok(());
            }
        };

        if let Some(until) = self.settle_until.take() {
            sleep_until(until).await;
        }

        {
            let mut transport = self.shared.transport.lock().await;
            if !transport.is_open() {
                return Err(DriverError::NotConnected);
            }
            debug!("Sending {} {}", msg.operation, msg.command);
            trace_frame("TX", &frame);
            transport.write(&frame).await?;
        }

        if is_direct_tune(msg) {
            self.settle_until = self
                .shared
                .config
                .post_tune_delay()
                .map(|delay| Instant::now() + delay);
        }

        sleep(self.shared.config.command_delay()).await;
        Ok(())
    }

    pub(crate) async fn set_line(&self, line: ControlLine, state: bool) -> Result<(), DriverError> {
        let mut transport = self.shared.transport.lock().await;
        if !transport.is_open() {
            return Err(DriverError::NotConnected);
        }
        debug!("{} {}", if state { "Raising" } else { "Clearing" }, line);
        transport.set_line(line, state).await?;
        Ok(())
    }

    async fn select_subchannel(
        &mut self,
        generation: u64,
        subchannel: i32,
        attempt: u32,
    ) -> Result<(), DriverError> {
        if !self.shared.epoch.is_current(generation) {
            trace!("Subchannel {} request superseded", subchannel);
            return Ok(());
        }
        if attempt > 1 && self.shared.state.hd_subchannel() == subchannel {
            debug!("Subchannel {} locked after {} attempt(s)", subchannel, attempt - 1);
            return Ok(());
        }
        let max_attempts = self.shared.config.subchannel_max_attempts;
        if attempt > max_attempts {
            warn!(
                "Tuner did not switch to subchannel {} after {} attempts",
                subchannel, max_attempts
            );
            return Ok(());
        }

        self.dispatch(&Message::set(
            RadioCommand::HdSubchannel,
            Payload::Integer(subchannel),
        ))
        .await?;

        if let Some(jobs) = self.shared.jobs() {
            retrier::schedule_subchannel_check(
                jobs,
                self.shared.config.subchannel_retry(),
                generation,
                subchannel,
                attempt + 1,
            );
        }
        Ok(())
    }

    async fn poll_signal(&mut self, generation: u64) -> Result<(), DriverError> {
        if !self.shared.epoch.is_current(generation)
            || self.shared.power.status() != PowerStatus::PoweredOn
        {
            return Ok(());
        }
        let command = if self.shared.state.hd_active() {
            RadioCommand::HdSignalStrength
        } else {
            RadioCommand::SignalStrength
        };
        self.dispatch(&Message::get(command)).await
    }
}

fn is_direct_tune(msg: &Message) -> bool {
    msg.command == RadioCommand::Tune
        && msg.operation == Operation::Set
        && matches!(msg.payload, Payload::Tune(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdradio_protocol::{Band, Direction, TuneInfo};

    #[test]
    fn test_only_direct_tune_arms_settle_window() {
        let direct = Message::set(
            RadioCommand::Tune,
            Payload::Tune(TuneInfo::new(Band::Fm, 1011, 0)),
        );
        let step = Message::set(RadioCommand::Tune, Payload::TuneStep(Direction::Up));
        let get = Message::get(RadioCommand::Tune);

        assert!(is_direct_tune(&direct));
        assert!(!is_direct_tune(&step));
        assert!(!is_direct_tune(&get));
    }
}
