//! Simulated transport
//!
//! [`SimTransport`] plugs a [`VirtualTuner`] into the driver in place of a
//! serial port. DTR switches the tuner's power the way the cable does, and
//! the [`SimHandle`] lets a test inspect the traffic or inject faults while
//! the driver owns the transport.

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use hdradio_engine::{ControlLine, Transport, TransportError};
use hdradio_protocol::{Message, StreamParser};
use tracing::debug;

use crate::tuner::VirtualTuner;

/// Everything the transport and its handles share
#[derive(Debug)]
struct SimDevice {
    tuner: VirtualTuner,
    parser: StreamParser,
    rx: VecDeque<u8>,
    open: bool,
    present: bool,
    rts: bool,
    dtr: bool,
    line_log: Vec<(ControlLine, bool)>,
    fail_writes: bool,
    fail_reads: bool,
    fail_lines: bool,
}

impl SimDevice {
    fn set_line(&mut self, line: ControlLine, state: bool) {
        self.line_log.push((line, state));
        match line {
            ControlLine::Rts => self.rts = state,
            ControlLine::Dtr => {
                self.dtr = state;
                if state {
                    self.tuner.power_on();
                } else {
                    self.tuner.power_off();
                }
            }
        }
    }

    fn write(&mut self, data: &[u8]) {
        let Self { parser, tuner, .. } = self;
        for msg in parser.feed(data) {
            if let Err(e) = tuner.handle_request(&msg) {
                debug!("Virtual tuner: {}", e);
            }
        }
    }

    fn read(&mut self, max: usize) -> Vec<u8> {
        while let Some(frame) = self.tuner.take_output() {
            self.rx.extend(frame);
        }
        let n = max.min(self.rx.len());
        self.rx.drain(..n).collect()
    }
}

fn lock(device: &Mutex<SimDevice>) -> MutexGuard<'_, SimDevice> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport backed by a virtual tuner
#[derive(Debug)]
pub struct SimTransport {
    id: String,
    device: Arc<Mutex<SimDevice>>,
}

impl SimTransport {
    pub fn new(tuner: VirtualTuner) -> Self {
        let id = tuner.config().id.clone();
        let device = SimDevice {
            tuner,
            parser: StreamParser::new(),
            rx: VecDeque::new(),
            open: false,
            present: true,
            rts: false,
            dtr: false,
            line_log: Vec::new(),
            fail_writes: false,
            fail_reads: false,
            fail_lines: false,
        };
        Self {
            id,
            device: Arc::new(Mutex::new(device)),
        }
    }

    /// A handle for inspecting the device after the driver takes the transport
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            device: Arc::clone(&self.device),
        }
    }
}

#[async_trait]
impl Transport for SimTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let mut device = lock(&self.device);
        if !device.present {
            return Err(TransportError::NoDevice("no simulated tuner attached".into()));
        }
        device.open = true;
        // the cable holds the tuner muted while connected
        device.set_line(ControlLine::Rts, true);
        debug!("Opened simulated tuner {}", self.id);
        Ok(())
    }

    async fn open_by_id(&mut self, id: &str) -> Result<(), TransportError> {
        if id != self.id {
            return Err(TransportError::NoDevice(id.to_string()));
        }
        self.open().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        let mut device = lock(&self.device);
        if device.dtr {
            device.set_line(ControlLine::Dtr, false);
        }
        if device.rts {
            device.set_line(ControlLine::Rts, false);
        }
        device.open = false;
        device.rx.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        lock(&self.device).open
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let mut device = lock(&self.device);
        if !device.open {
            return Err(TransportError::NotOpen);
        }
        if device.fail_reads {
            return Err(TransportError::Read(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated read failure",
            )));
        }
        Ok(device.read(max))
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        let mut device = lock(&self.device);
        if !device.open {
            return Err(TransportError::NotOpen);
        }
        if device.fail_writes {
            return Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            )));
        }
        device.write(data);
        Ok(())
    }

    async fn set_line(&mut self, line: ControlLine, state: bool) -> Result<(), TransportError> {
        let mut device = lock(&self.device);
        if !device.open {
            return Err(TransportError::NotOpen);
        }
        if device.fail_lines {
            return Err(TransportError::line(line, state, "simulated line failure"));
        }
        device.set_line(line, state);
        Ok(())
    }

    fn list_devices(&self) -> Result<Vec<String>, TransportError> {
        let device = lock(&self.device);
        Ok(if device.present {
            vec![self.id.clone()]
        } else {
            Vec::new()
        })
    }

    fn identifier(&self) -> Option<String> {
        lock(&self.device).open.then(|| self.id.clone())
    }
}

/// Test-side view of a [`SimTransport`]
#[derive(Debug, Clone)]
pub struct SimHandle {
    device: Arc<Mutex<SimDevice>>,
}

impl SimHandle {
    /// Run `f` against the virtual tuner
    pub fn with_tuner<R>(&self, f: impl FnOnce(&mut VirtualTuner) -> R) -> R {
        f(&mut lock(&self.device).tuner)
    }

    /// Every request the tuner received
    pub fn requests(&self) -> Vec<Message> {
        self.with_tuner(|t| t.requests().to_vec())
    }

    /// Control line changes, in order
    pub fn line_log(&self) -> Vec<(ControlLine, bool)> {
        lock(&self.device).line_log.clone()
    }

    pub fn is_powered(&self) -> bool {
        self.with_tuner(|t| t.is_powered())
    }

    pub fn is_open(&self) -> bool {
        lock(&self.device).open
    }

    /// Detach or reattach the simulated device
    pub fn set_present(&self, present: bool) {
        lock(&self.device).present = present;
    }

    pub fn fail_writes(&self, fail: bool) {
        lock(&self.device).fail_writes = fail;
    }

    pub fn fail_reads(&self, fail: bool) {
        lock(&self.device).fail_reads = fail;
    }

    pub fn fail_lines(&self, fail: bool) {
        lock(&self.device).fail_lines = fail;
    }

    /// Queue raw bytes as if the tuner had sent them
    pub fn inject(&self, bytes: &[u8]) {
        lock(&self.device).rx.extend(bytes.iter().copied());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdradio_protocol::{Payload, RadioCommand};

    #[tokio::test]
    async fn test_dtr_switches_power() {
        let mut transport = SimTransport::new(VirtualTuner::new());
        let handle = transport.handle();
        transport.open().await.unwrap();

        transport.raise_dtr().await.unwrap();
        assert!(handle.is_powered());

        let mut parser = StreamParser::new();
        let bytes = transport.read(256).await.unwrap();
        let msgs: Vec<_> = parser.feed(&bytes).collect();
        assert_eq!(
            msgs,
            vec![Message::reply(RadioCommand::Power, Payload::Boolean(true))]
        );

        transport.close().await.unwrap();
        assert!(!handle.is_powered());
        assert_eq!(
            handle.line_log(),
            vec![
                (ControlLine::Rts, true),
                (ControlLine::Dtr, true),
                (ControlLine::Dtr, false),
                (ControlLine::Rts, false),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_reaches_tuner() {
        let mut transport = SimTransport::new(VirtualTuner::new());
        let handle = transport.handle();
        transport.open().await.unwrap();
        transport.raise_dtr().await.unwrap();

        let frame = Message::set(RadioCommand::Volume, Payload::Integer(12))
            .encode()
            .unwrap();
        // split across writes like a slow link
        transport.write(&frame[..3]).await.unwrap();
        transport.write(&frame[3..]).await.unwrap();

        assert_eq!(handle.with_tuner(|t| t.volume()), 12);
    }

    #[tokio::test]
    async fn test_read_respects_max() {
        let mut transport = SimTransport::new(VirtualTuner::new());
        let handle = transport.handle();
        transport.open().await.unwrap();
        handle.inject(&[1, 2, 3, 4, 5]);

        assert_eq!(transport.read(3).await.unwrap(), vec![1, 2, 3]);
        assert_eq!(transport.read(3).await.unwrap(), vec![4, 5]);
        assert!(transport.read(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_faults() {
        let mut transport = SimTransport::new(VirtualTuner::new());
        let handle = transport.handle();

        handle.set_present(false);
        assert!(matches!(transport.open().await, Err(TransportError::NoDevice(_))));
        assert!(transport.list_devices().unwrap().is_empty());

        handle.set_present(true);
        assert!(transport.open_by_id("nope").await.is_err());
        transport.open_by_id("SIM-0001").await.unwrap();
        assert_eq!(transport.identifier().as_deref(), Some("SIM-0001"));

        handle.fail_writes(true);
        assert!(matches!(
            transport.write(&[0xA4]).await,
            Err(TransportError::Write(_))
        ));
        handle.fail_reads(true);
        assert!(matches!(transport.read(8).await, Err(TransportError::Read(_))));
        handle.fail_lines(true);
        assert!(matches!(
            transport.raise_dtr().await,
            Err(TransportError::Line { .. })
        ));
    }
}
