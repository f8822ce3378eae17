//! Serial port transports
//!
//! Two kinds of hardware sit between the host and the tuner:
//!
//! - **MJS cable**: an FTDI adapter whose RTS line is the tuner's hardware
//!   mute and whose DTR line is its power switch.
//! - **Microcontroller bridge**: a board on a generic USB serial adapter that
//!   forwards frames and drives the tuner's lines when told to in-band.
//!
//! Both run at 115200 8N1 without flow control and use tokio_serial streams.

use std::time::Duration;

use async_trait::async_trait;
use hdradio_detect::{
    identify_bridge, BridgeIdentifyConfig, DeviceKind, PortScanner, SerialPortInfo,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use crate::transport::{ControlLine, Transport, TransportError};

/// Port settings shared by both serial backends
#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// Pause after each in-band line request to a bridge
    pub bridge_line_delay: Duration,
    /// Wait after opening a bridge before talking to it
    pub bridge_init_delay: Duration,
    /// Init wait for CH34x adapters, which reset the board on open
    pub ch34x_init_delay: Duration,
    /// Bridge id handshake settings
    pub identify: BridgeIdentifyConfig,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            bridge_line_delay: Duration::from_millis(20),
            bridge_init_delay: Duration::from_millis(200),
            ch34x_init_delay: Duration::from_millis(2000),
            identify: BridgeIdentifyConfig::default(),
        }
    }
}

/// An open tokio_serial stream plus the port it came from
struct SerialLink {
    stream: SerialStream,
    port: String,
    id: String,
}

impl SerialLink {
    fn open(info: &SerialPortInfo, config: &SerialConfig) -> Result<Self, TransportError> {
        debug!("Opening {} at {} baud", info.port, config.baud_rate);
        let stream = tokio_serial::new(&info.port, config.baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TransportError::Open {
                port: info.port.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            stream,
            port: info.port.clone(),
            id: info.identifier().to_string(),
        })
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        let pending = self
            .stream
            .bytes_to_read()
            .map_err(|e| TransportError::Read(e.into()))? as usize;
        if pending == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; pending.min(max)];
        let n = self
            .stream
            .read(&mut buf)
            .await
            .map_err(TransportError::Read)?;
        if n == 0 {
            return Err(TransportError::Disconnected);
        }
        buf.truncate(n);
        Ok(buf)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream
            .write_all(data)
            .await
            .map_err(TransportError::Write)?;
        self.stream.flush().await.map_err(TransportError::Write)
    }

    fn set_modem_line(&mut self, line: ControlLine, state: bool) -> Result<(), TransportError> {
        let result = match line {
            ControlLine::Rts => self.stream.write_request_to_send(state),
            ControlLine::Dtr => self.stream.write_data_terminal_ready(state),
        };
        result.map_err(|e| TransportError::line(line, state, e))
    }
}

// ============================================================================
// MJS cable
// ============================================================================

/// Transport for the FTDI MJS cable
pub struct MjsTransport {
    config: SerialConfig,
    scanner: PortScanner,
    link: Option<SerialLink>,
}

impl MjsTransport {
    pub fn new() -> Self {
        Self::with_config(SerialConfig::default())
    }

    pub fn with_config(config: SerialConfig) -> Self {
        Self {
            config,
            scanner: PortScanner::new(),
            link: None,
        }
    }

    fn connect(&mut self, info: &SerialPortInfo) -> Result<(), TransportError> {
        let mut link = SerialLink::open(info, &self.config)?;
        // hold the tuner muted until it has powered up
        link.set_modem_line(ControlLine::Rts, true)?;
        info!("Opened MJS cable {} on {}", link.id, link.port);
        self.link = Some(link);
        Ok(())
    }

    fn link(&mut self) -> Result<&mut SerialLink, TransportError> {
        self.link.as_mut().ok_or(TransportError::NotOpen)
    }
}

impl Default for MjsTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MjsTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let cables = self.scanner.devices(DeviceKind::MjsCable)?;
        let first = cables
            .first()
            .ok_or_else(|| TransportError::NoDevice("no MJS cable connected".into()))?;
        self.connect(first)
    }

    async fn open_by_id(&mut self, id: &str) -> Result<(), TransportError> {
        let info = self.scanner.find(DeviceKind::MjsCable, id)?;
        self.connect(&info)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.link.is_none() {
            return Ok(());
        }
        // power off, then release the mute
        let dtr = self.clear_dtr().await;
        let rts = self.clear_rts().await;
        if let Some(link) = self.link.take() {
            info!("Closed MJS cable {}", link.id);
        }
        dtr.and(rts)
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        self.link()?.read(max).await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.link()?.write(data).await
    }

    async fn set_line(&mut self, line: ControlLine, state: bool) -> Result<(), TransportError> {
        self.link()?.set_modem_line(line, state)
    }

    fn list_devices(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.scanner.identifiers(DeviceKind::MjsCable)?)
    }

    fn identifier(&self) -> Option<String> {
        self.link.as_ref().map(|l| l.id.clone())
    }
}

// ============================================================================
// Microcontroller bridge
// ============================================================================

/// Prefix of the bridge's in-band control packets
const BRIDGE_CONTROL: [u8; 2] = [0xA4, 0xFF];
const BRIDGE_DTR: u8 = 0x08;
const BRIDGE_RTS: u8 = 0x09;

/// In-band packet asking the bridge to drive one of the tuner's lines
pub fn bridge_line_packet(line: ControlLine, state: bool) -> [u8; 4] {
    let code = match line {
        ControlLine::Rts => BRIDGE_RTS,
        ControlLine::Dtr => BRIDGE_DTR,
    };
    [BRIDGE_CONTROL[0], BRIDGE_CONTROL[1], code, u8::from(state)]
}

/// Transport for a microcontroller bridge
pub struct BridgeTransport {
    config: SerialConfig,
    scanner: PortScanner,
    link: Option<SerialLink>,
}

impl BridgeTransport {
    pub fn new() -> Self {
        Self::with_config(SerialConfig::default())
    }

    pub fn with_config(config: SerialConfig) -> Self {
        Self {
            config,
            scanner: PortScanner::new(),
            link: None,
        }
    }

    async fn connect(&mut self, mut link: SerialLink) -> Result<(), TransportError> {
        send_bridge_line(&mut link, self.config.bridge_line_delay, ControlLine::Rts, true).await?;
        info!("Opened bridge {} on {}", link.id, link.port);
        self.link = Some(link);
        Ok(())
    }
}

/// Open a candidate port and run the id handshake
///
/// On success the link's identifier is the bridge id.
async fn try_bridge_port(
    info: &SerialPortInfo,
    config: &SerialConfig,
) -> Result<SerialLink, TransportError> {
    let mut link = SerialLink::open(info, config)?;
    let delay = if info.is_ch34x() {
        config.ch34x_init_delay
    } else {
        config.bridge_init_delay
    };
    tokio::time::sleep(delay).await;

    link.id = identify_bridge(&mut link.stream, &info.port, &config.identify).await?;
    Ok(link)
}

async fn send_bridge_line(
    link: &mut SerialLink,
    delay: Duration,
    line: ControlLine,
    state: bool,
) -> Result<(), TransportError> {
    link.write(&bridge_line_packet(line, state))
        .await
        .map_err(|e| TransportError::line(line, state, e))?;
    tokio::time::sleep(delay).await;
    Ok(())
}

impl Default for BridgeTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for BridgeTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        for info in self.scanner.devices(DeviceKind::Bridge)? {
            match try_bridge_port(&info, &self.config).await {
                Ok(link) => return self.connect(link).await,
                Err(e) => debug!("{} is not a bridge: {}", info.port, e),
            }
        }
        Err(TransportError::NoDevice("no bridge answered".into()))
    }

    async fn open_by_id(&mut self, id: &str) -> Result<(), TransportError> {
        let candidates = self.scanner.devices(DeviceKind::Bridge)?;

        // a port identifier names the port directly
        if let Some(info) = candidates
            .iter()
            .find(|p| p.identifier() == id || p.port == id)
        {
            let link = try_bridge_port(info, &self.config).await?;
            return self.connect(link).await;
        }

        for info in &candidates {
            match try_bridge_port(info, &self.config).await {
                Ok(link) if link.id == id => return self.connect(link).await,
                Ok(link) => debug!("Bridge {} on {} is not {}", link.id, link.port, id),
                Err(e) => debug!("{} is not a bridge: {}", info.port, e),
            }
        }
        Err(TransportError::NoDevice(id.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.link.is_none() {
            return Ok(());
        }
        let dtr = self.clear_dtr().await;
        let rts = self.clear_rts().await;
        if let Some(link) = self.link.take() {
            if let Err(e) = &dtr {
                warn!("Bridge {} did not take the power-off request: {}", link.id, e);
            }
            info!("Closed bridge {}", link.id);
        }
        dtr.and(rts)
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }

    async fn read(&mut self, max: usize) -> Result<Vec<u8>, TransportError> {
        self.link
            .as_mut()
            .ok_or(TransportError::NotOpen)?
            .read(max)
            .await
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.link
            .as_mut()
            .ok_or(TransportError::NotOpen)?
            .write(data)
            .await
    }

    async fn set_line(&mut self, line: ControlLine, state: bool) -> Result<(), TransportError> {
        let delay = self.config.bridge_line_delay;
        let link = self.link.as_mut().ok_or(TransportError::NotOpen)?;
        send_bridge_line(link, delay, line, state).await
    }

    fn list_devices(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.scanner.identifiers(DeviceKind::Bridge)?)
    }

    fn identifier(&self) -> Option<String> {
        self.link.as_ref().map(|l| l.id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_line_packets() {
        assert_eq!(bridge_line_packet(ControlLine::Rts, true), [0xA4, 0xFF, 0x09, 0x01]);
        assert_eq!(bridge_line_packet(ControlLine::Rts, false), [0xA4, 0xFF, 0x09, 0x00]);
        assert_eq!(bridge_line_packet(ControlLine::Dtr, true), [0xA4, 0xFF, 0x08, 0x01]);
        assert_eq!(bridge_line_packet(ControlLine::Dtr, false), [0xA4, 0xFF, 0x08, 0x00]);
    }

    #[test]
    fn test_serial_defaults() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.bridge_line_delay, Duration::from_millis(20));
        assert_eq!(config.ch34x_init_delay, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_closed_transports_refuse_io() {
        let mut mjs = MjsTransport::new();
        assert!(!mjs.is_open());
        assert!(matches!(mjs.write(&[0xA4]).await, Err(TransportError::NotOpen)));
        assert!(matches!(mjs.read(16).await, Err(TransportError::NotOpen)));
        assert!(mjs.close().await.is_ok());
        assert_eq!(mjs.identifier(), None);

        let mut bridge = BridgeTransport::new();
        assert!(matches!(
            bridge.set_line(ControlLine::Dtr, true).await,
            Err(TransportError::NotOpen)
        ));
    }
}
