//! Serial port scanner
//!
//! This module provides serial port enumeration and classification.

use serde::{Deserialize, Serialize};
use serialport::{available_ports, SerialPortType};
use tracing::{debug, info};

use crate::error::DetectError;
use crate::usb_ids;

/// What kind of tuner hardware a port may lead to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// FTDI MJS cable, RTS/DTR wired to the tuner
    MjsCable,
    /// USB serial adapter that may host a microcontroller bridge
    Bridge,
}

/// Information about a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB serial number (if available)
    pub serial_number: Option<String>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        match port_type {
            SerialPortType::UsbPort(usb) => Self {
                port: name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                serial_number: usb.serial_number.clone(),
                manufacturer: usb.manufacturer.clone(),
                product: usb.product.clone(),
            },
            _ => Self {
                port: name,
                vid: None,
                pid: None,
                serial_number: None,
                manufacturer: None,
                product: None,
            },
        }
    }

    /// Stable identifier: the USB serial number, else the port name
    pub fn identifier(&self) -> &str {
        self.serial_number
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.port)
    }

    /// Classify this port, if it can lead to a tuner at all
    pub fn kind(&self) -> Option<DeviceKind> {
        let (vid, pid) = (self.vid?, self.pid?);
        if usb_ids::is_mjs_cable(vid, pid) {
            Some(DeviceKind::MjsCable)
        } else if usb_ids::is_bridge_candidate(vid, pid) {
            Some(DeviceKind::Bridge)
        } else {
            None
        }
    }

    /// True for CH34x adapters, which need the long bridge init delay
    pub fn is_ch34x(&self) -> bool {
        self.vid.map(usb_ids::is_ch34x).unwrap_or(false)
    }

    /// Human readable adapter hint
    pub fn adapter_name(&self) -> Option<&'static str> {
        usb_ids::adapter_name(self.vid?, self.pid?)
    }
}

/// Port names containing any of these are never tuners
const SKIPPED_PORTS: &[&str] = &[
    // Bluetooth ports on macOS
    "Bluetooth",
    // Debug/logging ports
    "debug",
];

/// Serial port scanner
#[derive(Debug, Clone, Copy, Default)]
pub struct PortScanner;

impl PortScanner {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate all available serial ports
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        debug!("Enumerating serial ports...");
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let result: Vec<_> = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !is_skipped(p))
            .collect();

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
            for port in &result {
                let desc = port.adapter_name().unwrap_or("Unknown");
                debug!("  {} - {}", port.port, desc);
            }
        }

        Ok(result)
    }

    /// Ports of one device kind
    pub fn devices(&self, kind: DeviceKind) -> Result<Vec<SerialPortInfo>, DetectError> {
        Ok(filter_kind(self.enumerate_ports()?, kind))
    }

    /// Identifiers of every port of one device kind
    pub fn identifiers(&self, kind: DeviceKind) -> Result<Vec<String>, DetectError> {
        Ok(self
            .devices(kind)?
            .iter()
            .map(|p| p.identifier().to_string())
            .collect())
    }

    /// Find a port of the given kind by identifier or port name
    pub fn find(&self, kind: DeviceKind, id: &str) -> Result<SerialPortInfo, DetectError> {
        find_by_id(self.devices(kind)?, id).ok_or_else(|| DetectError::NotFound(id.to_string()))
    }
}

fn is_skipped(port: &SerialPortInfo) -> bool {
    SKIPPED_PORTS
        .iter()
        .any(|pattern| port.port.contains(pattern))
}

fn filter_kind(ports: Vec<SerialPortInfo>, kind: DeviceKind) -> Vec<SerialPortInfo> {
    ports
        .into_iter()
        .filter(|p| p.kind() == Some(kind))
        .collect()
}

fn find_by_id(ports: Vec<SerialPortInfo>, id: &str) -> Option<SerialPortInfo> {
    ports
        .into_iter()
        .find(|p| p.identifier() == id || p.port == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    fn usb(name: &str, vid: u16, pid: u16, serial: Option<&str>) -> SerialPortInfo {
        SerialPortInfo::from_serialport(
            name.to_string(),
            &SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: serial.map(str::to_string),
                manufacturer: None,
                product: None,
            }),
        )
    }

    #[test]
    fn test_serial_port_info_from_usb() {
        let info = usb("/dev/ttyUSB0", 0x0403, 0x9378, Some("MJS00123"));
        assert_eq!(info.port, "/dev/ttyUSB0");
        assert_eq!(info.vid, Some(0x0403));
        assert_eq!(info.pid, Some(0x9378));
        assert_eq!(info.identifier(), "MJS00123");
        assert_eq!(info.kind(), Some(DeviceKind::MjsCable));
    }

    #[test]
    fn test_identifier_falls_back_to_port() {
        assert_eq!(usb("COM4", 0x1A86, 0x7523, None).identifier(), "COM4");
        assert_eq!(usb("COM4", 0x1A86, 0x7523, Some("")).identifier(), "COM4");
    }

    #[test]
    fn test_classification() {
        let ports = vec![
            usb("/dev/ttyUSB0", 0x0403, 0x9378, Some("A")),
            usb("/dev/ttyUSB1", 0x1A86, 0x7523, None),
            usb("/dev/ttyACM0", 0x2341, 0x0043, Some("B")),
            SerialPortInfo::from_serialport("/dev/ttyS0".into(), &SerialPortType::Unknown),
        ];
        let mjs = filter_kind(ports.clone(), DeviceKind::MjsCable);
        assert_eq!(mjs.len(), 1);
        assert_eq!(mjs[0].port, "/dev/ttyUSB0");

        let bridges = filter_kind(ports, DeviceKind::Bridge);
        let names: Vec<_> = bridges.iter().map(|p| p.port.as_str()).collect();
        assert_eq!(names, vec!["/dev/ttyUSB1", "/dev/ttyACM0"]);
        assert!(bridges[0].is_ch34x());
        assert!(!bridges[1].is_ch34x());
    }

    #[test]
    fn test_find_by_id_or_port() {
        let ports = vec![
            usb("/dev/ttyUSB0", 0x0403, 0x9378, Some("A")),
            usb("/dev/ttyUSB1", 0x0403, 0x9378, None),
        ];
        assert_eq!(find_by_id(ports.clone(), "A").unwrap().port, "/dev/ttyUSB0");
        assert_eq!(
            find_by_id(ports.clone(), "/dev/ttyUSB1").unwrap().port,
            "/dev/ttyUSB1"
        );
        assert!(find_by_id(ports, "missing").is_none());
    }

    #[test]
    fn test_skip_patterns() {
        let bt = SerialPortInfo::from_serialport(
            "/dev/cu.Bluetooth-Incoming-Port".into(),
            &SerialPortType::Unknown,
        );
        assert!(is_skipped(&bt));
        assert!(!is_skipped(&usb("/dev/ttyUSB0", 0x0403, 0x9378, None)));
    }
}
