//! HD Radio Serial Port Detection Library
//!
//! This crate enumerates serial ports and sorts them into the two kinds of
//! hardware that can drive an HD Radio tuner: the FTDI-based MJS cable, and
//! generic USB serial adapters that may host a microcontroller bridge. It
//! also implements the bridge identification handshake.
//!
//! # Example
//!
//! ```rust,no_run
//! use hdradio_detect::{DeviceKind, PortScanner};
//!
//! let scanner = PortScanner::new();
//! for port in scanner.devices(DeviceKind::MjsCable).unwrap() {
//!     println!("MJS cable: {} ({})", port.port, port.identifier());
//! }
//! ```

pub mod error;
pub mod identify;
pub mod scanner;
pub mod usb_ids;

pub use error::DetectError;
pub use identify::{identify_bridge, is_bridge_id, BridgeIdentifyConfig, BRIDGE_ID_REQUEST};
pub use scanner::{DeviceKind, PortScanner, SerialPortInfo};
