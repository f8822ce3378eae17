//! HD Radio Driver Engine
//!
//! This crate drives an HD Radio tuner attached over a serial link. It turns
//! high-level calls (power on, tune, set volume) into protocol frames, keeps a
//! picture of the tuner's state built from its replies, and reports every
//! change as a [`RadioEvent`].
//!
//! # Architecture
//!
//! An open session runs three independent contexts:
//!
//! - **Receiver**: polls the [`Transport`], reassembles frames and applies
//!   replies to the [`RadioStateStore`]
//! - **Command scheduler**: writes requests one at a time with the pacing the
//!   tuner needs, and runs the power sequences
//! - **Event dispatcher**: hands events to the application on its own thread
//!
//! Two transports ship with the crate: [`MjsTransport`] for the direct USB
//! cable, where the control lines are the serial port's own RTS/DTR, and
//! [`BridgeTransport`] for a microcontroller bridge that switches the lines
//! on request.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hdradio_engine::{DriverConfig, HdRadio, JsonFileSettings, MjsTransport, RadioEvent};
//!
//! let settings = JsonFileSettings::load(JsonFileSettings::default_path().unwrap());
//! let radio = HdRadio::new(
//!     MjsTransport::new(),
//!     Arc::new(settings),
//!     |event: RadioEvent| println!("{}", event),
//!     DriverConfig::default(),
//! );
//! radio.open().await?;
//! radio.power_on()?;
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod power;
pub mod radio;
mod receiver;
pub mod retrier;
mod scheduler;
pub mod serial;
pub mod settings;
pub mod state;
pub mod transport;

pub use config::DriverConfig;
pub use dispatcher::{channel_handler, EventDispatcher, RadioEventHandler};
pub use error::{DeviceErrorKind, DriverError};
pub use events::RadioEvent;
pub use power::PowerStatus;
pub use radio::HdRadio;
pub use serial::{BridgeTransport, MjsTransport, SerialConfig};
pub use settings::{keys, JsonFileSettings, MemorySettings, SettingsStore};
pub use state::{RadioState, RadioStateStore};
pub use transport::{ControlLine, Transport, TransportError};
