//! HD Radio Simulation Library
//!
//! This crate provides a simulated tuner for exercising the driver without
//! hardware. It includes:
//!
//! - **VirtualTuner**: answers protocol requests with protocol-accurate
//!   replies from a configurable list of stations
//! - **SimTransport**: a [`Transport`](hdradio_engine::Transport) that wires a
//!   virtual tuner to the driver, with fault injection through [`SimHandle`]
//!
//! # Example
//!
//! ```rust
//! use hdradio_protocol::{Message, Payload, RadioCommand};
//! use hdradio_sim::VirtualTuner;
//!
//! let mut tuner = VirtualTuner::new();
//! tuner.power_on();
//! tuner
//!     .handle_request(&Message::set(RadioCommand::Volume, Payload::Integer(30)))
//!     .unwrap();
//!
//! while let Some(bytes) = tuner.take_output() {
//!     println!("Tuner output: {:02X?}", bytes);
//! }
//! ```

pub mod error;
pub mod transport;
pub mod tuner;

pub use error::SimError;
pub use transport::{SimHandle, SimTransport};
pub use tuner::{Program, RdsInfo, Station, VirtualTuner, VirtualTunerConfig};
