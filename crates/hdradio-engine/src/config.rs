//! Driver timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the scheduler, power sequencer and receiver
///
/// All delays are in milliseconds so the struct round-trips through the JSON
/// settings file unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Pause after every command written
    pub command_delay_ms: u64,
    /// Hold-off after a direct tune before the next command (0 disables)
    pub post_tune_delay_ms: u64,
    /// Minimum time between power transitions
    pub power_spacing_ms: u64,
    /// How long to wait for the tuner to confirm power on
    pub power_timeout_ms: u64,
    /// Settle time after power on before releasing the mute line
    pub power_settle_ms: u64,
    /// How long to wait for the API version reply that ends initialization
    pub init_timeout_ms: u64,
    /// Interval between subchannel lock checks
    pub subchannel_retry_ms: u64,
    /// Maximum number of subchannel SETs per request
    pub subchannel_max_attempts: u32,
    /// Receiver sleep when no bytes are pending
    pub receive_poll_ms: u64,
    /// Maximum bytes taken from the transport per read
    pub max_read: usize,
    /// Signal strength polling interval while powered on (0 disables)
    pub signal_poll_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            command_delay_ms: 100,
            post_tune_delay_ms: 1000,
            power_spacing_ms: 2000,
            power_timeout_ms: 10_000,
            power_settle_ms: 1000,
            init_timeout_ms: 3000,
            subchannel_retry_ms: 500,
            subchannel_max_attempts: 10,
            receive_poll_ms: 50,
            max_read: 256,
            signal_poll_ms: 10_000,
        }
    }
}

impl DriverConfig {
    pub fn command_delay(&self) -> Duration {
        Duration::from_millis(self.command_delay_ms)
    }

    /// `None` when the post-tune window is disabled
    pub fn post_tune_delay(&self) -> Option<Duration> {
        (self.post_tune_delay_ms > 0).then(|| Duration::from_millis(self.post_tune_delay_ms))
    }

    pub fn power_spacing(&self) -> Duration {
        Duration::from_millis(self.power_spacing_ms)
    }

    pub fn power_timeout(&self) -> Duration {
        Duration::from_millis(self.power_timeout_ms)
    }

    pub fn power_settle(&self) -> Duration {
        Duration::from_millis(self.power_settle_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn subchannel_retry(&self) -> Duration {
        Duration::from_millis(self.subchannel_retry_ms)
    }

    pub fn receive_poll(&self) -> Duration {
        Duration::from_millis(self.receive_poll_ms)
    }

    /// `None` when polling is disabled
    pub fn signal_poll(&self) -> Option<Duration> {
        (self.signal_poll_ms > 0).then(|| Duration::from_millis(self.signal_poll_ms))
    }
}
