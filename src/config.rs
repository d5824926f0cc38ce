use crate::error::Result;
use crate::types::{DeviceAddress, DeviceId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default TCP port of the unit's control interface
pub const DEFAULT_PORT: u16 = 2202;

/// Client settings
///
/// ```
/// use dfr22::ClientConfig;
///
/// let config = ClientConfig::from_json_str(r#"{ "host": "10.0.0.5", "device_id": 1 }"#).unwrap();
/// assert_eq!(config.port, 2202);
/// assert_eq!(config.reconnect_delay().as_secs(), 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub device_id: DeviceId,

    /// Pause before each automatic reconnect attempt
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Size of the socket read buffer, 0 for the default
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Events buffered per subscriber before it starts lagging
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

pub(crate) fn default_reconnect_delay_ms() -> u64 {
    10_000
}

pub(crate) fn default_connect_timeout_ms() -> u64 {
    5_000
}

pub(crate) fn default_read_buffer_size() -> usize {
    1024
}

pub(crate) fn default_event_capacity() -> usize {
    100
}

impl ClientConfig {
    /// Config with default timings for the given unit
    pub fn new(host: impl Into<String>, port: u16, device_id: DeviceId) -> Self {
        Self {
            host: host.into(),
            port,
            device_id,
            reconnect_delay_ms: default_reconnect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_buffer_size: default_read_buffer_size(),
            event_capacity: default_event_capacity(),
        }
    }

    /// Parse a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the reconnect delay
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub(crate) fn read_buffer_size(&self) -> usize {
        if self.read_buffer_size == 0 {
            default_read_buffer_size()
        } else {
            self.read_buffer_size
        }
    }

    /// Validated address of the unit
    pub fn address(&self) -> Result<DeviceAddress> {
        DeviceAddress::new(self.host.clone(), self.port, self.device_id)
    }
}
