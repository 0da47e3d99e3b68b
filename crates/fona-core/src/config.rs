//! Device configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::protocol::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT_MS};

/// Settings for a [`crate::FonaDevice`] session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Serial port name, used by [`crate::FonaDevice::open_serial`]
    pub port_name: String,
    /// Host baud rate; the modem autobauds to it
    pub baud_rate: u32,
    /// Per-reply timeout for ordinary commands. `None` waits forever, which is
    /// handy when single-stepping through a session.
    pub command_timeout_ms: Option<u64>,
    /// Per-probe timeout while synchronising autobaud
    pub sync_timeout_ms: u64,
    /// Number of `AT` probes sent during bring-up
    pub sync_attempts: u32,
    /// Pause between bring-up probes
    pub settle_delay_ms: u64,
    /// Timeout for slow commands such as bulk SMS deletion
    pub long_command_timeout_ms: u64,
    /// Timeout for fetching an HTTP response body
    pub http_timeout_ms: u64,
    /// `UA` parameter sent with HTTP requests
    pub http_user_agent: Option<String>,
    /// GPRS access point name
    pub apn: Option<String>,
    /// Bearer user name, if the carrier wants one
    pub apn_username: Option<String>,
    /// Bearer password
    pub apn_password: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            command_timeout_ms: Some(DEFAULT_TIMEOUT_MS),
            sync_timeout_ms: 500,
            sync_attempts: 3,
            settle_delay_ms: 100,
            long_command_timeout_ms: 30_000,
            http_timeout_ms: 30_000,
            http_user_agent: Some("fona-rs".to_string()),
            apn: None,
            apn_username: None,
            apn_password: None,
        }
    }
}

impl DeviceConfig {
    /// Parse a JSON document; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json)
            .map_err(|e| ProtocolError::InvalidArgument(format!("bad device config: {}", e)))
    }

    /// Load a JSON config file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProtocolError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub(crate) fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn sync_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.sync_timeout_ms))
    }

    pub(crate) fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub(crate) fn long_command_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.long_command_timeout_ms))
    }

    pub(crate) fn http_timeout(&self) -> Option<Duration> {
        Some(Duration::from_millis(self.http_timeout_ms))
    }
}
