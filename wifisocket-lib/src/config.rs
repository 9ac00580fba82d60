use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::address::decode_hex_loose;
use crate::constants::{
    DEFAULT_PACKET_SEQ, DEFAULT_RETRIES, DEFAULT_RETRY_PAUSE_MS, DEFAULT_TIMEOUT_MS, DEFAULT_UDP_PORT,
};
use crate::error::{Result, WsError};

/// Company, device and authentication code carried in every encrypted header.
///
/// Different rebrands of the same hardware use different codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceCode(pub [u8; 4]);

impl DeviceCode {
    /// Silvercrest SWS-A1, sold by Lidl
    pub const SWS_A1: DeviceCode = DeviceCode([0xC1, 0x11, 0x71, 0x50]);
    /// Aldi Easy Home DIS-120
    pub const DIS_120: DeviceCode = DeviceCode([0xC2, 0x11, 0x92, 0xDD]);
    /// Seen in the wild, vendor unknown
    pub const U_DEVICE: DeviceCode = DeviceCode([0xCA, 0xA1, 0x88, 0x98]);

    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// Look up a known code by its short name (`sws-a1`, `dis-120`, `u-device`)
    pub fn by_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('_', "-").as_str() {
            "sws-a1" => Some(Self::SWS_A1),
            "dis-120" => Some(Self::DIS_120),
            "u-device" => Some(Self::U_DEVICE),
            _ => None,
        }
    }
}

impl Default for DeviceCode {
    fn default() -> Self {
        Self::SWS_A1
    }
}

impl fmt::Display for DeviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.0;
        write!(f, "{a:02X} {b:02X} {c:02X} {d:02X}")
    }
}

/// Accepts a known name or 4 hex bytes, e.g. `C1 11 71 50`.
impl FromStr for DeviceCode {
    type Err = WsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(code) = Self::by_name(s.trim()) {
            return Ok(code);
        }
        let bytes = decode_hex_loose(s)?;
        let code: [u8; 4] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| WsError::InvalidInput(format!("Device code must be 4 bytes, got {}", bytes.len())))?;
        Ok(DeviceCode(code))
    }
}

impl TryFrom<String> for DeviceCode {
    type Error = WsError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceCode> for String {
    fn from(code: DeviceCode) -> Self {
        code.to_string()
    }
}

/// Settings shared by every command a client sends.
///
/// Owned by one client and handed to the transport on each call, so two
/// clients never observe each other's changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub device_code: DeviceCode,
    /// Packet number placed in the encrypted header. The sockets accept any value.
    pub packet_seq: u16,
    /// UDP port the sockets listen on
    pub port: u16,
    /// Local port to bind, 0 for an ephemeral port
    pub local_port: u16,
    /// Per-attempt receive timeout
    pub timeout_ms: u64,
    /// Attempts per command
    pub retries: u32,
    /// Pause after a reply failed validation
    pub retry_pause_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            device_code: DeviceCode::default(),
            packet_seq: DEFAULT_PACKET_SEQ,
            port: DEFAULT_UDP_PORT,
            local_port: DEFAULT_UDP_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            retry_pause_ms: DEFAULT_RETRY_PAUSE_MS,
        }
    }
}

impl ProtocolConfig {
    /// Load a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| WsError::Config(format!("Failed to read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| WsError::Config(e.to_string()))
    }

    pub fn with_device_code(mut self, device_code: DeviceCode) -> Self {
        self.device_code = device_code;
        self
    }

    pub fn with_packet_seq(mut self, packet_seq: u16) -> Self {
        self.packet_seq = packet_seq;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_local_port(mut self, local_port: u16) -> Self {
        self.local_port = local_port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_pause(mut self, pause: Duration) -> Self {
        self.retry_pause_ms = pause.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }
}
