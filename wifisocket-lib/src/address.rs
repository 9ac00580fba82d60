use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::WsError;

/// 6-byte hardware address of a socket. It travels unencrypted in every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Wildcard address used by discovery
    pub const BROADCAST: MacAddress = MacAddress([0xFF; 6]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Accepts `00010203abcd`, `00 01 02 03 ab cd` and `00:01:02:03:ab:cd`.
impl FromStr for MacAddress {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_hex_loose(s)?;
        let octets: [u8; 6] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| WsError::InvalidInput(format!("MAC address must be 6 bytes, got {}", bytes.len())))?;
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = WsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

/// Identity of a socket on the network.
///
/// The MAC is fixed per device; the IP is whatever the router handed out and
/// should be refreshed through discovery when commands start timing out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub mac: MacAddress,
    pub ip: Ipv4Addr,
}

impl DeviceAddress {
    pub fn new(mac: MacAddress, ip: Ipv4Addr) -> Self {
        Self { mac, ip }
    }

    /// Parse a MAC/IP pair as printed by [`DeviceAddress`]'s `Display`.
    pub fn parse(mac: &str, ip: &str) -> Result<Self, WsError> {
        let mac = mac.parse()?;
        let ip = ip
            .parse()
            .map_err(|_| WsError::InvalidInput(format!("Invalid IPv4 address: {ip}")))?;
        Ok(Self { mac, ip })
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Socket(mac={}, ip={})", self.mac, self.ip)
    }
}

/// Decode hex that may be separated by spaces or colons
pub(crate) fn decode_hex_loose(s: &str) -> Result<Vec<u8>, WsError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    hex::decode(&compact).map_err(|e| WsError::InvalidInput(format!("Invalid hex '{s}': {e}")))
}
