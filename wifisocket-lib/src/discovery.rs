//! Finding sockets on the local network
//!
//! A search frame is sent once to a broadcast (or specific) address; every
//! socket whose MAC matches the frame's MAC, or any socket for the broadcast
//! MAC, answers with its IP and MAC.

use std::net::Ipv4Addr;
use tracing::{debug, info};

use crate::address::{DeviceAddress, MacAddress};
use crate::command::Command;
use crate::config::ProtocolConfig;
use crate::constants::BROADCAST_IP;
use crate::error::Result;
use crate::frame;
use crate::layout::{SearchReplyRaw, decode_record};
use crate::transport::Transport;

/// Restricts discovery to one MAC, one IP, or both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceFilter {
    pub mac: Option<MacAddress>,
    pub ip: Option<Ipv4Addr>,
}

impl DeviceFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn by_mac(mac: MacAddress) -> Self {
        Self {
            mac: Some(mac),
            ip: None,
        }
    }

    pub fn by_ip(ip: Ipv4Addr) -> Self {
        Self { mac: None, ip: Some(ip) }
    }

    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// MAC placed in the search frame
    pub fn search_mac(&self) -> MacAddress {
        self.mac.unwrap_or(MacAddress::BROADCAST)
    }

    /// Destination of the search datagram
    pub fn target_ip(&self) -> Ipv4Addr {
        self.ip.unwrap_or(BROADCAST_IP)
    }

    /// The broadcast MAC and broadcast IP act as wildcards.
    pub fn matches(&self, device: &DeviceAddress) -> bool {
        let mac_ok = match self.mac {
            Some(mac) if !mac.is_broadcast() => device.mac == mac,
            _ => true,
        };
        let ip_ok = match self.ip {
            Some(ip) if !ip.is_broadcast() => device.ip == ip,
            _ => true,
        };
        mac_ok && ip_ok
    }
}

/// Decode the IP and MAC a socket reports in its search reply.
pub fn decode_search_reply(payload: &[u8]) -> Result<DeviceAddress> {
    let record: &SearchReplyRaw = decode_record(payload)?;
    Ok(DeviceAddress::new(MacAddress(record.mac), Ipv4Addr::from(record.ip)))
}

/// Broadcast a search and return every socket that answered and matches `filter`.
pub async fn search<T: Transport>(
    transport: &T,
    config: &ProtocolConfig,
    filter: &DeviceFilter,
) -> Result<Vec<DeviceAddress>> {
    let command = Command::Search {
        mac: filter.search_mac(),
    };
    let frame = frame::build_frame(&filter.search_mac(), config, &command.body())?;
    let replies = transport.broadcast(config, filter.target_ip(), &frame).await?;

    let mut devices = Vec::with_capacity(replies.len());
    for reply in replies {
        match decode_search_reply(&reply.payload) {
            Ok(device) if filter.matches(&device) => {
                info!("Found {} (reply from {})", device, reply.sender);
                devices.push(device);
            }
            Ok(device) => debug!("Ignoring {}: does not match filter", device),
            Err(e) => debug!("Ignoring search reply from {}: {}", reply.sender, e),
        }
    }
    Ok(devices)
}
