//! UDP transport with per-attempt timeout and bounded retries
//!
//! Sockets answer every command with one datagram. A command is retried when
//! the answer does not arrive in time or fails validation; a local send error
//! ends the exchange at once. The retry bookkeeping lives in [`RetryState`]
//! so it can be tested without any network.

#![allow(async_fn_in_trait)]

use bytes::Bytes;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ProtocolConfig;
use crate::constants::RECV_BUFFER_SIZE;
use crate::error::{Result, WsError};
use crate::frame;

/// Result of one send/receive attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    /// Structurally valid reply, already decrypted
    Reply(Bytes),
    TimedOut,
    /// A datagram arrived but failed frame validation
    Invalid,
}

/// What the exchange loop does next
#[derive(Debug)]
pub enum Step {
    Done(Bytes),
    /// Try again, optionally after a pause
    Retry { pause: Option<Duration> },
    /// Attempt budget spent; carries the last recorded failure
    Exhausted(WsError),
}

/// Attempt counter of one exchange.
///
/// Runs at least one attempt even with a budget of zero.
#[derive(Debug, Clone)]
pub struct RetryState {
    budget: u32,
    attempts: u32,
    pause: Duration,
}

impl RetryState {
    pub fn new(budget: u32, pause: Duration) -> Self {
        Self {
            budget: budget.max(1),
            attempts: 0,
            pause,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Record the outcome of an attempt and decide what follows.
    pub fn record(&mut self, attempt: Attempt) -> Step {
        self.attempts += 1;
        let (error, pause) = match attempt {
            Attempt::Reply(payload) => return Step::Done(payload),
            Attempt::TimedOut => (WsError::Timeout, None),
            Attempt::Invalid => (WsError::BadReturnData, Some(self.pause)),
        };

        if self.attempts >= self.budget {
            Step::Exhausted(error)
        } else {
            Step::Retry { pause }
        }
    }
}

/// A bound datagram endpoint
pub trait Endpoint {
    async fn send_to(&mut self, frame: &[u8], target: SocketAddr) -> io::Result<()>;

    /// Wait up to `wait` for one datagram; `Ok(None)` on timeout.
    async fn recv(&mut self, wait: Duration) -> io::Result<Option<(Bytes, SocketAddr)>>;
}

/// Tokio UDP socket bound for a single exchange
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    pub async fn bind(config: &ProtocolConfig, broadcast: bool) -> io::Result<Self> {
        Self::bind_port(config.local_port, broadcast).await
    }

    /// Bind on all interfaces; port 0 picks an ephemeral port.
    pub async fn bind_port(port: u16, broadcast: bool) -> io::Result<Self> {
        let local = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        let socket = UdpSocket::bind(local).await?;
        if broadcast {
            socket.set_broadcast(true)?;
        }
        debug!("Bound UDP endpoint on {}", socket.local_addr()?);
        Ok(Self { socket })
    }
}

impl Endpoint for UdpEndpoint {
    async fn send_to(&mut self, frame: &[u8], target: SocketAddr) -> io::Result<()> {
        self.socket.send_to(frame, target).await?;
        Ok(())
    }

    async fn recv(&mut self, wait: Duration) -> io::Result<Option<(Bytes, SocketAddr)>> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        match timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, sender))) => {
                buf.truncate(len);
                Ok(Some((Bytes::from(buf), sender)))
            }
            Ok(Err(e)) => Err(e),
            Err(_elapsed) => Ok(None),
        }
    }
}

/// A validated reply and who sent it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub payload: Bytes,
    pub sender: SocketAddr,
}

/// Send `frame` to `target` and wait for a valid reply, retrying per `config`.
pub async fn exchange<E: Endpoint>(
    endpoint: &mut E,
    target: SocketAddr,
    frame: &[u8],
    config: &ProtocolConfig,
) -> Result<Bytes> {
    let mut state = RetryState::new(config.retries, config.retry_pause());

    loop {
        endpoint.send_to(frame, target).await.map_err(WsError::Transport)?;
        debug!("Sent {} bytes to {} (attempt {})", frame.len(), target, state.attempts() + 1);

        let attempt = match endpoint.recv(config.timeout()).await.map_err(WsError::Transport)? {
            None => {
                warn!("No reply from {} within {:?}", target, config.timeout());
                Attempt::TimedOut
            }
            Some((data, sender)) => match frame::parse_reply(&data) {
                Ok(payload) => {
                    debug!("Received {} bytes from {}", data.len(), sender);
                    Attempt::Reply(payload)
                }
                Err(e) => {
                    warn!("Discarding reply from {}: {}", sender, e);
                    Attempt::Invalid
                }
            },
        };

        match state.record(attempt) {
            Step::Done(payload) => return Ok(payload),
            Step::Retry { pause } => {
                if let Some(pause) = pause {
                    tokio::time::sleep(pause).await;
                }
            }
            Step::Exhausted(error) => return Err(error),
        }
    }
}

/// Send `frame` once and gather every valid reply until a receive times out.
pub async fn collect<E: Endpoint>(
    endpoint: &mut E,
    target: SocketAddr,
    frame: &[u8],
    config: &ProtocolConfig,
) -> Result<Vec<Reply>> {
    endpoint.send_to(frame, target).await.map_err(WsError::Transport)?;
    debug!("Broadcast {} bytes to {}", frame.len(), target);

    let mut replies = Vec::new();
    while let Some((data, sender)) = endpoint.recv(config.timeout()).await.map_err(WsError::Transport)? {
        match frame::parse_reply(&data) {
            Ok(payload) => replies.push(Reply { payload, sender }),
            Err(e) => debug!("Skipping reply from {}: {}", sender, e),
        }
    }
    Ok(replies)
}

/// How commands reach the sockets
pub trait Transport {
    /// Targeted command with retries; returns the decrypted reply payload.
    async fn send_and_receive(&self, config: &ProtocolConfig, ip: Ipv4Addr, frame: &[u8]) -> Result<Bytes>;

    /// Single best-effort broadcast; returns all valid replies.
    async fn broadcast(&self, config: &ProtocolConfig, ip: Ipv4Addr, frame: &[u8]) -> Result<Vec<Reply>>;
}

/// Transport over real UDP sockets. Each call binds and drops its own endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl Transport for UdpTransport {
    async fn send_and_receive(&self, config: &ProtocolConfig, ip: Ipv4Addr, frame: &[u8]) -> Result<Bytes> {
        let mut endpoint = UdpEndpoint::bind(config, false).await?;
        let target = SocketAddr::V4(SocketAddrV4::new(ip, config.port));
        exchange(&mut endpoint, target, frame, config).await
    }

    async fn broadcast(&self, config: &ProtocolConfig, ip: Ipv4Addr, frame: &[u8]) -> Result<Vec<Reply>> {
        let mut endpoint = UdpEndpoint::bind(config, true).await?;
        let target = SocketAddr::V4(SocketAddrV4::new(ip, config.port));
        collect(&mut endpoint, target, frame, config).await
    }
}
