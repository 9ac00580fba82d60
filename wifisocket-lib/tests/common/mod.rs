//! Common test utilities: an in-memory network of simulated sockets

// Not every test file uses every helper
#![allow(dead_code)]

use bytes::Bytes;
use chrono::TimeDelta;
use std::collections::VecDeque;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use wifisocket_lib::command::{Opcode, SwitchState};
use wifisocket_lib::config::{DeviceCode, ProtocolConfig};
use wifisocket_lib::error::Result;
use wifisocket_lib::frame;
use wifisocket_lib::transport::{self, Endpoint, Reply, Transport};
use wifisocket_lib::{DeviceAddress, MacAddress, SocketClient};

pub const MAC_A: MacAddress = MacAddress([0xAC, 0xCF, 0x23, 0x00, 0x00, 0x01]);
pub const MAC_B: MacAddress = MacAddress([0xAC, 0xCF, 0x23, 0x00, 0x00, 0x02]);
pub const IP_A: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 21);
pub const IP_B: Ipv4Addr = Ipv4Addr::new(192, 168, 0, 22);

pub fn device_a() -> DeviceAddress {
    DeviceAddress::new(MAC_A, IP_A)
}

pub fn device_b() -> DeviceAddress {
    DeviceAddress::new(MAC_B, IP_B)
}

/// Something going wrong with the reply to the next datagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Reply lost
    Drop,
    /// Reply arrives with a payload that is not block aligned
    Garble,
    /// Reply arrives with the frame header only
    HeaderOnly,
}

/// Firmware state of one simulated socket
#[derive(Debug, Clone)]
pub struct FakeSocket {
    pub address: DeviceAddress,
    pub device_code: DeviceCode,
    pub state: SwitchState,
    /// Raw 8-byte timer records, slot 1 first, countdown last
    pub timers: [[u8; 8]; 11],
    pub absence: [u8; 9],
}

impl FakeSocket {
    pub fn new(address: DeviceAddress) -> Self {
        let mut timers = [[0u8; 8]; 11];
        for (index, record) in timers.iter_mut().enumerate() {
            *record = empty_record(index as u8 + 1);
        }
        Self {
            address,
            device_code: DeviceCode::SWS_A1,
            state: SwitchState::Off,
            timers,
            absence: [0u8; 9],
        }
    }

    pub fn with_device_code(mut self, device_code: DeviceCode) -> Self {
        self.device_code = device_code;
        self
    }

    /// Apply a request body and produce the reply payload
    fn handle(&mut self, body: &[u8]) -> Option<Vec<u8>> {
        let opcode = Opcode::try_from(*body.first()?).ok()?;
        let mut payload = vec![0u8; 32];

        match opcode {
            Opcode::Search => {
                payload[8..12].copy_from_slice(&self.address.ip.octets());
                payload[12..18].copy_from_slice(&self.address.mac.octets());
            }
            Opcode::Switch => {
                let pattern: [u8; 4] = body.get(1..5)?.try_into().ok()?;
                self.state = SwitchState::from_action_pattern(&pattern);
            }
            Opcode::GetState => payload[10] = self.state.into(),
            Opcode::SetTimer => {
                let slot = *body.get(2)?;
                let record = self.timers.get_mut(usize::from(slot).checked_sub(1)?)?;
                record[0] = slot;
                record[1..8].copy_from_slice(body.get(3..10)?);
            }
            Opcode::DeleteTimer => {
                let slot = *body.get(2)?;
                *self.timers.get_mut(usize::from(slot).checked_sub(1)?)? = empty_record(slot);
            }
            Opcode::TimerQuery => {
                payload = vec![0u8; 112];
                for (index, record) in self.timers.iter().enumerate() {
                    let offset = 9 + index * 8;
                    payload[offset..offset + 8].copy_from_slice(record);
                }
            }
            Opcode::SetAbsence => self.absence.copy_from_slice(body.get(1..10)?),
            Opcode::AbsenceQuery => payload[8..17].copy_from_slice(&self.absence),
            Opcode::SwitchSlave | Opcode::Heartbeat => {}
        }
        Some(payload)
    }
}

fn empty_record(slot: u8) -> [u8; 8] {
    [slot, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00]
}

/// In-memory network of sockets; implements [`Transport`] through the real
/// retry and collection loops
#[derive(Default)]
pub struct FakeNetwork {
    sockets: Mutex<Vec<FakeSocket>>,
    faults: Mutex<VecDeque<Fault>>,
    sent: AtomicUsize,
    frames: Mutex<Vec<Bytes>>,
}

impl FakeNetwork {
    pub fn new(sockets: Vec<FakeSocket>) -> Self {
        Self {
            sockets: Mutex::new(sockets),
            ..Default::default()
        }
    }

    /// Queue faults applied to the replies of the next datagrams, in order
    pub fn inject(&self, faults: impl IntoIterator<Item = Fault>) {
        self.faults.lock().unwrap().extend(faults);
    }

    /// Datagrams sent so far
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> Vec<Bytes> {
        self.frames.lock().unwrap().clone()
    }

    pub fn socket(&self, mac: MacAddress) -> FakeSocket {
        self.sockets
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.address.mac == mac)
            .cloned()
            .expect("no such fake socket")
    }

    /// Replies every addressed socket sends back to `frame`
    fn deliver(&self, frame: &[u8], target: SocketAddr) -> Vec<(Bytes, SocketAddr)> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.frames.lock().unwrap().push(Bytes::copy_from_slice(frame));

        let Ok(request) = frame::decode_request(frame) else {
            return Vec::new();
        };
        let target_ip = match target {
            SocketAddr::V4(v4) => *v4.ip(),
            SocketAddr::V6(_) => return Vec::new(),
        };

        let mut replies = Vec::new();
        for socket in self.sockets.lock().unwrap().iter_mut() {
            let ip_matches = target_ip.is_broadcast() || target_ip == socket.address.ip;
            let mac_matches = request.mac.is_broadcast() || request.mac == socket.address.mac;
            if !ip_matches || !mac_matches || request.device_code != *socket.device_code.as_bytes() {
                continue;
            }
            if let Some(payload) = socket.handle(&request.body) {
                let reply = frame::build_reply(&socket.address.mac, &payload).expect("reply frame");
                replies.push((reply, SocketAddr::from((socket.address.ip, 8530))));
            }
        }

        match self.faults.lock().unwrap().pop_front() {
            None => replies,
            Some(Fault::Drop) => Vec::new(),
            Some(Fault::Garble) => replies
                .into_iter()
                .map(|(reply, sender)| {
                    let mut garbled = reply.to_vec();
                    garbled.push(0x00);
                    (Bytes::from(garbled), sender)
                })
                .collect(),
            Some(Fault::HeaderOnly) => replies
                .into_iter()
                .map(|(reply, sender)| (reply.slice(..9), sender))
                .collect(),
        }
    }

    fn endpoint(&self) -> FakeEndpoint<'_> {
        FakeEndpoint {
            network: self,
            inbox: VecDeque::new(),
        }
    }
}

pub struct FakeEndpoint<'a> {
    network: &'a FakeNetwork,
    inbox: VecDeque<(Bytes, SocketAddr)>,
}

impl Endpoint for FakeEndpoint<'_> {
    async fn send_to(&mut self, frame: &[u8], target: SocketAddr) -> io::Result<()> {
        let replies = self.network.deliver(frame, target);
        self.inbox.extend(replies);
        Ok(())
    }

    async fn recv(&mut self, _wait: Duration) -> io::Result<Option<(Bytes, SocketAddr)>> {
        Ok(self.inbox.pop_front())
    }
}

impl Transport for FakeNetwork {
    async fn send_and_receive(&self, config: &ProtocolConfig, ip: Ipv4Addr, frame: &[u8]) -> Result<Bytes> {
        let mut endpoint = self.endpoint();
        transport::exchange(&mut endpoint, SocketAddr::from((ip, config.port)), frame, config).await
    }

    async fn broadcast(&self, config: &ProtocolConfig, ip: Ipv4Addr, frame: &[u8]) -> Result<Vec<Reply>> {
        let mut endpoint = self.endpoint();
        transport::collect(&mut endpoint, SocketAddr::from((ip, config.port)), frame, config).await
    }
}

/// Route library logs to the test output; `RUST_LOG=debug` shows every attempt
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with short pauses so retry tests stay fast
pub fn test_config() -> ProtocolConfig {
    ProtocolConfig::default()
        .with_timeout(Duration::from_millis(20))
        .with_retry_pause(Duration::from_millis(1))
}

/// Client over a network with sockets A and B, socket clock equal to local time
pub fn client() -> SocketClient<FakeNetwork> {
    init_tracing();
    let network = FakeNetwork::new(vec![FakeSocket::new(device_a()), FakeSocket::new(device_b())]);
    SocketClient::with_transport(test_config(), network).with_time_delta(TimeDelta::zero())
}
