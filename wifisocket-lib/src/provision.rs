//! Handing the Wi-Fi password to a socket in pairing mode
//!
//! A socket whose button was held until its LED flashes red listens for
//! broadcast datagrams on port 49999. It cannot decrypt anything yet, so the
//! password is encoded purely in datagram lengths; the content is filler.
//!
//! One cycle is a preamble of 60 datagrams followed by five repetitions of
//! `start marker, one datagram per password byte, end marker, length marker`.

use std::net::{SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::constants::{BROADCAST_IP, PROVISIONING_PORT};
use crate::error::{Result, WsError};
use crate::transport::{Endpoint, UdpEndpoint};

/// How long the password is repeated unless told otherwise
pub const DEFAULT_PROVISIONING_DURATION: Duration = Duration::from_secs(30);

/// Value of every filler byte
const FILL_BYTE: u8 = 0x05;

/// Added to every encoded value
const LENGTH_BASE: usize = 76;
const PREAMBLE_COUNT: usize = 60;
const START_MARKER: usize = 89;
const END_MARKER: usize = 86;
const ROUNDS: usize = 5;

/// One datagram of the provisioning sequence and the pause after it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisioningStep {
    pub len: usize,
    pub pause: Duration,
}

impl ProvisioningStep {
    fn new(len: usize, pause_ms: u64) -> Self {
        Self {
            len,
            pause: Duration::from_millis(pause_ms),
        }
    }
}

fn marker(steps: &mut Vec<ProvisioningStep>, len: usize, final_pause_ms: u64) {
    steps.push(ProvisioningStep::new(len, 50));
    steps.push(ProvisioningStep::new(len, 50));
    steps.push(ProvisioningStep::new(len, final_pause_ms));
}

/// Lay out one full cycle for `password`.
pub fn provisioning_cycle(password: &str) -> Result<Vec<ProvisioningStep>> {
    if password.is_empty() || !password.is_ascii() {
        return Err(WsError::InvalidInput(
            "Wi-Fi password must be non-empty ASCII".to_string(),
        ));
    }

    let bytes = password.as_bytes();
    let mut steps = Vec::with_capacity(PREAMBLE_COUNT + ROUNDS * (bytes.len() + 9));
    steps.extend(std::iter::repeat_n(ProvisioningStep::new(LENGTH_BASE, 10), PREAMBLE_COUNT));

    for _ in 0..ROUNDS {
        marker(&mut steps, START_MARKER, 100);
        steps.extend(bytes.iter().map(|&b| ProvisioningStep::new(usize::from(b) + LENGTH_BASE, 100)));
        marker(&mut steps, END_MARKER, 200);
        marker(&mut steps, bytes.len() + 256 + LENGTH_BASE, 500);
    }
    Ok(steps)
}

/// Replay `steps` to `target` until `duration` has passed.
///
/// The deadline is checked before each cycle, so the last cycle always
/// completes. Returns the number of cycles sent.
pub async fn run_provisioning<E: Endpoint>(
    endpoint: &mut E,
    target: SocketAddr,
    steps: &[ProvisioningStep],
    duration: Duration,
) -> Result<usize> {
    let deadline = Instant::now() + duration;
    let mut cycles = 0;

    while Instant::now() < deadline {
        for step in steps {
            let datagram = vec![FILL_BYTE; step.len];
            endpoint.send_to(&datagram, target).await?;
            sleep(step.pause).await;
        }
        cycles += 1;
        debug!("Provisioning cycle {} sent", cycles);
    }
    Ok(cycles)
}

/// Broadcast the Wi-Fi password to sockets waiting in pairing mode.
///
/// One-way: there is no acknowledgement, success shows only when the socket
/// turns up in discovery.
pub async fn send_password(password: &str, duration: Duration) -> Result<()> {
    let steps = provisioning_cycle(password)?;
    let mut endpoint = UdpEndpoint::bind_port(0, true).await?;
    let target = provisioning_target();

    info!("Sending Wi-Fi password to {} for {:?}", target, duration);
    let cycles = run_provisioning(&mut endpoint, target, &steps, duration).await?;
    info!("Provisioning finished after {} cycles", cycles);
    Ok(())
}

/// Address sockets in pairing mode listen on
pub fn provisioning_target() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(BROADCAST_IP, PROVISIONING_PORT))
}
