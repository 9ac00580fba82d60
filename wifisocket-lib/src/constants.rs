// Protocol constants for SWS-A1 style Wi-Fi sockets

use std::net::Ipv4Addr;

/// Default UDP port used by the sockets for commands and replies
pub const DEFAULT_UDP_PORT: u16 = 8530;

/// UDP port a socket in listening (provisioning) mode waits on
pub const PROVISIONING_PORT: u16 = 49999;

/// Default per-attempt timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default number of attempts per command
pub const DEFAULT_RETRIES: u32 = 3;

/// Pause after a reply failed validation, in milliseconds
pub const DEFAULT_RETRY_PAUSE_MS: u64 = 500;

/// Highest packet sequence value. The sockets accept any value.
pub const DEFAULT_PACKET_SEQ: u16 = 0xFFFF;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// First byte of every request frame
pub const FRAME_INIT: u8 = 0x01;

/// Direction marker of a request frame (host -> socket)
pub const FRAME_SEND: u8 = 0x40;

/// Direction marker of a reply frame (socket -> host), found at offset 1
pub const FRAME_REPLY: u8 = 0x42;

/// Plaintext prefix length: init + direction + MAC + length byte
pub const FRAME_PREFIX_SIZE: usize = 9;

/// First byte of the encrypted header block
pub const HEADER_MARKER: u8 = 0x00;

/// Size of the receive buffer for replies
pub const RECV_BUFFER_SIZE: usize = 1024;

/// Number of regular timer slots; the countdown is slot 11
pub const TIMER_SLOTS: u8 = 10;

/// Slot number the device uses for the countdown
pub const COUNTDOWN_SLOT: u8 = 11;

/// Stored hour of an unprogrammed timer slot
pub const EMPTY_TIMER_HOUR: u8 = 0xFF;

/// Flag byte of an active absence window
pub const ABSENCE_ACTIVE: u8 = 0x80;

/// Broadcast target used by discovery and provisioning
pub const BROADCAST_IP: Ipv4Addr = Ipv4Addr::BROADCAST;
