//! Fixed layouts of decrypted reply payloads
//!
//! Every reply the sockets send is a fixed-size record addressed by byte
//! offset. Each record is declared once as a `#[repr(C)]` struct of
//! unaligned fields and read through [`decode_record`], so offsets live in
//! the type definitions instead of in the decoders.

use modular_bitfield::prelude::*;
use zerocopy::byteorder::big_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::{Result, WsError};

/// Reply to a search broadcast
///
/// - 0x00-0x07: reply header
/// - 0x08-0x0B: IPv4 address, one octet per byte
/// - 0x0C-0x11: MAC address
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct SearchReplyRaw {
    pub header: [u8; 8],
    pub ip: [u8; 4],
    pub mac: [u8; 6],
}

/// Reply to a state query; the switch state sits at offset 10
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct StateReplyRaw {
    pub header: [u8; 10],
    pub state: u8,
}

/// One 8-byte timer record
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TimerRecordRaw {
    pub number: u8,
    /// Packed [`TimerFlags`]
    pub flags: u8,
    /// 0xFF marks an empty slot
    pub hour: u8,
    pub minute: u8,
    pub action: [u8; 4],
}

/// Reply to a timer query: ten regular slots followed by the countdown
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct TimerTableRaw {
    pub header: [u8; 9],
    pub records: [TimerRecordRaw; 11],
}

/// Reply to an absence mode query
///
/// - 0x08: 0x80 when active
/// - 0x09-0x0C: start, epoch seconds, big-endian
/// - 0x0D-0x10: end, epoch seconds, big-endian
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct AbsenceReplyRaw {
    pub header: [u8; 8],
    pub flag: u8,
    pub from: U32,
    pub to: U32,
}

/// Active flag and weekly repeat pattern of a timer, packed in one byte.
///
/// Bit 0 is Monday, bit 6 Sunday, bit 7 the active flag.
#[bitfield(bits = 8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFlags {
    pub days: B7,
    pub active: bool,
}

/// Read a fixed layout record from the start of `payload`.
///
/// Trailing bytes (device padding) are ignored; a payload shorter than the
/// record is reported as [`WsError::InsufficientData`].
pub fn decode_record<T>(payload: &[u8]) -> Result<&T>
where
    T: FromBytes + KnownLayout + Immutable + Unaligned,
{
    let expected = size_of::<T>();
    T::ref_from_prefix(payload)
        .map(|(record, _rest)| record)
        .map_err(|_| WsError::InsufficientData {
            expected,
            actual: payload.len(),
        })
}
