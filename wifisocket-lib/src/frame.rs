//! Request framing and reply validation
//!
//! Request: `[01][40][mac:6][len][encrypted]`, where the encrypted block holds
//! `[00][packet_seq:2][device_code:4][body]` padded to the cipher block size.
//!
//! Reply: `[xx][42][7 header bytes][encrypted payload]`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::address::MacAddress;
use crate::cipher;
use crate::config::ProtocolConfig;
use crate::constants::{BLOCK_SIZE, FRAME_INIT, FRAME_PREFIX_SIZE, FRAME_REPLY, FRAME_SEND, HEADER_MARKER};
use crate::error::{Result, WsError};

/// Size of `[00][packet_seq][device_code]` in front of every body
pub const HEADER_SIZE: usize = 7;

/// Assemble and encrypt a request frame for the socket `mac`.
pub fn build_frame(mac: &MacAddress, config: &ProtocolConfig, body: &[u8]) -> Result<Bytes> {
    let mut plain = BytesMut::with_capacity(HEADER_SIZE + body.len() + BLOCK_SIZE);
    plain.put_u8(HEADER_MARKER);
    plain.put_u16(config.packet_seq);
    plain.put_slice(config.device_code.as_bytes());
    plain.put_slice(body);
    pad(&mut plain);

    let encrypted = cipher::encrypt(&plain)?;
    let len = u8::try_from(encrypted.len())
        .map_err(|_| WsError::InvalidInput(format!("Command body too large: {} bytes", body.len())))?;

    let mut frame = BytesMut::with_capacity(FRAME_PREFIX_SIZE + encrypted.len());
    frame.put_u8(FRAME_INIT);
    frame.put_u8(FRAME_SEND);
    frame.put_slice(&mac.octets());
    frame.put_u8(len);
    frame.put_slice(&encrypted);
    Ok(frame.freeze())
}

/// Validate a received datagram and return its decrypted payload.
///
/// The payload keeps the device's padding; decoders address fields by offset.
/// A reply without anything after the header yields an empty payload.
pub fn parse_reply(received: &[u8]) -> Result<Bytes> {
    if received.len() < 2 {
        return Err(WsError::MalformedFrame(format!(
            "Reply too short: {} bytes",
            received.len()
        )));
    }
    if received[1] != FRAME_REPLY {
        return Err(WsError::MalformedFrame(format!(
            "Unexpected direction marker 0x{:02X}",
            received[1]
        )));
    }

    let encrypted = received.get(FRAME_PREFIX_SIZE..).unwrap_or_default();
    if !encrypted.len().is_multiple_of(BLOCK_SIZE) {
        return Err(WsError::MalformedFrame(format!(
            "Encrypted payload of {} bytes is not block aligned",
            encrypted.len()
        )));
    }
    if encrypted.is_empty() {
        return Ok(Bytes::new());
    }

    Ok(Bytes::from(cipher::decrypt(encrypted)?))
}

/// Pad to the next block boundary; every pad byte holds the pad length.
///
/// The device firmware expects exactly this tail (e.g. `04 04 04 04`).
fn pad(buf: &mut BytesMut) {
    let pad_len = BLOCK_SIZE - buf.len() % BLOCK_SIZE;
    buf.put_bytes(pad_len as u8, pad_len);
}

/// Strip the padding added by [`build_frame`]. Used when inspecting requests.
pub fn unpad(plain: &[u8]) -> Result<&[u8]> {
    let pad_len = *plain.last().ok_or_else(|| WsError::MalformedFrame("Empty block".to_string()))? as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > plain.len() {
        return Err(WsError::MalformedFrame(format!("Invalid padding length {pad_len}")));
    }
    if plain[plain.len() - pad_len..].iter().any(|&b| b as usize != pad_len) {
        return Err(WsError::MalformedFrame("Inconsistent padding".to_string()));
    }
    Ok(&plain[..plain.len() - pad_len])
}

/// A request frame taken apart again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    pub mac: MacAddress,
    pub packet_seq: u16,
    pub device_code: [u8; 4],
    pub body: Bytes,
}

/// Decode a request frame produced by [`build_frame`].
///
/// Sockets never need this; it lets tests and traffic dumps see what was sent.
pub fn decode_request(frame: &[u8]) -> Result<DecodedRequest> {
    if frame.len() <= FRAME_PREFIX_SIZE || frame[0] != FRAME_INIT || frame[1] != FRAME_SEND {
        return Err(WsError::MalformedFrame("Not a request frame".to_string()));
    }
    let mac = MacAddress(frame[2..8].try_into()?);
    let len = frame[8] as usize;
    let encrypted = &frame[FRAME_PREFIX_SIZE..];
    if encrypted.len() != len {
        return Err(WsError::MalformedFrame(format!(
            "Length byte says {len}, frame carries {}",
            encrypted.len()
        )));
    }

    let plain = cipher::decrypt(encrypted)?;
    let plain = unpad(&plain)?;
    if plain.len() < HEADER_SIZE || plain[0] != HEADER_MARKER {
        return Err(WsError::MalformedFrame("Bad encrypted header".to_string()));
    }

    Ok(DecodedRequest {
        mac,
        packet_seq: u16::from_be_bytes([plain[1], plain[2]]),
        device_code: plain[3..7].try_into()?,
        body: Bytes::copy_from_slice(&plain[HEADER_SIZE..]),
    })
}

/// Build a reply datagram carrying `payload`. Used by the test fake device.
pub fn build_reply(mac: &MacAddress, payload: &[u8]) -> Result<Bytes> {
    let mut plain = BytesMut::from(payload);
    if !plain.len().is_multiple_of(BLOCK_SIZE) || plain.is_empty() {
        pad(&mut plain);
    }
    let encrypted = cipher::encrypt(&plain)?;

    let mut frame = BytesMut::with_capacity(FRAME_PREFIX_SIZE + encrypted.len());
    frame.put_u8(FRAME_INIT);
    frame.put_u8(FRAME_REPLY);
    frame.put_slice(&mac.octets());
    frame.put_u8(encrypted.len() as u8);
    frame.put_slice(&encrypted);
    Ok(frame.freeze())
}
