use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::str::FromStr;
use strum_macros::Display;

use crate::address::MacAddress;
use crate::constants::ABSENCE_ACTIVE;
use crate::error::{Result, WsError};
use crate::layout::{StateReplyRaw, TimerFlags, decode_record};

/// First byte of every command body
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Switch = 0x01,
    GetState = 0x02,
    SetTimer = 0x03,
    TimerQuery = 0x04,
    DeleteTimer = 0x05,
    SwitchSlave = 0x08,
    SetAbsence = 0x09,
    AbsenceQuery = 0x0A,
    Search = 0x23,
    Heartbeat = 0x61,
}

/// Relay state as reported by the socket (`0xFF` on, `0x00` off)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum SwitchState {
    #[strum(to_string = "off")]
    Off = 0x00,
    #[strum(to_string = "on")]
    On = 0xFF,
}

impl SwitchState {
    /// 4-byte pattern used by switch and timer commands
    pub fn action_pattern(&self) -> [u8; 4] {
        match self {
            SwitchState::On => [0x00, 0x00, 0xFF, 0xFF],
            SwitchState::Off => [0x00, 0x00, 0x00, 0xFF],
        }
    }

    /// Anything but the "on" pattern reads as off, as the sockets do.
    pub fn from_action_pattern(pattern: &[u8; 4]) -> Self {
        if *pattern == SwitchState::On.action_pattern() {
            SwitchState::On
        } else {
            SwitchState::Off
        }
    }

    fn slave_code(&self) -> u8 {
        match self {
            SwitchState::On => 0x60,
            SwitchState::Off => 0x70,
        }
    }
}

impl FromStr for SwitchState {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(SwitchState::On),
            "off" => Ok(SwitchState::Off),
            other => Err(WsError::InvalidInput(format!("Expected 'on' or 'off', got '{other}'"))),
        }
    }
}

/// Commands understood by the sockets, before framing and encryption
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Ask sockets matching `mac` (or all, for the broadcast MAC) to identify themselves
    Search { mac: MacAddress },
    Switch(SwitchState),
    GetState,
    /// Switch a 433 MHz slave socket paired with the Wi-Fi socket. Untested on hardware.
    SwitchSlave { slave: [u8; 3], state: SwitchState },
    TimerQuery,
    SetTimer {
        slot: u8,
        flags: TimerFlags,
        hour: u8,
        minute: u8,
        action: SwitchState,
    },
    DeleteTimer { slot: u8 },
    AbsenceQuery,
    /// Absence window, epoch seconds
    SetAbsence { active: bool, from: u32, to: u32 },
    DeleteAbsence,
    Heartbeat,
}

impl Command {
    pub fn opcode(&self) -> Opcode {
        match self {
            Command::Search { .. } => Opcode::Search,
            Command::Switch(_) => Opcode::Switch,
            Command::GetState => Opcode::GetState,
            Command::SwitchSlave { .. } => Opcode::SwitchSlave,
            Command::TimerQuery => Opcode::TimerQuery,
            Command::SetTimer { .. } => Opcode::SetTimer,
            Command::DeleteTimer { .. } => Opcode::DeleteTimer,
            Command::AbsenceQuery => Opcode::AbsenceQuery,
            Command::SetAbsence { .. } | Command::DeleteAbsence => Opcode::SetAbsence,
            Command::Heartbeat => Opcode::Heartbeat,
        }
    }

    /// Serialize the command body. Padding is added by the frame codec.
    pub fn body(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        buf.put_u8(self.opcode().into());

        match self {
            Command::Search { mac } => buf.put_slice(&mac.octets()),
            Command::Switch(state) => buf.put_slice(&state.action_pattern()),
            Command::GetState => buf.put_bytes(0x00, 4),
            Command::SwitchSlave { slave, state } => {
                buf.put_slice(slave);
                buf.put_u8(state.slave_code());
            }
            Command::TimerQuery => buf.put_bytes(0x00, 2),
            Command::SetTimer {
                slot,
                flags,
                hour,
                minute,
                action,
            } => {
                buf.put_u8(0x00);
                buf.put_u8(*slot);
                buf.put_slice(&flags.into_bytes());
                buf.put_u8(*hour);
                buf.put_u8(*minute);
                buf.put_slice(&action.action_pattern());
            }
            Command::DeleteTimer { slot } => {
                buf.put_u8(0x00);
                buf.put_u8(*slot);
            }
            Command::AbsenceQuery => {}
            Command::SetAbsence { active, from, to } => {
                buf.put_u8(if *active { ABSENCE_ACTIVE } else { 0x00 });
                buf.put_u32(*from);
                buf.put_u32(*to);
                buf.put_u8(0x1E);
            }
            Command::DeleteAbsence => {
                buf.put_u8(0x00);
                buf.put_u32(0);
                buf.put_u32(0);
                buf.put_u8(0x0E);
            }
            // The official app sends a timestamp here; any constant is accepted
            Command::Heartbeat => buf.put_slice(&[0x55, 0x93, 0x26, 0x54]),
        }

        buf.freeze()
    }
}

/// Decode the relay state from a state query reply.
pub fn decode_state(payload: &[u8]) -> Result<SwitchState> {
    let record: &StateReplyRaw = decode_record(payload)?;
    SwitchState::try_from(record.state)
        .map_err(|e| WsError::UnexpectedResponse(format!("Unknown switch state 0x{:02X}", e.number)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_hex(command: Command) -> String {
        hex::encode(command.body())
    }

    #[test]
    fn test_fixed_bodies() {
        assert_eq!(body_hex(Command::Switch(SwitchState::On)), "010000ffff");
        assert_eq!(body_hex(Command::Switch(SwitchState::Off)), "01000000ff");
        assert_eq!(body_hex(Command::GetState), "0200000000");
        assert_eq!(body_hex(Command::TimerQuery), "040000");
        assert_eq!(body_hex(Command::AbsenceQuery), "0a");
        assert_eq!(body_hex(Command::Heartbeat), "6155932654");
        assert_eq!(body_hex(Command::DeleteAbsence), "0900000000000000000e");
    }

    #[test]
    fn test_search_body() {
        assert_eq!(body_hex(Command::Search { mac: MacAddress::BROADCAST }), "23ffffffffffff");
    }

    #[test]
    fn test_set_timer_body() {
        let command = Command::SetTimer {
            slot: 3,
            flags: TimerFlags::new().with_days(0b0011111).with_active(true),
            hour: 6,
            minute: 30,
            action: SwitchState::On,
        };
        assert_eq!(body_hex(command), "0300039f061e0000ffff");
    }

    #[test]
    fn test_delete_timer_body() {
        assert_eq!(body_hex(Command::DeleteTimer { slot: 11 }), "05000b");
    }

    #[test]
    fn test_set_absence_body() {
        let command = Command::SetAbsence {
            active: true,
            from: 0x6591_F300,
            to: 0x6593_4480,
        };
        assert_eq!(body_hex(command), "09806591f300659344801e");
    }

    #[test]
    fn test_switch_slave_body() {
        let command = Command::SwitchSlave {
            slave: [0x78, 0xFB, 0x12],
            state: SwitchState::Off,
        };
        assert_eq!(body_hex(command), "0878fb1270");
    }

    #[test]
    fn test_decode_state() {
        let mut payload = [0u8; 16];
        payload[10] = 0xFF;
        assert_eq!(decode_state(&payload).unwrap(), SwitchState::On);
        payload[10] = 0x00;
        assert_eq!(decode_state(&payload).unwrap(), SwitchState::Off);
        payload[10] = 0x42;
        assert!(matches!(decode_state(&payload), Err(WsError::UnexpectedResponse(_))));
        assert!(matches!(
            decode_state(&payload[..10]),
            Err(WsError::InsufficientData { expected: 11, actual: 10 })
        ));
    }

    #[test]
    fn test_switch_state_wire_values() {
        assert_eq!(SwitchState::try_from(0xFFu8).unwrap(), SwitchState::On);
        assert_eq!(SwitchState::try_from(0x00u8).unwrap(), SwitchState::Off);
        assert!(SwitchState::try_from(0x01u8).is_err());
        assert_eq!(SwitchState::from_action_pattern(&[0, 0, 0xFF, 0xFF]), SwitchState::On);
        assert_eq!(SwitchState::from_action_pattern(&[0, 0, 0, 0xFF]), SwitchState::Off);
        assert_eq!("ON".parse::<SwitchState>().unwrap(), SwitchState::On);
        assert_eq!(SwitchState::Off.to_string(), "off");
    }
}
