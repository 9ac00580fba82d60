//! Absence (antithief) mode
//!
//! While the window is active the socket toggles its relay every 30 minutes
//! to make the home look occupied.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use std::fmt;

use crate::command::Command;
use crate::constants::ABSENCE_ACTIVE;
use crate::error::{Result, WsError};
use crate::layout::{AbsenceReplyRaw, decode_record};

/// Text format of absence timestamps
pub const ABSENCE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Absence window as programmed on the socket. Bounds are only reported when active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsenceWindow {
    pub active: bool,
    pub from: Option<DateTime<Local>>,
    pub to: Option<DateTime<Local>>,
}

impl AbsenceWindow {
    pub fn inactive() -> Self {
        Self {
            active: false,
            from: None,
            to: None,
        }
    }
}

impl fmt::Display for AbsenceWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.from, self.to) {
            (Some(from), Some(to)) if self.active => write!(
                f,
                "Absence(active=true, from={}, to={})",
                from.format(ABSENCE_TIME_FORMAT),
                to.format(ABSENCE_TIME_FORMAT)
            ),
            _ => write!(f, "Absence(active={})", self.active),
        }
    }
}

/// Parse a local timestamp in `dd.mm.yyyy HH:MM` format
pub fn parse_absence_time(s: &str) -> Result<DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), ABSENCE_TIME_FORMAT)
        .map_err(|e| WsError::InvalidInput(format!("Invalid date '{s}', expected dd.mm.yyyy HH:MM: {e}")))?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| WsError::InvalidInput(format!("'{s}' does not exist in the local time zone")))
}

fn to_epoch(time: &DateTime<Local>) -> Result<u32> {
    u32::try_from(time.timestamp())
        .map_err(|_| WsError::InvalidInput(format!("{time} is outside the range the socket can store")))
}

fn from_epoch(seconds: u32) -> Result<DateTime<Local>> {
    Local
        .timestamp_opt(i64::from(seconds), 0)
        .single()
        .ok_or_else(|| WsError::UnexpectedResponse(format!("Invalid absence timestamp {seconds}")))
}

/// Build the command programming an absence window.
pub fn program_absence(active: bool, from: &DateTime<Local>, to: &DateTime<Local>) -> Result<Command> {
    Ok(Command::SetAbsence {
        active,
        from: to_epoch(from)?,
        to: to_epoch(to)?,
    })
}

/// Decode an absence query reply.
pub fn decode_absence(payload: &[u8]) -> Result<AbsenceWindow> {
    let record: &AbsenceReplyRaw = decode_record(payload)?;
    if record.flag != ABSENCE_ACTIVE {
        return Ok(AbsenceWindow::inactive());
    }
    Ok(AbsenceWindow {
        active: true,
        from: Some(from_epoch(record.from.get())?),
        to: Some(from_epoch(record.to.get())?),
    })
}
