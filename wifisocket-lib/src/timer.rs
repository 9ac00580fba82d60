//! Timer slots, the countdown, and their wire encoding
//!
//! Each socket has ten regular timer slots and one countdown (slot 11). The
//! socket clock runs on a UTC-like baseline, so times are shifted by a
//! `delta` (seconds west of UTC by default) on the way in and out.

use chrono::{Datelike, Local, NaiveDate, NaiveTime, Offset, TimeDelta, TimeZone, Timelike, Utc};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::command::{Command, SwitchState};
use crate::constants::{COUNTDOWN_SLOT, EMPTY_TIMER_HOUR, TIMER_SLOTS};
use crate::error::{Result, WsError};
use crate::layout::{TimerFlags, TimerRecordRaw, TimerTableRaw, decode_record};

/// A timer slot: one of the ten regular slots or the countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerSlotId {
    Regular(u8),
    Countdown,
}

impl TimerSlotId {
    /// Regular slot `1..=10`
    pub fn regular(number: u8) -> Result<Self> {
        if (1..=TIMER_SLOTS).contains(&number) {
            Ok(TimerSlotId::Regular(number))
        } else {
            Err(WsError::InvalidInput(format!("Timer slot must be 1-10, got {number}")))
        }
    }

    /// Slot by wire number, 11 being the countdown
    pub fn from_number(number: u8) -> Result<Self> {
        if number == COUNTDOWN_SLOT {
            Ok(TimerSlotId::Countdown)
        } else {
            Self::regular(number)
        }
    }

    pub fn number(&self) -> u8 {
        match self {
            TimerSlotId::Regular(n) => *n,
            TimerSlotId::Countdown => COUNTDOWN_SLOT,
        }
    }

    /// Wire number, rejecting regular slots outside `1..=10`
    pub fn checked_number(&self) -> Result<u8> {
        match self {
            TimerSlotId::Regular(n) => Self::regular(*n).map(|_| *n),
            TimerSlotId::Countdown => Ok(COUNTDOWN_SLOT),
        }
    }

    pub fn is_countdown(&self) -> bool {
        matches!(self, TimerSlotId::Countdown)
    }

    /// All slots in wire order
    pub fn all() -> impl Iterator<Item = TimerSlotId> {
        (1..=TIMER_SLOTS)
            .map(TimerSlotId::Regular)
            .chain(std::iter::once(TimerSlotId::Countdown))
    }
}

impl fmt::Display for TimerSlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerSlotId::Regular(n) => write!(f, "{n}"),
            TimerSlotId::Countdown => write!(f, "Countdown"),
        }
    }
}

impl FromStr for TimerSlotId {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("countdown") {
            return Ok(TimerSlotId::Countdown);
        }
        let number = s
            .parse::<u8>()
            .map_err(|_| WsError::InvalidInput(format!("Invalid timer slot '{s}'")))?;
        Self::from_number(number)
    }
}

/// Weekly repeat pattern, bit 0 = Monday ... bit 6 = Sunday
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RepeatMask(u8);

impl RepeatMask {
    pub const NEVER: RepeatMask = RepeatMask(0);
    pub const WEEKDAYS: RepeatMask = RepeatMask(0b001_1111);
    pub const DAILY: RepeatMask = RepeatMask(0b111_1111);

    pub fn from_bits(bits: u8) -> Self {
        RepeatMask(bits & 0x7F)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn repeats_on(&self, day: chrono::Weekday) -> bool {
        self.0 & (1 << day.num_days_from_monday()) != 0
    }
}

/// Monday-first string, e.g. `1111100` for Monday to Friday
impl fmt::Display for RepeatMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in 0..7 {
            let c = if self.0 & (1 << day) != 0 { '1' } else { '0' };
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for RepeatMask {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.len() != 7 {
            return Err(WsError::InvalidInput(format!(
                "Repeat pattern needs 7 digits (Monday first), got '{s}'"
            )));
        }
        let mut bits = 0u8;
        for (day, c) in s.chars().enumerate() {
            match c {
                '1' => bits |= 1 << day,
                '0' => {}
                _ => return Err(WsError::InvalidInput(format!("Invalid repeat pattern '{s}'"))),
            }
        }
        Ok(RepeatMask(bits))
    }
}

/// Pack the active flag and repeat pattern into the wire byte
pub fn encode_flags(active: bool, repeat: RepeatMask) -> u8 {
    TimerFlags::new().with_days(repeat.bits()).with_active(active).into_bytes()[0]
}

/// Inverse of [`encode_flags`]
pub fn decode_flags(byte: u8) -> (bool, RepeatMask) {
    let flags = TimerFlags::from_bytes([byte]);
    (flags.active(), RepeatMask::from_bits(flags.days()))
}

/// What a programmed slot does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSchedule {
    pub active: bool,
    pub repeat: RepeatMask,
    /// Local switching time; for the countdown, the time remaining
    pub time: NaiveTime,
    pub action: SwitchState,
}

/// A timer slot as reported by the socket. Empty slots carry no schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSlot {
    pub slot: TimerSlotId,
    pub schedule: Option<TimerSchedule>,
}

impl TimerSlot {
    pub fn is_set(&self) -> bool {
        self.schedule.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.schedule.is_some_and(|s| s.active)
    }
}

impl fmt::Display for TimerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schedule {
            Some(s) => write!(
                f,
                "Timer(number={}, active={}, repeat={}, time={}, switch={})",
                self.slot,
                s.active,
                s.repeat,
                s.time.format("%H:%M"),
                s.action
            ),
            None => write!(f, "Timer(number={}, empty)", self.slot),
        }
    }
}

/// Which slots a timer query reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerSelector {
    #[default]
    All,
    Slot(TimerSlotId),
    /// Programmed and active
    Active,
    /// Programmed, active or not
    Set,
    /// Not programmed
    Free,
}

impl TimerSelector {
    pub fn matches(&self, slot: &TimerSlot) -> bool {
        match self {
            TimerSelector::All => true,
            TimerSelector::Slot(id) => slot.slot == *id,
            TimerSelector::Active => slot.is_active(),
            TimerSelector::Set => slot.is_set(),
            TimerSelector::Free => !slot.is_set(),
        }
    }
}

impl FromStr for TimerSelector {
    type Err = WsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TimerSelector::All),
            "active" => Ok(TimerSelector::Active),
            "set" => Ok(TimerSelector::Set),
            "free" => Ok(TimerSelector::Free),
            other => other.parse().map(TimerSelector::Slot),
        }
    }
}

/// Parse `HH:MM`
pub fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| WsError::InvalidInput(format!("Invalid time '{s}', expected HH:MM: {e}")))
}

/// Difference between the socket clock and local time: seconds west of UTC,
/// ignoring daylight saving time
pub fn local_delta() -> TimeDelta {
    standard_delta(&Local, Local::now().year())
}

/// Seconds west of UTC of the standard (winter) time of `tz` in `year`.
///
/// The standard offset is the smaller of the January and July offsets, which
/// also holds on the southern hemisphere.
pub fn standard_delta<Tz: TimeZone>(tz: &Tz, year: i32) -> TimeDelta {
    let offset_in = |month: u32| {
        NaiveDate::from_ymd_opt(year, month, 1)
            .and_then(|date| date.and_hms_opt(12, 0, 0))
            .and_then(|noon| tz.from_local_datetime(&noon).earliest())
            .map(|time| time.offset().fix().local_minus_utc())
    };
    let standard = match (offset_in(1), offset_in(7)) {
        (Some(january), Some(july)) => january.min(july),
        (Some(offset), None) | (None, Some(offset)) => offset,
        (None, None) => tz.offset_from_utc_datetime(&Utc::now().naive_utc()).fix().local_minus_utc(),
    };
    TimeDelta::seconds(-i64::from(standard))
}

/// Current local time of day, truncated to the minute
pub fn local_time_of_day() -> NaiveTime {
    truncate_to_minute(Local::now().time())
}

fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

fn since_midnight(time: NaiveTime) -> TimeDelta {
    TimeDelta::seconds(i64::from(time.num_seconds_from_midnight()))
}

/// Build the command that programs `slot`.
///
/// For the countdown, `time` is the duration to wait; the socket is sent the
/// absolute clock time `now + time`, always active and never repeating.
/// Regular slots outside `1..=10` are rejected.
pub fn program_timer(
    slot: TimerSlotId,
    active: bool,
    repeat: RepeatMask,
    time: NaiveTime,
    action: SwitchState,
    delta: TimeDelta,
    now: NaiveTime,
) -> Result<Command> {
    let number = slot.checked_number()?;
    let (flags, local) = match slot {
        TimerSlotId::Countdown => (
            TimerFlags::new().with_days(0).with_active(true),
            now + since_midnight(time),
        ),
        TimerSlotId::Regular(_) => (
            TimerFlags::new().with_days(repeat.bits()).with_active(active),
            time,
        ),
    };
    let stored = local + delta;

    Ok(Command::SetTimer {
        slot: number,
        flags,
        hour: stored.hour() as u8,
        minute: stored.minute() as u8,
        action,
    })
}

/// Decode the full timer table from a decrypted reply payload.
pub fn decode_timer_table(payload: &[u8], delta: TimeDelta, now: NaiveTime) -> Result<Vec<TimerSlot>> {
    let table: &TimerTableRaw = decode_record(payload)?;
    TimerSlotId::all()
        .zip(table.records.iter())
        .map(|(slot, record)| decode_slot(slot, record, delta, now))
        .collect()
}

fn decode_slot(slot: TimerSlotId, record: &TimerRecordRaw, delta: TimeDelta, now: NaiveTime) -> Result<TimerSlot> {
    if !slot.is_countdown() && record.number != slot.number() {
        debug!("Timer record {} reports number {}", slot, record.number);
    }
    if record.hour == EMPTY_TIMER_HOUR {
        return Ok(TimerSlot { slot, schedule: None });
    }

    let stored = NaiveTime::from_hms_opt(u32::from(record.hour), u32::from(record.minute), 0).ok_or_else(|| {
        WsError::UnexpectedResponse(format!(
            "Timer {} holds invalid time {}:{}",
            slot, record.hour, record.minute
        ))
    })?;

    let mut time = stored - delta;
    if slot.is_countdown() {
        // Stored as the clock time the countdown fires; report what remains
        time = time - since_midnight(truncate_to_minute(now));
    }

    let (active, repeat) = decode_flags(record.flags);
    Ok(TimerSlot {
        slot,
        schedule: Some(TimerSchedule {
            active,
            repeat,
            time,
            action: SwitchState::from_action_pattern(&record.action),
        }),
    })
}

/// Keep the slots a selector asks for, in wire order
pub fn select(slots: Vec<TimerSlot>, selector: TimerSelector) -> Vec<TimerSlot> {
    slots.into_iter().filter(|slot| selector.matches(slot)).collect()
}
