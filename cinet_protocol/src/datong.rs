// src/datong.rs
//! Datong 5-byte compact date-time.
//!
//! ```text
//! byte 0: dddd dMMM   day(5)         | month >> 1 (3)
//! byte 1: mYYY YYYY   month & 1 (1)  | year - 1980 (7)
//! byte 2: hhhh hmmm   hour(5)        | minute >> 3 (3)
//! byte 3: mmms ssss   minute & 7 (3) | second >> 1 (5)
//! byte 4: s000 0000   second & 1 (1) | padding
//! ```

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

pub const DATONG_LEN: usize = 5;
pub const EPOCH_YEAR: u16 = 1980;
pub const MAX_YEAR: u16 = EPOCH_YEAR + 0x7F;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatongTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl DatongTime {
    /// Stamp used when a fix carries no time of its own.
    pub const PLACEHOLDER: DatongTime = DatongTime {
        year: 2024,
        month: 1,
        day: 1,
        hour: 0,
        minute: 0,
        second: 0,
    };

    /// Fields outside the representable range are clamped into it.
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year: year.clamp(EPOCH_YEAR, MAX_YEAR),
            month: month.clamp(1, 12),
            day: day.clamp(1, 31),
            hour: hour.min(23),
            minute: minute.min(59),
            second: second.min(59),
        }
    }

    pub fn from_datetime(dt: &NaiveDateTime) -> Self {
        let year = u16::try_from(dt.year()).unwrap_or(if dt.year() < 0 { 0 } else { u16::MAX });
        Self::new(
            year,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
        )
    }

    /// `None` for combinations the calendar rejects (e.g. 31 February).
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), u32::from(self.day))?
            .and_hms_opt(
                u32::from(self.hour),
                u32::from(self.minute),
                u32::from(self.second),
            )
    }

    pub fn encode(&self) -> [u8; DATONG_LEN] {
        let year_off = (self.year.saturating_sub(EPOCH_YEAR) & 0x7F) as u8;
        [
            ((self.day & 0x1F) << 3) | ((self.month >> 1) & 0x07),
            ((self.month & 0x01) << 7) | year_off,
            ((self.hour & 0x1F) << 3) | ((self.minute >> 3) & 0x07),
            ((self.minute & 0x07) << 5) | ((self.second >> 1) & 0x1F),
            (self.second & 0x01) << 7,
        ]
    }

    pub fn decode(bytes: &[u8; DATONG_LEN]) -> Self {
        Self {
            year: u16::from(bytes[1] & 0x7F) + EPOCH_YEAR,
            month: ((bytes[0] & 0x07) << 1) | (bytes[1] >> 7),
            day: bytes[0] >> 3,
            hour: bytes[2] >> 3,
            minute: ((bytes[2] & 0x07) << 3) | (bytes[3] >> 5),
            second: ((bytes[3] & 0x1F) << 1) | (bytes[4] >> 7),
        }
    }
}
