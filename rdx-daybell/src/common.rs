//! Contains common, primitive types shared across the Daybell engine.
//!
//! This module defines the identifier types for lessons and listeners, the
//! minute-resolution time of day used by the schedule, and the set of scopes
//! progress can be reported over. Using distinct types keeps lesson ids,
//! minutes and listener keys from being mixed up.

use crate::error::DaybellError;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;
use std::str::FromStr;

new_key_type! {
    /// Uniquely and safely identifies a registered listener within the engine.
    ///
    /// This key is returned when a new watcher is added to the engine. It is
    /// guaranteed to be unique and will not be reused, preventing stale ID bugs.
    pub struct ListenerId;
}

/// Identifies a lesson in the master schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LessonId(pub u32);

impl fmt::Display for LessonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Number of minutes in a calendar day.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// A time of day at minute resolution, counted from midnight.
///
/// Parses from and serializes to `"H:MM"` strings, so both `"8:15"` and
/// `"08:15"` are accepted. Displays zero-padded as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MIDNIGHT: Self = Self(0);

    /// Builds a time of day from an hour and minute, rejecting out-of-range values.
    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, DaybellError> {
        if hour >= 24 || minute >= 60 {
            return Err(DaybellError::InvalidTime(format!("{hour}:{minute:02}")));
        }
        Ok(Self(hour * 60 + minute))
    }

    /// Builds a time of day from minutes since midnight.
    pub fn from_minutes(minutes: u16) -> Result<Self, DaybellError> {
        if minutes >= MINUTES_PER_DAY {
            return Err(DaybellError::InvalidTime(format!("{minutes} minutes")));
        }
        Ok(Self(minutes))
    }

    // Only for compile-time tables whose values are known to be in range.
    pub(crate) const fn hm(hour: u16, minute: u16) -> Self {
        Self(hour * 60 + minute)
    }

    pub const fn minutes(self) -> u16 {
        self.0
    }

    pub const fn hour(self) -> u16 {
        self.0 / 60
    }

    pub const fn minute(self) -> u16 {
        self.0 % 60
    }

    pub fn as_f64(self) -> f64 {
        f64::from(self.0)
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for MinuteOfDay {
    type Err = DaybellError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DaybellError::InvalidTime(s.to_string());
        let (hour, minute) = s.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u16 = hour.parse().map_err(|_| invalid())?;
        let minute: u16 = minute.parse().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for MinuteOfDay {
    type Error = DaybellError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MinuteOfDay> for String {
    fn from(value: MinuteOfDay) -> Self {
        value.to_string()
    }
}

/// A window over which elapsed/total progress is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Segment,
    Phase,
    Day,
    Week,
    Term,
    Year,
}

impl Scope {
    pub const ALL: [Scope; 6] = [
        Scope::Segment,
        Scope::Phase,
        Scope::Day,
        Scope::Week,
        Scope::Term,
        Scope::Year,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Scope::Segment => "Current Segment",
            Scope::Phase => "Current Phase",
            Scope::Day => "Day Progress",
            Scope::Week => "Week Progress",
            Scope::Term => "Term Progress",
            Scope::Year => "Year Progress",
        }
    }
}
