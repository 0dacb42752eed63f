//! Defines all configuration structures for the Daybell engine.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde` and the `config` crate. The timetable,
//! the calendar windows and the persisted user settings all live here, so a
//! deployment can swap its school calendar without touching code.
//!
//! Sources are layered: built-in defaults, then an optional file, then
//! environment variables prefixed with `DAYBELL` (nested keys separated by `__`,
//! e.g. `DAYBELL__SETTINGS__DEV__ENABLED=true`).

use crate::common::{LessonId, MinuteOfDay};
use crate::error::DaybellError;
use crate::schedule::{default_lessons, validate_lessons, Lesson};
use crate::segment::DEFAULT_GAP_THRESHOLD;
use chrono::NaiveDate;
use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The top-level configuration for the `DaybellEngine`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaybellConfig {
    /// How often the engine re-evaluates progress.
    pub resolution: ClockResolution,

    /// The zone in which time of day and calendar dates are read.
    /// Uses the string names from the IANA Time Zone Database
    /// (e.g., "Europe/Amsterdam").
    pub timezone: Tz,

    /// Gaps between lessons longer than this start a new phase.
    pub gap_threshold_minutes: u16,

    /// The master timetable, in order.
    pub lessons: Vec<Lesson>,

    /// The virtual day a time loop sweeps through.
    pub loop_window: TimeWindow,

    /// Fixed term and year windows for the calendar scopes.
    pub calendar: CalendarConfig,

    /// The persisted user settings consumed by the clock and the schedule store.
    pub settings: Settings,
}

/// Defines the update rate of the engine's tick loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockResolution {
    /// ~60 ticks per second. Smooth enough for animated progress bars.
    High,
    /// ~30 ticks per second.
    Medium,
    /// ~1 tick per second. Enough for minute-level statistics.
    #[default]
    Low,
    /// A user-defined speed in ticks per second.
    Custom { ticks_per_second: u64 },
}

impl ClockResolution {
    /// The fastest rate a custom resolution may ask for.
    pub const MAX_TICKS_PER_SECOND: u64 = 1000;

    pub fn ticks_per_second(&self) -> u64 {
        match self {
            ClockResolution::High => 60,
            ClockResolution::Medium => 30,
            ClockResolution::Low => 1,
            ClockResolution::Custom { ticks_per_second } => *ticks_per_second,
        }
    }

    /// The interval between two ticks, never shorter than one millisecond.
    pub fn period(&self) -> Duration {
        let ticks_per_second = self.ticks_per_second().clamp(1, Self::MAX_TICKS_PER_SECOND);
        Duration::from_nanos(1_000_000_000 / ticks_per_second)
    }

    pub fn validate(&self) -> Result<(), DaybellError> {
        let got = self.ticks_per_second();
        if !(1..=Self::MAX_TICKS_PER_SECOND).contains(&got) {
            return Err(DaybellError::InvalidResolution {
                got,
                max: Self::MAX_TICKS_PER_SECOND,
            });
        }
        Ok(())
    }
}

/// A start and end time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TimeWindow {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

impl TimeWindow {
    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes().saturating_sub(self.start.minutes())
    }
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start: MinuteOfDay::hm(8, 15),
            end: MinuteOfDay::hm(16, 0),
        }
    }
}

/// A window of calendar dates. Both edges are read as local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    fn new(start: (i32, u32, u32), end: (i32, u32, u32)) -> Option<Self> {
        Some(Self {
            start: NaiveDate::from_ymd_opt(start.0, start.1, start.2)?,
            end: NaiveDate::from_ymd_opt(end.0, end.1, end.2)?,
        })
    }
}

/// Term windows and the school-year window.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub terms: Vec<DateWindow>,
    pub year: DateWindow,
}

impl CalendarConfig {
    pub fn validate(&self) -> Result<(), DaybellError> {
        if self.terms.is_empty() {
            return Err(DaybellError::InvalidCalendar("at least one term is required".to_string()));
        }
        for window in self.terms.iter().chain(std::iter::once(&self.year)) {
            if window.start >= window.end {
                return Err(DaybellError::InvalidCalendar(format!(
                    "window {} .. {} does not end after it starts",
                    window.start, window.end
                )));
            }
        }
        Ok(())
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        // Dutch school holidays for the 2025-2026 year.
        let terms = [
            ((2025, 8, 26), (2025, 10, 18)),
            ((2025, 10, 27), (2025, 12, 20)),
            ((2026, 1, 5), (2026, 2, 21)),
            ((2026, 3, 2), (2026, 4, 22)),
            ((2026, 5, 6), (2026, 7, 4)),
        ];
        Self {
            terms: terms
                .iter()
                .filter_map(|&(start, end)| DateWindow::new(start, end))
                .collect(),
            year: DateWindow::new((2025, 8, 24), (2026, 7, 4)).unwrap_or(DateWindow {
                start: NaiveDate::MIN,
                end: NaiveDate::MAX,
            }),
        }
    }
}

/// The user-owned settings the core consumes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub deleted_lessons: Vec<LessonId>,
    pub dev: DevSettings,
}

/// Developer time-travel settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevSettings {
    pub enabled: bool,
    pub time_loop: TimeLoopSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeLoopSettings {
    pub enabled: bool,
    /// Length of one loop through the virtual day, in seconds.
    pub duration: f64,
}

impl Default for TimeLoopSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: 60.0,
        }
    }
}

impl Default for DaybellConfig {
    fn default() -> Self {
        Self {
            resolution: ClockResolution::default(),
            timezone: Tz::UTC,
            gap_threshold_minutes: DEFAULT_GAP_THRESHOLD,
            lessons: default_lessons(),
            loop_window: TimeWindow::default(),
            calendar: CalendarConfig::default(),
            settings: Settings::default(),
        }
    }
}

impl DaybellConfig {
    /// Loads the configuration from an optional file plus `DAYBELL__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, DaybellError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let config: DaybellConfig = builder
            .add_source(Environment::with_prefix("DAYBELL").separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document on top of the defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, DaybellError> {
        let config: DaybellConfig = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DaybellError> {
        validate_lessons(&self.lessons)?;
        self.resolution.validate()?;
        self.calendar.validate()?;
        if self.loop_window.start >= self.loop_window.end {
            return Err(DaybellError::InvalidCalendar(format!(
                "loop window {} .. {} does not end after it starts",
                self.loop_window.start, self.loop_window.end
            )));
        }
        Ok(())
    }
}
