//! Maps an instant onto the schedule and computes progress for every scope.
//!
//! `segment`, `phase` and `day` follow the clock reading, which may be
//! virtual. `week`, `term` and `year` key off calendar dates and are always
//! computed from real wall-clock time, so time travel never moves them.
//!
//! The week scope is a fixed model rather than a calendar: Monday to Friday,
//! eight hours a day.

use crate::common::{MinuteOfDay, Scope};
use crate::config::{CalendarConfig, DateWindow};
use crate::segment::{PhaseBounds, Schedule, TimeSegment};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::Serialize;

/// Hours per school day assumed by the week scope.
pub const WEEK_HOURS_PER_DAY: u32 = 8;
pub const SCHOOL_DAYS_PER_WEEK: u32 = 5;

/// One edge of a scope window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum ScopeEdge {
    TimeOfDay(MinuteOfDay),
    Date(NaiveDate),
}

/// Elapsed and total minutes over one scope.
///
/// `elapsed` may run past `total` at scope boundaries; use the clamped
/// accessors where a strictly bounded value is needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScopeWindow {
    pub start: Option<ScopeEdge>,
    pub end: Option<ScopeEdge>,
    pub elapsed: f64,
    pub total: f64,
}

impl ScopeWindow {
    pub fn remaining(&self) -> f64 {
        self.total - self.elapsed
    }

    /// Percent of the window elapsed; 0 for an empty window.
    pub fn percent(&self) -> f64 {
        if self.total > 0.0 {
            self.elapsed / self.total * 100.0
        } else {
            0.0
        }
    }

    pub fn clamped_percent(&self) -> f64 {
        self.percent().clamp(0.0, 100.0)
    }

    pub fn clamped_elapsed(&self) -> f64 {
        self.elapsed.clamp(0.0, self.total.max(0.0))
    }
}

/// Everything the presentation layer needs for one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    /// Fractional minutes since midnight of the evaluated instant.
    pub now_minutes: f64,
    pub current_segment: Option<TimeSegment>,
    pub current_phase: Option<PhaseBounds>,
    pub day: ScopeWindow,
    pub week: ScopeWindow,
    pub term: ScopeWindow,
    pub year: ScopeWindow,
}

impl Progress {
    /// The window for `scope`; `None` for segment/phase outside of school hours.
    pub fn window(&self, scope: Scope) -> Option<ScopeWindow> {
        match scope {
            Scope::Segment => self
                .current_segment
                .map(|segment| time_of_day_window(segment.start, segment.end, self.now_minutes)),
            Scope::Phase => self
                .current_phase
                .map(|phase| time_of_day_window(phase.start, phase.end, self.now_minutes)),
            Scope::Day => Some(self.day),
            Scope::Week => Some(self.week),
            Scope::Term => Some(self.term),
            Scope::Year => Some(self.year),
        }
    }
}

fn time_of_day_window(start: MinuteOfDay, end: MinuteOfDay, now: f64) -> ScopeWindow {
    ScopeWindow {
        start: Some(ScopeEdge::TimeOfDay(start)),
        end: Some(ScopeEdge::TimeOfDay(end)),
        elapsed: now - start.as_f64(),
        total: end.as_f64() - start.as_f64(),
    }
}

/// Fractional minutes since local midnight.
pub fn minutes_of_day<Z: TimeZone>(at: &DateTime<Z>) -> f64 {
    let whole = f64::from(at.hour() * 60 + at.minute());
    let seconds = f64::from(at.second()) + f64::from(at.nanosecond()) / 1e9;
    whole + seconds / 60.0
}

/// Sums segment lengths, counting passed segments fully and the current one partially.
pub fn day_window(schedule: &Schedule, now: f64) -> ScopeWindow {
    let (elapsed, total) =
        schedule
            .segments()
            .iter()
            .fold((0.0, 0.0), |(elapsed, total), segment| {
                let start = segment.start.as_f64();
                let end = segment.end.as_f64();
                let passed = if now >= start { now.min(end) - start } else { 0.0 };
                (elapsed + passed, total + (end - start))
            });
    ScopeWindow {
        start: schedule
            .segments()
            .first()
            .map(|segment| ScopeEdge::TimeOfDay(segment.start)),
        end: schedule
            .segments()
            .last()
            .map(|segment| ScopeEdge::TimeOfDay(segment.end)),
        elapsed,
        total,
    }
}

/// Week progress under the fixed Monday-Friday, eight-hours-a-day model.
///
/// Completed weekdays count fully (capped at four), and today's day progress
/// is added only on a weekday.
pub fn week_window(today: NaiveDate, day_elapsed: f64) -> ScopeWindow {
    let minutes_per_day = f64::from(WEEK_HOURS_PER_DAY * 60);
    let index = today.weekday().num_days_from_monday();
    let completed_days = index.min(SCHOOL_DAYS_PER_WEEK - 1);
    let today_elapsed = if index < SCHOOL_DAYS_PER_WEEK {
        day_elapsed
    } else {
        0.0
    };
    let monday = today - Duration::days(i64::from(index));
    ScopeWindow {
        start: Some(ScopeEdge::Date(monday)),
        end: Some(ScopeEdge::Date(
            monday + Duration::days(i64::from(SCHOOL_DAYS_PER_WEEK - 1)),
        )),
        elapsed: f64::from(completed_days) * minutes_per_day + today_elapsed,
        total: f64::from(SCHOOL_DAYS_PER_WEEK) * minutes_per_day,
    }
}

fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Tz> {
    let naive = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

fn minutes_between(from: &DateTime<Tz>, to: &DateTime<Tz>) -> f64 {
    (to.naive_utc() - from.naive_utc()).num_milliseconds() as f64 / 60_000.0
}

/// Progress through a date window, clamped to `[0, total]`.
pub fn date_window(window: &DateWindow, now: &DateTime<Tz>) -> ScopeWindow {
    let tz = now.timezone();
    let start = local_midnight(tz, window.start);
    let end = local_midnight(tz, window.end);
    let total = minutes_between(&start, &end);
    ScopeWindow {
        start: Some(ScopeEdge::Date(window.start)),
        end: Some(ScopeEdge::Date(window.end)),
        elapsed: minutes_between(&start, now).clamp(0.0, total.max(0.0)),
        total,
    }
}

/// The term containing `now`, else the next one to start, else the last one.
pub fn current_term<'a>(calendar: &'a CalendarConfig, now: &DateTime<Tz>) -> Option<&'a DateWindow> {
    let tz = now.timezone();
    let bounds = |window: &DateWindow| {
        (
            local_midnight(tz, window.start),
            local_midnight(tz, window.end),
        )
    };
    calendar
        .terms
        .iter()
        .find(|window| {
            let (start, end) = bounds(*window);
            start <= *now && *now <= end
        })
        .or_else(|| {
            calendar
                .terms
                .iter()
                .filter(|window| bounds(*window).0 > *now)
                .min_by_key(|window| window.start)
        })
        .or_else(|| calendar.terms.iter().max_by_key(|window| window.end))
}

/// Evaluates every scope.
///
/// `now` is the clock reading used for segment, phase and day; `calendar_now`
/// is real wall-clock time used for week, term and year.
pub fn evaluate(
    schedule: &Schedule,
    now: &DateTime<Tz>,
    calendar_now: &DateTime<Tz>,
    calendar: &CalendarConfig,
) -> Progress {
    let now_minutes = minutes_of_day(now);
    let current_segment = schedule.segment_at(now_minutes).copied();
    let day = day_window(schedule, now_minutes);
    Progress {
        now_minutes,
        current_segment,
        current_phase: current_segment.map(|segment| segment.phase),
        day,
        week: week_window(calendar_now.date_naive(), day.elapsed),
        term: current_term(calendar, calendar_now)
            .map(|window| date_window(window, calendar_now))
            .unwrap_or_default(),
        year: date_window(&calendar.year, calendar_now),
    }
}
