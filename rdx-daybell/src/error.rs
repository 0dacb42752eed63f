//! Error types for the Daybell engine.
//!
//! Absence of a current segment or phase is a normal state and is modelled
//! with `Option`, not with these errors.

use crate::common::LessonId;
use thiserror::Error;

/// Errors emitted while configuring or driving the engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DaybellError {
    #[error("time loop duration must be positive, got {0}s")]
    InvalidLoopDuration(f64),
    #[error("speed multiplier must be a finite number, got {0}")]
    InvalidSpeed(f64),
    #[error("jumping {0} minutes moves the clock out of range")]
    JumpOutOfRange(i64),
    #[error("clock resolution must be 1 to {max} ticks per second, got {got}")]
    InvalidResolution { got: u64, max: u64 },
    #[error("invalid time of day '{0}', expected H:MM")]
    InvalidTime(String),
    #[error("lesson {id} is invalid: {reason}")]
    InvalidLesson { id: LessonId, reason: String },
    #[error("lesson {0} is defined more than once")]
    DuplicateLesson(LessonId),
    #[error("lesson {next} starts before lesson {previous} ends")]
    OverlappingLessons { previous: LessonId, next: LessonId },
    #[error("invalid calendar: {0}")]
    InvalidCalendar(String),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
