//! Defines all public event types broadcast by the Daybell engine, and the
//! commands it accepts.
//!
//! Listeners subscribe to these strongly-typed streams to render progress or
//! react to bells. User actions and configuration changes flow the other way
//! as `Command`s, so every mutation goes through one entry point.

use crate::common::{LessonId, ListenerId};
use crate::config::Settings;
use crate::progress::Progress;
use crate::segment::{PhaseBounds, TimeSegment};
use chrono::DateTime;
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::time::Instant;

/// Events related to the lifecycle and state of the engine itself.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    /// Fired once when the engine's `run` loop begins.
    EngineStarted { timestamp: Instant },
    /// Fired once when the engine's `run` loop is about to exit.
    EngineShutdown,
    /// Fired when a new listener is successfully added to the engine.
    ListenerAdded { id: ListenerId },
    /// Fired when a listener is removed from the engine.
    ListenerRemoved { id: ListenerId },
    /// Fired after the phase and segment lists were rebuilt.
    ScheduleRecomputed { phases: usize, segments: usize },
    /// Fired after a jump, speed, loop or reset changed the clock.
    ClockAdjusted,
}

/// Transitions between segments and phases, the engine's school bell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BellEvent {
    SegmentStarted(TimeSegment),
    SegmentEnded(TimeSegment),
    PhaseStarted(PhaseBounds),
    PhaseEnded(PhaseBounds),
    /// Fired once when day progress reaches its total.
    DayCompleted,
}

/// A fresh evaluation of every scope.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// The tick that produced it; `None` for on-demand evaluations.
    pub tick: Option<u64>,
    /// The clock reading the evaluation used.
    pub now: DateTime<Tz>,
    pub progress: Arc<Progress>,
}

/// Fired when a registered condition is met.
#[derive(Debug, Clone)]
pub struct ConditionalEvent {
    pub condition_id: ListenerId,
    pub now: DateTime<Tz>,
}

/// User actions and configuration messages the engine accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Include an excluded lesson or exclude an included one.
    ToggleLesson(LessonId),
    JumpTime { minutes: i64 },
    SetSpeed(f64),
    SetLoop { enabled: bool, duration_secs: f64 },
    /// Drop every jump, speed and loop adjustment.
    ResetClock,
    /// Settings changed elsewhere; reapply exclusions and developer settings.
    ConfigurationChanged(Settings),
}
