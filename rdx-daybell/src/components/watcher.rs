//! Defines watchers that react to progress evaluations to produce higher-level events.

use crate::events::BellEvent;
use crate::progress::Progress;
use crate::segment::{PhaseBounds, TimeSegment};

/// A function closure that represents a condition to be checked.
pub type ConditionCheck = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// A function closure executed when a condition is met.
pub type TaskLogic = Box<dyn FnMut(&Progress) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Observation {
    segment: Option<TimeSegment>,
    phase: Option<PhaseBounds>,
    day_completed: bool,
}

impl Observation {
    fn of(progress: &Progress) -> Self {
        Self {
            segment: progress.current_segment,
            phase: progress.current_phase,
            day_completed: progress.day.total > 0.0 && progress.day.elapsed >= progress.day.total,
        }
    }
}

/// Compares consecutive evaluations and rings a bell on every transition.
///
/// The first evaluation only establishes the baseline.
#[doc(hidden)]
#[derive(Debug, Default)]
pub(crate) struct BellWatcher {
    last: Option<Observation>,
}

impl BellWatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Processes an evaluation and returns the bells it crossed, in order.
    pub(crate) fn process(&mut self, progress: &Progress) -> Vec<BellEvent> {
        let current = Observation::of(progress);
        let Some(previous) = self.last.replace(current) else {
            return Vec::new();
        };

        let mut bells = Vec::new();
        if previous.segment != current.segment {
            bells.extend(previous.segment.map(BellEvent::SegmentEnded));
        }
        if previous.phase != current.phase {
            bells.extend(previous.phase.map(BellEvent::PhaseEnded));
            bells.extend(current.phase.map(BellEvent::PhaseStarted));
        }
        if previous.segment != current.segment {
            bells.extend(current.segment.map(BellEvent::SegmentStarted));
        }
        if current.day_completed && !previous.day_completed {
            bells.push(BellEvent::DayCompleted);
        }
        bells
    }
}

/// Watches for a specific condition to become true.
#[doc(hidden)]
pub(crate) struct ConditionalWatcher {
    pub condition: ConditionCheck,
    pub task_logic: TaskLogic,
    pub is_one_shot: bool,
}

impl ConditionalWatcher {
    /// Creates a new `ConditionalWatcher`.
    pub(crate) fn new(condition: ConditionCheck, task_logic: TaskLogic, is_one_shot: bool) -> Self {
        Self {
            condition,
            task_logic,
            is_one_shot,
        }
    }

    /// Executes the condition check and, if true, executes its internal logic.
    /// Returns `true` if the condition was met.
    pub(crate) fn check_and_fire(&mut self, progress: &Progress) -> bool {
        if (self.condition)(progress) {
            (self.task_logic)(progress);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CalendarConfig;
    use crate::progress::evaluate;
    use crate::schedule::default_lessons;
    use crate::segment::{Schedule, SegmentKind, DEFAULT_GAP_THRESHOLD};
    use chrono::TimeZone;
    use chrono_tz::Tz;

    fn progress_at(hour: u32, minute: u32) -> Progress {
        let schedule = Schedule::build(&default_lessons(), DEFAULT_GAP_THRESHOLD);
        let now = Tz::UTC.with_ymd_and_hms(2025, 9, 10, hour, minute, 0).unwrap();
        evaluate(&schedule, &now, &now, &CalendarConfig::default())
    }

    #[test]
    fn first_observation_is_silent() {
        let mut watcher = BellWatcher::new();
        assert!(watcher.process(&progress_at(8, 30)).is_empty());
        assert!(watcher.process(&progress_at(8, 31)).is_empty());
    }

    #[test]
    fn lesson_end_rings_into_the_break() {
        let mut watcher = BellWatcher::new();
        watcher.process(&progress_at(8, 59));
        let bells = watcher.process(&progress_at(9, 0));
        assert_eq!(bells.len(), 2);
        assert!(matches!(bells[0], BellEvent::SegmentEnded(s) if s.kind == SegmentKind::Lesson));
        assert!(matches!(bells[1], BellEvent::SegmentStarted(s) if s.kind == SegmentKind::Break));
    }

    #[test]
    fn leaving_a_phase_rings_phase_and_segment_bells() {
        let mut watcher = BellWatcher::new();
        watcher.process(&progress_at(9, 45));
        let bells = watcher.process(&progress_at(9, 55));
        assert!(matches!(bells.as_slice(), [BellEvent::SegmentEnded(_), BellEvent::PhaseEnded(_)]));

        let bells = watcher.process(&progress_at(10, 15));
        assert!(matches!(bells.as_slice(), [BellEvent::PhaseStarted(_), BellEvent::SegmentStarted(_)]));
    }

    #[test]
    fn day_completion_rings_once() {
        let mut watcher = BellWatcher::new();
        watcher.process(&progress_at(15, 50));
        let bells = watcher.process(&progress_at(16, 5));
        assert_eq!(bells.last(), Some(&BellEvent::DayCompleted));
        assert!(watcher.process(&progress_at(16, 10)).is_empty());
    }

    #[test]
    fn conditional_watcher_fires_only_when_true() {
        let mut fired = 0;
        let mut watcher = ConditionalWatcher::new(
            Box::new(|progress: &Progress| progress.day.percent() >= 50.0),
            Box::new(|_: &Progress| {}),
            true,
        );
        for (hour, minute) in [(8, 30), (11, 0), (13, 0), (15, 0)] {
            if watcher.check_and_fire(&progress_at(hour, minute)) {
                fired += 1;
            }
        }
        assert_eq!(fired, 2);
    }
}
