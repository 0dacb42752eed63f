//! Partitions active lessons into phases and expands them into time segments.
//!
//! A phase is a maximal run of consecutive lessons whose gaps are at most the
//! gap threshold. Each phase expands into one `Lesson` segment per lesson and a
//! `Break` segment for every non-empty gap between its lessons. Gaps between
//! phases are never materialized, so they do not count towards the day total.

use crate::common::{LessonId, MinuteOfDay};
use crate::schedule::Lesson;
use serde::Serialize;

/// Gaps strictly longer than this many minutes start a new phase.
pub const DEFAULT_GAP_THRESHOLD: u16 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Lesson,
    Break,
}

/// Start and end of a phase, carried by every segment inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PhaseBounds {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

impl PhaseBounds {
    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }
}

/// An atomic lesson or break interval within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeSegment {
    pub kind: SegmentKind,
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
    pub phase: PhaseBounds,
    /// The lesson this segment covers; `None` for breaks.
    pub lesson: Option<LessonId>,
}

impl TimeSegment {
    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    /// Whether `now` (fractional minutes since midnight) falls in `[start, end)`.
    pub fn contains(&self, now: f64) -> bool {
        self.start.as_f64() <= now && now < self.end.as_f64()
    }
}

/// A maximal run of lessons separated by short gaps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub bounds: PhaseBounds,
    pub lessons: Vec<Lesson>,
}

/// Groups lessons into phases, splitting wherever `next.start - prev.end > threshold`.
pub fn partition_phases(active: &[Lesson], threshold: u16) -> Vec<Phase> {
    let mut groups: Vec<Vec<Lesson>> = Vec::new();
    for lesson in active {
        let gap = match groups.last().and_then(|group| group.last()) {
            Some(previous) => i32::from(lesson.start.minutes()) - i32::from(previous.end.minutes()),
            None => i32::MAX,
        };
        match groups.last_mut() {
            Some(group) if gap <= i32::from(threshold) => group.push(*lesson),
            _ => groups.push(vec![*lesson]),
        }
    }

    groups
        .into_iter()
        .filter_map(|lessons| {
            let bounds = PhaseBounds {
                start: lessons.first()?.start,
                end: lessons.last()?.end,
            };
            Some(Phase { bounds, lessons })
        })
        .collect()
}

fn expand_phases(phases: &[Phase]) -> Vec<TimeSegment> {
    let mut segments = Vec::new();
    for phase in phases {
        let mut lessons = phase.lessons.iter().peekable();
        while let Some(lesson) = lessons.next() {
            segments.push(TimeSegment {
                kind: SegmentKind::Lesson,
                start: lesson.start,
                end: lesson.end,
                phase: phase.bounds,
                lesson: Some(lesson.id),
            });
            if let Some(next) = lessons.peek() {
                if next.start > lesson.end {
                    segments.push(TimeSegment {
                        kind: SegmentKind::Break,
                        start: lesson.end,
                        end: next.start,
                        phase: phase.bounds,
                        lesson: None,
                    });
                }
            }
        }
    }
    segments
}

/// Expands active lessons into the ordered segment list for the day.
pub fn segment(active: &[Lesson], threshold: u16) -> Vec<TimeSegment> {
    expand_phases(&partition_phases(active, threshold))
}

/// The derived phases and segments for one set of active lessons.
///
/// Always rebuilt from scratch after the exclusion set changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schedule {
    phases: Vec<Phase>,
    segments: Vec<TimeSegment>,
}

impl Schedule {
    pub fn build(active: &[Lesson], threshold: u16) -> Self {
        let phases = partition_phases(active, threshold);
        let segments = expand_phases(&phases);
        Self { phases, segments }
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn segments(&self) -> &[TimeSegment] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Sum of all segment lengths; inter-phase gaps are not included.
    pub fn total_minutes(&self) -> u32 {
        self.segments
            .iter()
            .map(|segment| u32::from(segment.duration_minutes()))
            .sum()
    }

    /// The segment with `start <= now < end`, if any.
    pub fn segment_at(&self, now: f64) -> Option<&TimeSegment> {
        let index = self
            .segments
            .partition_point(|segment| segment.start.as_f64() <= now);
        index
            .checked_sub(1)
            .and_then(|i| self.segments.get(i))
            .filter(|segment| segment.contains(now))
    }
}
