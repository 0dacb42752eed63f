//! The master lesson list and the set of lessons excluded from computation.
//!
//! Lessons are never created or destroyed at runtime. The `ScheduleStore`
//! only tracks which of them are currently excluded, and hands out the
//! active subset in master order for the segmenter to work on.

use crate::common::{LessonId, MinuteOfDay};
use crate::error::DaybellError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// A single lesson in the daily timetable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lesson {
    pub id: LessonId,
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

impl Lesson {
    /// Creates a lesson, rejecting a zero id or a lesson that does not end after it starts.
    pub fn new(id: LessonId, start: MinuteOfDay, end: MinuteOfDay) -> Result<Self, DaybellError> {
        let lesson = Self { id, start, end };
        lesson.validate()?;
        Ok(lesson)
    }

    fn validate(&self) -> Result<(), DaybellError> {
        if self.id.0 == 0 {
            return Err(DaybellError::InvalidLesson {
                id: self.id,
                reason: "id must be a positive integer".to_string(),
            });
        }
        if self.start >= self.end {
            return Err(DaybellError::InvalidLesson {
                id: self.id,
                reason: format!("ends at {} which is not after its start {}", self.end, self.start),
            });
        }
        Ok(())
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }
}

const DEFAULT_TIMETABLE: [(u32, (u16, u16), (u16, u16)); 8] = [
    (1, (8, 15), (9, 0)),
    (2, (9, 5), (9, 50)),
    (3, (10, 10), (10, 55)),
    (4, (11, 0), (11, 45)),
    (5, (12, 30), (13, 15)),
    (6, (13, 20), (14, 5)),
    (7, (14, 25), (15, 10)),
    (8, (15, 15), (16, 0)),
];

/// The built-in eight-lesson timetable.
pub fn default_lessons() -> Vec<Lesson> {
    DEFAULT_TIMETABLE
        .iter()
        .map(|&(id, (sh, sm), (eh, em))| Lesson {
            id: LessonId(id),
            start: MinuteOfDay::hm(sh, sm),
            end: MinuteOfDay::hm(eh, em),
        })
        .collect()
}

/// Checks a master list: every lesson valid, ids unique, sorted and non-overlapping.
pub fn validate_lessons(lessons: &[Lesson]) -> Result<(), DaybellError> {
    let mut seen = HashSet::with_capacity(lessons.len());
    for lesson in lessons {
        lesson.validate()?;
        if !seen.insert(lesson.id) {
            return Err(DaybellError::DuplicateLesson(lesson.id));
        }
    }
    for pair in lessons.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(DaybellError::OverlappingLessons {
                previous: pair[0].id,
                next: pair[1].id,
            });
        }
    }
    Ok(())
}

/// Holds the immutable master lesson list and the current exclusion set.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    lessons: Arc<[Lesson]>,
    excluded: BTreeSet<LessonId>,
}

impl ScheduleStore {
    /// Creates a store over a validated master list with nothing excluded.
    pub fn new(lessons: Vec<Lesson>) -> Result<Self, DaybellError> {
        validate_lessons(&lessons)?;
        Ok(Self {
            lessons: lessons.into(),
            excluded: BTreeSet::new(),
        })
    }

    pub fn lessons(&self) -> &[Lesson] {
        &self.lessons
    }

    pub fn excluded(&self) -> &BTreeSet<LessonId> {
        &self.excluded
    }

    pub fn contains(&self, id: LessonId) -> bool {
        self.lessons.iter().any(|lesson| lesson.id == id)
    }

    pub fn is_excluded(&self, id: LessonId) -> bool {
        self.excluded.contains(&id)
    }

    /// Replaces the exclusion set wholesale, typically when restoring persisted settings.
    ///
    /// Ids that are not in the master list are dropped.
    pub fn set_exclusions(&mut self, ids: impl IntoIterator<Item = LessonId>) {
        let mut excluded = BTreeSet::new();
        for id in ids {
            if self.contains(id) {
                excluded.insert(id);
            } else {
                warn!("Ignoring exclusion of unknown lesson {}", id);
            }
        }
        self.excluded = excluded;
    }

    /// Flips whether a lesson is excluded.
    ///
    /// Returns `false` without changing anything when the id is not in the master list.
    pub fn toggle(&mut self, id: LessonId) -> bool {
        if !self.contains(id) {
            debug!("Toggle of unknown lesson {} ignored", id);
            return false;
        }
        if !self.excluded.remove(&id) {
            self.excluded.insert(id);
        }
        true
    }

    /// The lessons that are not excluded, in master-list order.
    pub fn active_lessons(&self) -> Vec<Lesson> {
        self.lessons
            .iter()
            .filter(|lesson| !self.excluded.contains(&lesson.id))
            .copied()
            .collect()
    }
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self {
            lessons: default_lessons().into(),
            excluded: BTreeSet::new(),
        }
    }
}
