//! The virtual clock: real time plus jump, speed and loop adjustments.
//!
//! Speed changes fold the time elapsed under the previous multiplier into an
//! accumulated offset before switching, so virtual time never jumps when the
//! multiplier changes. A time loop replaces all of that with a sweep through a
//! fixed virtual day window, and is mutually exclusive with speed changes.

use super::source::{SystemTimeSource, TimeSource};
use crate::config::{DevSettings, TimeWindow};
use crate::error::DaybellError;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Loop durations from configuration are clamped to at least this many seconds.
pub const MIN_LOOP_DURATION_SECS: f64 = 1.0;

/// Jump and speed offsets are each bounded to this many milliseconds (about 1000 years).
pub const MAX_OFFSET_MS: i64 = 1_000 * 366 * 24 * 60 * 60 * 1000;

/// An active time loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopState {
    pub duration_secs: f64,
    /// Real time at which the loop was enabled, in Unix milliseconds.
    pub started_at_ms: i64,
}

impl LoopState {
    pub fn started_at(&self) -> DateTime<Utc> {
        from_ms(self.started_at_ms)
    }
}

/// Produces the current instant, real or virtual.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    source: Arc<dyn TimeSource>,
    timezone: Tz,
    loop_window: TimeWindow,
    jump_offset_ms: i64,
    speed_multiplier: f64,
    speed_offset_ms: f64,
    last_speed_update_ms: i64,
    time_loop: Option<LoopState>,
}

impl VirtualClock {
    pub fn new(source: Arc<dyn TimeSource>, timezone: Tz) -> Self {
        let now = source.now_ms();
        Self {
            source,
            timezone,
            loop_window: TimeWindow::default(),
            jump_offset_ms: 0,
            speed_multiplier: 1.0,
            speed_offset_ms: 0.0,
            last_speed_update_ms: now,
            time_loop: None,
        }
    }

    /// A clock over the system wall clock.
    pub fn system(timezone: Tz) -> Self {
        Self::new(Arc::new(SystemTimeSource), timezone)
    }

    /// Sets the virtual day a time loop sweeps through.
    pub fn with_loop_window(mut self, window: TimeWindow) -> Self {
        self.loop_window = window;
        self
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The unadjusted wall-clock time.
    pub fn real_now(&self) -> DateTime<Utc> {
        from_ms(self.source.now_ms())
    }

    pub fn real_now_in_zone(&self) -> DateTime<Tz> {
        self.real_now().with_timezone(&self.timezone)
    }

    pub fn jump_offset(&self) -> Duration {
        duration_from_ms(self.jump_offset_ms)
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    /// Virtual time gained (or lost) under earlier speed multipliers, in milliseconds.
    pub fn speed_accumulated_offset_ms(&self) -> f64 {
        self.speed_offset_ms
    }

    pub fn speed_accumulated_offset(&self) -> Duration {
        duration_from_ms(self.speed_offset_ms.round() as i64)
    }

    pub fn loop_state(&self) -> Option<LoopState> {
        self.time_loop
    }

    /// Whether any jump, speed or loop adjustment is in effect.
    pub fn is_adjusted(&self) -> bool {
        self.jump_offset_ms != 0
            || self.speed_multiplier != 1.0
            || self.speed_offset_ms != 0.0
            || self.time_loop.is_some()
    }

    /// Moves virtual time by `delta_minutes`. Persists until the next jump.
    ///
    /// A jump that would push the total offset past [`MAX_OFFSET_MS`] is
    /// rejected and leaves the clock unchanged.
    pub fn jump(&mut self, delta_minutes: i64) -> Result<(), DaybellError> {
        let offset = delta_minutes
            .checked_mul(60_000)
            .and_then(|delta| self.jump_offset_ms.checked_add(delta))
            .filter(|offset| offset.abs() <= MAX_OFFSET_MS)
            .ok_or(DaybellError::JumpOutOfRange(delta_minutes))?;
        self.jump_offset_ms = offset;
        debug!("Jumped {} minutes, offset now {}ms", delta_minutes, self.jump_offset_ms);
        Ok(())
    }

    /// Changes the speed multiplier. Negative values run time backwards.
    ///
    /// Any multiplier other than 1 turns an active time loop off.
    pub fn set_speed(&mut self, multiplier: f64) -> Result<(), DaybellError> {
        if !multiplier.is_finite() {
            return Err(DaybellError::InvalidSpeed(multiplier));
        }
        self.fold_speed_offset();
        if multiplier != 1.0 && self.time_loop.take().is_some() {
            info!("Speed set to {}x, time loop disabled", multiplier);
        }
        self.speed_multiplier = multiplier;
        debug!(
            "Speed multiplier {}x, accumulated offset {}ms",
            multiplier, self.speed_offset_ms
        );
        Ok(())
    }

    /// Turns the time loop on or off.
    ///
    /// Enabling captures the loop start and resets the speed multiplier to 1.
    /// Enabling an already running loop only updates its duration.
    pub fn set_loop(&mut self, enabled: bool, duration_secs: f64) -> Result<(), DaybellError> {
        if enabled && !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(DaybellError::InvalidLoopDuration(duration_secs));
        }
        self.apply_loop(enabled, duration_secs);
        Ok(())
    }

    fn apply_loop(&mut self, enabled: bool, duration_secs: f64) {
        if !enabled {
            if self.time_loop.take().is_some() {
                info!("Time loop disabled");
            }
            return;
        }
        if let Some(state) = self.time_loop.as_mut() {
            state.duration_secs = duration_secs;
            return;
        }
        self.fold_speed_offset();
        self.speed_multiplier = 1.0;
        let started_at_ms = self.source.now_ms();
        self.time_loop = Some(LoopState {
            duration_secs,
            started_at_ms,
        });
        info!(
            "Time loop enabled: {}s through {}-{}",
            duration_secs, self.loop_window.start, self.loop_window.end
        );
    }

    /// Applies the developer section of the user settings.
    ///
    /// With developer mode off the clock goes back to real time. Non-positive
    /// loop durations are clamped to [`MIN_LOOP_DURATION_SECS`].
    pub fn apply_dev_settings(&mut self, dev: &DevSettings) {
        if !dev.enabled {
            if self.is_adjusted() {
                info!("Developer time controls disabled, clock back to real time");
            }
            self.reset();
            return;
        }
        let mut duration = dev.time_loop.duration;
        if !duration.is_finite() || duration <= 0.0 {
            warn!(
                "Time loop duration {}s is not positive, using {}s",
                duration, MIN_LOOP_DURATION_SECS
            );
            duration = MIN_LOOP_DURATION_SECS;
        }
        self.apply_loop(dev.time_loop.enabled, duration);
    }

    /// Drops every adjustment and returns to real time.
    pub fn reset(&mut self) {
        self.jump_offset_ms = 0;
        self.speed_multiplier = 1.0;
        self.speed_offset_ms = 0.0;
        self.last_speed_update_ms = self.source.now_ms();
        self.time_loop = None;
    }

    /// The current virtual instant.
    pub fn now(&mut self) -> DateTime<Utc> {
        match self.time_loop {
            Some(state) => self.loop_instant(state),
            None => {
                self.fold_speed_offset();
                from_ms(self.offset_now_ms().round() as i64)
            }
        }
    }

    pub fn now_in_zone(&mut self) -> DateTime<Tz> {
        self.now().with_timezone(&self.timezone)
    }

    fn offset_now_ms(&self) -> f64 {
        self.source.now_ms() as f64 + self.jump_offset_ms as f64 + self.speed_offset_ms
    }

    fn fold_speed_offset(&mut self) {
        let now = self.source.now_ms();
        let real_elapsed = now - self.last_speed_update_ms;
        if real_elapsed > 0 {
            let limit = MAX_OFFSET_MS as f64;
            let offset = self.speed_offset_ms + real_elapsed as f64 * (self.speed_multiplier - 1.0);
            if offset.abs() > limit {
                warn!("Speed offset {}ms out of range, clamping to {}ms", offset, limit);
            }
            self.speed_offset_ms = offset.clamp(-limit, limit);
        }
        self.last_speed_update_ms = now;
    }

    fn loop_instant(&self, state: LoopState) -> DateTime<Utc> {
        let duration_ms = state.duration_secs * 1000.0;
        let elapsed_ms = (self.offset_now_ms() - state.started_at_ms as f64).rem_euclid(duration_ms);
        let progress = elapsed_ms / duration_ms;

        let window_start_ms = self.loop_window.start.as_f64() * 60_000.0;
        let window_ms = f64::from(self.loop_window.duration_minutes()) * 60_000.0;
        let ms_into_day = (window_start_ms + progress * window_ms).round() as i64;

        let today = self.real_now_in_zone().date_naive();
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            (ms_into_day / 1000) as u32,
            ((ms_into_day % 1000) * 1_000_000) as u32,
        );
        let Some(time) = time else {
            return self.real_now();
        };
        let local = today.and_time(time);
        self.timezone
            .from_local_datetime(&local)
            .earliest()
            .unwrap_or_else(|| self.timezone.from_utc_datetime(&local))
            .with_timezone(&Utc)
    }
}

/// Saturates towards the side the timestamp overflowed on.
fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(if ms < 0 {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

fn duration_from_ms(ms: i64) -> Duration {
    Duration::try_milliseconds(ms).unwrap_or(if ms < 0 { Duration::MIN } else { Duration::MAX })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeLoopSettings;
    use crate::time::ManualTimeSource;
    use chrono::Timelike;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 10, 7, 0, 0).unwrap()
    }

    fn fixture() -> (ManualTimeSource, VirtualClock) {
        let source = ManualTimeSource::new(start());
        let clock = VirtualClock::new(Arc::new(source.clone()), Tz::UTC);
        (source, clock)
    }

    fn hms(at: DateTime<Utc>) -> (u32, u32, u32) {
        (at.hour(), at.minute(), at.second())
    }

    #[test]
    fn unadjusted_clock_follows_real_time() {
        let (source, mut clock) = fixture();
        assert_eq!(clock.now(), start());
        source.advance(Duration::seconds(42));
        assert_eq!(clock.now(), start() + Duration::seconds(42));
        assert!(!clock.is_adjusted());
    }

    #[test]
    fn jumps_accumulate() {
        let (_source, mut clock) = fixture();
        clock.jump(90).unwrap();
        clock.jump(-30).unwrap();
        assert_eq!(clock.jump_offset(), Duration::minutes(60));
        assert_eq!(clock.now(), start() + Duration::minutes(60));
    }

    #[test]
    fn speed_change_folds_exactly_the_extra_time() {
        let (source, mut clock) = fixture();
        clock.set_speed(2.0).unwrap();
        source.advance(Duration::milliseconds(1000));
        clock.set_speed(1.0).unwrap();
        assert_eq!(clock.speed_accumulated_offset_ms(), 1000.0);

        source.advance(Duration::seconds(5));
        assert_eq!(clock.now(), start() + Duration::milliseconds(7000));
        assert_eq!(clock.speed_accumulated_offset_ms(), 1000.0);
    }

    #[test]
    fn speed_applies_between_reads() {
        let (source, mut clock) = fixture();
        clock.set_speed(3.0).unwrap();
        source.advance(Duration::seconds(10));
        assert_eq!(clock.now(), start() + Duration::seconds(30));
    }

    #[test]
    fn negative_speed_runs_backwards() {
        let (source, mut clock) = fixture();
        clock.set_speed(-1.0).unwrap();
        source.advance(Duration::seconds(10));
        assert_eq!(clock.now(), start() - Duration::seconds(10));
    }

    #[test]
    fn speed_change_does_not_move_virtual_time() {
        let (source, mut clock) = fixture();
        clock.set_speed(5.0).unwrap();
        source.advance(Duration::seconds(3));
        let before = clock.now();
        clock.set_speed(0.5).unwrap();
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn rejects_non_finite_speed() {
        let (_source, mut clock) = fixture();
        assert!(matches!(clock.set_speed(f64::NAN), Err(DaybellError::InvalidSpeed(_))));
        assert_eq!(clock.speed_multiplier(), 1.0);
    }

    #[test]
    fn loop_maps_halfway_to_the_window_midpoint() {
        let (source, mut clock) = fixture();
        clock.set_loop(true, 60.0).unwrap();
        assert_eq!(clock.loop_state().unwrap().started_at(), start());
        assert_eq!(hms(clock.now()), (8, 15, 0));

        source.advance(Duration::seconds(30));
        assert_eq!(hms(clock.now()), (12, 7, 30));

        source.advance(Duration::seconds(30));
        assert_eq!(hms(clock.now()), (8, 15, 0));
        assert_eq!(clock.now().date_naive(), start().date_naive());
    }

    #[test]
    fn loop_handles_offsets_before_the_start() {
        let (_source, mut clock) = fixture();
        clock.set_loop(true, 90.0).unwrap();
        clock.jump(-1).unwrap();
        // -60s wraps to 30s into a 90s loop, a third of the way through.
        assert_eq!(hms(clock.now()), (10, 50, 0));
    }

    #[test]
    fn loop_and_speed_are_mutually_exclusive() {
        let (source, mut clock) = fixture();
        clock.set_speed(4.0).unwrap();
        source.advance(Duration::seconds(1));
        clock.set_loop(true, 60.0).unwrap();
        assert_eq!(clock.speed_multiplier(), 1.0);
        assert_eq!(clock.speed_accumulated_offset_ms(), 3000.0);

        clock.set_speed(2.0).unwrap();
        assert!(clock.loop_state().is_none());
        assert_eq!(clock.speed_multiplier(), 2.0);
    }

    #[test]
    fn setting_speed_to_one_keeps_the_loop() {
        let (_source, mut clock) = fixture();
        clock.set_loop(true, 60.0).unwrap();
        clock.set_speed(1.0).unwrap();
        assert!(clock.loop_state().is_some());
    }

    #[test]
    fn rejects_non_positive_loop_durations() {
        let (_source, mut clock) = fixture();
        assert!(matches!(clock.set_loop(true, 0.0), Err(DaybellError::InvalidLoopDuration(_))));
        assert!(clock.set_loop(true, -5.0).is_err());
        assert!(clock.loop_state().is_none());
        clock.set_loop(false, 0.0).unwrap();
    }

    #[test]
    fn re_enabling_a_loop_captures_a_new_start() {
        let (source, mut clock) = fixture();
        clock.set_loop(true, 60.0).unwrap();
        source.advance(Duration::seconds(10));
        clock.set_loop(true, 120.0).unwrap();
        assert_eq!(clock.loop_state().unwrap().started_at(), start());
        assert_eq!(clock.loop_state().unwrap().duration_secs, 120.0);

        clock.set_loop(false, 120.0).unwrap();
        assert!(clock.loop_state().is_none());
        clock.set_loop(true, 120.0).unwrap();
        assert_eq!(
            clock.loop_state().unwrap().started_at(),
            start() + Duration::seconds(10)
        );
    }

    #[test]
    fn dev_settings_clamp_loop_duration() {
        let (_source, mut clock) = fixture();
        clock.apply_dev_settings(&DevSettings {
            enabled: true,
            time_loop: TimeLoopSettings {
                enabled: true,
                duration: 0.0,
            },
        });
        assert_eq!(clock.loop_state().unwrap().duration_secs, MIN_LOOP_DURATION_SECS);
    }

    #[test]
    fn out_of_range_jumps_are_rejected() {
        let (_source, mut clock) = fixture();
        clock.jump(30).unwrap();
        assert!(matches!(
            clock.jump(-153_722_867_280_913),
            Err(DaybellError::JumpOutOfRange(_))
        ));
        assert!(clock.jump(153_722_867_280_912).is_err());
        assert!(clock.jump(i64::MIN).is_err());
        assert_eq!(clock.jump_offset(), Duration::minutes(30));
        assert_eq!(clock.now(), start() + Duration::minutes(30));

        // Stacking jumps cannot creep past the bound either.
        let step = MAX_OFFSET_MS / 60_000;
        clock.jump(step - 30).unwrap();
        assert!(clock.jump(1).is_err());
        assert!(clock.now() > start());
        clock.jump(-2 * step).unwrap();
        assert!(clock.now() < start());
        assert_eq!(clock.jump_offset(), Duration::milliseconds(-step * 60_000));
    }

    #[test]
    fn huge_speeds_never_turn_time_around() {
        let (source, mut clock) = fixture();
        clock.set_speed(1e300).unwrap();
        source.advance(Duration::seconds(1));
        let forward = clock.now();
        assert!(forward > start());
        assert_eq!(clock.speed_accumulated_offset_ms(), MAX_OFFSET_MS as f64);
        assert_eq!(clock.speed_accumulated_offset(), Duration::milliseconds(MAX_OFFSET_MS));

        clock.set_speed(-1e300).unwrap();
        source.advance(Duration::seconds(1));
        assert!(clock.now() < start());
        assert_eq!(clock.speed_accumulated_offset_ms(), -(MAX_OFFSET_MS as f64));
    }

    #[test]
    fn out_of_range_timestamps_saturate_in_their_own_direction() {
        assert_eq!(from_ms(i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(from_ms(i64::MIN), DateTime::<Utc>::MIN_UTC);
        assert_eq!(duration_from_ms(i64::MIN), Duration::MIN);
        assert_eq!(duration_from_ms(i64::MAX), Duration::MAX);
    }

    #[test]
    fn disabling_dev_mode_resets_the_clock() {
        let (source, mut clock) = fixture();
        clock.jump(15).unwrap();
        clock.set_speed(2.0).unwrap();
        source.advance(Duration::seconds(1));
        clock.apply_dev_settings(&DevSettings::default());
        assert!(!clock.is_adjusted());
        assert_eq!(clock.now(), start() + Duration::seconds(1));
    }
}
