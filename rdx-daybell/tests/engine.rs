use chrono::{Duration, TimeZone, Timelike, Utc};
use daybell::config::{DevSettings, TimeLoopSettings};
use daybell::prelude::*;
use daybell::time::ManualTimeSource;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn engine_at(hour: u32, minute: u32) -> (DaybellEngine, ManualTimeSource) {
    // Wednesday, inside the first term.
    let source = ManualTimeSource::new(Utc.with_ymd_and_hms(2025, 9, 10, hour, minute, 0).unwrap());
    let engine =
        DaybellEngine::with_time_source(DaybellConfig::default(), Arc::new(source.clone())).unwrap();
    (engine, source)
}

#[tokio::test]
async fn toggling_a_lesson_recomputes_the_day() {
    let (engine, _source) = engine_at(10, 0);
    let mut system_rx = engine.subscribe_system_events();
    assert_eq!(engine.snapshot().await.progress.day.total, 380.0);

    engine.toggle_lesson(LessonId(4)).await.unwrap();
    assert_eq!(engine.excluded().await, vec![LessonId(4)]);
    assert_eq!(engine.snapshot().await.progress.day.total, 330.0);
    assert!(matches!(
        system_rx.try_recv(),
        Ok(SystemEvent::ScheduleRecomputed { phases: 4, segments: 10 })
    ));

    engine.toggle_lesson(LessonId(4)).await.unwrap();
    assert!(engine.excluded().await.is_empty());
    assert_eq!(engine.snapshot().await.progress.day.total, 380.0);
}

#[tokio::test]
async fn toggling_an_unknown_lesson_changes_nothing() {
    let (engine, _source) = engine_at(10, 0);
    let mut system_rx = engine.subscribe_system_events();
    engine.toggle_lesson(LessonId(99)).await.unwrap();
    assert!(engine.excluded().await.is_empty());
    assert!(system_rx.try_recv().is_err());
}

#[tokio::test]
async fn crossing_a_lesson_end_rings_bells() {
    let (engine, source) = engine_at(8, 59);
    let mut bell_rx = engine.subscribe_bell_events();

    engine.step().await;
    assert!(bell_rx.try_recv().is_err());

    source.advance(Duration::minutes(1));
    let event = engine.step().await;
    assert_eq!(event.progress.current_segment.map(|s| s.kind), Some(SegmentKind::Break));
    assert!(matches!(bell_rx.try_recv(), Ok(BellEvent::SegmentEnded(s)) if s.lesson == Some(LessonId(1))));
    assert!(matches!(bell_rx.try_recv(), Ok(BellEvent::SegmentStarted(s)) if s.kind == SegmentKind::Break));
    assert!(bell_rx.try_recv().is_err());
}

#[tokio::test]
async fn one_shot_conditions_fire_once_and_are_removed() {
    let (engine, _source) = engine_at(10, 0);
    let fired = Arc::new(AtomicU32::new(0));
    let counter = fired.clone();
    let id = engine
        .on_conditional(
            |progress| progress.day.percent() >= 50.0,
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            true,
        )
        .await;
    let mut conditional_rx = engine.subscribe_conditional_events();

    engine.step().await;
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    engine.jump_time(180).await.unwrap();
    engine.step().await;
    engine.step().await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(conditional_rx.try_recv().map(|event| event.condition_id).ok(), Some(id));
    assert!(!engine.remove_conditional_listener(id).await);
}

#[tokio::test]
async fn repeating_conditions_can_be_removed() {
    let (engine, _source) = engine_at(13, 0);
    let fired = Arc::new(AtomicU32::new(0));
    let counter = fired.clone();
    let id = engine
        .on_conditional(
            |progress| progress.current_segment.is_some(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            false,
        )
        .await;

    engine.step().await;
    engine.step().await;
    assert!(engine.remove_conditional_listener(id).await);
    engine.step().await;
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn jumps_move_the_day_but_not_the_calendar() {
    let (engine, _source) = engine_at(10, 0);
    let before = engine.snapshot().await;

    engine.jump_time(-60).await.unwrap();
    let after = engine.snapshot().await;
    assert_eq!(after.now.hour(), 9);
    assert!(after.progress.day.elapsed < before.progress.day.elapsed);
    assert_eq!(after.progress.term, before.progress.term);
    assert_eq!(after.progress.year, before.progress.year);

    engine.reset_clock().await.unwrap();
    assert_eq!(engine.snapshot().await.now.hour(), 10);
    assert!(!engine.clock().await.is_adjusted());
}

#[tokio::test]
async fn speed_runs_the_day_faster() {
    let (engine, source) = engine_at(10, 0);
    engine.set_speed(60.0).await.unwrap();
    source.advance(Duration::minutes(1));
    let event = engine.snapshot().await;
    assert_eq!((event.now.hour(), event.now.minute()), (11, 0));

    assert!(matches!(
        engine.set_speed(f64::NAN).await,
        Err(DaybellError::InvalidSpeed(_))
    ));
    assert_eq!(engine.clock().await.speed_multiplier(), 60.0);
}

#[tokio::test]
async fn loop_rejects_bad_durations_and_replaces_speed() {
    let (engine, _source) = engine_at(10, 0);
    assert!(matches!(
        engine.set_loop(true, 0.0).await,
        Err(DaybellError::InvalidLoopDuration(_))
    ));
    assert!(engine.clock().await.loop_state().is_none());

    engine.set_speed(5.0).await.unwrap();
    engine.set_loop(true, 60.0).await.unwrap();
    let clock = engine.clock().await;
    assert_eq!(clock.speed_multiplier(), 1.0);
    assert_eq!(clock.loop_state().map(|state| state.duration_secs), Some(60.0));

    // The loop starts at the window start.
    let event = engine.snapshot().await;
    assert_eq!((event.now.hour(), event.now.minute()), (8, 15));
}

#[tokio::test]
async fn configuration_changes_apply_exclusions_and_dev_settings() {
    let (engine, _source) = engine_at(10, 0);
    let settings = Settings {
        deleted_lessons: vec![LessonId(1), LessonId(2), LessonId(42)],
        dev: DevSettings {
            enabled: true,
            time_loop: TimeLoopSettings {
                enabled: true,
                duration: -5.0,
            },
        },
    };
    engine.apply_settings(settings).await.unwrap();

    assert_eq!(engine.excluded().await, vec![LessonId(1), LessonId(2)]);
    assert_eq!(engine.schedule().await.total_minutes(), 285);
    let loop_state = engine.clock().await.loop_state();
    assert_eq!(loop_state.map(|state| state.duration_secs), Some(1.0));

    engine.apply_settings(Settings::default()).await.unwrap();
    assert!(engine.excluded().await.is_empty());
    assert!(engine.clock().await.loop_state().is_none());
    assert_eq!(engine.schedule().await.total_minutes(), 380);
}

#[tokio::test]
async fn stored_settings_apply_at_startup() {
    let source = ManualTimeSource::new(Utc.with_ymd_and_hms(2025, 9, 10, 10, 0, 0).unwrap());
    let mut config = DaybellConfig::default();
    config.settings.deleted_lessons = vec![LessonId(8)];
    let engine = DaybellEngine::with_time_source(config, Arc::new(source)).unwrap();

    let lessons = engine.lessons().await;
    assert_eq!(lessons.len(), 8);
    assert!(lessons.iter().any(|(lesson, excluded)| lesson.id == LessonId(8) && *excluded));
    assert_eq!(engine.schedule().await.total_minutes(), 330);
}

#[tokio::test]
async fn run_until_publishes_lifecycle_events() {
    let (engine, _source) = engine_at(10, 0);
    let mut system_rx = engine.subscribe_system_events();

    engine
        .run_until(async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok::<(), std::io::Error>(())
        })
        .await
        .unwrap();

    assert!(matches!(system_rx.try_recv(), Ok(SystemEvent::EngineStarted { .. })));
    let mut last = None;
    while let Ok(event) = system_rx.try_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(SystemEvent::EngineShutdown)));
}
