//! The core engine that orchestrates the entire Daybell system.

use crate::common::{LessonId, ListenerId};
use crate::components::watcher::{BellWatcher, ConditionalWatcher};
use crate::config::{DaybellConfig, Settings};
use crate::error::DaybellError;
use crate::events::{BellEvent, Command, ConditionalEvent, ProgressEvent, SystemEvent};
use crate::progress::{self, Progress};
use crate::schedule::{Lesson, ScheduleStore};
use crate::segment::Schedule;
use crate::time::{SystemTicker, SystemTimeSource, TickEvent, TimeSource, VirtualClock};
use slotmap::SlotMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

/// The main Daybell engine.
///
/// This struct is the central point of control. It owns the lesson store, the
/// derived schedule and the virtual clock, and drives the evaluation loop. The
/// engine is designed to be cloned and shared across tasks, providing a handle
/// to the running instance.
///
/// Readers always see a complete schedule: a recompute builds the new phase and
/// segment lists off to the side and swaps them in as one value.
#[derive(Clone)]
pub struct DaybellEngine {
    config: Arc<DaybellConfig>,
    clock: Arc<Mutex<VirtualClock>>,
    store: Arc<RwLock<ScheduleStore>>,
    schedule: Arc<RwLock<Arc<Schedule>>>,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
    progress_sender: broadcast::Sender<ProgressEvent>,
    system_event_sender: broadcast::Sender<SystemEvent>,
    bell_event_sender: broadcast::Sender<BellEvent>,
    conditional_event_sender: broadcast::Sender<ConditionalEvent>,
    bell_watcher: Arc<Mutex<BellWatcher>>,
    conditional_watchers: Arc<RwLock<SlotMap<ListenerId, ConditionalWatcher>>>,
}

// Core implementation block for internal logic.
impl DaybellEngine {
    /// Creates a new `DaybellEngine` reading the system clock.
    pub fn new(config: DaybellConfig) -> Result<Self, DaybellError> {
        Self::with_time_source(config, Arc::new(SystemTimeSource))
    }

    /// Creates a new `DaybellEngine` reading time from `source`.
    ///
    /// The configured settings are applied before the first schedule is built.
    pub fn with_time_source(
        config: DaybellConfig,
        source: Arc<dyn TimeSource>,
    ) -> Result<Self, DaybellError> {
        config.validate()?;

        const CHANNEL_CAPACITY: usize = 256;
        let (tick_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (progress_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (system_event_sender, _) = broadcast::channel(64);
        let (bell_event_sender, _) = broadcast::channel(64);
        let (conditional_event_sender, _) = broadcast::channel(64);

        let mut store = ScheduleStore::new(config.lessons.clone())?;
        store.set_exclusions(config.settings.deleted_lessons.iter().copied());

        let mut clock =
            VirtualClock::new(source, config.timezone).with_loop_window(config.loop_window);
        clock.apply_dev_settings(&config.settings.dev);

        let schedule = Schedule::build(&store.active_lessons(), config.gap_threshold_minutes);
        info!(
            "Built schedule: {} lessons, {} phases, {} segments",
            store.lessons().len(),
            schedule.phases().len(),
            schedule.segments().len()
        );

        Ok(Self {
            config: Arc::new(config),
            clock: Arc::new(Mutex::new(clock)),
            store: Arc::new(RwLock::new(store)),
            schedule: Arc::new(RwLock::new(Arc::new(schedule))),
            tick_sender,
            progress_sender,
            system_event_sender,
            bell_event_sender,
            conditional_event_sender,
            bell_watcher: Arc::new(Mutex::new(BellWatcher::new())),
            conditional_watchers: Arc::new(RwLock::new(SlotMap::with_key())),
        })
    }

    /// Runs the engine's main loop until Ctrl+C is received.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Engine running at {:?}. Press Ctrl+C to shut down.",
            self.config.resolution
        );
        self.run_until(tokio::signal::ctrl_c()).await
    }

    /// Runs the engine's main loop until `shutdown` resolves.
    ///
    /// This method will:
    /// 1. Spawn the `SystemTicker` task.
    /// 2. Spawn the dispatcher task that evaluates progress on every tick.
    /// 3. Wait for `shutdown` to initiate a graceful shutdown.
    pub async fn run_until<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        info!("DaybellEngine starting up...");
        let (shutdown_tx, _) = broadcast::channel(1);

        let ticker = SystemTicker::new(self.config.resolution.clone(), self.tick_sender.clone());
        let ticker_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { ticker.run(ticker_shutdown_rx).await });

        let dispatcher = self.clone();
        let dispatcher_shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move { dispatcher.dispatcher_loop(dispatcher_shutdown_rx).await });

        shutdown.await?;

        info!("Shutdown signal received. Broadcasting to all tasks...");
        if shutdown_tx.send(()).is_err() {
            error!("Failed to send shutdown signal. Some tasks may not terminate gracefully.");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.system_event_sender
            .send(SystemEvent::EngineShutdown)
            .ok();
        info!("DaybellEngine has shut down.");
        Ok(())
    }

    #[doc(hidden)]
    async fn dispatcher_loop(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut tick_rx = self.tick_sender.subscribe();
        self.system_event_sender
            .send(SystemEvent::EngineStarted {
                timestamp: tokio::time::Instant::now(),
            })
            .ok();
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                received = tick_rx.recv() => match received {
                    Ok(tick) => {
                        trace!("Tick #{} received.", tick.tick_count);
                        self.process_tick(Some(tick.tick_count)).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Dispatcher lagged behind by {} ticks", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    #[doc(hidden)]
    async fn evaluate(&self, tick: Option<u64>) -> ProgressEvent {
        let (now, calendar_now) = {
            let mut clock = self.clock.lock().await;
            (clock.now_in_zone(), clock.real_now_in_zone())
        };
        let schedule = Arc::clone(&*self.schedule.read().await);
        let progress = progress::evaluate(&schedule, &now, &calendar_now, &self.config.calendar);
        ProgressEvent {
            tick,
            now,
            progress: Arc::new(progress),
        }
    }

    #[doc(hidden)]
    async fn process_tick(&self, tick: Option<u64>) -> ProgressEvent {
        let event = self.evaluate(tick).await;

        let bells = self.bell_watcher.lock().await.process(&event.progress);
        for bell in bells {
            debug!("Bell: {:?}", bell);
            self.bell_event_sender.send(bell).ok();
        }
        self.process_conditional_watchers(&event).await;

        self.progress_sender.send(event.clone()).ok();
        event
    }

    #[doc(hidden)]
    async fn process_conditional_watchers(&self, event: &ProgressEvent) {
        let mut conditional_watchers = self.conditional_watchers.write().await;
        let mut fired_one_shots = Vec::new();
        for (id, watcher) in conditional_watchers.iter_mut() {
            if watcher.check_and_fire(&event.progress) {
                self.conditional_event_sender
                    .send(ConditionalEvent {
                        condition_id: id,
                        now: event.now,
                    })
                    .ok();
                if watcher.is_one_shot {
                    fired_one_shots.push(id);
                }
            }
        }
        for id in fired_one_shots {
            if conditional_watchers.remove(id).is_some() {
                self.system_event_sender
                    .send(SystemEvent::ListenerRemoved { id })
                    .ok();
            }
        }
    }

    /// Rebuilds phases and segments from `store`.
    ///
    /// Callers hold the store lock, so concurrent mutations publish in order.
    #[doc(hidden)]
    async fn publish_schedule(&self, store: &ScheduleStore) {
        let schedule = Schedule::build(&store.active_lessons(), self.config.gap_threshold_minutes);
        let (phases, segments) = (schedule.phases().len(), schedule.segments().len());
        *self.schedule.write().await = Arc::new(schedule);
        debug!("Schedule recomputed: {} phases, {} segments", phases, segments);
        self.system_event_sender
            .send(SystemEvent::ScheduleRecomputed { phases, segments })
            .ok();
    }

    #[doc(hidden)]
    fn clock_adjusted(&self) {
        self.system_event_sender
            .send(SystemEvent::ClockAdjusted)
            .ok();
    }
}

// Public API implementation block.
impl DaybellEngine {
    /// Applies a command and re-derives whatever it affects.
    ///
    /// A rejected command leaves the engine unchanged.
    pub async fn dispatch(&self, command: Command) -> Result<(), DaybellError> {
        debug!("Dispatching {:?}", command);
        match command {
            Command::ToggleLesson(id) => {
                let mut store = self.store.write().await;
                if store.toggle(id) {
                    info!(
                        "Lesson {} is now {}",
                        id,
                        if store.is_excluded(id) { "excluded" } else { "included" }
                    );
                    self.publish_schedule(&store).await;
                }
            }
            Command::JumpTime { minutes } => {
                self.clock.lock().await.jump(minutes)?;
                self.clock_adjusted();
            }
            Command::SetSpeed(multiplier) => {
                self.clock.lock().await.set_speed(multiplier)?;
                self.clock_adjusted();
            }
            Command::SetLoop {
                enabled,
                duration_secs,
            } => {
                self.clock.lock().await.set_loop(enabled, duration_secs)?;
                self.clock_adjusted();
            }
            Command::ResetClock => {
                self.clock.lock().await.reset();
                self.clock_adjusted();
            }
            Command::ConfigurationChanged(settings) => {
                let mut store = self.store.write().await;
                store.set_exclusions(settings.deleted_lessons.iter().copied());
                self.clock.lock().await.apply_dev_settings(&settings.dev);
                self.publish_schedule(&store).await;
                self.clock_adjusted();
            }
        }
        Ok(())
    }

    /// Includes an excluded lesson or excludes an included one.
    pub async fn toggle_lesson(&self, id: LessonId) -> Result<(), DaybellError> {
        self.dispatch(Command::ToggleLesson(id)).await
    }

    /// Moves the clock by `minutes`, which may be negative.
    pub async fn jump_time(&self, minutes: i64) -> Result<(), DaybellError> {
        self.dispatch(Command::JumpTime { minutes }).await
    }

    /// Sets the speed multiplier. Any value other than 1 stops the loop.
    pub async fn set_speed(&self, multiplier: f64) -> Result<(), DaybellError> {
        self.dispatch(Command::SetSpeed(multiplier)).await
    }

    /// Enables or disables the time loop. Enabling it resets the speed to 1.
    pub async fn set_loop(&self, enabled: bool, duration_secs: f64) -> Result<(), DaybellError> {
        self.dispatch(Command::SetLoop {
            enabled,
            duration_secs,
        })
        .await
    }

    /// Drops every clock adjustment.
    pub async fn reset_clock(&self) -> Result<(), DaybellError> {
        self.dispatch(Command::ResetClock).await
    }

    /// Reapplies exclusions and developer settings from `settings`.
    pub async fn apply_settings(&self, settings: Settings) -> Result<(), DaybellError> {
        self.dispatch(Command::ConfigurationChanged(settings)).await
    }

    /// Evaluates now and rings bells and conditions as a tick would.
    pub async fn step(&self) -> ProgressEvent {
        self.process_tick(None).await
    }

    /// Evaluates now without touching any watcher.
    pub async fn snapshot(&self) -> ProgressEvent {
        self.evaluate(None).await
    }

    /// The schedule currently published to readers.
    pub async fn schedule(&self) -> Arc<Schedule> {
        Arc::clone(&*self.schedule.read().await)
    }

    /// Every configured lesson with whether it is excluded.
    pub async fn lessons(&self) -> Vec<(Lesson, bool)> {
        let store = self.store.read().await;
        store
            .lessons()
            .iter()
            .map(|lesson| (*lesson, store.is_excluded(lesson.id)))
            .collect()
    }

    /// The excluded lesson ids, ascending.
    pub async fn excluded(&self) -> Vec<LessonId> {
        self.store.read().await.excluded().iter().copied().collect()
    }

    /// A copy of the clock state, for display.
    pub async fn clock(&self) -> VirtualClock {
        self.clock.lock().await.clone()
    }

    /// The configuration the engine was built from.
    pub fn config(&self) -> &DaybellConfig {
        &self.config
    }

    /// Registers a task to be executed whenever a given condition is met.
    ///
    /// The `condition` closure is checked against every evaluation the engine
    /// publishes. If it returns `true`, the `task_logic` closure is executed.
    ///
    /// # Arguments
    /// * `condition` - A closure that returns `true` when the task should fire.
    /// * `task_logic` - A closure to execute when the condition is met.
    /// * `is_one_shot` - If true, the watcher will be automatically removed after firing once.
    ///
    /// # Returns
    /// A `ListenerId` which can be used to later remove this watcher.
    pub async fn on_conditional(
        &self,
        condition: impl Fn(&Progress) -> bool + Send + Sync + 'static,
        task_logic: impl FnMut(&Progress) + Send + Sync + 'static,
        is_one_shot: bool,
    ) -> ListenerId {
        let watcher =
            ConditionalWatcher::new(Box::new(condition), Box::new(task_logic), is_one_shot);
        let mut watchers = self.conditional_watchers.write().await;
        let id = watchers.insert(watcher);
        self.system_event_sender
            .send(SystemEvent::ListenerAdded { id })
            .ok();
        id
    }

    /// Removes a conditional listener from the engine.
    ///
    /// Returns `true` if the listener was found and removed.
    pub async fn remove_conditional_listener(&self, id: ListenerId) -> bool {
        let was_removed = self.conditional_watchers.write().await.remove(id).is_some();
        if was_removed {
            self.system_event_sender
                .send(SystemEvent::ListenerRemoved { id })
                .ok();
        } else {
            warn!("No conditional listener {:?} to remove", id);
        }
        was_removed
    }

    /// Subscribes to the `TickEvent` stream.
    pub fn subscribe_tick_events(&self) -> broadcast::Receiver<Arc<TickEvent>> {
        self.tick_sender.subscribe()
    }

    /// Subscribes to the `ProgressEvent` stream.
    pub fn subscribe_progress_events(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress_sender.subscribe()
    }

    /// Subscribes to the `SystemEvent` stream.
    pub fn subscribe_system_events(&self) -> broadcast::Receiver<SystemEvent> {
        self.system_event_sender.subscribe()
    }

    /// Subscribes to the `BellEvent` stream.
    pub fn subscribe_bell_events(&self) -> broadcast::Receiver<BellEvent> {
        self.bell_event_sender.subscribe()
    }

    /// Subscribes to the `ConditionalEvent` stream.
    pub fn subscribe_conditional_events(&self) -> broadcast::Receiver<ConditionalEvent> {
        self.conditional_event_sender.subscribe()
    }
}
