use crate::config::ClockResolution;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};

/// A single beat of the update loop.
#[derive(Debug, Clone)]
pub struct TickEvent {
    pub tick_count: u64,
    pub timestamp: Instant,
}

/// The periodic task that drives re-evaluation.
///
/// It only signals that it is time to look at the clock again; it never
/// decides what time it is.
pub struct SystemTicker {
    resolution: ClockResolution,
    tick_sender: broadcast::Sender<Arc<TickEvent>>,
}

impl SystemTicker {
    pub fn new(resolution: ClockResolution, tick_sender: broadcast::Sender<Arc<TickEvent>>) -> Self {
        Self {
            resolution,
            tick_sender,
        }
    }

    /// Ticks at the configured resolution until a shutdown signal arrives.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = time::interval(self.resolution.period());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick_count: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                timestamp = interval.tick() => {
                    tick_count += 1;
                    trace!("Tick #{}", tick_count);
                    self.tick_sender
                        .send(Arc::new(TickEvent { tick_count, timestamp }))
                        .ok();
                }
            }
        }
        debug!("SystemTicker stopped after {} ticks", tick_count);
    }
}
