use anyhow::Result;
use colored::Colorize;
use daybell::prelude::*;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration from an optional file path.
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = DaybellConfig::load(path.as_deref())?;
    info!(
        "{} v{} starting in {}",
        daybell::ENGINE_NAME,
        daybell::VERSION,
        config.timezone
    );

    // 3. Create the DaybellEngine instance.
    let engine = DaybellEngine::new(config)?;

    // 4. Spawn concurrent tasks to listen to different event streams.
    spawn_event_listeners(&engine);

    // 5. Register a watcher to exercise the conditional path.
    register_demo_components(&engine).await;

    // 6. Run the engine.
    engine.run().await?;

    Ok(())
}

/// Spawns several tasks, each subscribing to a different event stream from the engine.
fn spawn_event_listeners(engine: &DaybellEngine) {
    let mut system_rx = engine.subscribe_system_events();
    tokio::spawn(async move {
        while let Ok(event) = system_rx.recv().await {
            info!("[SYSTEM] => {:?}", event);
        }
    });

    let mut bell_rx = engine.subscribe_bell_events();
    tokio::spawn(async move {
        while let Ok(bell) = bell_rx.recv().await {
            info!("[BELL] => {}", describe_bell(&bell).yellow());
        }
    });

    let mut conditional_rx = engine.subscribe_conditional_events();
    tokio::spawn(async move {
        while let Ok(event) = conditional_rx.recv().await {
            info!("[CONDITIONAL] => Condition met: {:?}", event.condition_id);
        }
    });

    let mut progress_rx = engine.subscribe_progress_events();
    tokio::spawn(async move {
        while let Ok(event) = progress_rx.recv().await {
            if event.tick.is_some_and(|tick| tick % 10 == 0) {
                info!("[PROGRESS] {} {}", event.now.format("%H:%M:%S"), status_line(&event.progress));
            }
        }
    });
}

/// Registers test components with the engine to demonstrate functionality.
async fn register_demo_components(engine: &DaybellEngine) {
    let _halfway_id = engine
        .on_conditional(
            |progress| progress.day.percent() >= 50.0,
            |progress| {
                info!(
                    "[ONE-SHOT CONDITIONAL] Day is {:.1}% done. This task will now be removed.",
                    progress.day.percent()
                )
            },
            true,
        )
        .await;
}

fn describe_bell(bell: &BellEvent) -> String {
    match bell {
        BellEvent::SegmentStarted(segment) => format!(
            "{:?} {}-{} started",
            segment.kind, segment.start, segment.end
        ),
        BellEvent::SegmentEnded(segment) => format!(
            "{:?} {}-{} ended",
            segment.kind, segment.start, segment.end
        ),
        BellEvent::PhaseStarted(phase) => format!("Phase {}-{} started", phase.start, phase.end),
        BellEvent::PhaseEnded(phase) => format!("Phase {}-{} ended", phase.start, phase.end),
        BellEvent::DayCompleted => "School day completed".to_string(),
    }
}

fn status_line(progress: &Progress) -> String {
    Scope::ALL
        .iter()
        .map(|&scope| match progress.window(scope) {
            Some(window) => format!("{} {:.1}%", scope.label(), window.clamped_percent()),
            None => format!("{} {}", scope.label(), "-".dimmed()),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
